use yew::prelude::*;

/// An error shown above the payment element, styled like the block
/// checkout's own notices.
#[derive(Properties, PartialEq)]
pub struct PaymentNoticeProps {
    pub message: AttrValue,
}

#[function_component(PaymentNotice)]
pub fn payment_notice(props: &PaymentNoticeProps) -> Html {
    html! {
        <div
            class="wc-block-components-notice-banner is-error wc-stripe-upe-notice"
            role="alert"
        >
            <div class="wc-block-components-notice-banner__content">
                { &props.message }
            </div>
        </div>
    }
}

/// Test-mode hint for the selected payment method ("Use 4242 4242 ...").
#[derive(Properties, PartialEq)]
pub struct TestingInstructionsProps {
    pub instructions: AttrValue,
}

#[function_component(TestingInstructions)]
pub fn testing_instructions(props: &TestingInstructionsProps) -> Html {
    if props.instructions.is_empty() {
        return Html::default();
    }
    // The backend ships the instructions as markup.
    let markup = Html::from_html_unchecked(props.instructions.clone());
    html! {
        <div class="wc-stripe-upe-testing-instructions">
            <strong>{ "Test mode: " }</strong>
            { markup }
        </div>
    }
}
