//! The payment panel rendered inside the block checkout.
//!
//! [`UpeBlockCheckout`] is what the block checkout's payment-method
//! registration renders for this gateway. It:
//! 1. Loads Stripe.js once per page.
//! 2. Requests the page's intent exactly once (see [`IntentSlot`]).
//! 3. Mounts the Payment Element into `#wc-stripe-upe-element`, styled from
//!    the cached storefront appearance.
//! 4. Registers the pre-submit and post-submit hooks with the host checkout,
//!    re-registering whenever the host hands it new props and unregistering
//!    on unmount. Attempt state outlives any one registration.
//!
//! Load failures are shown inline and also surface through the pre-submit
//! hook, so the shopper cannot place an order against a broken form.
//!
//! # Example
//!
//! ```rust,ignore
//! html! {
//!     <ConfigProvider context={config}>
//!         <UpeBlockCheckout
//!             host={HostHandle(Rc::new(JsCheckoutHost::new(event_registration)))}
//!             active_payment_method="stripe"
//!         />
//!     </ConfigProvider>
//! }
//! ```

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use wasm_bindgen_futures::spawn_local;
use yew::prelude::*;

use crate::appearance::{
    compute_appearance, AppearanceCache, DomStyleSource, BLOCKS_APPEARANCE_NAMESPACE,
};
use crate::attempt::{AttemptEvent, AttemptState, EmitResponse};
use crate::bridge::{BridgeContext, CheckoutEventBridge, CheckoutHost};
use crate::classic::{ConfirmIntentApi, StripeConfirmIntentApi};
use crate::client::{BillingDetails, StripeSdk};
use crate::components::{PaymentNotice, TestingInstructions};
use crate::config::{use_server_config, ServerConfig};
use crate::element::{ElementsOptions, PaymentElementMount};
use crate::error::GENERIC_LOAD_ERROR;
use crate::intent::{IntentApi, IntentSlot, RestIntentClient};
use crate::interop::{use_stripejs, StripeJsStatus};
use crate::storage::{LocalStorage, SystemClock};

pub const ELEMENT_CONTAINER_ID: &str = "wc-stripe-upe-element";

/// The host checkout's event registration. Compared by identity.
#[derive(Clone)]
pub struct HostHandle(pub Rc<dyn CheckoutHost>);

impl PartialEq for HostHandle {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// What the block checkout passes to a payment method's content component.
#[derive(Properties, PartialEq, Clone)]
pub struct UpeBlockCheckoutProps {
    pub host: HostHandle,
    #[prop_or_default]
    pub emit_response: EmitResponse,
    #[prop_or_default]
    pub billing: BillingDetails,
    #[prop_or_default]
    pub should_save_payment: bool,
    /// Gateway id of the payment method the shopper picked.
    pub active_payment_method: AttrValue,
}

#[function_component(UpeBlockCheckout)]
pub fn upe_block_checkout(props: &UpeBlockCheckoutProps) -> Html {
    match use_server_config() {
        Ok(config) => html! { <PaymentPanel config={config} checkout={props.clone()} /> },
        Err(err) => {
            log::error!("{}", err);
            html! { <PaymentNotice message={err.shopper_message()} /> }
        }
    }
}

#[derive(Properties, PartialEq)]
struct PaymentPanelProps {
    config: Rc<ServerConfig>,
    checkout: UpeBlockCheckoutProps,
}

fn block_appearance(config: &ServerConfig) -> crate::appearance::Appearance {
    let source = DomStyleSource::blocks();
    match LocalStorage::new() {
        Some(store) => AppearanceCache::new(BLOCKS_APPEARANCE_NAMESPACE, store, SystemClock)
            .get_or_compute(&config.theme_name, &source),
        None => compute_appearance(&source),
    }
}

#[function_component(PaymentPanel)]
fn payment_panel(props: &PaymentPanelProps) -> Html {
    let stripe_js = use_stripejs();
    let intents = use_memo(props.config.clone(), |config| {
        RestIntentClient::new(Rc::clone(config))
    });
    let slot = use_memo((), |_| IntentSlot::new());
    let attempt = use_memo((), |_| RefCell::new(AttemptState::Idle));
    let pending_error = use_memo((), |_| RefCell::new(None::<String>));
    let alive = use_memo((), |_| Cell::new(true));
    let mount = use_state(|| None::<Rc<PaymentElementMount>>);
    let notice = use_state(|| None::<String>);

    // Hooks still in flight after unmount must not touch the attempt.
    {
        let alive = alive.clone();
        use_effect_with((), move |_| move || alive.set(false));
    }

    // 1) One intent per page, however often we render.
    {
        let config = props.config.clone();
        let intents = intents.clone();
        let slot = slot.clone();
        let notice = notice.clone();
        use_effect_with((), move |_| {
            spawn_local(async move {
                if let Err(err) = slot.ensure(intents.as_ref(), &config).await {
                    notice.set(Some(err.shopper_message()));
                }
            });
            || ()
        });
    }

    // 2) Mount the element once Stripe.js is available.
    {
        let config = props.config.clone();
        let mount = mount.clone();
        let attempt = attempt.clone();
        let pending_error = pending_error.clone();
        let notice = notice.clone();
        use_effect_with(stripe_js, move |status| {
            let fail = |message: &str| {
                *pending_error.borrow_mut() = Some(message.to_string());
                notice.set(Some(message.to_string()));
            };
            match status {
                StripeJsStatus::Ready if mount.is_none() => {
                    let options = ElementsOptions::from_config(&config, Some(block_appearance(&config)));
                    let selector = format!("#{}", ELEMENT_CONTAINER_ID);
                    match PaymentElementMount::mount(&config, &options, &selector) {
                        Ok(mounted) => {
                            if let Err(err) = attempt.borrow_mut().advance(AttemptEvent::ElementMounted) {
                                log::error!("{}", err);
                            }
                            mount.set(Some(Rc::new(mounted)));
                        }
                        Err(err) => {
                            log::error!("payment element not mounted: {}", err);
                            fail(GENERIC_LOAD_ERROR);
                        }
                    }
                }
                StripeJsStatus::Failed => fail(GENERIC_LOAD_ERROR),
                _ => {}
            }
            || ()
        });
    }

    // 3) Checkout hooks, rebuilt whenever the host's props or the mount change.
    {
        let config = props.config.clone();
        let intents = intents.clone();
        let slot = slot.clone();
        let attempt = attempt.clone();
        let alive = alive.clone();
        let pending_error = pending_error.clone();
        let mount = mount.clone();
        use_effect_with(
            (props.checkout.clone(), mount.is_some()),
            move |(checkout, _)| {
                let intents: Rc<dyn IntentApi> = intents;
                let mounted = (*mount).clone();
                let sdk = mounted
                    .as_ref()
                    .map(|m| Rc::new(m.sdk()) as Rc<dyn StripeSdk>);
                let confirm_api = sdk.clone().map(|sdk| {
                    Rc::new(StripeConfirmIntentApi::new(sdk, Rc::clone(&intents)))
                        as Rc<dyn ConfirmIntentApi>
                });
                let bridge = CheckoutEventBridge::new(BridgeContext {
                    config,
                    sdk,
                    intents,
                    confirm_api,
                    slot,
                    element: mounted.map(|m| m.state()).unwrap_or_default(),
                    attempt,
                    alive,
                    pending_error,
                    emit_response: checkout.emit_response.clone(),
                    billing: checkout.billing.clone(),
                    active_payment_method: checkout.active_payment_method.to_string(),
                    should_save_payment: checkout.should_save_payment,
                });
                let registration = bridge.register(checkout.host.0.as_ref());
                move || drop(registration)
            },
        );
    }

    let instructions = props
        .config
        .test_mode
        .then(|| props.config.payment_method("card"))
        .flatten()
        .map(|method| method.testing_instructions.clone())
        .unwrap_or_default();

    html! {
        <div class="wc-stripe-upe-block">
            if let Some(message) = &*notice {
                <PaymentNotice message={message.clone()} />
            }
            <TestingInstructions instructions={instructions} />
            <div id={ELEMENT_CONTAINER_ID} class="wc-stripe-upe-element" />
        </div>
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{CheckoutResultHook, PaymentSetupHook, Subscription};

    struct NullHost;

    impl CheckoutHost for NullHost {
        fn on_payment_setup(&self, _: PaymentSetupHook) -> Subscription {
            Subscription::noop()
        }

        fn on_checkout_success(&self, _: CheckoutResultHook) -> Subscription {
            Subscription::noop()
        }

        fn on_checkout_fail(&self, _: CheckoutResultHook) -> Subscription {
            Subscription::noop()
        }
    }

    #[test]
    fn host_handles_compare_by_identity() {
        let host: Rc<dyn CheckoutHost> = Rc::new(NullHost);
        let a = HostHandle(Rc::clone(&host));
        let b = HostHandle(host);
        let c = HostHandle(Rc::new(NullHost));
        assert!(a == b);
        assert!(a != c);
    }
}
