//! Confirmation for orders the backend has already processed.
//!
//! After placing the order the backend answers with a `redirect`. That is
//! either the order-received URL (nothing left to do) or a confirmation
//! directive such as
//! `https://shop.example/checkout/#wc-stripe-confirm-pi:42:pi_1_secret_2:a1b2c3`,
//! which tells the client to let Stripe.js run the pending challenge and then
//! ask the backend for the final URL.
//!
//! The full-page checkout receives the directive through a `hashchange`;
//! [`ClassicCheckout`] listens for that and drives [`confirm_card_payment`].
//! Before that, [`ClassicSubmit`] holds the form's submit until the element
//! is validated and a payment method exists, then posts the method along in
//! hidden fields.

use std::cell::Cell;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Deserializer};
use wasm_bindgen::prelude::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::js_sys::Reflect;
use web_sys::{Document, HtmlFormElement, Node, Window};

use crate::attempt::{ConfirmationResult, EmitResponse};
use crate::bridge::prepare_payment_method;
use crate::client::{BillingDetails, CheckoutBillingAddress, StripeSdk};
use crate::config::{ServerConfig, GATEWAY_ID};
use crate::element::ElementStateHandle;
use crate::error::GatewayError;
use crate::intent::{IntentApi, IntentHandle};

const PAYMENT_DIRECTIVE: &str = "wc-stripe-confirm-pi";
const SETUP_DIRECTIVE: &str = "wc-stripe-confirm-si";

/// The checkout form on the full-page checkout and on order-pay pages.
pub const CLASSIC_FORM_SELECTOR: &str = "form.checkout, form#order_review";
pub const PAYMENT_METHOD_FIELD: &str = "wc-stripe-payment-method";
pub const SELECTED_TYPE_FIELD: &str = "wc-stripe-selected-type";
pub const IS_SAVING_FIELD: &str = "wc-stripe-is-saving";
const SAVE_CHECKBOX_ID: &str = "wc-stripe-new-payment-method";

/// The `paymentDetails` the backend returns for a processed order.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct PaymentDetails {
    /// Order-received URL or confirmation directive.
    #[serde(default, deserialize_with = "null_as_default")]
    pub redirect: String,
    /// Older responses carry the URL here instead.
    #[serde(default)]
    pub redirect_url: Option<String>,
    /// Payment method id to remember when the shopper opted to save it.
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default, deserialize_with = "loose_flag")]
    pub payment_needed: Option<bool>,
    #[serde(rename = "errorMessage", default)]
    pub error_message: Option<String>,
}

impl PaymentDetails {
    /// Where the order goes next: `redirect` when set, else `redirect_url`.
    pub fn redirect_target(&self) -> &str {
        if !self.redirect.is_empty() {
            return &self.redirect;
        }
        self.redirect_url.as_deref().unwrap_or_default()
    }
}

/// `null` reads as the type's default.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The block checkout passes payment details through as strings, so accept
/// `true`, `"1"`, `"yes"`, `1` and their negatives alike.
fn loose_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Bool(flag)) => Some(flag),
        Some(serde_json::Value::Number(n)) => Some(n.as_f64() != Some(0.0)),
        Some(serde_json::Value::String(s)) => match s.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Some(true),
            "0" | "false" | "no" | "" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntentKind {
    Payment,
    Setup,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmationDirective {
    pub kind: IntentKind,
    pub order_id: u64,
    pub client_secret: String,
    pub nonce: String,
}

impl ConfirmationDirective {
    /// Parse the fragment of `redirect`. `None` for plain URLs.
    pub fn parse(redirect: &str) -> Option<Self> {
        let (_, fragment) = redirect.split_once('#')?;
        let mut parts = fragment.split(':');
        let kind = match parts.next()? {
            PAYMENT_DIRECTIVE => IntentKind::Payment,
            SETUP_DIRECTIVE => IntentKind::Setup,
            _ => return None,
        };
        let order_id = parts.next()?.parse().ok()?;
        let client_secret = parts.next().filter(|s| !s.is_empty())?.to_string();
        let nonce = parts.next().filter(|s| !s.is_empty())?.to_string();
        if parts.next().is_some() {
            return None;
        }
        Some(ConfirmationDirective {
            kind,
            order_id,
            client_secret,
            nonce,
        })
    }
}

/// Result of [`ConfirmIntentApi::confirm_intent`].
pub enum ConfirmIntentOutcome {
    /// The redirect was a plain URL; nothing to confirm.
    NotNeeded,
    /// Confirmation started; resolves to the final redirect URL.
    Pending(LocalBoxFuture<'static, Result<String, GatewayError>>),
}

pub trait ConfirmIntentApi {
    fn confirm_intent(
        &self,
        redirect: &str,
        payment_method_to_save: Option<&str>,
    ) -> Result<ConfirmIntentOutcome, GatewayError>;
}

/// [`ConfirmIntentApi`] backed by Stripe.js and the plugin backend.
pub struct StripeConfirmIntentApi {
    sdk: Rc<dyn StripeSdk>,
    intents: Rc<dyn IntentApi>,
}

impl StripeConfirmIntentApi {
    pub fn new(sdk: Rc<dyn StripeSdk>, intents: Rc<dyn IntentApi>) -> Self {
        StripeConfirmIntentApi { sdk, intents }
    }
}

impl ConfirmIntentApi for StripeConfirmIntentApi {
    fn confirm_intent(
        &self,
        redirect: &str,
        payment_method_to_save: Option<&str>,
    ) -> Result<ConfirmIntentOutcome, GatewayError> {
        let Some(directive) = ConfirmationDirective::parse(redirect) else {
            return Ok(ConfirmIntentOutcome::NotNeeded);
        };
        let sdk = Rc::clone(&self.sdk);
        let intents = Rc::clone(&self.intents);
        let payment_method_to_save = payment_method_to_save.map(str::to_string);

        let request = async move {
            log::debug!(
                "handling next action for order {} ({:?})",
                directive.order_id,
                directive.kind
            );
            sdk.handle_next_action(&directive.client_secret).await?;
            intents
                .verify_intent(
                    directive.order_id,
                    &directive.nonce,
                    payment_method_to_save.as_deref(),
                )
                .await
        };
        Ok(ConfirmIntentOutcome::Pending(request.boxed_local()))
    }
}

/// Finish a processed order. Never fails: errors come back as
/// [`ConfirmationResult::Error`] in the payments notice context.
pub async fn confirm_card_payment(
    api: &dyn ConfirmIntentApi,
    payment_details: &PaymentDetails,
    emit_response: &EmitResponse,
    should_save_payment: bool,
) -> ConfirmationResult {
    let payment_method_to_save = if should_save_payment {
        payment_details.payment_method.as_deref()
    } else {
        None
    };

    let redirect = payment_details.redirect_target();
    let outcome = match api.confirm_intent(redirect, payment_method_to_save) {
        Ok(outcome) => outcome,
        Err(err) => return ConfirmationResult::payments_error(err.shopper_message(), emit_response),
    };

    match outcome {
        ConfirmIntentOutcome::NotNeeded => ConfirmationResult::success(redirect),
        ConfirmIntentOutcome::Pending(request) => match request.await {
            Ok(redirect_url) => ConfirmationResult::success(redirect_url),
            Err(err) => ConfirmationResult::payments_error(err.shopper_message(), emit_response),
        },
    }
}

/// Confirm the directive in `hash`, if it holds one.
pub async fn confirm_from_hash(
    api: &dyn ConfirmIntentApi,
    hash: &str,
) -> Option<ConfirmationResult> {
    ConfirmationDirective::parse(hash)?;
    let details = PaymentDetails {
        redirect: hash.to_string(),
        ..Default::default()
    };
    Some(confirm_card_payment(api, &details, &EmitResponse::default(), false).await)
}

/// Full-page checkout: react to confirmation directives written into the
/// location hash, including one already present when listening starts.
/// Stops listening on drop.
pub struct ClassicCheckout {
    window: Window,
    listener: Closure<dyn FnMut(web_sys::Event)>,
}

impl ClassicCheckout {
    pub fn listen(api: Rc<dyn ConfirmIntentApi>) -> Result<Self, GatewayError> {
        let window = web_sys::window()
            .ok_or_else(|| GatewayError::Configuration("no window".into()))?;

        let listener = {
            let window = window.clone();
            let api = Rc::clone(&api);
            Closure::wrap(Box::new(move |_event: web_sys::Event| {
                confirm_current_hash(&window, &api);
            }) as Box<dyn FnMut(web_sys::Event)>)
        };
        window
            .add_event_listener_with_callback("hashchange", listener.as_ref().unchecked_ref())
            .map_err(|e| GatewayError::Configuration(format!("{:?}", e)))?;

        // Order-pay pages and redirects can land with the directive already set.
        confirm_current_hash(&window, &api);

        Ok(ClassicCheckout { window, listener })
    }
}

impl Drop for ClassicCheckout {
    fn drop(&mut self) {
        let _ = self
            .window
            .remove_event_listener_with_callback("hashchange", self.listener.as_ref().unchecked_ref());
    }
}

fn confirm_current_hash(window: &Window, api: &Rc<dyn ConfirmIntentApi>) {
    let Ok(hash) = window.location().hash() else {
        return;
    };
    if ConfirmationDirective::parse(&hash).is_none() {
        return;
    }
    let api = Rc::clone(api);
    let window = window.clone();
    wasm_bindgen_futures::spawn_local(async move {
        if let Some(result) = confirm_from_hash(api.as_ref(), &hash).await {
            finish(&window, FinishAction::from(result));
        }
    });
}

/// What the page does with a classic confirmation result.
#[derive(Clone, Debug, PartialEq)]
enum FinishAction {
    Navigate(String),
    Stay,
    /// Clear the directive so the next order can set it again, then show
    /// the message.
    ShowError(String),
}

impl From<ConfirmationResult> for FinishAction {
    fn from(result: ConfirmationResult) -> Self {
        match result {
            ConfirmationResult::Success {
                redirect_url: Some(url),
            } => FinishAction::Navigate(url),
            ConfirmationResult::Success { redirect_url: None } => FinishAction::Stay,
            ConfirmationResult::Error { message, .. } => FinishAction::ShowError(message),
        }
    }
}

fn finish(window: &Window, action: FinishAction) {
    match action {
        FinishAction::Navigate(url) => {
            if let Err(err) = window.location().assign(&url) {
                log::error!("navigation to {} failed: {:?}", url, err);
            }
        }
        FinishAction::Stay => {}
        FinishAction::ShowError(message) => {
            let _ = window.location().set_hash("");
            show_checkout_error(window, &message);
        }
    }
}

/// Put `message` into the checkout notices wrapper as a WooCommerce error.
fn show_checkout_error(window: &Window, message: &str) {
    let Some(document) = window.document() else {
        return;
    };
    let Ok(Some(wrapper)) = document.query_selector(".woocommerce-notices-wrapper") else {
        log::error!("{}", message);
        return;
    };
    let notice = document
        .create_element("ul")
        .and_then(|list| {
            list.set_class_name("woocommerce-error");
            list.set_attribute("role", "alert")?;
            let item = document.create_element("li")?;
            item.set_text_content(Some(message));
            list.append_child(&item)?;
            Ok(list)
        });
    match notice {
        Ok(list) => {
            wrapper.set_inner_html("");
            let _ = wrapper.append_child(&list);
        }
        Err(err) => log::error!("could not render checkout error: {:?}", err),
    }
}

/// The classic checkout form, as far as payment-method creation needs it.
pub trait CheckoutForm {
    /// Value of the checked `payment_method` radio.
    fn selected_gateway(&self) -> Option<String>;
    fn billing(&self) -> BillingDetails;
    fn should_save_payment(&self) -> bool;
    fn set_hidden_field(&self, name: &str, value: &str);
    /// Submit again, this time carrying the hidden fields.
    fn resubmit(&self);
    fn show_error(&self, message: &str);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitDecision {
    /// Not ours, or already carrying a fresh payment method.
    Allow,
    /// A payment method is being created; swallow the duplicate submit.
    Block,
    /// Hold the submit and run [`ClassicSubmit::prepare`].
    Prepare,
}

/// Submit interception for the classic form.
pub struct ClassicSubmit {
    config: Rc<ServerConfig>,
    sdk: Rc<dyn StripeSdk>,
    element: ElementStateHandle,
    form: Rc<dyn CheckoutForm>,
    /// Set between writing the hidden fields and the resubmit they ride on.
    prepared: Cell<bool>,
    busy: Cell<bool>,
}

impl ClassicSubmit {
    pub fn new(
        config: Rc<ServerConfig>,
        sdk: Rc<dyn StripeSdk>,
        element: ElementStateHandle,
        form: Rc<dyn CheckoutForm>,
    ) -> Rc<Self> {
        Rc::new(ClassicSubmit {
            config,
            sdk,
            element,
            form,
            prepared: Cell::new(false),
            busy: Cell::new(false),
        })
    }

    /// Called for every submit of the form.
    pub fn decide(&self) -> SubmitDecision {
        if self.form.selected_gateway().as_deref() != Some(GATEWAY_ID) {
            return SubmitDecision::Allow;
        }
        if self.prepared.replace(false) {
            return SubmitDecision::Allow;
        }
        if self.busy.replace(true) {
            return SubmitDecision::Block;
        }
        SubmitDecision::Prepare
    }

    /// Validate the element and create a payment method. On success the
    /// hidden fields are filled and the form is submitted again; otherwise
    /// the message is shown and returned.
    pub async fn prepare(&self) -> Result<(), String> {
        let should_save_payment = self.form.should_save_payment();
        let prepared = prepare_payment_method(
            &self.config,
            self.sdk.as_ref(),
            &self.element.snapshot(),
            None,
            &self.form.billing(),
            should_save_payment,
            async { Ok::<Option<IntentHandle>, GatewayError>(None) },
        )
        .await;
        self.busy.set(false);

        match prepared {
            Ok(prepared) => {
                self.form
                    .set_hidden_field(PAYMENT_METHOD_FIELD, &prepared.payment_method);
                self.form
                    .set_hidden_field(SELECTED_TYPE_FIELD, &prepared.selected_type);
                self.form.set_hidden_field(
                    IS_SAVING_FIELD,
                    if should_save_payment { "yes" } else { "no" },
                );
                self.prepared.set(true);
                self.form.resubmit();
                Ok(())
            }
            Err(message) => {
                log::warn!("classic checkout submit held: {}", message);
                self.form.show_error(&message);
                Err(message)
            }
        }
    }
}

/// [`CheckoutForm`] over the page's checkout form.
pub struct DomCheckoutForm {
    window: Window,
    document: Document,
    form: HtmlFormElement,
}

impl DomCheckoutForm {
    /// `None` when the page has no checkout form.
    pub fn find(window: &Window) -> Option<Self> {
        let document = window.document()?;
        let form = document
            .query_selector(CLASSIC_FORM_SELECTOR)
            .ok()
            .flatten()?
            .dyn_into::<HtmlFormElement>()
            .ok()?;
        Some(DomCheckoutForm {
            window: window.clone(),
            document,
            form,
        })
    }

    pub fn element(&self) -> HtmlFormElement {
        self.form.clone()
    }

    fn value_of(&self, id: &str) -> String {
        self.document
            .get_element_by_id(id)
            .and_then(|el| Reflect::get(&el, &JsValue::from_str("value")).ok())
            .and_then(|value| value.as_string())
            .unwrap_or_default()
    }
}

impl CheckoutForm for DomCheckoutForm {
    fn selected_gateway(&self) -> Option<String> {
        let checked = self
            .form
            .query_selector("input[name=\"payment_method\"]:checked")
            .ok()
            .flatten()?;
        Reflect::get(&checked, &JsValue::from_str("value"))
            .ok()?
            .as_string()
    }

    fn billing(&self) -> BillingDetails {
        let address = CheckoutBillingAddress {
            first_name: self.value_of("billing_first_name"),
            last_name: self.value_of("billing_last_name"),
            address_1: self.value_of("billing_address_1"),
            address_2: self.value_of("billing_address_2"),
            city: self.value_of("billing_city"),
            state: self.value_of("billing_state"),
            postcode: self.value_of("billing_postcode"),
            country: self.value_of("billing_country"),
            email: self.value_of("billing_email"),
            phone: self.value_of("billing_phone"),
        };
        BillingDetails::from(&address)
    }

    fn should_save_payment(&self) -> bool {
        self.document
            .get_element_by_id(SAVE_CHECKBOX_ID)
            .and_then(|el| Reflect::get(&el, &JsValue::from_str("checked")).ok())
            .and_then(|checked| checked.as_bool())
            .unwrap_or(false)
    }

    fn set_hidden_field(&self, name: &str, value: &str) {
        let selector = format!("input[name=\"{}\"]", name);
        let input = match self.form.query_selector(&selector) {
            Ok(Some(input)) => Ok(input),
            _ => self.document.create_element("input").and_then(|input| {
                input.set_attribute("type", "hidden")?;
                input.set_attribute("name", name)?;
                self.form.append_child(&input)?;
                Ok(input)
            }),
        };
        let written = input.and_then(|input| {
            Reflect::set(&input, &JsValue::from_str("value"), &JsValue::from_str(value)).map(|_| ())
        });
        if let Err(err) = written {
            log::error!("could not write `{}`: {:?}", name, err);
        }
    }

    fn resubmit(&self) {
        if let Err(err) = self.form.request_submit() {
            log::error!("checkout resubmit failed: {:?}", err);
        }
    }

    fn show_error(&self, message: &str) {
        show_checkout_error(&self.window, message);
    }
}

/// Capture-phase `submit` listener on the window, so it runs before the
/// checkout script's own handler. Removed on drop.
pub struct ClassicSubmitListener {
    window: Window,
    listener: Closure<dyn FnMut(web_sys::Event)>,
}

impl ClassicSubmitListener {
    pub fn attach(
        window: &Window,
        form: HtmlFormElement,
        submit: Rc<ClassicSubmit>,
    ) -> Result<Self, GatewayError> {
        let listener = Closure::wrap(Box::new(move |event: web_sys::Event| {
            let ours = event
                .target()
                .and_then(|target| target.dyn_into::<Node>().ok())
                .map(|node| form.is_same_node(Some(&node)))
                .unwrap_or(false);
            if !ours {
                return;
            }
            match submit.decide() {
                SubmitDecision::Allow => {}
                SubmitDecision::Block => {
                    event.prevent_default();
                    event.stop_immediate_propagation();
                }
                SubmitDecision::Prepare => {
                    event.prevent_default();
                    event.stop_immediate_propagation();
                    let submit = Rc::clone(&submit);
                    wasm_bindgen_futures::spawn_local(async move {
                        let _ = submit.prepare().await;
                    });
                }
            }
        }) as Box<dyn FnMut(web_sys::Event)>);
        window
            .add_event_listener_with_callback_and_bool(
                "submit",
                listener.as_ref().unchecked_ref(),
                true,
            )
            .map_err(|e| GatewayError::Configuration(format!("{:?}", e)))?;

        Ok(ClassicSubmitListener {
            window: window.clone(),
            listener,
        })
    }
}

impl Drop for ClassicSubmitListener {
    fn drop(&mut self) {
        let _ = self.window.remove_event_listener_with_callback_and_bool(
            "submit",
            self.listener.as_ref().unchecked_ref(),
            true,
        );
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    use crate::bridge::tests::FakeSdk;
    use crate::bridge::{INCOMPLETE_MESSAGE, NOT_REUSABLE_MESSAGE};
    use crate::config::tests::sample;
    use crate::element::{ChangeValue, ElementChangeEvent};

    #[test]
    fn plain_urls_are_not_directives() {
        assert_eq!(
            ConfirmationDirective::parse("https://shop.example/order-received/42"),
            None
        );
        assert_eq!(ConfirmationDirective::parse("https://shop.example/#reviews"), None);
    }

    #[test]
    fn payment_and_setup_directives_parse() {
        let pi = ConfirmationDirective::parse(
            "https://shop.example/checkout/#wc-stripe-confirm-pi:42:pi_1_secret_2:n0nce",
        )
        .unwrap();
        assert_eq!(pi.kind, IntentKind::Payment);
        assert_eq!(pi.order_id, 42);
        assert_eq!(pi.client_secret, "pi_1_secret_2");
        assert_eq!(pi.nonce, "n0nce");

        let si = ConfirmationDirective::parse("#wc-stripe-confirm-si:7:seti_secret:abc").unwrap();
        assert_eq!(si.kind, IntentKind::Setup);
    }

    #[test]
    fn malformed_directives_are_rejected() {
        for redirect in [
            "#wc-stripe-confirm-pi:notanumber:secret:nonce",
            "#wc-stripe-confirm-pi:42::nonce",
            "#wc-stripe-confirm-pi:42:secret",
            "#wc-stripe-confirm-pi:42:secret:nonce:extra",
        ] {
            assert_eq!(ConfirmationDirective::parse(redirect), None, "{}", redirect);
        }
    }

    #[test]
    fn payment_details_fall_back_to_redirect_url() {
        let details: PaymentDetails = serde_json::from_str(
            r#"{ "redirect_url": "https://shop.example/done", "payment_needed": true }"#,
        )
        .unwrap();
        assert_eq!(details.redirect_target(), "https://shop.example/done");
        assert_eq!(details.payment_needed, Some(true));

        let both: PaymentDetails = serde_json::from_str(
            r##"{ "redirect": "#wc-stripe-confirm-pi:1:s:n", "redirect_url": "https://shop.example/done" }"##,
        )
        .unwrap();
        assert_eq!(both.redirect_target(), "#wc-stripe-confirm-pi:1:s:n");

        let null: PaymentDetails = serde_json::from_str(r#"{ "redirect": null }"#).unwrap();
        assert_eq!(null.redirect_target(), "");

        let stringly: PaymentDetails =
            serde_json::from_str(r#"{ "redirect": "x", "payment_needed": "0" }"#).unwrap();
        assert_eq!(stringly.payment_needed, Some(false));
    }

    struct ResolvingApi {
        calls: RefCell<Vec<String>>,
        outcome: Result<&'static str, &'static str>,
    }

    impl ConfirmIntentApi for ResolvingApi {
        fn confirm_intent(
            &self,
            redirect: &str,
            _: Option<&str>,
        ) -> Result<ConfirmIntentOutcome, GatewayError> {
            self.calls.borrow_mut().push(redirect.to_string());
            let outcome = self.outcome;
            Ok(ConfirmIntentOutcome::Pending(
                async move {
                    outcome.map(str::to_string).map_err(|message| GatewayError::Backend {
                        status: Some(400),
                        message: message.to_string(),
                    })
                }
                .boxed_local(),
            ))
        }
    }

    #[tokio::test]
    async fn directive_in_the_hash_navigates_to_the_final_url() {
        let api = ResolvingApi {
            calls: RefCell::new(Vec::new()),
            outcome: Ok("https://shop.example/order-received/42"),
        };
        let hash = "#wc-stripe-confirm-pi:42:pi_1_secret_2:n0nce";

        let result = confirm_from_hash(&api, hash).await.unwrap();
        assert_eq!(
            FinishAction::from(result),
            FinishAction::Navigate("https://shop.example/order-received/42".into())
        );
        assert_eq!(*api.calls.borrow(), vec![hash.to_string()]);
    }

    #[tokio::test]
    async fn failed_hash_confirmation_shows_the_error() {
        let api = ResolvingApi {
            calls: RefCell::new(Vec::new()),
            outcome: Err("Authentication failed."),
        };
        let result = confirm_from_hash(&api, "#wc-stripe-confirm-si:7:seti_secret:abc")
            .await
            .unwrap();
        assert_eq!(
            FinishAction::from(result),
            FinishAction::ShowError("Authentication failed.".into())
        );
    }

    #[tokio::test]
    async fn other_hashes_are_left_alone() {
        let api = ResolvingApi {
            calls: RefCell::new(Vec::new()),
            outcome: Ok("unused"),
        };
        assert_eq!(confirm_from_hash(&api, "#reviews").await, None);
        assert_eq!(confirm_from_hash(&api, "").await, None);
        assert!(api.calls.borrow().is_empty());
    }

    #[derive(Default)]
    struct FakeForm {
        gateway: Option<String>,
        save: bool,
        fields: RefCell<BTreeMap<String, String>>,
        resubmits: Cell<usize>,
        errors: RefCell<Vec<String>>,
    }

    impl CheckoutForm for FakeForm {
        fn selected_gateway(&self) -> Option<String> {
            self.gateway.clone()
        }

        fn billing(&self) -> BillingDetails {
            BillingDetails {
                email: Some("ada@example.com".into()),
                ..Default::default()
            }
        }

        fn should_save_payment(&self) -> bool {
            self.save
        }

        fn set_hidden_field(&self, name: &str, value: &str) {
            self.fields
                .borrow_mut()
                .insert(name.to_string(), value.to_string());
        }

        fn resubmit(&self) {
            self.resubmits.set(self.resubmits.get() + 1);
        }

        fn show_error(&self, message: &str) {
            self.errors.borrow_mut().push(message.to_string());
        }
    }

    struct Classic {
        submit: Rc<ClassicSubmit>,
        sdk: Rc<FakeSdk>,
        form: Rc<FakeForm>,
        element: ElementStateHandle,
    }

    fn classic(form: FakeForm, sdk: FakeSdk, method_type: &str) -> Classic {
        let sdk = Rc::new(sdk);
        let form = Rc::new(form);
        let element = ElementStateHandle::default();
        element.apply(&ElementChangeEvent {
            complete: true,
            value: Some(ChangeValue {
                method_type: method_type.into(),
            }),
        });
        Classic {
            submit: ClassicSubmit::new(
                Rc::new(sample()),
                sdk.clone(),
                element.clone(),
                form.clone(),
            ),
            sdk,
            form,
            element,
        }
    }

    fn stripe_selected() -> FakeForm {
        FakeForm {
            gateway: Some(GATEWAY_ID.into()),
            ..Default::default()
        }
    }

    #[test]
    fn other_gateways_submit_untouched() {
        let c = classic(
            FakeForm {
                gateway: Some("cod".into()),
                ..Default::default()
            },
            FakeSdk::default(),
            "card",
        );
        assert_eq!(c.submit.decide(), SubmitDecision::Allow);
        assert_eq!(c.submit.decide(), SubmitDecision::Allow);
    }

    #[tokio::test]
    async fn classic_submit_creates_the_method_then_resubmits() {
        let c = classic(stripe_selected(), FakeSdk::default(), "card");

        assert_eq!(c.submit.decide(), SubmitDecision::Prepare);
        assert_eq!(c.submit.decide(), SubmitDecision::Block);
        c.submit.prepare().await.unwrap();

        assert_eq!(*c.sdk.calls.borrow(), vec!["submit", "create_payment_method"]);
        let fields = c.form.fields.borrow().clone();
        assert_eq!(fields[PAYMENT_METHOD_FIELD], "pm_123");
        assert_eq!(fields[SELECTED_TYPE_FIELD], "card");
        assert_eq!(fields[IS_SAVING_FIELD], "no");
        assert_eq!(c.form.resubmits.get(), 1);

        // The resubmit goes through; the shopper's next one starts over.
        assert_eq!(c.submit.decide(), SubmitDecision::Allow);
        assert_eq!(c.submit.decide(), SubmitDecision::Prepare);
    }

    #[tokio::test]
    async fn incomplete_classic_element_holds_the_order() {
        let c = classic(stripe_selected(), FakeSdk::default(), "card");
        c.element.apply(&ElementChangeEvent::default());

        assert_eq!(c.submit.decide(), SubmitDecision::Prepare);
        assert_eq!(c.submit.prepare().await, Err(INCOMPLETE_MESSAGE.to_string()));
        assert_eq!(*c.form.errors.borrow(), vec![INCOMPLETE_MESSAGE.to_string()]);
        assert_eq!(c.form.resubmits.get(), 0);
        assert!(c.sdk.calls.borrow().is_empty());
        assert_eq!(c.submit.decide(), SubmitDecision::Prepare);
    }

    #[tokio::test]
    async fn classic_saving_requires_a_reusable_type() {
        let c = classic(
            FakeForm {
                save: true,
                ..stripe_selected()
            },
            FakeSdk::default(),
            "klarna",
        );
        c.submit.decide();
        assert_eq!(c.submit.prepare().await, Err(NOT_REUSABLE_MESSAGE.to_string()));
        assert!(c.form.fields.borrow().is_empty());
    }

    #[tokio::test]
    async fn classic_validation_errors_are_shown() {
        let sdk = FakeSdk {
            submit_error: Some("Your card number is incomplete.".into()),
            ..Default::default()
        };
        let c = classic(stripe_selected(), sdk, "card");
        c.submit.decide();
        assert!(c.submit.prepare().await.is_err());
        assert_eq!(
            *c.form.errors.borrow(),
            vec!["Your card number is incomplete.".to_string()]
        );
        assert_eq!(*c.sdk.calls.borrow(), vec!["submit"]);
    }
}
