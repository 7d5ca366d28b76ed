//! Glue between the block checkout's event system and the confirmation flow.
//!
//! The host checkout exposes three registration functions (`onPaymentSetup`,
//! `onCheckoutSuccess`, `onCheckoutFail`). [`CheckoutEventBridge::register`]
//! subscribes to all of them and returns a [`Registration`]; dropping it
//! unsubscribes, so no hook outlives the component that installed it.
//!
//! Attempt state and the intent slot belong to the payment panel, not to a
//! bridge. The panel re-registers whenever the host hands it new props, and a
//! hook still running from an older registration keeps writing to the same
//! attempt. Writes stop only once the panel itself is gone (`alive`).

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::future::Future;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use gloo_utils::format::JsValueSerdeExt;
use serde::Deserialize;
use serde_json::{json, Value};
use wasm_bindgen::prelude::Closure;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::{Function, Promise, Reflect};

use crate::attempt::{AttemptEvent, AttemptState, ConfirmationResult, EmitResponse, IllegalTransition};
use crate::classic::{confirm_card_payment, null_as_default, ConfirmIntentApi, PaymentDetails};
use crate::client::{BillingDetails, StripeSdk};
use crate::config::{ServerConfig, GATEWAY_ID};
use crate::element::{validate, ElementStateHandle, PaymentElementState};
use crate::error::GatewayError;
use crate::intent::{confirm_payment_or_setup, IntentApi, IntentHandle, IntentSlot};

pub const INCOMPLETE_MESSAGE: &str = "Your payment information is incomplete.";
pub const NOT_REUSABLE_MESSAGE: &str = "This payment method cannot be saved for future use.";
pub const NOT_READY_MESSAGE: &str = "The payment form is still loading. Please try again.";
pub const IN_PROGRESS_MESSAGE: &str = "Your payment is already being processed. Please wait.";

/// What the pre-submit hook hands back to the host.
#[derive(Clone, Debug, PartialEq)]
pub enum PreSubmitResult {
    /// Another gateway is active; let it through untouched.
    Skip,
    Success {
        payment_method_data: BTreeMap<String, String>,
    },
    Error {
        message: String,
        message_context: String,
    },
}

impl PreSubmitResult {
    fn error(message: impl Into<String>, emit_response: &EmitResponse) -> Self {
        PreSubmitResult::Error {
            message: message.into(),
            message_context: emit_response.notice_contexts.payments.clone(),
        }
    }

    /// The host's response object (`true` for a pass-through).
    pub fn to_json(&self) -> Value {
        match self {
            PreSubmitResult::Skip => Value::Bool(true),
            PreSubmitResult::Success {
                payment_method_data,
            } => json!({
                "type": "success",
                "meta": { "paymentMethodData": payment_method_data },
            }),
            PreSubmitResult::Error {
                message,
                message_context,
            } => json!({
                "type": "error",
                "message": message,
                "messageContext": message_context,
            }),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub payment_status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub payment_details: PaymentDetails,
    #[serde(default)]
    pub redirect_url: Option<String>,
}

/// Argument of the post-submit hooks.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutEvent {
    #[serde(default)]
    pub order_id: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub processing_response: ProcessingResponse,
}

impl CheckoutEvent {
    pub fn from_value(value: Value) -> Result<Self, GatewayError> {
        Ok(serde_json::from_value(value)?)
    }
}

pub type PaymentSetupHook = Rc<dyn Fn() -> LocalBoxFuture<'static, PreSubmitResult>>;
/// Receives the host's raw event. `None` lets the event through (another
/// gateway handled it).
pub type CheckoutResultHook =
    Rc<dyn Fn(Value) -> LocalBoxFuture<'static, Option<ConfirmationResult>>>;

/// Unsubscribes when dropped.
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + 'static) -> Self {
        Subscription {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    pub fn noop() -> Self {
        Subscription { unsubscribe: None }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

/// The host checkout's event registration surface.
pub trait CheckoutHost {
    fn on_payment_setup(&self, hook: PaymentSetupHook) -> Subscription;
    fn on_checkout_success(&self, hook: CheckoutResultHook) -> Subscription;
    fn on_checkout_fail(&self, hook: CheckoutResultHook) -> Subscription;
}

/// Everything the hooks read. Built by the checkout component on each
/// render that changes any of it.
#[derive(Clone)]
pub struct BridgeContext {
    pub config: Rc<ServerConfig>,
    /// `None` until the payment element is mounted.
    pub sdk: Option<Rc<dyn StripeSdk>>,
    pub intents: Rc<dyn IntentApi>,
    /// Directive-based confirmation, for orders without a live intent.
    pub confirm_api: Option<Rc<dyn ConfirmIntentApi>>,
    pub slot: Rc<IntentSlot>,
    pub element: ElementStateHandle,
    pub attempt: Rc<RefCell<AttemptState>>,
    /// Cleared when the owning panel unmounts.
    pub alive: Rc<Cell<bool>>,
    /// Error raised outside the hooks (mount or intent failure).
    pub pending_error: Rc<RefCell<Option<String>>>,
    pub emit_response: EmitResponse,
    pub billing: BillingDetails,
    pub active_payment_method: String,
    pub should_save_payment: bool,
}

/// A payment method ready to travel with the order.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedPayment {
    pub payment_method: String,
    pub selected_type: String,
    pub intent: Option<IntentHandle>,
}

/// The checks both checkouts run before an order is placed: refuse what
/// cannot succeed, let Stripe validate the element, resolve the intent,
/// then create the payment method. `Err` carries the shopper-facing message.
///
/// `intent` is only awaited once validation passed.
pub async fn prepare_payment_method(
    config: &ServerConfig,
    sdk: &dyn StripeSdk,
    element: &PaymentElementState,
    pending_error: Option<String>,
    billing: &BillingDetails,
    should_save_payment: bool,
    intent: impl Future<Output = Result<Option<IntentHandle>, GatewayError>>,
) -> Result<PreparedPayment, String> {
    if !element.is_complete {
        return Err(INCOMPLETE_MESSAGE.to_string());
    }
    if let Some(message) = pending_error {
        return Err(message);
    }
    if should_save_payment && !config.is_reusable(&element.selected_payment_method_type) {
        return Err(NOT_REUSABLE_MESSAGE.to_string());
    }

    validate(sdk).await.map_err(|err| err.shopper_message())?;
    let intent = intent.await.map_err(|err| err.shopper_message())?;
    let method = sdk
        .create_payment_method(billing)
        .await
        .map_err(|err| err.message)?;

    Ok(PreparedPayment {
        payment_method: method.id,
        selected_type: element.selected_payment_method_type.clone(),
        intent,
    })
}

pub struct CheckoutEventBridge {
    ctx: BridgeContext,
}

/// Live hook subscriptions. Dropping it unsubscribes all three hooks.
pub struct Registration {
    _subscriptions: Vec<Subscription>,
}

impl CheckoutEventBridge {
    pub fn new(ctx: BridgeContext) -> Rc<Self> {
        Rc::new(CheckoutEventBridge { ctx })
    }

    pub fn register(self: &Rc<Self>, host: &dyn CheckoutHost) -> Registration {
        let setup = {
            let bridge = Rc::clone(self);
            Rc::new(move || {
                let bridge = Rc::clone(&bridge);
                async move { bridge.pre_submit().await }.boxed_local()
            }) as PaymentSetupHook
        };
        let success = {
            let bridge = Rc::clone(self);
            Rc::new(move |raw: Value| {
                let bridge = Rc::clone(&bridge);
                async move { bridge.on_checkout_success(raw).await }.boxed_local()
            }) as CheckoutResultHook
        };
        let fail = {
            let bridge = Rc::clone(self);
            Rc::new(move |raw: Value| {
                let bridge = Rc::clone(&bridge);
                async move { bridge.on_checkout_fail(raw) }.boxed_local()
            }) as CheckoutResultHook
        };

        Registration {
            _subscriptions: vec![
                host.on_payment_setup(setup),
                host.on_checkout_success(success),
                host.on_checkout_fail(fail),
            ],
        }
    }

    fn is_active(&self) -> bool {
        self.ctx.active_payment_method == GATEWAY_ID
    }

    /// Apply `event` to the attempt. A no-op once the panel has unmounted.
    fn advance(&self, event: AttemptEvent) -> Result<(), IllegalTransition> {
        if !self.ctx.alive.get() {
            log::debug!("checkout torn down; dropping {:?}", event);
            return Ok(());
        }
        self.ctx.attempt.borrow_mut().advance(event)
    }

    /// [`Self::advance`] for events whose result is already decided.
    fn record(&self, event: AttemptEvent) {
        if let Err(err) = self.advance(event) {
            log::error!("{}", err);
        }
    }

    fn pending_error(&self) -> Option<String> {
        let pending = self.ctx.pending_error.borrow().clone();
        pending.or_else(|| self.ctx.slot.pending_error())
    }

    fn reject(&self, message: impl Into<String>) -> PreSubmitResult {
        let message = message.into();
        let result = ConfirmationResult::payments_error(message.clone(), &self.ctx.emit_response);
        self.record(AttemptEvent::Rejected(result));
        PreSubmitResult::error(message, &self.ctx.emit_response)
    }

    /// The attempt is somewhere a submit cannot start from; leave it there.
    fn refuse(&self, err: IllegalTransition) -> PreSubmitResult {
        log::warn!("{}", err);
        PreSubmitResult::error(IN_PROGRESS_MESSAGE, &self.ctx.emit_response)
    }

    /// Validate the element and create a payment method before the order
    /// is placed.
    pub async fn pre_submit(&self) -> PreSubmitResult {
        let ctx = &self.ctx;
        if !self.is_active() {
            return PreSubmitResult::Skip;
        }

        let previous = ctx.attempt.borrow().clone();
        let sdk = match (&previous, &ctx.sdk) {
            (AttemptState::Idle, _) | (_, None) => {
                let message = self.pending_error().unwrap_or_else(|| NOT_READY_MESSAGE.into());
                return PreSubmitResult::error(message, &ctx.emit_response);
            }
            (_, Some(sdk)) => Rc::clone(sdk),
        };
        if matches!(
            previous,
            AttemptState::Finalized(_) | AttemptState::MethodCreated { .. }
        ) {
            if let Err(err) = self.advance(AttemptEvent::Restart) {
                return self.refuse(err);
            }
            ctx.slot.begin_new_attempt();
        }
        if let Err(err) = self.advance(AttemptEvent::SubmitRequested) {
            return self.refuse(err);
        }

        let prepared = prepare_payment_method(
            &ctx.config,
            sdk.as_ref(),
            &ctx.element.snapshot(),
            self.pending_error(),
            &ctx.billing,
            ctx.should_save_payment,
            ctx.slot.ensure(ctx.intents.as_ref(), &ctx.config),
        )
        .await;
        let prepared = match prepared {
            Ok(prepared) => prepared,
            Err(message) => return self.reject(message),
        };

        self.record(AttemptEvent::MethodCreated {
            payment_method: prepared.payment_method.clone(),
        });

        let mut payment_method_data = BTreeMap::from([
            ("payment_method".to_string(), GATEWAY_ID.to_string()),
            ("wc-stripe-payment-method".to_string(), prepared.payment_method),
            (
                "wc-stripe-is-saving".to_string(),
                if ctx.should_save_payment { "yes" } else { "no" }.to_string(),
            ),
            ("wc-stripe-selected-type".to_string(), prepared.selected_type),
        ]);
        if let Some(intent) = prepared.intent {
            payment_method_data.insert("wc-stripe-intent-id".to_string(), intent.id);
        }
        PreSubmitResult::Success {
            payment_method_data,
        }
    }

    /// Read the host's event. An unreadable event fails the checkout rather
    /// than letting it through unconfirmed.
    fn read_event(&self, raw: Value) -> Result<CheckoutEvent, ConfirmationResult> {
        CheckoutEvent::from_value(raw).map_err(|err| {
            log::error!("unreadable checkout event: {}", err);
            ConfirmationResult::payments_error(self.ctx.config.generic_error(), &self.ctx.emit_response)
        })
    }

    /// `onCheckoutSuccess` with the host's raw event.
    pub async fn on_checkout_success(&self, raw: Value) -> Option<ConfirmationResult> {
        if !self.is_active() {
            return None;
        }
        match self.read_event(raw) {
            Ok(event) => self.post_submit_success(event).await,
            Err(result) => {
                self.record(AttemptEvent::OrderFailed(result.clone()));
                Some(result)
            }
        }
    }

    /// `onCheckoutFail` with the host's raw event.
    pub fn on_checkout_fail(&self, raw: Value) -> Option<ConfirmationResult> {
        if !self.is_active() {
            return None;
        }
        match self.read_event(raw) {
            Ok(event) => self.post_submit_failure(event),
            Err(result) => {
                self.record(AttemptEvent::OrderFailed(result.clone()));
                Some(result)
            }
        }
    }

    /// Confirm the intent once the backend has accepted the order.
    pub async fn post_submit_success(&self, event: CheckoutEvent) -> Option<ConfirmationResult> {
        if !self.is_active() {
            return None;
        }
        let ctx = &self.ctx;
        let details = &event.processing_response.payment_details;

        if let Some(message) = details.error_message.as_deref().filter(|m| !m.is_empty()) {
            let result = ConfirmationResult::payments_error(message, &ctx.emit_response);
            self.record(AttemptEvent::OrderFailed(result.clone()));
            return Some(result);
        }
        if let Err(err) = self.advance(AttemptEvent::OrderProcessed) {
            // No payment method from this attempt; never confirm blind.
            log::error!("{}", err);
            return Some(ConfirmationResult::payments_error(
                ctx.config.generic_error(),
                &ctx.emit_response,
            ));
        }

        let result = match ctx.slot.consume() {
            Some(intent) => {
                let Some(sdk) = ctx.sdk.clone() else {
                    let result = ConfirmationResult::payments_error(NOT_READY_MESSAGE, &ctx.emit_response);
                    self.record(AttemptEvent::Confirmed(result.clone()));
                    return Some(result);
                };
                let return_url = match details.redirect_target() {
                    "" => event
                        .processing_response
                        .redirect_url
                        .clone()
                        .unwrap_or_default(),
                    target => target.to_string(),
                };
                let selected_type = ctx.element.snapshot().selected_payment_method_type;
                match ctx
                    .intents
                    .update_intent(&intent.id, event.order_id, ctx.should_save_payment, &selected_type)
                    .await
                {
                    Ok(()) => {
                        confirm_payment_or_setup(
                            sdk.as_ref(),
                            &intent,
                            &ctx.billing,
                            details.payment_needed.unwrap_or(intent.payment_needed),
                            &return_url,
                            &ctx.emit_response,
                        )
                        .await
                    }
                    Err(err) => {
                        ConfirmationResult::payments_error(err.shopper_message(), &ctx.emit_response)
                    }
                }
            }
            None => match &ctx.confirm_api {
                Some(api) => {
                    confirm_card_payment(
                        api.as_ref(),
                        details,
                        &ctx.emit_response,
                        ctx.should_save_payment,
                    )
                    .await
                }
                None => ConfirmationResult::payments_error(NOT_READY_MESSAGE, &ctx.emit_response),
            },
        };

        self.record(AttemptEvent::Confirmed(result.clone()));
        Some(result)
    }

    /// Show the backend's failure message next to the payment section.
    pub fn post_submit_failure(&self, event: CheckoutEvent) -> Option<ConfirmationResult> {
        if !self.is_active() {
            return None;
        }
        let message = event
            .processing_response
            .payment_details
            .error_message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.ctx.config.generic_error());
        let result = ConfirmationResult::payments_error(message, &self.ctx.emit_response);
        self.record(AttemptEvent::OrderFailed(result.clone()));
        Some(result)
    }
}

/// [`CheckoutHost`] over the block checkout's `eventRegistration` prop.
pub struct JsCheckoutHost {
    event_registration: JsValue,
}

impl JsCheckoutHost {
    pub fn new(event_registration: JsValue) -> Self {
        JsCheckoutHost { event_registration }
    }

    fn subscribe(
        &self,
        name: &str,
        handler: Closure<dyn FnMut(JsValue) -> Promise>,
    ) -> Subscription {
        let register = Reflect::get(&self.event_registration, &JsValue::from_str(name))
            .ok()
            .and_then(|f| f.dyn_into::<Function>().ok());
        let Some(register) = register else {
            log::error!("host checkout has no `{}`", name);
            return Subscription::noop();
        };
        match register.call1(&JsValue::NULL, handler.as_ref()) {
            Ok(unsubscribe) => {
                let unsubscribe = unsubscribe.dyn_into::<Function>().ok();
                Subscription::new(move || {
                    if let Some(unsubscribe) = unsubscribe {
                        let _ = unsubscribe.call0(&JsValue::NULL);
                    }
                    drop(handler);
                })
            }
            Err(err) => {
                log::error!("`{}` registration failed: {:?}", name, err);
                Subscription::noop()
            }
        }
    }
}

fn json_to_js(value: &Value) -> Result<JsValue, JsValue> {
    JsValue::from_serde(value).map_err(|e| JsValue::from_str(&e.to_string()))
}

fn result_to_js(result: Option<ConfirmationResult>) -> Result<JsValue, JsValue> {
    match result {
        Some(result) => JsValue::from_serde(&result).map_err(|e| JsValue::from_str(&e.to_string())),
        None => Ok(JsValue::TRUE),
    }
}

fn checkout_handler(hook: CheckoutResultHook) -> Closure<dyn FnMut(JsValue) -> Promise> {
    Closure::wrap(Box::new(move |arg: JsValue| -> Promise {
        let hook = Rc::clone(&hook);
        // `null` fails to decode as an event and comes back as an error result.
        let raw = arg.into_serde::<Value>().unwrap_or_else(|err| {
            log::error!("checkout event is not JSON: {}", err);
            Value::Null
        });
        future_to_promise(async move { result_to_js(hook(raw).await) })
    }) as Box<dyn FnMut(JsValue) -> Promise>)
}

impl CheckoutHost for JsCheckoutHost {
    fn on_payment_setup(&self, hook: PaymentSetupHook) -> Subscription {
        let handler = Closure::wrap(Box::new(move |_: JsValue| -> Promise {
            let hook = Rc::clone(&hook);
            future_to_promise(async move { json_to_js(&hook().await.to_json()) })
        }) as Box<dyn FnMut(JsValue) -> Promise>);
        self.subscribe("onPaymentSetup", handler)
    }

    fn on_checkout_success(&self, hook: CheckoutResultHook) -> Subscription {
        self.subscribe("onCheckoutSuccess", checkout_handler(hook))
    }

    fn on_checkout_fail(&self, hook: CheckoutResultHook) -> Subscription {
        self.subscribe("onCheckoutFail", checkout_handler(hook))
    }
}
