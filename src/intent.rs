//! Payment/setup intent lifecycle against the plugin backend.
//!
//! [`IntentApi`] is the RPC surface, [`RestIntentClient`] its `gloo-net`
//! implementation, and [`IntentSlot`] the per-page guard that keeps repeated
//! renders from creating more than one intent.

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use gloo_net::http::Request;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::attempt::{ConfirmationResult, EmitResponse};
use crate::client::{BillingDetails, ConfirmParams, StripeSdk};
use crate::config::ServerConfig;
use crate::error::GatewayError;

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct IntentHandle {
    pub id: String,
    pub client_secret: String,
    /// `false` for setup intents: nothing is charged now.
    #[serde(default = "default_payment_needed")]
    pub payment_needed: bool,
}

fn default_payment_needed() -> bool {
    true
}

#[async_trait(?Send)]
pub trait IntentApi {
    /// Create a payment intent, attached to `order_id` when one exists.
    async fn create_intent(&self, order_id: Option<u64>) -> Result<IntentHandle, GatewayError>;

    /// Create a setup intent for carts with nothing chargeable.
    async fn init_setup_intent(&self) -> Result<IntentHandle, GatewayError>;

    /// Record the chosen payment type and save preference before confirming.
    async fn update_intent(
        &self,
        intent_id: &str,
        order_id: Option<u64>,
        save_payment_method: bool,
        selected_type: &str,
    ) -> Result<(), GatewayError>;

    /// Ask the backend to finish an order after the SDK handled the
    /// additional-authentication step. Resolves to the final redirect URL.
    async fn verify_intent(
        &self,
        order_id: u64,
        nonce: &str,
        payment_method_to_save: Option<&str>,
    ) -> Result<String, GatewayError>;
}

/// [`IntentApi`] over the plugin's REST routes.
pub struct RestIntentClient {
    config: Rc<ServerConfig>,
}

#[derive(Serialize)]
struct UpdateIntentBody<'a> {
    order_id: Option<u64>,
    save_payment_method: bool,
    selected_upe_payment_type: &'a str,
}

#[derive(Deserialize)]
struct VerifyIntentResponse {
    return_url: String,
}

impl RestIntentClient {
    pub fn new(config: Rc<ServerConfig>) -> Self {
        RestIntentClient { config }
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, GatewayError> {
        let url = self.config.rest_url(path);
        log::debug!("POST {}", url);
        let response = Request::post(&url)
            .header("X-WP-Nonce", &self.config.nonce)
            .json(body)?
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if !response.ok() {
            return Err(backend_error(Some(status), &text));
        }
        parse_success(&text)
    }
}

#[async_trait(?Send)]
impl IntentApi for RestIntentClient {
    async fn create_intent(&self, order_id: Option<u64>) -> Result<IntentHandle, GatewayError> {
        self.post("intent", &json!({ "order_id": order_id })).await
    }

    async fn init_setup_intent(&self) -> Result<IntentHandle, GatewayError> {
        let mut handle: IntentHandle = self.post("setup-intent", &json!({})).await?;
        handle.payment_needed = false;
        Ok(handle)
    }

    async fn update_intent(
        &self,
        intent_id: &str,
        order_id: Option<u64>,
        save_payment_method: bool,
        selected_type: &str,
    ) -> Result<(), GatewayError> {
        let body = UpdateIntentBody {
            order_id,
            save_payment_method,
            selected_upe_payment_type: selected_type,
        };
        let _: Value = self.post(&format!("intent/{}", intent_id), &body).await?;
        Ok(())
    }

    async fn verify_intent(
        &self,
        order_id: u64,
        nonce: &str,
        payment_method_to_save: Option<&str>,
    ) -> Result<String, GatewayError> {
        let body = json!({
            "nonce": nonce,
            "payment_method_to_save": payment_method_to_save,
        });
        let response: VerifyIntentResponse = self
            .post(&format!("orders/{}/verify-intent", order_id), &body)
            .await?;
        Ok(response.return_url)
    }
}

/// Decode a 2xx body, still treating `{ "success": false }` as an error.
fn parse_success<T: DeserializeOwned>(text: &str) -> Result<T, GatewayError> {
    let value: Value = serde_json::from_str(text)?;
    if value.get("success") == Some(&Value::Bool(false)) {
        return Err(backend_error(None, text));
    }
    // WC-AJAX wraps payloads in `{ success, data }`.
    let payload = match value.get("data") {
        Some(data) if value.get("success").is_some() => data.clone(),
        _ => value,
    };
    Ok(serde_json::from_value(payload)?)
}

/// Pull the message out of a WP-REST or WC-AJAX error body.
pub(crate) fn backend_error(status: Option<u16>, body: &str) -> GatewayError {
    let message = serde_json::from_str::<Value>(body).ok().and_then(|value| {
        ["/message", "/data/error/message", "/data/message", "/error/message"]
            .iter()
            .find_map(|pointer| value.pointer(pointer)?.as_str().map(str::to_string))
    });
    let message = message.unwrap_or_else(|| match status {
        Some(status) => format!("The payment request failed (HTTP {}).", status),
        None => "The payment request failed.".to_string(),
    });
    GatewayError::Backend { status, message }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum SlotState {
    #[default]
    Empty,
    /// A create call is in flight.
    Requested,
    Ready(IntentHandle),
    /// Creation failed. Not retried until a new attempt starts.
    Failed(String),
    /// Handed to a confirmation; its client secret must not be reused.
    Consumed,
}

/// Holds the one live intent of the current attempt.
#[derive(Debug, Default)]
pub struct IntentSlot {
    state: RefCell<SlotState>,
}

impl IntentSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SlotState {
        self.state.borrow().clone()
    }

    pub fn has_requested_intent(&self) -> bool {
        !matches!(*self.state.borrow(), SlotState::Empty)
    }

    /// Return the live intent, creating one if none was requested yet.
    ///
    /// `Ok(None)` means a request is already pending, already failed, or the
    /// previous intent was consumed. No second create call is made in any of
    /// those cases.
    pub async fn ensure(
        &self,
        api: &dyn IntentApi,
        config: &ServerConfig,
    ) -> Result<Option<IntentHandle>, GatewayError> {
        match &*self.state.borrow() {
            SlotState::Ready(handle) => return Ok(Some(handle.clone())),
            SlotState::Requested | SlotState::Failed(_) | SlotState::Consumed => return Ok(None),
            SlotState::Empty => {}
        }
        *self.state.borrow_mut() = SlotState::Requested;

        let created = if config.needs_setup_intent() {
            api.init_setup_intent().await
        } else {
            api.create_intent(config.order_id).await
        };

        match created {
            Ok(handle) => {
                log::debug!("intent {} ready", handle.id);
                *self.state.borrow_mut() = SlotState::Ready(handle.clone());
                Ok(Some(handle))
            }
            Err(err) => {
                log::error!("intent creation failed: {}", err);
                *self.state.borrow_mut() = SlotState::Failed(err.shopper_message());
                Err(err)
            }
        }
    }

    pub fn current(&self) -> Option<IntentHandle> {
        match &*self.state.borrow() {
            SlotState::Ready(handle) => Some(handle.clone()),
            _ => None,
        }
    }

    /// Take the live intent for confirmation.
    pub fn consume(&self) -> Option<IntentHandle> {
        let handle = self.current()?;
        *self.state.borrow_mut() = SlotState::Consumed;
        Some(handle)
    }

    pub fn pending_error(&self) -> Option<String> {
        match &*self.state.borrow() {
            SlotState::Failed(message) => Some(message.clone()),
            _ => None,
        }
    }

    /// Allow a fresh intent once the previous one was used or failed.
    pub fn begin_new_attempt(&self) {
        let mut state = self.state.borrow_mut();
        if matches!(*state, SlotState::Consumed | SlotState::Failed(_)) {
            *state = SlotState::Empty;
        }
    }
}

/// Confirm `intent` with the mounted element: `confirmPayment` when money
/// moves now, `confirmSetup` otherwise. Never retried here; any challenge
/// or redirect is Stripe.js's business.
pub async fn confirm_payment_or_setup(
    sdk: &dyn StripeSdk,
    intent: &IntentHandle,
    billing_details: &BillingDetails,
    is_payment_needed: bool,
    return_url: &str,
    emit_response: &EmitResponse,
) -> ConfirmationResult {
    let params = ConfirmParams::new(return_url, billing_details.clone());
    let confirmed = if is_payment_needed {
        sdk.confirm_payment(&intent.client_secret, &params).await
    } else {
        sdk.confirm_setup(&intent.client_secret, &params).await
    };
    match confirmed {
        Ok(()) => ConfirmationResult::success(return_url),
        Err(err) => {
            log::warn!("intent {} not confirmed: {}", intent.id, err.message);
            ConfirmationResult::payments_error(err.message, emit_response)
        }
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::config::tests::sample;
    use std::cell::Cell;

    #[derive(Default)]
    struct CountingApi {
        creates: Cell<usize>,
        setups: Cell<usize>,
        fail: bool,
    }

    #[async_trait(?Send)]
    impl IntentApi for CountingApi {
        async fn create_intent(&self, order_id: Option<u64>) -> Result<IntentHandle, GatewayError> {
            self.creates.set(self.creates.get() + 1);
            if self.fail {
                return Err(GatewayError::Backend {
                    status: Some(500),
                    message: "Stripe is down.".into(),
                });
            }
            Ok(IntentHandle {
                id: format!("pi_{}_{}", order_id.unwrap_or(0), self.creates.get()),
                client_secret: "pi_secret".into(),
                payment_needed: true,
            })
        }

        async fn init_setup_intent(&self) -> Result<IntentHandle, GatewayError> {
            self.setups.set(self.setups.get() + 1);
            Ok(IntentHandle {
                id: "seti_1".into(),
                client_secret: "seti_secret".into(),
                payment_needed: false,
            })
        }

        async fn update_intent(
            &self,
            _: &str,
            _: Option<u64>,
            _: bool,
            _: &str,
        ) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn verify_intent(
            &self,
            _: u64,
            _: &str,
            _: Option<&str>,
        ) -> Result<String, GatewayError> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn repeated_renders_create_one_intent() {
        let api = CountingApi::default();
        let slot = IntentSlot::new();
        let config = sample();

        let (first, second) = futures::join!(slot.ensure(&api, &config), slot.ensure(&api, &config));
        assert!(first.unwrap().is_some() || second.unwrap().is_some());
        for _ in 0..5 {
            slot.ensure(&api, &config).await.unwrap();
        }
        assert_eq!(api.creates.get(), 1);
        assert!(slot.has_requested_intent());
        assert_eq!(slot.current().unwrap().id, "pi_42_1");
    }

    #[tokio::test]
    async fn zero_total_carts_get_a_setup_intent() {
        let api = CountingApi::default();
        let slot = IntentSlot::new();
        let mut config = sample();
        config.cart_total = 0;

        let handle = slot.ensure(&api, &config).await.unwrap().unwrap();
        assert!(!handle.payment_needed);
        assert_eq!((api.creates.get(), api.setups.get()), (0, 1));
    }

    #[tokio::test]
    async fn failures_are_not_retried_until_a_new_attempt() {
        let api = CountingApi {
            fail: true,
            ..Default::default()
        };
        let slot = IntentSlot::new();
        let config = sample();

        assert!(slot.ensure(&api, &config).await.is_err());
        assert_eq!(slot.ensure(&api, &config).await.unwrap(), None);
        assert_eq!(slot.pending_error().as_deref(), Some("Stripe is down."));
        assert_eq!(api.creates.get(), 1);

        slot.begin_new_attempt();
        assert!(slot.ensure(&api, &config).await.is_err());
        assert_eq!(api.creates.get(), 2);
    }

    #[tokio::test]
    async fn consumed_secrets_are_never_handed_out_again() {
        let api = CountingApi::default();
        let slot = IntentSlot::new();
        let config = sample();

        let first = slot.ensure(&api, &config).await.unwrap().unwrap();
        assert_eq!(slot.consume(), Some(first.clone()));
        assert_eq!(slot.consume(), None);
        assert_eq!(slot.ensure(&api, &config).await.unwrap(), None);

        slot.begin_new_attempt();
        let second = slot.ensure(&api, &config).await.unwrap().unwrap();
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn backend_error_bodies_surface_their_message() {
        let rest = backend_error(Some(400), r#"{"code":"wc_stripe_error","message":"Invalid order."}"#);
        assert_eq!(rest.shopper_message(), "Invalid order.");

        let ajax = backend_error(None, r#"{"success":false,"data":{"error":{"message":"Nonce expired."}}}"#);
        assert_eq!(ajax.shopper_message(), "Nonce expired.");

        let html = backend_error(Some(502), "<html>Bad Gateway</html>");
        assert_eq!(html.shopper_message(), "The payment request failed (HTTP 502).");
    }

    #[test]
    fn success_bodies_are_unwrapped() {
        let handle: IntentHandle =
            parse_success(r#"{"id":"pi_1","client_secret":"cs"}"#).unwrap();
        assert!(handle.payment_needed);

        let wrapped: IntentHandle = parse_success(
            r#"{"success":true,"data":{"id":"seti_1","client_secret":"cs","payment_needed":false}}"#,
        )
        .unwrap();
        assert!(!wrapped.payment_needed);

        let err = parse_success::<IntentHandle>(r#"{"success":false,"data":{"message":"No."}}"#)
            .unwrap_err();
        assert_eq!(err.shopper_message(), "No.");
    }
}
