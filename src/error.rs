//! Error taxonomy shared by every layer of the checkout glue.
//!
//! Only [`GatewayError::Configuration`] is allowed to escape to the page; the
//! checkout hooks convert everything else into a
//! [`ConfirmationResult::Error`](crate::attempt::ConfirmationResult) before
//! handing control back to the host checkout.

use serde::Deserialize;
use thiserror::Error;
use wasm_bindgen::JsValue;

/// Message shown to shoppers when the gateway could not initialise at all.
pub const GENERIC_LOAD_ERROR: &str = "There was an error loading the payment gateway.";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// The request never produced an HTTP response.
    #[error("network error: {0}")]
    Network(String),

    /// The plugin's own REST endpoint answered with a non-2xx status or an
    /// error-shaped body. The message is the backend's, verbatim.
    #[error("{message}")]
    Backend { status: Option<u16>, message: String },

    /// The hosted element reported incomplete or invalid input.
    #[error("{0}")]
    Validation(String),

    /// `confirmPayment`, `confirmSetup`, `createPaymentMethod` or
    /// `handleNextAction` rejected or resolved with an `error` field.
    #[error("{}", .0.message)]
    SdkConfirmation(StripeError),

    /// Server-injected page data is missing or malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl GatewayError {
    /// The text that is safe to put in front of a shopper.
    pub fn shopper_message(&self) -> String {
        match self {
            GatewayError::Configuration(_) => GENERIC_LOAD_ERROR.to_string(),
            GatewayError::Backend { message, .. } => message.clone(),
            GatewayError::Validation(message) => message.clone(),
            GatewayError::SdkConfirmation(err) => err.message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Serialization(err.to_string())
    }
}

impl From<serde_wasm_bindgen::Error> for GatewayError {
    fn from(err: serde_wasm_bindgen::Error) -> Self {
        GatewayError::Serialization(err.to_string())
    }
}

impl From<gloo_net::Error> for GatewayError {
    fn from(err: gloo_net::Error) -> Self {
        GatewayError::Network(err.to_string())
    }
}

impl From<GatewayError> for JsValue {
    fn from(err: GatewayError) -> Self {
        JsValue::from_str(&err.shopper_message())
    }
}

/// Representation of a Stripe.js error object.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct StripeError {
    /// Human-readable message.
    pub message: String,
    /// Stripe's error type, e.g. `"card_error"`.
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    /// Optional Stripe error code, e.g. `"card_declined"`.
    #[serde(default)]
    pub code: Option<String>,
}

impl StripeError {
    pub fn new(message: impl Into<String>) -> Self {
        StripeError {
            message: message.into(),
            error_type: None,
            code: None,
        }
    }

    /// Convert any caught `JsValue` into a `StripeError` with best effort.
    pub fn from_js(value: JsValue) -> Self {
        serde_wasm_bindgen::from_value::<StripeError>(value.clone()).unwrap_or_else(|_| {
            StripeError::new(value.as_string().unwrap_or_else(|| format!("{:?}", value)))
        })
    }
}

impl From<StripeError> for GatewayError {
    fn from(err: StripeError) -> Self {
        GatewayError::SdkConfirmation(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_hidden_from_shoppers() {
        let err = GatewayError::Configuration("missing key".into());
        assert_eq!(err.shopper_message(), GENERIC_LOAD_ERROR);
        assert_eq!(err.to_string(), "configuration error: missing key");
    }

    #[test]
    fn backend_and_sdk_messages_surface_verbatim() {
        let backend = GatewayError::Backend {
            status: Some(400),
            message: "Invalid order.".into(),
        };
        assert_eq!(backend.shopper_message(), "Invalid order.");

        let sdk = GatewayError::from(StripeError::new("Your card was declined."));
        assert_eq!(sdk.to_string(), "Your card was declined.");
    }
}
