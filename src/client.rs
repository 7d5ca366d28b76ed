//! Typed Rust API over the Stripe.js calls the checkout flow needs.
//!
//! This module provides:
//! - `BillingDetails`, assembled from the checkout form and sent with
//!   `createPaymentMethod`/`confirmPayment`/`confirmSetup`.
//! - The [`StripeSdk`] trait: element-group validation, payment-method
//!   creation, intent confirmation and next-action handling.
//! - [`JsStripeSdk`], the Stripe.js implementation of that trait.
//!
//! Every call resolves to `Result<_, StripeError>`: both a rejected promise and
//! a promise resolving to `{ error }` end up in `Err`.
//!
//! # Example Usage
//! ```rust,ignore
//! let sdk = JsStripeSdk::new(stripe, elements);
//! sdk.submit().await?;
//! let method = sdk.create_payment_method(&billing).await?;
//! log::info!("created {}", method.id);
//! ```

use async_trait::async_trait;
use gloo_utils::format::JsValueSerdeExt;
use serde::{Deserialize, Serialize};
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;
use web_sys::js_sys::{Object, Promise, Reflect};

use crate::bindings::{JsElements, JsStripe};
use crate::error::StripeError;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// Stripe's `billing_details` object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BillingDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

/// The block checkout's `billing.billingAddress` shape.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CheckoutBillingAddress {
    pub first_name: String,
    pub last_name: String,
    pub address_1: String,
    pub address_2: String,
    pub city: String,
    pub state: String,
    pub postcode: String,
    pub country: String,
    pub email: String,
    pub phone: String,
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl From<&CheckoutBillingAddress> for BillingDetails {
    fn from(form: &CheckoutBillingAddress) -> Self {
        let name = format!("{} {}", form.first_name.trim(), form.last_name.trim());
        BillingDetails {
            name: non_empty(&name),
            email: non_empty(&form.email),
            phone: non_empty(&form.phone),
            address: Some(Address {
                line1: non_empty(&form.address_1),
                line2: non_empty(&form.address_2),
                city: non_empty(&form.city),
                state: non_empty(&form.state),
                postal_code: non_empty(&form.postcode),
                country: non_empty(&form.country),
            }),
        }
    }
}

/// A payment method created from the hosted element.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PaymentMethodRef {
    pub id: String,
    #[serde(rename = "type", default)]
    pub method_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PaymentMethodData {
    pub billing_details: BillingDetails,
}

/// Stripe's `confirmParams`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConfirmParams {
    pub return_url: String,
    pub payment_method_data: PaymentMethodData,
}

impl ConfirmParams {
    pub fn new(return_url: impl Into<String>, billing_details: BillingDetails) -> Self {
        ConfirmParams {
            return_url: return_url.into(),
            payment_method_data: PaymentMethodData { billing_details },
        }
    }
}

/// The Stripe.js surface used by the checkout flow.
#[async_trait(?Send)]
pub trait StripeSdk {
    /// `elements.submit()`: validates the hosted element.
    async fn submit(&self) -> Result<(), StripeError>;

    async fn create_payment_method(
        &self,
        billing_details: &BillingDetails,
    ) -> Result<PaymentMethodRef, StripeError>;

    async fn confirm_payment(
        &self,
        client_secret: &str,
        params: &ConfirmParams,
    ) -> Result<(), StripeError>;

    async fn confirm_setup(
        &self,
        client_secret: &str,
        params: &ConfirmParams,
    ) -> Result<(), StripeError>;

    async fn handle_next_action(&self, client_secret: &str) -> Result<(), StripeError>;
}

/// [`StripeSdk`] over a live Stripe instance and its Elements group.
#[derive(Clone, Debug)]
pub struct JsStripeSdk {
    stripe: JsStripe,
    elements: JsElements,
}

#[derive(Deserialize)]
struct SdkOutcome {
    #[serde(default)]
    error: Option<StripeError>,
    #[serde(rename = "paymentMethod", default)]
    payment_method: Option<PaymentMethodRef>,
}

impl JsStripeSdk {
    pub fn new(stripe: JsStripe, elements: JsElements) -> Self {
        JsStripeSdk { stripe, elements }
    }

    fn confirm_options(
        &self,
        client_secret: &str,
        params: &ConfirmParams,
    ) -> Result<JsValue, StripeError> {
        let opts = Object::new();
        set(&opts, "elements", self.elements.as_ref())?;
        set(&opts, "clientSecret", &JsValue::from_str(client_secret))?;
        set(&opts, "confirmParams", &to_js(params)?)?;
        set(&opts, "redirect", &JsValue::from_str("if_required"))?;
        Ok(opts.into())
    }
}

#[async_trait(?Send)]
impl StripeSdk for JsStripeSdk {
    async fn submit(&self) -> Result<(), StripeError> {
        settle(self.elements.submit()).await.map(|_| ())
    }

    async fn create_payment_method(
        &self,
        billing_details: &BillingDetails,
    ) -> Result<PaymentMethodRef, StripeError> {
        let params = Object::new();
        set(&params, "billing_details", &to_js(billing_details)?)?;
        let opts = Object::new();
        set(&opts, "elements", self.elements.as_ref())?;
        set(&opts, "params", &params)?;

        settle(self.stripe.create_payment_method(opts.into()))
            .await?
            .payment_method
            .ok_or_else(|| StripeError::new("Stripe returned no payment method."))
    }

    async fn confirm_payment(
        &self,
        client_secret: &str,
        params: &ConfirmParams,
    ) -> Result<(), StripeError> {
        let opts = self.confirm_options(client_secret, params)?;
        settle(self.stripe.confirm_payment(opts)).await.map(|_| ())
    }

    async fn confirm_setup(
        &self,
        client_secret: &str,
        params: &ConfirmParams,
    ) -> Result<(), StripeError> {
        let opts = self.confirm_options(client_secret, params)?;
        settle(self.stripe.confirm_setup(opts)).await.map(|_| ())
    }

    async fn handle_next_action(&self, client_secret: &str) -> Result<(), StripeError> {
        let opts = Object::new();
        set(&opts, "clientSecret", &JsValue::from_str(client_secret))?;
        settle(self.stripe.handle_next_action(opts.into()))
            .await
            .map(|_| ())
    }
}

/// Await a Stripe.js promise and fold `{ error }` results into `Err`.
async fn settle(promise: Result<Promise, JsValue>) -> Result<SdkOutcome, StripeError> {
    let promise = promise.map_err(StripeError::from_js)?;
    let value = JsFuture::from(promise).await.map_err(StripeError::from_js)?;
    if value.is_undefined() || value.is_null() {
        return Ok(SdkOutcome {
            error: None,
            payment_method: None,
        });
    }
    let outcome: SdkOutcome = value
        .into_serde()
        .map_err(|e| StripeError::new(e.to_string()))?;
    match outcome.error {
        Some(err) => Err(err),
        None => Ok(outcome),
    }
}

fn set(target: &Object, key: &str, value: &JsValue) -> Result<(), StripeError> {
    Reflect::set(target, &JsValue::from_str(key), value)
        .map(|_| ())
        .map_err(StripeError::from_js)
}

/// Serialize into a plain JS object (maps become objects, not `Map`s).
pub(crate) fn to_js<T: Serialize>(value: &T) -> Result<JsValue, StripeError> {
    JsValue::from_serde(value).map_err(|e| StripeError::new(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn billing_details_from_checkout_form_drop_blank_fields() {
        let form = CheckoutBillingAddress {
            first_name: "Ada".into(),
            last_name: " Lovelace ".into(),
            email: "ada@example.com".into(),
            country: "GB".into(),
            postcode: "N1 9GU".into(),
            ..Default::default()
        };
        let details = BillingDetails::from(&form);
        assert_eq!(details.name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(details.phone, None);

        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["address"]["postal_code"], "N1 9GU");
        assert!(json["address"].get("line1").is_none());
        assert!(json.get("phone").is_none());
    }

    #[test]
    fn confirm_params_use_stripe_field_names() {
        let params = ConfirmParams::new("https://shop.example/return", BillingDetails::default());
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["return_url"], "https://shop.example/return");
        assert!(json["payment_method_data"]["billing_details"].is_object());
    }

    #[test]
    fn empty_name_is_omitted() {
        let details = BillingDetails::from(&CheckoutBillingAddress::default());
        assert_eq!(details.name, None);
    }
}
