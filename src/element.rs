//! Mounting and observing the hosted Payment Element.
//!
//! [`PaymentElementMount`] owns the Stripe instance, the Elements group and the
//! element itself. It is the only writer of [`PaymentElementState`], which it
//! updates from the element's `change` events. Dropping the mount detaches
//! the listener and unmounts the element.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use gloo_utils::format::JsValueSerdeExt;
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::Closure;
use wasm_bindgen::{JsCast, JsValue};

use crate::appearance::Appearance;
use crate::bindings::{new_stripe, JsElements, JsPaymentElement, JsStripe};
use crate::client::{to_js, JsStripeSdk, StripeSdk};
use crate::config::ServerConfig;
use crate::error::{GatewayError, StripeError};

/// Visibility of one billing field inside the hosted element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldVisibility {
    /// The store's own form collects it already.
    Never,
    Auto,
}

impl FieldVisibility {
    fn collected_by_store(enabled: &BTreeSet<String>, fields: &[&str]) -> Self {
        if fields.iter().any(|field| enabled.contains(*field)) {
            FieldVisibility::Never
        } else {
            FieldVisibility::Auto
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressFields {
    pub country: FieldVisibility,
    pub line1: FieldVisibility,
    pub line2: FieldVisibility,
    pub city: FieldVisibility,
    pub state: FieldVisibility,
    pub postal_code: FieldVisibility,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BillingDetailsFields {
    pub name: FieldVisibility,
    pub email: FieldVisibility,
    pub phone: FieldVisibility,
    pub address: AddressFields,
}

/// The Payment Element's `fields` option.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldsOptions {
    pub billing_details: BillingDetailsFields,
}

/// Hide every billing field the store already collects.
pub fn fields_options(enabled_billing_fields: &BTreeSet<String>) -> FieldsOptions {
    let vis = |fields: &[&str]| FieldVisibility::collected_by_store(enabled_billing_fields, fields);
    FieldsOptions {
        billing_details: BillingDetailsFields {
            name: vis(&["billing_first_name", "billing_last_name"]),
            email: vis(&["billing_email"]),
            phone: vis(&["billing_phone"]),
            address: AddressFields {
                country: vis(&["billing_country"]),
                line1: vis(&["billing_address_1"]),
                line2: vis(&["billing_address_2"]),
                city: vis(&["billing_city"]),
                state: vis(&["billing_state"]),
                postal_code: vis(&["billing_postcode"]),
            },
        },
    }
}

/// Options for `stripe.elements(...)` in deferred-intent mode.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementsOptions {
    /// `"payment"` or `"setup"`.
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    pub currency: String,
    /// Required for `createPaymentMethod` with an Elements group.
    pub payment_method_creation: String,
    pub payment_method_types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appearance: Option<Appearance>,
}

impl ElementsOptions {
    pub fn from_config(config: &ServerConfig, appearance: Option<Appearance>) -> Self {
        let setup = config.needs_setup_intent();
        ElementsOptions {
            mode: if setup { "setup" } else { "payment" }.to_string(),
            amount: (!setup).then_some(config.cart_total),
            currency: config.currency.to_ascii_lowercase(),
            payment_method_creation: "manual".to_string(),
            payment_method_types: config.enabled_payment_method_types(),
            appearance,
        }
    }
}

/// Options for `elements.create("payment", ...)`.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentElementOptions {
    pub fields: FieldsOptions,
    /// Wallets are offered by the express checkout, not here.
    pub wallets: serde_json::Value,
    /// Layout style: `"tabs"` or `"accordion"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
}

impl PaymentElementOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        PaymentElementOptions {
            fields: fields_options(&config.enabled_billing_fields),
            wallets: serde_json::json!({ "applePay": "never", "googlePay": "never" }),
            layout: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ChangeValue {
    #[serde(rename = "type", default)]
    pub method_type: String,
}

/// Payload of the element's `change` event, as far as we read it.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ElementChangeEvent {
    #[serde(default)]
    pub complete: bool,
    #[serde(default)]
    pub value: Option<ChangeValue>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PaymentElementState {
    pub is_complete: bool,
    pub selected_payment_method_type: String,
}

impl PaymentElementState {
    pub fn apply(&mut self, event: &ElementChangeEvent) {
        self.is_complete = event.complete;
        if let Some(value) = &event.value {
            if !value.method_type.is_empty() {
                self.selected_payment_method_type = value.method_type.clone();
            }
        }
    }
}

/// Read-only view of the element state handed to the checkout hooks.
#[derive(Clone, Debug, Default)]
pub struct ElementStateHandle(Rc<RefCell<PaymentElementState>>);

impl ElementStateHandle {
    pub fn snapshot(&self) -> PaymentElementState {
        self.0.borrow().clone()
    }

    pub(crate) fn apply(&self, event: &ElementChangeEvent) {
        self.0.borrow_mut().apply(event);
    }
}

pub struct PaymentElementMount {
    sdk: JsStripeSdk,
    element: JsPaymentElement,
    state: ElementStateHandle,
    on_change: Closure<dyn FnMut(JsValue)>,
}

impl PaymentElementMount {
    /// Create Stripe and Elements, build the Payment Element and mount it
    /// into `selector`.
    pub fn mount(
        config: &ServerConfig,
        elements_options: &ElementsOptions,
        selector: &str,
    ) -> Result<Self, GatewayError> {
        let stripe_options = to_js(&serde_json::json!({ "locale": config.locale }))?;
        let stripe: JsStripe =
            new_stripe(&config.key, stripe_options).map_err(StripeError::from_js)?;
        let elements: JsElements = stripe
            .elements(to_js(elements_options)?)
            .map_err(StripeError::from_js)?;
        let element = elements
            .create_element("payment", to_js(&PaymentElementOptions::from_config(config))?)
            .map_err(StripeError::from_js)?;

        let state = ElementStateHandle::default();
        let on_change = {
            let state = state.clone();
            Closure::wrap(Box::new(move |event: JsValue| {
                match event.into_serde::<ElementChangeEvent>() {
                    Ok(change) => state.apply(&change),
                    Err(err) => log::warn!("unreadable change event: {}", err),
                }
            }) as Box<dyn FnMut(JsValue)>)
        };
        element.on("change", on_change.as_ref().unchecked_ref());
        element.mount(selector).map_err(StripeError::from_js)?;
        log::debug!("payment element mounted into {}", selector);

        Ok(PaymentElementMount {
            sdk: JsStripeSdk::new(stripe, elements),
            element,
            state,
            on_change,
        })
    }

    pub fn state(&self) -> ElementStateHandle {
        self.state.clone()
    }

    pub fn sdk(&self) -> JsStripeSdk {
        self.sdk.clone()
    }
}

impl Drop for PaymentElementMount {
    fn drop(&mut self) {
        self.element
            .off("change", self.on_change.as_ref().unchecked_ref());
        if let Err(err) = self.element.unmount() {
            log::warn!("payment element unmount failed: {:?}", err);
        }
    }
}

/// Run the element group's own validation. Must precede payment-method
/// creation.
pub async fn validate(sdk: &dyn StripeSdk) -> Result<(), GatewayError> {
    sdk.submit()
        .await
        .map_err(|err| GatewayError::Validation(err.message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample;

    fn enabled(fields: &[&str]) -> BTreeSet<String> {
        fields.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn collected_fields_are_hidden() {
        let options = fields_options(&enabled(&["billing_email", "billing_postcode"]));
        let billing = &options.billing_details;
        assert_eq!(billing.email, FieldVisibility::Never);
        assert_eq!(billing.address.postal_code, FieldVisibility::Never);
        assert_eq!(billing.name, FieldVisibility::Auto);
        assert_eq!(billing.phone, FieldVisibility::Auto);
        assert_eq!(billing.address.line1, FieldVisibility::Auto);
    }

    #[test]
    fn either_name_part_hides_the_name() {
        let options = fields_options(&enabled(&["billing_last_name"]));
        assert_eq!(options.billing_details.name, FieldVisibility::Never);
    }

    #[test]
    fn fields_serialize_with_stripe_names() {
        let json = serde_json::to_value(fields_options(&enabled(&["billing_postcode"]))).unwrap();
        assert_eq!(json["billingDetails"]["address"]["postalCode"], "never");
        assert_eq!(json["billingDetails"]["phone"], "auto");
    }

    #[test]
    fn change_events_update_state() {
        let mut state = PaymentElementState::default();
        let event: ElementChangeEvent = serde_json::from_str(
            r#"{ "elementType": "payment", "complete": true, "value": { "type": "sepa_debit" } }"#,
        )
        .unwrap();
        state.apply(&event);
        assert!(state.is_complete);
        assert_eq!(state.selected_payment_method_type, "sepa_debit");

        state.apply(&ElementChangeEvent::default());
        assert!(!state.is_complete);
        assert_eq!(state.selected_payment_method_type, "sepa_debit");
    }

    #[test]
    fn elements_options_follow_the_cart() {
        let config = sample();
        let options = ElementsOptions::from_config(&config, None);
        assert_eq!(options.mode, "payment");
        assert_eq!(options.amount, Some(4200));
        assert_eq!(options.currency, "usd");
        assert_eq!(options.payment_method_types, vec!["card", "klarna"]);

        let mut free = config;
        free.cart_total = 0;
        let options = ElementsOptions::from_config(&free, None);
        assert_eq!(options.mode, "setup");
        assert_eq!(options.amount, None);
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["paymentMethodCreation"], "manual");
        assert!(json.get("amount").is_none());
    }
}
