//! Server-injected page configuration.
//!
//! The backend prints a JSON object into a page global before the bundle
//! loads. It is read exactly once, validated, and from then on handed around
//! as an `Rc<ServerConfig>`: explicitly to plain functions, and through
//! [`ConfigProvider`] to Yew components.

use std::collections::BTreeSet;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::Deserialize;
use wasm_bindgen::JsValue;
use web_sys::js_sys::Reflect;
use yew::prelude::*;

use crate::error::GatewayError;

/// Name of the page global the backend writes the config into.
pub const SERVER_CONFIG_GLOBAL: &str = "wc_stripe_upe_params";

/// Gateway id the host checkout uses for this plugin's payment method.
pub const GATEWAY_ID: &str = "stripe";

const LINK_FEATURE_FLAG: &str = "isStripeLinkEnabled";

/// Per payment-method-type settings.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodConfig {
    /// Whether the method can be saved for later off-session use.
    #[serde(default)]
    pub is_reusable: bool,
    /// ISO country codes the method is restricted to. Empty means any.
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub testing_instructions: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ServerConfig {
    /// Publishable key.
    pub key: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(rename = "testMode", default)]
    pub test_mode: bool,
    #[serde(rename = "isUPEEnabled", default)]
    pub is_upe_enabled: bool,
    /// Keyed by method type, in the merchant's display order.
    #[serde(rename = "paymentMethodsConfig", default)]
    pub payment_methods_config: IndexMap<String, PaymentMethodConfig>,
    /// Cart total in the currency's minor unit.
    #[serde(rename = "cartTotal", default)]
    pub cart_total: u64,
    pub currency: String,
    #[serde(rename = "orderId", default)]
    pub order_id: Option<u64>,
    #[serde(rename = "isOrderPay", default)]
    pub is_order_pay: bool,
    #[serde(rename = "isPaymentNeeded", default = "default_true")]
    pub is_payment_needed: bool,
    #[serde(rename = "enabledBillingFields", default)]
    pub enabled_billing_fields: BTreeSet<String>,
    #[serde(default)]
    pub theme_name: String,
    #[serde(rename = "featureFlags", default)]
    pub feature_flags: IndexMap<String, bool>,
    /// REST route prefix, e.g. `/wp-json/wc/v3/wc_stripe`.
    #[serde(rename = "restNamespace", default = "default_namespace")]
    pub rest_namespace: String,
    /// `X-WP-Nonce` value for authenticated REST calls.
    #[serde(default)]
    pub nonce: String,
    #[serde(rename = "genericErrorMessage", default)]
    pub generic_error_message: Option<String>,
}

fn default_locale() -> String {
    "auto".to_string()
}

fn default_true() -> bool {
    true
}

fn default_namespace() -> String {
    "/wp-json/wc/v3/wc_stripe".to_string()
}

impl ServerConfig {
    /// Read and validate the config from `window[global]`.
    pub fn from_window(global: &str) -> Result<Self, GatewayError> {
        let window = web_sys::window()
            .ok_or_else(|| GatewayError::Configuration("no window".into()))?;
        let raw = Reflect::get(&window, &JsValue::from_str(global))
            .map_err(|_| GatewayError::Configuration(format!("cannot read `{global}`")))?;
        if raw.is_undefined() || raw.is_null() {
            return Err(GatewayError::Configuration(format!(
                "`{global}` was not injected into the page"
            )));
        }
        let config: ServerConfig = serde_wasm_bindgen::from_value(raw)
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, GatewayError> {
        let config: ServerConfig = serde_json::from_str(json)
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.key.trim().is_empty() {
            return Err(GatewayError::Configuration("publishable key is empty".into()));
        }
        if self.currency.trim().is_empty() {
            return Err(GatewayError::Configuration("currency is empty".into()));
        }
        if self.is_order_pay && self.order_id.is_none() {
            return Err(GatewayError::Configuration(
                "order-pay page without an order id".into(),
            ));
        }
        Ok(())
    }

    pub fn payment_method(&self, method_type: &str) -> Option<&PaymentMethodConfig> {
        self.payment_methods_config.get(method_type)
    }

    /// Types the hosted element should offer, in config order. Link is only
    /// offered while its feature flag is on.
    pub fn enabled_payment_method_types(&self) -> Vec<String> {
        let link_enabled = self.feature_enabled(LINK_FEATURE_FLAG);
        self.payment_methods_config
            .keys()
            .filter(|method| link_enabled || method.as_str() != "link")
            .cloned()
            .collect()
    }

    pub fn require_upe(&self) -> Result<(), GatewayError> {
        if self.is_upe_enabled {
            Ok(())
        } else {
            Err(GatewayError::Configuration(
                "the Stripe payment element is disabled for this store".into(),
            ))
        }
    }

    pub fn is_reusable(&self, method_type: &str) -> bool {
        self.payment_method(method_type)
            .map(|m| m.is_reusable)
            .unwrap_or(false)
    }

    pub fn feature_enabled(&self, flag: &str) -> bool {
        self.feature_flags.get(flag).copied().unwrap_or(false)
    }

    /// A setup intent replaces the payment intent when nothing will be
    /// charged now, or when the total is below what Stripe can charge.
    pub fn needs_setup_intent(&self) -> bool {
        !self.is_payment_needed || self.cart_total < minimum_charge_amount(&self.currency)
    }

    pub fn generic_error(&self) -> String {
        self.generic_error_message
            .clone()
            .unwrap_or_else(|| crate::error::GENERIC_LOAD_ERROR.to_string())
    }

    pub fn rest_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.rest_namespace.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Stripe's minimum chargeable amount in minor units.
pub fn minimum_charge_amount(currency: &str) -> u64 {
    match currency.to_ascii_lowercase().as_str() {
        "usd" | "eur" | "aud" | "brl" | "cad" | "chf" | "inr" | "nzd" | "sgd" => 50,
        "gbp" => 30,
        "dkk" => 250,
        "nok" | "sek" => 300,
        "hkd" => 400,
        "mxn" => 1000,
        "czk" => 1500,
        "pln" => 200,
        "ron" => 200,
        "bgn" => 100,
        "huf" => 17500,
        "jpy" => 50,
        "thb" => 1000,
        "myr" => 200,
        "aed" => 200,
        _ => 50,
    }
}

/// Yew context carrying the config to components.
pub type ConfigProvider = ContextProvider<Rc<ServerConfig>>;

/// Read the config context. Components are only mounted under a
/// [`ConfigProvider`], so a missing context is a configuration bug.
#[hook]
pub fn use_server_config() -> Result<Rc<ServerConfig>, GatewayError> {
    use_context::<Rc<ServerConfig>>()
        .ok_or_else(|| GatewayError::Configuration("server config context missing".into()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"{
        "key": "pk_test_123",
        "locale": "en",
        "testMode": true,
        "isUPEEnabled": true,
        "paymentMethodsConfig": {
            "card": { "isReusable": true, "countries": [], "title": "Card", "testingInstructions": "Use 4242" },
            "klarna": { "isReusable": false, "countries": ["US"], "title": "Klarna" }
        },
        "cartTotal": 4200,
        "currency": "USD",
        "orderId": 42,
        "enabledBillingFields": ["billing_email", "billing_first_name"],
        "theme_name": "storefront",
        "featureFlags": { "isStripeLinkEnabled": true }
    }"#;

    pub(crate) fn sample() -> ServerConfig {
        ServerConfig::from_json(SAMPLE).unwrap()
    }

    #[test]
    fn parses_injected_fields() {
        let config = sample();
        assert_eq!(config.key, "pk_test_123");
        assert!(config.test_mode);
        assert!(config.is_payment_needed);
        assert!(config.is_reusable("card"));
        assert!(!config.is_reusable("klarna"));
        assert!(!config.is_reusable("sepa_debit"));
        assert!(config.feature_enabled("isStripeLinkEnabled"));
        assert!(!config.feature_enabled("somethingElse"));
        assert_eq!(config.theme_name, "storefront");
        assert_eq!(config.rest_namespace, "/wp-json/wc/v3/wc_stripe");
        assert_eq!(
            config.rest_url("/intent/pi_1"),
            "/wp-json/wc/v3/wc_stripe/intent/pi_1"
        );
    }

    #[test]
    fn payment_methods_keep_the_merchant_order() {
        let config = ServerConfig::from_json(
            r#"{
                "key": "pk", "currency": "USD",
                "paymentMethodsConfig": { "sepa_debit": {}, "card": {}, "link": {}, "ideal": {} },
                "featureFlags": { "isStripeLinkEnabled": true }
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.enabled_payment_method_types(),
            vec!["sepa_debit", "card", "link", "ideal"]
        );

        let mut without_link = config.clone();
        without_link.feature_flags.clear();
        assert_eq!(
            without_link.enabled_payment_method_types(),
            vec!["sepa_debit", "card", "ideal"]
        );
    }

    #[test]
    fn disabled_upe_is_refused() {
        let mut config = sample();
        assert!(config.require_upe().is_ok());
        config.is_upe_enabled = false;
        assert!(matches!(
            config.require_upe(),
            Err(GatewayError::Configuration(_))
        ));
        let unset = ServerConfig::from_json(r#"{ "key": "pk", "currency": "USD" }"#).unwrap();
        assert!(unset.require_upe().is_err());
    }

    #[test]
    fn missing_key_is_a_configuration_error() {
        let err = ServerConfig::from_json(r#"{ "key": "", "currency": "USD" }"#).unwrap_err();
        assert!(matches!(err, GatewayError::Configuration(_)));
    }

    #[test]
    fn order_pay_requires_order_id() {
        let err = ServerConfig::from_json(
            r#"{ "key": "pk", "currency": "USD", "isOrderPay": true }"#,
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::Configuration(_)));
    }

    #[test]
    fn setup_intent_below_minimum_or_when_nothing_is_charged() {
        let mut config = sample();
        assert!(!config.needs_setup_intent());

        config.cart_total = 0;
        assert!(config.needs_setup_intent());

        config.cart_total = 29;
        config.currency = "GBP".into();
        assert!(config.needs_setup_intent());
        config.cart_total = 30;
        assert!(!config.needs_setup_intent());

        config.is_payment_needed = false;
        assert!(config.needs_setup_intent());
    }
}
