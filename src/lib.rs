//! Checkout glue for the Stripe Universal Payment Element in a WooCommerce
//! storefront: config loading, appearance caching, intent lifecycle, the
//! hosted element, the block checkout's event hooks and the classic
//! checkout's confirmation path.

pub mod appearance;
pub mod attempt;
pub mod bindings;
pub mod bridge;
pub mod checkout_component;
pub mod classic;
pub mod client;
pub mod color;
pub mod components;
pub mod config;
pub mod element;
pub mod entry;
pub mod error;
pub mod intent;
pub mod interop;
pub mod logging;
pub mod storage;

pub use attempt::{AttemptEvent, AttemptState, ConfirmationResult, EmitResponse};
pub use bridge::{CheckoutEventBridge, CheckoutHost, PreSubmitResult, Registration};
pub use checkout_component::{HostHandle, UpeBlockCheckout, UpeBlockCheckoutProps};
pub use classic::{
    confirm_card_payment, CheckoutForm, ClassicSubmit, ConfirmIntentApi, ConfirmIntentOutcome,
    PaymentDetails,
};
pub use client::{BillingDetails, StripeSdk};
pub use config::{ConfigProvider, ServerConfig};
pub use error::{GatewayError, StripeError};
pub use intent::{IntentApi, IntentHandle, IntentSlot};
pub use interop::use_stripejs;
