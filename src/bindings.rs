//! Low-level wasm-bindgen bindings to Stripe.js v3.
//!
//! Exposes the raw Stripe.js handles (`JsStripe`, `JsElements`, `JsPaymentElement`)
//! and their async methods via `js_sys::Promise`.
//! The typed wrappers live in `client.rs` and `element.rs`.

use wasm_bindgen::prelude::*;
use web_sys::js_sys::{Function, Promise};

#[wasm_bindgen]
extern "C" {
    //------------------------------------------------------------------------------
    // Core Types
    //------------------------------------------------------------------------------

    /// Raw Stripe.js client handle.
    #[wasm_bindgen(js_name = Stripe)]
    #[derive(Debug, Clone)]
    pub type JsStripe;

    /// Raw Elements group handle.
    #[wasm_bindgen(js_name = Elements)]
    #[derive(Debug, Clone)]
    pub type JsElements;

    /// Raw Payment Element handle.
    #[wasm_bindgen(js_name = PaymentElement)]
    #[derive(Debug, Clone)]
    pub type JsPaymentElement;

    //------------------------------------------------------------------------------
    // Constructors
    //------------------------------------------------------------------------------

    /// ```js
    ///   const stripe = Stripe("pk_test_...", { locale: "en" });
    /// ```
    #[wasm_bindgen(catch, js_name = Stripe)]
    pub fn new_stripe(publishable_key: &str, options: JsValue) -> Result<JsStripe, JsValue>;

    //------------------------------------------------------------------------------
    // Stripe instance
    //------------------------------------------------------------------------------

    /// `stripe.elements({ clientSecret | mode, appearance, ... })`
    #[wasm_bindgen(method, catch, js_name = elements)]
    pub fn elements(this: &JsStripe, options: JsValue) -> Result<JsElements, JsValue>;

    /// `stripe.createPaymentMethod({ elements, params })` → `{ paymentMethod } | { error }`
    #[wasm_bindgen(method, catch, js_name = createPaymentMethod)]
    pub fn create_payment_method(this: &JsStripe, options: JsValue) -> Result<Promise, JsValue>;

    /// `stripe.confirmPayment({ elements, clientSecret, confirmParams, redirect })`
    #[wasm_bindgen(method, catch, js_name = confirmPayment)]
    pub fn confirm_payment(this: &JsStripe, options: JsValue) -> Result<Promise, JsValue>;

    /// `stripe.confirmSetup({ elements, clientSecret, confirmParams, redirect })`
    #[wasm_bindgen(method, catch, js_name = confirmSetup)]
    pub fn confirm_setup(this: &JsStripe, options: JsValue) -> Result<Promise, JsValue>;

    /// `stripe.handleNextAction({ clientSecret })`, runs 3DS and similar challenges.
    #[wasm_bindgen(method, catch, js_name = handleNextAction)]
    pub fn handle_next_action(this: &JsStripe, options: JsValue) -> Result<Promise, JsValue>;

    //------------------------------------------------------------------------------
    // Elements group
    //------------------------------------------------------------------------------

    /// `elements.create("payment", options)`
    #[wasm_bindgen(method, catch, js_name = create)]
    pub fn create_element(
        this: &JsElements,
        element_type: &str,
        options: JsValue,
    ) -> Result<JsPaymentElement, JsValue>;

    /// `elements.submit()` → `{ error? }`, for field validation
    #[wasm_bindgen(method, catch, js_name = submit)]
    pub fn submit(this: &JsElements) -> Result<Promise, JsValue>;

    //------------------------------------------------------------------------------
    // Payment Element
    //------------------------------------------------------------------------------

    /// `paymentElement.mount(selector)`
    #[wasm_bindgen(method, catch, js_name = mount)]
    pub fn mount(this: &JsPaymentElement, selector: &str) -> Result<(), JsValue>;

    /// `paymentElement.unmount()`
    #[wasm_bindgen(method, catch, js_name = unmount)]
    pub fn unmount(this: &JsPaymentElement) -> Result<(), JsValue>;

    /// `paymentElement.on(event, handler)`
    #[wasm_bindgen(method, js_name = on)]
    pub fn on(this: &JsPaymentElement, event: &str, handler: &Function);

    /// `paymentElement.off(event, handler)`
    #[wasm_bindgen(method, js_name = off)]
    pub fn off(this: &JsPaymentElement, event: &str, handler: &Function);
}
