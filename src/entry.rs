//! JavaScript entry points.
//!
//! The plugin's loader script calls one of these:
//!
//! ```js
//! import init, { renderBlockCheckout, startClassicCheckout } from "./wc_stripe_upe.js";
//! await init();
//!
//! // Block checkout: from the payment method's `content` component.
//! const handle = renderBlockCheckout(container, props);
//! handle.update(nextProps);
//! handle.unmount();
//!
//! // Classic checkout.
//! const classic = startClassicCheckout();
//! classic.stop();
//! ```

use std::rc::Rc;

use gloo_utils::format::JsValueSerdeExt;
use serde::Deserialize;
use wasm_bindgen::prelude::*;
use web_sys::js_sys::Reflect;
use yew::prelude::*;
use yew::AppHandle;

use crate::appearance::{
    compute_appearance, AppearanceCache, DomStyleSource, CLASSIC_APPEARANCE_NAMESPACE,
};
use crate::attempt::EmitResponse;
use crate::bridge::JsCheckoutHost;
use crate::checkout_component::{HostHandle, UpeBlockCheckout, UpeBlockCheckoutProps, ELEMENT_CONTAINER_ID};
use crate::classic::{
    ClassicCheckout, ClassicSubmit, ClassicSubmitListener, DomCheckoutForm, StripeConfirmIntentApi,
};
use crate::client::{BillingDetails, CheckoutBillingAddress, StripeSdk};
use crate::components::PaymentNotice;
use crate::config::{ConfigProvider, ServerConfig, SERVER_CONFIG_GLOBAL};
use crate::element::{ElementsOptions, PaymentElementMount};
use crate::error::{GatewayError, GENERIC_LOAD_ERROR};
use crate::intent::{IntentApi, RestIntentClient};
use crate::logging;
use crate::storage::{LocalStorage, SystemClock};

/// Read the page config and bring up logging at the matching verbosity.
/// Fails when the store has the UPE checkout switched off.
fn load_config() -> Result<Rc<ServerConfig>, GatewayError> {
    match ServerConfig::from_window(SERVER_CONFIG_GLOBAL) {
        Ok(config) => {
            logging::init_runtime(config.test_mode);
            config.require_upe()?;
            Ok(Rc::new(config))
        }
        Err(err) => {
            logging::init_runtime(false);
            log::error!("{}", err);
            Err(err)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BlockBilling {
    billing_address: CheckoutBillingAddress,
}

/// The serializable part of the block checkout's payment-method props.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BlockProps {
    emit_response: EmitResponse,
    billing: BlockBilling,
    should_save_payment: bool,
    active_payment_method: String,
}

fn checkout_props(host: &HostHandle, props: &JsValue) -> Result<UpeBlockCheckoutProps, GatewayError> {
    let parsed: BlockProps = props.into_serde()?;
    Ok(UpeBlockCheckoutProps {
        host: host.clone(),
        emit_response: parsed.emit_response,
        billing: BillingDetails::from(&parsed.billing.billing_address),
        should_save_payment: parsed.should_save_payment,
        active_payment_method: parsed.active_payment_method.into(),
    })
}

#[derive(Properties, PartialEq)]
pub struct BlockCheckoutRootProps {
    /// `None` when the page config could not be loaded.
    pub config: Option<Rc<ServerConfig>>,
    pub checkout: UpeBlockCheckoutProps,
}

#[function_component(BlockCheckoutRoot)]
pub fn block_checkout_root(props: &BlockCheckoutRootProps) -> Html {
    match &props.config {
        Some(config) => html! {
            <ConfigProvider context={config.clone()}>
                <UpeBlockCheckout ..props.checkout.clone() />
            </ConfigProvider>
        },
        None => html! { <PaymentNotice message={GENERIC_LOAD_ERROR} /> },
    }
}

/// A rendered block checkout panel.
#[wasm_bindgen]
pub struct BlockCheckoutHandle {
    app: Option<AppHandle<BlockCheckoutRoot>>,
    config: Option<Rc<ServerConfig>>,
    host: HostHandle,
}

#[wasm_bindgen]
impl BlockCheckoutHandle {
    /// Re-render with the host's latest props.
    pub fn update(&mut self, props: JsValue) -> Result<(), JsValue> {
        let checkout = checkout_props(&self.host, &props)?;
        if let Some(app) = self.app.as_mut() {
            app.update(BlockCheckoutRootProps {
                config: self.config.clone(),
                checkout,
            });
        }
        Ok(())
    }

    /// Tear the panel down. Unregisters the checkout hooks and unmounts the
    /// payment element.
    pub fn unmount(&mut self) {
        if let Some(app) = self.app.take() {
            app.destroy();
        }
    }
}

/// Render the payment panel into `root`. `props` are the block checkout's
/// payment-method props (`eventRegistration`, `emitResponse`, `billing`,
/// `shouldSavePayment`, `activePaymentMethod`).
#[wasm_bindgen(js_name = renderBlockCheckout)]
pub fn render_block_checkout(
    root: web_sys::Element,
    props: JsValue,
) -> Result<BlockCheckoutHandle, JsValue> {
    let config = load_config().ok();
    let event_registration = Reflect::get(&props, &JsValue::from_str("eventRegistration"))?;
    let host = HostHandle(Rc::new(JsCheckoutHost::new(event_registration)));
    let checkout = checkout_props(&host, &props)?;

    let app = yew::Renderer::<BlockCheckoutRoot>::with_root_and_props(
        root,
        BlockCheckoutRootProps {
            config: config.clone(),
            checkout,
        },
    )
    .render();

    Ok(BlockCheckoutHandle {
        app: Some(app),
        config,
        host,
    })
}

/// The classic checkout's payment element, its submit interception and its
/// confirmation listener.
#[wasm_bindgen]
pub struct ClassicCheckoutHandle {
    listener: Option<ClassicCheckout>,
    submit: Option<ClassicSubmitListener>,
    mount: Option<PaymentElementMount>,
}

#[wasm_bindgen]
impl ClassicCheckoutHandle {
    pub fn stop(&mut self) {
        self.listener.take();
        self.submit.take();
        self.mount.take();
    }
}

/// Mount the payment element into the classic checkout form, create the
/// payment method when the form is submitted, and handle confirmation
/// directives.
#[wasm_bindgen(js_name = startClassicCheckout)]
pub fn start_classic_checkout() -> Result<ClassicCheckoutHandle, JsValue> {
    let config = load_config()?;

    let source = DomStyleSource::classic();
    let appearance = match LocalStorage::new() {
        Some(store) => AppearanceCache::new(CLASSIC_APPEARANCE_NAMESPACE, store, SystemClock)
            .get_or_compute(&config.theme_name, &source),
        None => compute_appearance(&source),
    };
    let options = ElementsOptions::from_config(&config, Some(appearance));
    let mount = PaymentElementMount::mount(&config, &options, &format!("#{}", ELEMENT_CONTAINER_ID))?;

    let sdk: Rc<dyn StripeSdk> = Rc::new(mount.sdk());
    let window = web_sys::window().ok_or_else(|| GatewayError::Configuration("no window".into()))?;
    let submit = match DomCheckoutForm::find(&window) {
        Some(form) => {
            let element = form.element();
            let submit = ClassicSubmit::new(
                Rc::clone(&config),
                Rc::clone(&sdk),
                mount.state(),
                Rc::new(form),
            );
            Some(ClassicSubmitListener::attach(&window, element, submit)?)
        }
        None => {
            log::warn!("no checkout form on this page; submit is not intercepted");
            None
        }
    };

    let intents: Rc<dyn IntentApi> = Rc::new(RestIntentClient::new(Rc::clone(&config)));
    let listener = ClassicCheckout::listen(Rc::new(StripeConfirmIntentApi::new(sdk, intents)))?;

    Ok(ClassicCheckoutHandle {
        listener: Some(listener),
        submit,
        mount: Some(mount),
    })
}
