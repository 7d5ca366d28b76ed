//! Loading Stripe.js at runtime.
//!
//! `use_stripejs()` injects a single
//! `<script id="stripejs-sdk" src="https://js.stripe.com/v3/">` into `<head>`
//! on first use. It reports [`StripeJsStatus::Loading`] until the script's
//! `load` event fires (or `window.Stripe` already exists), and
//! [`StripeJsStatus::Failed`] when the script cannot be fetched, so the
//! checkout can surface the load error instead of waiting forever. A tag
//! that was already on the page may have failed before anyone listened, so
//! loading also gives up after [`LOAD_TIMEOUT_MS`].

use gloo_timers::callback::Timeout;
use wasm_bindgen::{prelude::Closure, JsCast, JsValue};
use web_sys::js_sys::Reflect;
use web_sys::{Document, Element, HtmlScriptElement};
use yew::prelude::*;

pub const STRIPE_JS_URL: &str = "https://js.stripe.com/v3/";
pub const SCRIPT_ID: &str = "stripejs-sdk";
pub const LOAD_TIMEOUT_MS: u32 = 20_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StripeJsStatus {
    Loading,
    Ready,
    Failed,
}

impl StripeJsStatus {
    pub fn is_ready(self) -> bool {
        self == StripeJsStatus::Ready
    }
}

/// Whether `window.Stripe` is defined.
pub fn stripe_js_present() -> bool {
    web_sys::window()
        .and_then(|win| Reflect::has(&win, &JsValue::from_str("Stripe")).ok())
        .unwrap_or(false)
}

fn script_tag(document: &Document) -> Result<Element, JsValue> {
    if let Some(existing) = document.get_element_by_id(SCRIPT_ID) {
        return Ok(existing);
    }
    let script: HtmlScriptElement = document.create_element("script")?.dyn_into()?;
    script.set_id(SCRIPT_ID);
    script.set_src(STRIPE_JS_URL);
    let head = document
        .head()
        .ok_or_else(|| JsValue::from_str("document has no <head>"))?;
    head.append_child(&script)?;
    Ok(script.into())
}

/// `load`/`error` listeners on the script tag, removed on drop.
struct ScriptListeners {
    script: Element,
    on_load: Closure<dyn Fn()>,
    on_error: Closure<dyn Fn()>,
}

impl ScriptListeners {
    fn attach(
        script: Element,
        on_load: Closure<dyn Fn()>,
        on_error: Closure<dyn Fn()>,
    ) -> Result<Self, JsValue> {
        script.add_event_listener_with_callback("load", on_load.as_ref().unchecked_ref())?;
        script.add_event_listener_with_callback("error", on_error.as_ref().unchecked_ref())?;
        Ok(ScriptListeners {
            script,
            on_load,
            on_error,
        })
    }
}

impl Drop for ScriptListeners {
    fn drop(&mut self) {
        let _ = self
            .script
            .remove_event_listener_with_callback("load", self.on_load.as_ref().unchecked_ref());
        let _ = self
            .script
            .remove_event_listener_with_callback("error", self.on_error.as_ref().unchecked_ref());
    }
}

/// Watches the Stripe.js tag until it loads, errors or times out. Listeners
/// and timer are released on drop.
pub struct StripeJsLoader {
    _listeners: ScriptListeners,
    _timeout: Timeout,
}

impl StripeJsLoader {
    /// Reuse or inject the script tag and report its outcome to `on_status`.
    pub fn start(
        document: &Document,
        on_status: Callback<StripeJsStatus>,
        timeout_ms: u32,
    ) -> Result<Self, JsValue> {
        let on_load = {
            let on_status = on_status.clone();
            Closure::wrap(Box::new(move || on_status.emit(StripeJsStatus::Ready)) as Box<dyn Fn()>)
        };
        let on_error = {
            let on_status = on_status.clone();
            Closure::wrap(Box::new(move || {
                log::error!("could not load {}", STRIPE_JS_URL);
                on_status.emit(StripeJsStatus::Failed)
            }) as Box<dyn Fn()>)
        };
        let listeners = ScriptListeners::attach(script_tag(document)?, on_load, on_error)?;
        let timeout = Timeout::new(timeout_ms, move || {
            if stripe_js_present() {
                on_status.emit(StripeJsStatus::Ready);
            } else {
                log::error!("{} did not load within {}ms", STRIPE_JS_URL, timeout_ms);
                on_status.emit(StripeJsStatus::Failed);
            }
        });
        Ok(StripeJsLoader {
            _listeners: listeners,
            _timeout: timeout,
        })
    }
}

/// Load Stripe.js exactly once per page and track readiness.
#[hook]
pub fn use_stripejs() -> StripeJsStatus {
    let status = use_state(|| {
        if stripe_js_present() {
            StripeJsStatus::Ready
        } else {
            StripeJsStatus::Loading
        }
    });

    {
        let status = status.clone();
        use_effect_with(*status, move |current| {
            let mut loader = None;
            if *current == StripeJsStatus::Loading {
                let on_status = {
                    let status = status.clone();
                    Callback::from(move |next| status.set(next))
                };
                let started = web_sys::window()
                    .and_then(|win| win.document())
                    .ok_or_else(|| JsValue::from_str("no document"))
                    .and_then(|document| StripeJsLoader::start(&document, on_status, LOAD_TIMEOUT_MS));
                match started {
                    Ok(started) => loader = Some(started),
                    Err(err) => {
                        log::error!("Stripe.js injection failed: {:?}", err);
                        status.set(StripeJsStatus::Failed);
                    }
                }
            }
            move || drop(loader)
        });
    }

    *status
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_ready_counts_as_ready() {
        assert!(StripeJsStatus::Ready.is_ready());
        assert!(!StripeJsStatus::Loading.is_ready());
        assert!(!StripeJsStatus::Failed.is_ready());
    }
}
