//! Browser-only checks, run with `wasm-pack test --headless --firefox`.
#![cfg(target_arch = "wasm32")]

use wasm_bindgen_test::*;
use wc_stripe_upe::appearance::{
    AppearanceCache, CssProperties, StyleAnchor, StyleSource, BLOCKS_APPEARANCE_NAMESPACE,
};
use wc_stripe_upe::storage::{KeyValueStore, LocalStorage, SystemClock};
use std::cell::Cell;
use std::rc::Rc;

use gloo_timers::future::TimeoutFuture;
use wc_stripe_upe::interop::{stripe_js_present, StripeJsLoader, StripeJsStatus, SCRIPT_ID};
use yew::Callback;

wasm_bindgen_test_configure!(run_in_browser);

struct PlainSource;

impl StyleSource for PlainSource {
    fn sample(&self, anchor: StyleAnchor, _: &[&str]) -> Option<CssProperties> {
        match anchor {
            StyleAnchor::Input => Some(CssProperties::from([(
                "fontFamily".to_string(),
                "serif".to_string(),
            )])),
            _ => None,
        }
    }
}

#[wasm_bindgen_test]
fn local_storage_round_trips() {
    let store = LocalStorage::new().expect("localStorage available");
    store.set_item("wc_stripe_upe_test", "value").unwrap();
    assert_eq!(store.get_item("wc_stripe_upe_test").as_deref(), Some("value"));
    store.remove_item("wc_stripe_upe_test");
    assert_eq!(store.get_item("wc_stripe_upe_test"), None);
}

#[wasm_bindgen_test]
fn appearance_is_persisted_in_local_storage() {
    let store = LocalStorage::new().expect("localStorage available");
    let cache = AppearanceCache::new(BLOCKS_APPEARANCE_NAMESPACE, store, SystemClock);
    let key = cache.key("web-test");

    let appearance = cache.get_or_compute("web-test", &PlainSource);
    assert_eq!(appearance.variables["fontFamily"], "serif");

    let raw = LocalStorage::new().unwrap().get_item(&key).expect("entry written");
    assert!(raw.contains("\"expiration\""));
    LocalStorage::new().unwrap().remove_item(&key);
}

#[wasm_bindgen_test]
fn stripe_js_is_not_loaded_by_default() {
    assert!(!stripe_js_present());
}

#[wasm_bindgen_test]
async fn a_stale_script_tag_times_out_as_failed() {
    let document = web_sys::window().unwrap().document().unwrap();
    // A tag left behind by an earlier, already failed load: it never fires.
    let stale = document.create_element("script").unwrap();
    stale.set_id(SCRIPT_ID);
    document.head().unwrap().append_child(&stale).unwrap();

    let seen = Rc::new(Cell::new(None));
    let on_status = {
        let seen = Rc::clone(&seen);
        Callback::from(move |status| seen.set(Some(status)))
    };
    let loader = StripeJsLoader::start(&document, on_status, 20).unwrap();
    TimeoutFuture::new(100).await;

    assert_eq!(seen.get(), Some(StripeJsStatus::Failed));
    drop(loader);
    stale.remove();
}
