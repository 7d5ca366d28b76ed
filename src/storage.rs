//! Key/value storage and wall clock used by the appearance cache.
//!
//! `LocalStorage` and `SystemClock` are the browser implementations;
//! `MemoryStore` and `FixedClock` back the tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::error::GatewayError;

pub trait KeyValueStore {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), GatewayError>;
    fn remove_item(&self, key: &str);
}

/// Milliseconds since the Unix epoch.
pub trait Clock {
    fn now_ms(&self) -> f64;
}

/// `window.localStorage`. Shared across tabs with no locking.
pub struct LocalStorage {
    storage: web_sys::Storage,
}

impl LocalStorage {
    /// `None` when storage is disabled (private mode, sandboxed iframes).
    pub fn new() -> Option<Self> {
        let storage = web_sys::window()?.local_storage().ok()??;
        Some(LocalStorage { storage })
    }
}

impl KeyValueStore for LocalStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.storage.get_item(key).ok().flatten()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), GatewayError> {
        self.storage
            .set_item(key, value)
            .map_err(|e| GatewayError::Storage(format!("{:?}", e)))
    }

    fn remove_item(&self, key: &str) {
        if self.storage.remove_item(key).is_err() {
            log::warn!("could not remove `{}` from localStorage", key);
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    items: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn contains(&self, key: &str) -> bool {
        self.items.borrow().contains_key(key)
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.borrow().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), GatewayError> {
        self.items
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) {
        self.items.borrow_mut().remove(key);
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[cfg(target_arch = "wasm32")]
    fn now_ms(&self) -> f64 {
        web_sys::js_sys::Date::now()
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn now_ms(&self) -> f64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as f64)
            .unwrap_or(0.0)
    }
}

/// Manually advanced clock.
#[derive(Debug, Default)]
pub struct FixedClock {
    now: Cell<f64>,
}

impl FixedClock {
    pub fn at(now_ms: f64) -> Self {
        FixedClock { now: Cell::new(now_ms) }
    }

    pub fn set(&self, now_ms: f64) {
        self.now.set(now_ms);
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}
