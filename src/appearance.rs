//! Appearance descriptor for the hosted payment element.
//!
//! The descriptor is derived from the computed styles of a few storefront
//! elements so the hosted element blends into the active theme. Computing it
//! forces style recalculation, so the result is kept in `localStorage` for a
//! day, keyed by theme.

use std::collections::BTreeMap;

use convert_case::{Case, Casing};
use serde::{Deserialize, Serialize};

use crate::color::generate_hover_colors;
use crate::storage::{Clock, KeyValueStore};

/// Storage namespace for the full-page checkout.
pub const CLASSIC_APPEARANCE_NAMESPACE: &str = "wc_stripe_appearance";
/// Storage namespace for the block checkout.
pub const BLOCKS_APPEARANCE_NAMESPACE: &str = "wc_stripe_blocks_appearance";

pub const APPEARANCE_TTL_MS: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

/// camelCase CSS property → value.
pub type CssProperties = BTreeMap<String, String>;

const LABEL_PROPERTIES: &[&str] = &[
    "color",
    "fontFamily",
    "fontSize",
    "fontWeight",
    "letterSpacing",
    "lineHeight",
    "padding",
    "paddingTop",
    "paddingRight",
    "paddingBottom",
    "paddingLeft",
    "textDecoration",
    "textShadow",
    "textTransform",
];

const INPUT_PROPERTIES: &[&str] = &[
    "backgroundColor",
    "border",
    "borderColor",
    "borderRadius",
    "borderStyle",
    "borderWidth",
    "boxShadow",
    "color",
    "fontFamily",
    "fontSize",
    "fontWeight",
    "letterSpacing",
    "lineHeight",
    "outline",
    "padding",
    "paddingTop",
    "paddingRight",
    "paddingBottom",
    "paddingLeft",
    "textDecoration",
    "textShadow",
    "textTransform",
];

const TAB_PROPERTIES: &[&str] = &[
    "backgroundColor",
    "border",
    "borderColor",
    "borderRadius",
    "borderWidth",
    "boxShadow",
    "color",
    "fontFamily",
    "fontSize",
    "fontWeight",
    "letterSpacing",
    "lineHeight",
    "outline",
    "padding",
    "textTransform",
];

const TAB_SELECTED_PROPERTIES: &[&str] = &[
    "backgroundColor",
    "borderColor",
    "boxShadow",
    "color",
    "outline",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StyleAnchor {
    Input,
    Label,
    Button,
}

/// Where computed styles come from.
pub trait StyleSource {
    /// Non-empty computed values for `properties` on the anchor element, or
    /// `None` when the anchor is not on the page.
    fn sample(&self, anchor: StyleAnchor, properties: &[&str]) -> Option<CssProperties>;
}

/// Computed styles of live storefront DOM elements.
pub struct DomStyleSource {
    input: &'static str,
    label: &'static str,
    button: &'static str,
}

impl DomStyleSource {
    pub fn classic() -> Self {
        DomStyleSource {
            input: "#billing_first_name",
            label: ".woocommerce-checkout .form-row label",
            button: "#place_order",
        }
    }

    pub fn blocks() -> Self {
        DomStyleSource {
            input: ".wc-block-components-text-input input",
            label: ".wc-block-components-text-input label",
            button: ".wc-block-components-checkout-place-order-button",
        }
    }

    fn selector(&self, anchor: StyleAnchor) -> &'static str {
        match anchor {
            StyleAnchor::Input => self.input,
            StyleAnchor::Label => self.label,
            StyleAnchor::Button => self.button,
        }
    }
}

impl StyleSource for DomStyleSource {
    fn sample(&self, anchor: StyleAnchor, properties: &[&str]) -> Option<CssProperties> {
        let window = web_sys::window()?;
        let element = window
            .document()?
            .query_selector(self.selector(anchor))
            .ok()??;
        let style = window.get_computed_style(&element).ok()??;
        let sampled = properties
            .iter()
            .filter_map(|property| {
                let value = style
                    .get_property_value(&property.to_case(Case::Kebab))
                    .ok()?;
                (!value.is_empty()).then(|| (property.to_string(), value))
            })
            .collect();
        Some(sampled)
    }
}

/// The `appearance` option passed to `stripe.elements()`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Appearance {
    pub theme: String,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub rules: BTreeMap<String, CssProperties>,
}

fn allowed(properties: &CssProperties, allow_list: &[&str]) -> CssProperties {
    properties
        .iter()
        .filter(|(name, _)| allow_list.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Build the descriptor from the input, label and primary button styles.
pub fn compute_appearance(source: &dyn StyleSource) -> Appearance {
    let input = source
        .sample(StyleAnchor::Input, INPUT_PROPERTIES)
        .unwrap_or_default();
    let label = source
        .sample(StyleAnchor::Label, LABEL_PROPERTIES)
        .unwrap_or_default();
    let button = source
        .sample(StyleAnchor::Button, TAB_SELECTED_PROPERTIES)
        .unwrap_or_default();

    let mut rules = BTreeMap::new();
    rules.insert(".Input".to_string(), allowed(&input, INPUT_PROPERTIES));
    rules.insert(".Label".to_string(), allowed(&label, LABEL_PROPERTIES));

    let tab = allowed(&input, TAB_PROPERTIES);
    let hover = generate_hover_colors(
        tab.get("backgroundColor").map(String::as_str).unwrap_or(""),
        tab.get("color").map(String::as_str).unwrap_or(""),
    );
    if !hover.background_color.is_empty() {
        rules.insert(
            ".Tab:hover".to_string(),
            CssProperties::from([
                ("backgroundColor".to_string(), hover.background_color),
                ("color".to_string(), hover.color.clone()),
            ]),
        );
        rules.insert(
            ".TabIcon:hover".to_string(),
            CssProperties::from([("color".to_string(), hover.color)]),
        );
    }
    rules.insert(".Tab".to_string(), tab);

    let selected = allowed(&button, TAB_SELECTED_PROPERTIES);
    if let Some(color) = selected.get("color") {
        rules.insert(
            ".TabIcon--selected".to_string(),
            CssProperties::from([("color".to_string(), color.clone())]),
        );
    }
    rules.insert(".Tab--selected".to_string(), selected);
    rules.retain(|_, properties| !properties.is_empty());

    let mut variables = BTreeMap::new();
    if let Some(font) = input.get("fontFamily").or_else(|| label.get("fontFamily")) {
        variables.insert("fontFamily".to_string(), font.clone());
    }
    if let Some(color) = label.get("color") {
        variables.insert("colorText".to_string(), color.clone());
    }
    if let Some(background) = input.get("backgroundColor") {
        variables.insert("colorBackground".to_string(), background.clone());
    }

    Appearance {
        theme: "stripe".to_string(),
        variables,
        rules,
    }
}

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    value: Appearance,
    /// Absolute expiry, milliseconds since the epoch.
    expiration: f64,
}

pub struct AppearanceCache<S, C> {
    namespace: &'static str,
    store: S,
    clock: C,
}

impl<S: KeyValueStore, C: Clock> AppearanceCache<S, C> {
    pub fn new(namespace: &'static str, store: S, clock: C) -> Self {
        AppearanceCache {
            namespace,
            store,
            clock,
        }
    }

    pub fn key(&self, theme_name: &str) -> String {
        format!("{}_{}", self.namespace, theme_name)
    }

    /// Return the stored descriptor when still fresh, otherwise compute,
    /// store and return a new one. Stored and fresh values are never merged.
    pub fn get_or_compute(&self, theme_name: &str, source: &dyn StyleSource) -> Appearance {
        let key = self.key(theme_name);
        if let Some(cached) = self.read(&key) {
            return cached;
        }

        let appearance = compute_appearance(source);
        let entry = CacheEntry {
            value: appearance.clone(),
            expiration: self.clock.now_ms() + APPEARANCE_TTL_MS,
        };
        match serde_json::to_string(&entry) {
            Ok(json) => {
                if let Err(err) = self.store.set_item(&key, &json) {
                    log::warn!("appearance not cached: {}", err);
                }
            }
            Err(err) => log::warn!("appearance not serializable: {}", err),
        }
        appearance
    }

    fn read(&self, key: &str) -> Option<Appearance> {
        let raw = self.store.get_item(key)?;
        let entry = match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) => entry,
            Err(_) => {
                log::debug!("dropping unreadable appearance entry `{}`", key);
                self.store.remove_item(key);
                return None;
            }
        };
        if entry.expiration <= self.clock.now_ms() {
            self.store.remove_item(key);
            return None;
        }
        Some(entry.value)
    }
}
