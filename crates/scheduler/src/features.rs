//! Feature load gate
//!
//! Optional heavy capabilities (cloud sync, OCR, signature tooling) are only
//! fetched or initialized when the user has not switched them off and the
//! process has an interactive surface that would benefit from them.
//!
//! Preferences are a JSON document stored under [`PREFERENCES_KEY`] in a
//! [`PreferenceStore`]:
//!
//! ```json
//! { "features": { "cloudSync": false } }
//! ```
//!
//! A feature is enabled unless its entry is exactly `false`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::rc::Rc;

/// Store key holding the preferences document
pub const PREFERENCES_KEY: &str = "preferences";

/// Error produced by a preference store backend
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Persisted key-value preferences
pub trait PreferenceStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// In-process preference store
#[derive(Debug, Clone, Default)]
pub struct MemoryPreferenceStore {
    values: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with one key
    pub fn with_value(key: &str, value: &str) -> Self {
        let store = Self::new();
        store.values.borrow_mut().insert(key.to_string(), value.to_string());
        store
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.borrow_mut().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Kind of process the gate runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostEnvironment {
    /// A user-facing surface exists
    #[default]
    Interactive,
    /// Batch, test or server-side process
    Headless,
}

/// Preferences document
///
/// Keys other than `features` are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub features: BTreeMap<String, Value>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Preferences {
    /// Enabled unless explicitly set to `false`
    pub fn is_feature_enabled(&self, feature: &str) -> bool {
        !matches!(self.features.get(feature), Some(Value::Bool(false)))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    #[error("failed to encode preferences: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to persist preferences: {0}")]
    Store(#[source] StoreError),
    /// The stored document exists but could not be parsed, so it is left alone
    #[error("stored preferences are unreadable: {0}")]
    Unreadable(#[source] serde_json::Error),
}

/// Decides whether optional features load
///
/// # Example
///
/// ```
/// use pdf_render_scheduler::{FeatureGate, HostEnvironment, MemoryPreferenceStore};
/// use std::rc::Rc;
///
/// let store = MemoryPreferenceStore::with_value(
///     "preferences",
///     r#"{ "features": { "cloudSync": false } }"#,
/// );
/// let gate = FeatureGate::new(Rc::new(store), HostEnvironment::Interactive);
///
/// assert!(!gate.should_load_feature("cloudSync"));
/// assert!(gate.should_load_feature("ocr"));
/// assert_eq!(gate.load_feature_if_enabled("ocr", || "loaded"), Some("loaded"));
/// ```
#[derive(Clone)]
pub struct FeatureGate {
    store: Rc<dyn PreferenceStore>,
    environment: HostEnvironment,
}

impl FeatureGate {
    pub fn new(store: Rc<dyn PreferenceStore>, environment: HostEnvironment) -> Self {
        Self { store, environment }
    }

    pub fn environment(&self) -> HostEnvironment {
        self.environment
    }

    /// Current preferences; unreadable documents count as empty
    pub fn preferences(&self) -> Preferences {
        let Some(raw) = self.store.get(PREFERENCES_KEY) else {
            return Preferences::default();
        };

        match serde_json::from_str(&raw) {
            Ok(preferences) => preferences,
            Err(error) => {
                tracing::warn!(%error, "ignoring malformed preferences document");
                Preferences::default()
            }
        }
    }

    pub fn should_load_feature(&self, feature: &str) -> bool {
        if self.environment == HostEnvironment::Headless {
            tracing::debug!(feature, "headless environment; feature not loaded");
            return false;
        }

        let enabled = self.preferences().is_feature_enabled(feature);
        tracing::debug!(feature, enabled, "feature gate decision");
        enabled
    }

    /// Run `loader` only when the feature is enabled
    ///
    /// The loader's output, including any `Result` it returns, passes through
    /// unchanged.
    pub fn load_feature_if_enabled<R>(
        &self,
        feature: &str,
        loader: impl FnOnce() -> R,
    ) -> Option<R> {
        self.should_load_feature(feature).then(loader)
    }

    /// Async counterpart of [`FeatureGate::load_feature_if_enabled`]
    pub async fn load_feature_if_enabled_async<F, Fut>(
        &self,
        feature: &str,
        loader: F,
    ) -> Option<Fut::Output>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        if !self.should_load_feature(feature) {
            return None;
        }
        Some(loader().await)
    }

    /// Persist an explicit on/off choice for a feature
    ///
    /// A stored document that does not parse is never overwritten.
    pub fn set_feature_enabled(&self, feature: &str, enabled: bool) -> Result<(), FeatureError> {
        let mut preferences = match self.store.get(PREFERENCES_KEY) {
            Some(raw) => serde_json::from_str(&raw).map_err(FeatureError::Unreadable)?,
            None => Preferences::default(),
        };
        preferences.features.insert(feature.to_string(), Value::Bool(enabled));

        let encoded = serde_json::to_string(&preferences)?;
        self.store.set(PREFERENCES_KEY, &encoded).map_err(FeatureError::Store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn gate_with(document: Option<&str>, environment: HostEnvironment) -> FeatureGate {
        let store = match document {
            Some(document) => MemoryPreferenceStore::with_value(PREFERENCES_KEY, document),
            None => MemoryPreferenceStore::new(),
        };
        FeatureGate::new(Rc::new(store), environment)
    }

    #[test]
    fn test_explicit_false_disables_feature() {
        let gate = gate_with(
            Some(r#"{ "features": { "cloudSync": false } }"#),
            HostEnvironment::Interactive,
        );
        assert!(!gate.should_load_feature("cloudSync"));
    }

    #[test]
    fn test_missing_preferences_enable_feature() {
        let gate = gate_with(None, HostEnvironment::Interactive);
        assert!(gate.should_load_feature("cloudSync"));
    }

    #[test]
    fn test_only_literal_false_disables() {
        let gate = gate_with(
            Some(r#"{ "features": { "a": true, "b": "false", "c": 0, "d": null } }"#),
            HostEnvironment::Interactive,
        );

        for feature in ["a", "b", "c", "d", "unlisted"] {
            assert!(gate.should_load_feature(feature), "{feature} should load");
        }
    }

    #[test]
    fn test_malformed_document_counts_as_empty() {
        let gate = gate_with(Some("{ not json"), HostEnvironment::Interactive);

        assert!(gate.should_load_feature("cloudSync"));
        assert_eq!(gate.preferences(), Preferences::default());
    }

    #[test]
    fn test_headless_never_loads() {
        let gate = gate_with(Some(r#"{ "features": { "ocr": true } }"#), HostEnvironment::Headless);

        assert!(!gate.should_load_feature("ocr"));
        assert!(!gate.should_load_feature("unlisted"));
    }

    #[test]
    fn test_loader_only_runs_when_enabled() {
        let gate = gate_with(
            Some(r#"{ "features": { "signatures": false } }"#),
            HostEnvironment::Interactive,
        );
        let calls = Cell::new(0);

        let skipped = gate.load_feature_if_enabled("signatures", || calls.set(calls.get() + 1));
        assert_eq!(skipped, None);
        assert_eq!(calls.get(), 0);

        let loaded: Option<Result<u32, String>> =
            gate.load_feature_if_enabled("export", || Err("network down".to_string()));
        assert_eq!(loaded, Some(Err("network down".to_string())));
    }

    #[test]
    fn test_async_loader() {
        let gate = gate_with(None, HostEnvironment::Interactive);
        let headless = gate_with(None, HostEnvironment::Headless);

        let loaded = futures::executor::block_on(
            gate.load_feature_if_enabled_async("ocr", || async { 7 }),
        );
        let skipped = futures::executor::block_on(
            headless.load_feature_if_enabled_async("ocr", || async { 7 }),
        );

        assert_eq!(loaded, Some(7));
        assert_eq!(skipped, None);
    }

    #[test]
    fn test_set_feature_enabled_preserves_other_settings() {
        let store = MemoryPreferenceStore::with_value(
            PREFERENCES_KEY,
            r#"{ "theme": "dark", "features": { "ocr": true } }"#,
        );
        let gate = FeatureGate::new(Rc::new(store.clone()), HostEnvironment::Interactive);

        gate.set_feature_enabled("cloudSync", false).unwrap();

        assert!(!gate.should_load_feature("cloudSync"));
        assert!(gate.should_load_feature("ocr"));

        let stored: Value = serde_json::from_str(&store.get(PREFERENCES_KEY).unwrap()).unwrap();
        assert_eq!(stored["theme"], "dark");
        assert_eq!(stored["features"]["cloudSync"], false);
    }

    #[test]
    fn test_set_feature_enabled_refuses_unparsable_document() {
        let original = r#"{ "theme": "dark", "features": [1] }"#;
        let store = MemoryPreferenceStore::with_value(PREFERENCES_KEY, original);
        let gate = FeatureGate::new(Rc::new(store.clone()), HostEnvironment::Interactive);

        let result = gate.set_feature_enabled("cloudSync", false);

        assert!(matches!(result, Err(FeatureError::Unreadable(_))));
        assert_eq!(store.get(PREFERENCES_KEY).as_deref(), Some(original));
    }
}
