#![forbid(unsafe_code)]

//! Thread-safe in-memory [`Preferences`] store.
//!
//! Useful for tests and for applications that persist preferences themselves:
//! with the `serde` feature, [`PreferenceEntry`] is serializable, so a
//! [`snapshot`](InMemoryPreferences::snapshot) can be written anywhere and fed
//! back through [`from_snapshot`](InMemoryPreferences::from_snapshot).
//!
//! Change listeners fire after every write or removal, outside the store lock.
//! The store owns the [`BindingTable`] of bindings created for it.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ahash::AHashMap;

use super::Preferences;
use super::registry::BindingTable;

/// A single stored preference value.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PreferenceEntry {
    /// Boolean value.
    Bool(bool),
    /// Floating point value.
    Float(f64),
    /// Integer value.
    Int(i64),
    /// String value.
    String(String),
}

type ChangeListener = Arc<dyn Fn() + Send + Sync>;

/// In-memory preference store.
#[derive(Default)]
pub struct InMemoryPreferences {
    values: RwLock<AHashMap<String, PreferenceEntry>>,
    listeners: Mutex<Vec<ChangeListener>>,
    bindings: BindingTable,
}

impl InMemoryPreferences {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `entries`.
    #[must_use]
    pub fn from_snapshot(entries: BTreeMap<String, PreferenceEntry>) -> Self {
        Self {
            values: RwLock::new(entries.into_iter().collect()),
            listeners: Mutex::new(Vec::new()),
            bindings: BindingTable::new(),
        }
    }

    /// All stored values, ordered by key.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, PreferenceEntry> {
        self.read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Raw entry stored under `key`.
    #[must_use]
    pub fn entry(&self, key: &str) -> Option<PreferenceEntry> {
        self.read().get(key).cloned()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Number of registered change listeners.
    #[must_use]
    pub fn change_listener_count(&self) -> usize {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn put(&self, key: &str, entry: PreferenceEntry) {
        self.write().insert(key.to_owned(), entry);
        self.fire();
    }

    fn fire(&self) {
        let snapshot: Vec<ChangeListener> = self
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for listener in snapshot {
            listener();
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, AHashMap<String, PreferenceEntry>> {
        self.values.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, AHashMap<String, PreferenceEntry>> {
        self.values.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Preferences for InMemoryPreferences {
    fn bool(&self, key: &str) -> bool {
        match self.read().get(key) {
            Some(PreferenceEntry::Bool(v)) => *v,
            _ => false,
        }
    }

    fn set_bool(&self, key: &str, value: bool) {
        self.put(key, PreferenceEntry::Bool(value));
    }

    fn float(&self, key: &str) -> f64 {
        match self.read().get(key) {
            Some(PreferenceEntry::Float(v)) => *v,
            _ => 0.0,
        }
    }

    fn set_float(&self, key: &str, value: f64) {
        self.put(key, PreferenceEntry::Float(value));
    }

    fn int(&self, key: &str) -> i64 {
        match self.read().get(key) {
            Some(PreferenceEntry::Int(v)) => *v,
            _ => 0,
        }
    }

    fn set_int(&self, key: &str, value: i64) {
        self.put(key, PreferenceEntry::Int(value));
    }

    fn string(&self, key: &str) -> String {
        match self.read().get(key) {
            Some(PreferenceEntry::String(v)) => v.clone(),
            _ => String::new(),
        }
    }

    fn set_string(&self, key: &str, value: &str) {
        self.put(key, PreferenceEntry::String(value.to_owned()));
    }

    fn remove_value(&self, key: &str) {
        let removed = self.write().remove(key).is_some();
        if removed {
            self.fire();
        }
    }

    fn add_change_listener(&self, listener: Box<dyn Fn() + Send + Sync>) {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::from(listener));
    }

    fn bindings(&self) -> &BindingTable {
        &self.bindings
    }
}

impl std::fmt::Debug for InMemoryPreferences {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryPreferences")
            .field("keys", &self.len())
            .field("bindings", &self.bindings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn missing_keys_read_zero_values() {
        let prefs = InMemoryPreferences::new();
        assert!(!prefs.bool("b"));
        assert_eq!(prefs.float("f"), 0.0);
        assert_eq!(prefs.int("i"), 0);
        assert_eq!(prefs.string("s"), "");
        assert!(prefs.is_empty());
    }

    #[test]
    fn typed_round_trip() {
        let prefs = InMemoryPreferences::new();
        prefs.set_bool("b", true);
        prefs.set_float("f", 2.5);
        prefs.set_int("i", -4);
        prefs.set_string("s", "hi");
        assert!(prefs.bool("b"));
        assert_eq!(prefs.float("f"), 2.5);
        assert_eq!(prefs.int("i"), -4);
        assert_eq!(prefs.string("s"), "hi");
        assert_eq!(prefs.len(), 4);
    }

    #[test]
    fn mismatched_type_reads_zero_value() {
        let prefs = InMemoryPreferences::new();
        prefs.set_string("k", "text");
        assert_eq!(prefs.int("k"), 0);
        assert_eq!(prefs.entry("k"), Some(PreferenceEntry::String("text".into())));
    }

    #[test]
    fn change_listeners_fire_on_write_and_remove() {
        let prefs = InMemoryPreferences::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        prefs.add_change_listener(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        prefs.set_int("a", 1);
        prefs.remove_value("a");
        prefs.remove_value("a");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn snapshot_restores_store() {
        let prefs = InMemoryPreferences::new();
        prefs.set_int("z", 1);
        prefs.set_bool("a", true);
        let snapshot = prefs.snapshot();
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), ["a", "z"]);

        let restored = InMemoryPreferences::from_snapshot(snapshot);
        assert_eq!(restored.int("z"), 1);
        assert!(restored.bool("a"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn snapshot_serializes_to_json() {
        let prefs = InMemoryPreferences::new();
        prefs.set_string("theme", "dark");
        prefs.set_float("scale", 1.25);

        let json = serde_json::to_string(&prefs.snapshot()).unwrap();
        let parsed: BTreeMap<String, PreferenceEntry> = serde_json::from_str(&json).unwrap();
        let restored = InMemoryPreferences::from_snapshot(parsed);
        assert_eq!(restored.string("theme"), "dark");
        assert_eq!(restored.float("scale"), 1.25);
    }
}
