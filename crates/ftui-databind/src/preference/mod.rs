#![forbid(unsafe_code)]

//! Bindings that mirror keys of a preference store.
//!
//! The store is the source of truth. A [`PrefItem<T>`] never keeps an
//! authoritative value of its own: every `get()` reads through to the store
//! and refreshes a cached snapshot, every `set()` writes through and notifies.
//! The snapshot exists only so [`check_for_change`](PrefItem::check_for_change)
//! can tell whether the store moved underneath the binding.
//!
//! # Invariants
//!
//! 1. The cache, when present, equals the value returned by the most recent
//!    store read (from `get()` or `check_for_change()`).
//! 2. `set()` notifies unconditionally, even when the written value is unchanged.
//! 3. `check_for_change()` notifies when no snapshot exists yet or when the
//!    snapshot differs from a fresh read, and publishes that read as the new
//!    snapshot, so repeating it without a store change stays silent.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Racing `get()` and `check_for_change()` | Cache replaced mid-check | At most one redundant notification |
//! | Key stored with another type | Store-specific | Store decides (usually the fallback value) |
//! | Float key holding NaN | `NaN != NaN` | Snapshots compare bitwise, so repeated checks stay silent |

pub mod memory;
pub mod registry;

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use self::registry::BindingTable;
use crate::error::BindingError;
use crate::item::{Bindable, DataItem};
use crate::listener::{DataListener, ListenerId, Listeners};

/// A synchronous key/value settings store.
///
/// Reads of missing keys (or keys holding another type) return the type's
/// zero value.
pub trait Preferences: Send + Sync {
    /// Read a boolean.
    fn bool(&self, key: &str) -> bool;
    /// Write a boolean.
    fn set_bool(&self, key: &str, value: bool);
    /// Read a float.
    fn float(&self, key: &str) -> f64;
    /// Write a float.
    fn set_float(&self, key: &str, value: f64);
    /// Read an integer.
    fn int(&self, key: &str) -> i64;
    /// Write an integer.
    fn set_int(&self, key: &str, value: i64);
    /// Read a string.
    fn string(&self, key: &str) -> String;
    /// Write a string.
    fn set_string(&self, key: &str, value: &str);
    /// Remove any value stored under `key`.
    fn remove_value(&self, key: &str);
    /// Register a callback fired whenever the store changes.
    fn add_change_listener(&self, listener: Box<dyn Fn() + Send + Sync>);
    /// The bindings created for this store.
    ///
    /// A store owns exactly one table, so every
    /// [`PreferenceBindings`](registry::PreferenceBindings) handle over the
    /// same store sees the same bindings.
    fn bindings(&self) -> &BindingTable;
}

/// A value type that can be read from and written to a [`Preferences`] store.
pub trait PreferenceValue: Clone + PartialEq + Send + Sync + 'static {
    /// Human-readable type name used in diagnostics.
    const KIND: &'static str;

    /// Read `key` from `store`.
    fn read(store: &dyn Preferences, key: &str) -> Self;

    /// Write `value` under `key` in `store`.
    fn write(store: &dyn Preferences, key: &str, value: &Self);

    /// Whether two snapshots hold the same stored value.
    fn same(a: &Self, b: &Self) -> bool {
        a == b
    }
}

impl PreferenceValue for bool {
    const KIND: &'static str = "bool";

    fn read(store: &dyn Preferences, key: &str) -> Self {
        store.bool(key)
    }

    fn write(store: &dyn Preferences, key: &str, value: &Self) {
        store.set_bool(key, *value);
    }
}

impl PreferenceValue for f64 {
    const KIND: &'static str = "float";

    fn read(store: &dyn Preferences, key: &str) -> Self {
        store.float(key)
    }

    fn write(store: &dyn Preferences, key: &str, value: &Self) {
        store.set_float(key, *value);
    }

    /// Bitwise, so a stored NaN matches itself.
    fn same(a: &Self, b: &Self) -> bool {
        a.to_bits() == b.to_bits()
    }
}

impl PreferenceValue for i64 {
    const KIND: &'static str = "int";

    fn read(store: &dyn Preferences, key: &str) -> Self {
        store.int(key)
    }

    fn write(store: &dyn Preferences, key: &str, value: &Self) {
        store.set_int(key, *value);
    }
}

impl PreferenceValue for String {
    const KIND: &'static str = "string";

    fn read(store: &dyn Preferences, key: &str) -> Self {
        store.string(key)
    }

    fn write(store: &dyn Preferences, key: &str, value: &Self) {
        store.set_string(key, value);
    }
}

/// A binding mirroring one key of a [`Preferences`] store.
pub struct PrefItem<T> {
    listeners: Listeners,
    key: String,
    store: Arc<dyn Preferences>,
    cache: ArcSwapOption<T>,
}

impl<T: PreferenceValue> PrefItem<T> {
    /// Bind `key` of `store`.
    ///
    /// Most callers should go through
    /// [`PreferenceBindings`](registry::PreferenceBindings) so that each key
    /// has a single binding.
    #[must_use]
    pub fn new(key: impl Into<String>, store: Arc<dyn Preferences>) -> Self {
        Self {
            listeners: Listeners::new(),
            key: key.into(),
            store,
            cache: ArcSwapOption::empty(),
        }
    }

    /// The bound preference key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Point this binding at another key of the same store.
    ///
    /// Takes `&mut self`, so it is only possible before the binding is shared.
    /// The cached snapshot is discarded.
    pub fn set_key(&mut self, key: impl Into<String>) {
        self.key = key.into();
        self.cache = ArcSwapOption::empty();
    }

    /// The value observed by the most recent store read, if any.
    #[must_use]
    pub fn cached(&self) -> Option<T> {
        self.cache.load_full().map(|value| T::clone(&value))
    }

    /// Notify listeners if the store no longer matches the cached snapshot.
    ///
    /// Meant to be called when the store reports a change, or periodically.
    pub fn check_for_change(&self) {
        let fresh = Arc::new(T::read(&*self.store, &self.key));
        let previous = self.cache.swap(Some(Arc::clone(&fresh)));
        if previous.is_some_and(|cached| T::same(&cached, &fresh)) {
            return;
        }
        tracing::trace!(key = %self.key, kind = T::KIND, "preference changed");
        self.listeners.trigger();
    }
}

impl<T: Send + Sync> DataItem for PrefItem<T> {
    fn add_listener(&self, listener: Arc<dyn DataListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.remove(id);
    }
}

impl<T: PreferenceValue> Bindable<T> for PrefItem<T> {
    fn get(&self) -> Result<T, BindingError> {
        let value = T::read(&*self.store, &self.key);
        self.cache.store(Some(Arc::new(value.clone())));
        Ok(value)
    }

    fn set(&self, value: T) -> Result<(), BindingError> {
        T::write(&*self.store, &self.key, &value);
        self.listeners.trigger();
        Ok(())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for PrefItem<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefItem")
            .field("key", &self.key)
            .field("cache", &self.cache.load_full())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
