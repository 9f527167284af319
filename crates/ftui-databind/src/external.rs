#![forbid(unsafe_code)]

//! Bindings over storage owned by the caller.
//!
//! A [`SharedValue<T>`] is a reference-counted cell the host keeps and may
//! mutate at any time without going through a binding. An
//! [`ExternalItem<T>`] binds to such a cell and remembers the last value it
//! synchronized (the *shadow*). Out-of-band writes stay invisible to the
//! binding until the host calls [`reload`](ExternalBindable::reload).
//!
//! # Usage
//!
//! ```
//! use ftui_databind::{Bindable, ExternalBindable, ExternalItem, SharedValue};
//!
//! let storage = SharedValue::new(5);
//! let binding = ExternalItem::bind(Some(storage.clone()));
//!
//! binding.set(7).unwrap();
//! assert_eq!(storage.get(), 7);
//!
//! storage.set(9); // out of band
//! assert_eq!(binding.get().unwrap(), 7);
//! binding.reload().unwrap();
//! assert_eq!(binding.get().unwrap(), 9);
//! ```
//!
//! # Invariants
//!
//! 1. After any successful `set()` or `reload()`, the shadow equals the
//!    storage's value.
//! 2. `set()` compares against the shadow, never against the storage.
//! 3. The binding lock is always acquired before the storage lock.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::BindingError;
use crate::item::{Bindable, DataItem, ExternalBindable, Item};
use crate::listener::{DataListener, ListenerId};

/// Caller-owned storage shared with an [`ExternalItem`].
///
/// Cloning yields another handle to the same cell.
#[derive(Default)]
pub struct SharedValue<T>(Arc<RwLock<T>>);

impl<T> Clone for SharedValue<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Clone> SharedValue<T> {
    /// Wrap `value` in new shared storage.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    /// Current value of the storage.
    #[must_use]
    pub fn get(&self) -> T {
        self.read().clone()
    }

    /// Overwrite the storage without notifying any binding.
    pub fn set(&self, value: T) {
        *self.write() = value;
    }

    /// Whether two handles refer to the same storage.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn read(&self) -> RwLockReadGuard<'_, T> {
        self.0.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.0.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for SharedValue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.try_read() {
            Ok(value) => f.debug_tuple("SharedValue").field(&*value).finish(),
            Err(_) => f.debug_tuple("SharedValue").field(&"<locked>").finish(),
        }
    }
}

/// An observable binding to a [`SharedValue`].
///
/// The inner [`Item`] holds the shadow copy; `get()` returns it.
pub struct ExternalItem<T> {
    base: Item<T>,
    storage: SharedValue<T>,
}

/// Boolean external binding.
pub type ExternalBoolItem = ExternalItem<bool>;
/// Floating point external binding.
pub type ExternalFloatItem = ExternalItem<f64>;
/// Integer external binding.
pub type ExternalIntItem = ExternalItem<i64>;
/// Single character external binding.
pub type ExternalRuneItem = ExternalItem<char>;
/// String external binding.
pub type ExternalStringItem = ExternalItem<String>;

impl<T: Clone + PartialEq + Default + Send + Sync + 'static> ExternalItem<T> {
    /// Bind to `storage`, compared with `==`.
    ///
    /// With `None`, fresh default-valued storage is allocated, so the binding
    /// behaves like an [`Item`] whose storage can still be shared via
    /// [`storage()`](Self::storage).
    #[must_use]
    pub fn bind(storage: Option<SharedValue<T>>) -> Self {
        Self::bind_with_comparator(storage, |a: &T, b: &T| a == b)
    }
}

impl<T: Clone + Default + Send + Sync + 'static> ExternalItem<T> {
    /// Bind to `storage` with a custom equality predicate.
    #[must_use]
    pub fn bind_with_comparator(
        storage: Option<SharedValue<T>>,
        comparator: impl Fn(&T, &T) -> bool + Send + Sync + 'static,
    ) -> Self {
        let storage = storage.unwrap_or_default();
        let shadow = storage.get();
        Self {
            base: Item::with_value_and_comparator(shadow, comparator),
            storage,
        }
    }
}

impl<T> ExternalItem<T> {
    /// Another handle to the bound storage.
    #[must_use]
    pub fn storage(&self) -> SharedValue<T> {
        self.storage.clone()
    }
}

impl<T: Send + Sync> DataItem for ExternalItem<T> {
    fn add_listener(&self, listener: Arc<dyn DataListener>) -> ListenerId {
        self.base.add_listener(listener)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.base.remove_listener(id);
    }
}

impl<T: Clone + Send + Sync + 'static> Bindable<T> for ExternalItem<T> {
    fn get(&self) -> Result<T, BindingError> {
        self.base.get()
    }

    fn set(&self, value: T) -> Result<(), BindingError> {
        let mut shadow = self.base.write()?;
        if (self.base.comparator)(&*shadow, &value) {
            return Ok(());
        }
        self.storage.set(value.clone());
        *shadow = value;
        drop(shadow);

        self.base.listeners.trigger();
        Ok(())
    }
}

impl<T: Clone + Send + Sync + 'static> ExternalBindable<T> for ExternalItem<T> {
    fn reload(&self) -> Result<(), BindingError> {
        self.set(self.storage.get())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ExternalItem<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalItem")
            .field("shadow", &self.base)
            .field("storage", &self.storage)
            .finish()
    }
}
