#![forbid(unsafe_code)]

//! Data item contracts and the internally-owned value binding.
//!
//! [`Item<T>`] holds one value plus the equality predicate used to decide
//! whether a `set()` actually changed anything. Reads take a shared lock,
//! writes take an exclusive lock, and listeners are notified only after the
//! lock has been released.
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use ftui_databind::{Bindable, DataItem, Item};
//!
//! let count = Item::with_value(0_i64);
//! let hits = Arc::new(AtomicUsize::new(0));
//! let h = Arc::clone(&hits);
//! count.add_listener(Arc::new(move || {
//!     h.fetch_add(1, Ordering::SeqCst);
//! }));
//!
//! count.set(0).unwrap(); // unchanged: no notification
//! count.set(5).unwrap();
//! assert_eq!(count.get().unwrap(), 5);
//! assert_eq!(hits.load(Ordering::SeqCst), 2); // registration + one change
//! ```
//!
//! # Invariants
//!
//! 1. `get()` only ever observes values written by a completed `set()`.
//! 2. The comparator is always called as `equals(old, new)`.
//! 3. `set()` notifies exactly once when the comparator reports inequality,
//!    and not at all otherwise.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::BindingError;
use crate::listener::{DataListener, ListenerId, Listeners};

/// Equality predicate invoked as `equals(old, new)`.
pub type Comparator<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Anything that can be observed for changes.
pub trait DataItem: Send + Sync {
    /// Register a listener. It is notified once immediately.
    fn add_listener(&self, listener: Arc<dyn DataListener>) -> ListenerId;

    /// Unregister a listener previously returned by [`add_listener`](Self::add_listener).
    fn remove_listener(&self, id: ListenerId);
}

/// A data item holding a single readable and writable value.
pub trait Bindable<T>: DataItem {
    /// Current value.
    fn get(&self) -> Result<T, BindingError>;

    /// Replace the value, notifying listeners if it changed.
    fn set(&self, value: T) -> Result<(), BindingError>;
}

/// A bindable whose storage lives outside the binding.
pub trait ExternalBindable<T>: Bindable<T> {
    /// Re-read the external storage and notify if it changed out of band.
    fn reload(&self) -> Result<(), BindingError>;
}

/// An observable value owned by the binding.
pub struct Item<T> {
    pub(crate) listeners: Listeners,
    pub(crate) comparator: Comparator<T>,
    pub(crate) value: RwLock<T>,
}

/// Boolean item.
pub type BoolItem = Item<bool>;
/// Floating point item.
pub type FloatItem = Item<f64>;
/// Integer item.
pub type IntItem = Item<i64>;
/// Single character item.
pub type RuneItem = Item<char>;
/// String item.
pub type StringItem = Item<String>;

impl<T: Clone + PartialEq + Default + Send + Sync + 'static> Item<T> {
    /// Create an item holding `T::default()`, compared with `==`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_value(T::default())
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Item<T> {
    /// Create an item holding `value`, compared with `==`.
    #[must_use]
    pub fn with_value(value: T) -> Self {
        Self::with_value_and_comparator(value, |a: &T, b: &T| a == b)
    }
}

impl<T: Clone + Send + Sync + 'static> Item<T> {
    /// Create an item holding `T::default()` with a custom equality predicate.
    #[must_use]
    pub fn with_comparator(comparator: impl Fn(&T, &T) -> bool + Send + Sync + 'static) -> Self
    where
        T: Default,
    {
        Self::with_value_and_comparator(T::default(), comparator)
    }

    /// Create an item holding `value` with a custom equality predicate.
    #[must_use]
    pub fn with_value_and_comparator(
        value: T,
        comparator: impl Fn(&T, &T) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            listeners: Listeners::new(),
            comparator: Arc::new(comparator),
            value: RwLock::new(value),
        }
    }

    pub(crate) fn read(&self) -> Result<RwLockReadGuard<'_, T>, BindingError> {
        self.value.read().map_err(|_| BindingError::PoisonedLock)
    }

    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, T>, BindingError> {
        self.value.write().map_err(|_| BindingError::PoisonedLock)
    }
}

impl<T: Clone + PartialEq + Default + Send + Sync + 'static> Default for Item<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync> DataItem for Item<T> {
    fn add_listener(&self, listener: Arc<dyn DataListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.remove(id);
    }
}

impl<T: Clone + Send + Sync + 'static> Bindable<T> for Item<T> {
    fn get(&self) -> Result<T, BindingError> {
        Ok(self.read()?.clone())
    }

    fn set(&self, value: T) -> Result<(), BindingError> {
        let mut current = self.write()?;
        let equal = (self.comparator)(&*current, &value);
        *current = value;
        drop(current);

        if !equal {
            self.listeners.trigger();
        }
        Ok(())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Item<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Item");
        match self.value.try_read() {
            Ok(value) => s.field("value", &*value),
            Err(_) => s.field("value", &"<locked>"),
        };
        s.field("listeners", &self.listeners.len()).finish()
    }
}
