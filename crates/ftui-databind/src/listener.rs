#![forbid(unsafe_code)]

//! Listener registration and change notification for data items.
//!
//! Every binding owns a [`Listeners`] list. When the binding's observable
//! state changes it calls [`Listeners::trigger`], which fans the change out to
//! all registered [`DataListener`]s.
//!
//! # Invariants
//!
//! 1. Listeners are notified in registration order.
//! 2. `trigger()` never holds the listener lock while calling a listener, so a
//!    listener may re-enter the binding or add/remove listeners.
//! 3. A listener added with [`Listeners::add`] is notified once immediately,
//!    letting it pull the current state.
//! 4. Dropping a [`Subscription`] removes its listener before the next
//!    notification cycle.
//!
//! # Failure Modes
//!
//! - Listener panic: propagates to the caller of `trigger()` (usually `set()`);
//!   the binding's value lock is already released at that point.
//! - Poisoned listener lock: recovered, the list itself is always consistent.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::item::DataItem;

/// Receives notifications when a data item changes.
pub trait DataListener: Send + Sync {
    /// Called after the observed item's value changed.
    fn data_changed(&self);
}

impl<F: Fn() + Send + Sync> DataListener for F {
    fn data_changed(&self) {
        self()
    }
}

/// Handle identifying a registered listener, used to remove it again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// The listener list owned by a single binding.
#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Arc<dyn DataListener>)>>,
}

impl Listeners {
    /// Create an empty listener list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` and notify it once with the current state.
    pub fn add(&self, listener: Arc<dyn DataListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::clone(&listener)));
        listener.data_changed();
        id
    }

    /// Remove a listener. Unknown ids are ignored.
    pub fn remove(&self, id: ListenerId) {
        self.lock().retain(|(entry, _)| *entry != id);
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Notify every registered listener.
    pub fn trigger(&self) {
        let snapshot: Vec<Arc<dyn DataListener>> = self
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            listener.data_changed();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(ListenerId, Arc<dyn DataListener>)>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.len())
            .finish()
    }
}

/// RAII guard that removes a listener from its item when dropped.
///
/// Holds only a weak reference, so a subscription never keeps its item alive.
#[must_use = "dropping a Subscription removes the listener immediately"]
pub struct Subscription {
    item: Weak<dyn DataItem>,
    id: ListenerId,
}

impl Subscription {
    /// Register `listener` on `item` and return a guard that unregisters it.
    pub fn new<I: DataItem + 'static>(item: &Arc<I>, listener: impl DataListener + 'static) -> Self {
        let id = item.add_listener(Arc::new(listener));
        let weak = Arc::downgrade(item);
        let item: Weak<dyn DataItem> = weak;
        Self { item, id }
    }

    /// The id of the underlying listener.
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(item) = self.item.upgrade() {
            item.remove_listener(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("alive", &(self.item.strong_count() > 0))
            .finish()
    }
}

/// Collects subscriptions for a logical scope (e.g., a widget).
///
/// When the scope is dropped, all held subscriptions are released, cleanly
/// disconnecting the scope from every item it listened to.
///
/// # Invariants
///
/// 1. After drop, no callbacks from this scope will fire.
/// 2. `clear()` releases all subscriptions immediately (reusable scope).
#[derive(Default)]
pub struct BindingScope {
    subscriptions: Vec<Subscription>,
}

impl BindingScope {
    /// Create an empty binding scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `sub` alive until the scope is dropped or cleared.
    pub fn hold(&mut self, sub: Subscription) {
        self.subscriptions.push(sub);
    }

    /// Listen to `item` within this scope.
    ///
    /// Returns a reference to the scope for chaining.
    pub fn listen<I: DataItem + 'static>(
        &mut self,
        item: &Arc<I>,
        listener: impl DataListener + 'static,
    ) -> &mut Self {
        self.subscriptions.push(Subscription::new(item, listener));
        self
    }

    /// Number of active subscriptions in this scope.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether the scope holds no subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Release all subscriptions immediately (scope becomes empty but reusable).
    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }
}

impl std::fmt::Debug for BindingScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingScope")
            .field("subscription_count", &self.subscriptions.len())
            .finish()
    }
}
