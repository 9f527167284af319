#![forbid(unsafe_code)]

//! Thread-safe observable value bindings for FrankenTUI.
//!
//! This crate provides the data items a UI binds widgets to:
//!
//! - [`Item`]: a value owned by the binding, with no-op suppression driven by
//!   an equality predicate.
//! - [`ExternalItem`]: a binding over caller-owned [`SharedValue`] storage,
//!   with an explicit [`reload`](ExternalBindable::reload) to pick up
//!   out-of-band writes.
//! - [`PrefItem`]: a binding mirroring one key of a [`Preferences`] store.
//! - [`PreferenceBindings`]: one binding per (store, key), with type-checked
//!   lookup through the store's [`BindingTable`].
//!
//! # Architecture
//!
//! Each binding owns a reader/writer lock around its value and a
//! [`Listeners`] list. Reads share the lock, writes take it exclusively, and
//! listeners are always notified after the lock has been released, so a
//! listener may call back into the binding it observes.
//!
//! Preference bindings keep no value of their own. They publish the last
//! value read from the store through an atomically swapped snapshot, which
//! [`PrefItem::check_for_change`] compares against a fresh read.
//!
//! # Invariants
//!
//! 1. `Item` and `ExternalItem` notify exactly once per `set()` that the
//!    comparator reports as a change, and never otherwise.
//! 2. `PrefItem::set()` always notifies.
//! 3. Listener notification never happens while a value lock is held.

pub mod error;
pub mod external;
pub mod item;
pub mod listener;
pub mod preference;

pub use error::BindingError;
pub use external::{
    ExternalBoolItem, ExternalFloatItem, ExternalIntItem, ExternalItem, ExternalRuneItem,
    ExternalStringItem, SharedValue,
};
pub use item::{
    Bindable, BoolItem, Comparator, DataItem, ExternalBindable, FloatItem, IntItem, Item,
    RuneItem, StringItem,
};
pub use listener::{BindingScope, DataListener, ListenerId, Listeners, Subscription};
pub use preference::memory::{InMemoryPreferences, PreferenceEntry};
pub use preference::registry::{
    BindingTable, PreferenceBindings, PreferenceItem, lookup_existing_binding,
};
pub use preference::{PrefItem, PreferenceValue, Preferences};
