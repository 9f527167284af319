#![forbid(unsafe_code)]

//! One binding per preference key.
//!
//! A [`BindingTable`] maps preference keys to the [`PrefItem`]s created for
//! them. Every store owns one table, reachable through
//! [`Preferences::bindings`], so the table lives exactly as long as its store.
//! [`PreferenceBindings`] is a cheap handle over a store: its `bind_*`
//! constructors hand out the existing binding for a key when one of the
//! requested type exists, and create and record a new one otherwise.
//!
//! # Invariants
//!
//! 1. At most one binding per (store, key) is recorded, however many
//!    `PreferenceBindings` handles wrap the store.
//! 2. A lookup never returns a binding of a different value type. A mismatch
//!    is logged and reported as "not found".
//! 3. Store change notifications call `check_for_change()` on every recorded
//!    binding, outside the table lock.
//! 4. A store gets a single change listener for its table, registered by the
//!    first handle. It holds the store weakly.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use ahash::AHashMap;

use super::{PrefItem, PreferenceValue, Preferences};
use crate::error::BindingError;
use crate::item::DataItem;

/// Type-erased view of a [`PrefItem`] stored in a [`BindingTable`].
pub trait PreferenceItem: DataItem {
    /// The bound preference key.
    fn key(&self) -> &str;

    /// Type name of the bound value.
    fn value_kind(&self) -> &'static str;

    /// See [`PrefItem::check_for_change`].
    fn check_for_change(&self);
}

impl<T: PreferenceValue> PreferenceItem for PrefItem<T> {
    fn key(&self) -> &str {
        PrefItem::key(self)
    }

    fn value_kind(&self) -> &'static str {
        T::KIND
    }

    fn check_for_change(&self) {
        PrefItem::check_for_change(self);
    }
}

// Both views point at the same allocation, so they die together.
struct Entry {
    item: Weak<dyn PreferenceItem>,
    any: Weak<dyn Any + Send + Sync>,
}

impl Entry {
    fn new<T: PreferenceValue>(item: &Arc<PrefItem<T>>) -> Self {
        let erased: Arc<dyn PreferenceItem> = item.clone();
        let any: Arc<dyn Any + Send + Sync> = item.clone();
        Self {
            item: Arc::downgrade(&erased),
            any: Arc::downgrade(&any),
        }
    }

    fn is_live(&self) -> bool {
        self.item.strong_count() > 0
    }

    fn downcast<T: PreferenceValue>(&self, key: &str) -> Option<Arc<PrefItem<T>>> {
        let any = self.any.upgrade()?;
        match any.downcast::<PrefItem<T>>() {
            Ok(item) => Some(item),
            Err(_) => {
                let found = self.item.upgrade().map_or("unknown", |item| item.value_kind());
                let err = BindingError::KeyTypeMismatch {
                    key: key.to_owned(),
                    expected: T::KIND,
                    found,
                };
                tracing::error!(key, expected = T::KIND, found, "{err}");
                None
            }
        }
    }
}

/// Bindings created for one preference store, keyed by preference key.
///
/// Entries are held weakly: a binding stays recorded while anything holds
/// it, and a dropped binding is replaced on the next `bind`. Bindings keep
/// their store alive, so a strong table would leak every store.
#[derive(Default)]
pub struct BindingTable {
    entries: RwLock<AHashMap<String, Entry>>,
    attached: AtomicBool,
}

impl BindingTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The binding recorded for `key`, if it binds values of type `T`.
    ///
    /// A binding of another type is logged and treated as absent.
    #[must_use]
    pub fn lookup<T: PreferenceValue>(&self, key: &str) -> Option<Arc<PrefItem<T>>> {
        self.read().get(key).and_then(|entry| entry.downcast::<T>(key))
    }

    /// Record `item` under its key, replacing any previous binding.
    pub fn store<T: PreferenceValue>(&self, item: &Arc<PrefItem<T>>) {
        let mut entries = self.write();
        entries.retain(|_, entry| entry.is_live());
        entries.insert(item.key().to_owned(), Entry::new(item));
    }

    /// Number of live bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().values().filter(|e| e.is_live()).count()
    }

    /// Whether no live binding is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `check_for_change()` on every live binding.
    pub fn check_all(&self) {
        let items: Vec<Arc<dyn PreferenceItem>> =
            self.read().values().filter_map(|e| e.item.upgrade()).collect();
        for item in items {
            item.check_for_change();
        }
    }

    /// Register the store listener that re-checks this table, once per table.
    fn attach(&self, store: &Arc<dyn Preferences>) {
        if self.attached.swap(true, Ordering::AcqRel) {
            return;
        }
        let weak: Weak<dyn Preferences> = Arc::downgrade(store);
        store.add_change_listener(Box::new(move || {
            if let Some(store) = weak.upgrade() {
                store.bindings().check_all();
            }
        }));
    }

    fn read(&self) -> RwLockReadGuard<'_, AHashMap<String, Entry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, AHashMap<String, Entry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for BindingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingTable")
            .field("bindings", &self.len())
            .finish()
    }
}

/// Look up the binding for `key` among those created for `store`.
///
/// Returns `None` when no binding exists or when the existing one binds a
/// different value type; callers should create a fresh binding in both cases.
#[must_use]
pub fn lookup_existing_binding<T: PreferenceValue>(
    key: &str,
    store: &dyn Preferences,
) -> Option<Arc<PrefItem<T>>> {
    store.bindings().lookup(key)
}

/// A handle for creating bindings over one preference store.
///
/// Handles are interchangeable: all of them share the store's table.
#[derive(Clone)]
pub struct PreferenceBindings {
    store: Arc<dyn Preferences>,
}

impl PreferenceBindings {
    /// Wrap `store`.
    ///
    /// The first handle for a store registers the change listener that
    /// re-checks every binding in the store's table.
    #[must_use]
    pub fn new(store: Arc<dyn Preferences>) -> Self {
        store.bindings().attach(&store);
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Preferences> {
        &self.store
    }

    /// The table of bindings created for this store.
    #[must_use]
    pub fn table(&self) -> &BindingTable {
        self.store.bindings()
    }

    /// The binding for `key`, created on first use.
    ///
    /// If `key` is already bound to another value type, a new independent
    /// binding replaces it in the table.
    pub fn bind<T: PreferenceValue>(&self, key: &str) -> Arc<PrefItem<T>> {
        let mut entries = self.table().write();
        if let Some(existing) = entries.get(key).and_then(|e| e.downcast::<T>(key)) {
            return existing;
        }
        let item = Arc::new(PrefItem::<T>::new(key, Arc::clone(&self.store)));
        entries.retain(|_, entry| entry.is_live());
        entries.insert(key.to_owned(), Entry::new(&item));
        drop(entries);

        tracing::debug!(key, kind = T::KIND, "created preference binding");
        item
    }

    /// Boolean binding for `key`.
    pub fn bind_bool(&self, key: &str) -> Arc<PrefItem<bool>> {
        self.bind(key)
    }

    /// Float binding for `key`.
    pub fn bind_float(&self, key: &str) -> Arc<PrefItem<f64>> {
        self.bind(key)
    }

    /// Integer binding for `key`.
    pub fn bind_int(&self, key: &str) -> Arc<PrefItem<i64>> {
        self.bind(key)
    }

    /// String binding for `key`.
    pub fn bind_string(&self, key: &str) -> Arc<PrefItem<String>> {
        self.bind(key)
    }
}

impl std::fmt::Debug for PreferenceBindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferenceBindings")
            .field("table", self.table())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::super::memory::InMemoryPreferences;
    use super::*;
    use crate::item::Bindable;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    fn bindings() -> (Arc<InMemoryPreferences>, PreferenceBindings) {
        let prefs = Arc::new(InMemoryPreferences::new());
        let bindings = PreferenceBindings::new(prefs.clone());
        (prefs, bindings)
    }

    #[test]
    fn bind_returns_same_instance_per_key() {
        let (_, bindings) = bindings();
        let a = bindings.bind_int("count");
        let b = bindings.bind_int("count");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(bindings.table().len(), 1);

        let other = bindings.bind_int("other");
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[test]
    fn lookup_missing_key_is_none() {
        let (prefs, _bindings) = bindings();
        assert!(lookup_existing_binding::<i64>("nope", &*prefs).is_none());
    }

    #[test]
    fn lookup_finds_matching_type() {
        let (prefs, bindings) = bindings();
        let created = bindings.bind_string("name");
        let found = lookup_existing_binding::<String>("name", &*prefs).unwrap();
        assert!(Arc::ptr_eq(&created, &found));
    }

    #[test]
    #[traced_test]
    fn lookup_type_mismatch_is_logged_and_not_found() {
        let (prefs, bindings) = bindings();
        let _name = bindings.bind_string("k");

        assert!(lookup_existing_binding::<i64>("k", &*prefs).is_none());
        assert!(logs_contain("a different type is already bound to key 'k'"));
    }

    #[test]
    #[traced_test]
    fn bind_with_wrong_type_creates_fresh_binding() {
        let (prefs, bindings) = bindings();
        let _name = bindings.bind_string("k");
        let int = bindings.bind_int("k");
        int.set(4).unwrap();
        assert_eq!(int.get().unwrap(), 4);

        assert!(lookup_existing_binding::<i64>("k", &*prefs).is_some());
        assert!(lookup_existing_binding::<String>("k", &*prefs).is_none());
    }

    #[test]
    fn store_replaces_entry() {
        let table = BindingTable::new();
        let prefs: Arc<dyn Preferences> = Arc::new(InMemoryPreferences::new());
        let first = Arc::new(PrefItem::<bool>::new("flag", Arc::clone(&prefs)));
        let second = Arc::new(PrefItem::<bool>::new("flag", prefs));
        table.store(&first);
        table.store(&second);
        assert_eq!(table.len(), 1);
        assert!(Arc::ptr_eq(&table.lookup::<bool>("flag").unwrap(), &second));
    }

    #[test]
    fn store_change_rechecks_bindings() {
        let (prefs, bindings) = bindings();
        let volume = bindings.bind_int("volume");
        volume.get().unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        volume.add_listener(Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        count.store(0, Ordering::SeqCst);

        prefs.set_int("volume", 7);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Writes to other keys leave a fresh binding silent.
        volume.get().unwrap();
        prefs.set_bool("mute", true);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handles_over_one_store_share_bindings() {
        let (prefs, first) = bindings();
        let second = PreferenceBindings::new(prefs.clone());

        let a = first.bind_int("volume");
        let b = second.bind_int("volume");
        assert!(Arc::ptr_eq(&a, &b));

        let found = lookup_existing_binding::<i64>("volume", &*prefs).unwrap();
        assert!(Arc::ptr_eq(&a, &found));
        assert_eq!(second.table().len(), 1);
    }

    #[test]
    fn separate_stores_have_separate_bindings() {
        let (_, first) = bindings();
        let (_, second) = bindings();
        assert!(!Arc::ptr_eq(&first.bind_int("volume"), &second.bind_int("volume")));
    }

    #[test]
    fn store_listener_registered_once() {
        let prefs = Arc::new(InMemoryPreferences::new());
        for _ in 0..5 {
            drop(PreferenceBindings::new(prefs.clone()));
        }
        assert_eq!(prefs.change_listener_count(), 1);

        let volume = PreferenceBindings::new(prefs.clone()).bind_int("volume");
        volume.get().unwrap();
        prefs.set_int("volume", 2);
        assert_eq!(volume.cached(), Some(2));
    }

    #[test]
    fn dropped_binding_is_replaced() {
        let (prefs, bindings) = bindings();
        let first = bindings.bind_int("volume");
        let weak = Arc::downgrade(&first);
        drop(first);
        assert!(weak.upgrade().is_none());
        assert!(bindings.table().is_empty());
        assert!(lookup_existing_binding::<i64>("volume", &*prefs).is_none());

        let second = bindings.bind_int("volume");
        assert!(Arc::ptr_eq(&second, &bindings.bind_int("volume")));
        // Writes reach only live bindings.
        prefs.set_int("volume", 3);
    }

    #[test]
    fn store_drops_with_its_bindings() {
        let prefs = Arc::new(InMemoryPreferences::new());
        let weak = Arc::downgrade(&prefs);
        let bindings = PreferenceBindings::new(prefs);
        let volume = bindings.bind_int("volume");
        drop(bindings);
        assert!(weak.upgrade().is_some());
        drop(volume);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn concurrent_bind_yields_single_instance() {
        let (_, bindings) = bindings();
        let bindings = Arc::new(bindings);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let b = Arc::clone(&bindings);
                std::thread::spawn(move || b.bind_float("scale"))
            })
            .collect();
        let items: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(items.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
