//! Key-value storage the session layer runs on.
//!
//! Two namespaces matter to the client: one store shared by every tab of the
//! origin (`SharedStorage`, the role `localStorage` plays in a browser) and one
//! private to a single tab (`Storage`, the role of `sessionStorage`). Writes to
//! a shared store are announced to the *other* tabs through `StorageEvent`s;
//! a tab never hears about its own writes.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

/// A change to a shared store as seen by a sibling tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// `None` when the whole store was cleared.
    pub key: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

pub type StorageListener = Arc<dyn Fn(&StorageEvent) + Send + Sync>;

pub trait Storage: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: &str);
    fn remove_item(&self, key: &str);
    fn clear(&self);
    fn keys(&self) -> Vec<String>;
}

pub trait SharedStorage: Storage {
    /// Registers `listener` for changes made through other handles. The
    /// listener stays registered until the returned `Subscription` is dropped.
    fn subscribe(&self, listener: StorageListener) -> Subscription;
}

// ==== SUBSCRIBERS ====

/// Origin tag of the handle that performed a write. `None` means the write
/// came from outside the process (another process touching a shared file).
pub(crate) type Origin = Option<u64>;

#[derive(Default)]
struct SubscriberTable {
    next_id: u64,
    entries: Vec<(u64, u64, StorageListener)>,
}

#[derive(Clone, Default)]
pub(crate) struct Subscribers {
    table: Arc<Mutex<SubscriberTable>>,
}

impl Subscribers {
    pub(crate) fn add(&self, origin: u64, listener: StorageListener) -> Subscription {
        let mut table = self.table.lock();
        let id = table.next_id;
        table.next_id += 1;
        table.entries.push((id, origin, listener));
        Subscription {
            id,
            table: Arc::downgrade(&self.table),
        }
    }

    /// Delivers `event` to every listener not registered by `origin`.
    /// Listeners run after the table lock is released so they may write back
    /// into storage or unsubscribe.
    pub(crate) fn dispatch(&self, origin: Origin, event: &StorageEvent) {
        let targets: Vec<StorageListener> = self
            .table
            .lock()
            .entries
            .iter()
            .filter(|(_, listener_origin, _)| Some(*listener_origin) != origin)
            .map(|(_, _, listener)| listener.clone())
            .collect();
        for listener in targets {
            listener(event);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.table.lock().entries.len()
    }
}

/// Keeps a storage listener registered; dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    table: Weak<Mutex<SubscriberTable>>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            table.lock().entries.retain(|(id, _, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

// ==== PER-TAB STORE ====

#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.read().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) {
        self.items.write().insert(key.to_string(), value.to_string());
    }

    fn remove_item(&self, key: &str) {
        self.items.write().remove(key);
    }

    fn clear(&self) {
        self.items.write().clear();
    }

    fn keys(&self) -> Vec<String> {
        self.items.read().keys().cloned().collect()
    }
}

// ==== SHARED IN-PROCESS STORE ====

#[derive(Default)]
struct LocalBus {
    items: RwLock<BTreeMap<String, String>>,
    subscribers: Subscribers,
    next_origin: AtomicU64,
}

/// In-process stand-in for the browser's shared storage. Every handle created
/// with [`LocalStorage::tab`] sees the same items but acts as a separate tab
/// for change notifications.
#[derive(Clone)]
pub struct LocalStorage {
    bus: Arc<LocalBus>,
    origin: u64,
}

impl LocalStorage {
    pub fn new() -> Self {
        let bus = Arc::new(LocalBus::default());
        let origin = bus.next_origin.fetch_add(1, Ordering::Relaxed);
        Self { bus, origin }
    }

    /// Another tab handle onto the same items.
    pub fn tab(&self) -> Self {
        let origin = self.bus.next_origin.fetch_add(1, Ordering::Relaxed);
        Self {
            bus: self.bus.clone(),
            origin,
        }
    }

    fn announce(&self, key: Option<&str>, old_value: Option<String>, new_value: Option<String>) {
        let event = StorageEvent {
            key: key.map(str::to_string),
            old_value,
            new_value,
        };
        self.bus.subscribers.dispatch(Some(self.origin), &event);
    }
}

impl Default for LocalStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for LocalStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.bus.items.read().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) {
        let old = self
            .bus
            .items
            .write()
            .insert(key.to_string(), value.to_string());
        if old.as_deref() != Some(value) {
            self.announce(Some(key), old, Some(value.to_string()));
        }
    }

    fn remove_item(&self, key: &str) {
        let old = self.bus.items.write().remove(key);
        if old.is_some() {
            self.announce(Some(key), old, None);
        }
    }

    fn clear(&self) {
        let had_items = {
            let mut items = self.bus.items.write();
            let had_items = !items.is_empty();
            items.clear();
            had_items
        };
        if had_items {
            self.announce(None, None, None);
        }
    }

    fn keys(&self) -> Vec<String> {
        self.bus.items.read().keys().cloned().collect()
    }
}

impl SharedStorage for LocalStorage {
    fn subscribe(&self, listener: StorageListener) -> Subscription {
        self.bus.subscribers.add(self.origin, listener)
    }
}
