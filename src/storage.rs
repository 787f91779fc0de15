/// Key-value storage abstraction shared by every extension surface

use async_trait::async_trait;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// Errors reported by a storage backend
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to read storage key {key}: {reason}")]
    Read { key: String, reason: String },

    #[error("Failed to write storage key {key}: {reason}")]
    Write { key: String, reason: String },

    #[error("Failed to serialize value: {0}")]
    Serialize(String),
}

/// A single key change, delivered to every listener watching the key
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

pub type ChangeListener = Rc<dyn Fn(&StorageChange)>;

/// Persistent storage scoped to the extension.
///
/// Writes made by any context sharing the storage area are reported to all
/// listeners registered through [`KeyValueStore::watch`], including the
/// context that made the write.
#[async_trait(?Send)]
pub trait KeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Register `listener` for changes to `key`. The listener stays
    /// registered until the returned [`Subscription`] is dropped.
    fn watch(&self, key: &str, listener: ChangeListener) -> Subscription;
}

/// Handle for a registered listener; dropping it unregisters the listener
#[must_use = "dropping a Subscription unregisters the listener"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Subscription {
        Subscription {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Subscription that owns nothing, for backends without change events
    pub fn detached() -> Subscription {
        Subscription { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// In-process storage area.
///
/// Clones share the same underlying map, so two clones behave like two
/// extension surfaces attached to one `chrome.storage` area.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Rc<RefCell<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    values: HashMap<String, Value>,
    listeners: Vec<(u64, String, ChangeListener)>,
    next_listener_id: u64,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw value without counting it as a write or notifying anyone
    pub fn insert_raw(&self, key: &str, value: Value) {
        self.inner.borrow_mut().values.insert(key.to_string(), value);
    }

    pub fn raw(&self, key: &str) -> Option<Value> {
        self.inner.borrow().values.get(key).cloned()
    }

    /// Number of `set`/`remove` calls that reached the store
    pub fn write_count(&self) -> usize {
        self.inner.borrow().writes
    }

    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    fn notify(&self, change: StorageChange) {
        // Listeners may call back into the store, so release the borrow first
        let listeners: Vec<ChangeListener> = self
            .inner
            .borrow()
            .listeners
            .iter()
            .filter(|(_, key, _)| *key == change.key)
            .map(|(_, _, listener)| listener.clone())
            .collect();

        for listener in listeners {
            listener(&change);
        }
    }
}

#[async_trait(?Send)]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.raw(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let old_value = {
            let mut inner = self.inner.borrow_mut();
            inner.writes += 1;
            inner.values.insert(key.to_string(), value.clone())
        };

        self.notify(StorageChange {
            key: key.to_string(),
            old_value,
            new_value: Some(value),
        });
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let old_value = {
            let mut inner = self.inner.borrow_mut();
            inner.writes += 1;
            inner.values.remove(key)
        };

        if old_value.is_some() {
            self.notify(StorageChange {
                key: key.to_string(),
                old_value,
                new_value: None,
            });
        }
        Ok(())
    }

    fn watch(&self, key: &str, listener: ChangeListener) -> Subscription {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_listener_id;
            inner.next_listener_id += 1;
            inner.listeners.push((id, key.to_string(), listener));
            id
        };

        let weak: Weak<RefCell<MemoryInner>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.borrow_mut().listeners.retain(|(other, _, _)| *other != id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use serde_json::json;
    use std::cell::Cell;

    #[test]
    fn test_get_missing_key() {
        let store = MemoryStore::new();
        assert_eq!(block_on(store.get("settings")), Ok(None));
    }

    #[test]
    fn test_set_then_get() {
        let store = MemoryStore::new();
        block_on(store.set("settings", json!({"a": 1}))).unwrap();

        assert_eq!(block_on(store.get("settings")), Ok(Some(json!({"a": 1}))));
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_clones_share_values() {
        let popup = MemoryStore::new();
        let background = popup.clone();

        block_on(popup.set("settings", json!(true))).unwrap();

        assert_eq!(background.raw("settings"), Some(json!(true)));
    }

    #[test]
    fn test_watch_receives_old_and_new_values() {
        let store = MemoryStore::new();
        store.insert_raw("settings", json!(1));

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _subscription = store.watch(
            "settings",
            Rc::new(move |change: &StorageChange| sink.borrow_mut().push(change.clone())),
        );

        block_on(store.set("settings", json!(2))).unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].old_value, Some(json!(1)));
        assert_eq!(seen[0].new_value, Some(json!(2)));
    }

    #[test]
    fn test_watch_ignores_other_keys() {
        let store = MemoryStore::new();
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let _subscription = store.watch("settings", Rc::new(move |_: &StorageChange| {
            counter.set(counter.get() + 1)
        }));

        block_on(store.set("other", json!("x"))).unwrap();

        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_dropping_subscription_unregisters() {
        let store = MemoryStore::new();
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let subscription = store.watch("settings", Rc::new(move |_: &StorageChange| {
            counter.set(counter.get() + 1)
        }));
        assert_eq!(store.listener_count(), 1);

        drop(subscription);
        block_on(store.set("settings", json!(1))).unwrap();

        assert_eq!(store.listener_count(), 0);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_remove_notifies_with_empty_new_value() {
        let store = MemoryStore::new();
        store.insert_raw("request", json!("all"));

        let seen = Rc::new(RefCell::new(None));
        let sink = seen.clone();
        let _subscription = store.watch("request", Rc::new(move |change: &StorageChange| {
            *sink.borrow_mut() = Some(change.new_value.clone())
        }));

        block_on(store.remove("request")).unwrap();

        assert_eq!(*seen.borrow(), Some(None));
        assert_eq!(store.raw("request"), None);
    }
}
