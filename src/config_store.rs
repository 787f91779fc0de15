/// Settings store synchronized across extension surfaces
///
/// The canonical record lives in the shared storage area. Every surface
/// holds a snapshot that goes stale as soon as another surface writes;
/// snapshots are refreshed through `subscribe` or another `read`.
///
/// `write` is read-modify-write without a transaction: two surfaces writing
/// at the same time race and the last write wins. The host storage offers
/// no compare-and-swap, so the race is accepted rather than hidden.

use crate::config::{self, Configuration, SETTINGS_KEY};
use crate::storage::{KeyValueStore, StorageChange, StorageError, Subscription};
use std::rc::Rc;

pub struct ConfigStore<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> ConfigStore<S> {
    pub fn new(store: S) -> Self {
        ConfigStore { store }
    }

    /// Read the current settings. Never fails; unusable data reads as defaults.
    ///
    /// Records written by older releases are backfilled and persisted once,
    /// so an immediate second read finds a current record and writes nothing.
    pub async fn read(&self) -> Configuration {
        let raw = match self.store.get(SETTINGS_KEY).await {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("Could not read settings, using defaults: {}", e);
                return Configuration::default();
            }
        };

        let decoded = config::decode(raw.as_ref());
        if !decoded.needs_persist() {
            return decoded.into_configuration();
        }

        let migrated = decoded.into_configuration();
        log::info!("Migrating stored settings to the current layout");
        if let Err(e) = self.persist(&migrated).await {
            log::warn!("Could not persist migrated settings: {}", e);
        }
        migrated
    }

    /// Apply `updater` to the latest settings and persist the result
    pub async fn write<F>(&self, updater: F) -> Result<Configuration, StorageError>
    where
        F: FnOnce(Configuration) -> Configuration,
    {
        let updated = updater(self.read().await);
        self.persist(&updated).await?;
        log::debug!("Settings written");
        Ok(updated)
    }

    /// Receive the new settings after every write from any surface.
    ///
    /// Delivery may repeat an identical value. Each delivered record is
    /// authoritative: replace the local snapshot with it.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Configuration) + 'static,
    {
        self.store.watch(
            SETTINGS_KEY,
            Rc::new(move |change: &StorageChange| {
                callback(config::decode(change.new_value.as_ref()).into_configuration())
            }),
        )
    }

    async fn persist(&self, config: &Configuration) -> Result<(), StorageError> {
        let value = config
            .to_value()
            .map_err(|e| StorageError::Serialize(e.to_string()))?;
        self.store.set(SETTINGS_KEY, value).await
    }
}
