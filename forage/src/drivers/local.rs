//! Local Storage Driver
//!
//! `TigerStyle`: A flat, synchronous, string-to-string area with a byte
//! quota. Databases and stores are emulated with key prefixes:
//!
//! ```text
//!   name/key              (default store)
//!   name/storeName/key    (any other store)
//! ```
//!
//! Because the default store's prefix is a prefix of every other store's,
//! clearing or dropping the default store of a database also removes the
//! entries of that database's other stores.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::constants::{
    CONFIG_STORE_NAME_DEFAULT, DRIVER_NAME_LOCAL, ENV_LOCAL_STORAGE_PATH,
    LOCAL_STORAGE_QUOTA_BYTES_DEFAULT, LOCAL_STORAGE_SUPPORT_TEST_KEY,
};
use crate::driver::{Driver, DriverStore, DropTarget, IterateFn, SupportCheck};
use crate::error::{StoreError, StoreResult};
use crate::serializer::{JsonSerializer, Serializer};

static GLOBAL_AREA: Lazy<Arc<LocalStorageArea>> = Lazy::new(|| {
    let Ok(path) = std::env::var(ENV_LOCAL_STORAGE_PATH) else {
        return Arc::new(LocalStorageArea::new());
    };
    match LocalStorageArea::open(&path) {
        Ok(area) => Arc::new(area),
        Err(err) => {
            warn!(%path, error = %err, "local storage file unusable, falling back to memory");
            Arc::new(LocalStorageArea::new())
        }
    }
});

// =============================================================================
// Storage Area
// =============================================================================

/// The flat string area itself, optionally persisted to a JSON file.
#[derive(Debug)]
pub struct LocalStorageArea {
    entries: Mutex<BTreeMap<String, String>>,
    quota_bytes: usize,
    path: Option<PathBuf>,
}

impl LocalStorageArea {
    /// Empty in-memory area with the default quota.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            quota_bytes: LOCAL_STORAGE_QUOTA_BYTES_DEFAULT,
            path: None,
        }
    }

    /// Area persisted to `path`, loading what is already there.
    ///
    /// # Errors
    /// Returns `Read` if the file exists but cannot be read, or
    /// `Deserialization` if it does not hold a JSON string map.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(StoreError::read(format!("{}: {err}", path.display()))),
        };
        debug!(path = %path.display(), "opened local storage area");

        Ok(Self {
            entries: Mutex::new(entries),
            quota_bytes: LOCAL_STORAGE_QUOTA_BYTES_DEFAULT,
            path: Some(path),
        })
    }

    /// Set the byte quota.
    #[must_use]
    pub fn with_quota(mut self, quota_bytes: usize) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    /// The process-wide area, persisted to `FORAGE_LOCAL_STORAGE_PATH` when set.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_AREA)
    }

    /// Bytes in use: UTF-8 length of every key and value.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        Self::usage(&self.entries.lock())
    }

    /// Read one entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    /// Write one entry.
    ///
    /// # Errors
    /// - `QuotaExceeded` if the area would grow past its quota
    /// - `Write` if the backing file cannot be written; the entry is reverted
    pub fn set(&self, key: &str, value: String) -> StoreResult<()> {
        let mut entries = self.entries.lock();

        let current = entries.get(key).map_or(0, |old| key.len() + old.len());
        let used = Self::usage(&entries) - current + key.len() + value.len();
        if used > self.quota_bytes {
            return Err(StoreError::QuotaExceeded {
                used,
                quota: self.quota_bytes,
            });
        }

        let previous = entries.insert(key.to_string(), value);
        if let Err(err) = self.persist(&entries) {
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(err);
        }
        Ok(())
    }

    /// Remove one entry. Removing an absent key succeeds.
    ///
    /// # Errors
    /// Returns `Write` if the backing file cannot be written.
    pub fn remove(&self, key: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }

    /// Keys starting with `prefix`, in key order, prefix stripped.
    #[must_use]
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries
            .lock()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key[prefix.len()..].to_string())
            .collect()
    }

    /// Entries starting with `prefix`, in key order, prefix stripped.
    #[must_use]
    pub fn entries_with_prefix(&self, prefix: &str) -> Vec<(String, String)> {
        self.entries
            .lock()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key[prefix.len()..].to_string(), value.clone()))
            .collect()
    }

    /// Remove every entry starting with `prefix`.
    ///
    /// # Errors
    /// Returns `Write` if the backing file cannot be written.
    pub fn remove_prefix(&self, prefix: &str) -> StoreResult<usize> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - entries.len();
        if removed > 0 {
            self.persist(&entries)?;
        }
        Ok(removed)
    }

    /// Whether a write and remove of a probe key succeed.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.set(LOCAL_STORAGE_SUPPORT_TEST_KEY, String::from("1"))
            .and_then(|()| self.remove(LOCAL_STORAGE_SUPPORT_TEST_KEY))
            .is_ok()
    }

    fn usage(entries: &BTreeMap<String, String>) -> usize {
        entries.iter().map(|(key, value)| key.len() + value.len()).sum()
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let text = serde_json::to_string(entries)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        std::fs::write(path, text)
            .map_err(|e| StoreError::write(format!("{}: {e}", path.display())))
    }
}

impl Default for LocalStorageArea {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Driver
// =============================================================================

/// Driver over a [`LocalStorageArea`], registered as `localStorageWrapper`.
pub struct LocalStorageDriver {
    area: Arc<LocalStorageArea>,
    serializer: Arc<dyn Serializer>,
}

impl LocalStorageDriver {
    /// Driver over `area`.
    #[must_use]
    pub fn new(area: Arc<LocalStorageArea>) -> Self {
        Self {
            area,
            serializer: Arc::new(JsonSerializer),
        }
    }

    /// Driver over the process-wide area.
    #[must_use]
    pub fn global() -> Self {
        Self::new(LocalStorageArea::global())
    }

    /// Use a different value serializer.
    #[must_use]
    pub fn with_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// The area this driver stores into.
    #[must_use]
    pub fn area(&self) -> &Arc<LocalStorageArea> {
        &self.area
    }
}

fn key_prefix(name: &str, store_name: &str) -> String {
    if store_name == CONFIG_STORE_NAME_DEFAULT {
        format!("{name}/")
    } else {
        format!("{name}/{store_name}/")
    }
}

#[async_trait]
impl Driver for LocalStorageDriver {
    fn name(&self) -> &str {
        DRIVER_NAME_LOCAL
    }

    fn support(&self) -> SupportCheck {
        SupportCheck::Known(self.area.is_usable())
    }

    async fn init_storage(&self, config: &StoreConfig) -> StoreResult<Arc<dyn DriverStore>> {
        Ok(Arc::new(LocalStore {
            area: Arc::clone(&self.area),
            prefix: key_prefix(&config.name, &config.store_name),
            serializer: Arc::clone(&self.serializer),
        }))
    }
}

struct LocalStore {
    area: Arc<LocalStorageArea>,
    prefix: String,
    serializer: Arc<dyn Serializer>,
}

#[async_trait]
impl DriverStore for LocalStore {
    async fn get_item(&self, key: &str) -> StoreResult<Option<Value>> {
        self.area
            .get(&format!("{}{key}", self.prefix))
            .map(|text| self.serializer.deserialize(&text))
            .transpose()
    }

    async fn set_item(&self, key: &str, value: Value) -> StoreResult<Value> {
        let text = self.serializer.serialize(&value)?;
        self.area.set(&format!("{}{key}", self.prefix), text)?;
        Ok(value)
    }

    async fn remove_item(&self, key: &str) -> StoreResult<()> {
        self.area.remove(&format!("{}{key}", self.prefix))
    }

    async fn clear(&self) -> StoreResult<()> {
        self.area.remove_prefix(&self.prefix).map(|_| ())
    }

    async fn length(&self) -> StoreResult<usize> {
        Ok(self.area.keys_with_prefix(&self.prefix).len())
    }

    async fn key(&self, index: usize) -> StoreResult<Option<String>> {
        Ok(self.area.keys_with_prefix(&self.prefix).into_iter().nth(index))
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.area.keys_with_prefix(&self.prefix))
    }

    async fn iterate(&self, iterator: &mut IterateFn<'_>) -> StoreResult<Option<Value>> {
        let entries = self.area.entries_with_prefix(&self.prefix);
        for (number, (key, text)) in (1u64..).zip(entries) {
            let value = self.serializer.deserialize(&text)?;
            if let Some(result) = iterator(value, &key, number) {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    async fn drop_instance(&self, target: &DropTarget) -> StoreResult<()> {
        let prefix = match &target.store_name {
            None => format!("{}/", target.name),
            Some(store_name) => key_prefix(&target.name, store_name),
        };
        let removed = self.area.remove_prefix(&prefix)?;
        debug!(%prefix, removed, "dropped local storage entries");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigOptions;
    use serde_json::json;

    fn config(name: &str, store: &str) -> StoreConfig {
        StoreConfig::default()
            .merge(&ConfigOptions::new().with_name(name).with_store_name(store))
            .unwrap()
    }

    #[test]
    fn test_key_prefix() {
        assert_eq!(key_prefix("app", CONFIG_STORE_NAME_DEFAULT), "app/");
        assert_eq!(key_prefix("app", "cache"), "app/cache/");
    }

    #[test]
    fn test_quota_counts_replacement_once() {
        let area = LocalStorageArea::new().with_quota(10);
        area.set("ab", "12345678".to_string()).unwrap();
        area.set("ab", "87654321".to_string()).unwrap();
        assert_eq!(area.used_bytes(), 10);

        let err = area.set("c", String::new()).unwrap_err();
        assert_eq!(err, StoreError::QuotaExceeded { used: 11, quota: 10 });
        assert_eq!(area.get("c"), None);
    }

    #[test]
    fn test_support_probe_leaves_no_trace() {
        let area = LocalStorageArea::new();
        assert!(area.is_usable());
        assert_eq!(area.used_bytes(), 0);

        assert!(!LocalStorageArea::new().with_quota(0).is_usable());
    }

    #[tokio::test]
    async fn test_stores_share_area_by_prefix() {
        let area = Arc::new(LocalStorageArea::new());
        let driver = LocalStorageDriver::new(Arc::clone(&area));
        let default = driver.init_storage(&config("app", CONFIG_STORE_NAME_DEFAULT)).await.unwrap();
        let cache = driver.init_storage(&config("app", "cache")).await.unwrap();

        default.set_item("k", json!("d")).await.unwrap();
        cache.set_item("k", json!("c")).await.unwrap();

        assert_eq!(area.get("app/k").as_deref(), Some("\"d\""));
        assert_eq!(area.get("app/cache/k").as_deref(), Some("\"c\""));
        assert_eq!(cache.keys().await.unwrap(), vec!["k"]);
        assert_eq!(cache.get_item("k").await.unwrap(), Some(json!("c")));
    }

    #[tokio::test]
    async fn test_drop_store_and_database() {
        let area = Arc::new(LocalStorageArea::new());
        let driver = LocalStorageDriver::new(Arc::clone(&area));
        let cache = driver.init_storage(&config("app", "cache")).await.unwrap();
        let other = driver.init_storage(&config("other", "cache")).await.unwrap();
        cache.set_item("a", json!(1)).await.unwrap();
        other.set_item("a", json!(2)).await.unwrap();

        cache
            .drop_instance(&DropTarget {
                name: "app".to_string(),
                store_name: Some("cache".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(cache.length().await.unwrap(), 0);
        assert_eq!(other.length().await.unwrap(), 1);

        cache
            .drop_instance(&DropTarget {
                name: "other".to_string(),
                store_name: None,
            })
            .await
            .unwrap();
        assert_eq!(area.used_bytes(), 0);
    }

    #[test]
    fn test_persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");

        let area = LocalStorageArea::open(&path).unwrap();
        area.set("app/k", "1".to_string()).unwrap();
        drop(area);

        let reopened = LocalStorageArea::open(&path).unwrap();
        assert_eq!(reopened.get("app/k").as_deref(), Some("1"));
    }
}
