//! Indexed Database Driver
//!
//! `TigerStyle`: Each instance is one object store inside a versioned
//! database. Instances naming the same database share its connection
//! through a [`DbContext`].

mod context;
mod host;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

pub use context::{ConnectionContexts, DbContext};
pub use host::{Connection, IndexedDbHost, Upgrade};

use crate::config::StoreConfig;
use crate::constants::DRIVER_NAME_INDEXED;
use crate::driver::{Driver, DriverStore, DropTarget, IterateFn, SupportCheck};
use crate::error::StoreResult;

/// Driver over an [`IndexedDbHost`], registered as `asyncStorage`.
#[derive(Debug, Clone)]
pub struct IndexedDriver {
    host: Arc<IndexedDbHost>,
    contexts: Arc<ConnectionContexts>,
}

impl IndexedDriver {
    /// Driver over `host`, sharing connections through `contexts`.
    #[must_use]
    pub fn new(host: Arc<IndexedDbHost>, contexts: Arc<ConnectionContexts>) -> Self {
        Self { host, contexts }
    }

    /// The database host.
    #[must_use]
    pub fn host(&self) -> &Arc<IndexedDbHost> {
        &self.host
    }

    /// The connection context table.
    #[must_use]
    pub fn contexts(&self) -> &Arc<ConnectionContexts> {
        &self.contexts
    }
}

impl Default for IndexedDriver {
    /// Driver over the process-wide host and context table.
    fn default() -> Self {
        Self::new(IndexedDbHost::global(), ConnectionContexts::global())
    }
}

#[async_trait]
impl Driver for IndexedDriver {
    fn name(&self) -> &str {
        DRIVER_NAME_INDEXED
    }

    fn support(&self) -> SupportCheck {
        SupportCheck::Known(self.host.is_available())
    }

    #[tracing::instrument(skip(self, config), fields(database = %config.name, store = %config.store_name))]
    async fn init_storage(&self, config: &StoreConfig) -> StoreResult<Arc<dyn DriverStore>> {
        let context = self.contexts.context(&config.name);
        context
            .initialize(&self.host, &config.store_name, config.version_number())
            .await?;
        let attachment = context.attach(&config.store_name);

        Ok(Arc::new(IndexedStore {
            host: Arc::clone(&self.host),
            contexts: Arc::clone(&self.contexts),
            context,
            store: config.store_name.clone(),
            attachment,
        }))
    }
}

struct IndexedStore {
    host: Arc<IndexedDbHost>,
    contexts: Arc<ConnectionContexts>,
    context: Arc<DbContext>,
    store: String,
    attachment: u64,
}

impl IndexedStore {
    async fn run<T>(&self, op: impl Fn(&Connection, &str) -> StoreResult<T> + Send + Sync) -> StoreResult<T> {
        let store = self.store.as_str();
        self.context
            .run(&self.host, store, |connection| op(connection, store))
            .await
    }
}

#[async_trait]
impl DriverStore for IndexedStore {
    async fn get_item(&self, key: &str) -> StoreResult<Option<Value>> {
        self.run(|connection, store| connection.get(store, key)).await
    }

    async fn set_item(&self, key: &str, value: Value) -> StoreResult<Value> {
        self.run(|connection, store| connection.put(store, key, value.clone()))
            .await?;
        Ok(value)
    }

    async fn remove_item(&self, key: &str) -> StoreResult<()> {
        self.run(|connection, store| connection.delete(store, key)).await
    }

    async fn clear(&self) -> StoreResult<()> {
        self.run(|connection, store| connection.clear(store)).await
    }

    async fn length(&self) -> StoreResult<usize> {
        self.run(|connection, store| connection.count(store)).await
    }

    async fn key(&self, index: usize) -> StoreResult<Option<String>> {
        self.run(|connection, store| connection.key_at(store, index)).await
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        self.run(|connection, store| connection.keys(store)).await
    }

    async fn iterate(&self, iterator: &mut IterateFn<'_>) -> StoreResult<Option<Value>> {
        let entries = self.run(|connection, store| connection.entries(store)).await?;
        for (number, (key, value)) in (1u64..).zip(entries) {
            if let Some(result) = iterator(value, &key, number) {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    async fn drop_instance(&self, target: &DropTarget) -> StoreResult<()> {
        let context = self.contexts.context(&target.name);
        match &target.store_name {
            Some(store) => context.drop_store(&self.host, store).await,
            None => context.drop_database(&self.host).await,
        }
    }
}

impl Drop for IndexedStore {
    fn drop(&mut self) {
        self.context.detach(self.attachment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigOptions;
    use crate::error::StoreError;
    use serde_json::json;

    fn driver() -> IndexedDriver {
        IndexedDriver::new(Arc::new(IndexedDbHost::new()), Arc::new(ConnectionContexts::new()))
    }

    fn config(name: &str, store: &str) -> StoreConfig {
        StoreConfig::default()
            .merge(&ConfigOptions::new().with_name(name).with_store_name(store))
            .unwrap()
    }

    #[tokio::test]
    async fn test_round_trip_keeps_json_structure() {
        let driver = driver();
        let store = driver.init_storage(&config("db", "s")).await.unwrap();
        let value = json!({"n": 1.5, "list": [true, null, "x"]});

        store.set_item("k", value.clone()).await.unwrap();
        assert_eq!(store.get_item("k").await.unwrap(), Some(value));
        assert_eq!(store.get_item("missing").await.unwrap(), None);
        assert_eq!(store.key(0).await.unwrap().as_deref(), Some("k"));
    }

    #[tokio::test]
    async fn test_attach_tracks_instances() {
        let driver = driver();
        let a = driver.init_storage(&config("db", "a")).await.unwrap();
        let b = driver.init_storage(&config("db", "b")).await.unwrap();
        let context = driver.contexts().context("db");
        assert_eq!(context.attached_stores(), vec!["a", "b"]);

        drop(a);
        assert_eq!(context.attached_stores(), vec!["b"]);
        drop(b);
        assert!(context.attached_stores().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_store_rejects_operations() {
        let driver = driver();
        let store = driver.init_storage(&config("db", "s")).await.unwrap();
        store.set_item("k", json!(1)).await.unwrap();

        store
            .drop_instance(&DropTarget {
                name: "db".to_string(),
                store_name: Some("s".to_string()),
            })
            .await
            .unwrap();
        assert!(matches!(
            store.get_item("k").await.unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }

    #[test]
    fn test_unavailable_host_is_unsupported() {
        let driver = IndexedDriver::new(
            Arc::new(IndexedDbHost::unavailable()),
            Arc::new(ConnectionContexts::new()),
        );
        assert_eq!(driver.support(), SupportCheck::Known(false));
    }
}
