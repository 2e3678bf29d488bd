//! Memory Driver
//!
//! `TigerStyle`: In-process tables of serialized values, keyed
//! database → store → key. Always supported; registered only on request.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::config::StoreConfig;
use crate::constants::DRIVER_NAME_MEMORY;
use crate::driver::{Driver, DriverStore, DropTarget, IterateFn};
use crate::error::StoreResult;
use crate::serializer::{JsonSerializer, Serializer};

type Table = BTreeMap<String, String>;
type Tables = HashMap<String, HashMap<String, Table>>;

/// Driver keeping every database in process memory.
///
/// Clones share the same tables, so a second instance opened on the same
/// name and store sees the first one's writes.
#[derive(Clone)]
pub struct MemoryDriver {
    name: String,
    tables: Arc<Mutex<Tables>>,
    serializer: Arc<dyn Serializer>,
}

impl MemoryDriver {
    /// Memory driver registered as `memoryStorage`.
    #[must_use]
    pub fn new() -> Self {
        Self::named(DRIVER_NAME_MEMORY)
    }

    /// Memory driver under a custom name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Arc::new(Mutex::new(HashMap::new())),
            serializer: Arc::new(JsonSerializer),
        }
    }

    /// Use a different value serializer.
    #[must_use]
    pub fn with_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Names of databases currently held.
    #[must_use]
    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn open_store(&self, config: &StoreConfig) -> MemoryStore {
        self.tables
            .lock()
            .entry(config.name.clone())
            .or_default()
            .entry(config.store_name.clone())
            .or_default();

        MemoryStore {
            tables: Arc::clone(&self.tables),
            database: config.name.clone(),
            store: config.store_name.clone(),
            serializer: Arc::clone(&self.serializer),
        }
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init_storage(&self, config: &StoreConfig) -> StoreResult<Arc<dyn DriverStore>> {
        Ok(Arc::new(self.open_store(config)))
    }
}

/// One store inside the memory tables.
pub(crate) struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    database: String,
    store: String,
    serializer: Arc<dyn Serializer>,
}

impl MemoryStore {
    fn with_table<T>(&self, f: impl FnOnce(&mut Table) -> T) -> T {
        let mut tables = self.tables.lock();
        let table = tables
            .entry(self.database.clone())
            .or_default()
            .entry(self.store.clone())
            .or_default();
        f(table)
    }
}

#[async_trait]
impl DriverStore for MemoryStore {
    async fn get_item(&self, key: &str) -> StoreResult<Option<Value>> {
        let raw = self.with_table(|table| table.get(key).cloned());
        raw.map(|text| self.serializer.deserialize(&text)).transpose()
    }

    async fn set_item(&self, key: &str, value: Value) -> StoreResult<Value> {
        let text = self.serializer.serialize(&value)?;
        self.with_table(|table| table.insert(key.to_string(), text));
        Ok(value)
    }

    async fn remove_item(&self, key: &str) -> StoreResult<()> {
        self.with_table(|table| table.remove(key));
        Ok(())
    }

    async fn clear(&self) -> StoreResult<()> {
        self.with_table(Table::clear);
        Ok(())
    }

    async fn length(&self) -> StoreResult<usize> {
        Ok(self.with_table(|table| table.len()))
    }

    async fn key(&self, index: usize) -> StoreResult<Option<String>> {
        Ok(self.with_table(|table| table.keys().nth(index).cloned()))
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.with_table(|table| table.keys().cloned().collect()))
    }

    async fn iterate(&self, iterator: &mut IterateFn<'_>) -> StoreResult<Option<Value>> {
        let entries: Vec<(String, String)> = self.with_table(|table| {
            table
                .iter()
                .map(|(key, text)| (key.clone(), text.clone()))
                .collect()
        });

        for (number, (key, text)) in (1u64..).zip(entries) {
            let value = self.serializer.deserialize(&text)?;
            if let Some(result) = iterator(value, &key, number) {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    async fn drop_instance(&self, target: &DropTarget) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        match &target.store_name {
            None => {
                tables.remove(&target.name);
            }
            Some(store) => {
                if let Some(database) = tables.get_mut(&target.name) {
                    database.remove(store);
                }
            }
        }
        Ok(())
    }
}
