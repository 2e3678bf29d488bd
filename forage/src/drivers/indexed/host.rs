//! Indexed Database Host
//!
//! `TigerStyle`: Named, versioned databases of object stores, each store an
//! ordered map of JSON values. Schema changes happen only while opening a
//! database at a higher version, and only when no other connection to it is
//! open.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

static GLOBAL_HOST: Lazy<Arc<IndexedDbHost>> = Lazy::new(|| Arc::new(IndexedDbHost::new()));

type ObjectStore = BTreeMap<String, Value>;

struct Database {
    version: u64,
    stores: BTreeMap<String, ObjectStore>,
    open: Vec<Arc<ConnectionState>>,
}

impl Database {
    fn live_connections(&self) -> usize {
        self.open.iter().filter(|state| !state.is_closed()).count()
    }
}

#[derive(Debug)]
struct ConnectionState {
    id: u64,
    closed: AtomicBool,
}

impl ConnectionState {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Schema change applied when an open raises the version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upgrade {
    /// Bump the version only
    None,
    /// Create the store if it does not exist
    CreateStore(String),
    /// Delete the store if it exists
    DeleteStore(String),
}

/// Process-local host of indexed databases.
pub struct IndexedDbHost {
    available: bool,
    databases: Mutex<HashMap<String, Database>>,
    next_connection: AtomicU64,
}

impl IndexedDbHost {
    /// Available host with no databases.
    #[must_use]
    pub fn new() -> Self {
        Self {
            available: true,
            databases: Mutex::new(HashMap::new()),
            next_connection: AtomicU64::new(1),
        }
    }

    /// Host that refuses every open; drivers on it report unsupported.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// The process-wide host.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_HOST)
    }

    /// Whether databases can be opened on this host.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Open `name`, creating it if needed.
    ///
    /// `version` defaults to the current version (1 for a new database).
    /// A higher version applies `upgrade`.
    ///
    /// # Errors
    /// - `Backend` if the host is unavailable
    /// - `VersionError` if `version` is below the stored version
    /// - `ConnectionBlocked` if an upgrade is needed while other connections are open
    pub fn open(self: &Arc<Self>, name: &str, version: Option<u64>, upgrade: Upgrade) -> StoreResult<Connection> {
        if !self.available {
            return Err(StoreError::backend("indexed database host is unavailable"));
        }

        let mut databases = self.databases.lock();
        let database = databases.entry(name.to_string()).or_insert_with(|| Database {
            version: 0,
            stores: BTreeMap::new(),
            open: Vec::new(),
        });
        database.open.retain(|state| !state.is_closed());

        let current = database.version;
        let requested = version.unwrap_or(current).max(1);

        if requested < current {
            return Err(StoreError::VersionError {
                database: name.to_string(),
                current,
                requested,
            });
        }

        if requested > current {
            let open = database.live_connections();
            if open > 0 {
                return Err(StoreError::ConnectionBlocked {
                    database: name.to_string(),
                    open,
                });
            }
            match upgrade {
                Upgrade::None => {}
                Upgrade::CreateStore(store) => {
                    database.stores.entry(store).or_default();
                }
                Upgrade::DeleteStore(store) => {
                    database.stores.remove(&store);
                }
            }
            database.version = requested;
            debug!(database = %name, from = current, to = requested, "upgraded database");
        }

        let state = Arc::new(ConnectionState {
            id: self.next_connection.fetch_add(1, Ordering::Relaxed),
            closed: AtomicBool::new(false),
        });
        database.open.push(Arc::clone(&state));

        Ok(Connection {
            host: Arc::clone(self),
            name: name.to_string(),
            version: requested,
            state,
        })
    }

    /// Close every open connection to `name` from outside. Returns how many closed.
    pub fn close_connections(&self, name: &str) -> usize {
        let mut databases = self.databases.lock();
        let Some(database) = databases.get_mut(name) else {
            return 0;
        };
        let closed = database.live_connections();
        for state in database.open.drain(..) {
            state.closed.store(true, Ordering::Release);
        }
        closed
    }

    /// Delete a database. Returns whether it existed.
    ///
    /// # Errors
    /// Returns `ConnectionBlocked` while any connection to it is open.
    pub fn delete_database(&self, name: &str) -> StoreResult<bool> {
        let mut databases = self.databases.lock();
        let Some(database) = databases.get(name) else {
            return Ok(false);
        };
        let open = database.live_connections();
        if open > 0 {
            return Err(StoreError::ConnectionBlocked {
                database: name.to_string(),
                open,
            });
        }
        databases.remove(name);
        debug!(database = %name, "deleted database");
        Ok(true)
    }

    /// Stored version of `name`, `None` if it does not exist.
    #[must_use]
    pub fn version(&self, name: &str) -> Option<u64> {
        self.databases.lock().get(name).map(|database| database.version)
    }

    /// Object store names in `name`, sorted.
    #[must_use]
    pub fn store_names(&self, name: &str) -> Vec<String> {
        self.databases
            .lock()
            .get(name)
            .map(|database| database.stores.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Database names, sorted.
    #[must_use]
    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of open connections to `name`.
    #[must_use]
    pub fn open_connections(&self, name: &str) -> usize {
        self.databases
            .lock()
            .get(name)
            .map_or(0, Database::live_connections)
    }

    fn release(&self, name: &str, id: u64) {
        if let Some(database) = self.databases.lock().get_mut(name) {
            database.open.retain(|state| state.id != id);
        }
    }
}

impl Default for IndexedDbHost {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IndexedDbHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedDbHost")
            .field("available", &self.available)
            .field("databases", &self.database_names())
            .finish()
    }
}

// =============================================================================
// Connection
// =============================================================================

/// An open connection to one database at one version. Closes on drop.
pub struct Connection {
    host: Arc<IndexedDbHost>,
    name: String,
    version: u64,
    state: Arc<ConnectionState>,
}

impl Connection {
    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version this connection was opened at.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether the connection has been closed, by either side.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Close the connection.
    pub fn close(&self) {
        if !self.state.closed.swap(true, Ordering::AcqRel) {
            self.host.release(&self.name, self.state.id);
        }
    }

    /// Whether the database has an object store named `store`.
    ///
    /// # Errors
    /// Returns `ConnectionClosed` on a closed connection.
    pub fn has_store(&self, store: &str) -> StoreResult<bool> {
        self.with_database(|database| database.stores.contains_key(store))
    }

    /// Read one value.
    ///
    /// # Errors
    /// `ConnectionClosed`, or `NotFound` for a missing store.
    pub fn get(&self, store: &str, key: &str) -> StoreResult<Option<Value>> {
        self.with_store(store, |records| records.get(key).cloned())
    }

    /// Write one value.
    ///
    /// # Errors
    /// `ConnectionClosed`, or `NotFound` for a missing store.
    pub fn put(&self, store: &str, key: &str, value: Value) -> StoreResult<()> {
        self.with_store(store, |records| {
            records.insert(key.to_string(), value);
        })
    }

    /// Delete one value.
    ///
    /// # Errors
    /// `ConnectionClosed`, or `NotFound` for a missing store.
    pub fn delete(&self, store: &str, key: &str) -> StoreResult<()> {
        self.with_store(store, |records| {
            records.remove(key);
        })
    }

    /// Delete every value in `store`.
    ///
    /// # Errors
    /// `ConnectionClosed`, or `NotFound` for a missing store.
    pub fn clear(&self, store: &str) -> StoreResult<()> {
        self.with_store(store, ObjectStore::clear)
    }

    /// Number of values in `store`.
    ///
    /// # Errors
    /// `ConnectionClosed`, or `NotFound` for a missing store.
    pub fn count(&self, store: &str) -> StoreResult<usize> {
        self.with_store(store, |records| records.len())
    }

    /// Key at `index` in key order.
    ///
    /// # Errors
    /// `ConnectionClosed`, or `NotFound` for a missing store.
    pub fn key_at(&self, store: &str, index: usize) -> StoreResult<Option<String>> {
        self.with_store(store, |records| records.keys().nth(index).cloned())
    }

    /// Every key in key order.
    ///
    /// # Errors
    /// `ConnectionClosed`, or `NotFound` for a missing store.
    pub fn keys(&self, store: &str) -> StoreResult<Vec<String>> {
        self.with_store(store, |records| records.keys().cloned().collect())
    }

    /// Every entry in key order.
    ///
    /// # Errors
    /// `ConnectionClosed`, or `NotFound` for a missing store.
    pub fn entries(&self, store: &str) -> StoreResult<Vec<(String, Value)>> {
        self.with_store(store, |records| {
            records
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
    }

    fn with_database<T>(&self, f: impl FnOnce(&mut Database) -> T) -> StoreResult<T> {
        if self.is_closed() {
            return Err(StoreError::connection_closed(&self.name));
        }
        let mut databases = self.host.databases.lock();
        databases
            .get_mut(&self.name)
            .map(f)
            .ok_or_else(|| StoreError::connection_closed(&self.name))
    }

    fn with_store<T>(&self, store: &str, f: impl FnOnce(&mut ObjectStore) -> T) -> StoreResult<T> {
        self.with_database(|database| database.stores.get_mut(store).map(f))?
            .ok_or_else(|| StoreError::not_found(format!("object store {store} in {}", self.name)))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("closed", &self.is_closed())
            .finish()
    }
}
