//! Shared Connection Contexts
//!
//! `TigerStyle`: One [`DbContext`] per database name, shared by every
//! instance that opens that name. The context owns the single live
//! connection; instances only borrow it for the length of one operation.
//!
//! All connection mutation funnels through the context's gate: operations
//! hold it shared, upgrades and reconnects hold it exclusively. Writers are
//! queued fairly, so an upgrade waits for in-flight operations and operations
//! issued after it queue behind it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use super::host::{Connection, IndexedDbHost, Upgrade};
use crate::error::{StoreError, StoreResult};

static GLOBAL_CONTEXTS: Lazy<Arc<ConnectionContexts>> =
    Lazy::new(|| Arc::new(ConnectionContexts::new()));

/// Version requested when the caller has not configured one.
const VERSION_DEFAULT: u64 = 1;

/// Table of per-database contexts. Entries live as long as the table.
#[derive(Debug, Default)]
pub struct ConnectionContexts {
    contexts: Mutex<HashMap<String, Arc<DbContext>>>,
}

impl ConnectionContexts {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide table.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_CONTEXTS)
    }

    /// Context for `name`, created on first use.
    #[must_use]
    pub fn context(&self, name: &str) -> Arc<DbContext> {
        let mut contexts = self.contexts.lock();
        Arc::clone(
            contexts
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(DbContext::new(name))),
        )
    }

    /// Number of contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.lock().len()
    }

    /// Whether no context has been created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.lock().is_empty()
    }

    /// Database names with a context, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.contexts.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

// =============================================================================
// Per-Database Context
// =============================================================================

#[derive(Debug)]
struct Attachment {
    id: u64,
    store_name: String,
}

/// Connection state shared by every instance attached to one database.
pub struct DbContext {
    name: String,
    connection: RwLock<Option<Arc<Connection>>>,
    attached: Mutex<Vec<Attachment>>,
    /// Serializes initialisations of attached instances
    init_lock: tokio::sync::Mutex<()>,
    /// Shared by operations, exclusive for connection changes
    gate: tokio::sync::RwLock<()>,
    next_attachment: AtomicU64,
}

impl DbContext {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            connection: RwLock::new(None),
            attached: Mutex::new(Vec::new()),
            init_lock: tokio::sync::Mutex::new(()),
            gate: tokio::sync::RwLock::new(()),
            next_attachment: AtomicU64::new(1),
        }
    }

    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The live shared connection, if one is open.
    #[must_use]
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.connection
            .read()
            .as_ref()
            .filter(|connection| !connection.is_closed())
            .cloned()
    }

    /// Store names of attached instances, in attach order.
    #[must_use]
    pub fn attached_stores(&self) -> Vec<String> {
        self.attached
            .lock()
            .iter()
            .map(|attachment| attachment.store_name.clone())
            .collect()
    }

    /// Open or upgrade the shared connection so that `store` exists at
    /// `version` or above.
    ///
    /// Runs after every earlier initialisation on this context has finished.
    ///
    /// # Errors
    /// Host errors from opening (`VersionError`, `ConnectionBlocked`).
    #[tracing::instrument(skip(self, host), fields(database = %self.name))]
    pub async fn initialize(
        &self,
        host: &Arc<IndexedDbHost>,
        store: &str,
        version: u64,
    ) -> StoreResult<Arc<Connection>> {
        let _serial = self.init_lock.lock().await;

        let current = match self.connection() {
            Some(connection) => connection,
            None => {
                let _exclusive = self.gate.write().await;
                self.replace(host, None, Upgrade::CreateStore(store.to_string()))?
            }
        };

        let has_store = current.has_store(store)?;
        let current_version = current.version();
        if version < current_version && version != VERSION_DEFAULT {
            warn!(
                database = %self.name,
                requested = version,
                current = current_version,
                "database version cannot be lowered, keeping the current version"
            );
        }

        let target = if !has_store {
            version.max(current_version + 1)
        } else if version > current_version {
            version
        } else {
            return Ok(current);
        };
        drop(current);

        debug!(database = %self.name, %store, target, "upgrading shared connection");
        let _exclusive = self.gate.write().await;
        self.replace(host, Some(target), Upgrade::CreateStore(store.to_string()))
    }

    /// Reopen the shared connection if the host closed it, then create
    /// `store` if the database lacks it.
    ///
    /// Any attached instance whose store is missing comes through here, so
    /// after a whole-database drop every instance recreates its own store.
    ///
    /// # Errors
    /// Host errors from opening.
    pub async fn reconnect(&self, host: &Arc<IndexedDbHost>, store: &str) -> StoreResult<Arc<Connection>> {
        let _exclusive = self.gate.write().await;
        let connection = match self.connection() {
            Some(connection) => connection,
            None => {
                debug!(database = %self.name, "reconnecting shared connection");
                self.replace(host, None, Upgrade::CreateStore(store.to_string()))?
            }
        };
        if connection.has_store(store)? {
            return Ok(connection);
        }

        let target = connection.version() + 1;
        drop(connection);
        debug!(database = %self.name, %store, target, "recreating missing object store");
        self.replace(host, Some(target), Upgrade::CreateStore(store.to_string()))
    }

    /// Run `op` against the shared connection. A closed connection, or one
    /// missing `store`, goes through [`DbContext::reconnect`] once first.
    ///
    /// # Errors
    /// Whatever `op` or reconnecting returns.
    pub async fn run<T>(
        &self,
        host: &Arc<IndexedDbHost>,
        store: &str,
        op: impl Fn(&Connection) -> StoreResult<T> + Send,
    ) -> StoreResult<T> {
        {
            let _shared = self.gate.read().await;
            if let Some(connection) = self.connection() {
                if matches!(connection.has_store(store), Ok(true)) {
                    match op(&connection) {
                        Err(StoreError::ConnectionClosed { .. }) => {}
                        other => return other,
                    }
                }
            }
        }

        let connection = self.reconnect(host, store).await?;
        let _shared = self.gate.read().await;
        op(&connection)
    }

    /// Delete one object store. Absent databases and stores are fine.
    ///
    /// # Errors
    /// Host errors from the version change.
    pub async fn drop_store(&self, host: &Arc<IndexedDbHost>, store: &str) -> StoreResult<()> {
        let _exclusive = self.gate.write().await;
        if host.version(&self.name).is_none() {
            return Ok(());
        }

        let connection = match self.connection() {
            Some(connection) => connection,
            None => self.replace(host, None, Upgrade::None)?,
        };
        if !connection.has_store(store)? {
            return Ok(());
        }
        let target = connection.version() + 1;
        drop(connection);

        self.replace(host, Some(target), Upgrade::DeleteStore(store.to_string()))?;
        debug!(database = %self.name, %store, "dropped object store");
        Ok(())
    }

    /// Close the shared connection and delete the database.
    ///
    /// # Errors
    /// `ConnectionBlocked` if a connection outside this context is open.
    pub async fn drop_database(&self, host: &Arc<IndexedDbHost>) -> StoreResult<()> {
        let _exclusive = self.gate.write().await;
        if let Some(connection) = self.connection.write().take() {
            connection.close();
        }
        host.delete_database(&self.name)?;
        Ok(())
    }

    pub(crate) fn attach(&self, store_name: &str) -> u64 {
        let id = self.next_attachment.fetch_add(1, Ordering::Relaxed);
        self.attached.lock().push(Attachment {
            id,
            store_name: store_name.to_string(),
        });
        id
    }

    pub(crate) fn detach(&self, id: u64) {
        self.attached.lock().retain(|attachment| attachment.id != id);
    }

    /// Close the current connection and open a new one, publishing it.
    /// Callers hold the gate exclusively.
    ///
    /// If the open fails, the previous version is reopened so attached
    /// instances keep a usable connection.
    fn replace(
        &self,
        host: &Arc<IndexedDbHost>,
        version: Option<u64>,
        upgrade: Upgrade,
    ) -> StoreResult<Arc<Connection>> {
        let mut slot = self.connection.write();
        let previous = slot.take();
        let had_previous = previous.as_ref().is_some_and(|connection| !connection.is_closed());
        if let Some(previous) = previous {
            previous.close();
        }

        match host.open(&self.name, version, upgrade) {
            Ok(connection) => {
                let connection = Arc::new(connection);
                *slot = Some(Arc::clone(&connection));
                Ok(connection)
            }
            Err(err) => {
                if had_previous {
                    if let Ok(connection) = host.open(&self.name, None, Upgrade::None) {
                        *slot = Some(Arc::new(connection));
                    }
                }
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for DbContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbContext")
            .field("name", &self.name)
            .field("connection", &self.connection())
            .field("attached", &self.attached_stores())
            .finish_non_exhaustive()
    }
}
