//! SQL Driver
//!
//! `TigerStyle`: One `SQLite` file per database name, one table per store.
//!
//! ```text
//!   {dir}/{name}.sqlite
//!     "{storeName}" (id INTEGER PRIMARY KEY, key TEXT UNIQUE, value TEXT)
//! ```
//!
//! Rows are written with `INSERT OR REPLACE`, so a rewritten key moves to
//! the end of the id order that `key(n)`, `keys()` and `iterate` follow.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::{sanitize_store_name, StoreConfig};
use crate::constants::{DRIVER_NAME_SQL, ENV_SQL_DIR};
use crate::driver::{Driver, DriverStore, DropTarget, IterateFn, SupportCheck};
use crate::error::{StoreError, StoreResult};
use crate::serializer::{JsonSerializer, Serializer};

/// Maximum connections per database pool.
const SQL_POOL_CONNECTIONS_MAX: u32 = 5;

/// Pool acquire timeout.
const SQL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

fn map_sqlx(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db)
            if db.is_unique_violation() || db.is_check_violation() || db.is_foreign_key_violation() =>
        {
            StoreError::constraint(db.message())
        }
        sqlx::Error::RowNotFound => StoreError::not_found("row"),
        other => StoreError::backend(other.to_string()),
    }
}

/// Driver over `SQLite` files in one directory, registered as `webSQLStorage`.
pub struct SqlDriver {
    dir: Option<PathBuf>,
    pools: Arc<Mutex<HashMap<String, SqlitePool>>>,
    serializer: Arc<dyn Serializer>,
}

impl SqlDriver {
    /// Driver keeping its files in `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            pools: Arc::new(Mutex::new(HashMap::new())),
            serializer: Arc::new(JsonSerializer),
        }
    }

    /// Driver keeping its files in `FORAGE_SQL_DIR`; unsupported when unset.
    #[must_use]
    pub fn from_env() -> Self {
        match std::env::var_os(ENV_SQL_DIR) {
            Some(dir) => Self::new(dir),
            None => Self {
                dir: None,
                pools: Arc::new(Mutex::new(HashMap::new())),
                serializer: Arc::new(JsonSerializer),
            },
        }
    }

    /// Use a different value serializer.
    #[must_use]
    pub fn with_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    async fn pool(&self, name: &str) -> StoreResult<SqlitePool> {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(name) {
            return Ok(pool.clone());
        }

        let dir = self
            .dir
            .as_ref()
            .ok_or_else(|| StoreError::backend(format!("{ENV_SQL_DIR} is not set")))?;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| StoreError::write(format!("{}: {e}", dir.display())))?;
        let path = dir.join(format!("{}.sqlite", sanitize_store_name(name)));

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(SQL_POOL_CONNECTIONS_MAX)
            .acquire_timeout(SQL_ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(map_sqlx)?;

        debug!(database = %name, path = %path.display(), "opened sql database");
        pools.insert(name.to_string(), pool.clone());
        Ok(pool)
    }
}

#[async_trait]
impl Driver for SqlDriver {
    fn name(&self) -> &str {
        DRIVER_NAME_SQL
    }

    fn support(&self) -> SupportCheck {
        SupportCheck::Known(self.dir.is_some())
    }

    #[tracing::instrument(skip(self, config), fields(database = %config.name, store = %config.store_name))]
    async fn init_storage(&self, config: &StoreConfig) -> StoreResult<Arc<dyn DriverStore>> {
        let pool = self.pool(&config.name).await?;
        let table = sanitize_store_name(&config.store_name);

        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS "{table}" (id INTEGER PRIMARY KEY, key TEXT UNIQUE, value TEXT)"#
        ))
        .execute(&pool)
        .await
        .map_err(map_sqlx)?;

        Ok(Arc::new(SqlStore {
            driver_pools: Arc::clone(&self.pools),
            pool,
            table,
            serializer: Arc::clone(&self.serializer),
        }))
    }
}

struct SqlStore {
    driver_pools: Arc<Mutex<HashMap<String, SqlitePool>>>,
    pool: SqlitePool,
    table: String,
    serializer: Arc<dyn Serializer>,
}

impl SqlStore {
    async fn pool_for(&self, name: &str) -> Option<SqlitePool> {
        self.driver_pools.lock().await.get(name).cloned()
    }
}

#[async_trait]
impl DriverStore for SqlStore {
    async fn get_item(&self, key: &str) -> StoreResult<Option<Value>> {
        let row: Option<(String,)> =
            sqlx::query_as(&format!(r#"SELECT value FROM "{}" WHERE key = ? LIMIT 1"#, self.table))
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;
        row.map(|(text,)| self.serializer.deserialize(&text)).transpose()
    }

    async fn set_item(&self, key: &str, value: Value) -> StoreResult<Value> {
        let text = self.serializer.serialize(&value)?;
        sqlx::query(&format!(
            r#"INSERT OR REPLACE INTO "{}" (key, value) VALUES (?, ?)"#,
            self.table
        ))
        .bind(key)
        .bind(text)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(value)
    }

    async fn remove_item(&self, key: &str) -> StoreResult<()> {
        sqlx::query(&format!(r#"DELETE FROM "{}" WHERE key = ?"#, self.table))
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn clear(&self) -> StoreResult<()> {
        sqlx::query(&format!(r#"DELETE FROM "{}""#, self.table))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn length(&self) -> StoreResult<usize> {
        let (count,): (i64,) = sqlx::query_as(&format!(r#"SELECT COUNT(key) FROM "{}""#, self.table))
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn key(&self, index: usize) -> StoreResult<Option<String>> {
        let Ok(offset) = i64::try_from(index) else {
            return Ok(None);
        };
        let row: Option<(String,)> = sqlx::query_as(&format!(
            r#"SELECT key FROM "{}" ORDER BY id LIMIT 1 OFFSET ?"#,
            self.table
        ))
        .bind(offset)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(row.map(|(key,)| key))
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as(&format!(r#"SELECT key FROM "{}" ORDER BY id"#, self.table))
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx)?;
        Ok(rows.into_iter().map(|(key,)| key).collect())
    }

    async fn iterate(&self, iterator: &mut IterateFn<'_>) -> StoreResult<Option<Value>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as(&format!(r#"SELECT key, value FROM "{}" ORDER BY id"#, self.table))
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx)?;

        for (number, (key, text)) in (1u64..).zip(rows) {
            let value = self.serializer.deserialize(&text)?;
            if let Some(result) = iterator(value, &key, number) {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    async fn drop_instance(&self, target: &DropTarget) -> StoreResult<()> {
        let Some(pool) = self.pool_for(&target.name).await else {
            debug!(database = %target.name, "sql database never opened, nothing to drop");
            return Ok(());
        };

        let tables: Vec<String> = match &target.store_name {
            Some(store) => vec![sanitize_store_name(store)],
            None => {
                let rows: Vec<(String,)> = sqlx::query_as(
                    "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
                )
                .fetch_all(&pool)
                .await
                .map_err(map_sqlx)?;
                rows.into_iter().map(|(name,)| name).collect()
            }
        };

        for table in &tables {
            sqlx::query(&format!(r#"DROP TABLE IF EXISTS "{table}""#))
                .execute(&pool)
                .await
                .map_err(map_sqlx)?;
        }
        debug!(database = %target.name, dropped = tables.len(), "dropped sql tables");
        Ok(())
    }
}
