//! Driver Contract
//!
//! `TigerStyle`: Every backend, built-in or custom, sits behind these two
//! traits. The façade never inspects a driver beyond them.
//!
//! A [`Driver`] is the registered, long-lived description of a backend: its
//! name, which library methods it implements, how to tell whether it works
//! in this environment, and how to initialise storage for one configuration.
//! Initialisation yields a [`DriverStore`], the handle the nine storage
//! operations run against.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::StoreConfig;
use crate::error::StoreResult;

// =============================================================================
// Library Methods
// =============================================================================

/// The library methods a compliant driver must implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    /// `getItem`
    GetItem,
    /// `setItem`
    SetItem,
    /// `removeItem`
    RemoveItem,
    /// `clear`
    Clear,
    /// `length`
    Length,
    /// `key`
    Key,
    /// `keys`
    Keys,
    /// `iterate`
    Iterate,
    /// `dropInstance`
    DropInstance,
}

impl Method {
    /// Every library method, in declaration order.
    pub const ALL: [Method; 9] = [
        Method::GetItem,
        Method::SetItem,
        Method::RemoveItem,
        Method::Clear,
        Method::Length,
        Method::Key,
        Method::Keys,
        Method::Iterate,
        Method::DropInstance,
    ];

    /// Public (camelCase) method name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetItem => "getItem",
            Self::SetItem => "setItem",
            Self::RemoveItem => "removeItem",
            Self::Clear => "clear",
            Self::Length => "length",
            Self::Key => "key",
            Self::Keys => "keys",
            Self::Iterate => "iterate",
            Self::DropInstance => "dropInstance",
        }
    }

    /// Methods from [`Method::ALL`] that `declared` does not contain.
    #[must_use]
    pub fn missing_from(declared: &[Method]) -> Vec<Method> {
        Self::ALL
            .iter()
            .copied()
            .filter(|method| !declared.contains(method))
            .collect()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Support Declaration
// =============================================================================

/// How a driver reports whether it works in the current environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportCheck {
    /// No declaration; the driver is treated as supported
    Assumed,
    /// A literal answer
    Known(bool),
    /// Ask [`Driver::probe_support`]
    Probe,
}

// =============================================================================
// Drop Targets
// =============================================================================

/// Caller-facing `dropInstance` options. Resolved against the instance
/// config into a [`DropTarget`] before reaching a driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropOptions {
    /// Database to drop from (defaults to the instance's)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Store to drop (omitted with an explicit `name`: drop the whole database)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_name: Option<String>,
}

impl DropOptions {
    /// Drop from the named database.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Drop only the named store.
    #[must_use]
    pub fn with_store_name(mut self, store_name: impl Into<String>) -> Self {
        self.store_name = Some(store_name.into());
        self
    }

    /// Resolve against the instance configuration.
    ///
    /// Without a `name` both fields come from `config`. With a `name` and no
    /// `storeName` the whole database is the target.
    #[must_use]
    pub fn resolve(&self, config: &StoreConfig) -> DropTarget {
        match &self.name {
            None => DropTarget {
                name: config.name.clone(),
                store_name: Some(
                    self.store_name
                        .as_deref()
                        .map_or_else(|| config.store_name.clone(), crate::config::sanitize_store_name),
                ),
            },
            Some(name) => DropTarget {
                name: name.clone(),
                store_name: self
                    .store_name
                    .as_deref()
                    .map(crate::config::sanitize_store_name),
            },
        }
    }
}

/// A resolved `dropInstance` target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTarget {
    /// Database name
    pub name: String,
    /// Store name; `None` drops the whole database
    pub store_name: Option<String>,
}

// =============================================================================
// Traits
// =============================================================================

/// Callback for [`DriverStore::iterate`]: `(value, key, iteration_number)`.
///
/// Iteration numbers start at 1. Returning `Some` stops the iteration and
/// makes that value the result.
pub type IterateFn<'a> = dyn FnMut(Value, &str, u64) -> Option<Value> + Send + 'a;

/// Storage bound to one initialised configuration.
#[async_trait]
pub trait DriverStore: Send + Sync {
    /// Read a value; `None` when the key is absent.
    async fn get_item(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Store a value and return what was stored.
    async fn set_item(&self, key: &str, value: Value) -> StoreResult<Value>;

    /// Remove a key. Removing an absent key succeeds.
    async fn remove_item(&self, key: &str) -> StoreResult<()>;

    /// Remove every key in this store.
    async fn clear(&self) -> StoreResult<()>;

    /// Number of keys in this store.
    async fn length(&self) -> StoreResult<usize>;

    /// Name of the `index`-th key, `None` when out of range.
    async fn key(&self, index: usize) -> StoreResult<Option<String>>;

    /// All keys, in the backend's order.
    async fn keys(&self) -> StoreResult<Vec<String>>;

    /// Visit every entry until the callback returns `Some`.
    async fn iterate(&self, iterator: &mut IterateFn<'_>) -> StoreResult<Option<Value>>;

    /// Drop a store or a whole database.
    async fn drop_instance(&self, target: &DropTarget) -> StoreResult<()>;
}

/// A registered storage backend.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Unique driver name.
    fn name(&self) -> &str;

    /// Library methods this driver implements.
    fn methods(&self) -> &[Method] {
        &Method::ALL
    }

    /// Support declaration.
    fn support(&self) -> SupportCheck {
        SupportCheck::Assumed
    }

    /// Environment probe, consulted only for [`SupportCheck::Probe`].
    async fn probe_support(&self) -> bool {
        true
    }

    /// Prepare storage for `config`.
    ///
    /// May allocate resources (an open connection, a reserved namespace).
    /// Initialising again with the same database name must reuse them.
    async fn init_storage(&self, config: &StoreConfig) -> StoreResult<Arc<dyn DriverStore>>;
}

impl fmt::Debug for dyn Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver").field("name", &self.name()).finish()
    }
}
