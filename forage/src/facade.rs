//! Storage Façade
//!
//! `TigerStyle`: One async key-value API, whatever driver ends up underneath.
//!
//! Every storage operation waits on the instance's readiness gate, then
//! runs against the active driver's store. Backend errors are passed through
//! unchanged; readiness errors are returned without touching a backend.

use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::config::{ConfigOptions, DriverList, StoreConfig};
use crate::driver::{Driver, DropOptions};
use crate::error::{ForageError, ForageResult, StoreResult};
use crate::readiness::{Lease, Readiness, ReadinessState};
use crate::registry::DriverRegistry;
use crate::selector::DriverSelector;

// =============================================================================
// Forage
// =============================================================================

/// A storage instance: its own configuration and readiness, on a shared registry.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use forage::{ConfigOptions, DriverRegistry, Forage, MemoryDriver};
///
/// # #[tokio::main]
/// # async fn main() -> forage::ForageResult<()> {
/// let registry = Arc::new(DriverRegistry::new());
/// registry.define_driver(Arc::new(MemoryDriver::new())).await?;
///
/// let store = Forage::builder()
///     .with_registry(registry)
///     .with_options(ConfigOptions::new().with_driver("memoryStorage"))
///     .build()?;
///
/// store.set_item("greeting", "hello").await?;
/// assert_eq!(store.get_item_as::<String>("greeting").await?.as_deref(), Some("hello"));
/// # Ok(())
/// # }
/// ```
pub struct Forage {
    registry: Arc<DriverRegistry>,
    config: Arc<RwLock<StoreConfig>>,
    readiness: Readiness,
}

impl Forage {
    /// Instance with the default configuration on the global registry.
    #[must_use]
    pub fn new() -> Self {
        Self::from_parts(DriverRegistry::global(), StoreConfig::default())
    }

    /// Instance with `options` applied to the defaults, on the global registry.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if an option is rejected.
    pub fn with_config(options: ConfigOptions) -> ForageResult<Self> {
        Self::builder().with_options(options).build()
    }

    /// Builder for an instance with an injected registry.
    #[must_use]
    pub fn builder() -> ForageBuilder {
        ForageBuilder::new()
    }

    fn from_parts(registry: Arc<DriverRegistry>, config: StoreConfig) -> Self {
        let config = Arc::new(RwLock::new(config));
        let readiness = Readiness::new(DriverSelector::new(Arc::clone(&registry)), Arc::clone(&config));
        Self {
            registry,
            config,
            readiness,
        }
    }

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------

    /// A copy of the current configuration.
    #[must_use]
    pub fn config(&self) -> StoreConfig {
        self.config.read().clone()
    }

    /// One configuration value by its camelCase name.
    #[must_use]
    pub fn config_value(&self, key: &str) -> Option<Value> {
        self.config.read().value(key)
    }

    /// Apply `options`. Setting `driver` begins a new selection.
    ///
    /// # Errors
    /// - `ConfigLocked` once a storage operation has completed on this selection
    /// - `InvalidConfig` if an option is rejected; nothing is applied
    pub fn configure(&self, options: ConfigOptions) -> ForageResult<()> {
        if self.readiness.is_locked() {
            warn!("configuration change rejected: instance already in use");
            return Err(ForageError::ConfigLocked);
        }

        {
            let mut config = self.config.write();
            let merged = config.merge(&options)?;
            *config = merged;
        }

        if let Some(driver) = options.driver {
            self.readiness.begin_selection(driver.names());
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Drivers
    // -------------------------------------------------------------------------

    /// Define a custom driver on this instance's registry.
    ///
    /// # Errors
    /// `NotCompliantDriver` or `DriverNameInUse`.
    pub async fn define_driver(&self, driver: Arc<dyn Driver>) -> ForageResult<bool> {
        self.registry.define_driver(driver).await
    }

    /// Look up a registered driver.
    ///
    /// # Errors
    /// `DriverNotFound` for an unregistered name.
    pub fn get_driver(&self, name: &str) -> ForageResult<Arc<dyn Driver>> {
        self.registry.get_driver(name)
    }

    /// Name of the active driver, `None` before one has initialised.
    #[must_use]
    pub fn driver(&self) -> Option<String> {
        self.readiness.driver()
    }

    /// Select a driver from `drivers`, in preference order.
    ///
    /// The new selection is queued when this is called; the returned future
    /// resolves once it has settled.
    pub fn set_driver<'a, D>(&'a self, drivers: D) -> impl Future<Output = ForageResult<()>> + Send + 'a
    where
        D: Into<DriverList> + 'a,
    {
        let pending = self.readiness.set_driver(drivers.into().names());
        async move { pending.await.map(|_| ()) }
    }

    /// Whether `name` is registered and supported.
    #[must_use]
    pub fn supports(&self, name: &str) -> bool {
        self.registry.supports(name)
    }

    /// Wait until a driver is ready.
    ///
    /// # Errors
    /// `NoAvailableStorageMethod` if the selection failed.
    pub async fn ready(&self) -> ForageResult<()> {
        self.readiness.ready().await.map(|_| ())
    }

    /// Readiness of this instance.
    #[must_use]
    pub fn state(&self) -> ReadinessState {
        self.readiness.state()
    }

    /// The registry drivers are selected from.
    #[must_use]
    pub fn registry(&self) -> &Arc<DriverRegistry> {
        &self.registry
    }

    /// An independent instance on the same registry, configured from the
    /// defaults plus `options`.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if an option is rejected.
    pub fn create_instance(&self, options: ConfigOptions) -> ForageResult<Self> {
        Self::builder()
            .with_registry(Arc::clone(&self.registry))
            .with_options(options)
            .build()
    }

    // -------------------------------------------------------------------------
    // Storage
    // -------------------------------------------------------------------------

    /// Read a value; `null` when the key is absent.
    ///
    /// # Errors
    /// Readiness errors, or the backend's error.
    #[tracing::instrument(skip(self))]
    pub async fn get_item(&self, key: &str) -> ForageResult<Value> {
        let lease = self.readiness.lease().await?;
        let result = lease.active.store.get_item(key).await;
        complete(&lease, result).map(|value| value.unwrap_or(Value::Null))
    }

    /// Read and deserialize a value; `None` when absent or `null`.
    ///
    /// # Errors
    /// `Serialization` if the stored value is not a `T`, otherwise as [`Forage::get_item`].
    pub async fn get_item_as<T: DeserializeOwned>(&self, key: &str) -> ForageResult<Option<T>> {
        match self.get_item(key).await? {
            Value::Null => Ok(None),
            value => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| ForageError::Serialization(e.to_string())),
        }
    }

    /// Store a value and return it as stored. `None` and `()` store `null`.
    ///
    /// # Errors
    /// `Serialization` if `value` cannot be converted, readiness errors, or
    /// the backend's error.
    #[tracing::instrument(skip(self, value))]
    pub async fn set_item<T>(&self, key: &str, value: &T) -> ForageResult<Value>
    where
        T: Serialize + ?Sized + Sync,
    {
        let lease = self.readiness.lease().await?;
        let value = serde_json::to_value(value).map_err(|e| ForageError::Serialization(e.to_string()))?;
        let result = lease.active.store.set_item(key, value).await;
        complete(&lease, result)
    }

    /// Remove a key.
    ///
    /// # Errors
    /// Readiness errors, or the backend's error.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, key: &str) -> ForageResult<()> {
        let lease = self.readiness.lease().await?;
        let result = lease.active.store.remove_item(key).await;
        complete(&lease, result)
    }

    /// Remove every key in this instance's store.
    ///
    /// # Errors
    /// Readiness errors, or the backend's error.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self) -> ForageResult<()> {
        let lease = self.readiness.lease().await?;
        let result = lease.active.store.clear().await;
        complete(&lease, result)
    }

    /// Number of keys.
    ///
    /// # Errors
    /// Readiness errors, or the backend's error.
    #[tracing::instrument(skip(self))]
    pub async fn length(&self) -> ForageResult<usize> {
        let lease = self.readiness.lease().await?;
        let result = lease.active.store.length().await;
        complete(&lease, result)
    }

    /// Name of the `index`-th key, `None` when out of range.
    ///
    /// # Errors
    /// Readiness errors, or the backend's error.
    #[tracing::instrument(skip(self))]
    pub async fn key(&self, index: usize) -> ForageResult<Option<String>> {
        let lease = self.readiness.lease().await?;
        let result = lease.active.store.key(index).await;
        complete(&lease, result)
    }

    /// Every key, in the driver's order.
    ///
    /// # Errors
    /// Readiness errors, or the backend's error.
    #[tracing::instrument(skip(self))]
    pub async fn keys(&self) -> ForageResult<Vec<String>> {
        let lease = self.readiness.lease().await?;
        let result = lease.active.store.keys().await;
        complete(&lease, result)
    }

    /// Visit every entry as `(value, key, iteration_number)` until
    /// `iterator` returns `Some`, which becomes the result.
    ///
    /// # Errors
    /// Readiness errors, or the backend's error.
    #[tracing::instrument(skip(self, iterator))]
    pub async fn iterate<F>(&self, mut iterator: F) -> ForageResult<Option<Value>>
    where
        F: FnMut(Value, &str, u64) -> Option<Value> + Send,
    {
        let lease = self.readiness.lease().await?;
        let result = lease.active.store.iterate(&mut iterator).await;
        complete(&lease, result)
    }

    /// Drop a store or a whole database.
    ///
    /// With no `name`, the database and store the active driver was
    /// initialised with are used. With a `name` and no `storeName`, the
    /// whole database is dropped.
    ///
    /// # Errors
    /// Readiness errors, or the backend's error.
    #[tracing::instrument(skip(self))]
    pub async fn drop_instance(&self, options: DropOptions) -> ForageResult<()> {
        let lease = self.readiness.lease().await?;
        let target = options.resolve(&lease.active.config);
        let result = lease.active.store.drop_instance(&target).await;
        complete(&lease, result)
    }
}

fn complete<T>(lease: &Lease, result: StoreResult<T>) -> ForageResult<T> {
    let value = result?;
    lease.mark_used();
    Ok(value)
}

impl Default for Forage {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Forage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forage")
            .field("config", &*self.config.read())
            .field("readiness", &self.readiness)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`Forage`].
#[derive(Debug, Default)]
pub struct ForageBuilder {
    registry: Option<Arc<DriverRegistry>>,
    options: ConfigOptions,
}

impl ForageBuilder {
    /// Builder on the global registry with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Select drivers from `registry` instead of the global one.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<DriverRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Configuration overrides.
    #[must_use]
    pub fn with_options(mut self, options: ConfigOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the instance.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if an option is rejected.
    pub fn build(self) -> ForageResult<Forage> {
        let config = StoreConfig::default().merge(&self.options)?;
        let registry = self.registry.unwrap_or_else(DriverRegistry::global);
        Ok(Forage::from_parts(registry, config))
    }
}
