//! Driver Registry
//!
//! `TigerStyle`: Name → driver and name → support tables, shared by every
//! façade built on the same registry.
//!
//! The registry only grows: definitions are added or replaced, never
//! removed. The process-wide default is [`DriverRegistry::global`]; tests
//! build their own with [`DriverRegistry::new`] and inject it.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::constants::DRIVER_NAMES_RESERVED;
use crate::driver::{Driver, Method, SupportCheck};
use crate::error::{ForageError, ForageResult};

static GLOBAL_REGISTRY: Lazy<Arc<DriverRegistry>> =
    Lazy::new(|| Arc::new(DriverRegistry::with_builtins()));

struct Entry {
    driver: Arc<dyn Driver>,
    /// Resolved support flag; empty until a `Probe` driver has been probed
    support: Arc<OnceCell<bool>>,
}

impl Entry {
    fn new(driver: Arc<dyn Driver>, support: Option<bool>) -> Self {
        Self {
            driver,
            support: Arc::new(OnceCell::new_with(support)),
        }
    }
}

/// Registered drivers and their support flags.
pub struct DriverRegistry {
    reserved: Vec<String>,
    entries: RwLock<HashMap<String, Entry>>,
}

impl DriverRegistry {
    /// Empty registry that still reserves the built-in driver names.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reserved: DRIVER_NAMES_RESERVED.iter().map(|s| (*s).to_string()).collect(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Registry holding the built-in drivers on their process-wide backends.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for driver in crate::drivers::builtin_drivers() {
            registry.register_builtin(driver);
        }
        registry
    }

    /// The process-wide default registry.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Register a driver without the custom-driver checks.
    ///
    /// This is the path built-ins use to claim reserved names. Support is
    /// resolved immediately unless the driver asks to be probed, in which
    /// case the probe runs the first time a selection considers it.
    pub fn register_builtin(&self, driver: Arc<dyn Driver>) {
        let support = match driver.support() {
            SupportCheck::Assumed => Some(true),
            SupportCheck::Known(supported) => Some(supported),
            SupportCheck::Probe => None,
        };
        let name = driver.name().to_string();
        debug!(driver = %name, ?support, "registering built-in driver");
        self.entries.write().insert(name, Entry::new(driver, support));
    }

    /// Define a custom driver.
    ///
    /// Returns whether the driver is supported in this environment.
    ///
    /// # Errors
    /// - `NotCompliantDriver` if the name is empty or a library method is missing
    /// - `DriverNameInUse` if the name is reserved for a built-in
    #[tracing::instrument(skip(self, driver), fields(name = %driver.name()))]
    pub async fn define_driver(&self, driver: Arc<dyn Driver>) -> ForageResult<bool> {
        let name = driver.name().to_string();
        let missing = Method::missing_from(driver.methods());

        if name.is_empty() {
            return Err(ForageError::not_compliant("driver name is missing", missing));
        }
        if !missing.is_empty() {
            let listed: Vec<&str> = missing.iter().map(Method::as_str).collect();
            return Err(ForageError::not_compliant(
                format!("{name} is missing {}", listed.join(", ")),
                missing,
            ));
        }
        if self.reserved.contains(&name) {
            return Err(ForageError::name_in_use(name));
        }

        let supported = match driver.support() {
            SupportCheck::Assumed => true,
            SupportCheck::Known(supported) => supported,
            SupportCheck::Probe => driver.probe_support().await,
        };

        let previous = self
            .entries
            .write()
            .insert(name.clone(), Entry::new(driver, Some(supported)));
        if previous.is_some() {
            warn!(driver = %name, "redefining driver");
        }

        Ok(supported)
    }

    /// Look up a driver by name.
    ///
    /// # Errors
    /// Returns `DriverNotFound` for an unregistered name.
    pub fn get_driver(&self, name: &str) -> ForageResult<Arc<dyn Driver>> {
        self.entries
            .read()
            .get(name)
            .map(|entry| Arc::clone(&entry.driver))
            .ok_or_else(|| ForageError::driver_not_found(name))
    }

    /// Whether a driver is registered under `name`.
    #[must_use]
    pub fn has_driver(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Cached support flag. Unknown names, and drivers not yet probed,
    /// read as unsupported.
    #[must_use]
    pub fn supports(&self, name: &str) -> bool {
        self.entries
            .read()
            .get(name)
            .and_then(|entry| entry.support.get().copied())
            .unwrap_or(false)
    }

    /// Support flag, probing the driver first if it has not been probed.
    pub async fn resolve_support(&self, name: &str) -> bool {
        let (driver, support) = {
            let entries = self.entries.read();
            match entries.get(name) {
                Some(entry) => (Arc::clone(&entry.driver), Arc::clone(&entry.support)),
                None => return false,
            }
        };

        *support
            .get_or_init(|| async move {
                let supported = driver.probe_support().await;
                debug!(driver = %driver.name(), supported, "probed driver support");
                supported
            })
            .await
    }

    /// Whether `name` is reserved for a built-in driver.
    #[must_use]
    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.iter().any(|reserved| reserved == name)
    }

    /// Registered driver names, sorted.
    #[must_use]
    pub fn driver_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.driver_names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DRIVER_NAME_INDEXED, DRIVER_NAME_LOCAL};
    use crate::drivers::SimDriver;

    #[tokio::test]
    async fn test_define_and_get() {
        let registry = DriverRegistry::new();
        let supported = registry
            .define_driver(Arc::new(SimDriver::new("custom")))
            .await
            .unwrap();

        assert!(supported);
        assert!(registry.has_driver("custom"));
        assert!(registry.supports("custom"));
        assert_eq!(registry.get_driver("custom").unwrap().name(), "custom");
    }

    #[tokio::test]
    async fn test_empty_name_not_compliant() {
        let registry = DriverRegistry::new();
        let err = registry
            .define_driver(Arc::new(SimDriver::new("")))
            .await
            .unwrap_err();
        assert!(matches!(err, ForageError::NotCompliantDriver { .. }));
    }

    #[tokio::test]
    async fn test_missing_methods_not_compliant() {
        let registry = DriverRegistry::new();
        let driver = SimDriver::new("partial").with_methods(vec![Method::GetItem, Method::SetItem]);

        match registry.define_driver(Arc::new(driver)).await {
            Err(ForageError::NotCompliantDriver { missing, .. }) => {
                assert_eq!(missing.len(), 7);
                assert!(missing.contains(&Method::DropInstance));
            }
            other => panic!("expected NotCompliantDriver, got {other:?}"),
        }
        assert!(!registry.has_driver("partial"));
    }

    #[tokio::test]
    async fn test_reserved_name_in_use() {
        let registry = DriverRegistry::new();
        let err = registry
            .define_driver(Arc::new(SimDriver::new(DRIVER_NAME_LOCAL)))
            .await
            .unwrap_err();
        assert_eq!(err, ForageError::name_in_use(DRIVER_NAME_LOCAL));
    }

    #[tokio::test]
    async fn test_redefinition_replaces() {
        let registry = DriverRegistry::new();
        registry
            .define_driver(Arc::new(SimDriver::new("x").with_support(SupportCheck::Known(false))))
            .await
            .unwrap();
        assert!(!registry.supports("x"));

        let supported = registry
            .define_driver(Arc::new(SimDriver::new("x")))
            .await
            .unwrap();
        assert!(supported);
        assert!(registry.supports("x"));
        assert_eq!(registry.driver_names(), vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn test_probe_on_define() {
        let registry = DriverRegistry::new();
        let driver = SimDriver::new("probed")
            .with_support(SupportCheck::Probe)
            .with_probe_result(false);

        assert!(!registry.define_driver(Arc::new(driver)).await.unwrap());
        assert!(!registry.supports("probed"));
    }

    #[tokio::test]
    async fn test_builtin_probe_is_lazy_and_cached() {
        let registry = DriverRegistry::new();
        let driver = Arc::new(SimDriver::new(DRIVER_NAME_INDEXED).with_support(SupportCheck::Probe));
        registry.register_builtin(Arc::clone(&driver) as Arc<dyn Driver>);

        assert!(!registry.supports(DRIVER_NAME_INDEXED));
        assert_eq!(driver.probe_count(), 0);

        assert!(registry.resolve_support(DRIVER_NAME_INDEXED).await);
        assert!(registry.resolve_support(DRIVER_NAME_INDEXED).await);
        assert!(registry.supports(DRIVER_NAME_INDEXED));
        assert_eq!(driver.probe_count(), 1);
    }

    #[test]
    fn test_unknown_names() {
        let registry = DriverRegistry::new();
        assert!(!registry.has_driver("nope"));
        assert!(!registry.supports("nope"));
        assert_eq!(
            registry.get_driver("nope").unwrap_err(),
            ForageError::driver_not_found("nope")
        );
        assert!(registry.is_reserved(DRIVER_NAME_LOCAL));
        assert!(!registry.is_reserved("nope"));
    }

    #[test]
    fn test_global_holds_builtins() {
        let registry = DriverRegistry::global();
        assert!(registry.has_driver(DRIVER_NAME_INDEXED));
        assert!(registry.has_driver(DRIVER_NAME_LOCAL));
        assert!(Arc::ptr_eq(&registry, &DriverRegistry::global()));
    }
}
