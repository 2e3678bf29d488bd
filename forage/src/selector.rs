//! Driver Selector
//!
//! `TigerStyle`: Preference list in, one initialised driver out, with a
//! strictly ordered fallback chain between the two.
//!
//! Selection is two phases. [`DriverSelector::select`] filters the
//! preference list down to supported names. [`Selection::initialize`] then
//! tries those names in order until one initialises.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::driver::DriverStore;
use crate::error::{ForageError, ForageResult};
use crate::registry::DriverRegistry;

/// An initialised driver: the name that won and the store it produced.
#[derive(Clone)]
pub struct ActiveDriver {
    /// Winning driver name
    pub name: String,
    /// Storage for the configuration it was initialised with
    pub store: Arc<dyn DriverStore>,
    /// The configuration `store` was initialised with
    pub config: StoreConfig,
}

impl fmt::Debug for ActiveDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveDriver")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Outcome of [`Selection::initialize`].
#[derive(Debug, Clone)]
pub struct InitOutcome {
    /// The active driver, or `NoAvailableStorageMethod`
    pub result: ForageResult<ActiveDriver>,
    /// Last candidate whose initialisation was attempted
    pub attempted: Option<String>,
}

/// Filters preference lists against one registry.
#[derive(Debug, Clone)]
pub struct DriverSelector {
    registry: Arc<DriverRegistry>,
}

impl DriverSelector {
    /// Selector over `registry`.
    #[must_use]
    pub fn new(registry: Arc<DriverRegistry>) -> Self {
        Self { registry }
    }

    /// The registry candidates are looked up in.
    #[must_use]
    pub fn registry(&self) -> &Arc<DriverRegistry> {
        &self.registry
    }

    /// Keep the supported names, in order, duplicates included.
    ///
    /// # Errors
    /// Returns `NoAvailableStorageMethod` when no candidate is supported.
    #[tracing::instrument(skip(self))]
    pub async fn select(&self, candidates: &[String]) -> ForageResult<Selection> {
        let mut supported = Vec::with_capacity(candidates.len());
        for name in candidates {
            if self.registry.resolve_support(name).await {
                supported.push(name.clone());
            } else {
                debug!(driver = %name, "skipping unsupported driver");
            }
        }

        if supported.is_empty() {
            return Err(ForageError::NoAvailableStorageMethod);
        }

        Ok(Selection {
            registry: Arc::clone(&self.registry),
            candidates: supported,
        })
    }
}

/// Supported candidates awaiting initialisation.
#[derive(Debug)]
pub struct Selection {
    registry: Arc<DriverRegistry>,
    candidates: Vec<String>,
}

impl Selection {
    /// Supported candidate names in preference order.
    #[must_use]
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// The candidate that will be tried first.
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        self.candidates.first().map(String::as_str)
    }

    /// Initialise candidates in order until one succeeds.
    ///
    /// A candidate that fails, or that has vanished from the registry, is
    /// skipped. Only exhaustion is an error.
    pub async fn initialize(&self, config: &StoreConfig) -> InitOutcome {
        let mut attempted = None;

        for name in &self.candidates {
            attempted = Some(name.clone());

            let driver = match self.registry.get_driver(name) {
                Ok(driver) => driver,
                Err(err) => {
                    debug!(driver = %name, error = %err, "candidate not registered");
                    continue;
                }
            };

            match driver.init_storage(config).await {
                Ok(store) => {
                    debug!(driver = %name, "driver initialised");
                    return InitOutcome {
                        result: Ok(ActiveDriver {
                            name: name.clone(),
                            store,
                            config: config.clone(),
                        }),
                        attempted,
                    };
                }
                Err(err) => {
                    warn!(driver = %name, error = %err, "driver failed to initialise, trying next candidate");
                }
            }
        }

        InitOutcome {
            result: Err(ForageError::NoAvailableStorageMethod),
            attempted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SupportCheck;
    use crate::drivers::SimDriver;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    async fn registry_with(drivers: Vec<Arc<SimDriver>>) -> Arc<DriverRegistry> {
        let registry = Arc::new(DriverRegistry::new());
        for driver in drivers {
            registry.define_driver(driver).await.unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn test_select_filters_and_keeps_order() {
        let registry = registry_with(vec![
            Arc::new(SimDriver::new("a").with_support(SupportCheck::Known(false))),
            Arc::new(SimDriver::new("b")),
            Arc::new(SimDriver::new("c")),
        ])
        .await;

        let selection = DriverSelector::new(registry)
            .select(&names(&["c", "a", "missing", "b", "c"]))
            .await
            .unwrap();
        assert_eq!(selection.candidates(), names(&["c", "b", "c"]).as_slice());
        assert_eq!(selection.first(), Some("c"));
    }

    #[tokio::test]
    async fn test_select_nothing_supported() {
        let registry = registry_with(vec![Arc::new(
            SimDriver::new("a").with_support(SupportCheck::Known(false)),
        )])
        .await;

        let err = DriverSelector::new(registry)
            .select(&names(&["a", "b"]))
            .await
            .unwrap_err();
        assert_eq!(err, ForageError::NoAvailableStorageMethod);
    }

    #[tokio::test]
    async fn test_initialize_falls_back() {
        let broken = Arc::new(SimDriver::new("broken").failing_init());
        let good = Arc::new(SimDriver::new("good"));
        let unused = Arc::new(SimDriver::new("unused"));
        let registry = registry_with(vec![
            Arc::clone(&broken),
            Arc::clone(&good),
            Arc::clone(&unused),
        ])
        .await;

        let selection = DriverSelector::new(registry)
            .select(&names(&["broken", "good", "unused"]))
            .await
            .unwrap();
        let outcome = selection.initialize(&StoreConfig::default()).await;

        assert_eq!(outcome.result.unwrap().name, "good");
        assert_eq!(outcome.attempted.as_deref(), Some("good"));
        assert_eq!(broken.init_count(), 1);
        assert_eq!(good.init_count(), 1);
        assert_eq!(unused.init_count(), 0);
    }

    #[tokio::test]
    async fn test_initialize_exhausted() {
        let registry = registry_with(vec![
            Arc::new(SimDriver::new("x").failing_init()),
            Arc::new(SimDriver::new("y").failing_init()),
        ])
        .await;

        let selection = DriverSelector::new(registry)
            .select(&names(&["x", "y"]))
            .await
            .unwrap();
        let outcome = selection.initialize(&StoreConfig::default()).await;

        assert_eq!(outcome.result.unwrap_err(), ForageError::NoAvailableStorageMethod);
        assert_eq!(outcome.attempted.as_deref(), Some("y"));
    }
}
