//! Simulation Driver
//!
//! `TigerStyle`: A driver whose support, initialisation and storage calls
//! are scripted or fault-injected, and which counts what happened to it.
//! Storage is delegated to a private [`MemoryDriver`], so data survives
//! re-initialisation like a real backend's would.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use forage_core::dst::{DeterministicRng, FaultInjector, FaultType, SimClock, SimEnvironment};
use parking_lot::Mutex;
use serde_json::Value;

use super::memory::MemoryDriver;
use crate::config::StoreConfig;
use crate::driver::{Driver, DriverStore, DropTarget, IterateFn, Method, SupportCheck};
use crate::error::{StoreError, StoreResult};

const READ_FAULTS: &[FaultType] = &[
    FaultType::ConnectionClosed,
    FaultType::StoreReadFail,
    FaultType::StoreCorruption,
];
const WRITE_FAULTS: &[FaultType] = &[
    FaultType::ConnectionClosed,
    FaultType::StoreWriteFail,
    FaultType::StoreQuotaExceeded,
];
const DELETE_FAULTS: &[FaultType] = &[FaultType::ConnectionClosed, FaultType::StoreDeleteFail];

/// Scriptable driver for simulation tests.
pub struct SimDriver {
    name: String,
    methods: Vec<Method>,
    support: SupportCheck,
    probe_result: bool,
    fail_init: bool,
    init_latency: Option<(SimClock, u64)>,
    faults: Arc<FaultInjector>,
    memory: MemoryDriver,
    init_count: AtomicU64,
    probe_count: AtomicU64,
    init_configs: Mutex<Vec<StoreConfig>>,
}

impl SimDriver {
    /// Supported driver implementing every method, with no faults.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            memory: MemoryDriver::named(name.clone()),
            name,
            methods: Method::ALL.to_vec(),
            support: SupportCheck::Assumed,
            probe_result: true,
            fail_init: false,
            init_latency: None,
            faults: Arc::new(FaultInjector::new(DeterministicRng::new(0))),
            init_count: AtomicU64::new(0),
            probe_count: AtomicU64::new(0),
            init_configs: Mutex::new(Vec::new()),
        }
    }

    /// Driver wired to a simulation's fault injector and clock.
    #[must_use]
    pub fn from_env(name: impl Into<String>, env: &SimEnvironment) -> Self {
        let mut driver = Self::new(name).with_faults(Arc::clone(&env.faults));
        driver.init_latency = Some((env.clock.clone(), 0));
        driver
    }

    /// Declare which library methods the driver implements.
    #[must_use]
    pub fn with_methods(mut self, methods: Vec<Method>) -> Self {
        self.methods = methods;
        self
    }

    /// Set the support declaration.
    #[must_use]
    pub fn with_support(mut self, support: SupportCheck) -> Self {
        self.support = support;
        self
    }

    /// Answer returned by the support probe.
    #[must_use]
    pub fn with_probe_result(mut self, supported: bool) -> Self {
        self.probe_result = supported;
        self
    }

    /// Make every `init_storage` call fail.
    #[must_use]
    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Hold each `init_storage` until `clock` has advanced `latency_ms`.
    #[must_use]
    pub fn with_init_latency(mut self, clock: SimClock, latency_ms: u64) -> Self {
        self.init_latency = Some((clock, latency_ms));
        self
    }

    /// Inject faults from `faults`.
    #[must_use]
    pub fn with_faults(mut self, faults: Arc<FaultInjector>) -> Self {
        self.faults = faults;
        self
    }

    /// Number of `init_storage` calls so far.
    #[must_use]
    pub fn init_count(&self) -> u64 {
        self.init_count.load(Ordering::SeqCst)
    }

    /// Number of support probes so far.
    #[must_use]
    pub fn probe_count(&self) -> u64 {
        self.probe_count.load(Ordering::SeqCst)
    }

    /// Configurations passed to `init_storage`, in call order.
    #[must_use]
    pub fn init_configs(&self) -> Vec<StoreConfig> {
        self.init_configs.lock().clone()
    }
}

#[async_trait]
impl Driver for SimDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn methods(&self) -> &[Method] {
        &self.methods
    }

    fn support(&self) -> SupportCheck {
        self.support
    }

    async fn probe_support(&self) -> bool {
        self.probe_count.fetch_add(1, Ordering::SeqCst);
        self.probe_result
            && !self
                .faults
                .should_inject_type(FaultType::DriverUnsupported, "probe_support")
    }

    #[tracing::instrument(skip(self, config), fields(driver = %self.name, store = %config.store_name))]
    async fn init_storage(&self, config: &StoreConfig) -> StoreResult<Arc<dyn DriverStore>> {
        self.init_count.fetch_add(1, Ordering::SeqCst);
        self.init_configs.lock().push(config.clone());

        if let Some((clock, latency_ms)) = &self.init_latency {
            let extra = if self
                .faults
                .should_inject_type(FaultType::DriverInitLatency, "init_storage")
            {
                forage_core::DST_LATENCY_MS_MAX
            } else {
                0
            };
            clock.sleep_ms(latency_ms + extra).await;
        }

        if self.fail_init
            || self
                .faults
                .should_inject_type(FaultType::DriverInitFail, "init_storage")
        {
            return Err(StoreError::simulated(FaultType::DriverInitFail.as_str()));
        }

        Ok(Arc::new(SimStore {
            inner: Arc::new(self.memory.open_store(config)),
            faults: Arc::clone(&self.faults),
            database: config.name.clone(),
        }))
    }
}

struct SimStore {
    inner: Arc<dyn DriverStore>,
    faults: Arc<FaultInjector>,
    database: String,
}

impl SimStore {
    fn check(&self, operation: &str, kinds: &[FaultType]) -> StoreResult<()> {
        for &kind in kinds {
            if self.faults.should_inject_type(kind, operation) {
                return Err(match kind {
                    FaultType::ConnectionClosed => StoreError::connection_closed(&self.database),
                    FaultType::StoreCorruption => {
                        StoreError::Deserialization("simulated corruption".to_string())
                    }
                    other => StoreError::simulated(other.as_str()),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DriverStore for SimStore {
    async fn get_item(&self, key: &str) -> StoreResult<Option<Value>> {
        self.check("get_item", READ_FAULTS)?;
        self.inner.get_item(key).await
    }

    async fn set_item(&self, key: &str, value: Value) -> StoreResult<Value> {
        self.check("set_item", WRITE_FAULTS)?;
        self.inner.set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> StoreResult<()> {
        self.check("remove_item", DELETE_FAULTS)?;
        self.inner.remove_item(key).await
    }

    async fn clear(&self) -> StoreResult<()> {
        self.check("clear", DELETE_FAULTS)?;
        self.inner.clear().await
    }

    async fn length(&self) -> StoreResult<usize> {
        self.check("length", READ_FAULTS)?;
        self.inner.length().await
    }

    async fn key(&self, index: usize) -> StoreResult<Option<String>> {
        self.check("key", READ_FAULTS)?;
        self.inner.key(index).await
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        self.check("keys", READ_FAULTS)?;
        self.inner.keys().await
    }

    async fn iterate(&self, iterator: &mut IterateFn<'_>) -> StoreResult<Option<Value>> {
        self.check("iterate", READ_FAULTS)?;
        self.inner.iterate(iterator).await
    }

    async fn drop_instance(&self, target: &DropTarget) -> StoreResult<()> {
        self.check("drop_instance", DELETE_FAULTS)?;
        self.inner.drop_instance(target).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forage_core::dst::{FaultConfig, SimConfig, Simulation};
    use serde_json::json;

    #[tokio::test]
    async fn test_counts_inits_and_keeps_data() {
        let driver = SimDriver::new("sim");
        let config = StoreConfig::default();

        let first = driver.init_storage(&config).await.unwrap();
        first.set_item("k", json!([1, 2])).await.unwrap();
        let second = driver.init_storage(&config).await.unwrap();

        assert_eq!(second.get_item("k").await.unwrap(), Some(json!([1, 2])));
        assert_eq!(driver.init_count(), 2);
        assert_eq!(driver.init_configs().len(), 2);
    }

    #[tokio::test]
    async fn test_failing_init() {
        let driver = SimDriver::new("sim").failing_init();
        let err = driver.init_storage(&StoreConfig::default()).await.err().unwrap();
        assert!(matches!(err, StoreError::SimulatedFault { .. }));
        assert_eq!(driver.init_count(), 1);
    }

    #[tokio::test]
    async fn test_store_faults_from_simulation() {
        let env = Simulation::new(SimConfig::with_seed(11))
            .with_fault(FaultConfig::new(FaultType::StoreWriteFail, 1.0).with_max_injections(1))
            .with_fault(FaultConfig::new(FaultType::ConnectionClosed, 1.0).with_filter("keys"))
            .build();
        let driver = SimDriver::from_env("sim", &env);
        let store = driver.init_storage(&StoreConfig::default()).await.unwrap();

        let err = store.set_item("k", json!(1)).await.unwrap_err();
        assert_eq!(err, StoreError::simulated("store_write_fail"));
        store.set_item("k", json!(1)).await.unwrap();

        assert!(matches!(
            store.keys().await.unwrap_err(),
            StoreError::ConnectionClosed { .. }
        ));
        assert_eq!(store.get_item("k").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_probe_counts() {
        let driver = SimDriver::new("sim").with_probe_result(false);
        assert!(!driver.probe_support().await);
        assert_eq!(driver.probe_count(), 1);
    }
}
