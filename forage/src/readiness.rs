//! Readiness Sequencer
//!
//! `TigerStyle`: One awaitable gate per instance. Every storage operation
//! passes through it, so no call reaches a driver before selection settles.
//!
//! # Cycles
//!
//! A *cycle* is one driver selection plus at most one initialisation, which
//! starts lazily on the first `ready()`. Beginning a cycle happens
//! synchronously at call time; its selection future first waits for the
//! previous cycle to settle (its selection, and its initialisation if one
//! was started), so two `set_driver` calls can never interleave. A cycle that
//! is superseded before it initialised is sealed: callers bound to it follow
//! the current cycle instead.
//!
//! ```text
//!   Idle ──ready()/set_driver()──▶ Selecting ──▶ Ready { driver }
//!                                      │
//!                                      └───────▶ Failed { error }
//! ```
//!
//! Every outcome is held in a `Shared` future, so concurrent waiters observe
//! the same result and initialisation runs once per cycle.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::{DriverList, StoreConfig};
use crate::error::ForageResult;
use crate::selector::{ActiveDriver, DriverSelector, Selection};

type SharedSelection = Shared<BoxFuture<'static, ForageResult<Arc<Selection>>>>;
type SharedInit = Shared<BoxFuture<'static, ForageResult<ActiveDriver>>>;

// =============================================================================
// Public State
// =============================================================================

/// Observable readiness of an instance.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadinessState {
    /// No selection has run yet
    Idle,
    /// A selection or its initialisation is outstanding
    Selecting,
    /// Selection succeeded
    Ready {
        /// Active driver name
        driver: String,
    },
    /// Selection exhausted its candidates
    Failed {
        /// The terminal error every waiter receives
        error: crate::error::ForageError,
    },
}

// =============================================================================
// Cycles
// =============================================================================

enum InitSlot {
    NotStarted,
    Started(SharedInit),
    /// A newer cycle began before this one initialised
    Superseded,
}

struct Cycle {
    generation: u64,
    selection: SharedSelection,
    init: Mutex<InitSlot>,
    /// Set once a storage operation has completed on this cycle
    used: AtomicBool,
}

impl Cycle {
    /// Resolves once this cycle can no longer change the active driver.
    async fn settled(self: Arc<Self>) {
        let _ = self.selection.clone().await;

        let init = {
            let mut slot = self.init.lock();
            match std::mem::replace(&mut *slot, InitSlot::Superseded) {
                InitSlot::Started(init) => {
                    *slot = InitSlot::Started(init.clone());
                    Some(init)
                }
                InitSlot::NotStarted | InitSlot::Superseded => None,
            }
        };

        if let Some(init) = init {
            let _ = init.await;
        }
    }
}

/// A ready driver plus the cycle that produced it.
pub(crate) struct Lease {
    pub(crate) active: ActiveDriver,
    cycle: Arc<Cycle>,
}

impl Lease {
    /// Record that a storage operation completed on this cycle.
    pub(crate) fn mark_used(&self) {
        self.cycle.used.store(true, Ordering::Release);
    }
}

// =============================================================================
// Sequencer
// =============================================================================

/// Per-instance readiness state machine.
pub struct Readiness {
    selector: DriverSelector,
    config: Arc<RwLock<StoreConfig>>,
    current: Mutex<Option<Arc<Cycle>>>,
    generations: AtomicU64,
    last_active: Arc<RwLock<Option<String>>>,
}

impl Readiness {
    /// Sequencer selecting through `selector`, initialising with `config`.
    #[must_use]
    pub fn new(selector: DriverSelector, config: Arc<RwLock<StoreConfig>>) -> Self {
        Self {
            selector,
            config,
            current: Mutex::new(None),
            generations: AtomicU64::new(0),
            last_active: Arc::new(RwLock::new(None)),
        }
    }

    /// The selector candidates are resolved with.
    #[must_use]
    pub fn selector(&self) -> &DriverSelector {
        &self.selector
    }

    /// Begin a new selection cycle for `candidates` without waiting on it.
    pub fn begin_selection(&self, candidates: Vec<String>) {
        let mut current = self.current.lock();
        self.begin_locked(&mut current, candidates);
    }

    /// Begin a new selection cycle and wait until the instance is ready.
    ///
    /// The cycle is registered when this is called, not when the future is
    /// first polled.
    pub fn set_driver(
        &self,
        candidates: Vec<String>,
    ) -> impl Future<Output = ForageResult<ActiveDriver>> + Send + '_ {
        let cycle = {
            let mut current = self.current.lock();
            self.begin_locked(&mut current, candidates)
        };
        async move { self.drive(cycle).await.map(|lease| lease.active) }
    }

    /// Wait for the current cycle, beginning one from the configured driver
    /// list if none has run yet.
    ///
    /// # Errors
    /// Returns the cycle's terminal error (`NoAvailableStorageMethod`).
    pub async fn ready(&self) -> ForageResult<ActiveDriver> {
        self.lease().await.map(|lease| lease.active)
    }

    pub(crate) async fn lease(&self) -> ForageResult<Lease> {
        let cycle = self.current_or_begin();
        self.drive(cycle).await
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ReadinessState {
        let Some(cycle) = self.current.lock().clone() else {
            return ReadinessState::Idle;
        };

        match cycle.selection.peek() {
            None => ReadinessState::Selecting,
            Some(Err(error)) => ReadinessState::Failed {
                error: error.clone(),
            },
            Some(Ok(_)) => match &*cycle.init.lock() {
                InitSlot::Started(init) => match init.peek() {
                    Some(Ok(active)) => ReadinessState::Ready {
                        driver: active.name.clone(),
                    },
                    Some(Err(error)) => ReadinessState::Failed {
                        error: error.clone(),
                    },
                    None => ReadinessState::Selecting,
                },
                InitSlot::NotStarted | InitSlot::Superseded => ReadinessState::Selecting,
            },
        }
    }

    /// Name of the most recently initialised driver.
    #[must_use]
    pub fn driver(&self) -> Option<String> {
        self.last_active.read().clone()
    }

    /// Whether the current cycle has served a storage operation.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|cycle| cycle.used.load(Ordering::Acquire))
    }

    /// Number of cycles begun so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generations.load(Ordering::Relaxed)
    }

    fn current_or_begin(&self) -> Arc<Cycle> {
        let mut current = self.current.lock();
        if let Some(cycle) = current.as_ref() {
            return Arc::clone(cycle);
        }
        let candidates = self.config.read().driver.names();
        self.begin_locked(&mut current, candidates)
    }

    fn begin_locked(&self, current: &mut Option<Arc<Cycle>>, candidates: Vec<String>) -> Arc<Cycle> {
        let previous = current.take();
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(generation, ?candidates, "beginning driver selection");

        let selector = self.selector.clone();
        let selection = async move {
            if let Some(previous) = previous {
                previous.settled().await;
            }
            selector.select(&candidates).await.map(Arc::new)
        }
        .boxed()
        .shared();

        let cycle = Arc::new(Cycle {
            generation,
            selection,
            init: Mutex::new(InitSlot::NotStarted),
            used: AtomicBool::new(false),
        });
        *current = Some(Arc::clone(&cycle));
        cycle
    }

    async fn drive(&self, mut cycle: Arc<Cycle>) -> ForageResult<Lease> {
        loop {
            let selection = cycle.selection.clone().await?;

            let init = {
                let mut slot = cycle.init.lock();
                match std::mem::replace(&mut *slot, InitSlot::NotStarted) {
                    InitSlot::Started(init) => {
                        *slot = InitSlot::Started(init.clone());
                        Some(init)
                    }
                    InitSlot::NotStarted => {
                        let init = self.start_init(cycle.generation, selection);
                        *slot = InitSlot::Started(init.clone());
                        Some(init)
                    }
                    InitSlot::Superseded => {
                        *slot = InitSlot::Superseded;
                        None
                    }
                }
            };

            match init {
                Some(init) => {
                    let active = init.await?;
                    return Ok(Lease { active, cycle });
                }
                None => {
                    debug!(generation = cycle.generation, "cycle superseded, following current");
                    cycle = self.current_or_begin();
                }
            }
        }
    }

    fn start_init(&self, generation: u64, selection: Arc<Selection>) -> SharedInit {
        let config = Arc::clone(&self.config);
        let last_active = Arc::clone(&self.last_active);

        async move {
            let snapshot = config.read().clone();
            let outcome = selection.initialize(&snapshot).await;

            if let Some(name) = &outcome.attempted {
                config.write().driver = DriverList::One(name.clone());
            }
            match &outcome.result {
                Ok(active) => {
                    *last_active.write() = Some(active.name.clone());
                    debug!(generation, driver = %active.name, "instance ready");
                }
                Err(error) => warn!(generation, %error, "no candidate driver initialised"),
            }
            outcome.result
        }
        .boxed()
        .shared()
    }
}

impl std::fmt::Debug for Readiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Readiness")
            .field("state", &self.state())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}
