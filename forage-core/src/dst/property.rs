//! Property-Based Testing
//!
//! `TigerStyle`: Random operation sequences with invariant checks after
//! every step, reproducible from the seed.
//!
//! # Example
//!
//! ```rust
//! use forage_core::dst::{DeterministicRng, PropertyTest, PropertyTestable, SimClock};
//!
//! #[derive(Default)]
//! struct Counter(u64);
//!
//! impl PropertyTestable for Counter {
//!     type Operation = u64;
//!
//!     fn generate_operation(&self, rng: &mut DeterministicRng) -> u64 {
//!         rng.next_usize(0, 9) as u64
//!     }
//!
//!     fn apply_operation(&mut self, op: &u64, _clock: &SimClock) {
//!         self.0 += op;
//!     }
//!
//!     fn check_invariants(&self) -> Result<(), String> {
//!         Ok(())
//!     }
//! }
//!
//! PropertyTest::new(42).with_max_operations(50).run_and_assert(Counter::default());
//! ```

use std::fmt::Debug;

use super::clock::SimClock;
use super::rng::DeterministicRng;
use crate::constants::{DST_PROPERTY_OPERATIONS_COUNT_DEFAULT, DST_SIMULATION_STEPS_MAX};

/// Trait for systems that can be property-tested.
pub trait PropertyTestable {
    /// The type of operations that can be performed.
    type Operation: Debug + Clone;

    /// Generate a random operation valid for the current state.
    fn generate_operation(&self, rng: &mut DeterministicRng) -> Self::Operation;

    /// Apply an operation to the state.
    fn apply_operation(&mut self, op: &Self::Operation, clock: &SimClock);

    /// Check that all invariants hold.
    ///
    /// # Errors
    /// Returns a description of the first violated invariant.
    fn check_invariants(&self) -> Result<(), String>;

    /// Describe the current state for failure reports.
    fn describe_state(&self) -> String {
        String::from("(state description not implemented)")
    }
}

/// Details of a property test failure.
#[derive(Debug)]
pub struct PropertyTestFailure {
    /// Index of the failing operation (0-based)
    pub operation_index: u64,
    /// The operation that caused the failure
    pub operation: String,
    /// The invariant violation message
    pub message: String,
    /// Description of the state at failure
    pub state_description: String,
}

/// Result of a property test run.
#[derive(Debug)]
pub struct PropertyTestResult {
    /// Number of operations executed
    pub operations_executed: u64,
    /// Seed used for reproduction
    pub seed: u64,
    /// Failure details, if any
    pub failure: Option<PropertyTestFailure>,
}

impl PropertyTestResult {
    /// Check if the test passed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Panic with reproduction details if the run failed.
    ///
    /// # Panics
    /// Panics if the test failed.
    pub fn assert_success(self) {
        if let Some(failure) = self.failure {
            panic!(
                "Property test failed!\n\
                 Seed: {} (use DST_SEED to reproduce)\n\
                 Operation #{}: {}\n\
                 Invariant violation: {}\n\
                 State: {}",
                self.seed,
                failure.operation_index,
                failure.operation,
                failure.message,
                failure.state_description
            );
        }
    }
}

/// Property-based test runner.
#[derive(Debug)]
pub struct PropertyTest {
    seed: u64,
    max_operations: u64,
    /// Milliseconds the clock advances after every operation
    tick_ms: u64,
}

impl PropertyTest {
    /// Create a new property test with the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            max_operations: DST_PROPERTY_OPERATIONS_COUNT_DEFAULT,
            tick_ms: 0,
        }
    }

    /// Set the number of operations to run.
    ///
    /// # Panics
    /// Panics if max exceeds `DST_SIMULATION_STEPS_MAX`.
    #[must_use]
    pub fn with_max_operations(mut self, max: u64) -> Self {
        assert!(
            max <= DST_SIMULATION_STEPS_MAX,
            "max_operations {max} exceeds DST_SIMULATION_STEPS_MAX {DST_SIMULATION_STEPS_MAX}"
        );
        self.max_operations = max;
        self
    }

    /// Advance the simulated clock by `ms` after each operation.
    #[must_use]
    pub fn with_tick_ms(mut self, ms: u64) -> Self {
        self.tick_ms = ms;
        self
    }

    /// Run the property test.
    #[must_use]
    pub fn run<T: PropertyTestable>(self, mut state: T) -> PropertyTestResult {
        let mut rng = DeterministicRng::new(self.seed);
        let clock = SimClock::new();

        if let Err(message) = state.check_invariants() {
            return self.failed(0, 0, "(initial state)".to_string(), message, &state);
        }

        for index in 0..self.max_operations {
            let op = state.generate_operation(&mut rng);
            let op_debug = format!("{op:?}");
            state.apply_operation(&op, &clock);
            if self.tick_ms > 0 {
                clock.advance_ms(self.tick_ms);
            }

            if let Err(message) = state.check_invariants() {
                return self.failed(index + 1, index, op_debug, message, &state);
            }
        }

        PropertyTestResult {
            operations_executed: self.max_operations,
            seed: self.seed,
            failure: None,
        }
    }

    /// Run the property test, panicking on failure.
    ///
    /// # Panics
    /// Panics if any invariant is violated.
    pub fn run_and_assert<T: PropertyTestable>(self, state: T) {
        self.run(state).assert_success();
    }

    fn failed<T: PropertyTestable>(
        &self,
        executed: u64,
        operation_index: u64,
        operation: String,
        message: String,
        state: &T,
    ) -> PropertyTestResult {
        PropertyTestResult {
            operations_executed: executed,
            seed: self.seed,
            failure: Some(PropertyTestFailure {
                operation_index,
                operation,
                message,
                state_description: state.describe_state(),
            }),
        }
    }
}

/// Run a property test once per seed.
///
/// # Panics
/// Panics on the first seed whose run fails.
pub fn run_property_tests<T, F>(seeds: &[u64], max_operations: u64, state_factory: F)
where
    T: PropertyTestable,
    F: Fn() -> T,
{
    for &seed in seeds {
        PropertyTest::new(seed)
            .with_max_operations(max_operations)
            .run_and_assert(state_factory());
    }
}

/// Deterministic list of seeds for multi-seed runs.
#[must_use]
pub fn test_seeds(count: usize) -> Vec<u64> {
    let mut rng = DeterministicRng::new(0);
    (0..count).map(|_| rng.next_u64()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bounded stack: push/pop with a capacity invariant.
    struct Stack {
        items: Vec<u8>,
        capacity: usize,
        broken: bool,
    }

    #[derive(Debug, Clone)]
    enum StackOp {
        Push(u8),
        Pop,
    }

    impl PropertyTestable for Stack {
        type Operation = StackOp;

        fn generate_operation(&self, rng: &mut DeterministicRng) -> StackOp {
            if rng.next_bool(0.6) {
                StackOp::Push(rng.next_usize(0, 255) as u8)
            } else {
                StackOp::Pop
            }
        }

        fn apply_operation(&mut self, op: &StackOp, _clock: &SimClock) {
            match op {
                StackOp::Push(v) if self.broken || self.items.len() < self.capacity => {
                    self.items.push(*v);
                }
                StackOp::Push(_) => {}
                StackOp::Pop => {
                    self.items.pop();
                }
            }
        }

        fn check_invariants(&self) -> Result<(), String> {
            if self.items.len() > self.capacity {
                return Err(format!("len {} > capacity {}", self.items.len(), self.capacity));
            }
            Ok(())
        }

        fn describe_state(&self) -> String {
            format!("{:?}", self.items)
        }
    }

    #[test]
    fn test_invariant_holds() {
        let result = PropertyTest::new(42).with_max_operations(200).run(Stack {
            items: Vec::new(),
            capacity: 4,
            broken: false,
        });
        assert!(result.is_success());
        assert_eq!(result.operations_executed, 200);
    }

    #[test]
    fn test_violation_reported() {
        let result = PropertyTest::new(42).with_max_operations(500).run(Stack {
            items: Vec::new(),
            capacity: 1,
            broken: true,
        });
        let failure = result.failure.expect("broken stack must fail");
        assert!(failure.message.contains("capacity"));
    }

    #[test]
    fn test_multi_seed() {
        let seeds = test_seeds(5);
        assert_eq!(seeds.len(), 5);
        assert_eq!(seeds, test_seeds(5));
        run_property_tests(&seeds, 50, || Stack {
            items: Vec::new(),
            capacity: 3,
            broken: false,
        });
    }
}
