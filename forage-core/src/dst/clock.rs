//! `SimClock` - Simulated Time
//!
//! `TigerStyle`: Deterministic, controllable time for simulation.
//! Async sleepers park until a test advances the clock past their deadline.

use crate::constants::{DST_TIME_ADVANCE_MS_MAX, TIME_MS_PER_SEC};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A simulated clock for deterministic testing.
///
/// Time only moves forward and only when told to. Clones share the same
/// underlying time, so a driver holding a clone observes every advance.
#[derive(Debug, Clone)]
pub struct SimClock {
    current_ms: Arc<AtomicU64>,
    notify: Arc<Notify>,
}

impl SimClock {
    /// Create a new clock starting at time zero.
    ///
    /// # Example
    /// ```
    /// use forage_core::dst::SimClock;
    /// let clock = SimClock::new();
    /// assert_eq!(clock.now_ms(), 0);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::at_ms(0)
    }

    /// Create a clock starting at the given millisecond timestamp.
    #[must_use]
    pub fn at_ms(start_ms: u64) -> Self {
        Self {
            current_ms: Arc::new(AtomicU64::new(start_ms)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Get current time in milliseconds.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.current_ms.load(Ordering::SeqCst)
    }

    /// Get current time in seconds (truncated).
    #[must_use]
    pub fn now_secs(&self) -> u64 {
        self.now_ms() / TIME_MS_PER_SEC
    }

    /// Get current time as `DateTime<Utc>`.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        i64::try_from(self.now_ms())
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Advance time by the given milliseconds and wake sleepers.
    ///
    /// # Panics
    /// Panics if ms exceeds `DST_TIME_ADVANCE_MS_MAX`.
    pub fn advance_ms(&self, ms: u64) -> u64 {
        assert!(
            ms <= DST_TIME_ADVANCE_MS_MAX,
            "advance_ms({ms}) exceeds max ({DST_TIME_ADVANCE_MS_MAX})"
        );

        let old_time = self.current_ms.fetch_add(ms, Ordering::SeqCst);
        let new_time = old_time.saturating_add(ms);
        self.notify.notify_waiters();

        assert!(new_time >= old_time, "time must not go backwards");
        new_time
    }

    /// Get elapsed time since a given timestamp.
    ///
    /// # Panics
    /// Panics if since is in the future.
    #[must_use]
    pub fn elapsed_since(&self, since: u64) -> u64 {
        let current = self.now_ms();
        assert!(
            since <= current,
            "elapsed_since({since}) is in the future (now={current})"
        );
        current - since
    }

    /// Sleep until `duration_ms` of simulated time has passed.
    pub async fn sleep_ms(&self, duration_ms: u64) {
        let target_ms = self.now_ms().saturating_add(duration_ms);
        self.sleep_until_ms(target_ms).await;
    }

    /// Sleep until the clock reaches `deadline_ms`.
    pub async fn sleep_until_ms(&self, deadline_ms: u64) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so an advance in between is not lost.
            notified.as_mut().enable();
            if self.now_ms() >= deadline_ms {
                return;
            }
            notified.await;
        }
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_time() {
        let clock = SimClock::new();
        assert_eq!(clock.now_ms(), 0);
        assert_eq!(clock.now(), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_advance_shared_between_clones() {
        let clock = SimClock::at_ms(5000);
        let other = clock.clone();

        assert_eq!(clock.advance_ms(1500), 6500);
        assert_eq!(other.now_ms(), 6500);
        assert_eq!(other.now_secs(), 6);
        assert_eq!(other.elapsed_since(5000), 1500);
    }

    #[test]
    #[should_panic(expected = "exceeds max")]
    fn test_advance_too_far() {
        SimClock::new().advance_ms(DST_TIME_ADVANCE_MS_MAX + 1);
    }

    #[tokio::test]
    async fn test_sleep_wakes_on_advance() {
        let clock = SimClock::new();
        let sleeper = clock.clone();
        let handle = tokio::spawn(async move {
            sleeper.sleep_ms(100).await;
            sleeper.now_ms()
        });

        tokio::task::yield_now().await;
        clock.advance_ms(50);
        tokio::task::yield_now().await;
        assert!(!handle.is_finished());

        clock.advance_ms(50);
        let woke_at = handle.await.expect("sleeper task panicked");
        assert_eq!(woke_at, 100);
    }

    #[tokio::test]
    async fn test_sleep_zero_returns_immediately() {
        let clock = SimClock::at_ms(10);
        clock.sleep_ms(0).await;
        assert_eq!(clock.now_ms(), 10);
    }
}
