//! Environment abstraction for deterministic testing.
//!
//! Time and randomness come from the environment, never from globals, so the
//! same node code runs against the system clock in production and against
//! turmoil's virtual clock with a seeded RNG in simulation.

use std::{
    future::Future,
    time::{Duration, Instant, SystemTime},
};

/// Source of time and randomness for a node.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant.
    fn now(&self) -> Instant;

    /// Wall-clock time, used to stamp critical-section events.
    fn wall_clock(&self) -> SystemTime;

    /// Sleep for `duration`.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_le_bytes(bytes)
    }

    /// Random duration in `[min, max]` at millisecond granularity.
    ///
    /// Returns `min` when `max <= min`.
    fn random_duration(&self, min: Duration, max: Duration) -> Duration {
        let Some(span) = max.checked_sub(min) else {
            return min;
        };
        let span_ms = span.as_millis() as u64;
        if span_ms == 0 {
            return min;
        }
        min + Duration::from_millis(self.random_u64() % (span_ms + 1))
    }
}
