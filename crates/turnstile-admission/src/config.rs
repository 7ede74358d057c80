//! Admission configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

// ---------------------------------------------------------------------------
// AdmissionConfig
// ---------------------------------------------------------------------------

/// Knobs for the admission queue and its two background loops.
///
/// Throughput is capped at `prefetch` admissions per `drain_interval_ms`,
/// no matter how deep the queue gets. That cap is the backpressure: raise
/// it only as far as whatever sits behind admission can absorb.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdmissionConfig {
    /// Tickets admitted per drainer tick.
    pub prefetch: usize,

    /// Time between drainer ticks.
    pub drain_interval_ms: u64,

    /// A ticket whose status hasn't been polled for this long is evicted.
    ///
    /// Only polling keeps a ticket alive. How long it has waited overall
    /// never matters, so a client that stops polling loses its place even
    /// in a short queue.
    pub eviction_timeout_ms: u64,

    /// Time between reaper ticks.
    pub reaper_interval_ms: u64,

    /// How long an admitted identity keeps reporting `Logged` before the
    /// service forgets it and reports `Unknown`.
    pub admitted_retention_ms: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            prefetch: 10,
            drain_interval_ms: 1_000,
            eviction_timeout_ms: 10_000,
            reaper_interval_ms: 1_000,
            admitted_retention_ms: 300_000,
        }
    }
}

impl AdmissionConfig {
    /// Clamp values that would stall or spin the loops.
    ///
    /// - `prefetch` is raised to at least 1 (0 would never admit anyone).
    /// - both loop intervals are raised to at least 1 ms (0 would make
    ///   the tick scheduler idle forever).
    pub fn validated(mut self) -> Self {
        if self.prefetch == 0 {
            warn!("admission prefetch is 0, raising to 1");
            self.prefetch = 1;
        }
        if self.drain_interval_ms == 0 {
            warn!("drain interval is 0, raising to 1 ms");
            self.drain_interval_ms = 1;
        }
        if self.reaper_interval_ms == 0 {
            warn!("reaper interval is 0, raising to 1 ms");
            self.reaper_interval_ms = 1;
        }
        if self.eviction_timeout_ms < self.reaper_interval_ms {
            warn!(
                eviction_timeout_ms = self.eviction_timeout_ms,
                reaper_interval_ms = self.reaper_interval_ms,
                "eviction timeout is shorter than the reaper interval"
            );
        }
        self
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    pub fn eviction_timeout(&self) -> Duration {
        Duration::from_millis(self.eviction_timeout_ms)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms)
    }

    pub fn admitted_retention(&self) -> Duration {
        Duration::from_millis(self.admitted_retention_ms)
    }
}
