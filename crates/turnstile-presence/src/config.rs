//! Presence configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Configuration for presence tracking.
///
/// The defaults suit clients that heartbeat every few seconds. The
/// timeout should be several heartbeat periods long so one dropped
/// packet doesn't kick anyone out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PresenceConfig {
    /// Time between analyzer passes.
    ///
    /// Default: 5000 ms.
    pub analyzer_interval_ms: u64,

    /// An identity whose last heartbeat is older than this is expired.
    ///
    /// Default: 30 seconds.
    pub heartbeat_timeout_secs: u64,

    /// How many identities may be connected at once.
    ///
    /// Default: 1000.
    pub max_concurrent_identities: usize,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            analyzer_interval_ms: 5_000,
            heartbeat_timeout_secs: 30,
            max_concurrent_identities: 1_000,
        }
    }
}

impl PresenceConfig {
    /// Clamp values the analyzer can't work with.
    ///
    /// A zero analyzer interval is raised to 1 ms. A zero capacity is
    /// allowed (nobody gets in) but logged, since it is rarely intended.
    pub fn validated(mut self) -> Self {
        if self.analyzer_interval_ms == 0 {
            warn!("analyzer interval is 0, raising to 1 ms");
            self.analyzer_interval_ms = 1;
        }
        if self.max_concurrent_identities == 0 {
            warn!("max_concurrent_identities is 0, every entry will be denied");
        }
        self
    }

    pub fn analyzer_interval(&self) -> Duration {
        Duration::from_millis(self.analyzer_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}
