//! Fixed-interval tick scheduler for Turnstile's background loops.
//!
//! Every periodic job in the workspace (the admission reaper, the
//! admission drainer, the presence analyzer) is a loop of the form
//! "wait for the next tick, run one iteration, repeat". This crate owns
//! the "wait" half: a [`TickScheduler`] that skips ahead after a stall and
//! warns when an iteration outgrows its interval, plus a [`TaskGroup`]
//! that spawns such loops and stops them on request.
//!
//! # Idle mode
//!
//! When `interval` is zero the scheduler never fires and
//! [`TickScheduler::wait_for_tick`] pends forever. A loop configured this
//! way is effectively disabled but still answers its stop signal.
//!
//! # Integration
//!
//! The scheduler is designed to sit inside a `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = stop.changed() => break,
//!         _ = scheduler.wait_for_tick() => {
//!             reap_once();
//!             scheduler.record_tick_end();
//!         }
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

mod group;

pub use group::TaskGroup;

/// Configuration for one periodic loop.
///
/// A tick that fires late never replays the missed ones: the next tick is
/// scheduled one interval after the late one. A sweep that ran late has
/// already seen the latest state.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Time between ticks. `Duration::ZERO` = idle (tick never fires).
    pub interval: Duration,
    /// Fraction of the interval (0.0 to 1.0) past which a slow iteration
    /// is logged at debug. Past the whole interval it is a warning.
    pub budget_warn_threshold: f64,
    /// Random jitter (0 to max) added to the *first* tick so loops started
    /// at the same instant don't all wake together.
    pub initial_jitter: Duration,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval: Duration::ZERO,
            budget_warn_threshold: 0.80,
            initial_jitter: Duration::from_millis(2),
        }
    }
}

impl TickConfig {
    /// Shortest interval the scheduler accepts (idle aside).
    pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::with_interval(Duration::from_millis(ms))
    }

    /// Same config with the first-tick jitter removed.
    pub fn without_jitter(mut self) -> Self {
        self.initial_jitter = Duration::ZERO;
        self
    }

    /// Raises a non-zero `interval` to [`Self::MIN_INTERVAL`] and clamps
    /// `budget_warn_threshold` to `0.0..=1.0`.
    pub fn validated(mut self) -> Self {
        if !self.interval.is_zero() && self.interval < Self::MIN_INTERVAL {
            warn!(
                interval_us = self.interval.as_micros() as u64,
                min_ms = Self::MIN_INTERVAL.as_millis() as u64,
                "tick interval below minimum, clamping"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }

    /// Duration of a single tick. Returns `None` in idle mode.
    pub fn tick_duration(&self) -> Option<Duration> {
        if self.interval.is_zero() {
            None
        } else {
            Some(self.interval)
        }
    }
}

/// Fixed-interval tick scheduler. One per background loop.
pub struct TickScheduler {
    config: TickConfig,
    tick_duration: Option<Duration>,
    tick_count: u64,
    next_tick: Option<Instant>,
    /// Set by `wait_for_tick`, consumed by `record_tick_end`.
    tick_start: Option<Instant>,
}

impl TickScheduler {
    /// Creates a scheduler whose first tick fires one interval from now,
    /// plus jitter.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let tick_duration = config.tick_duration();

        let next_tick = tick_duration.map(|d| {
            let max_us = config.initial_jitter.as_micros() as u64;
            let jitter = if max_us == 0 {
                Duration::ZERO
            } else {
                Duration::from_micros(rand::rng().random_range(0..max_us))
            };
            Instant::now() + d + jitter
        });

        match tick_duration {
            None => debug!("tick scheduler created in idle mode (never fires)"),
            Some(d) => debug!(interval_ms = d.as_millis() as u64, "tick scheduler created"),
        }

        Self {
            config,
            tick_duration,
            tick_count: 0,
            next_tick,
            tick_start: None,
        }
    }

    /// Waits until the next tick is due and returns its number (from 1).
    ///
    /// In idle mode this future pends forever; inside a `tokio::select!`
    /// the other branches keep working.
    pub async fn wait_for_tick(&mut self) -> u64 {
        let (next, tick_dur) = match (self.next_tick, self.tick_duration) {
            (Some(next), Some(dur)) => (next, dur),
            _ => std::future::pending().await,
        };

        time::sleep_until(next).await;

        let now = Instant::now();
        self.tick_count += 1;
        self.tick_start = Some(now);

        let late_by = now.saturating_duration_since(next);
        let skipped = late_by.as_nanos() / tick_dur.as_nanos();
        if skipped > 0 {
            warn!(
                tick = self.tick_count,
                skipped = skipped as u64,
                late_ms = late_by.as_millis() as u64,
                "tick overrun, skipping ahead"
            );
        }
        self.next_tick = Some(now + tick_dur);

        trace!(tick = self.tick_count, "tick fired");
        self.tick_count
    }

    /// Records that the current iteration has finished and warns if it
    /// used too much of its interval. A no-op if no tick is in progress.
    pub fn record_tick_end(&mut self) {
        let (Some(start), Some(budget)) = (self.tick_start.take(), self.tick_duration) else {
            return;
        };
        let elapsed = start.elapsed();
        let utilization = elapsed.as_secs_f64() / budget.as_secs_f64();

        if utilization >= 1.0 {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_millis() as u64,
                interval_ms = budget.as_millis() as u64,
                "iteration took longer than its interval"
            );
        } else if utilization >= self.config.budget_warn_threshold {
            debug!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_millis() as u64,
                utilization_pct = format!("{:.1}", utilization * 100.0),
                "iteration approaching its interval"
            );
        }
    }

    /// Whether this scheduler never fires (zero interval).
    pub fn is_idle(&self) -> bool {
        self.tick_duration.is_none()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// The interval, or `None` in idle mode.
    pub fn tick_duration(&self) -> Option<Duration> {
        self.tick_duration
    }
}
