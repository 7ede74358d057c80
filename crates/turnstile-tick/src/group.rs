//! Supervised periodic tasks with an explicit stop signal.
//!
//! Background loops in Turnstile run for the lifetime of the service,
//! but tests (and orderly shutdowns) need to stop them deterministically.
//! A [`TaskGroup`] owns a `watch` channel that every loop it spawns
//! listens to; [`TaskGroup::shutdown`] flips it and joins the tasks.
//!
//! Faults are contained at iteration granularity. Each iteration runs in
//! its own Tokio task, so an `Err` is logged and a panic surfaces as a
//! `JoinError` that is logged too. Either way the loop keeps ticking.

use std::fmt::Display;
use std::future::Future;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{TickConfig, TickScheduler};

/// A set of named periodic loops sharing one stop signal.
///
/// Dropping the group also stops its loops: the `watch` sender goes away,
/// every receiver sees the channel close, and each loop exits after its
/// current iteration.
#[must_use = "dropping a TaskGroup stops every loop it spawned"]
pub struct TaskGroup {
    stop_tx: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl TaskGroup {
    /// Creates an empty group.
    pub fn new() -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            stop_tx,
            tasks: Vec::new(),
        }
    }

    /// Spawns a loop that runs `iteration` once per tick until stopped.
    ///
    /// `iteration` is called to build a fresh future each tick. Errors it
    /// returns are logged under `name` and the loop carries on.
    pub fn spawn_periodic<F, Fut, E>(
        &mut self,
        name: &'static str,
        config: TickConfig,
        mut iteration: F,
    ) where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let mut stop = self.stop_tx.subscribe();

        let handle = tokio::spawn(async move {
            let mut scheduler = TickScheduler::new(config);
            info!(task = name, interval = ?scheduler.tick_duration(), "periodic task started");

            loop {
                tokio::select! {
                    biased;
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                    _ = scheduler.wait_for_tick() => {
                        match tokio::spawn(iteration()).await {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => {
                                error!(task = name, error = %e, "iteration failed");
                            }
                            Err(e) => {
                                error!(task = name, error = %e, "iteration panicked");
                            }
                        }
                        scheduler.record_tick_end();
                    }
                }
            }

            info!(
                task = name,
                ticks = scheduler.tick_count(),
                "periodic task stopped"
            );
        });

        self.tasks.push((name, handle));
    }

    /// Number of loops spawned into this group.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` if no loops were spawned.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Signals every loop to stop and waits for all of them to exit.
    ///
    /// A loop that is mid-iteration finishes that iteration first.
    pub async fn shutdown(self) {
        // send_replace never fails, even with no receivers left.
        self.stop_tx.send_replace(true);

        for (name, handle) in self.tasks {
            if let Err(e) = handle.await {
                warn!(task = name, error = %e, "periodic task ended abnormally");
            }
        }
    }
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.tasks.iter().map(|(n, _)| *n).collect();
        f.debug_struct("TaskGroup").field("tasks", &names).finish()
    }
}
