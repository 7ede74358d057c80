//! The admission service: ticket queue, membership, reaper and drainer.

use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info};
use turnstile_protocol::{Identity, IdentityRecord, LoginRequest, LoginStatus};
use turnstile_queue::{QueueError, TicketQueue};
use turnstile_store::{IdentityStore, StoreError};
use turnstile_tick::{TaskGroup, TickConfig};

use crate::{AdmissionConfig, AdmissionError};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// What one reaper pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Identities whose tickets went stale, in queue order.
    pub evicted: Vec<Identity>,
    /// Admitted identities dropped from the ledger after their retention.
    pub forgotten: usize,
}

/// What one drainer pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Identities admitted this pass, in FIFO order.
    pub admitted: Vec<Identity>,
    /// Identities dequeued this pass whose store write failed.
    ///
    /// Their tickets are gone; the client has to push again.
    pub failed: Vec<(Identity, StoreError)>,
}

impl DrainReport {
    /// Number of tickets taken off the queue this pass.
    pub fn dequeued(&self) -> usize {
        self.admitted.len() + self.failed.len()
    }
}

// ---------------------------------------------------------------------------
// AdmissionService
// ---------------------------------------------------------------------------

/// Everything guarded by the service's single lock.
///
/// The queue's own key index doubles as the membership set, so "is this
/// identity queued" can never disagree with the queue itself.
struct AdmissionState {
    queue: TicketQueue<Identity, LoginRequest>,
    /// Dequeued by the drainer, store write still pending.
    in_flight: HashSet<Identity>,
    /// Successfully admitted identities and when.
    admitted: HashMap<Identity, Instant>,
}

/// Position-aware, rate-limited login admission.
///
/// ## Ticket lifecycle
///
/// ```text
/// push_login() ──→ [Queued] ──drainer──→ [InFlight] ──store ok──→ [Admitted]
///                     │                       │                       │
///                  not polled             store error            retention
///                     ▼                       ▼                       ▼
///                 [evicted]               [dropped]              [forgotten]
/// ```
///
/// Every public method is synchronous and safe to call from any number
/// of request handlers at once. Only [`drain_once`](Self::drain_once)
/// awaits, and it never holds the lock across the store call.
pub struct AdmissionService<S> {
    config: AdmissionConfig,
    store: Arc<S>,
    state: Mutex<AdmissionState>,
}

impl<S: IdentityStore> AdmissionService<S> {
    /// Creates a service with an empty queue. No loops run until
    /// [`start`](Self::start) is called.
    pub fn new(config: AdmissionConfig, store: Arc<S>) -> Self {
        Self {
            config: config.validated(),
            store,
            state: Mutex::new(AdmissionState {
                queue: TicketQueue::new(),
                in_flight: HashSet::new(),
                admitted: HashMap::new(),
            }),
        }
    }

    /// The effective (validated) configuration.
    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Queues a login request and returns the ticket id.
    ///
    /// The ticket id is the identity itself; poll it with
    /// [`status`](Self::status).
    ///
    /// # Errors
    /// - [`AdmissionError::AlreadyQueued`] if the identity holds a ticket.
    /// - [`AdmissionError::InFlight`] if it is being admitted right now.
    pub fn push_login(&self, request: LoginRequest) -> Result<Identity, AdmissionError> {
        let identity = request.identity.clone();

        let mut state = self.state.lock();
        if state.in_flight.contains(&identity) {
            return Err(AdmissionError::InFlight(identity));
        }
        let position = match state.queue.push(identity.clone(), request) {
            Ok(position) => position,
            Err(QueueError::DuplicateKey) => {
                return Err(AdmissionError::AlreadyQueued(identity));
            }
        };
        // A fresh ticket supersedes any earlier admission.
        state.admitted.remove(&identity);
        let total = state.queue.len();
        drop(state);

        info!(%identity, position, total, "login queued");
        Ok(identity)
    }

    /// Returns `true` if the identity holds a ticket in the queue.
    pub fn is_queued(&self, identity: &Identity) -> bool {
        self.state.lock().queue.contains(identity)
    }

    /// Reports where `identity` stands.
    ///
    /// Polling a queued identity is also its liveness signal: it refreshes
    /// the ticket so the reaper leaves it alone.
    pub fn status(&self, identity: &Identity) -> LoginStatus {
        let mut state = self.state.lock();
        let total = state.queue.len();

        if let Some(position) = state.queue.position(identity) {
            LoginStatus::waiting(position, total)
        } else if state.in_flight.contains(identity) {
            LoginStatus::waiting(0, total)
        } else if state.admitted.contains_key(identity) {
            LoginStatus::logged(total)
        } else {
            LoginStatus::unknown(total)
        }
    }

    /// Number of tickets waiting.
    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Queued identities in the order they will be admitted.
    pub fn queued_identities(&self) -> Vec<Identity> {
        self.state.lock().queue.keys()
    }

    /// Number of identities in the admitted ledger.
    pub fn admitted_len(&self) -> usize {
        self.state.lock().admitted.len()
    }

    /// Spends the identity's admission. An admission is good for one
    /// entry: once spent, status reports `Unknown` again and the identity
    /// has to queue for another.
    ///
    /// Returns `false` if the identity wasn't admitted.
    pub fn consume_admission(&self, identity: &Identity) -> bool {
        let consumed = self.state.lock().admitted.remove(identity).is_some();
        if consumed {
            debug!(%identity, "admission consumed");
        }
        consumed
    }

    // -----------------------------------------------------------------------
    // Background iterations
    // -----------------------------------------------------------------------

    /// One reaper pass: evict stale tickets and prune the admitted ledger.
    pub fn reap_once(&self) -> ReapReport {
        let timeout = self.config.eviction_timeout();
        let retention = self.config.admitted_retention();
        let now = Instant::now();
        let mut evicted = Vec::new();

        let mut state = self.state.lock();
        state.queue.evict_stale(timeout, |identity| evicted.push(identity));
        let before = state.admitted.len();
        state
            .admitted
            .retain(|_, at| now.saturating_duration_since(*at) <= retention);
        let forgotten = before - state.admitted.len();
        let remaining = state.queue.len();
        drop(state);

        for identity in &evicted {
            info!(%identity, "ticket evicted, status not polled in time");
        }
        if !evicted.is_empty() || forgotten > 0 {
            debug!(evicted = evicted.len(), forgotten, remaining, "reaper pass");
        }

        ReapReport { evicted, forgotten }
    }

    /// One drainer pass: admit up to `prefetch` tickets in FIFO order.
    ///
    /// Each ticket is persisted on its own. A store failure drops that
    /// ticket, is logged, and the pass moves on to the next one.
    pub async fn drain_once(&self) -> DrainReport {
        let mut report = DrainReport::default();

        for _ in 0..self.config.prefetch {
            let ticket = {
                let mut state = self.state.lock();
                let Some(ticket) = state.queue.dequeue() else {
                    break;
                };
                state.in_flight.insert(ticket.key.clone());
                ticket
            };

            let identity = ticket.key;
            let waited_ms = ticket.enqueued_at.elapsed().as_millis() as u64;

            match self.persist_login(&ticket.payload).await {
                Ok(()) => {
                    let mut state = self.state.lock();
                    state.in_flight.remove(&identity);
                    state.admitted.insert(identity.clone(), Instant::now());
                    drop(state);

                    info!(%identity, waited_ms, "login admitted");
                    report.admitted.push(identity);
                }
                Err(e) => {
                    self.state.lock().in_flight.remove(&identity);
                    error!(%identity, error = %e, "failed to admit login");
                    report.failed.push((identity, e));
                }
            }
        }

        report
    }

    /// Loads or creates the identity's record and marks it logged.
    async fn persist_login(&self, request: &LoginRequest) -> Result<(), StoreError> {
        match self.store.find_by_identity(&request.identity).await? {
            None => {
                let id = self
                    .store
                    .create(IdentityRecord::first_login(request))
                    .await?;
                debug!(identity = %request.identity, %id, "first login, record created");
            }
            Some(mut record) => {
                let Some(id) = record.id else {
                    return Err(StoreError::Backend(format!(
                        "record for {} has no id",
                        request.identity
                    )));
                };
                record.logged = true;
                if !self.store.update(id, record).await? {
                    return Err(StoreError::Backend(format!(
                        "record {id} disappeared during update"
                    )));
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Loops
    // -----------------------------------------------------------------------

    /// Spawns the reaper and drainer loops.
    ///
    /// They run until the returned group is shut down or dropped.
    pub fn start(self: &Arc<Self>) -> TaskGroup {
        let mut group = TaskGroup::new();

        let service = Arc::clone(self);
        group.spawn_periodic(
            "reaper",
            TickConfig::with_interval(self.config.reaper_interval()),
            move || {
                let service = Arc::clone(&service);
                async move {
                    service.reap_once();
                    Ok::<_, Infallible>(())
                }
            },
        );

        let service = Arc::clone(self);
        group.spawn_periodic(
            "drainer",
            TickConfig::with_interval(self.config.drain_interval()),
            move || {
                let service = Arc::clone(&service);
                async move {
                    service.drain_once().await;
                    Ok::<_, Infallible>(())
                }
            },
        );

        info!(
            prefetch = self.config.prefetch,
            drain_interval_ms = self.config.drain_interval_ms,
            eviction_timeout_ms = self.config.eviction_timeout_ms,
            "admission loops started"
        );
        group
    }
}
