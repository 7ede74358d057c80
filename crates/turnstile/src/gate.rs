//! `Turnstile` builder and entry gate.
//!
//! This is the entry point for request handlers. It ties the layers
//! together: admission decides *when* an identity may log in, presence
//! decides *whether* there is room for it once it does.

use std::sync::Arc;

use turnstile_admission::{AdmissionConfig, AdmissionService};
use turnstile_presence::{PresenceConfig, PresenceError, PresenceTracker};
use turnstile_protocol::{Identity, LoginRequest, LoginState, LoginStatus};
use turnstile_store::IdentityStore;
use turnstile_tick::TaskGroup;

use crate::{TurnstileConfig, TurnstileError};

/// Builder for configuring and starting a [`Turnstile`].
///
/// # Example
///
/// ```rust,ignore
/// use turnstile::prelude::*;
///
/// let gate = TurnstileBuilder::new()
///     .config(TurnstileConfig::from_file("turnstile.json")?)
///     .build(Arc::new(MemoryIdentityStore::new()))
///     .await;
/// ```
#[derive(Debug, Clone)]
pub struct TurnstileBuilder {
    config: TurnstileConfig,
    start_loops: bool,
}

impl TurnstileBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: TurnstileConfig::default(),
            start_loops: true,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: TurnstileConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the admission configuration.
    pub fn admission(mut self, config: AdmissionConfig) -> Self {
        self.config.admission = config;
        self
    }

    /// Sets the presence configuration.
    pub fn presence(mut self, config: PresenceConfig) -> Self {
        self.config.presence = config;
        self
    }

    /// Whether [`build`](Self::build) spawns the background loops.
    ///
    /// Default: `true`. With `false` nothing runs on its own and the
    /// single-pass methods on [`Turnstile::admission`] and
    /// [`Turnstile::presence`] drive everything.
    pub fn start_loops(mut self, start: bool) -> Self {
        self.start_loops = start;
        self
    }

    /// Builds the gate around `store`.
    ///
    /// With loops enabled this seeds the presence set from the store and
    /// starts the reaper, drainer and analyzer.
    pub async fn build<S: IdentityStore>(self, store: Arc<S>) -> Turnstile<S> {
        let config = self.config.validated();
        let admission = Arc::new(AdmissionService::new(config.admission, Arc::clone(&store)));
        let presence = Arc::new(PresenceTracker::new(config.presence, store));

        let mut loops = Vec::new();
        if self.start_loops {
            loops.push(admission.start());
            loops.push(presence.start().await);
        }

        tracing::info!(
            max_concurrent = presence.max_capacity(),
            prefetch = admission.config().prefetch,
            loops = self.start_loops,
            "turnstile ready"
        );

        Turnstile {
            admission,
            presence,
            loops,
        }
    }
}

impl Default for TurnstileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Login queue and occupancy gate for one capacity-constrained service.
///
/// ## Client flow
///
/// ```text
/// request_login() ──→ login_status() … (poll) … Logged ──→ enter()
///                                                            │
///                               heartbeat() … (repeat) ◀─────┘
///                                                            │
///                                              disconnect() / timeout
/// ```
///
/// Every method is safe to call concurrently from request handlers.
pub struct Turnstile<S: IdentityStore> {
    admission: Arc<AdmissionService<S>>,
    presence: Arc<PresenceTracker<S>>,
    loops: Vec<TaskGroup>,
}

impl<S: IdentityStore> Turnstile<S> {
    /// Queues a login request and returns the ticket id.
    ///
    /// # Errors
    /// - [`PresenceError::AlreadyConnected`] if the identity is already
    ///   inside. One session per identity.
    /// - [`AdmissionError`](turnstile_admission::AdmissionError) if it
    ///   already holds a ticket.
    pub fn request_login(&self, request: LoginRequest) -> Result<Identity, TurnstileError> {
        if self.presence.is_connected(&request.identity) {
            return Err(PresenceError::AlreadyConnected(request.identity).into());
        }
        Ok(self.admission.push_login(request)?)
    }

    /// Where the identity's login stands. Also keeps its ticket alive.
    ///
    /// An identity that is inside reports `Logged`.
    pub fn login_status(&self, identity: &Identity) -> LoginStatus {
        let status = self.admission.status(identity);
        if status.state == LoginState::Unknown && self.presence.is_connected(identity) {
            return LoginStatus::logged(status.total);
        }
        status
    }

    /// Lets an admitted identity in, if there is room.
    ///
    /// A successful entry spends the admission: after a logout or a
    /// heartbeat timeout the identity has to queue again.
    ///
    /// Entering is idempotent for an identity that is already inside.
    /// Admission marks the identity logged in the store, and the presence
    /// analyzer picks up logged identities on its own, so it may already
    /// be live (and counted) by the time the client calls this. In that
    /// case the call just refreshes its heartbeat.
    ///
    /// # Errors
    /// - [`TurnstileError::NotAdmitted`] unless the login status is
    ///   `Logged`.
    /// - [`PresenceError::AtCapacity`] if there is no room.
    pub fn enter(&self, identity: &Identity) -> Result<(), TurnstileError> {
        let status = self.login_status(identity);
        if !status.is_logged() {
            return Err(TurnstileError::NotAdmitted {
                identity: identity.clone(),
                state: status.state,
            });
        }

        match self.presence.try_connect(identity) {
            Ok(()) => {}
            Err(PresenceError::AlreadyConnected(_)) => {
                self.presence.heartbeat(identity);
            }
            Err(e) => return Err(e.into()),
        }
        self.admission.consume_admission(identity);
        Ok(())
    }

    /// Records a heartbeat for an identity that is inside.
    ///
    /// # Errors
    /// [`PresenceError::NotConnected`] if it isn't. Heartbeats never let an
    /// identity in; that goes through [`enter`](Self::enter).
    pub fn heartbeat(&self, identity: &Identity) -> Result<(), TurnstileError> {
        Ok(self.presence.refresh(identity)?)
    }

    /// Logs the identity out: persists it as not logged and frees its slot.
    ///
    /// Returns `false` if it wasn't connected.
    pub async fn disconnect(&self, identity: &Identity) -> Result<bool, TurnstileError> {
        Ok(self.presence.log_out(identity).await?)
    }

    pub fn is_queued(&self, identity: &Identity) -> bool {
        self.admission.is_queued(identity)
    }

    pub fn is_connected(&self, identity: &Identity) -> bool {
        self.presence.is_connected(identity)
    }

    pub fn connected_count(&self) -> usize {
        self.presence.connected_count()
    }

    pub fn max_capacity(&self) -> usize {
        self.presence.max_capacity()
    }

    /// The admission service, for direct access to its single-pass methods.
    pub fn admission(&self) -> &Arc<AdmissionService<S>> {
        &self.admission
    }

    /// The presence tracker.
    pub fn presence(&self) -> &Arc<PresenceTracker<S>> {
        &self.presence
    }

    /// Stops every background loop and waits for them to exit.
    pub async fn shutdown(self) {
        for group in self.loops {
            group.shutdown().await;
        }
        tracing::info!("turnstile stopped");
    }
}
