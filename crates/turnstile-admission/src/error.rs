//! Error types for the admission layer.

use turnstile_protocol::Identity;

/// Why a login request was turned away.
///
/// A rejected push has no side effects: the existing ticket keeps its
/// place and its liveness timestamp.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    /// The identity already holds a ticket in the queue.
    #[error("identity {0} is already queued")]
    AlreadyQueued(Identity),

    /// The identity was just dequeued and is being admitted right now.
    #[error("identity {0} is being admitted")]
    InFlight(Identity),
}
