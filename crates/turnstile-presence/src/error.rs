//! Error types for the presence layer.

use turnstile_protocol::Identity;
use turnstile_store::StoreError;

/// Errors that can occur while tracking presence.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PresenceError {
    /// The identity is already connected. One session per identity.
    #[error("identity {0} is already connected")]
    AlreadyConnected(Identity),

    /// The identity isn't in the live set.
    #[error("identity {0} is not connected")]
    NotConnected(Identity),

    /// The occupancy cap is reached.
    #[error("server is at capacity ({max} identities connected)")]
    AtCapacity {
        /// The configured cap.
        max: usize,
    },

    /// The identity store failed during seeding or analysis.
    #[error(transparent)]
    Store(#[from] StoreError),
}
