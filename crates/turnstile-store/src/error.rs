//! Error types for identity persistence.

use turnstile_protocol::Identity;

/// Errors an [`IdentityStore`](crate::IdentityStore) can report.
///
/// Callers in the background loops never propagate these past one
/// iteration: they log and try again on the next tick.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A record for this identity already exists.
    #[error("a record for identity {0} already exists")]
    Conflict(Identity),

    /// Any other backend failure.
    #[error("store backend error: {0}")]
    Backend(String),
}
