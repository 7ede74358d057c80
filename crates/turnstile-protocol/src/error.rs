//! Error types for the protocol layer.

/// Errors raised while building protocol values from untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// An identity was empty (or only whitespace).
    #[error("identity must not be empty")]
    EmptyIdentity,
}
