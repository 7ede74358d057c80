//! Unified error type for Turnstile.

use std::path::PathBuf;

use turnstile_admission::AdmissionError;
use turnstile_presence::PresenceError;
use turnstile_protocol::{Identity, LoginState, ProtocolError};
use turnstile_store::StoreError;

/// Top-level error that wraps all crate-specific errors.
///
/// Every caller-facing denial (duplicate push, already connected, at
/// capacity, not admitted yet) comes back as a variant here, never as a
/// panic. Translating them into transport responses is up to the caller.
#[derive(Debug, thiserror::Error)]
pub enum TurnstileError {
    /// An identity or request failed validation.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The identity store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A login request was turned away (already queued / in flight).
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    /// The presence tracker denied an entry or a heartbeat.
    #[error(transparent)]
    Presence(#[from] PresenceError),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The identity tried to enter before its login was admitted.
    #[error("identity {identity} has not been admitted (status: {state})")]
    NotAdmitted {
        identity: Identity,
        state: LoginState,
    },
}

/// Errors loading a [`TurnstileConfig`](crate::TurnstileConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The JSON was malformed or had unknown fields.
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_admission_error() {
        let err = AdmissionError::AlreadyQueued(Identity::new("a").unwrap());
        let turnstile_err: TurnstileError = err.into();
        assert!(matches!(turnstile_err, TurnstileError::Admission(_)));
        assert!(turnstile_err.to_string().contains("already queued"));
    }

    #[test]
    fn test_from_presence_error() {
        let err = PresenceError::AtCapacity { max: 3 };
        let turnstile_err: TurnstileError = err.into();
        assert!(matches!(turnstile_err, TurnstileError::Presence(_)));
        assert!(turnstile_err.to_string().contains('3'));
    }

    #[test]
    fn test_from_protocol_error() {
        let turnstile_err: TurnstileError = ProtocolError::EmptyIdentity.into();
        assert!(matches!(turnstile_err, TurnstileError::Protocol(_)));
    }

    #[test]
    fn test_from_store_error() {
        let turnstile_err: TurnstileError = StoreError::Unavailable("down".into()).into();
        assert!(matches!(turnstile_err, TurnstileError::Store(_)));
        assert!(turnstile_err.to_string().contains("down"));
    }

    #[test]
    fn test_not_admitted_display() {
        let err = TurnstileError::NotAdmitted {
            identity: Identity::new("a").unwrap(),
            state: LoginState::Waiting,
        };
        assert_eq!(err.to_string(), "identity a has not been admitted (status: Waiting)");
    }
}
