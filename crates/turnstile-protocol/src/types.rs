//! Value types shared by every Turnstile layer.
//!
//! Nothing here knows about queues, timers, or storage. These are the
//! nouns the rest of the workspace talks in: who is asking to log in
//! ([`Identity`], [`LoginRequest`]), what the caller is told while they
//! wait ([`LoginStatus`]), and what the identity store persists
//! ([`IdentityRecord`]).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The identity of a client asking to enter the service.
///
/// In practice this is the client's public key, already verified by the
/// boundary layer before it reaches us. It doubles as the ticket id
/// handed back from a login push, so the caller only ever has to
/// remember one string.
///
/// A newtype around `String` keeps identities from being mixed up with
/// signatures or record ids in function signatures. `#[serde(transparent)]`
/// serializes it as the bare string.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Builds an identity, trimming surrounding whitespace.
    ///
    /// # Errors
    /// Returns [`ProtocolError::EmptyIdentity`] if nothing is left after
    /// trimming.
    pub fn new(raw: impl Into<String>) -> Result<Self, ProtocolError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ProtocolError::EmptyIdentity);
        }
        if trimmed.len() == raw.len() {
            Ok(Self(raw))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    /// Borrows the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the identity and returns the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identity {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The identifier an identity store assigns to a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rec-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// LoginRequest
// ---------------------------------------------------------------------------

/// A login request waiting in the admission queue.
///
/// The signature is carried through untouched so the drainer can store it
/// on the identity record it creates. Verifying it is the boundary
/// layer's job and happens before the request is ever pushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Who is asking to log in.
    pub identity: Identity,
    /// The signature the client authenticated with.
    pub signature: String,
}

impl LoginRequest {
    /// Convenience constructor.
    pub fn new(identity: Identity, signature: impl Into<String>) -> Self {
        Self {
            identity,
            signature: signature.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// LoginStatus
// ---------------------------------------------------------------------------

/// Where a ticket stands from the caller's point of view.
///
/// ```text
///   push ──→ Waiting ──(drained + persisted)──→ Logged
///               │
///               └──(not polled in time)──→ Unknown
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum LoginState {
    /// Still queued (or being admitted right now).
    Waiting,
    /// Admitted: the identity's record is marked logged.
    Logged,
    /// Never pushed, evicted, or admitted so long ago it was forgotten.
    Unknown,
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "Waiting"),
            Self::Logged => write!(f, "Logged"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Answer to a status poll.
///
/// `position` is the number of tickets ahead of this one. It is `None`
/// whenever the identity is not in the queue, which is the only case
/// where a caller cannot count on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginStatus {
    /// Coarse state of the ticket.
    pub state: LoginState,
    /// Tickets still ahead of this one, when waiting.
    pub position: Option<usize>,
    /// Current queue length.
    pub total: usize,
}

impl LoginStatus {
    /// A ticket that is still waiting at `position` in a queue of `total`.
    pub fn waiting(position: usize, total: usize) -> Self {
        Self {
            state: LoginState::Waiting,
            position: Some(position),
            total,
        }
    }

    /// A ticket that has been admitted.
    pub fn logged(total: usize) -> Self {
        Self {
            state: LoginState::Logged,
            position: None,
            total,
        }
    }

    /// A ticket the service knows nothing about.
    pub fn unknown(total: usize) -> Self {
        Self {
            state: LoginState::Unknown,
            position: None,
            total,
        }
    }

    /// Returns `true` once the identity has been admitted.
    pub fn is_logged(&self) -> bool {
        matches!(self.state, LoginState::Logged)
    }
}

// ---------------------------------------------------------------------------
// IdentityRecord
// ---------------------------------------------------------------------------

/// The persisted, account-like record behind an identity.
///
/// Only the fields this subsystem reads or writes are modelled. `id` is
/// `None` until the store has assigned one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Store-assigned id.
    pub id: Option<RecordId>,
    /// The identity this record belongs to.
    pub identity: Identity,
    /// Signature captured at first login.
    pub signature: Option<String>,
    /// Whether the identity is currently considered logged in.
    pub logged: bool,
}

impl IdentityRecord {
    /// A fresh, unsaved record for a first-time login.
    pub fn first_login(request: &LoginRequest) -> Self {
        Self {
            id: None,
            identity: request.identity.clone(),
            signature: Some(request.signature.clone()),
            logged: true,
        }
    }
}
