//! Shared value types for Turnstile.
//!
//! Every other crate in the workspace speaks in these types:
//!
//! - [`Identity`] / [`RecordId`]: who is being admitted, and the id their
//!   persisted record carries.
//! - [`LoginRequest`]: the payload a ticket carries through the queue.
//! - [`LoginStatus`] / [`LoginState`]: what a polling caller is told.
//! - [`IdentityRecord`]: the account-like record the identity store keeps.
//!
//! ```text
//! Facade (turnstile) → Admission / Presence → Queue, Store → Protocol (this crate)
//! ```

mod error;
mod types;

pub use error::ProtocolError;
pub use types::{
    Identity, IdentityRecord, LoginRequest, LoginState, LoginStatus, RecordId,
};
