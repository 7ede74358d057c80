//! Presence tracking for Turnstile.
//!
//! Once admitted, a client proves it is still there by heartbeating. The
//! [`PresenceTracker`] keeps the live set in memory, caps how many
//! identities may be connected at once, and runs an analyzer loop that:
//!
//! 1. picks up identities marked logged in the store by someone else,
//! 2. expires identities that stopped heartbeating, and
//! 3. writes those expiries back to the store in one bulk update.
//!
//! # How it fits in the stack
//!
//! ```text
//! Facade (turnstile)       ← checks capacity before letting anyone in
//!     ↕
//! Presence (this crate)    ← live set, heartbeats, analyzer
//!     ↕
//! Store / Tick             ← persisted logged-state, scheduling
//! ```

mod config;
mod error;
mod tracker;

pub use config::PresenceConfig;
pub use error::PresenceError;
pub use tracker::{AnalyzeReport, PresenceRecord, PresenceTracker};
