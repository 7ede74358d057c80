//! Login admission for Turnstile.
//!
//! Callers push login requests into an [`AdmissionService`] and poll for
//! their status. Two background loops do the rest:
//!
//! - the **reaper** evicts tickets whose owners stopped polling, and
//! - the **drainer** admits up to `prefetch` tickets per interval, in
//!   FIFO order, marking each identity logged in the
//!   [`IdentityStore`](turnstile_store::IdentityStore).
//!
//! # How it fits in the stack
//!
//! ```text
//! Facade (turnstile)       ← gates entry on admission + presence
//!     ↕
//! Admission (this crate)   ← queue, membership, reaper, drainer
//!     ↕
//! Queue / Store / Tick     ← ordering, persistence, scheduling
//! ```

mod config;
mod error;
mod service;

pub use config::AdmissionConfig;
pub use error::AdmissionError;
pub use service::{AdmissionService, DrainReport, ReapReport};
