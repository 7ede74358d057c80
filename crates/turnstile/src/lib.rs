//! # Turnstile
//!
//! Login queueing, rate-limited admission and presence tracking for
//! services that can only hold so many clients at once.
//!
//! Clients ask to log in and get a place in a fair FIFO queue. They poll
//! their position (which keeps the ticket alive), get admitted a bounded
//! number per interval, then heartbeat while inside. Clients that go
//! quiet are dropped and their logged-state is written back to your
//! [`IdentityStore`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use turnstile::prelude::*;
//!
//! # async fn run() -> Result<(), TurnstileError> {
//! let gate = TurnstileBuilder::new()
//!     .config(TurnstileConfig::from_json(r#"{ "admission": { "prefetch": 5 } }"#)?)
//!     .build(Arc::new(MemoryIdentityStore::new()))
//!     .await;
//!
//! let me = Identity::new("0xabc")?;
//! gate.request_login(LoginRequest::new(me.clone(), "signature"))?;
//!
//! // Poll until admitted, then:
//! // gate.enter(&me)?;
//! // gate.heartbeat(&me)?;
//! # gate.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod gate;

pub use config::TurnstileConfig;
pub use error::{ConfigError, TurnstileError};
pub use gate::{Turnstile, TurnstileBuilder};

/// Convenient re-exports for the common case.
pub mod prelude {
    pub use crate::{ConfigError, Turnstile, TurnstileBuilder, TurnstileConfig, TurnstileError};
    pub use turnstile_admission::{AdmissionConfig, AdmissionError};
    pub use turnstile_presence::{PresenceConfig, PresenceError};
    pub use turnstile_protocol::{
        Identity, IdentityRecord, LoginRequest, LoginState, LoginStatus, RecordId,
    };
    pub use turnstile_store::{IdentityStore, MemoryIdentityStore, StoreError};
}
