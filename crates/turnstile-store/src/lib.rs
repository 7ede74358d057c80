//! Identity persistence for Turnstile.
//!
//! [`IdentityStore`] is the seam between Turnstile's in-memory admission
//! and presence state and whatever database owns your accounts.
//! [`MemoryIdentityStore`] is a ready-made implementation for tests,
//! demos and single-node deployments.

#![allow(async_fn_in_trait)]

mod error;
mod memory;
mod store;

pub use error::StoreError;
pub use memory::MemoryIdentityStore;
pub use store::IdentityStore;
