//! The identity store hook: where logged-state is persisted.
//!
//! Turnstile doesn't own durable storage. Admission writes "this identity
//! is logged" through the [`IdentityStore`] trait, and presence reads the
//! logged set back (and clears it for silent clients) through the same
//! trait. Back it with whatever database holds your accounts.

use std::future::Future;

use turnstile_protocol::{Identity, IdentityRecord, RecordId};

use crate::StoreError;

/// Persistence for account-like identity records.
///
/// # Trait bounds
///
/// - `Send + Sync` → one store is shared by every background loop and
///   request handler.
/// - `'static` → it lives as long as the services holding it.
///
/// None of these calls are transactional with Turnstile's in-memory
/// state. A failed write is logged by the caller and retried on its next
/// scheduled iteration.
pub trait IdentityStore: Send + Sync + 'static {
    /// Looks up the record for `identity`, if one exists.
    fn find_by_identity(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Result<Option<IdentityRecord>, StoreError>> + Send;

    /// Persists a new record and returns the id assigned to it.
    ///
    /// # Errors
    /// [`StoreError::Conflict`] if a record for the identity already
    /// exists, or a backend error.
    fn create(
        &self,
        record: IdentityRecord,
    ) -> impl Future<Output = Result<RecordId, StoreError>> + Send;

    /// Replaces the record stored under `id`.
    ///
    /// Returns `Ok(false)` if there is no such record.
    fn update(
        &self,
        id: RecordId,
        record: IdentityRecord,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Every record whose logged flag equals `logged`.
    fn find_all_by_logged_state(
        &self,
        logged: bool,
    ) -> impl Future<Output = Result<Vec<IdentityRecord>, StoreError>> + Send;

    /// Sets the logged flag of every listed identity in one write.
    ///
    /// Returns `Ok(true)` if at least one record was changed. Unknown
    /// identities are skipped.
    fn bulk_set_logged_state(
        &self,
        identities: &[Identity],
        logged: bool,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;
}
