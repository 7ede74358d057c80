//! In-memory identity store for single-node setups, tests and demos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::debug;
use turnstile_protocol::{Identity, IdentityRecord, RecordId};

use crate::{IdentityStore, StoreError};

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<RecordId, IdentityRecord>,
    by_identity: HashMap<Identity, RecordId>,
    next_id: u64,
}

/// An [`IdentityStore`] backed by two hash maps behind a Tokio mutex.
///
/// Writes and reads can be made to fail on demand with
/// [`set_fail_writes`](Self::set_fail_writes) /
/// [`set_fail_reads`](Self::set_fail_reads), which is how the loops'
/// error paths get exercised.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    inner: Mutex<Inner>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    bulk_writes: AtomicU64,
}

impl MemoryIdentityStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with [`StoreError::Unavailable`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent read fail with [`StoreError::Unavailable`].
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// How many successful `bulk_set_logged_state` calls were made.
    pub fn bulk_write_count(&self) -> u64 {
        self.bulk_writes.load(Ordering::SeqCst)
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    /// Returns `true` if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.records.is_empty()
    }

    /// The logged flag for `identity`, or `None` if it has no record.
    pub async fn logged_state(&self, identity: &Identity) -> Option<bool> {
        let inner = self.inner.lock().await;
        let id = inner.by_identity.get(identity)?;
        inner.records.get(id).map(|r| r.logged)
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("reads disabled".into()));
        }
        Ok(())
    }

    fn check_writes(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".into()));
        }
        Ok(())
    }
}

impl IdentityStore for MemoryIdentityStore {
    async fn find_by_identity(
        &self,
        identity: &Identity,
    ) -> Result<Option<IdentityRecord>, StoreError> {
        self.check_reads()?;
        let inner = self.inner.lock().await;
        Ok(inner
            .by_identity
            .get(identity)
            .and_then(|id| inner.records.get(id))
            .cloned())
    }

    async fn create(&self, mut record: IdentityRecord) -> Result<RecordId, StoreError> {
        self.check_writes()?;
        let mut inner = self.inner.lock().await;
        if inner.by_identity.contains_key(&record.identity) {
            return Err(StoreError::Conflict(record.identity));
        }

        inner.next_id += 1;
        let id = RecordId(inner.next_id);
        record.id = Some(id);
        inner.by_identity.insert(record.identity.clone(), id);
        inner.records.insert(id, record);

        debug!(%id, "record created");
        Ok(id)
    }

    async fn update(&self, id: RecordId, mut record: IdentityRecord) -> Result<bool, StoreError> {
        self.check_writes()?;
        let mut inner = self.inner.lock().await;
        let Some(existing) = inner.records.get(&id) else {
            return Ok(false);
        };
        if existing.identity != record.identity {
            return Err(StoreError::Backend(format!(
                "record {id} belongs to a different identity"
            )));
        }

        record.id = Some(id);
        inner.records.insert(id, record);
        Ok(true)
    }

    async fn find_all_by_logged_state(
        &self,
        logged: bool,
    ) -> Result<Vec<IdentityRecord>, StoreError> {
        self.check_reads()?;
        let inner = self.inner.lock().await;
        Ok(inner
            .records
            .values()
            .filter(|r| r.logged == logged)
            .cloned()
            .collect())
    }

    async fn bulk_set_logged_state(
        &self,
        identities: &[Identity],
        logged: bool,
    ) -> Result<bool, StoreError> {
        self.check_writes()?;
        let mut inner = self.inner.lock().await;
        let mut changed = false;

        for identity in identities {
            let Some(id) = inner.by_identity.get(identity).copied() else {
                continue;
            };
            if let Some(record) = inner.records.get_mut(&id) {
                record.logged = logged;
                changed = true;
            }
        }

        self.bulk_writes.fetch_add(1, Ordering::SeqCst);
        Ok(changed)
    }
}
