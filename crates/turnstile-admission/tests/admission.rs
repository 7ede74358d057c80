//! End-to-end tests for the admission service and its background loops.
//!
//! Time is paused: `sleep` auto-advances the clock to the next timer, so
//! loop ticks fire deterministically.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};
use tokio::time::sleep;
use turnstile_admission::{AdmissionConfig, AdmissionError, AdmissionService};
use turnstile_protocol::{
    Identity, IdentityRecord, LoginRequest, LoginState, LoginStatus, RecordId,
};
use turnstile_store::{IdentityStore, MemoryIdentityStore, StoreError};

fn id(raw: &str) -> Identity {
    Identity::new(raw).unwrap()
}

fn request(raw: &str) -> LoginRequest {
    LoginRequest::new(id(raw), format!("sig-{raw}"))
}

fn config(prefetch: usize, drain_interval_ms: u64) -> AdmissionConfig {
    AdmissionConfig {
        prefetch,
        drain_interval_ms,
        ..Default::default()
    }
}

// ===========================================================================
// Drainer
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn test_drainer_loop_admits_prefetch_per_interval() {
    let store = Arc::new(MemoryIdentityStore::new());
    let svc = Arc::new(AdmissionService::new(config(2, 1_000), Arc::clone(&store)));
    for name in ["a", "b", "c"] {
        svc.push_login(request(name)).unwrap();
    }
    let group = svc.start();

    sleep(Duration::from_millis(1_100)).await;

    assert!(svc.status(&id("a")).is_logged());
    assert!(svc.status(&id("b")).is_logged());
    assert_eq!(svc.status(&id("c")), LoginStatus::waiting(0, 1));
    assert_eq!(store.logged_state(&id("a")).await, Some(true));

    sleep(Duration::from_millis(1_000)).await;

    assert!(svc.status(&id("c")).is_logged());
    assert_eq!(svc.queue_len(), 0);
    assert_eq!(store.len().await, 3);

    group.shutdown().await;
}

#[tokio::test]
async fn test_drain_once_creates_record_with_signature() {
    let store = Arc::new(MemoryIdentityStore::new());
    let svc = AdmissionService::new(config(1, 1_000), Arc::clone(&store));
    svc.push_login(request("a")).unwrap();

    svc.drain_once().await;

    let record = store.find_by_identity(&id("a")).await.unwrap().unwrap();
    assert_eq!(record.id, Some(RecordId(1)));
    assert_eq!(record.signature.as_deref(), Some("sig-a"));
    assert!(record.logged);
}

#[tokio::test]
async fn test_drain_once_existing_record_is_marked_logged_not_duplicated() {
    let store = Arc::new(MemoryIdentityStore::new());
    store
        .create(IdentityRecord {
            id: None,
            identity: id("a"),
            signature: Some("old".into()),
            logged: false,
        })
        .await
        .unwrap();
    let svc = AdmissionService::new(config(1, 1_000), Arc::clone(&store));
    svc.push_login(request("a")).unwrap();

    let report = svc.drain_once().await;

    assert_eq!(report.admitted, vec![id("a")]);
    assert_eq!(store.len().await, 1);
    let record = store.find_by_identity(&id("a")).await.unwrap().unwrap();
    assert!(record.logged);
    assert_eq!(record.signature.as_deref(), Some("old"));
}

#[tokio::test]
async fn test_drain_once_store_failure_drops_ticket_and_continues() {
    let store = Arc::new(MemoryIdentityStore::new());
    let svc = AdmissionService::new(config(3, 1_000), Arc::clone(&store));
    svc.push_login(request("a")).unwrap();
    svc.push_login(request("b")).unwrap();
    store.set_fail_writes(true);

    let report = svc.drain_once().await;

    assert!(report.admitted.is_empty());
    assert_eq!(report.failed.len(), 2);
    assert!(matches!(report.failed[0], (ref i, StoreError::Unavailable(_)) if *i == id("a")));
    assert_eq!(svc.status(&id("a")).state, LoginState::Unknown);
    assert!(store.is_empty().await);

    // The client pushes again once the store is back.
    store.set_fail_writes(false);
    svc.push_login(request("a")).unwrap();
    let report = svc.drain_once().await;
    assert_eq!(report.admitted, vec![id("a")]);
}

#[tokio::test(start_paused = true)]
async fn test_drainer_loop_survives_store_outage() {
    let store = Arc::new(MemoryIdentityStore::new());
    let svc = Arc::new(AdmissionService::new(config(1, 1_000), Arc::clone(&store)));
    svc.push_login(request("a")).unwrap();
    svc.push_login(request("b")).unwrap();
    store.set_fail_writes(true);
    let group = svc.start();

    sleep(Duration::from_millis(1_100)).await;
    assert_eq!(svc.status(&id("a")).state, LoginState::Unknown);

    store.set_fail_writes(false);
    sleep(Duration::from_millis(1_000)).await;
    assert!(svc.status(&id("b")).is_logged());

    group.shutdown().await;
}

// ===========================================================================
// In-flight window
// ===========================================================================

/// Store whose lookups block until the test hands out a permit.
struct GatedStore {
    inner: MemoryIdentityStore,
    gate: Semaphore,
    entered: Notify,
}

impl GatedStore {
    fn new() -> Self {
        Self {
            inner: MemoryIdentityStore::new(),
            gate: Semaphore::new(0),
            entered: Notify::new(),
        }
    }
}

impl IdentityStore for GatedStore {
    async fn find_by_identity(
        &self,
        identity: &Identity,
    ) -> Result<Option<IdentityRecord>, StoreError> {
        self.entered.notify_one();
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        self.inner.find_by_identity(identity).await
    }

    async fn create(&self, record: IdentityRecord) -> Result<RecordId, StoreError> {
        self.inner.create(record).await
    }

    async fn update(&self, id: RecordId, record: IdentityRecord) -> Result<bool, StoreError> {
        self.inner.update(id, record).await
    }

    async fn find_all_by_logged_state(
        &self,
        logged: bool,
    ) -> Result<Vec<IdentityRecord>, StoreError> {
        self.inner.find_all_by_logged_state(logged).await
    }

    async fn bulk_set_logged_state(
        &self,
        identities: &[Identity],
        logged: bool,
    ) -> Result<bool, StoreError> {
        self.inner.bulk_set_logged_state(identities, logged).await
    }
}

#[tokio::test]
async fn test_in_flight_identity_waits_at_front_and_rejects_push() {
    let store = Arc::new(GatedStore::new());
    let svc = Arc::new(AdmissionService::new(config(1, 1_000), Arc::clone(&store)));
    svc.push_login(request("a")).unwrap();
    svc.push_login(request("b")).unwrap();

    let drainer = tokio::spawn({
        let svc = Arc::clone(&svc);
        async move { svc.drain_once().await }
    });
    store.entered.notified().await;

    assert_eq!(svc.status(&id("a")), LoginStatus::waiting(0, 1));
    assert!(!svc.is_queued(&id("a")));
    assert_eq!(
        svc.push_login(request("a")),
        Err(AdmissionError::InFlight(id("a")))
    );

    store.gate.add_permits(1);
    let report = drainer.await.unwrap();

    assert_eq!(report.admitted, vec![id("a")]);
    assert!(svc.status(&id("a")).is_logged());
}

// ===========================================================================
// Reaper
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn test_reaper_loop_evicts_ticket_that_stops_polling() {
    let store = Arc::new(MemoryIdentityStore::new());
    let svc = Arc::new(AdmissionService::new(config(1, 600_000), store));
    svc.push_login(request("silent")).unwrap();
    svc.push_login(request("polling")).unwrap();
    let group = svc.start();

    for _ in 0..12 {
        sleep(Duration::from_secs(1)).await;
        svc.status(&id("polling"));
    }

    assert!(!svc.is_queued(&id("silent")));
    assert_eq!(svc.status(&id("silent")).state, LoginState::Unknown);
    assert_eq!(svc.status(&id("polling")), LoginStatus::waiting(0, 1));

    group.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_eviction_moves_later_tickets_up_by_one() {
    let store = Arc::new(MemoryIdentityStore::new());
    let svc = AdmissionService::new(config(1, 1_000), store);
    for name in ["a", "b", "c", "d"] {
        svc.push_login(request(name)).unwrap();
    }

    sleep(Duration::from_secs(6)).await;
    for name in ["a", "c", "d"] {
        svc.status(&id(name));
    }
    sleep(Duration::from_secs(5)).await;

    let report = svc.reap_once();

    assert_eq!(report.evicted, vec![id("b")]);
    assert_eq!(svc.status(&id("a")), LoginStatus::waiting(0, 3));
    assert_eq!(svc.status(&id("c")), LoginStatus::waiting(1, 3));
    assert_eq!(svc.status(&id("d")), LoginStatus::waiting(2, 3));
}

// ===========================================================================
// Shutdown
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_both_loops() {
    let store = Arc::new(MemoryIdentityStore::new());
    let svc = Arc::new(AdmissionService::new(config(5, 1_000), Arc::clone(&store)));
    let group = svc.start();
    assert_eq!(group.len(), 2);

    group.shutdown().await;
    svc.push_login(request("a")).unwrap();
    sleep(Duration::from_secs(30)).await;

    assert!(svc.is_queued(&id("a")));
    assert!(store.is_empty().await);
}
