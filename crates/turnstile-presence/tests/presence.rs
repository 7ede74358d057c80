//! Integration tests for presence tracking and the analyzer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};
use tokio::time::{advance, sleep};
use turnstile_presence::{PresenceConfig, PresenceError, PresenceTracker};
use turnstile_protocol::{Identity, IdentityRecord, RecordId};
use turnstile_store::{IdentityStore, MemoryIdentityStore, StoreError};

fn id(raw: &str) -> Identity {
    Identity::new(raw).unwrap()
}

fn config() -> PresenceConfig {
    PresenceConfig {
        analyzer_interval_ms: 1_000,
        heartbeat_timeout_secs: 10,
        max_concurrent_identities: 100,
    }
}

async fn logged_store(names: &[&str]) -> Arc<MemoryIdentityStore> {
    let store = Arc::new(MemoryIdentityStore::new());
    for name in names {
        store
            .create(IdentityRecord {
                id: None,
                identity: id(name),
                signature: None,
                logged: true,
            })
            .await
            .unwrap();
    }
    store
}

// ===========================================================================
// Capacity
// ===========================================================================

#[tokio::test]
async fn test_capacity_two_heartbeats_fill_a_cap_of_two() {
    let store = Arc::new(MemoryIdentityStore::new());
    let tracker = PresenceTracker::new(
        PresenceConfig {
            max_concurrent_identities: 2,
            ..config()
        },
        store,
    );

    tracker.heartbeat(&id("a"));
    tracker.heartbeat(&id("b"));

    assert_eq!(tracker.connected_count(), 2);
    assert_eq!(tracker.max_capacity(), 2);
    assert!(!tracker.has_capacity());
    assert_eq!(
        tracker.try_connect(&id("c")),
        Err(PresenceError::AtCapacity { max: 2 })
    );

    tracker.disconnect(&id("a"));
    assert_eq!(tracker.try_connect(&id("c")), Ok(()));
}

// ===========================================================================
// Analyzer
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn test_analyze_once_expires_silent_identities_with_one_write() {
    let store = logged_store(&["a", "b", "c"]).await;
    let tracker = PresenceTracker::new(config(), Arc::clone(&store));
    assert_eq!(tracker.seed().await.unwrap(), 3);

    advance(Duration::from_secs(6)).await;
    tracker.heartbeat(&id("a"));
    advance(Duration::from_secs(5)).await;

    let report = tracker.analyze_once().await.unwrap();

    assert_eq!(report.expired, vec![id("b"), id("c")]);
    assert_eq!(report.connected, 1);
    assert_eq!(tracker.connected_identities(), vec![id("a")]);
    assert_eq!(store.logged_state(&id("a")).await, Some(true));
    assert_eq!(store.logged_state(&id("b")).await, Some(false));
    assert_eq!(store.logged_state(&id("c")).await, Some(false));
    assert_eq!(store.bulk_write_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_analyze_once_nothing_stale_writes_nothing() {
    let store = logged_store(&["a"]).await;
    let tracker = PresenceTracker::new(config(), Arc::clone(&store));
    tracker.seed().await.unwrap();

    advance(Duration::from_secs(10)).await;
    let report = tracker.analyze_once().await.unwrap();

    assert!(report.expired.is_empty());
    assert_eq!(report.connected, 1);
    assert_eq!(store.bulk_write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_analyze_once_merges_out_of_band_logins() {
    let store = logged_store(&["a"]).await;
    let tracker = PresenceTracker::new(config(), Arc::clone(&store));
    tracker.seed().await.unwrap();

    store
        .create(IdentityRecord {
            id: None,
            identity: id("late"),
            signature: None,
            logged: true,
        })
        .await
        .unwrap();
    let report = tracker.analyze_once().await.unwrap();

    assert_eq!(report.merged, 1);
    assert!(tracker.is_connected(&id("late")));
}

#[tokio::test(start_paused = true)]
async fn test_analyze_once_store_failure_keeps_identities_for_retry() {
    let store = logged_store(&["a"]).await;
    let tracker = PresenceTracker::new(config(), Arc::clone(&store));
    tracker.seed().await.unwrap();
    advance(Duration::from_secs(11)).await;
    store.set_fail_writes(true);

    let result = tracker.analyze_once().await;

    assert!(matches!(
        result,
        Err(PresenceError::Store(StoreError::Unavailable(_)))
    ));
    assert!(tracker.is_connected(&id("a")));
    assert_eq!(store.logged_state(&id("a")).await, Some(true));

    store.set_fail_writes(false);
    let report = tracker.analyze_once().await.unwrap();
    assert_eq!(report.expired, vec![id("a")]);
    assert!(!tracker.is_connected(&id("a")));
}

#[tokio::test(start_paused = true)]
async fn test_expired_identity_is_not_merged_back() {
    let store = logged_store(&["a"]).await;
    let tracker = PresenceTracker::new(config(), Arc::clone(&store));
    tracker.seed().await.unwrap();
    advance(Duration::from_secs(11)).await;
    tracker.analyze_once().await.unwrap();

    let report = tracker.analyze_once().await.unwrap();

    assert_eq!(report.merged, 0);
    assert_eq!(tracker.connected_count(), 0);
}

#[tokio::test]
async fn test_log_out_persists_and_survives_next_merge() {
    let store = logged_store(&["a"]).await;
    let tracker = PresenceTracker::new(config(), Arc::clone(&store));
    tracker.seed().await.unwrap();

    assert!(tracker.log_out(&id("a")).await.unwrap());
    let report = tracker.analyze_once().await.unwrap();

    assert_eq!(report.merged, 0);
    assert!(!tracker.is_connected(&id("a")));
    assert_eq!(store.logged_state(&id("a")).await, Some(false));
}

#[tokio::test]
async fn test_log_out_store_failure_keeps_identity_live() {
    let store = logged_store(&["a"]).await;
    let tracker = PresenceTracker::new(config(), Arc::clone(&store));
    tracker.seed().await.unwrap();
    store.set_fail_writes(true);

    assert!(tracker.log_out(&id("a")).await.is_err());
    assert!(tracker.is_connected(&id("a")));
}

// ===========================================================================
// Analyzer loop
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn test_start_seeds_and_analyzer_loop_expires_silent_identities() {
    let store = logged_store(&["quiet", "chatty"]).await;
    let tracker = Arc::new(PresenceTracker::new(config(), Arc::clone(&store)));

    let group = tracker.start().await;
    assert_eq!(tracker.connected_count(), 2);

    for _ in 0..12 {
        sleep(Duration::from_secs(1)).await;
        tracker.heartbeat(&id("chatty"));
    }

    assert_eq!(tracker.connected_identities(), vec![id("chatty")]);
    assert_eq!(store.logged_state(&id("quiet")).await, Some(false));

    group.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_analyzer_loop_keeps_running_through_store_outage() {
    let store = logged_store(&["a"]).await;
    let tracker = Arc::new(PresenceTracker::new(config(), Arc::clone(&store)));
    let group = tracker.start().await;
    store.set_fail_reads(true);

    sleep(Duration::from_secs(15)).await;
    assert!(tracker.is_connected(&id("a")));

    store.set_fail_reads(false);
    sleep(Duration::from_secs(2)).await;
    assert!(!tracker.is_connected(&id("a")));

    group.shutdown().await;
}

// ===========================================================================
// Heartbeat racing an expiry write
// ===========================================================================

/// Store whose "logged = false" bulk writes block until released.
struct GatedStore {
    inner: MemoryIdentityStore,
    gate: Semaphore,
    entered: Notify,
}

impl IdentityStore for GatedStore {
    async fn find_by_identity(
        &self,
        identity: &Identity,
    ) -> Result<Option<IdentityRecord>, StoreError> {
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
        if !logged {
            self.entered.notify_one();
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        self.inner.bulk_set_logged_state(identities, logged).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_during_expiry_write_rescues_identity() {
    let store = Arc::new(GatedStore {
        inner: MemoryIdentityStore::new(),
        gate: Semaphore::new(0),
        entered: Notify::new(),
    });
    for name in ["a", "b"] {
        store
            .inner
            .create(IdentityRecord {
                id: None,
                identity: id(name),
                signature: None,
                logged: true,
            })
            .await
            .unwrap();
    }
    let tracker = Arc::new(PresenceTracker::new(config(), Arc::clone(&store)));
    tracker.seed().await.unwrap();
    advance(Duration::from_secs(11)).await;

    let analyzer = tokio::spawn({
        let tracker = Arc::clone(&tracker);
        async move { tracker.analyze_once().await }
    });
    store.entered.notified().await;
    tracker.heartbeat(&id("a"));
    store.gate.add_permits(1);
    let report = analyzer.await.unwrap().unwrap();

    assert_eq!(report.expired, vec![id("b")]);
    assert_eq!(report.rescued, vec![id("a")]);
    assert!(tracker.is_connected(&id("a")));
    assert_eq!(store.inner.logged_state(&id("a")).await, Some(true));
    assert_eq!(store.inner.logged_state(&id("b")).await, Some(false));
}
