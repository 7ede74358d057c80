//! The presence tracker: who is connected, and who went quiet.
//!
//! # Concurrency note
//!
//! The live set sits behind one `parking_lot::Mutex`. Every read and
//! write takes it, and it is never held across an `.await`: the analyzer
//! snapshots what it needs, talks to the store unlocked, then re-locks to
//! apply the result. Anything that changed in between (a heartbeat that
//! arrived during the store write) is re-checked, not overwritten.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use turnstile_protocol::Identity;
use turnstile_store::IdentityStore;
use turnstile_tick::{TaskGroup, TickConfig};

use crate::{PresenceConfig, PresenceError};

// ---------------------------------------------------------------------------
// Records and reports
// ---------------------------------------------------------------------------

/// One live identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceRecord {
    pub identity: Identity,
    /// When the identity last heartbeated (or was loaded from the store).
    pub last_heartbeat: Instant,
}

/// What one analyzer pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzeReport {
    /// Identities picked up from the store that weren't tracked yet.
    pub merged: usize,
    /// Identities expired and persisted as no longer logged.
    pub expired: Vec<Identity>,
    /// Identities that heartbeated while their expiry was being written,
    /// and so were kept.
    pub rescued: Vec<Identity>,
    /// Live identities after the pass.
    pub connected: usize,
}

// ---------------------------------------------------------------------------
// PresenceTracker
// ---------------------------------------------------------------------------

/// Tracks connected identities by heartbeat and enforces the occupancy cap.
///
/// ## Lifecycle of one identity
///
/// ```text
///  try_connect() / heartbeat() / seed ──→ [Live] ──heartbeat()──→ [Live]
///                                           │
///                 disconnect() ─────────────┤
///                                           │ no heartbeat for timeout
///                                           ▼
///                                   analyzer: logged = false
/// ```
pub struct PresenceTracker<S> {
    config: PresenceConfig,
    store: Arc<S>,
    live: Mutex<HashMap<Identity, PresenceRecord>>,
}

impl<S: IdentityStore> PresenceTracker<S> {
    /// Creates a tracker with an empty live set.
    ///
    /// Call [`seed`](Self::seed) (or [`start`](Self::start), which seeds
    /// first) to load identities the store already considers logged.
    pub fn new(config: PresenceConfig, store: Arc<S>) -> Self {
        Self {
            config: config.validated(),
            store,
            live: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PresenceConfig {
        &self.config
    }

    /// Records a heartbeat, creating the record on first sight.
    ///
    /// Returns `true` if the identity wasn't tracked before.
    pub fn heartbeat(&self, identity: &Identity) -> bool {
        let now = Instant::now();
        let mut live = self.live.lock();
        if let Some(record) = live.get_mut(identity) {
            record.last_heartbeat = now;
            return false;
        }

        live.insert(
            identity.clone(),
            PresenceRecord {
                identity: identity.clone(),
                last_heartbeat: now,
            },
        );
        drop(live);
        debug!(%identity, "first heartbeat, identity now live");
        true
    }

    /// Refreshes the heartbeat of an identity that is already live.
    ///
    /// Unlike [`heartbeat`](Self::heartbeat) this never adds a record.
    ///
    /// # Errors
    /// [`PresenceError::NotConnected`] if the identity isn't live.
    pub fn refresh(&self, identity: &Identity) -> Result<(), PresenceError> {
        match self.live.lock().get_mut(identity) {
            Some(record) => {
                record.last_heartbeat = Instant::now();
                Ok(())
            }
            None => Err(PresenceError::NotConnected(identity.clone())),
        }
    }

    /// Removes the identity from the live set.
    ///
    /// Returns `false` (and does nothing) if it wasn't tracked.
    pub fn disconnect(&self, identity: &Identity) -> bool {
        let removed = self.live.lock().remove(identity).is_some();
        if removed {
            info!(%identity, "identity disconnected");
        }
        removed
    }

    /// Persists `identity` as no longer logged, then drops it from the
    /// live set.
    ///
    /// Use this for a client-initiated logout. [`disconnect`](Self::disconnect)
    /// alone only touches memory, and the analyzer would merge the identity
    /// back in while the store still marks it logged.
    ///
    /// Returns whether the identity was live. If the store write fails the
    /// identity stays live.
    pub async fn log_out(&self, identity: &Identity) -> Result<bool, PresenceError> {
        self.store
            .bulk_set_logged_state(std::slice::from_ref(identity), false)
            .await?;
        Ok(self.disconnect(identity))
    }

    pub fn is_connected(&self, identity: &Identity) -> bool {
        self.live.lock().contains_key(identity)
    }

    pub fn connected_count(&self) -> usize {
        self.live.lock().len()
    }

    pub fn max_capacity(&self) -> usize {
        self.config.max_concurrent_identities
    }

    /// Returns `true` while one more identity may connect.
    ///
    /// The cap is strict: at exactly `max_capacity` connected identities
    /// this is already `false`.
    pub fn has_capacity(&self) -> bool {
        self.connected_count() < self.max_capacity()
    }

    /// Admits `identity` into the live set if it isn't connected yet and
    /// there is room.
    ///
    /// Both checks and the insert happen under one lock, so two callers
    /// racing for the last slot can't both win.
    ///
    /// # Errors
    /// - [`PresenceError::AlreadyConnected`] if the identity is live.
    /// - [`PresenceError::AtCapacity`] if `max_capacity` identities are
    ///   already connected.
    pub fn try_connect(&self, identity: &Identity) -> Result<(), PresenceError> {
        let max = self.max_capacity();
        let mut live = self.live.lock();

        if live.contains_key(identity) {
            return Err(PresenceError::AlreadyConnected(identity.clone()));
        }
        if live.len() >= max {
            return Err(PresenceError::AtCapacity { max });
        }

        live.insert(
            identity.clone(),
            PresenceRecord {
                identity: identity.clone(),
                last_heartbeat: Instant::now(),
            },
        );
        let connected = live.len();
        drop(live);

        info!(%identity, connected, max, "identity connected");
        Ok(())
    }

    /// When `identity` last heartbeated, if it is live.
    pub fn last_heartbeat(&self, identity: &Identity) -> Option<Instant> {
        self.live.lock().get(identity).map(|r| r.last_heartbeat)
    }

    /// Live identities, sorted.
    pub fn connected_identities(&self) -> Vec<Identity> {
        let mut ids: Vec<Identity> = self.live.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    // -----------------------------------------------------------------------
    // Store reconciliation
    // -----------------------------------------------------------------------

    /// Adds every identity the store marks logged that isn't live yet.
    ///
    /// Newly added identities start with a fresh heartbeat, so they get a
    /// full timeout to show up. Returns how many were added.
    pub async fn seed(&self) -> Result<usize, PresenceError> {
        let records = self.store.find_all_by_logged_state(true).await?;
        let now = Instant::now();

        let mut live = self.live.lock();
        let before = live.len();
        for record in records {
            live.entry(record.identity.clone())
                .or_insert_with(|| PresenceRecord {
                    identity: record.identity,
                    last_heartbeat: now,
                });
        }
        Ok(live.len() - before)
    }

    /// One analyzer pass.
    ///
    /// Merges identities logged in the store, then expires every identity
    /// whose heartbeat is older than the timeout. Expiries are persisted
    /// in a single bulk write before they leave the live set; if that
    /// write fails nothing is removed and the next pass tries again.
    pub async fn analyze_once(&self) -> Result<AnalyzeReport, PresenceError> {
        let merged = self.seed().await?;
        let timeout = self.config.heartbeat_timeout();

        let stale = {
            let now = Instant::now();
            let live = self.live.lock();
            debug!(connected = live.len(), "analyzing presence");
            let mut stale: Vec<Identity> = live
                .values()
                .filter(|r| now.saturating_duration_since(r.last_heartbeat) > timeout)
                .map(|r| r.identity.clone())
                .collect();
            stale.sort();
            stale
        };

        if stale.is_empty() {
            return Ok(AnalyzeReport {
                merged,
                connected: self.connected_count(),
                ..Default::default()
            });
        }

        let changed = self.store.bulk_set_logged_state(&stale, false).await?;
        if !changed {
            warn!(
                count = stale.len(),
                "expired identities had no logged record to update"
            );
        }

        // Re-check under the lock: a heartbeat may have landed meanwhile.
        let (expired, rescued, connected) = {
            let now = Instant::now();
            let mut live = self.live.lock();
            let mut expired = Vec::with_capacity(stale.len());
            let mut rescued = Vec::new();
            for identity in stale {
                let still_stale = live
                    .get(&identity)
                    .is_some_and(|r| now.saturating_duration_since(r.last_heartbeat) > timeout);
                if still_stale {
                    live.remove(&identity);
                    expired.push(identity);
                } else if live.contains_key(&identity) {
                    rescued.push(identity);
                }
            }
            (expired, rescued, live.len())
        };

        if !rescued.is_empty() {
            // They were just written as logged out; put them back.
            if let Err(e) = self.store.bulk_set_logged_state(&rescued, true).await {
                error!(count = rescued.len(), error = %e, "failed to restore logged state");
            }
        }

        info!(
            expired = expired.len(),
            timeout_secs = self.config.heartbeat_timeout_secs,
            connected,
            "identities expired after missing heartbeats"
        );

        Ok(AnalyzeReport {
            merged,
            expired,
            rescued,
            connected,
        })
    }

    // -----------------------------------------------------------------------
    // Loop
    // -----------------------------------------------------------------------

    /// Seeds the live set, then spawns the analyzer loop.
    ///
    /// A failed seed is logged; the first analyzer pass merges whatever
    /// it missed.
    pub async fn start(self: &Arc<Self>) -> TaskGroup {
        match self.seed().await {
            Ok(loaded) => info!(loaded, "identities currently online loaded"),
            Err(e) => error!(error = %e, "failed to load online identities"),
        }

        let mut group = TaskGroup::new();
        let tracker = Arc::clone(self);
        group.spawn_periodic(
            "analyzer",
            TickConfig::with_interval(self.config.analyzer_interval()),
            move || {
                let tracker = Arc::clone(&tracker);
                async move {
                    tracker.analyze_once().await?;
                    Ok::<_, PresenceError>(())
                }
            },
        );
        group
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use turnstile_protocol::IdentityRecord;
    use turnstile_store::MemoryIdentityStore;

    use super::*;

    fn id(raw: &str) -> Identity {
        Identity::new(raw).unwrap()
    }

    fn tracker(max: usize) -> PresenceTracker<MemoryIdentityStore> {
        let config = PresenceConfig {
            max_concurrent_identities: max,
            ..Default::default()
        };
        PresenceTracker::new(config, Arc::new(MemoryIdentityStore::new()))
    }

    #[tokio::test]
    async fn test_heartbeat_unknown_identity_creates_one_record() {
        let t = tracker(10);

        assert!(t.heartbeat(&id("a")));
        assert!(!t.heartbeat(&id("a")));
        assert!(!t.heartbeat(&id("a")));

        assert_eq!(t.connected_count(), 1);
        assert!(t.is_connected(&id("a")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_known_identity_refreshes_timestamp() {
        let t = tracker(10);
        t.heartbeat(&id("a"));
        let first = t.last_heartbeat(&id("a")).unwrap();

        tokio::time::advance(Duration::from_secs(3)).await;
        t.heartbeat(&id("a"));

        let second = t.last_heartbeat(&id("a")).unwrap();
        assert_eq!(second - first, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_live_identity_updates_timestamp() {
        let t = tracker(10);
        t.heartbeat(&id("a"));
        let first = t.last_heartbeat(&id("a")).unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        t.refresh(&id("a")).unwrap();

        assert_eq!(t.last_heartbeat(&id("a")).unwrap() - first, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_refresh_unknown_identity_adds_nothing() {
        let t = tracker(10);

        assert_eq!(
            t.refresh(&id("ghost")),
            Err(PresenceError::NotConnected(id("ghost")))
        );
        assert_eq!(t.connected_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_unknown_identity_is_noop() {
        let t = tracker(10);
        t.heartbeat(&id("a"));

        assert!(!t.disconnect(&id("ghost")));
        assert!(t.disconnect(&id("a")));
        assert!(!t.is_connected(&id("a")));
        assert_eq!(t.connected_count(), 0);
    }

    #[tokio::test]
    async fn test_try_connect_at_exact_capacity_is_denied() {
        let t = tracker(2);
        t.heartbeat(&id("a"));
        t.heartbeat(&id("b"));
        assert_eq!(t.connected_count(), 2);
        assert!(!t.has_capacity());

        let result = t.try_connect(&id("c"));

        assert_eq!(result, Err(PresenceError::AtCapacity { max: 2 }));
        assert_eq!(t.connected_count(), 2);
    }

    #[tokio::test]
    async fn test_try_connect_one_below_capacity_is_allowed() {
        let t = tracker(2);
        t.heartbeat(&id("a"));
        assert!(t.has_capacity());

        assert_eq!(t.try_connect(&id("b")), Ok(()));
        assert_eq!(t.connected_count(), 2);
    }

    #[tokio::test]
    async fn test_try_connect_already_connected_is_denied() {
        let t = tracker(10);
        t.try_connect(&id("a")).unwrap();

        let result = t.try_connect(&id("a"));

        assert_eq!(result, Err(PresenceError::AlreadyConnected(id("a"))));
    }

    #[tokio::test]
    async fn test_seed_does_not_reset_existing_heartbeats() {
        let store = Arc::new(MemoryIdentityStore::new());
        for name in ["a", "b"] {
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
        let t = PresenceTracker::new(PresenceConfig::default(), store);
        t.heartbeat(&id("a"));

        let added = t.seed().await.unwrap();

        assert_eq!(added, 1);
        assert_eq!(t.connected_identities(), vec![id("a"), id("b")]);
    }
}
