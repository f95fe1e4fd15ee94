//! Lock engine: non-blocking and blocking acquire, release, and the lease
//! heartbeat loop.
//!
//! All coordination state lives in the store; the engine never holds lock
//! state in memory. The store's atomic acquire/release steps are the sole
//! serialization point, so two engines in different processes pointed at
//! the same store compose correctly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use uuid::Uuid;

use crate::config::{LockConfig, LockOptions, DEFAULT_LEASE_TTL};
use crate::errors::LockError;
use crate::keys::lock_key;
use crate::store::{
    LockStore, RELEASE_DELETE_FAILED, RELEASE_KEY_NOT_FOUND, RELEASE_NOT_OWNER, RELEASE_SUCCESS,
};

/// Distributed lock engine over a [`LockStore`].
///
/// Cheap to share behind an `Arc`; every operation borrows a connection
/// from the store per call.
pub struct LockEngine {
    store: Arc<dyn LockStore>,
    config: LockConfig,
    /// Owned handles of spawned heartbeat tasks, keyed by lock key. Tasks
    /// self-terminate when the lease disappears; handles are kept so the
    /// tasks are never fire-and-forget.
    heartbeats: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl LockEngine {
    /// Engine with default per-name configuration.
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self::with_config(store, LockConfig::default())
    }

    /// Engine with an injected per-name configuration provider.
    pub fn with_config(store: Arc<dyn LockStore>, config: LockConfig) -> Self {
        Self {
            store,
            config,
            heartbeats: Mutex::new(HashMap::new()),
        }
    }

    /// Try to acquire the lock once, without blocking.
    ///
    /// Returns the owner token on success. Acquisition is reentrant when
    /// [`LockOptions::owner_token`] matches the current holder. On a fresh
    /// (non-reentrant) acquisition with a configured heartbeat interval, a
    /// renewal task is spawned that keeps extending the lease TTL until the
    /// lease disappears.
    ///
    /// # Errors
    ///
    /// [`LockError::NotAcquired`] when another owner holds the lock;
    /// [`LockError::Store`] on store communication failure.
    pub async fn try_lock(&self, name: &str, opts: LockOptions) -> Result<String, LockError> {
        let opts = self.config.resolve(name, opts);
        let token = resolve_token(&opts);
        self.acquire_once(name, &token, &opts).await?;
        Ok(token)
    }

    /// Acquire the lock, waiting for the holder to release it if contended.
    ///
    /// Tries once; on contention, subscribes to the lock's release channel
    /// *before* waiting (so a release published after the subscribe is
    /// never missed), re-tries once to close the subscribe-after-check
    /// window, then suspends until a release notification or cancellation.
    /// A notification triggers a full re-race: there is no queue and no
    /// fairness ordering among waiters.
    ///
    /// # Errors
    ///
    /// [`LockError::Canceled`] when `cancel` fires before acquisition; the
    /// subscription is released on every exit path. Other store errors
    /// propagate without blocking.
    pub async fn lock(
        &self,
        name: &str,
        cancel: &CancellationToken,
        opts: LockOptions,
    ) -> Result<String, LockError> {
        let opts = self.config.resolve(name, opts);
        let token = resolve_token(&opts);
        let key = lock_key(name);

        loop {
            match self.acquire_once(name, &token, &opts).await {
                Ok(()) => return Ok(token),
                Err(LockError::NotAcquired) => {}
                Err(e) => return Err(e),
            }

            let mut waiter = self.store.subscribe(&key).await?;

            // Re-race immediately: a release between the failed acquire and
            // the subscribe completing would otherwise be a lost wake-up
            match self.acquire_once(name, &token, &opts).await {
                Ok(()) => return Ok(token),
                Err(LockError::NotAcquired) => {}
                Err(e) => return Err(e),
            }

            tokio::select! {
                _ = waiter.notified() => {
                    debug!(
                        target: "leaselock.engine",
                        key = %key,
                        "Release notification received; re-racing"
                    );
                }
                _ = cancel.cancelled() => {
                    debug!(
                        target: "leaselock.engine",
                        key = %key,
                        "Lock wait canceled"
                    );
                    return Err(LockError::Canceled);
                }
            }
            // Waiter drops here; each retry cycle re-subscribes fresh
        }
    }

    /// Release one hold on the lock.
    ///
    /// Decrements the hold count when held reentrantly; on the final hold,
    /// deletes the lease record and wakes all blocked waiters.
    ///
    /// # Errors
    ///
    /// [`LockError::NotExist`] when no lease exists for `name`;
    /// [`LockError::NotOwner`] when `token` does not match the holder;
    /// [`LockError::UnknownReleaseCode`] on client/script protocol drift.
    pub async fn unlock(&self, name: &str, token: &str) -> Result<(), LockError> {
        let key = lock_key(name);

        match self.store.release(&key, token).await? {
            RELEASE_KEY_NOT_FOUND => Err(LockError::NotExist),
            RELEASE_NOT_OWNER => Err(LockError::NotOwner),
            RELEASE_DELETE_FAILED => Err(LockError::Store("lease record delete failed".to_string())),
            RELEASE_SUCCESS => Ok(()),
            code => Err(LockError::UnknownReleaseCode(code)),
        }
    }

    /// Whether a heartbeat task spawned for `name` is still running.
    ///
    /// Heartbeat tasks carry no cancellation input: they stop on their own
    /// once the lease record is gone (unlocked, expired, or evicted), up to
    /// one interval later.
    pub async fn heartbeat_is_running(&self, name: &str) -> bool {
        let heartbeats = self.heartbeats.lock().await;
        heartbeats
            .get(&lock_key(name))
            .is_some_and(|handle| !handle.is_finished())
    }

    /// One acquire round trip, plus heartbeat spawn on fresh acquisition.
    async fn acquire_once(
        &self,
        name: &str,
        token: &str,
        opts: &LockOptions,
    ) -> Result<(), LockError> {
        let key = lock_key(name);
        let ttl = opts.lease_ttl.unwrap_or(DEFAULT_LEASE_TTL);

        let count = self.store.acquire(&key, token, ttl).await?;
        if count == 0 {
            return Err(LockError::NotAcquired);
        }

        debug!(
            target: "leaselock.engine",
            key = %key,
            count = count,
            fresh = (count == 1),
            "Lock acquired"
        );

        if count == 1 {
            if let Some(interval) = opts.heartbeat_interval {
                self.spawn_heartbeat(key, ttl, interval).await;
            }
        }

        Ok(())
    }

    async fn spawn_heartbeat(&self, key: String, ttl: Duration, interval: Duration) {
        let store = Arc::clone(&self.store);
        let handle = tokio::spawn(run_heartbeat(store, key.clone(), ttl, interval));

        let mut heartbeats = self.heartbeats.lock().await;
        heartbeats.retain(|_, h| !h.is_finished());
        heartbeats.insert(key, handle);
    }
}

fn resolve_token(opts: &LockOptions) -> String {
    opts.owner_token
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Lease renewal loop.
///
/// Fail-stop: the first missing lease or store error ends the task. The
/// lease then expires naturally, which is the correct safety fallback — a
/// renewal task must never keep a lock alive against a failing store.
async fn run_heartbeat(store: Arc<dyn LockStore>, key: String, ttl: Duration, interval: Duration) {
    // First tick one full interval out, matching the lease already being
    // fresh at spawn time
    let start = tokio::time::Instant::now() + interval;
    let mut ticker = tokio::time::interval_at(start, interval);

    loop {
        ticker.tick().await;

        match store.lease_exists(&key).await {
            Ok(false) => {
                debug!(
                    target: "leaselock.engine.heartbeat",
                    key = %key,
                    "Lease gone; stopping renewal task"
                );
                return;
            }
            Ok(true) => match store.refresh_lease(&key, ttl).await {
                Ok(true) => {
                    debug!(
                        target: "leaselock.engine.heartbeat",
                        key = %key,
                        "Lease renewed"
                    );
                }
                // Record vanished between the probe and the refresh
                Ok(false) => return,
                Err(e) => {
                    error!(
                        target: "leaselock.engine.heartbeat",
                        error = %e,
                        key = %key,
                        "Lease refresh failed; stopping renewal task"
                    );
                    return;
                }
            },
            Err(e) => {
                error!(
                    target: "leaselock.engine.heartbeat",
                    error = %e,
                    key = %key,
                    "Lease probe failed; stopping renewal task"
                );
                return;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::InMemoryLockStore;

    fn engine() -> (Arc<InMemoryLockStore>, LockEngine) {
        let store = Arc::new(InMemoryLockStore::new());
        let engine = LockEngine::new(store.clone());
        (store, engine)
    }

    #[tokio::test]
    async fn test_try_lock_generates_token_when_unset() {
        let (_, engine) = engine();
        let token = engine.try_lock("job-1", LockOptions::new()).await.unwrap();
        assert!(!token.is_empty());
    }

    #[tokio::test]
    async fn test_try_lock_returns_supplied_token() {
        let (_, engine) = engine();
        let token = engine
            .try_lock("job-1", LockOptions::new().with_owner_token("owner-a"))
            .await
            .unwrap();
        assert_eq!(token, "owner-a");
    }

    #[tokio::test]
    async fn test_try_lock_then_unlock_round_trip() {
        let (store, engine) = engine();
        let token = engine.try_lock("job-1", LockOptions::new()).await.unwrap();
        engine.unlock("job-1", &token).await.unwrap();
        assert!(!store.lease_exists("job-1.lock").await.unwrap());
    }

    #[tokio::test]
    async fn test_name_and_derived_key_address_same_lock() {
        let (_, engine) = engine();
        let token = engine.try_lock("job-1", LockOptions::new()).await.unwrap();

        // "job-1.lock" normalizes to the same key
        let err = engine
            .try_lock("job-1.lock", LockOptions::new().with_owner_token("other"))
            .await
            .unwrap_err();
        assert!(err.is_not_acquired());

        engine.unlock("job-1.lock", &token).await.unwrap();
    }

    #[tokio::test]
    async fn test_no_heartbeat_without_interval() {
        let (_, engine) = engine();
        engine.try_lock("job-1", LockOptions::new()).await.unwrap();
        assert!(!engine.heartbeat_is_running("job-1").await);
    }

    #[tokio::test]
    async fn test_reentrant_acquire_does_not_spawn_second_heartbeat() {
        let (_, engine) = engine();
        let opts = LockOptions::new()
            .with_owner_token("owner-a")
            .with_lease_ttl(Duration::from_millis(5000))
            .with_heartbeat_interval(Duration::from_millis(1000));

        engine.try_lock("job-1", opts.clone()).await.unwrap();
        assert!(engine.heartbeat_is_running("job-1").await);

        // Reentrant: count == 2, so the engine must not spawn another task;
        // the owned handle stays the one from the fresh acquisition
        engine.try_lock("job-1", opts).await.unwrap();
        assert!(engine.heartbeat_is_running("job-1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_stops_after_unlock() {
        let (_, engine) = engine();
        let opts = LockOptions::new()
            .with_owner_token("owner-a")
            .with_lease_ttl(Duration::from_millis(5000))
            .with_heartbeat_interval(Duration::from_millis(1000));

        engine.try_lock("job-1", opts).await.unwrap();
        engine.unlock("job-1", "owner-a").await.unwrap();

        // Next tick observes the missing lease and self-terminates
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(!engine.heartbeat_is_running("job-1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_keeps_lease_alive() {
        let (store, engine) = engine();
        let opts = LockOptions::new()
            .with_owner_token("owner-a")
            .with_lease_ttl(Duration::from_millis(200))
            .with_heartbeat_interval(Duration::from_millis(100));

        engine.try_lock("job-1", opts).await.unwrap();

        // Well past the original TTL; renewal keeps the record alive
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(store.lease_exists("job-1.lock").await.unwrap());
        assert!(engine.heartbeat_is_running("job-1").await);

        engine.unlock("job-1", "owner-a").await.unwrap();
    }

    #[tokio::test]
    async fn test_unlock_maps_release_codes() {
        let (_, engine) = engine();

        let err = engine.unlock("job-1", "nobody").await.unwrap_err();
        assert!(matches!(err, LockError::NotExist));

        engine
            .try_lock("job-1", LockOptions::new().with_owner_token("owner-a"))
            .await
            .unwrap();
        let err = engine.unlock("job-1", "owner-b").await.unwrap_err();
        assert!(matches!(err, LockError::NotOwner));

        engine.unlock("job-1", "owner-a").await.unwrap();
    }

    #[tokio::test]
    async fn test_per_name_config_applies() {
        let store = Arc::new(InMemoryLockStore::new());
        let config = LockConfig::new().with_lock(
            "job-1",
            LockOptions::new().with_owner_token("configured-owner"),
        );
        let engine = LockEngine::with_config(store, config);

        let token = engine.try_lock("job-1", LockOptions::new()).await.unwrap();
        assert_eq!(token, "configured-owner");
    }
}
