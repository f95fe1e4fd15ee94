//! In-process lock store.
//!
//! Implements the same lease semantics as the Redis store against a mutexed
//! map: the mutex plays the role of the store's atomic scripting, TTL expiry
//! is checked lazily against `tokio::time::Instant` (so paused-clock tests
//! are deterministic), and a broadcast channel per key stands in for
//! pub/sub. Useful as a test double and for single-process deployments.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::Instant;

use crate::errors::LockError;
use crate::store::{
    LockStore, LockWaiter, RELEASE_KEY_NOT_FOUND, RELEASE_NOT_OWNER, RELEASE_SUCCESS,
};

/// Broadcast capacity per key channel. Waiters that lag simply miss a
/// notification and re-race on the next one.
const CHANNEL_CAPACITY: usize = 16;

/// One lease record: owner token, hold count, expiry deadline.
#[derive(Debug)]
struct LeaseRecord {
    token: String,
    count: i64,
    expires_at: Instant,
}

impl LeaseRecord {
    fn expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Single-process [`LockStore`].
///
/// Never returns `RELEASE_DELETE_FAILED`: removing a map entry cannot fail
/// the way a store-side `DEL` can.
#[derive(Default)]
pub struct InMemoryLockStore {
    leases: Mutex<HashMap<String, LeaseRecord>>,
    channels: Mutex<HashMap<String, broadcast::Sender<()>>>,
}

impl InMemoryLockStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the record at `key` if its TTL has elapsed (store-managed
    /// expiry, checked lazily on every access).
    fn purge_expired(leases: &mut HashMap<String, LeaseRecord>, key: &str, now: Instant) {
        if leases.get(key).is_some_and(|rec| rec.expired(now)) {
            leases.remove(key);
        }
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn acquire(&self, key: &str, token: &str, ttl: Duration) -> Result<i64, LockError> {
        let mut leases = self.leases.lock().await;
        let now = Instant::now();
        Self::purge_expired(&mut leases, key, now);

        match leases.get_mut(key) {
            None => {
                leases.insert(
                    key.to_string(),
                    LeaseRecord {
                        token: token.to_string(),
                        count: 1,
                        expires_at: now + ttl,
                    },
                );
                Ok(1)
            }
            Some(rec) if rec.token == token => {
                rec.count += 1;
                rec.expires_at = now + ttl;
                Ok(rec.count)
            }
            Some(_) => Ok(0),
        }
    }

    async fn release(&self, key: &str, token: &str) -> Result<i64, LockError> {
        let mut leases = self.leases.lock().await;
        let now = Instant::now();
        Self::purge_expired(&mut leases, key, now);

        let Some(rec) = leases.get_mut(key) else {
            return Ok(RELEASE_KEY_NOT_FOUND);
        };

        if rec.token != token {
            return Ok(RELEASE_NOT_OWNER);
        }

        if rec.count > 1 {
            // Still held reentrantly; no TTL refresh on partial release
            rec.count -= 1;
            return Ok(RELEASE_SUCCESS);
        }

        leases.remove(key);
        drop(leases);

        // Final release: wake every waiter on this key
        let channels = self.channels.lock().await;
        if let Some(tx) = channels.get(key) {
            let _ = tx.send(());
        }

        Ok(RELEASE_SUCCESS)
    }

    async fn lease_exists(&self, key: &str) -> Result<bool, LockError> {
        let mut leases = self.leases.lock().await;
        let now = Instant::now();
        Self::purge_expired(&mut leases, key, now);

        Ok(leases.contains_key(key))
    }

    async fn refresh_lease(&self, key: &str, ttl: Duration) -> Result<bool, LockError> {
        let mut leases = self.leases.lock().await;
        let now = Instant::now();
        Self::purge_expired(&mut leases, key, now);

        match leases.get_mut(key) {
            Some(rec) => {
                rec.expires_at = now + ttl;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn subscribe(&self, key: &str) -> Result<LockWaiter, LockError> {
        let mut channels = self.channels.lock().await;
        // Sweep channels whose waiters are all gone so the map stays bounded
        channels.retain(|_, tx| tx.receiver_count() > 0);
        let tx = channels
            .entry(key.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone();
        drop(channels);

        // Receiver exists before this function returns, so a release
        // published after a successful subscribe is never missed.
        let mut notifications = tx.subscribe();
        let (waiter_tx, waiter_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    res = notifications.recv() => match res {
                        Ok(()) => {
                            if waiter_tx.send(()).await.is_err() {
                                break;
                            }
                        }
                        // Missed notifications collapse into the next wake-up
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = waiter_tx.closed() => break,
                }
            }
        });

        Ok(LockWaiter::new(waiter_rx))
    }
}
