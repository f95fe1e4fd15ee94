//! Store abstraction for the lock protocol.
//!
//! The store is the sole serialization point: every mutation of a lease
//! record happens inside one atomic operation on the store side, never as a
//! client-side read-then-write. The engine talks to the store through
//! [`LockStore`] so the protocol can run against Redis in production and an
//! in-process store in tests.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::LockError;

pub mod lua_scripts;
pub mod memory;
pub mod redis;

pub use self::memory::InMemoryLockStore;
pub use self::redis::RedisLockStore;

/// Release outcome: no lease record exists for the key.
pub const RELEASE_KEY_NOT_FOUND: i64 = 0;
/// Release outcome: the stored owner token does not match the caller's.
pub const RELEASE_NOT_OWNER: i64 = 1;
/// Release outcome: the final delete failed for a reason other than
/// "already gone".
pub const RELEASE_DELETE_FAILED: i64 = 2;
/// Release outcome: decremented or deleted successfully.
pub const RELEASE_SUCCESS: i64 = 666;

/// Atomic lock-store operations.
///
/// `acquire` and `release` must each execute as one indivisible step against
/// the store; interleaving with a concurrent acquire or release on the same
/// key is not permitted.
#[async_trait]
pub trait LockStore: Send + Sync + 'static {
    /// Run the acquire step for `key`.
    ///
    /// Creates the lease record with hold count 1 if absent, increments the
    /// count and refreshes the TTL if `token` already owns it, and leaves it
    /// untouched otherwise.
    ///
    /// Returns `0` when the lock is held by another owner, or the resulting
    /// hold count (`>= 1`) on success. A count of exactly 1 means a fresh
    /// acquisition.
    async fn acquire(&self, key: &str, token: &str, ttl: Duration) -> Result<i64, LockError>;

    /// Run the release step for `key`.
    ///
    /// Decrements the hold count when above 1; otherwise deletes the record
    /// and publishes a wake-up notice on the key's channel.
    ///
    /// Returns one of the `RELEASE_*` codes. The engine maps codes to
    /// errors; stores only transport them.
    async fn release(&self, key: &str, token: &str) -> Result<i64, LockError>;

    /// Whether a lease record currently exists at `key`.
    async fn lease_exists(&self, key: &str) -> Result<bool, LockError>;

    /// Reset the TTL of the lease record at `key`. Returns `false` when no
    /// record exists (nothing was refreshed).
    async fn refresh_lease(&self, key: &str, ttl: Duration) -> Result<bool, LockError>;

    /// Subscribe to release notifications for `key`.
    ///
    /// The subscription is live before this returns, so a release published
    /// after a successful `subscribe` call is guaranteed to reach the
    /// returned waiter. Dropping the waiter releases the subscription.
    async fn subscribe(&self, key: &str) -> Result<LockWaiter, LockError>;
}

/// A live subscription to one lock key's release channel.
///
/// Backed by a forwarder task inside the store; the task exits (tearing the
/// underlying subscription down) once the waiter is dropped.
pub struct LockWaiter {
    rx: mpsc::Receiver<()>,
}

impl LockWaiter {
    /// Wrap the receiving end of a store's forwarder channel.
    pub fn new(rx: mpsc::Receiver<()>) -> Self {
        Self { rx }
    }

    /// Wait for the next release notification.
    ///
    /// Also returns when the store side closes the channel, so a lost
    /// subscription degrades to a spurious wake-up (the caller re-races and
    /// observes the store's real state) rather than a hang.
    pub async fn notified(&mut self) {
        let _ = self.rx.recv().await;
    }
}
