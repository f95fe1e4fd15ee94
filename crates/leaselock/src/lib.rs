//! # leaselock
//!
//! Distributed mutual exclusion on top of a key-value store with atomic
//! server-side scripting and pub/sub notification (Redis in production).
//!
//! - Safe acquire/release across independent processes: every mutation of a
//!   lease record is one atomic store-side step, never a client-side
//!   read-then-write
//! - Crash tolerance via lease TTL: a holder that dies stops renewing and
//!   the store expires the record, so no permanent deadlock
//! - Reentrancy: re-acquiring with the same owner token bumps a hold count;
//!   as many unlocks are needed before the lease is deleted
//! - Event-driven blocking: contended [`LockEngine::lock`] callers subscribe
//!   to the lock's release channel and suspend instead of polling; a final
//!   release wakes all waiters, who then re-race (no fairness ordering)
//! - Optional heartbeat: a fresh acquisition can spawn a renewal task that
//!   extends the lease TTL until the lease disappears
//!
//! Not a consensus protocol: a single authoritative store instance is
//! assumed, and correctness under store-node failover is out of scope.
//!
//! # Usage
//!
//! ```rust,ignore
//! use leaselock::{LockEngine, LockOptions, RedisLockStore};
//! use std::{sync::Arc, time::Duration};
//! use tokio_util::sync::CancellationToken;
//!
//! let store = Arc::new(RedisLockStore::new("redis://localhost:6379").await?);
//! let engine = LockEngine::new(store);
//!
//! let opts = LockOptions::new()
//!     .with_lease_ttl(Duration::from_millis(5000))
//!     .with_heartbeat_interval(Duration::from_millis(1000));
//!
//! let token = engine.lock("job-1", &CancellationToken::new(), opts).await?;
//! // ... critical section ...
//! engine.unlock("job-1", &token).await?;
//! ```
//!
//! # Modules
//!
//! - [`engine`] - TryLock / Lock / Unlock and the heartbeat loop
//! - [`store`] - the atomic store boundary: Redis and in-memory backends
//! - [`config`] - acquisition options and per-name defaults
//! - [`errors`] - typed failure taxonomy
//! - [`keys`] - lock-key derivation

pub mod config;
pub mod engine;
pub mod errors;
pub mod keys;
pub mod store;

pub use config::{LockConfig, LockOptions, DEFAULT_LEASE_TTL};
pub use engine::LockEngine;
pub use errors::LockError;
pub use keys::lock_key;
pub use store::{InMemoryLockStore, LockStore, LockWaiter, RedisLockStore};
