//! Lock engine error types.
//!
//! Every failure surfaces to the caller as a typed variant; nothing is
//! swallowed except heartbeat-tick errors, which are logged by the renewal
//! task before it self-terminates (see [`crate::engine`]).

use thiserror::Error;

/// Errors returned by [`crate::LockEngine`] and [`crate::store::LockStore`]
/// implementations.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock is held by another owner. Recoverable: the caller decides
    /// whether to retry, block in [`crate::LockEngine::lock`], or give up.
    #[error("lock not acquired")]
    NotAcquired,

    /// Unlock was called for a key with no active lease (never locked, or
    /// the lease already expired).
    #[error("lock does not exist")]
    NotExist,

    /// Unlock was called with a token that does not match the current
    /// holder. The lease record is left untouched.
    #[error("not the owner of the key")]
    NotOwner,

    /// The cancellable wait in [`crate::LockEngine::lock`] was canceled
    /// before the lock was acquired.
    #[error("lock attempt canceled")]
    Canceled,

    /// Communication or protocol failure talking to the store. Not retried
    /// internally.
    #[error("store error: {0}")]
    Store(String),

    /// The release script returned a code outside the protocol. Indicates
    /// drift between the client and the server-side script.
    #[error("unknown release code: {0}")]
    UnknownReleaseCode(i64),
}

impl LockError {
    /// True for the contended-lock case, the one recoverable outcome of a
    /// non-blocking acquire.
    pub fn is_not_acquired(&self) -> bool {
        matches!(self, LockError::NotAcquired)
    }
}
