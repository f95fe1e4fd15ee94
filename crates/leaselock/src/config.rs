//! Lock acquisition options and per-name configuration.
//!
//! [`LockOptions`] carries the knobs for a single acquisition; [`LockConfig`]
//! is the provider injected into the engine that supplies per-name defaults.
//! Call-site options always win over provider values.

use std::collections::HashMap;
use std::time::Duration;

/// Default lease TTL applied when neither the call site nor the config
/// provider sets one.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_millis(1000);

/// Options for a single lock acquisition.
#[derive(Debug, Clone, Default)]
pub struct LockOptions {
    /// Owner token identifying the holder. `None` means the engine generates
    /// a fresh unique token for this acquisition. Pass the token returned by
    /// a prior acquire to lock reentrantly.
    pub owner_token: Option<String>,

    /// Lease lifetime. The store deletes the record this long after the
    /// last acquire or heartbeat refresh. `None` falls back to the config
    /// provider, then [`DEFAULT_LEASE_TTL`].
    pub lease_ttl: Option<Duration>,

    /// Heartbeat (renewal) interval. `None` disables renewal: the lease
    /// expires [`lease_ttl`](Self::lease_ttl) after acquisition unless
    /// re-acquired or unlocked first.
    pub heartbeat_interval: Option<Duration>,
}

impl LockOptions {
    /// Options with every field unset (engine and provider defaults apply).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the owner token, enabling reentrant acquisition.
    pub fn with_owner_token(mut self, token: impl Into<String>) -> Self {
        self.owner_token = Some(token.into());
        self
    }

    /// Set the lease TTL.
    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = Some(ttl);
        self
    }

    /// Enable the heartbeat task with the given renewal interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Fill unset fields from `other` (used to layer call-site options over
    /// provider defaults).
    fn or(mut self, other: &LockOptions) -> Self {
        if self.owner_token.is_none() {
            self.owner_token = other.owner_token.clone();
        }
        if self.lease_ttl.is_none() {
            self.lease_ttl = other.lease_ttl;
        }
        if self.heartbeat_interval.is_none() {
            self.heartbeat_interval = other.heartbeat_interval;
        }
        self
    }
}

/// Per-name lock configuration provider.
///
/// An explicit value injected into [`crate::LockEngine`] at construction,
/// instead of a process-wide registry of name→settings.
#[derive(Debug, Clone, Default)]
pub struct LockConfig {
    defaults: LockOptions,
    per_name: HashMap<String, LockOptions>,
}

impl LockConfig {
    /// Empty configuration: engine defaults for every lock name.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the options applied to every lock name without an override.
    pub fn with_defaults(mut self, defaults: LockOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Set the options for one lock name.
    pub fn with_lock(mut self, name: impl Into<String>, options: LockOptions) -> Self {
        self.per_name.insert(name.into(), options);
        self
    }

    /// Resolve effective options for `name`: call-site options first, then
    /// the per-name entry, then the defaults.
    pub(crate) fn resolve(&self, name: &str, call_opts: LockOptions) -> LockOptions {
        let layered = match self.per_name.get(name) {
            Some(named) => call_opts.or(named),
            None => call_opts,
        };
        layered.or(&self.defaults)
    }
}
