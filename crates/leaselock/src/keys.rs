//! Lock key derivation.

/// Suffix appended to every lock name to form the storage key.
pub const LOCK_KEY_SUFFIX: &str = ".lock";

/// Derive the storage key for a lock name.
///
/// Normalizes any existing suffix first, so repeated application addresses
/// the same key: `lock_key("job-1")` and `lock_key("job-1.lock")` both
/// yield `"job-1.lock"`.
pub fn lock_key(name: &str) -> String {
    let base = name.strip_suffix(LOCK_KEY_SUFFIX).unwrap_or(name);
    format!("{base}{LOCK_KEY_SUFFIX}")
}
