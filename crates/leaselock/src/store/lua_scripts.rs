//! Lua scripts for atomic lock operations.
//!
//! Both acquire and release run as a single server-side script so that
//! check-then-act is never split by a concurrent actor. The scripts are the
//! only writers of the lease record: a hash holding the owner token and the
//! hold count, with a store-managed millisecond TTL.

/// Lua script for the acquire step.
///
/// Arguments:
/// - KEYS[1]: Lock key (e.g., `job-1.lock`)
/// - ARGV[1]: Owner token
/// - ARGV[2]: Lease TTL in milliseconds
///
/// Returns:
/// - 0: Not acquired (held by another owner)
/// - N >= 1: Acquired; N is the resulting hold count (1 = fresh)
pub const ACQUIRE: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    -- Free: create the record and take the first hold
    redis.call('HSET', KEYS[1], 'token', ARGV[1])
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
    return redis.call('HINCRBY', KEYS[1], 'count', 1)
end

if redis.call('HGET', KEYS[1], 'token') == ARGV[1] then
    -- Reentrant: same owner, bump the count and refresh the lease
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
    return redis.call('HINCRBY', KEYS[1], 'count', 1)
end

-- Held by another owner
return 0
"#;

/// Lua script for the release step.
///
/// Arguments:
/// - KEYS[1]: Lock key
/// - ARGV[1]: Owner token
///
/// Returns:
/// - 0: Key not found
/// - 1: Caller is not the owner
/// - 2: Delete failed
/// - 666: Released (decremented, or deleted and waiters notified)
///
/// The `count > 1` branch deliberately does not refresh the TTL: the lease
/// lifetime is extended by acquire and heartbeat only.
pub const RELEASE: &str = r#"
local ret_key_not_found = 0
local ret_not_owner = 1
local ret_delete_failed = 2
local ret_success = 666

if redis.call('EXISTS', KEYS[1]) == 0 then
    return ret_key_not_found
end

if redis.call('HGET', KEYS[1], 'token') ~= ARGV[1] then
    return ret_not_owner
end

if tonumber(redis.call('HGET', KEYS[1], 'count')) > 1 then
    -- Still held reentrantly
    redis.call('HINCRBY', KEYS[1], 'count', -1)
    return ret_success
end

if redis.call('DEL', KEYS[1]) == 0 then
    return ret_delete_failed
end

-- Final release: wake every blocked waiter so they re-race
redis.call('PUBLISH', KEYS[1], 1)
return ret_success
"#;
