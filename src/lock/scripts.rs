//! Atomic lock scripts.
//!
//! All scripts take the lock key as `KEYS[1]` and the owner token as
//! `ARGV[1]`; TTLs are passed in milliseconds as `ARGV[2]`. Each returns 1
//! on success and 0 otherwise.

use crate::remote::Script;

/// Sets the token if the key is absent, or renews it if the caller already
/// owns it (an earlier attempt that timed out client-side may have landed).
pub const ACQUIRE_SCRIPT: Script = Script::new(
    "acquire",
    r#"
local current = redis.call('GET', KEYS[1])
if current == false then
    redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[2])
    return 1
elseif current == ARGV[1] then
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
    return 1
end
return 0
"#,
);

/// Deletes the key only if it still holds the caller's token.
pub const RELEASE_SCRIPT: Script = Script::new(
    "release",
    r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#,
);

/// Extends the key's TTL only if it still holds the caller's token.
pub const EXTEND_SCRIPT: Script = Script::new(
    "extend",
    r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 0
"#,
);
