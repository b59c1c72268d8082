/*
 *
 *  *
 *  *      Copyright (c) 2018-2025, SnackCloud All rights reserved.
 *  *
 *  *   Redistribution and use in source and binary forms, with or without
 *  *   modification, are permitted provided that the following conditions are met:
 *  *
 *  *   Redistributions of source code must retain the above copyright notice,
 *  *   this list of conditions and the following disclaimer.
 *  *   Redistributions in binary form must reproduce the above copyright
 *  *   notice, this list of conditions and the following disclaimer in the
 *  *   documentation and/or other materials provided with the distribution.
 *  *   Neither the name of the www.snackcloud.cn developer nor the names of its
 *  *   contributors may be used to endorse or promote products derived from
 *  *   this software without specific prior written permission.
 *  *   Author: SnackCloud
 *  *
 *  
 */

//! Lua bodies of the atomic lock primitives.
//!
//! Every script receives the lock key as `KEYS[1]`, the holder token as
//! `ARGV[1]` and, where a lease is touched, the lease in milliseconds as
//! `ARGV[2]`. Reply codes:
//!
//! * acquire: `0` acquired or reentered, otherwise the competing holder's PTTL (>= 1)
//! * release: `1` fully released, `0` reentry count decremented, `-1` not the holder;
//!   a partial reentrant release refreshes the lease unless `ARGV[2]` is `0`
//! * renew: `1` lease refreshed, `0` not the holder
//! * hold: `1` held by the token, `0` otherwise

use once_cell::sync::Lazy;
use redis::Script;

pub const ACQUIRE_LUA: &str = r#"
local key = KEYS[1]
local token = ARGV[1]
local ttl = tonumber(ARGV[2])

if redis.call('SET', key, token, 'NX', 'PX', ttl) then
    return 0
end

-- same holder refreshes its lease
if redis.call('GET', key) == token then
    redis.call('PEXPIRE', key, ttl)
    return 0
end

local remaining = redis.call('PTTL', key)
if remaining < 1 then
    return 1
end
return remaining
"#;

pub const RELEASE_LUA: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('DEL', KEYS[1])
    return 1
end
return -1
"#;

pub const RENEW_LUA: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('PEXPIRE', KEYS[1], tonumber(ARGV[2]))
    return 1
end
return 0
"#;

pub const HOLD_LUA: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return 1
end
return 0
"#;

pub const REENTRANT_ACQUIRE_LUA: &str = r#"
local key = KEYS[1]
local token = ARGV[1]
local ttl = tonumber(ARGV[2])

local current = redis.call('HGET', key, 'token')

if not current then
    redis.call('HSET', key, 'token', token, 'count', 1)
    redis.call('PEXPIRE', key, ttl)
    return 0
end

if current == token then
    redis.call('HINCRBY', key, 'count', 1)
    redis.call('PEXPIRE', key, ttl)
    return 0
end

local remaining = redis.call('PTTL', key)
if remaining < 1 then
    return 1
end
return remaining
"#;

pub const REENTRANT_RELEASE_LUA: &str = r#"
local key = KEYS[1]
local token = ARGV[1]
local ttl = tonumber(ARGV[2])

if redis.call('HGET', key, 'token') ~= token then
    return -1
end

local counter = redis.call('HINCRBY', key, 'count', -1)
if counter > 0 then
    if ttl > 0 then
        redis.call('PEXPIRE', key, ttl)
    end
    return 0
end

redis.call('DEL', key)
return 1
"#;

pub const REENTRANT_RENEW_LUA: &str = r#"
if redis.call('HGET', KEYS[1], 'token') == ARGV[1] then
    redis.call('PEXPIRE', KEYS[1], tonumber(ARGV[2]))
    return 1
end
return 0
"#;

pub const REENTRANT_HOLD_LUA: &str = r#"
if redis.call('HGET', KEYS[1], 'token') == ARGV[1] then
    return 1
end
return 0
"#;

pub static ACQUIRE_SCRIPT: Lazy<Script> = Lazy::new(|| Script::new(ACQUIRE_LUA));
pub static RELEASE_SCRIPT: Lazy<Script> = Lazy::new(|| Script::new(RELEASE_LUA));
pub static RENEW_SCRIPT: Lazy<Script> = Lazy::new(|| Script::new(RENEW_LUA));
pub static HOLD_SCRIPT: Lazy<Script> = Lazy::new(|| Script::new(HOLD_LUA));
pub static REENTRANT_ACQUIRE_SCRIPT: Lazy<Script> = Lazy::new(|| Script::new(REENTRANT_ACQUIRE_LUA));
pub static REENTRANT_RELEASE_SCRIPT: Lazy<Script> = Lazy::new(|| Script::new(REENTRANT_RELEASE_LUA));
pub static REENTRANT_RENEW_SCRIPT: Lazy<Script> = Lazy::new(|| Script::new(REENTRANT_RENEW_LUA));
pub static REENTRANT_HOLD_SCRIPT: Lazy<Script> = Lazy::new(|| Script::new(REENTRANT_HOLD_LUA));

/// Selects one of the atomic primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockScript {
    Acquire,
    Release,
    Renew,
    Hold,
    ReentrantAcquire,
    ReentrantRelease,
    ReentrantRenew,
    ReentrantHold,
}

impl LockScript {
    pub fn acquire(reentry: bool) -> Self {
        if reentry { LockScript::ReentrantAcquire } else { LockScript::Acquire }
    }

    pub fn release(reentry: bool) -> Self {
        if reentry { LockScript::ReentrantRelease } else { LockScript::Release }
    }

    pub fn renew(reentry: bool) -> Self {
        if reentry { LockScript::ReentrantRenew } else { LockScript::Renew }
    }

    pub fn hold(reentry: bool) -> Self {
        if reentry { LockScript::ReentrantHold } else { LockScript::Hold }
    }

    pub fn is_reentrant(&self) -> bool {
        matches!(
            self,
            LockScript::ReentrantAcquire
                | LockScript::ReentrantRelease
                | LockScript::ReentrantRenew
                | LockScript::ReentrantHold
        )
    }

    pub fn body(&self) -> &'static str {
        match self {
            LockScript::Acquire => ACQUIRE_LUA,
            LockScript::Release => RELEASE_LUA,
            LockScript::Renew => RENEW_LUA,
            LockScript::Hold => HOLD_LUA,
            LockScript::ReentrantAcquire => REENTRANT_ACQUIRE_LUA,
            LockScript::ReentrantRelease => REENTRANT_RELEASE_LUA,
            LockScript::ReentrantRenew => REENTRANT_RENEW_LUA,
            LockScript::ReentrantHold => REENTRANT_HOLD_LUA,
        }
    }

    pub fn script(&self) -> &'static Script {
        match self {
            LockScript::Acquire => &ACQUIRE_SCRIPT,
            LockScript::Release => &RELEASE_SCRIPT,
            LockScript::Renew => &RENEW_SCRIPT,
            LockScript::Hold => &HOLD_SCRIPT,
            LockScript::ReentrantAcquire => &REENTRANT_ACQUIRE_SCRIPT,
            LockScript::ReentrantRelease => &REENTRANT_RELEASE_SCRIPT,
            LockScript::ReentrantRenew => &REENTRANT_RENEW_SCRIPT,
            LockScript::ReentrantHold => &REENTRANT_HOLD_SCRIPT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_selection() {
        assert_eq!(LockScript::acquire(true), LockScript::ReentrantAcquire);
        assert_eq!(LockScript::acquire(false), LockScript::Acquire);
        assert_eq!(LockScript::release(true), LockScript::ReentrantRelease);
        assert_eq!(LockScript::renew(false), LockScript::Renew);
        assert!(LockScript::hold(true).is_reentrant());
        assert!(!LockScript::hold(false).is_reentrant());
    }

    #[test]
    fn test_scripts_hashed_from_bodies() {
        for script in [LockScript::Acquire, LockScript::ReentrantRelease, LockScript::Renew] {
            assert_eq!(script.script().get_hash(), Script::new(script.body()).get_hash());
        }
        assert_ne!(ACQUIRE_SCRIPT.get_hash(), REENTRANT_ACQUIRE_SCRIPT.get_hash());
    }
}
