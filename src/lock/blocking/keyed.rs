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
use crate::config::{LockType, Param};
use crate::connection::{LockStore, SyncRedisStore};
use crate::errors::LockResult;
use crate::lock::lock_args;
use crate::scripts::LockScript;
use crate::util::num_milliseconds;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// Stateless lock operations where the caller supplies key and value per call.
///
/// `Distributed` keeps a plain string key written with `SET NX PX`;
/// `Reentry` keeps the `token`/`count` hash so one value may stack acquisitions.
pub struct RedisLock {
    store: Arc<dyn LockStore>,
    lock_type: LockType,
}

impl RedisLock {
    pub fn new(store: Arc<dyn LockStore>, lock_type: LockType) -> Self {
        Self { store, lock_type }
    }

    /// Connects to the first address of `param`.
    pub fn from_param(param: &Param) -> LockResult<Self> {
        let options = param.client_options()?;
        let store = SyncRedisStore::new(&options)?;
        Ok(Self::new(Arc::new(store), param.lock_type))
    }

    pub fn lock_type(&self) -> LockType {
        self.lock_type
    }

    /// True when `value` now holds `key`.
    pub fn try_lock(&self, key: &str, value: &str, expiration: Duration) -> LockResult<bool> {
        match self.lock_type {
            LockType::Distributed => self.store.set_nx(key, value, expiration),
            LockType::Reentry => {
                let reply = self.store.eval(
                    LockScript::ReentrantAcquire,
                    &[key],
                    &lock_args(value, num_milliseconds(&expiration).max(1)),
                )?;
                Ok(reply == 0)
            }
        }
    }

    /// True only when the record was removed; a reentrant holder with depth
    /// left gets false.
    pub fn release_lock(&self, key: &str, value: &str) -> LockResult<bool> {
        let script = match self.lock_type {
            LockType::Distributed => LockScript::Release,
            LockType::Reentry => LockScript::ReentrantRelease,
        };
        // zero keeps the current lease when reentrant depth remains
        let reply = self.store.eval(script, &[key], &lock_args(value, 0))?;
        Ok(reply == 1)
    }

    /// Store errors are logged and read as not held.
    pub fn hold_lock(&self, key: &str, value: &str) -> bool {
        let held = match self.lock_type {
            LockType::Distributed => self
                .store
                .get(key)
                .map(|current| current.as_deref() == Some(value)),
            LockType::Reentry => self
                .store
                .eval(LockScript::ReentrantHold, &[key], &lock_args(value, 0))
                .map(|reply| reply == 1),
        };

        held.unwrap_or_else(|e| {
            error!("Check hold lock {} failed: {}", key, e);
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MemoryStore;
    use std::thread;

    #[test]
    fn test_distributed_lock_cycle() {
        let store = Arc::new(MemoryStore::new());
        let lock = RedisLock::new(store.clone(), LockType::Distributed);

        assert!(lock.try_lock("k", "a", Duration::from_secs(5)).unwrap());
        assert!(!lock.try_lock("k", "b", Duration::from_secs(5)).unwrap());
        assert!(!lock.try_lock("k", "a", Duration::from_secs(5)).unwrap());

        assert!(lock.hold_lock("k", "a"));
        assert!(!lock.hold_lock("k", "b"));

        assert!(!lock.release_lock("k", "b").unwrap());
        assert!(lock.release_lock("k", "a").unwrap());
        assert!(!store.exists("k"));
        assert!(!lock.hold_lock("k", "a"));
    }

    #[test]
    fn test_distributed_lock_expires() {
        let store = Arc::new(MemoryStore::new());
        let lock = RedisLock::new(store, LockType::Distributed);

        assert!(lock.try_lock("k", "a", Duration::from_millis(50)).unwrap());
        thread::sleep(Duration::from_millis(100));
        assert!(lock.try_lock("k", "b", Duration::from_secs(5)).unwrap());
    }

    #[test]
    fn test_reentry_lock_stacks() {
        let store = Arc::new(MemoryStore::new());
        let lock = RedisLock::new(store.clone(), LockType::Reentry);

        assert!(lock.try_lock("k", "a", Duration::from_secs(5)).unwrap());
        assert!(lock.try_lock("k", "a", Duration::from_secs(5)).unwrap());
        assert!(!lock.try_lock("k", "b", Duration::from_secs(5)).unwrap());
        assert_eq!(store.hold_count("k"), Some(2));

        assert!(lock.hold_lock("k", "a"));
        assert!(!lock.release_lock("k", "b").unwrap());
        assert!(!lock.release_lock("k", "a").unwrap());
        assert!(lock.hold_lock("k", "a"));
        assert!(lock.release_lock("k", "a").unwrap());
        assert!(!store.exists("k"));
    }

    #[test]
    fn test_reentry_partial_release_keeps_lease() {
        let store = Arc::new(MemoryStore::new());
        let lock = RedisLock::new(store.clone(), LockType::Reentry);

        assert!(lock.try_lock("k", "a", Duration::from_millis(400)).unwrap());
        assert!(lock.try_lock("k", "a", Duration::from_millis(400)).unwrap());

        thread::sleep(Duration::from_millis(300));
        assert!(!lock.release_lock("k", "a").unwrap());

        let ttl_ms = store.pttl("k").unwrap();
        assert!(ttl_ms > 0 && ttl_ms <= 100, "lease was refreshed to {}ms", ttl_ms);
    }

    #[test]
    fn test_hold_lock_reports_false_on_store_error() {
        let store = Arc::new(MemoryStore::new());
        let lock = RedisLock::new(store.clone(), LockType::Reentry);

        assert!(lock.try_lock("k", "a", Duration::from_secs(5)).unwrap());
        store.set_available(false);
        assert!(!lock.hold_lock("k", "a"));
        assert!(lock.try_lock("k", "a", Duration::from_secs(5)).is_err());
    }
}
