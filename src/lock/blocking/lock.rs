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
use crate::config::{LockOptions, RedisClientOptions};
use crate::connection::{LockStore, SyncRedisStore};
use crate::errors::{LockError, LockResult};
use crate::lock::{lock_args, CancelToken, LockOutcome, LockWatchdog, ReleaseOutcome};
use crate::scripts::LockScript;
use crate::util::{generate_token, get_random_string};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// === RLock (Redis lock handle) ===
///
/// Binds a key and a holder token to one store. With reentry enabled (the
/// default) the record is a hash carrying the token and a depth counter, so
/// the same token may acquire repeatedly and must release as many times.
/// Without reentry the record is a plain string key holding the token.
pub struct RLock {
    store: Arc<dyn LockStore>,
    key: String,
    token: String,
    options: LockOptions,
    watchdog_running: Arc<AtomicBool>,
    watchdog: Mutex<Option<LockWatchdog>>,
}

impl RLock {
    /// New handle with a fresh token; an empty key becomes a random one.
    pub fn new(store: Arc<dyn LockStore>, key: &str) -> Self {
        let key = if key.is_empty() {
            get_random_string(10)
        } else {
            key.to_string()
        };

        Self {
            store,
            key,
            token: generate_token(),
            options: LockOptions::default(),
            watchdog_running: Arc::new(AtomicBool::new(false)),
            watchdog: Mutex::new(None),
        }
    }

    /// Like [`RLock::new`], failing when the store does not answer a ping.
    pub fn connect(store: Arc<dyn LockStore>, key: &str) -> LockResult<Self> {
        store.ping()?;
        Ok(Self::new(store, key))
    }

    pub fn from_options(options: &RedisClientOptions, key: &str) -> LockResult<Self> {
        let store = SyncRedisStore::new(options)?;
        Ok(Self::new(Arc::new(store), key))
    }

    pub fn with_key(mut self, key: &str) -> Self {
        if !key.is_empty() {
            self.key = key.to_string();
        }
        self
    }

    pub fn with_token(mut self, token: &str) -> Self {
        if !token.is_empty() {
            self.token = token.to_string();
        }
        self
    }

    pub fn with_expire_time(mut self, expire_time: Duration) -> Self {
        self.options.expire_time = expire_time;
        self
    }

    pub fn with_block_waiting_time(mut self, block_waiting_time: Duration) -> Self {
        self.options.block_waiting_time = block_waiting_time;
        self
    }

    pub fn with_watchdog(mut self, watchdog_switch: bool) -> Self {
        self.options.watchdog_switch = watchdog_switch;
        self
    }

    pub fn with_reentry(mut self, reentry: bool) -> Self {
        self.options.reentry = reentry;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.options.poll_interval = poll_interval;
        self
    }

    pub fn with_options(mut self, options: LockOptions) -> Self {
        self.options = options;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    pub fn expire_time(&self) -> Duration {
        self.options.expire_time
    }

    pub fn block_waiting_time(&self) -> Duration {
        self.options.block_waiting_time
    }

    pub fn watchdog_switch(&self) -> bool {
        self.options.watchdog_switch
    }

    pub fn is_reentry(&self) -> bool {
        self.options.reentry
    }

    /// Attempts the acquire script once.
    pub fn try_lock(&self) -> LockResult<LockOutcome> {
        let reply = self
            .store
            .eval(
                LockScript::acquire(self.options.reentry),
                &[self.key.as_str()],
                &lock_args(&self.token, self.options.expire_millis()),
            )
            .map_err(|e| {
                error!("Try lock {} failed: {}", self.key, e);
                e
            })?;

        let outcome = LockOutcome::from_reply(reply)?;
        match outcome {
            LockOutcome::Acquired => self.start_watchdog(),
            LockOutcome::Contended { remaining } => {
                debug!("Lock {} held by another holder for {:?}", self.key, remaining);
            }
        }
        Ok(outcome)
    }

    /// Acquires, polling until `block_waiting_time` elapses.
    pub fn lock(&self) -> LockResult<LockOutcome> {
        self.lock_with_cancel(&CancelToken::new())
    }

    /// Polls every `poll_interval` until acquired, cancelled or out of time.
    ///
    /// Once the block waiting time is spent one last attempt is made and its
    /// outcome returned as is. Cancellation is checked before the deadline,
    /// so it wins when both fire on the same tick. A store error ends the
    /// wait immediately.
    pub fn lock_with_cancel(&self, cancel: &CancelToken) -> LockResult<LockOutcome> {
        let outcome = self.try_lock()?;
        if outcome.is_acquired() {
            return Ok(outcome);
        }

        // no deadline when the wait is too long to represent
        let deadline = Instant::now().checked_add(self.options.block_waiting_time);
        let poll_interval = self.options.poll_interval.max(Duration::from_millis(1));
        loop {
            if cancel.wait_timeout(poll_interval) {
                debug!("Lock {} wait cancelled", self.key);
                return Err(LockError::Cancelled);
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return self.try_lock();
            }

            let outcome = self.try_lock()?;
            if outcome.is_acquired() {
                return Ok(outcome);
            }
        }
    }

    /// Runs the release script once; a full release stops the watchdog.
    pub fn unlock(&self) -> LockResult<ReleaseOutcome> {
        let reply = self
            .store
            .eval(
                LockScript::release(self.options.reentry),
                &[self.key.as_str()],
                &lock_args(&self.token, self.options.expire_millis()),
            )
            .map_err(|e| {
                error!("Release lock {} failed: {}", self.key, e);
                e
            })?;

        let outcome = ReleaseOutcome::from_reply(reply)?;
        match outcome {
            ReleaseOutcome::Released => self.stop_watchdog(),
            ReleaseOutcome::Decremented => {}
            ReleaseOutcome::NotHeld => debug!("Lock {} is not held by {}", self.key, self.token),
        }
        Ok(outcome)
    }

    /// Whether this token currently holds the lock. Does not touch the lease.
    pub fn hold_lock(&self) -> LockResult<bool> {
        let reply = self.store.eval(
            LockScript::hold(self.options.reentry),
            &[self.key.as_str()],
            &lock_args(&self.token, self.options.expire_millis()),
        )?;
        Ok(reply == 1)
    }

    /// Whether anyone holds the lock.
    pub fn is_locked(&self) -> LockResult<bool> {
        Ok(self.store.pttl(&self.key)? != -2)
    }

    /// Lease left on the record, zero when missing.
    pub fn remaining_time(&self) -> LockResult<Duration> {
        let ttl_ms = self.store.pttl(&self.key)?;
        if ttl_ms > 0 {
            Ok(Duration::from_millis(ttl_ms as u64))
        } else {
            Ok(Duration::ZERO)
        }
    }

    pub fn is_watchdog_running(&self) -> bool {
        self.watchdog_running.load(Ordering::SeqCst)
    }

    /// Stops the watchdog and waits for its thread to exit.
    pub fn stop_watchdog(&self) {
        let watchdog = self.watchdog.lock().take();
        if let Some(mut watchdog) = watchdog {
            watchdog.stop();
        }
    }

    fn start_watchdog(&self) {
        if !self.options.watchdog_switch {
            return;
        }
        if self
            .watchdog_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let store = self.store.clone();
        let key = self.key.clone();
        let args = lock_args(&self.token, self.options.expire_millis());
        let script = LockScript::renew(self.options.reentry);

        let watchdog = LockWatchdog::start(self.options.expire_time / 3, self.watchdog_running.clone(), move || {
            Ok(store.eval(script, &[key.as_str()], &args)? == 1)
        });
        debug!("Watchdog started for lock {}", self.key);

        let previous = self.watchdog.lock().replace(watchdog);
        drop(previous);
    }
}
