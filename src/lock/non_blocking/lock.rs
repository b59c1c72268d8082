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
use crate::connection::{AsyncLockStore, AsyncRedisStore};
use crate::errors::{LockError, LockResult};
use crate::lock::{lock_args, AsyncLockWatchdog, LockOutcome, ReleaseOutcome};
use crate::scripts::LockScript;
use crate::util::{generate_token, get_random_string};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// === AsyncRLock (Asynchronous Redis lock handle) ===
///
/// Tokio counterpart of [`crate::RLock`]: same records and scripts, with the
/// watchdog running as a spawned task.
pub struct AsyncRLock {
    store: Arc<dyn AsyncLockStore>,
    key: String,
    token: String,
    options: LockOptions,
    watchdog_running: Arc<AtomicBool>,
    watchdog: Mutex<Option<AsyncLockWatchdog>>,
}

impl AsyncRLock {
    /// New handle with a fresh token; an empty key becomes a random one.
    pub fn new(store: Arc<dyn AsyncLockStore>, key: &str) -> Self {
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

    /// Like [`AsyncRLock::new`], failing when the store does not answer a ping.
    pub async fn connect(store: Arc<dyn AsyncLockStore>, key: &str) -> LockResult<Self> {
        store.ping().await?;
        Ok(Self::new(store, key))
    }

    pub async fn from_options(options: &RedisClientOptions, key: &str) -> LockResult<Self> {
        let store = AsyncRedisStore::new(options).await?;
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
    pub async fn try_lock(&self) -> LockResult<LockOutcome> {
        let reply = self
            .store
            .eval(
                LockScript::acquire(self.options.reentry),
                &[self.key.as_str()],
                &lock_args(&self.token, self.options.expire_millis()),
            )
            .await
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
    pub async fn lock(&self) -> LockResult<LockOutcome> {
        self.lock_with_cancel(&CancellationToken::new()).await
    }

    /// Polls every `poll_interval` until acquired, cancelled or out of time.
    ///
    /// The deadline triggers one last attempt. When cancellation, deadline
    /// and tick are ready together they are taken in that order.
    pub async fn lock_with_cancel(&self, cancel: &CancellationToken) -> LockResult<LockOutcome> {
        let outcome = self.try_lock().await?;
        if outcome.is_acquired() {
            return Ok(outcome);
        }

        let poll_interval = self.options.poll_interval.max(Duration::from_millis(1));
        // tokio saturates overlong sleeps instead of overflowing
        let deadline = sleep(self.options.block_waiting_time);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Lock {} wait cancelled", self.key);
                    return Err(LockError::Cancelled);
                }
                _ = &mut deadline => return self.try_lock().await,
                _ = sleep(poll_interval) => {
                    let outcome = self.try_lock().await?;
                    if outcome.is_acquired() {
                        return Ok(outcome);
                    }
                }
            }
        }
    }

    /// Runs the release script once; a full release stops the watchdog.
    pub async fn unlock(&self) -> LockResult<ReleaseOutcome> {
        let reply = self
            .store
            .eval(
                LockScript::release(self.options.reentry),
                &[self.key.as_str()],
                &lock_args(&self.token, self.options.expire_millis()),
            )
            .await
            .map_err(|e| {
                error!("Release lock {} failed: {}", self.key, e);
                e
            })?;

        let outcome = ReleaseOutcome::from_reply(reply)?;
        match outcome {
            ReleaseOutcome::Released => self.stop_watchdog().await,
            ReleaseOutcome::Decremented => {}
            ReleaseOutcome::NotHeld => debug!("Lock {} is not held by {}", self.key, self.token),
        }
        Ok(outcome)
    }

    /// Whether this token currently holds the lock. Does not touch the lease.
    pub async fn hold_lock(&self) -> LockResult<bool> {
        let reply = self
            .store
            .eval(
                LockScript::hold(self.options.reentry),
                &[self.key.as_str()],
                &lock_args(&self.token, self.options.expire_millis()),
            )
            .await?;
        Ok(reply == 1)
    }

    /// Whether anyone holds the lock.
    pub async fn is_locked(&self) -> LockResult<bool> {
        Ok(self.store.pttl(&self.key).await? != -2)
    }

    /// Lease left on the record, zero when missing.
    pub async fn remaining_time(&self) -> LockResult<Duration> {
        let ttl_ms = self.store.pttl(&self.key).await?;
        if ttl_ms > 0 {
            Ok(Duration::from_millis(ttl_ms as u64))
        } else {
            Ok(Duration::ZERO)
        }
    }

    pub fn is_watchdog_running(&self) -> bool {
        self.watchdog_running.load(Ordering::SeqCst)
    }

    /// Stops the watchdog and waits for its task to exit.
    pub async fn stop_watchdog(&self) {
        let watchdog = self.watchdog.lock().take();
        if let Some(mut watchdog) = watchdog {
            watchdog.stop().await;
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
        let key = Arc::new(self.key.clone());
        let args = Arc::new(lock_args(&self.token, self.options.expire_millis()));
        let script = LockScript::renew(self.options.reentry);

        let watchdog = AsyncLockWatchdog::start(self.options.expire_time / 3, self.watchdog_running.clone(), move || {
            let store = store.clone();
            let key = key.clone();
            let args = args.clone();
            async move { Ok(store.eval(script, &[key.as_str()], &args).await? == 1) }
        });
        debug!("Watchdog started for lock {}", self.key);

        let previous = self.watchdog.lock().replace(watchdog);
        drop(previous);
    }
}
