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
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::connection::LockStore;
use crate::errors::{LockError, LockResult};
use crate::scripts::LockScript;

enum RecordValue {
    Plain(String),
    Hash { token: String, count: i64 },
}

struct Record {
    value: RecordValue,
    expires_at: Option<Instant>,
}

impl Record {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    fn pttl(&self, now: Instant) -> i64 {
        match self.expires_at {
            Some(at) => at.saturating_duration_since(now).as_millis() as i64,
            None => -1,
        }
    }

    /// Reply of an acquire script that lost to this record.
    fn contended_reply(&self, now: Instant) -> i64 {
        self.pttl(now).max(1)
    }
}

/// In-process store that evaluates the lock scripts atomically under one mutex.
///
/// Expiry follows the monotonic clock with millisecond leases. A store can be
/// switched off with [`MemoryStore::set_available`] and slowed down with
/// [`MemoryStore::set_latency`].
pub struct MemoryStore {
    name: String,
    records: Mutex<HashMap<String, Record>>,
    available: AtomicBool,
    latency: Mutex<Duration>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::named("memory")
    }

    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            records: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            latency: Mutex::new(Duration::ZERO),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// While unavailable every call fails with [`LockError::StoreUnavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Delay applied before every call.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn latency(&self) -> Duration {
        *self.latency.lock()
    }

    pub fn exists(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut records = self.records.lock();
        Self::live(&mut records, key, now).is_some()
    }

    /// Reentry depth of a hash record.
    pub fn hold_count(&self, key: &str) -> Option<i64> {
        let now = Instant::now();
        let mut records = self.records.lock();
        match Self::live(&mut records, key, now) {
            Some(Record { value: RecordValue::Hash { count, .. }, .. }) => Some(*count),
            _ => None,
        }
    }

    /// Number of unexpired keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let records = self.records.lock();
        records.values().filter(|record| !record.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn check_available(&self) -> LockResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LockError::StoreUnavailable(self.name.clone()))
        }
    }

    fn before_call(&self) -> LockResult<()> {
        let latency = self.latency();
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        self.check_available()
    }

    fn live<'a>(records: &'a mut HashMap<String, Record>, key: &str, now: Instant) -> Option<&'a mut Record> {
        if records.get(key).is_some_and(|record| record.is_expired(now)) {
            records.remove(key);
        }
        records.get_mut(key)
    }

    fn wrong_type() -> LockError {
        LockError::ScriptError("WRONGTYPE Operation against a key holding the wrong kind of value".to_string())
    }

    fn token_arg(args: &[String]) -> LockResult<&str> {
        args.first()
            .map(String::as_str)
            .ok_or_else(|| LockError::ScriptError("missing token argument".to_string()))
    }

    fn ttl_arg(args: &[String]) -> LockResult<Duration> {
        let raw = args
            .get(1)
            .ok_or_else(|| LockError::ScriptError("missing expire argument".to_string()))?;
        let millis: u64 = raw
            .parse()
            .map_err(|_| LockError::ScriptError(format!("invalid expire argument: {}", raw)))?;
        Ok(Duration::from_millis(millis))
    }

    pub(crate) fn eval_now(&self, script: LockScript, keys: &[&str], args: &[String]) -> LockResult<i64> {
        let key = *keys
            .first()
            .ok_or_else(|| LockError::ScriptError("missing key".to_string()))?;
        let token = Self::token_arg(args)?;
        let now = Instant::now();
        let mut records = self.records.lock();

        match script {
            LockScript::Acquire => {
                let ttl = Self::ttl_arg(args)?;
                match Self::live(&mut records, key, now) {
                    None => {
                        records.insert(key.to_string(), Record {
                            value: RecordValue::Plain(token.to_string()),
                            expires_at: now.checked_add(ttl),
                        });
                        Ok(0)
                    }
                    Some(record) => match &record.value {
                        RecordValue::Plain(current) if current == token => {
                            record.expires_at = now.checked_add(ttl);
                            Ok(0)
                        }
                        RecordValue::Plain(_) => Ok(record.contended_reply(now)),
                        RecordValue::Hash { .. } => Err(Self::wrong_type()),
                    },
                }
            }
            LockScript::Release => {
                let held = match Self::live(&mut records, key, now) {
                    Some(Record { value: RecordValue::Plain(current), .. }) => current == token,
                    Some(_) => return Err(Self::wrong_type()),
                    None => false,
                };
                if held {
                    records.remove(key);
                    Ok(1)
                } else {
                    Ok(-1)
                }
            }
            LockScript::Renew => {
                let ttl = Self::ttl_arg(args)?;
                match Self::live(&mut records, key, now) {
                    Some(record) => match &record.value {
                        RecordValue::Plain(current) if current == token => {
                            record.expires_at = now.checked_add(ttl);
                            Ok(1)
                        }
                        RecordValue::Plain(_) => Ok(0),
                        RecordValue::Hash { .. } => Err(Self::wrong_type()),
                    },
                    None => Ok(0),
                }
            }
            LockScript::Hold => match Self::live(&mut records, key, now) {
                Some(Record { value: RecordValue::Plain(current), .. }) => Ok((current == token) as i64),
                Some(_) => Err(Self::wrong_type()),
                None => Ok(0),
            },
            LockScript::ReentrantAcquire => {
                let ttl = Self::ttl_arg(args)?;
                match Self::live(&mut records, key, now) {
                    None => {
                        records.insert(key.to_string(), Record {
                            value: RecordValue::Hash { token: token.to_string(), count: 1 },
                            expires_at: now.checked_add(ttl),
                        });
                        Ok(0)
                    }
                    Some(record) => {
                        let contended = record.contended_reply(now);
                        match &mut record.value {
                            RecordValue::Hash { token: current, count } if current.as_str() == token => {
                                *count += 1;
                                record.expires_at = now.checked_add(ttl);
                                Ok(0)
                            }
                            RecordValue::Hash { .. } => Ok(contended),
                            RecordValue::Plain(_) => Err(Self::wrong_type()),
                        }
                    }
                }
            }
            LockScript::ReentrantRelease => {
                let ttl = Self::ttl_arg(args)?;
                let remaining = match Self::live(&mut records, key, now) {
                    Some(record) => match &mut record.value {
                        RecordValue::Hash { token: current, count } if current.as_str() == token => {
                            *count -= 1;
                            if *count > 0 && !ttl.is_zero() {
                                record.expires_at = now.checked_add(ttl);
                            }
                            Some(*count)
                        }
                        RecordValue::Hash { .. } => None,
                        RecordValue::Plain(_) => return Err(Self::wrong_type()),
                    },
                    None => None,
                };
                match remaining {
                    Some(count) if count > 0 => Ok(0),
                    Some(_) => {
                        records.remove(key);
                        Ok(1)
                    }
                    None => Ok(-1),
                }
            }
            LockScript::ReentrantRenew => {
                let ttl = Self::ttl_arg(args)?;
                match Self::live(&mut records, key, now) {
                    Some(record) => match &record.value {
                        RecordValue::Hash { token: current, .. } if current.as_str() == token => {
                            record.expires_at = now.checked_add(ttl);
                            Ok(1)
                        }
                        RecordValue::Hash { .. } => Ok(0),
                        RecordValue::Plain(_) => Err(Self::wrong_type()),
                    },
                    None => Ok(0),
                }
            }
            LockScript::ReentrantHold => match Self::live(&mut records, key, now) {
                Some(Record { value: RecordValue::Hash { token: current, .. }, .. }) => {
                    Ok((current.as_str() == token) as i64)
                }
                Some(_) => Err(Self::wrong_type()),
                None => Ok(0),
            },
        }
    }

    pub(crate) fn set_nx_now(&self, key: &str, value: &str, expire: Duration) -> bool {
        let now = Instant::now();
        let mut records = self.records.lock();
        if Self::live(&mut records, key, now).is_some() {
            return false;
        }
        records.insert(key.to_string(), Record {
            value: RecordValue::Plain(value.to_string()),
            expires_at: now.checked_add(expire.max(Duration::from_millis(1))),
        });
        true
    }

    pub(crate) fn get_now(&self, key: &str) -> LockResult<Option<String>> {
        let now = Instant::now();
        let mut records = self.records.lock();
        match Self::live(&mut records, key, now) {
            Some(Record { value: RecordValue::Plain(value), .. }) => Ok(Some(value.clone())),
            Some(_) => Err(Self::wrong_type()),
            None => Ok(None),
        }
    }

    pub(crate) fn del_now(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut records = self.records.lock();
        if Self::live(&mut records, key, now).is_some() {
            records.remove(key);
            true
        } else {
            false
        }
    }

    pub(crate) fn pttl_now(&self, key: &str) -> i64 {
        let now = Instant::now();
        let mut records = self.records.lock();
        match Self::live(&mut records, key, now) {
            Some(record) => record.pttl(now),
            None => -2,
        }
    }
}

impl LockStore for MemoryStore {
    fn eval(&self, script: LockScript, keys: &[&str], args: &[String]) -> LockResult<i64> {
        self.before_call()?;
        self.eval_now(script, keys, args)
    }

    fn set_nx(&self, key: &str, value: &str, expire: Duration) -> LockResult<bool> {
        self.before_call()?;
        Ok(self.set_nx_now(key, value, expire))
    }

    fn get(&self, key: &str) -> LockResult<Option<String>> {
        self.before_call()?;
        self.get_now(key)
    }

    fn del(&self, key: &str) -> LockResult<bool> {
        self.before_call()?;
        Ok(self.del_now(key))
    }

    fn pttl(&self, key: &str) -> LockResult<i64> {
        self.before_call()?;
        Ok(self.pttl_now(key))
    }

    fn ping(&self) -> LockResult<()> {
        self.before_call()
    }
}

#[cfg(feature = "async")]
#[async_trait::async_trait]
impl crate::connection::AsyncLockStore for MemoryStore {
    async fn eval(&self, script: LockScript, keys: &[&str], args: &[String]) -> LockResult<i64> {
        self.before_call_async().await?;
        self.eval_now(script, keys, args)
    }

    async fn set_nx(&self, key: &str, value: &str, expire: Duration) -> LockResult<bool> {
        self.before_call_async().await?;
        Ok(self.set_nx_now(key, value, expire))
    }

    async fn get(&self, key: &str) -> LockResult<Option<String>> {
        self.before_call_async().await?;
        self.get_now(key)
    }

    async fn del(&self, key: &str) -> LockResult<bool> {
        self.before_call_async().await?;
        Ok(self.del_now(key))
    }

    async fn pttl(&self, key: &str) -> LockResult<i64> {
        self.before_call_async().await?;
        Ok(self.pttl_now(key))
    }

    async fn ping(&self) -> LockResult<()> {
        self.before_call_async().await
    }
}

#[cfg(feature = "async")]
impl MemoryStore {
    async fn before_call_async(&self) -> LockResult<()> {
        let latency = self.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.check_available()
    }
}
