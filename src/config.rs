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
use serde::{Deserialize, Serialize};
use std::time::Duration;
use crate::errors::{LockError, LockResult};

/// Connection settings for one redis server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisClientOptions {
    /// `host:port` or a full `redis://` / `rediss://` url
    pub addr: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Database number
    pub database: Option<i64>,
    /// Maximum number of pooled connections
    pub pool_size: u32,
    /// Connections kept idle in the pool
    pub min_idle: u32,
    /// Connection establishment timeout
    pub connection_timeout: Duration,
    /// Idle connections older than this are closed
    pub idle_timeout: Duration,
}

impl Default for RedisClientOptions {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:6379".to_string(),
            username: None,
            password: None,
            database: None,
            pool_size: 15,
            min_idle: 10,
            connection_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

impl RedisClientOptions {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> LockResult<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }

    pub fn with_database(mut self, db: i64) -> Self {
        self.database = Some(db);
        self
    }

    pub fn with_pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    pub fn with_min_idle(mut self, min_idle: u32) -> Self {
        self.min_idle = min_idle;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn validate(&self) -> LockResult<()> {
        if self.addr.trim().is_empty() {
            return Err(LockError::ConfigError("Redis address cannot be empty".to_string()));
        }
        if self.pool_size == 0 {
            return Err(LockError::ConfigError("Pool size cannot be zero".to_string()));
        }
        Ok(())
    }

    /// Connection url understood by `redis::Client::open`.
    pub fn connection_url(&self) -> String {
        if self.addr.starts_with("redis://")
            || self.addr.starts_with("rediss://")
            || self.addr.starts_with("unix://")
        {
            return self.addr.clone();
        }

        let auth = match (&self.username, &self.password) {
            (Some(user), Some(password)) => format!("{}:{}@", user, password),
            (None, Some(password)) => format!(":{}@", password),
            (Some(user), None) => format!("{}@", user),
            (None, None) => String::new(),
        };
        let db = self.database.map(|db| format!("/{}", db)).unwrap_or_default();

        format!("redis://{}{}{}", auth, self.addr, db)
    }
}

/// Timing and behaviour of a single lock handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockOptions {
    /// Lease of the lock record
    pub expire_time: Duration,
    /// How long `lock` keeps polling before its final attempt
    pub block_waiting_time: Duration,
    /// Renew the lease in the background while held
    pub watchdog_switch: bool,
    /// Hash record with a reentry counter instead of a plain string key
    pub reentry: bool,
    /// Tick of the blocking poll loop
    pub poll_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            expire_time: Duration::from_secs(30),
            block_waiting_time: Duration::from_secs(60),
            watchdog_switch: false,
            reentry: true,
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl LockOptions {
    pub fn from_json(json: &str) -> LockResult<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn with_expire_time(mut self, expire_time: Duration) -> Self {
        self.expire_time = expire_time;
        self
    }

    pub fn with_block_waiting_time(mut self, block_waiting_time: Duration) -> Self {
        self.block_waiting_time = block_waiting_time;
        self
    }

    pub fn with_watchdog(mut self, watchdog_switch: bool) -> Self {
        self.watchdog_switch = watchdog_switch;
        self
    }

    pub fn with_reentry(mut self, reentry: bool) -> Self {
        self.reentry = reentry;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn validate(&self) -> LockResult<()> {
        if self.expire_time.as_millis() == 0 {
            return Err(LockError::ConfigError("Expire time must be at least one millisecond".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(LockError::ConfigError("Poll interval cannot be zero".to_string()));
        }
        Ok(())
    }

    /// Lease in whole milliseconds, never zero.
    pub(crate) fn expire_millis(&self) -> u64 {
        u64::try_from(self.expire_time.as_millis()).unwrap_or(u64::MAX).max(1)
    }
}

/// Record layout used by [`crate::RedisLock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockType {
    /// Plain `SET NX` string key
    Distributed,
    /// Hash with `token` and `count` fields
    Reentry,
}

/// Settings for the keyed [`crate::RedisLock`] facade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub addr: Vec<String>,
    pub password: Option<String>,
    pub timeout: Duration,
    pub lock_type: LockType,
}

impl Param {
    pub fn new(addr: Vec<String>, lock_type: LockType) -> Self {
        Self {
            addr,
            password: None,
            timeout: Duration::from_secs(5),
            lock_type,
        }
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Options of the first configured server.
    pub fn client_options(&self) -> LockResult<RedisClientOptions> {
        let addr = self
            .addr
            .first()
            .ok_or_else(|| LockError::ConfigError("No redis address provided".to_string()))?;

        let mut options = RedisClientOptions::new(addr).with_connection_timeout(self.timeout);
        options.password = self.password.clone();
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_url() {
        assert_eq!(RedisClientOptions::new("127.0.0.1:6379").connection_url(), "redis://127.0.0.1:6379");

        let options = RedisClientOptions::new("10.0.0.1:7001")
            .with_password("secret")
            .with_database(2);
        assert_eq!(options.connection_url(), "redis://:secret@10.0.0.1:7001/2");

        let options = RedisClientOptions::new("rediss://cache.internal:6380/1").with_password("ignored");
        assert_eq!(options.connection_url(), "rediss://cache.internal:6380/1");
    }

    #[test]
    fn test_lock_options_from_json() {
        let options = LockOptions::from_json(
            r#"{"expire_time": {"secs": 5, "nanos": 0}, "watchdog_switch": true}"#,
        )
        .unwrap();

        assert_eq!(options.expire_time, Duration::from_secs(5));
        assert!(options.watchdog_switch);
        assert!(options.reentry);
        assert_eq!(options.block_waiting_time, Duration::from_secs(60));
        assert_eq!(options.poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_invalid_options() {
        let err = LockOptions::from_json(r#"{"expire_time": {"secs": 0, "nanos": 0}}"#).unwrap_err();
        assert!(matches!(err, LockError::ConfigError(_)));

        let err = RedisClientOptions::from_json(r#"{"addr": "", "pool_size": 3}"#).unwrap_err();
        assert!(matches!(err, LockError::ConfigError(_)));

        assert!(matches!(
            LockOptions::from_json("not json"),
            Err(LockError::SerializationError(_))
        ));
    }

    #[test]
    fn test_param_client_options() {
        let param = Param::new(vec!["127.0.0.1:6379".to_string()], LockType::Reentry)
            .with_password("pw")
            .with_timeout(Duration::from_millis(100));
        let options = param.client_options().unwrap();
        assert_eq!(options.password.as_deref(), Some("pw"));
        assert_eq!(options.connection_timeout, Duration::from_millis(100));

        let empty = Param::new(Vec::new(), LockType::Distributed);
        assert!(empty.client_options().is_err());
    }
}
