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
use deadpool::managed::{Metrics, Object, Pool, RecycleError, RecycleResult};
use deadpool::Runtime;
use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError};
use std::time::Duration;
use tracing::debug;

use crate::config::RedisClientOptions;
use crate::connection::AsyncLockStore;
use crate::errors::{LockError, LockResult};
use crate::scripts::LockScript;

type AsyncRedisPool = Pool<AsyncRedisConnectionManager>;

/// Hands out multiplexed connections to the deadpool pool.
pub struct AsyncRedisConnectionManager {
    client: Client,
}

impl AsyncRedisConnectionManager {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl deadpool::managed::Manager for AsyncRedisConnectionManager {
    type Type = MultiplexedConnection;
    type Error = RedisError;

    async fn create(&self) -> Result<MultiplexedConnection, RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    async fn recycle(&self, conn: &mut MultiplexedConnection, _metrics: &Metrics) -> RecycleResult<RedisError> {
        let pong: String = redis::cmd("PING").query_async(conn).await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(RecycleError::Message("Invalid PONG response".into()))
        }
    }
}

/// Redis store on a deadpool connection pool.
pub struct AsyncRedisStore {
    pool: AsyncRedisPool,
    addr: String,
}

impl AsyncRedisStore {
    /// Builds the pool and pings the server; an unreachable server is an error.
    pub async fn new(options: &RedisClientOptions) -> LockResult<Self> {
        options.validate()?;

        let client = Client::open(options.connection_url())
            .map_err(|e| LockError::ConfigError(e.to_string()))?;
        let pool = Pool::builder(AsyncRedisConnectionManager::new(client))
            .max_size(options.pool_size as usize)
            .wait_timeout(Some(options.connection_timeout))
            .create_timeout(Some(options.connection_timeout))
            .recycle_timeout(Some(options.connection_timeout))
            .runtime(Runtime::Tokio1)
            .build()?;

        let store = Self {
            pool,
            addr: options.addr.clone(),
        };
        store.ping().await?;
        debug!("Connected async lock store {}", store.addr);
        Ok(store)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub async fn get_connection(&self) -> LockResult<Object<AsyncRedisConnectionManager>> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait::async_trait]
impl AsyncLockStore for AsyncRedisStore {
    async fn eval(&self, script: LockScript, keys: &[&str], args: &[String]) -> LockResult<i64> {
        let mut conn = self.get_connection().await?;

        let mut invocation = script.script().prepare_invoke();
        for key in keys {
            invocation.key(*key);
        }
        for arg in args {
            invocation.arg(arg.as_str());
        }

        let reply: i64 = invocation.invoke_async(&mut *conn).await?;
        Ok(reply)
    }

    async fn set_nx(&self, key: &str, value: &str, expire: Duration) -> LockResult<bool> {
        let mut conn = self.get_connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg((expire.as_millis() as u64).max(1))
            .query_async(&mut *conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> LockResult<Option<String>> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut *conn).await?;
        Ok(value)
    }

    async fn del(&self, key: &str) -> LockResult<bool> {
        let mut conn = self.get_connection().await?;
        let deleted: i64 = redis::cmd("DEL").arg(key).query_async(&mut *conn).await?;
        Ok(deleted > 0)
    }

    async fn pttl(&self, key: &str) -> LockResult<i64> {
        let mut conn = self.get_connection().await?;
        let ttl: i64 = redis::cmd("PTTL").arg(key).query_async(&mut *conn).await?;
        Ok(ttl)
    }

    async fn ping(&self) -> LockResult<()> {
        let mut conn = self.get_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::get_random_string;

    #[tokio::test]
    async fn test_unreachable_server() {
        let options = RedisClientOptions::new("127.0.0.1:1")
            .with_connection_timeout(Duration::from_millis(200));
        assert!(AsyncRedisStore::new(&options).await.is_err());
    }

    #[tokio::test]
    #[ignore = "requires a redis server on 127.0.0.1:6379"]
    async fn test_plain_scripts() {
        let store = AsyncRedisStore::new(&RedisClientOptions::new("127.0.0.1:6379")).await.unwrap();
        let key = format!("rlock:test:{}", get_random_string(8));
        let args = vec!["holder".to_string(), "5000".to_string()];

        assert_eq!(store.eval(LockScript::Acquire, &[&key], &args).await.unwrap(), 0);
        assert_eq!(store.eval(LockScript::Hold, &[&key], &args).await.unwrap(), 1);
        assert_eq!(store.eval(LockScript::Renew, &[&key], &args).await.unwrap(), 1);
        assert_eq!(store.eval(LockScript::Release, &[&key], &args).await.unwrap(), 1);
        assert_eq!(store.get(&key).await.unwrap(), None);
    }
}
