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
use crate::config::RedisClientOptions;
use crate::connection::LockStore;
use crate::errors::{LockError, LockResult};
use crate::scripts::LockScript;
use r2d2::{Pool, PooledConnection};
use redis::Client;
use std::time::Duration;
use tracing::debug;

type RedisPool = Pool<Client>;

/// Redis store on an r2d2 connection pool.
pub struct SyncRedisStore {
    pool: RedisPool,
    addr: String,
}

impl SyncRedisStore {
    /// Builds the pool and pings the server; an unreachable server is an error.
    pub fn new(options: &RedisClientOptions) -> LockResult<Self> {
        options.validate()?;

        let client = Client::open(options.connection_url())
            .map_err(|e| LockError::ConfigError(e.to_string()))?;
        let pool = Self::build_pool(client, options)?;

        let store = Self {
            pool,
            addr: options.addr.clone(),
        };
        store.ping()?;
        debug!("Connected lock store {}", store.addr);
        Ok(store)
    }

    fn build_pool(client: Client, options: &RedisClientOptions) -> LockResult<RedisPool> {
        Pool::builder()
            .max_size(options.pool_size)
            .min_idle(Some(options.min_idle.min(options.pool_size)))
            .connection_timeout(options.connection_timeout)
            .idle_timeout(Some(options.idle_timeout))
            .test_on_check_out(true)
            .build(client)
            .map_err(|e| LockError::PoolError(e.to_string()))
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn get_connection(&self) -> LockResult<PooledConnection<Client>> {
        Ok(self.pool.get()?)
    }
}

impl LockStore for SyncRedisStore {
    fn eval(&self, script: LockScript, keys: &[&str], args: &[String]) -> LockResult<i64> {
        let mut conn = self.get_connection()?;

        let mut invocation = script.script().prepare_invoke();
        for key in keys {
            invocation.key(*key);
        }
        for arg in args {
            invocation.arg(arg.as_str());
        }

        let reply: i64 = invocation.invoke(&mut *conn)?;
        Ok(reply)
    }

    fn set_nx(&self, key: &str, value: &str, expire: Duration) -> LockResult<bool> {
        let mut conn = self.get_connection()?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg((expire.as_millis() as u64).max(1))
            .query(&mut *conn)?;
        Ok(reply.is_some())
    }

    fn get(&self, key: &str) -> LockResult<Option<String>> {
        let mut conn = self.get_connection()?;
        let value: Option<String> = redis::cmd("GET").arg(key).query(&mut *conn)?;
        Ok(value)
    }

    fn del(&self, key: &str) -> LockResult<bool> {
        let mut conn = self.get_connection()?;
        let deleted: i64 = redis::cmd("DEL").arg(key).query(&mut *conn)?;
        Ok(deleted > 0)
    }

    fn pttl(&self, key: &str) -> LockResult<i64> {
        let mut conn = self.get_connection()?;
        let ttl: i64 = redis::cmd("PTTL").arg(key).query(&mut *conn)?;
        Ok(ttl)
    }

    fn ping(&self) -> LockResult<()> {
        let mut conn = self.get_connection()?;
        let _: String = redis::cmd("PING").query(&mut *conn)?;
        Ok(())
    }
}
