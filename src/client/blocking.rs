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
use crate::config::{LockOptions, LockType, RedisClientOptions};
use crate::connection::{LockStore, SyncRedisStore};
use crate::errors::LockResult;
use crate::lock::{RLock, RedLock, RedisLock};
use std::sync::Arc;
use std::time::Duration;

/// Synchronous client: one store shared by every lock it hands out.
pub struct LockClient {
    store: Arc<dyn LockStore>,
    lock_options: LockOptions,
}

impl LockClient {
    pub fn new(options: &RedisClientOptions) -> LockResult<Self> {
        let store = SyncRedisStore::new(options)?;
        Ok(Self::from_store(Arc::new(store)))
    }

    pub fn from_store(store: Arc<dyn LockStore>) -> Self {
        Self {
            store,
            lock_options: LockOptions::default(),
        }
    }

    /// Options applied to every lock created afterwards.
    pub fn with_lock_options(mut self, lock_options: LockOptions) -> LockResult<Self> {
        lock_options.validate()?;
        self.lock_options = lock_options;
        Ok(self)
    }

    pub fn get_store(&self) -> &Arc<dyn LockStore> {
        &self.store
    }

    pub fn lock_options(&self) -> &LockOptions {
        &self.lock_options
    }

    pub fn ping(&self) -> LockResult<()> {
        self.store.ping()
    }

    pub fn get_lock(&self, key: &str) -> RLock {
        RLock::new(self.store.clone(), key).with_options(self.lock_options.clone())
    }

    pub fn get_keyed_lock(&self, lock_type: LockType) -> RedisLock {
        RedisLock::new(self.store.clone(), lock_type)
    }

    /// Quorum lock over the stores of several clients.
    pub fn get_red_lock(clients: &[&LockClient], key: &str, expire_time: Duration) -> LockResult<RedLock> {
        let stores = clients.iter().map(|client| client.store.clone()).collect();
        RedLock::new(stores, key, expire_time)
    }
}
