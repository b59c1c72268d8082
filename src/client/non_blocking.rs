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
use crate::errors::LockResult;
use crate::lock::{AsyncRLock, AsyncRedLock};
use std::sync::Arc;
use std::time::Duration;

/// Asynchronous client: one store shared by every lock it hands out.
pub struct AsyncLockClient {
    store: Arc<dyn AsyncLockStore>,
    lock_options: LockOptions,
}

impl AsyncLockClient {
    pub async fn new(options: &RedisClientOptions) -> LockResult<Self> {
        let store = AsyncRedisStore::new(options).await?;
        Ok(Self::from_store(Arc::new(store)))
    }

    pub fn from_store(store: Arc<dyn AsyncLockStore>) -> Self {
        Self {
            store,
            lock_options: LockOptions::default(),
        }
    }

    pub fn with_lock_options(mut self, lock_options: LockOptions) -> LockResult<Self> {
        lock_options.validate()?;
        self.lock_options = lock_options;
        Ok(self)
    }

    pub fn get_store(&self) -> &Arc<dyn AsyncLockStore> {
        &self.store
    }

    pub fn lock_options(&self) -> &LockOptions {
        &self.lock_options
    }

    pub async fn ping(&self) -> LockResult<()> {
        self.store.ping().await
    }

    pub fn get_lock(&self, key: &str) -> AsyncRLock {
        AsyncRLock::new(self.store.clone(), key).with_options(self.lock_options.clone())
    }

    pub async fn get_red_lock(clients: &[&AsyncLockClient], key: &str, expire_time: Duration) -> LockResult<AsyncRedLock> {
        let stores = clients.iter().map(|client| client.store.clone()).collect();
        AsyncRedLock::new(stores, key, expire_time).await
    }
}
