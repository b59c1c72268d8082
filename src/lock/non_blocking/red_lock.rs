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
use crate::connection::{AsyncLockStore, AsyncRedisStore};
use crate::errors::{LockError, LockResult};
use crate::lock::{AsyncRLock, LockOutcome, MIN_REDLOCK_NODES};
use crate::util::{calculate_drift, calculate_quorum, get_random_string};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const DEFAULT_DRIFT_FACTOR: f64 = 0.01;

/// === AsyncRedLock (Asynchronous quorum lock) ===
///
/// Tokio counterpart of [`crate::RedLock`]: members share the key and the
/// token `"{key}_token"` and are tried one after another.
pub struct AsyncRedLock {
    locks: Vec<AsyncRLock>,
    key: String,
    expire_time: Duration,
    drift_factor: f64,
}

impl AsyncRedLock {
    /// Stores that do not answer a ping are skipped.
    pub async fn new(stores: Vec<Arc<dyn AsyncLockStore>>, key: &str, expire_time: Duration) -> LockResult<Self> {
        let key = if key.is_empty() {
            get_random_string(10)
        } else {
            key.to_string()
        };
        let token = format!("{}_token", key);

        let mut locks = Vec::with_capacity(stores.len());
        for (i, store) in stores.into_iter().enumerate() {
            if let Err(e) = store.ping().await {
                warn!("RedLock {} skips unreachable node {}: {}", key, i, e);
                continue;
            }
            locks.push(
                AsyncRLock::new(store, &key)
                    .with_token(&token)
                    .with_expire_time(expire_time)
                    .with_watchdog(true),
            );
        }

        if locks.len() < MIN_REDLOCK_NODES {
            return Err(LockError::NotEnoughNodes {
                available: locks.len(),
                required: MIN_REDLOCK_NODES,
            });
        }

        Ok(Self {
            locks,
            key,
            expire_time,
            drift_factor: DEFAULT_DRIFT_FACTOR,
        })
    }

    /// Connects one pooled store per option set, skipping the ones that fail.
    pub async fn from_options(options: &[RedisClientOptions], key: &str, expire_time: Duration) -> LockResult<Self> {
        let mut stores: Vec<Arc<dyn AsyncLockStore>> = Vec::with_capacity(options.len());
        for option in options {
            match AsyncRedisStore::new(option).await {
                Ok(store) => stores.push(Arc::new(store)),
                Err(e) => warn!("RedLock skips node {}: {}", option.addr, e),
            }
        }
        Self::new(stores, key, expire_time).await
    }

    pub fn with_drift_factor(mut self, drift_factor: f64) -> Self {
        self.drift_factor = drift_factor;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &str {
        self.locks.first().map_or("", |lock| lock.token())
    }

    /// Number of usable members.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    pub fn quorum(&self) -> usize {
        calculate_quorum(self.locks.len())
    }

    /// Longest a single member may take for its grant to count.
    pub fn node_budget(&self) -> Duration {
        self.expire_time / (10 * self.locks.len()) as u32
    }

    /// Members are tried one after another; granted members are kept on failure.
    pub async fn try_lock(&self) -> bool {
        let budget = self.node_budget();
        let start = Instant::now();
        let mut granted = 0;

        for (i, lock) in self.locks.iter().enumerate() {
            let node_start = Instant::now();
            match lock.try_lock().await {
                Ok(LockOutcome::Acquired) => {
                    let node_elapsed = node_start.elapsed();
                    if node_elapsed <= budget {
                        granted += 1;
                    } else {
                        warn!(
                            "RedLock {} node {} took {:?}, over its budget of {:?}",
                            self.key, i, node_elapsed, budget
                        );
                    }
                }
                Ok(LockOutcome::Contended { remaining }) => {
                    debug!("RedLock {} node {} is held elsewhere for {:?}", self.key, i, remaining);
                }
                Err(e) => warn!("RedLock {} node {} failed: {}", self.key, i, e),
            }
        }

        let elapsed = start.elapsed();
        let drift = calculate_drift(self.expire_time, self.drift_factor);
        let quorum = self.quorum();
        let acquired = granted >= quorum && elapsed + drift < self.expire_time;

        info!(
            "RedLock {}: {}/{} nodes granted (quorum {}) in {:?}, acquired: {}",
            self.key,
            granted,
            self.locks.len(),
            quorum,
            elapsed,
            acquired
        );
        acquired
    }

    /// Releases on every member, whether or not it granted the lock.
    pub async fn unlock(&self) {
        for (i, lock) in self.locks.iter().enumerate() {
            match lock.unlock().await {
                Ok(outcome) => debug!("RedLock {} node {} release: {:?}", self.key, i, outcome),
                Err(e) => {
                    warn!("RedLock {} node {} release failed: {}", self.key, i, e);
                    lock.stop_watchdog().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MemoryStore;

    fn cluster(n: usize) -> (Vec<Arc<MemoryStore>>, Vec<Arc<dyn AsyncLockStore>>) {
        let nodes: Vec<Arc<MemoryStore>> = (0..n)
            .map(|i| Arc::new(MemoryStore::named(&format!("node-{}", i))))
            .collect();
        let stores = nodes.iter().map(|node| node.clone() as Arc<dyn AsyncLockStore>).collect();
        (nodes, stores)
    }

    #[tokio::test]
    async fn test_requires_three_nodes() {
        let (nodes, stores) = cluster(3);
        nodes[2].set_available(false);
        assert!(matches!(
            AsyncRedLock::new(stores, "k", Duration::from_secs(30)).await,
            Err(LockError::NotEnoughNodes { available: 2, required: 3 })
        ));
    }

    #[tokio::test]
    async fn test_quorum_with_failed_nodes() {
        let (nodes, stores) = cluster(5);
        let red_lock = AsyncRedLock::new(stores, "k", Duration::from_secs(30)).await.unwrap();
        assert_eq!(red_lock.token(), "k_token");

        assert!(red_lock.try_lock().await);
        red_lock.unlock().await;
        assert!(nodes.iter().all(|node| node.is_empty()));

        nodes[0].set_available(false);
        nodes[1].set_available(false);
        assert!(red_lock.try_lock().await);
        red_lock.unlock().await;

        nodes[2].set_available(false);
        assert!(!red_lock.try_lock().await);
        red_lock.unlock().await;
        assert!(nodes[3].is_empty() && nodes[4].is_empty());
    }

    #[tokio::test]
    async fn test_slow_nodes_do_not_count() {
        let (nodes, stores) = cluster(5);
        let red_lock = AsyncRedLock::new(stores, "k", Duration::from_secs(1)).await.unwrap();

        for node in &nodes[..3] {
            node.set_latency(Duration::from_millis(60));
        }
        assert!(!red_lock.try_lock().await);

        // the slow members still granted and must be released explicitly
        assert!(nodes.iter().all(|node| node.exists("k")));
        red_lock.unlock().await;
        for node in &nodes {
            node.set_latency(Duration::ZERO);
            assert!(!node.exists("k"));
        }
    }
}
