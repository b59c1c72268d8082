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
use crate::connection::{LockStore, SyncRedisStore};
use crate::errors::{LockError, LockResult};
use crate::lock::{LockOutcome, RLock};
use crate::util::{calculate_drift, calculate_quorum, get_random_string};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Smallest number of stores a quorum lock accepts.
pub const MIN_REDLOCK_NODES: usize = 3;

const DEFAULT_DRIFT_FACTOR: f64 = 0.01;

/// === RedLock (quorum lock) ===
///
/// One [`RLock`] per independent store, all sharing the key and the token
/// `"{key}_token"`, each renewed by its own watchdog. The lock is held when a
/// strict majority of members granted it within the per-node budget
/// (`expire / (10 * N)`) and the whole round plus clock drift stayed below
/// the lease.
pub struct RedLock {
    locks: Vec<RLock>,
    key: String,
    expire_time: Duration,
    drift_factor: f64,
}

impl RedLock {
    /// Stores that do not answer a ping are skipped.
    pub fn new(stores: Vec<Arc<dyn LockStore>>, key: &str, expire_time: Duration) -> LockResult<Self> {
        let key = if key.is_empty() {
            get_random_string(10)
        } else {
            key.to_string()
        };
        let token = format!("{}_token", key);

        let mut locks = Vec::with_capacity(stores.len());
        for (i, store) in stores.into_iter().enumerate() {
            if let Err(e) = store.ping() {
                warn!("RedLock {} skips unreachable node {}: {}", key, i, e);
                continue;
            }
            locks.push(
                RLock::new(store, &key)
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
    pub fn from_options(options: &[RedisClientOptions], key: &str, expire_time: Duration) -> LockResult<Self> {
        let mut stores: Vec<Arc<dyn LockStore>> = Vec::with_capacity(options.len());
        for option in options {
            match SyncRedisStore::new(option) {
                Ok(store) => stores.push(Arc::new(store)),
                Err(e) => warn!("RedLock skips node {}: {}", option.addr, e),
            }
        }
        Self::new(stores, key, expire_time)
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

    pub fn expire_time(&self) -> Duration {
        self.expire_time
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

    /// One sequential round over every member.
    ///
    /// Members that granted the lock keep it when the quorum is missed; call
    /// [`RedLock::unlock`] to clean up.
    pub fn try_lock(&self) -> bool {
        let budget = self.node_budget();
        let start = Instant::now();
        let mut granted = 0;

        for (i, lock) in self.locks.iter().enumerate() {
            let node_start = Instant::now();
            match lock.try_lock() {
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
        let in_time = elapsed + drift < self.expire_time;
        let acquired = granted >= quorum && in_time;

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
    pub fn unlock(&self) {
        for (i, lock) in self.locks.iter().enumerate() {
            match lock.unlock() {
                Ok(outcome) => debug!("RedLock {} node {} release: {:?}", self.key, i, outcome),
                Err(e) => {
                    warn!("RedLock {} node {} release failed: {}", self.key, i, e);
                    lock.stop_watchdog();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MemoryStore;

    fn cluster(n: usize) -> (Vec<Arc<MemoryStore>>, Vec<Arc<dyn LockStore>>) {
        let nodes: Vec<Arc<MemoryStore>> = (0..n)
            .map(|i| Arc::new(MemoryStore::named(&format!("node-{}", i))))
            .collect();
        let stores = nodes.iter().map(|node| node.clone() as Arc<dyn LockStore>).collect();
        (nodes, stores)
    }

    #[test]
    fn test_requires_three_nodes() {
        let (_, stores) = cluster(2);
        assert!(matches!(
            RedLock::new(stores, "k", Duration::from_secs(30)),
            Err(LockError::NotEnoughNodes { available: 2, required: 3 })
        ));
    }

    #[test]
    fn test_unreachable_nodes_are_skipped_at_construction() {
        let (nodes, stores) = cluster(4);
        nodes[0].set_available(false);
        let red_lock = RedLock::new(stores, "k", Duration::from_secs(30)).unwrap();
        assert_eq!(red_lock.len(), 3);
        assert_eq!(red_lock.quorum(), 2);

        let (nodes, stores) = cluster(3);
        nodes[1].set_available(false);
        assert!(matches!(
            RedLock::new(stores, "k", Duration::from_secs(30)),
            Err(LockError::NotEnoughNodes { available: 2, .. })
        ));
    }

    #[test]
    fn test_members_share_key_and_token() {
        let (_, stores) = cluster(3);
        let red_lock = RedLock::new(stores, "orders", Duration::from_secs(30)).unwrap();
        assert_eq!(red_lock.key(), "orders");
        assert_eq!(red_lock.token(), "orders_token");
        assert_eq!(red_lock.node_budget(), Duration::from_secs(1));

        let (_, stores) = cluster(3);
        let generated = RedLock::new(stores, "", Duration::from_secs(30)).unwrap();
        assert_eq!(generated.key().len(), 10);
    }

    #[test]
    fn test_quorum_with_failed_nodes() {
        let (nodes, stores) = cluster(5);
        let red_lock = RedLock::new(stores, "k", Duration::from_secs(30)).unwrap();
        assert!(red_lock.try_lock());
        red_lock.unlock();
        assert!(nodes.iter().all(|node| node.is_empty()));

        nodes[0].set_available(false);
        nodes[1].set_available(false);
        assert!(red_lock.try_lock());
        red_lock.unlock();

        nodes[2].set_available(false);
        assert!(!red_lock.try_lock());
        red_lock.unlock();

        for node in &nodes {
            node.set_available(true);
            assert!(node.is_empty());
        }
    }

    #[test]
    fn test_contended_nodes_block_the_quorum() {
        let (nodes, stores) = cluster(5);
        for node in &nodes[..3] {
            let rival = RLock::new(node.clone(), "k").with_token("rival");
            assert!(rival.try_lock().unwrap().is_acquired());
        }

        let red_lock = RedLock::new(stores, "k", Duration::from_secs(30)).unwrap();
        assert!(!red_lock.try_lock());

        // no rollback: the two free nodes stay granted until unlock
        assert!(nodes[3].exists("k") && nodes[4].exists("k"));
        red_lock.unlock();
        assert!(!nodes[3].exists("k") && !nodes[4].exists("k"));
        assert!(nodes[..3].iter().all(|node| node.exists("k")));
    }

    #[test]
    fn test_slow_nodes_do_not_count() {
        // budget is 1s / 50 = 20ms per node
        let (nodes, stores) = cluster(5);
        let red_lock = RedLock::new(stores, "k", Duration::from_secs(1)).unwrap();
        assert_eq!(red_lock.node_budget(), Duration::from_millis(20));

        nodes[0].set_latency(Duration::from_millis(60));
        nodes[1].set_latency(Duration::from_millis(60));
        assert!(red_lock.try_lock());
        red_lock.unlock();

        nodes[2].set_latency(Duration::from_millis(60));
        assert!(!red_lock.try_lock());
        red_lock.unlock();
    }

    #[test]
    fn test_round_longer_than_lease_fails() {
        let (nodes, stores) = cluster(3);
        let red_lock = RedLock::new(stores, "k", Duration::from_millis(300))
            .unwrap()
            .with_drift_factor(0.5);
        assert!(red_lock.try_lock());
        red_lock.unlock();

        // 150ms drift plus three rounds of 60ms exceeds the 300ms lease
        for node in &nodes {
            node.set_latency(Duration::from_millis(60));
        }
        assert!(!red_lock.try_lock());
        red_lock.unlock();
    }

    #[test]
    fn test_unlock_without_lock_is_harmless() {
        let (nodes, stores) = cluster(3);
        let red_lock = RedLock::new(stores, "k", Duration::from_secs(30)).unwrap();
        red_lock.unlock();
        assert!(nodes.iter().all(|node| node.is_empty()));
    }
}
