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
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rlock::{LockStore, MemoryStore, RLock, RedLock, RedisLock, LockType};
use std::sync::Arc;
use std::time::Duration;

fn bench_lock(c: &mut Criterion) {
    let store = Arc::new(MemoryStore::new());

    for reentry in [false, true] {
        let lock = RLock::new(store.clone(), "bench:lock").with_reentry(reentry);
        c.bench_with_input(BenchmarkId::new("try_lock_unlock", reentry), &reentry, |b, _| {
            b.iter(|| {
                lock.try_lock().unwrap();
                lock.unlock().unwrap();
            });
        });
    }

    let holder = RLock::new(store.clone(), "bench:contended");
    holder.try_lock().unwrap();
    let rival = RLock::new(store.clone(), "bench:contended");
    c.bench_function("try_lock_contended", |b| {
        b.iter(|| rival.try_lock().unwrap());
    });
}

fn bench_keyed_lock(c: &mut Criterion) {
    let keyed = RedisLock::new(Arc::new(MemoryStore::new()), LockType::Distributed);

    c.bench_function("keyed_try_lock_release", |b| {
        b.iter(|| {
            keyed.try_lock("bench:keyed", "value", Duration::from_secs(10)).unwrap();
            keyed.release_lock("bench:keyed", "value").unwrap();
        });
    });
}

fn bench_red_lock(c: &mut Criterion) {
    let mut group = c.benchmark_group("red_lock");

    for nodes in [3, 5, 7] {
        let stores: Vec<Arc<dyn LockStore>> = (0..nodes)
            .map(|i| Arc::new(MemoryStore::named(&format!("node-{}", i))) as Arc<dyn LockStore>)
            .collect();
        let red_lock = RedLock::new(stores, "bench:red_lock", Duration::from_secs(30)).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(nodes), &nodes, |b, _| {
            b.iter(|| {
                assert!(red_lock.try_lock());
                red_lock.unlock();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_lock, bench_keyed_lock, bench_red_lock);
criterion_main!(benches);
