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
use rlock::{LockClient, LockOptions, LockResult, LockType, RLock, RedLock, RedisClientOptions};
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> LockResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rlock=debug")))
        .init();

    let addr = std::env::var("REDIS_ADDR").unwrap_or_else(|_| "127.0.0.1:6379".to_string());

    // 1. Client bound to one Redis server
    let options = RedisClientOptions::new(&addr).with_pool_size(4).with_min_idle(1);
    let client = LockClient::new(&options)?.with_lock_options(
        LockOptions::default()
            .with_expire_time(Duration::from_secs(3))
            .with_block_waiting_time(Duration::from_secs(5))
            .with_watchdog(true),
    )?;

    // 2. Reentrant lock kept alive by the watchdog
    let lock = client.get_lock("demo:order:42");
    lock.lock()?;
    lock.lock()?;
    println!("Held {} twice, watchdog running: {}", lock.key(), lock.is_watchdog_running());

    thread::sleep(Duration::from_secs(4));
    println!("Still held after the lease: {}", lock.hold_lock()?);

    println!("First unlock: {:?}", lock.unlock()?);
    println!("Second unlock: {:?}", lock.unlock()?);

    // 3. A second holder waits for the first
    let first = RLock::new(client.get_store().clone(), "demo:report").with_reentry(false);
    let second = RLock::new(client.get_store().clone(), "demo:report")
        .with_reentry(false)
        .with_block_waiting_time(Duration::from_millis(500));
    first.try_lock()?;
    println!("Second holder after waiting: {:?}", second.lock()?);
    first.unlock()?;

    // 4. Keyed locks with caller supplied values
    let keyed = client.get_keyed_lock(LockType::Distributed);
    if keyed.try_lock("demo:job", "worker-1", Duration::from_secs(10))? {
        println!("worker-1 holds demo:job: {}", keyed.hold_lock("demo:job", "worker-1"));
        keyed.release_lock("demo:job", "worker-1")?;
    }

    // 5. Quorum lock over three logical databases
    let nodes: Vec<RedisClientOptions> = (0..3)
        .map(|db| RedisClientOptions::new(&addr).with_database(db).with_pool_size(2).with_min_idle(1))
        .collect();
    let red_lock = RedLock::from_options(&nodes, "demo:red", Duration::from_secs(10))?;
    println!("RedLock acquired: {}", red_lock.try_lock());
    red_lock.unlock();

    Ok(())
}
