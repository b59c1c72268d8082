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

mod blocking;
mod memory;
#[cfg(feature = "async")]
mod non_blocking;

pub use blocking::*;
pub use memory::*;
#[cfg(feature = "async")]
pub use non_blocking::*;

use std::time::Duration;
use crate::errors::LockResult;
use crate::scripts::LockScript;

/// Synchronous view of the key-value store backing the locks.
///
/// Every call is one network round trip and fails with the transport or
/// script error instead of retrying.
pub trait LockStore: Send + Sync {
    /// Runs one atomic script and returns its integer reply.
    fn eval(&self, script: LockScript, keys: &[&str], args: &[String]) -> LockResult<i64>;

    /// `SET key value NX PX expire`, true when the key was created.
    fn set_nx(&self, key: &str, value: &str, expire: Duration) -> LockResult<bool>;

    fn get(&self, key: &str) -> LockResult<Option<String>>;

    fn del(&self, key: &str) -> LockResult<bool>;

    /// Remaining lease in milliseconds, `-2` if missing and `-1` without expiry.
    fn pttl(&self, key: &str) -> LockResult<i64>;

    fn ping(&self) -> LockResult<()>;
}

/// Asynchronous view of the key-value store backing the locks.
#[cfg(feature = "async")]
#[async_trait::async_trait]
pub trait AsyncLockStore: Send + Sync {
    async fn eval(&self, script: LockScript, keys: &[&str], args: &[String]) -> LockResult<i64>;

    async fn set_nx(&self, key: &str, value: &str, expire: Duration) -> LockResult<bool>;

    async fn get(&self, key: &str) -> LockResult<Option<String>>;

    async fn del(&self, key: &str) -> LockResult<bool>;

    async fn pttl(&self, key: &str) -> LockResult<i64>;

    async fn ping(&self) -> LockResult<()>;
}
