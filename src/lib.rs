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

//! Distributed locks on Redis.
//!
//! [`RLock`] is a single-store lock, reentrant by default, with an optional
//! watchdog that keeps the lease alive while held. [`RedLock`] takes a lock
//! on a strict majority of independent stores. Both have `Async*`
//! counterparts behind the default `async` feature.

mod client;
mod config;
mod connection;
mod errors;
mod lock;
mod scripts;
mod util;

pub use client::*;
pub use config::*;
pub use connection::*;
pub use errors::*;
pub use lock::*;
pub use scripts::*;
pub use util::*;
