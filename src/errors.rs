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

use redis::RedisError;
use thiserror::Error;

pub type LockResult<T> = std::result::Result<T, LockError>;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Redis error: {0}")]
    RedisError(#[from] RedisError),

    #[error("Connection pool error: {0}")]
    PoolError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Not enough lock nodes: {available} usable, at least {required} required")]
    NotEnoughNodes { available: usize, required: usize },

    #[error("Lock acquisition cancelled")]
    Cancelled,

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Unexpected script reply: {0}")]
    UnexpectedReply(i64),

    #[error("Script error: {0}")]
    ScriptError(String),

    #[error("Async runtime error: {0}")]
    AsyncError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<r2d2::Error> for LockError {
    fn from(err: r2d2::Error) -> Self {
        LockError::PoolError(err.to_string())
    }
}

#[cfg(feature = "async")]
impl From<deadpool::managed::PoolError<RedisError>> for LockError {
    fn from(err: deadpool::managed::PoolError<RedisError>) -> Self {
        LockError::PoolError(err.to_string())
    }
}

#[cfg(feature = "async")]
impl From<deadpool::managed::BuildError> for LockError {
    fn from(err: deadpool::managed::BuildError) -> Self {
        LockError::PoolError(err.to_string())
    }
}

#[cfg(feature = "async")]
impl From<tokio::task::JoinError> for LockError {
    fn from(err: tokio::task::JoinError) -> Self {
        LockError::AsyncError(err.to_string())
    }
}

impl From<serde_json::Error> for LockError {
    fn from(err: serde_json::Error) -> Self {
        LockError::SerializationError(err.to_string())
    }
}
