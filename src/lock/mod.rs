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
#[cfg(feature = "async")]
mod non_blocking;

pub use blocking::*;
#[cfg(feature = "async")]
pub use non_blocking::*;

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use crate::errors::{LockError, LockResult};

/// Result of one acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// Acquired, or reentered by the same token
    Acquired,
    /// Held by another token; `remaining` is that holder's lease
    Contended { remaining: Duration },
}

impl LockOutcome {
    pub(crate) fn from_reply(reply: i64) -> LockResult<Self> {
        match reply {
            0 => Ok(LockOutcome::Acquired),
            ttl if ttl > 0 => Ok(LockOutcome::Contended {
                remaining: Duration::from_millis(ttl as u64),
            }),
            other => Err(LockError::UnexpectedReply(other)),
        }
    }

    pub fn is_acquired(&self) -> bool {
        matches!(self, LockOutcome::Acquired)
    }

    /// Lease left on the competing holder, zero when acquired.
    pub fn remaining(&self) -> Duration {
        match self {
            LockOutcome::Acquired => Duration::ZERO,
            LockOutcome::Contended { remaining } => *remaining,
        }
    }
}

/// Result of one release attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The record was deleted
    Released,
    /// Reentry count decremented, the lock is still held
    Decremented,
    /// The caller's token does not hold the lock
    NotHeld,
}

impl ReleaseOutcome {
    pub(crate) fn from_reply(reply: i64) -> LockResult<Self> {
        match reply {
            1 => Ok(ReleaseOutcome::Released),
            0 => Ok(ReleaseOutcome::Decremented),
            -1 => Ok(ReleaseOutcome::NotHeld),
            other => Err(LockError::UnexpectedReply(other)),
        }
    }

    pub fn is_released(&self) -> bool {
        matches!(self, ReleaseOutcome::Released)
    }
}

/// Script arguments: token and lease in milliseconds.
pub(crate) fn lock_args(token: &str, expire_millis: u64) -> Vec<String> {
    vec![token.to_string(), expire_millis.to_string()]
}

/// Clears a watchdog's running flag when its loop exits, unwinding included.
pub(crate) struct RunningGuard(pub(crate) Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct CancelState {
    cancelled: Mutex<bool>,
    cond: Condvar,
    deadline: Option<Instant>,
}

/// Cancellation signal for blocking waits, optionally firing at a deadline.
///
/// Clones share the same signal.
#[derive(Clone)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .field("deadline", &self.state.deadline)
            .finish()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Token that cancels itself once `deadline` passes.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::build(Some(deadline))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => Self::with_deadline(deadline),
            None => Self::new(),
        }
    }

    fn build(deadline: Option<Instant>) -> Self {
        Self {
            state: Arc::new(CancelState {
                cancelled: Mutex::new(false),
                cond: Condvar::new(),
                deadline,
            }),
        }
    }

    pub fn cancel(&self) {
        let mut cancelled = self.state.cancelled.lock();
        *cancelled = true;
        self.state.cond.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.cancelled.lock() || self.deadline_passed()
    }

    fn deadline_passed(&self) -> bool {
        self.state.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Sleeps for `timeout` or until cancelled; returns whether it was cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let wake_at = match (Instant::now().checked_add(timeout), self.state.deadline) {
            (Some(at), Some(deadline)) => Some(at.min(deadline)),
            (at, deadline) => at.or(deadline),
        };

        let mut cancelled = self.state.cancelled.lock();
        while !*cancelled {
            match wake_at {
                Some(at) => {
                    if self.state.cond.wait_until(&mut cancelled, at).timed_out() {
                        break;
                    }
                }
                None => self.state.cond.wait(&mut cancelled),
            }
        }
        *cancelled || self.deadline_passed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_overlong_timeout_means_no_deadline() {
        let token = CancelToken::with_timeout(Duration::MAX);
        assert!(!token.is_cancelled());
        assert!(!token.wait_timeout(Duration::from_millis(10)));

        let remote = token.clone();
        let handle = thread::spawn(move || remote.wait_timeout(Duration::MAX));
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_reply_codes() {
        assert_eq!(LockOutcome::from_reply(0).unwrap(), LockOutcome::Acquired);
        assert_eq!(
            LockOutcome::from_reply(1500).unwrap().remaining(),
            Duration::from_millis(1500)
        );
        assert!(matches!(LockOutcome::from_reply(-1), Err(LockError::UnexpectedReply(-1))));

        assert_eq!(ReleaseOutcome::from_reply(1).unwrap(), ReleaseOutcome::Released);
        assert_eq!(ReleaseOutcome::from_reply(0).unwrap(), ReleaseOutcome::Decremented);
        assert_eq!(ReleaseOutcome::from_reply(-1).unwrap(), ReleaseOutcome::NotHeld);
        assert!(ReleaseOutcome::from_reply(7).is_err());
    }

    #[test]
    fn test_cancel_wakes_waiter() {
        let token = CancelToken::new();
        let remote = token.clone();

        let start = Instant::now();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            remote.cancel();
        });

        assert!(token.wait_timeout(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(token.is_cancelled());
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_times_out_without_cancel() {
        let token = CancelToken::new();
        assert!(!token.wait_timeout(Duration::from_millis(20)));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_deadline_token() {
        let token = CancelToken::with_timeout(Duration::from_millis(30));
        assert!(!token.is_cancelled());

        let start = Instant::now();
        assert!(token.wait_timeout(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(token.is_cancelled());
    }
}
