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
use crate::errors::{LockError, LockResult};
use crate::lock::RunningGuard;
use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Tokio task that keeps refreshing a held lock's lease.
///
/// Same contract as the thread based watchdog: tick every `renew_interval`,
/// exit on stop, on a renewal error or once the lock is no longer held, then
/// clear the shared running flag.
pub struct AsyncLockWatchdog {
    stop_signal: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl AsyncLockWatchdog {
    /// Spawns the task on the current runtime.
    pub fn start<F, Fut>(renew_interval: Duration, running: Arc<AtomicBool>, renew_func: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LockResult<bool>> + Send + 'static,
    {
        let stop_signal = CancellationToken::new();
        let task_stop = stop_signal.clone();
        let renew_interval = renew_interval.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let _running = RunningGuard(running);
            loop {
                tokio::select! {
                    biased;
                    _ = task_stop.cancelled() => break,
                    _ = sleep(renew_interval) => match renew_func().await {
                        Ok(true) => {}
                        Ok(false) => {
                            debug!("Watchdog stopped: lock is no longer held");
                            break;
                        }
                        Err(e) => {
                            warn!("Watchdog renewal failed, letting the lease expire: {}", e);
                            break;
                        }
                    },
                }
            }
        });

        Self {
            stop_signal,
            task_handle: Some(handle),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task_handle.as_ref().map_or(true, |handle| handle.is_finished())
    }

    /// Signals the task and waits until it has exited.
    pub async fn stop(&mut self) {
        self.stop_signal.cancel();

        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                warn!("Watchdog task failed: {}", LockError::from(e));
            }
        }
    }
}

impl Drop for AsyncLockWatchdog {
    fn drop(&mut self) {
        self.stop_signal.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn failing_renewal() -> LockResult<bool> {
        panic!("renewal blew up")
    }

    #[tokio::test]
    async fn test_panicking_renewal_clears_running_flag() {
        let running = Arc::new(AtomicBool::new(true));
        let mut watchdog =
            AsyncLockWatchdog::start(Duration::from_millis(10), running.clone(), || async { failing_renewal() });

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!running.load(Ordering::SeqCst));
        assert!(watchdog.is_finished());
        watchdog.stop().await;
    }

    #[tokio::test]
    async fn test_renews_until_stopped() {
        let running = Arc::new(AtomicBool::new(true));
        let renewals = Arc::new(AtomicU32::new(0));
        let counter = renewals.clone();

        let mut watchdog = AsyncLockWatchdog::start(Duration::from_millis(10), running.clone(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        watchdog.stop().await;

        assert!(renewals.load(Ordering::SeqCst) >= 3);
        assert!(!running.load(Ordering::SeqCst));
        assert!(watchdog.is_finished());

        let after_stop = renewals.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(renewals.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn test_exits_when_lock_lost() {
        let running = Arc::new(AtomicBool::new(true));
        let watchdog = AsyncLockWatchdog::start(Duration::from_millis(10), running.clone(), || async { Ok(false) });

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!running.load(Ordering::SeqCst));
        assert!(watchdog.is_finished());
    }

    #[tokio::test]
    async fn test_exits_on_renew_error() {
        let running = Arc::new(AtomicBool::new(true));
        let watchdog = AsyncLockWatchdog::start(Duration::from_millis(10), running.clone(), || async {
            Err(LockError::StoreUnavailable("memory".to_string()))
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!running.load(Ordering::SeqCst));
        assert!(watchdog.is_finished());
    }

    #[tokio::test]
    async fn test_drop_cancels_task() {
        let running = Arc::new(AtomicBool::new(true));
        let watchdog = AsyncLockWatchdog::start(Duration::from_secs(60), running.clone(), || async { Ok(true) });

        drop(watchdog);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!running.load(Ordering::SeqCst));
    }
}
