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
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use crate::errors::LockResult;
use crate::lock::{CancelToken, RunningGuard};

/// Background thread that keeps refreshing a held lock's lease.
///
/// The thread ticks every `renew_interval` and calls the renew function. It
/// exits when stopped, when the renew function errors, or when it reports
/// that the lock is no longer held. On exit it clears the shared running flag.
pub struct LockWatchdog {
    stop_signal: CancelToken,
    handle: Option<thread::JoinHandle<()>>,
}

impl LockWatchdog {
    pub fn start<F>(renew_interval: Duration, running: Arc<AtomicBool>, mut renew_func: F) -> Self
    where
        F: FnMut() -> LockResult<bool> + Send + 'static,
    {
        let stop_signal = CancelToken::new();
        let thread_stop = stop_signal.clone();
        let renew_interval = renew_interval.max(Duration::from_millis(1));

        let handle = thread::spawn(move || {
            let _running = RunningGuard(running);
            while !thread_stop.wait_timeout(renew_interval) {
                match renew_func() {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!("Watchdog stopped: lock is no longer held");
                        break;
                    }
                    Err(e) => {
                        warn!("Watchdog renewal failed, letting the lease expire: {}", e);
                        break;
                    }
                }
            }
        });

        Self {
            stop_signal,
            handle: Some(handle),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |handle| handle.is_finished())
    }

    /// Signals the thread and waits until it has exited.
    pub fn stop(&mut self) {
        self.stop_signal.cancel();

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Watchdog thread panicked");
            }
        }
    }
}

impl Drop for LockWatchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LockError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_panicking_renewal_clears_running_flag() {
        let running = Arc::new(AtomicBool::new(true));
        let mut watchdog = LockWatchdog::start(Duration::from_millis(10), running.clone(), || -> LockResult<bool> {
            panic!("renewal blew up")
        });

        thread::sleep(Duration::from_millis(60));
        assert!(!running.load(Ordering::SeqCst));
        assert!(watchdog.is_finished());
        watchdog.stop();
    }

    #[test]
    fn test_renews_until_stopped() {
        let running = Arc::new(AtomicBool::new(true));
        let renewals = Arc::new(AtomicU32::new(0));
        let counter = renewals.clone();

        let mut watchdog = LockWatchdog::start(Duration::from_millis(10), running.clone(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        });

        thread::sleep(Duration::from_millis(100));
        assert!(!watchdog.is_finished());
        watchdog.stop();

        assert!(watchdog.is_finished());
        assert!(!running.load(Ordering::SeqCst));
        let seen = renewals.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected several renewals, saw {}", seen);

        thread::sleep(Duration::from_millis(40));
        assert_eq!(renewals.load(Ordering::SeqCst), seen);
    }

    #[test]
    fn test_exits_on_renew_error() {
        let running = Arc::new(AtomicBool::new(true));
        let watchdog = LockWatchdog::start(Duration::from_millis(5), running.clone(), || {
            Err(LockError::StoreUnavailable("test".to_string()))
        });

        thread::sleep(Duration::from_millis(100));
        assert!(watchdog.is_finished());
        assert!(!running.load(Ordering::SeqCst));
    }

    #[test]
    fn test_exits_when_lock_lost() {
        let running = Arc::new(AtomicBool::new(true));
        let watchdog = LockWatchdog::start(Duration::from_millis(5), running.clone(), || Ok(false));

        thread::sleep(Duration::from_millis(100));
        assert!(watchdog.is_finished());
        assert!(!running.load(Ordering::SeqCst));
    }
}
