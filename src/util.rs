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
use std::hash::{Hash, Hasher};
use std::thread;
use std::time::Duration;
use rand::Rng;
use rand::distributions::Alphanumeric;

pub fn get_random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Identity of the calling holder: `pid_threadid_random`.
pub fn generate_token() -> String {
    format!("{}_{}_{}", std::process::id(), thread_id_to_u64(), get_random_string(6))
}

pub fn num_milliseconds(duration: &Duration) -> u64 {
    duration.as_millis() as u64
}

/// Clock drift allowance: `ttl * drift_factor` plus 2ms.
pub fn calculate_drift(ttl: Duration, drift_factor: f64) -> Duration {
    let drift_ms = (ttl.as_millis() as f64 * drift_factor).ceil() as u64;
    Duration::from_millis(drift_ms) + Duration::from_millis(2)
}

/// Smallest strict majority of `n`.
pub fn calculate_quorum(n: usize) -> usize {
    n / 2 + 1
}

/// Stable hash of the calling thread's id.
pub fn thread_id_to_u64() -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    thread::current().id().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_string() {
        let s = get_random_string(10);
        assert_eq!(s.len(), 10);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(get_random_string(16), get_random_string(16));
    }

    #[test]
    fn test_generate_token() {
        let token = generate_token();
        let parts: Vec<&str> = token.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], std::process::id().to_string());
        assert_eq!(parts[2].len(), 6);
        assert_ne!(generate_token(), token);
    }

    #[test]
    fn test_thread_ids_differ() {
        let here = thread_id_to_u64();
        let there = thread::spawn(thread_id_to_u64).join().unwrap();
        assert_ne!(here, there);
        assert_eq!(here, thread_id_to_u64());
    }

    #[test]
    fn test_quorum_and_drift() {
        assert_eq!(calculate_quorum(3), 2);
        assert_eq!(calculate_quorum(4), 3);
        assert_eq!(calculate_quorum(5), 3);
        assert_eq!(calculate_drift(Duration::from_secs(30), 0.01), Duration::from_millis(302));
        assert_eq!(num_milliseconds(&Duration::from_secs(2)), 2000);
    }
}
