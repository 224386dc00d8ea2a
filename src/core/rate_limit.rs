//! Fixed-window admission rate limiter keyed by origin.
//!
//! The origin key is whatever identity the transport layer supplies,
//! typically the peer IP address. State per key is `(window_start,
//! count)`; admits are linearized by a single lock over the bucket map.
//! Expired buckets are swept opportunistically so memory stays bounded by
//! the set of origins active in the last window.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::warn;

/// Sweep expired buckets every this many admits.
const SWEEP_INTERVAL: u64 = 256;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Per-origin quota within one window.
    pub max_requests_per_window: u32,
    /// Window length.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_window: 50,
            window: Duration::from_secs(60),
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Allowed,
    Denied { retry_after: Duration },
}

#[derive(Debug)]
struct Bucket {
    window_start: Instant,
    count: u32,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<String, Bucket>>,
    admits: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
            admits: AtomicU64::new(0),
        }
    }

    /// Check whether a request from `key` is admitted in the current
    /// window, counting it if so.
    pub fn admit(&self, key: &str) -> Admission {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();

        if self.admits.fetch_add(1, Ordering::Relaxed) % SWEEP_INTERVAL == 0 {
            let window = self.config.window;
            buckets.retain(|_, b| now.duration_since(b.window_start) < window);
        }

        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            window_start: now,
            count: 0,
        });

        if now.duration_since(bucket.window_start) >= self.config.window {
            bucket.window_start = now;
            bucket.count = 0;
        }

        if bucket.count >= self.config.max_requests_per_window {
            let elapsed = now.duration_since(bucket.window_start);
            let retry_after = self.config.window.saturating_sub(elapsed);
            warn!(key, count = bucket.count, "rate limit exceeded");
            return Admission::Denied { retry_after };
        }

        bucket.count += 1;
        Admission::Allowed
    }

    /// Highest bucket fill across origins with a live window, as a
    /// fraction of the quota in `[0, 1]`.
    pub fn max_bucket_usage(&self) -> f64 {
        let now = Instant::now();
        let buckets = self.buckets.lock();
        let quota = self.config.max_requests_per_window as f64;
        buckets
            .values()
            .filter(|b| now.duration_since(b.window_start) < self.config.window)
            .map(|b| b.count as f64 / quota)
            .fold(0.0, f64::max)
    }

    /// Smallest remaining window time across active origins, in seconds.
    /// Zero when no origin is active.
    pub fn min_window_remaining_secs(&self) -> f64 {
        let now = Instant::now();
        let buckets = self.buckets.lock();
        buckets
            .values()
            .filter(|b| now.duration_since(b.window_start) < self.config.window)
            .map(|b| {
                self.config
                    .window
                    .saturating_sub(now.duration_since(b.window_start))
                    .as_secs_f64()
            })
            .reduce(f64::min)
            .unwrap_or(0.0)
    }
}
