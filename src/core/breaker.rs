//! Per-provider circuit breaker.
//!
//! Tracks failures per provider id and gates new synthesis attempts with
//! a three-state machine: Closed (normal), Open (rejecting until the
//! reset timeout elapses) and HalfOpen (a bounded number of trial
//! requests probe the provider). Permits are single-use leases; a lease
//! dropped without an outcome releases its trial slot without counting
//! for or against the provider, which is how client-side cancellation
//! stays neutral.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures in Closed before the breaker opens.
    pub failure_threshold: u32,
    /// How long Open rejects before allowing trial requests.
    pub reset_timeout: Duration,
    /// Concurrent trials admitted in HalfOpen.
    pub half_open_max_trials: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_max_trials: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Entry {
    state: BreakerState,
    failure_count: u32,
    opened_at: Option<Instant>,
    half_open_in_flight: u32,
    half_open_successes: u32,
}

impl Entry {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            opened_at: None,
            half_open_in_flight: 0,
            half_open_successes: 0,
        }
    }

    fn open(&mut self, now: Instant) {
        self.state = BreakerState::Open;
        self.opened_at = Some(now);
        self.half_open_in_flight = 0;
        self.half_open_successes = 0;
    }

    fn close(&mut self) {
        self.state = BreakerState::Closed;
        self.failure_count = 0;
        self.opened_at = None;
        self.half_open_in_flight = 0;
        self.half_open_successes = 0;
    }
}

/// Returned when the breaker rejects a permit.
#[derive(Debug, Clone, Error)]
#[error("circuit breaker open")]
pub struct BreakerOpen;

/// Tracks breaker state per key (provider id).
pub struct CircuitBreakerRegistry {
    config: BreakerConfig,
    entries: Mutex<HashMap<String, Entry>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Ask to attempt a call for `key`. On success the returned lease must
    /// be resolved exactly once via [`BreakerLease::record_success`] or
    /// [`BreakerLease::record_failure`]; dropping it releases the permit
    /// neutrally.
    pub fn permit(self: &Arc<Self>, key: &str) -> Result<BreakerLease, BreakerOpen> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.to_string()).or_insert_with(Entry::new);

        let trial = match entry.state {
            BreakerState::Closed => false,
            BreakerState::Open => {
                let elapsed = entry
                    .opened_at
                    .map(|t| now.duration_since(t))
                    .unwrap_or(Duration::ZERO);
                if elapsed < self.config.reset_timeout {
                    warn!(key, "circuit breaker open, rejecting request");
                    return Err(BreakerOpen);
                }
                info!(key, "circuit breaker half-open, allowing trial");
                entry.state = BreakerState::HalfOpen;
                entry.half_open_in_flight = 1;
                entry.half_open_successes = 0;
                true
            }
            BreakerState::HalfOpen => {
                if entry.half_open_in_flight >= self.config.half_open_max_trials {
                    warn!(key, "circuit breaker half-open at trial capacity");
                    return Err(BreakerOpen);
                }
                entry.half_open_in_flight += 1;
                true
            }
        };

        Ok(BreakerLease {
            registry: Arc::clone(self),
            key: key.to_string(),
            trial,
            resolved: false,
        })
    }

    /// Current state for `key`, defaulting to Closed for unseen keys.
    pub fn state(&self, key: &str) -> BreakerState {
        self.entries
            .lock()
            .get(key)
            .map(|e| e.state)
            .unwrap_or(BreakerState::Closed)
    }

    fn record_success(&self, key: &str, trial: bool) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        if trial {
            entry.half_open_in_flight = entry.half_open_in_flight.saturating_sub(1);
            entry.half_open_successes += 1;
            if entry.half_open_successes >= self.config.half_open_max_trials {
                info!(key, "circuit breaker closed after successful trials");
                entry.close();
            }
        } else {
            entry.failure_count = 0;
        }
    }

    fn record_failure(&self, key: &str, trial: bool) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        if trial {
            warn!(key, "circuit breaker trial failed, reopening");
            entry.open(now);
            return;
        }
        entry.failure_count += 1;
        warn!(key, failures = entry.failure_count, "circuit breaker failure");
        if entry.state == BreakerState::Closed
            && entry.failure_count >= self.config.failure_threshold
        {
            warn!(
                key,
                failures = entry.failure_count,
                "circuit breaker open after repeated failures"
            );
            entry.open(now);
        }
    }

    fn release(&self, key: &str, trial: bool) {
        if !trial {
            return;
        }
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.half_open_in_flight = entry.half_open_in_flight.saturating_sub(1);
        }
    }
}

/// Single-use token acquired before provider work.
pub struct BreakerLease {
    registry: Arc<CircuitBreakerRegistry>,
    key: String,
    trial: bool,
    resolved: bool,
}

impl BreakerLease {
    pub fn record_success(mut self) {
        self.resolved = true;
        self.registry.record_success(&self.key, self.trial);
    }

    pub fn record_failure(mut self) {
        self.resolved = true;
        self.registry.record_failure(&self.key, self.trial);
    }
}

impl Drop for BreakerLease {
    fn drop(&mut self) {
        if !self.resolved {
            self.registry.release(&self.key, self.trial);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(threshold: u32, reset_ms: u64, trials: u32) -> Arc<CircuitBreakerRegistry> {
        Arc::new(CircuitBreakerRegistry::new(BreakerConfig {
            failure_threshold: threshold,
            reset_timeout: Duration::from_millis(reset_ms),
            half_open_max_trials: trials,
        }))
    }

    #[test]
    fn test_opens_after_threshold_failures() {
        let breakers = registry(3, 10_000, 1);
        for _ in 0..3 {
            breakers.permit("p").unwrap().record_failure();
        }
        assert_eq!(breakers.state("p"), BreakerState::Open);
        assert!(breakers.permit("p").is_err());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let breakers = registry(3, 10_000, 1);
        breakers.permit("p").unwrap().record_failure();
        breakers.permit("p").unwrap().record_failure();
        breakers.permit("p").unwrap().record_success();
        breakers.permit("p").unwrap().record_failure();
        // Two failures then a reset then one more: still closed.
        assert_eq!(breakers.state("p"), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_after_reset_timeout() {
        let breakers = registry(1, 20, 1);
        breakers.permit("p").unwrap().record_failure();
        assert!(breakers.permit("p").is_err());

        std::thread::sleep(Duration::from_millis(30));
        let lease = breakers.permit("p").unwrap();
        assert_eq!(breakers.state("p"), BreakerState::HalfOpen);
        lease.record_success();
        assert_eq!(breakers.state("p"), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let breakers = registry(1, 20, 1);
        breakers.permit("p").unwrap().record_failure();
        std::thread::sleep(Duration::from_millis(30));

        breakers.permit("p").unwrap().record_failure();
        assert_eq!(breakers.state("p"), BreakerState::Open);
        assert!(breakers.permit("p").is_err());
    }

    #[test]
    fn test_half_open_caps_concurrent_trials() {
        let breakers = registry(1, 20, 2);
        breakers.permit("p").unwrap().record_failure();
        std::thread::sleep(Duration::from_millis(30));

        let first = breakers.permit("p").unwrap();
        let second = breakers.permit("p").unwrap();
        assert!(breakers.permit("p").is_err());

        // Two consecutive trial successes close the breaker.
        first.record_success();
        second.record_success();
        assert_eq!(breakers.state("p"), BreakerState::Closed);
    }

    #[test]
    fn test_dropped_lease_releases_trial_slot() {
        let breakers = registry(1, 20, 1);
        breakers.permit("p").unwrap().record_failure();
        std::thread::sleep(Duration::from_millis(30));

        let lease = breakers.permit("p").unwrap();
        drop(lease); // cancelled client: no outcome recorded
        assert_eq!(breakers.state("p"), BreakerState::HalfOpen);

        // Slot is free again for the next trial.
        let lease = breakers.permit("p").unwrap();
        lease.record_success();
        assert_eq!(breakers.state("p"), BreakerState::Closed);
    }

    #[test]
    fn test_keys_are_independent() {
        let breakers = registry(1, 10_000, 1);
        breakers.permit("bad").unwrap().record_failure();
        assert!(breakers.permit("bad").is_err());
        assert!(breakers.permit("good").is_ok());
    }
}
