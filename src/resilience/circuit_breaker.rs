//! Per-resource circuit breaker (§4.2).
//!
//! The teacher's codebase shares mutable state across tasks with
//! `Arc<RwLock<HashMap<..>>>` (see `realtime.rs`'s candle cache); the
//! breaker follows the same pattern but keeps the critical section to a
//! single state-transition per event, per §5's "narrowest critical
//! section" policy.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::CircuitBreakerConfig;
use crate::error::BreakerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
}

/// A single named circuit. The aggregator keeps one of these per
/// (provider, resource) it calls through.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Transitions `open -> half-open` lazily, on the next call, once the
    /// timeout has elapsed (no background timer needed).
    fn refresh_state(&self, inner: &mut Inner) {
        if inner.state == BreakerState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.config.open_timeout {
                    inner.state = BreakerState::HalfOpen;
                    inner.consecutive_successes = 0;
                }
            }
        }
    }

    /// Must be called before attempting the wrapped call. Returns
    /// `Err(BreakerError::Open)` if calls should be rejected outright.
    pub fn guard(&self) -> Result<(), BreakerError> {
        let mut inner = self.inner.lock().unwrap();
        self.refresh_state(&mut inner);
        if inner.state == BreakerState::Open {
            return Err(BreakerError::Open(self.name.clone()));
        }
        Ok(())
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures = 0;
            }
            BreakerState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = BreakerState::Closed;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    inner.opened_at = None;
                }
            }
            BreakerState::Open => {
                // A success while open can only happen if the caller
                // ignored `guard()`; treat it like a half-open success.
                inner.state = BreakerState::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
            }
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.consecutive_successes = 0;
            }
            BreakerState::Open => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock().unwrap();
        self.refresh_state(&mut inner);
        inner.state
    }

    /// Test/operator hook: force the breaker open, used by scenario B in
    /// §8 ("break the primary provider's breaker to open").
    pub fn force_open(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = BreakerState::Open;
        inner.opened_at = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(n: u32, timeout: Duration, m: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: n,
            open_timeout: timeout,
            success_threshold: m,
        }
    }

    #[test]
    fn opens_after_n_consecutive_failures() {
        let breaker = CircuitBreaker::new("test", config(3, Duration::from_secs(300), 1));
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn rejects_calls_while_open() {
        let breaker = CircuitBreaker::new("test", config(1, Duration::from_secs(300), 1));
        breaker.record_failure();
        assert!(breaker.guard().is_err());
    }

    #[test]
    fn half_open_after_timeout_then_closes_on_success() {
        let breaker = CircuitBreaker::new("test", config(1, Duration::from_millis(1), 1));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(breaker.guard().is_ok());
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_reopens_on_any_failure() {
        let breaker = CircuitBreaker::new("test", config(1, Duration::from_millis(1), 2));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn force_open_is_introspectable() {
        let breaker = CircuitBreaker::new("primary", config(3, Duration::from_secs(300), 1));
        breaker.force_open();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(breaker.guard().is_err());
    }
}
