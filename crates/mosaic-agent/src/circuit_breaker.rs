//! Circuit breaker shared by provider instances
//!
//! Worker pools fan out many concurrent calls; once the API starts rejecting
//! them, every worker should stop hammering it at once.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests allowed
    Closed,
    /// Too many consecutive failures, requests rejected
    Open,
    /// Cool-down elapsed, the next request probes recovery
    HalfOpen,
}

/// Lock-free consecutive-failure breaker
///
/// ```
/// use mosaic_agent::CircuitBreaker;
///
/// let breaker = CircuitBreaker::new(2, 60);
/// breaker.record_failure();
/// breaker.record_failure();
/// assert!(!breaker.can_execute());
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    failures: AtomicU32,
    last_failure_ms: AtomicU64,
    threshold: u32,
    cooldown: Duration,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl CircuitBreaker {
    /// `threshold` consecutive failures open the circuit for `cooldown_secs`
    pub fn new(threshold: u32, cooldown_secs: u64) -> Self {
        Self {
            failures: AtomicU32::new(0),
            last_failure_ms: AtomicU64::new(0),
            threshold,
            cooldown: Duration::from_secs(cooldown_secs),
        }
    }

    fn elapsed_since_failure(&self) -> u64 {
        now_millis().saturating_sub(self.last_failure_ms.load(Ordering::Relaxed))
    }

    pub fn state(&self) -> CircuitState {
        if self.failures.load(Ordering::Relaxed) < self.threshold {
            CircuitState::Closed
        } else if self.elapsed_since_failure() >= self.cooldown.as_millis() as u64 {
            CircuitState::HalfOpen
        } else {
            CircuitState::Open
        }
    }

    pub fn record_success(&self) {
        self.failures.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.last_failure_ms.store(now_millis(), Ordering::Relaxed);
    }

    pub fn can_execute(&self) -> bool {
        self.state() != CircuitState::Open
    }

    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Milliseconds until the circuit half-opens, 0 unless open
    pub fn time_until_retry(&self) -> u64 {
        match self.state() {
            CircuitState::Open => {
                (self.cooldown.as_millis() as u64).saturating_sub(self.elapsed_since_failure())
            }
            _ => 0,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_starts_closed() {
        let cb = CircuitBreaker::default();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.can_execute());
        assert_eq!(cb.time_until_retry(), 0);
    }

    #[test]
    fn test_opens_at_threshold() {
        let cb = CircuitBreaker::new(3, 60);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_execute());

        let remaining = cb.time_until_retry();
        assert!(remaining > 0 && remaining <= 60_000);
    }

    #[test]
    fn test_success_resets() {
        let cb = CircuitBreaker::new(2, 60);
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.failure_count(), 1);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_then_recover() {
        let cb = CircuitBreaker::new(1, 1);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        sleep(Duration::from_millis(1100));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.can_execute());

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
