//! Per-dependency circuit breaker

use std::sync::Mutex;
use std::time::Duration;

use crate::config::ResilienceConfig;
use crate::error::PlatformError;
use crate::types::{CircuitSnapshot, CircuitState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Time an open circuit waits before letting a probe through
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&ResilienceConfig> for CircuitBreakerConfig {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            reset_timeout: config.reset_timeout(),
        }
    }
}

/// Answer to "may I call the dependency now?"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// The single half-open trial call
    Probe,
    Rejected,
}

/// How a finished call counts against the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Transient or rate limited: the dependency looks unhealthy
    Failure,
    /// Permanent rejection: the dependency answered, the request was bad
    Reachable,
    /// Validation failure: nothing was learned about the dependency
    Inconclusive,
}

impl Outcome {
    pub fn from_result<T>(result: &Result<T, PlatformError>) -> Self {
        match result {
            Ok(_) => Outcome::Success,
            Err(PlatformError::Transient(_)) | Err(PlatformError::RateLimited { .. }) => {
                Outcome::Failure
            }
            Err(PlatformError::Permanent(_)) => Outcome::Reachable,
            Err(PlatformError::Validation(_)) => Outcome::Inconclusive,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    snapshot: CircuitSnapshot,
    probe_in_flight: bool,
}

/// Circuit breaker for a single dependency key.
///
/// All transitions happen under one lock, so concurrent dispatches to the
/// same platform see a consistent counter and at most one half-open probe
/// is ever admitted.
#[derive(Debug)]
pub struct CircuitBreaker {
    key: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(key: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_snapshot(key, config, CircuitSnapshot::default())
    }

    pub fn with_snapshot(
        key: impl Into<String>,
        config: CircuitBreakerConfig,
        snapshot: CircuitSnapshot,
    ) -> Self {
        Self {
            key: key.into(),
            config,
            inner: Mutex::new(Inner {
                snapshot,
                probe_in_flight: false,
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        self.lock().snapshot.clone()
    }

    pub fn state(&self) -> CircuitState {
        self.lock().snapshot.state
    }

    /// Replace the persisted part of the state, keeping the local probe slot.
    pub fn restore(&self, snapshot: CircuitSnapshot) {
        self.lock().snapshot = snapshot;
    }

    pub fn try_acquire(&self) -> Admission {
        self.try_acquire_at(now_ms())
    }

    pub fn try_acquire_at(&self, now_ms: i64) -> Admission {
        let mut inner = self.lock();

        match inner.snapshot.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => {
                let opened_at = inner.snapshot.opened_at.unwrap_or(0);
                let reset_ms = self.config.reset_timeout.as_millis() as i64;
                if now_ms.saturating_sub(opened_at) >= reset_ms {
                    inner.snapshot.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    Admission::Probe
                } else {
                    Admission::Rejected
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    Admission::Rejected
                } else {
                    inner.probe_in_flight = true;
                    Admission::Probe
                }
            }
        }
    }

    /// Feed a call outcome back. Returns true when the persisted state changed.
    pub fn record(&self, outcome: Outcome) -> bool {
        self.record_at(outcome, now_ms())
    }

    pub fn record_at(&self, outcome: Outcome, now_ms: i64) -> bool {
        let mut inner = self.lock();
        let before = inner.snapshot.clone();

        match outcome {
            Outcome::Success => {
                inner.snapshot = CircuitSnapshot::default();
                inner.probe_in_flight = false;
            }
            Outcome::Failure => {
                let snapshot = &mut inner.snapshot;
                snapshot.consecutive_failures = snapshot.consecutive_failures.saturating_add(1);
                snapshot.last_failure_at = Some(now_ms);

                match snapshot.state {
                    CircuitState::HalfOpen => {
                        snapshot.state = CircuitState::Open;
                        snapshot.opened_at = Some(now_ms);
                    }
                    CircuitState::Closed
                        if snapshot.consecutive_failures >= self.config.failure_threshold =>
                    {
                        snapshot.state = CircuitState::Open;
                        snapshot.opened_at = Some(now_ms);
                    }
                    _ => {}
                }
                inner.probe_in_flight = false;
            }
            Outcome::Reachable => {
                if inner.snapshot.state == CircuitState::HalfOpen {
                    inner.snapshot = CircuitSnapshot::default();
                }
                inner.probe_in_flight = false;
            }
            Outcome::Inconclusive => {
                inner.probe_in_flight = false;
            }
        }

        inner.snapshot != before
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
