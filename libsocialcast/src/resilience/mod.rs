//! Circuit breaking and bounded retry around platform calls
//!
//! Publishers only classify failures. [`ResilienceGuard`] turns that
//! classification into policy: transient and rate-limited failures are
//! retried with linear backoff, everything else fails at once, and every
//! attempt passes through the breaker of its dependency key.
//!
//! ```no_run
//! use std::sync::Arc;
//! use libsocialcast::error::PlatformError;
//! use libsocialcast::resilience::{InMemoryCircuitStore, ResilienceGuard, RetryPolicy};
//! use libsocialcast::resilience::CircuitBreakerConfig;
//!
//! # async fn example() {
//! let guard = ResilienceGuard::new(
//!     CircuitBreakerConfig::default(),
//!     RetryPolicy::default(),
//!     Arc::new(InMemoryCircuitStore::new()),
//! );
//! let outcome = guard
//!     .execute("twitter", |_attempt| async { Ok::<_, PlatformError>("1234") })
//!     .await;
//! # }
//! ```

pub mod breaker;
pub mod retry;
pub mod store;

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{PlatformError, ResilienceError, Result};
use crate::types::CircuitSnapshot;

pub use breaker::{Admission, CircuitBreaker, CircuitBreakerConfig, Outcome};
pub use retry::RetryPolicy;
pub use store::{CircuitStateStore, InMemoryCircuitStore, SqliteCircuitStore};

/// One breaker per dependency key, created on first use from whatever the
/// store remembers.
pub struct CircuitBreakers {
    config: CircuitBreakerConfig,
    store: Arc<dyn CircuitStateStore>,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakers {
    pub fn new(config: CircuitBreakerConfig, store: Arc<dyn CircuitStateStore>) -> Self {
        Self {
            config,
            store,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    /// Breaker for `key`, synced with the store when the store is shared.
    pub async fn get(&self, key: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().await;

        if let Some(existing) = breakers.get(key) {
            if self.store.is_shared() {
                if let Some(snapshot) = self.load(key).await {
                    existing.restore(snapshot);
                }
            }
            return Arc::clone(existing);
        }

        let snapshot = self.load(key).await.unwrap_or_default();
        let breaker = Arc::new(CircuitBreaker::with_snapshot(key, self.config, snapshot));
        breakers.insert(key.to_string(), Arc::clone(&breaker));
        breaker
    }

    async fn load(&self, key: &str) -> Option<CircuitSnapshot> {
        match self.store.load(key).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Failed to load circuit state for '{}': {}", key, e);
                None
            }
        }
    }

    /// Write a breaker's state through to the store.
    ///
    /// Store failures are logged, never surfaced: the in-process breaker
    /// keeps working on its own.
    pub async fn persist(&self, breaker: &CircuitBreaker) {
        let snapshot = breaker.snapshot();
        if let Err(e) = self.store.save(breaker.key(), &snapshot).await {
            warn!(
                "Failed to persist circuit state for '{}': {}",
                breaker.key(),
                e
            );
        }
    }

    /// Every known breaker state; live breakers win over stored rows.
    pub async fn snapshot(&self) -> Result<Vec<(String, CircuitSnapshot)>> {
        let mut merged: BTreeMap<String, CircuitSnapshot> =
            self.store.list().await?.into_iter().collect();

        let breakers = self.breakers.lock().await;
        if !self.store.is_shared() {
            for (key, breaker) in breakers.iter() {
                merged.insert(key.clone(), breaker.snapshot());
            }
        }

        Ok(merged.into_iter().collect())
    }
}

/// Value produced by a guarded call and the attempts it took
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

pub struct ResilienceGuard {
    breakers: CircuitBreakers,
    policy: RetryPolicy,
}

impl ResilienceGuard {
    pub fn new(
        config: CircuitBreakerConfig,
        policy: RetryPolicy,
        store: Arc<dyn CircuitStateStore>,
    ) -> Self {
        Self {
            breakers: CircuitBreakers::new(config, store),
            policy,
        }
    }

    pub fn from_config(config: &Config, store: Arc<dyn CircuitStateStore>) -> Self {
        Self::new(
            CircuitBreakerConfig::from(&config.resilience),
            RetryPolicy::from_config(config),
            store,
        )
    }

    pub fn breakers(&self) -> &CircuitBreakers {
        &self.breakers
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` under the breaker for `key`, retrying retryable failures.
    ///
    /// `op` receives the 1-based attempt number. It is never invoked while
    /// the circuit is open. Waiting between attempts suspends only the
    /// calling task.
    pub async fn execute<T, F, Fut>(
        &self,
        key: &str,
        op: F,
    ) -> std::result::Result<Attempted<T>, ResilienceError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, PlatformError>>,
    {
        self.execute_gated(key, Duration::MAX, |_| std::future::ready(Ok(())), op)
            .await
    }

    /// [`execute`](Self::execute) with a check before every attempt and a
    /// ceiling on the wait between attempts.
    ///
    /// `gate` runs before each attempt, ahead of the breaker; an `Err`
    /// stops the loop with [`ResilienceError::Stopped`]. A retryable
    /// failure whose backoff exceeds `max_wait` is returned as is instead
    /// of being slept on.
    pub async fn execute_gated<T, G, GFut, F, Fut>(
        &self,
        key: &str,
        max_wait: Duration,
        mut gate: G,
        mut op: F,
    ) -> std::result::Result<Attempted<T>, ResilienceError>
    where
        G: FnMut(u32) -> GFut,
        GFut: Future<Output = std::result::Result<(), String>>,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, PlatformError>>,
    {
        let breaker = self.breakers.get(key).await;
        let max_attempts = self.policy.max_attempts;
        let mut attempts = 0;

        loop {
            if let Err(reason) = gate(attempts + 1).await {
                debug!("Not calling {} again: {}", key, reason);
                return Err(ResilienceError::Stopped { reason, attempts });
            }

            match breaker.try_acquire() {
                Admission::Rejected => {
                    debug!("Circuit open for {}, skipping call", key);
                    return Err(ResilienceError::CircuitOpen {
                        key: key.to_string(),
                        attempts,
                    });
                }
                Admission::Probe => {
                    info!("Circuit for {} half-open, sending probe", key);
                    self.breakers.persist(&breaker).await;
                }
                Admission::Allowed => {}
            }

            attempts += 1;
            let result = op(attempts).await;

            let previous = breaker.state();
            if breaker.record(Outcome::from_result(&result)) {
                let current = breaker.state();
                if current != previous {
                    info!("Circuit for {} moved {} -> {}", key, previous, current);
                }
                self.breakers.persist(&breaker).await;
            }

            match result {
                Ok(value) => {
                    if attempts > 1 {
                        info!("Call to {} succeeded on attempt {}", key, attempts);
                    }
                    return Ok(Attempted { value, attempts });
                }
                Err(error) if !error.is_retryable() => {
                    return Err(ResilienceError::Failed { error, attempts });
                }
                Err(error) if attempts >= max_attempts => {
                    warn!(
                        "Call to {} failed after {} attempts: {}",
                        key, attempts, error
                    );
                    return Err(ResilienceError::Failed { error, attempts });
                }
                Err(error) => {
                    let delay = self.policy.delay_for(key, attempts, &error);
                    if delay > max_wait {
                        warn!(
                            "{} asks for {:?} before attempt {}, over the {:?} limit; leaving it for a later dispatch: {}",
                            key,
                            delay,
                            attempts + 1,
                            max_wait,
                            error
                        );
                        return Err(ResilienceError::Failed { error, attempts });
                    }
                    warn!(
                        "Retryable error from {} (attempt {}/{}): {}. Retrying in {:?}...",
                        key, attempts, max_attempts, error, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CircuitState;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn guard(threshold: u32, max_attempts: u32, reset: Duration) -> ResilienceGuard {
        ResilienceGuard::new(
            CircuitBreakerConfig {
                failure_threshold: threshold,
                reset_timeout: reset,
            },
            RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(2)),
            Arc::new(InMemoryCircuitStore::new()),
        )
    }

    #[tokio::test]
    async fn test_transient_retries_exactly_max_attempts() {
        let guard = guard(10, 3, Duration::from_secs(60));
        let calls = AtomicU32::new(0);

        let result = guard
            .execute("twitter", |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(PlatformError::Transient("503".into()))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(ResilienceError::Failed { error, attempts }) => {
                assert_eq!(attempts, 3);
                assert_eq!(error, PlatformError::Transient("503".into()));
            }
            other => panic!("Expected exhausted retries, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_validation_is_single_attempt() {
        let guard = guard(3, 3, Duration::from_secs(60));
        let calls = AtomicU32::new(0);

        let result = guard
            .execute("instagram", |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(PlatformError::Validation("no media".into()))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().attempts(), 1);
    }

    #[tokio::test]
    async fn test_permanent_is_single_attempt() {
        let guard = guard(3, 3, Duration::from_secs(60));
        let calls = AtomicU32::new(0);

        let result = guard
            .execute("linkedin", |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(PlatformError::Permanent("401".into()))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(ResilienceError::Failed {
                error: PlatformError::Permanent(_),
                attempts: 1
            })
        ));
    }

    #[tokio::test]
    async fn test_success_after_transient() {
        let guard = guard(3, 3, Duration::from_secs(60));

        let result = guard
            .execute("facebook", |attempt| async move {
                if attempt == 1 {
                    Err(PlatformError::Transient("timeout".into()))
                } else {
                    Ok("fb_1")
                }
            })
            .await
            .unwrap();

        assert_eq!(result, Attempted { value: "fb_1", attempts: 2 });
        let breaker = guard.breakers().get("facebook").await;
        assert_eq!(breaker.snapshot(), CircuitSnapshot::default());
    }

    #[tokio::test]
    async fn test_open_circuit_skips_operation() {
        let guard = guard(3, 3, Duration::from_secs(60));

        let _ = guard
            .execute("tiktok", |_| async {
                Err::<(), _>(PlatformError::Transient("502".into()))
            })
            .await;

        let calls = AtomicU32::new(0);
        let result = guard
            .execute("tiktok", |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            result,
            Err(ResilienceError::CircuitOpen { attempts: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_breaker_opening_mid_retry_stops_loop() {
        let guard = guard(2, 5, Duration::from_secs(60));
        let calls = AtomicU32::new(0);

        let result = guard
            .execute("pinterest", |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(PlatformError::Transient("503".into()))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(
            result,
            Err(ResilienceError::CircuitOpen { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_probe_after_reset_timeout() {
        let guard = guard(1, 1, Duration::from_millis(20));

        let _ = guard
            .execute("twitter", |_| async {
                Err::<(), _>(PlatformError::Transient("503".into()))
            })
            .await;
        assert_eq!(
            guard.breakers().get("twitter").await.state(),
            CircuitState::Open
        );

        tokio::time::sleep(Duration::from_millis(40)).await;

        let result = guard.execute("twitter", |_| async { Ok(7) }).await.unwrap();
        assert_eq!(result.value, 7);
        assert_eq!(
            guard.breakers().get("twitter").await.state(),
            CircuitState::Closed
        );
    }

    #[tokio::test]
    async fn test_keys_are_isolated() {
        let guard = guard(1, 1, Duration::from_secs(60));

        let _ = guard
            .execute("twitter", |_| async {
                Err::<(), _>(PlatformError::Transient("503".into()))
            })
            .await;

        let result = guard.execute("linkedin", |_| async { Ok(()) }).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_state_written_through_to_store() {
        let store = Arc::new(InMemoryCircuitStore::new());
        let guard = ResilienceGuard::new(
            CircuitBreakerConfig {
                failure_threshold: 1,
                reset_timeout: Duration::from_secs(60),
            },
            RetryPolicy::new(1, Duration::ZERO, Duration::ZERO),
            store.clone(),
        );

        let _ = guard
            .execute("facebook", |_| async {
                Err::<(), _>(PlatformError::Transient("503".into()))
            })
            .await;

        let stored = store.load("facebook").await.unwrap().unwrap();
        assert_eq!(stored.state, CircuitState::Open);

        // A fresh registry over the same store starts open
        let restarted = CircuitBreakers::new(CircuitBreakerConfig::default(), store);
        assert_eq!(restarted.get("facebook").await.state(), CircuitState::Open);

        let all = guard.breakers().snapshot().await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_gate_refusal_stops_before_next_attempt() {
        let guard = guard(10, 5, Duration::from_secs(60));
        let calls = AtomicU32::new(0);

        let result = guard
            .execute_gated(
                "twitter",
                Duration::from_secs(60),
                |attempt| async move {
                    if attempt > 2 {
                        Err("claim lost".to_string())
                    } else {
                        Ok(())
                    }
                },
                |_| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(PlatformError::Transient("503".into()))
                },
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match result {
            Err(ResilienceError::Stopped { reason, attempts }) => {
                assert_eq!(reason, "claim lost");
                assert_eq!(attempts, 2);
            }
            other => panic!("Expected a stop, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_backoff_over_max_wait_returns_without_sleeping() {
        let guard = guard(10, 3, Duration::from_secs(60));
        let calls = AtomicU32::new(0);
        let started = std::time::Instant::now();

        let result = guard
            .execute_gated(
                "twitter",
                Duration::from_secs(1),
                |_| async { Ok(()) },
                |_| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(PlatformError::RateLimited {
                        message: "429".into(),
                        retry_after: Some(Duration::from_secs(30)),
                    })
                },
            )
            .await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(ResilienceError::Failed {
                error: PlatformError::RateLimited { .. },
                attempts: 1
            })
        ));
    }

    #[tokio::test]
    async fn test_gate_refusal_does_not_touch_breaker() {
        let guard = guard(1, 1, Duration::from_secs(60));

        let result = guard
            .execute_gated(
                "linkedin",
                Duration::MAX,
                |_| async { Err("already published".to_string()) },
                |_| async { Ok(()) },
            )
            .await;

        assert!(matches!(
            result,
            Err(ResilienceError::Stopped { attempts: 0, .. })
        ));
        assert_eq!(
            guard.breakers().get("linkedin").await.state(),
            CircuitState::Closed
        );
    }
}
