//! Bounded retry with linear backoff

use std::collections::HashMap;
use std::time::Duration;

use crate::config::Config;
use crate::error::PlatformError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Minimum wait after a rate-limited response
    pub rate_limit_floor: Duration,
    platform_floors: HashMap<String, Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(30))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, rate_limit_floor: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            rate_limit_floor,
            platform_floors: HashMap::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let resilience = &config.resilience;
        let mut policy = Self::new(
            resilience.max_retries,
            resilience.base_delay(),
            resilience.rate_limit_floor(),
        );
        for (name, platform) in &config.platforms {
            if let Some(secs) = platform.rate_limit_floor_secs {
                policy = policy.with_platform_floor(name.clone(), Duration::from_secs(secs));
            }
        }
        policy
    }

    pub fn with_platform_floor(mut self, key: impl Into<String>, floor: Duration) -> Self {
        self.platform_floors.insert(key.into(), floor);
        self
    }

    pub fn floor_for(&self, key: &str) -> Duration {
        self.platform_floors
            .get(key)
            .copied()
            .unwrap_or(self.rate_limit_floor)
    }

    /// Wait before attempt `attempt + 1`, given the error attempt `attempt` produced.
    ///
    /// `base_delay * attempt`, raised to the platform floor (or the server's
    /// Retry-After, whichever is longer) for rate-limited responses.
    pub fn delay_for(&self, key: &str, attempt: u32, error: &PlatformError) -> Duration {
        let linear = self.base_delay.saturating_mul(attempt.max(1));

        match error {
            PlatformError::RateLimited { retry_after, .. } => {
                let floor = self.floor_for(key);
                let requested = retry_after.unwrap_or(Duration::ZERO);
                linear.max(floor).max(requested)
            }
            _ => linear,
        }
    }
}
