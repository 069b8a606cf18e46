//! Scriptable publisher for tests
//!
//! Outcomes are consumed in order; once the script runs out the fallback
//! outcome repeats. Counters are shared through `Arc` so a test keeps a
//! handle after moving the publisher into a registry.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use super::{
    ContentRules, MediaRequirement, PlatformPublisher, Publication, PublishRequest,
    DEFAULT_TIMEOUT,
};
use crate::error::PlatformError;

type Outcome = Result<Publication, PlatformError>;

/// Call bookkeeping visible to the test
#[derive(Debug, Clone, Default)]
pub struct MockCalls {
    count: Arc<Mutex<usize>>,
    in_flight: Arc<Mutex<usize>>,
    max_in_flight: Arc<Mutex<usize>>,
    contents: Arc<Mutex<Vec<String>>>,
}

impl MockCalls {
    pub fn count(&self) -> usize {
        *self.count.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Highest number of overlapping `publish` calls observed
    pub fn max_in_flight(&self) -> usize {
        *self.max_in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn contents(&self) -> Vec<String> {
        self.contents.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

pub struct MockPublisher {
    platform: String,
    rules: ContentRules,
    delay: Duration,
    timeout: Duration,
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    calls: MockCalls,
}

impl MockPublisher {
    /// Always succeeds
    pub fn success(platform: &str) -> Self {
        let fallback = Ok(Publication {
            platform_post_id: format!("{}-post", platform),
            url: Some(format!("https://{}.example.com/p/{}-post", platform, platform)),
            raw: Some("{}".to_string()),
        });
        Self {
            platform: platform.to_string(),
            rules: ContentRules {
                max_chars: None,
                media: MediaRequirement::TextOrMedia,
            },
            delay: Duration::ZERO,
            timeout: DEFAULT_TIMEOUT,
            script: Mutex::new(VecDeque::new()),
            fallback,
            calls: MockCalls::default(),
        }
    }

    /// Always fails with `error`
    pub fn failing(platform: &str, error: PlatformError) -> Self {
        Self {
            fallback: Err(error),
            ..Self::success(platform)
        }
    }

    /// Play `outcomes` in order, then keep succeeding
    pub fn scripted(platform: &str, outcomes: Vec<Outcome>) -> Self {
        let publisher = Self::success(platform);
        *publisher.script.lock().unwrap_or_else(|e| e.into_inner()) = outcomes.into();
        publisher
    }

    pub fn with_rules(mut self, rules: ContentRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Per-call timeout the engine applies to this publisher
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn calls(&self) -> MockCalls {
        self.calls.clone()
    }

    fn next_outcome(&self) -> Outcome {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        script.pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl PlatformPublisher for MockPublisher {
    fn platform(&self) -> &str {
        &self.platform
    }

    fn rules(&self) -> ContentRules {
        self.rules
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn publish(&self, request: &PublishRequest) -> Result<Publication, PlatformError> {
        {
            *self.calls.count.lock().unwrap_or_else(|e| e.into_inner()) += 1;
            self.calls
                .contents
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(request.content.clone());

            let mut in_flight = self.calls.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            *in_flight += 1;
            let mut max = self
                .calls
                .max_in_flight
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            *max = (*max).max(*in_flight);
        }

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        *self
            .calls
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner()) -= 1;

        self.next_outcome()
    }
}
