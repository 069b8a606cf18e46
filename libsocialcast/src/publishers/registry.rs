//! Platform name to publisher lookup

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::facebook::FacebookPublisher;
use super::instagram::InstagramPublisher;
use super::linkedin::LinkedInPublisher;
use super::log::LogPublisher;
use super::pinterest::PinterestPublisher;
use super::tiktok::TikTokPublisher;
use super::twitter::TwitterPublisher;
use super::{PlatformPublisher, DEFAULT_TIMEOUT};
use crate::config::{Config, PlatformConfig};
use crate::error::{Result, SocialcastError};

/// Platforms with a built-in publisher
pub const SUPPORTED_PLATFORMS: &[&str] = &[
    "facebook",
    "instagram",
    "linkedin",
    "pinterest",
    "tiktok",
    "twitter",
];

/// Canonical platform identifier: lowercase, with `x` meaning `twitter`
pub fn normalize_platform(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    match lower.as_str() {
        "x" => "twitter".to_string(),
        _ => lower,
    }
}

#[derive(Default, Clone)]
pub struct PublisherRegistry {
    publishers: BTreeMap<String, Arc<dyn PlatformPublisher>>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the publisher for its platform
    pub fn register(&mut self, publisher: Arc<dyn PlatformPublisher>) {
        let name = normalize_platform(publisher.platform());
        debug!("Registered publisher for {}", name);
        self.publishers.insert(name, publisher);
    }

    pub fn with(mut self, publisher: impl PlatformPublisher + 'static) -> Self {
        self.register(Arc::new(publisher));
        self
    }

    pub fn get(&self, platform: &str) -> Result<Arc<dyn PlatformPublisher>> {
        self.publishers
            .get(&normalize_platform(platform))
            .cloned()
            .ok_or_else(|| SocialcastError::UnsupportedPlatform(platform.to_string()))
    }

    pub fn contains(&self, platform: &str) -> bool {
        self.publishers.contains_key(&normalize_platform(platform))
    }

    pub fn platforms(&self) -> Vec<&str> {
        self.publishers.keys().map(String::as_str).collect()
    }

    /// Build publishers for every enabled platform in the configuration.
    ///
    /// Unknown platform names are a configuration error, caught here at
    /// startup rather than at dispatch time.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Self::new();

        for (name, platform) in config.enabled_platforms() {
            let publisher = build_publisher(&normalize_platform(name), platform)?;
            let publisher: Arc<dyn PlatformPublisher> = if platform.log_only {
                Arc::new(LogPublisher::standing_in_for(publisher.as_ref()))
            } else {
                publisher
            };
            registry.register(publisher);
        }

        Ok(registry)
    }
}

fn build_publisher(name: &str, config: &PlatformConfig) -> Result<Arc<dyn PlatformPublisher>> {
    let api_base = config.api_base.as_deref();
    let timeout = config
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TIMEOUT);

    let publisher: Arc<dyn PlatformPublisher> = match name {
        "facebook" => Arc::new(FacebookPublisher::new(api_base, timeout)?),
        "instagram" => Arc::new(InstagramPublisher::new(api_base, timeout)?),
        "linkedin" => Arc::new(LinkedInPublisher::new(api_base, timeout)?),
        "pinterest" => Arc::new(PinterestPublisher::new(api_base, timeout)?),
        "tiktok" => Arc::new(TikTokPublisher::new(api_base, timeout)?),
        "twitter" => Arc::new(TwitterPublisher::new(api_base, timeout)?),
        other => return Err(SocialcastError::UnsupportedPlatform(other.to_string())),
    };

    Ok(publisher)
}
