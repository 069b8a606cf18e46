//! Platform publishers
//!
//! One [`PlatformPublisher`] per social platform. A publisher turns a post
//! and a target account into exactly one outbound API call and classifies
//! whatever goes wrong. Retrying is never its job.
//!
//! # Examples
//!
//! ```no_run
//! use libsocialcast::publishers::{PlatformPublisher, PublisherRegistry};
//! use libsocialcast::config::Config;
//!
//! # fn example() -> libsocialcast::error::Result<()> {
//! let config = Config::load()?;
//! let registry = PublisherRegistry::from_config(&config)?;
//! let instagram = registry.get("instagram")?;
//!
//! // Rejected before any network call
//! assert!(instagram.validate("caption only", &[]).is_err());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::PlatformError;
use crate::types::SocialAccount;

pub mod facebook;
pub mod http;
pub mod instagram;
pub mod linkedin;
pub mod log;
pub mod pinterest;
pub mod registry;
pub mod tiktok;
pub mod twitter;

// Available in all builds so integration tests and dry runs can use it
pub mod mock;

pub use registry::PublisherRegistry;

/// File extensions TikTok accepts as video
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "m4v", "avi"];

/// Default bound on a single outbound call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaRequirement {
    /// Text, media, or both, as long as something is there
    TextOrMedia,
    /// At least one media reference
    AtLeastOne,
    /// At least one media reference with a video extension
    Video,
}

/// Content shape a platform accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRules {
    pub max_chars: Option<usize>,
    pub media: MediaRequirement,
}

/// Everything a publisher needs for one call
#[derive(Debug)]
pub struct PublishRequest {
    pub post_id: String,
    pub content: String,
    /// Media references as stored on the post
    pub media: Vec<String>,
    /// Public URLs for `media`, same order
    pub media_urls: Vec<String>,
    pub account: SocialAccount,
    pub access_token: SecretString,
}

/// Normalized success returned by a publisher
#[derive(Debug, Clone, PartialEq)]
pub struct Publication {
    pub platform_post_id: String,
    pub url: Option<String>,
    /// Raw response body, kept for diagnostics
    pub raw: Option<String>,
}

#[async_trait]
pub trait PlatformPublisher: Send + Sync {
    /// Lowercase platform identifier used in targets and breaker keys
    fn platform(&self) -> &str;

    fn rules(&self) -> ContentRules;

    /// Check the content against [`rules`](Self::rules). Never touches the network.
    fn validate(&self, content: &str, media: &[String]) -> Result<(), PlatformError> {
        validate_against(self.platform(), &self.rules(), content, media)
    }

    /// Upper bound for one [`publish`](Self::publish) call
    fn timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }

    /// Make the outbound call. One invocation, one publish attempt.
    async fn publish(&self, request: &PublishRequest) -> Result<Publication, PlatformError>;
}

/// Shared validation used by every built-in publisher
pub fn validate_against(
    platform: &str,
    rules: &ContentRules,
    content: &str,
    media: &[String],
) -> Result<(), PlatformError> {
    let has_text = !content.trim().is_empty();

    match rules.media {
        MediaRequirement::TextOrMedia => {
            if !has_text && media.is_empty() {
                return Err(PlatformError::Validation(format!(
                    "{} requires text or at least one media reference",
                    platform
                )));
            }
        }
        MediaRequirement::AtLeastOne => {
            if media.is_empty() {
                return Err(PlatformError::Validation(format!(
                    "{} requires at least one media reference",
                    platform
                )));
            }
        }
        MediaRequirement::Video => {
            if media.is_empty() {
                return Err(PlatformError::Validation(format!(
                    "{} requires at least one media reference",
                    platform
                )));
            }
            if let Some(bad) = media.iter().find(|m| !is_video(m)) {
                return Err(PlatformError::Validation(format!(
                    "{} requires video media ({}), got '{}'",
                    platform,
                    VIDEO_EXTENSIONS.join(", "),
                    bad
                )));
            }
        }
    }

    if let Some(limit) = rules.max_chars {
        let length = content.chars().count();
        if length > limit {
            return Err(PlatformError::Validation(format!(
                "Content exceeds {} character limit ({} characters, got {})",
                platform, limit, length
            )));
        }
    }

    Ok(())
}

/// Whether a media reference names a video file, ignoring query and fragment
pub fn is_video(reference: &str) -> bool {
    let path = reference
        .split(['?', '#'])
        .next()
        .unwrap_or(reference);
    let file = path.rsplit('/').next().unwrap_or(path);

    match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => VIDEO_EXTENSIONS
            .iter()
            .any(|v| v.eq_ignore_ascii_case(ext)),
        _ => false,
    }
}
