//! TikTok publisher (Content Posting API, pull-from-URL)

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::{json, Value};

use super::http::{id_at, HttpClient};
use super::{ContentRules, MediaRequirement, PlatformPublisher, Publication, PublishRequest};
use crate::error::{PlatformError, Result};

pub const DEFAULT_API_BASE: &str = "https://open.tiktokapis.com/v2";

/// Error codes TikTok returns with a 2xx status when throttling
const THROTTLE_CODES: &[&str] = &["rate_limit_exceeded", "spam_risk_too_many_posts"];

pub struct TikTokPublisher {
    http: HttpClient,
    timeout: Duration,
}

impl TikTokPublisher {
    pub fn new(api_base: Option<&str>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(api_base.unwrap_or(DEFAULT_API_BASE), timeout)?,
            timeout,
        })
    }
}

/// TikTok reports some failures in the body of a successful response
fn body_error(body: &Value) -> Option<PlatformError> {
    let code = body.pointer("/error/code").and_then(Value::as_str)?;
    if code == "ok" {
        return None;
    }

    let message = body
        .pointer("/error/message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let detail = format!("TikTok error {}: {}", code, message);

    if THROTTLE_CODES.contains(&code) {
        Some(PlatformError::RateLimited {
            message: detail,
            retry_after: None,
        })
    } else {
        Some(PlatformError::Permanent(detail))
    }
}

#[async_trait]
impl PlatformPublisher for TikTokPublisher {
    fn platform(&self) -> &str {
        "tiktok"
    }

    fn rules(&self) -> ContentRules {
        ContentRules {
            max_chars: Some(2_200),
            media: MediaRequirement::Video,
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn publish(&self, request: &PublishRequest) -> std::result::Result<Publication, PlatformError> {
        let video_url = request.media_urls.first().ok_or_else(|| {
            PlatformError::Validation("tiktok requires at least one media reference".to_string())
        })?;

        let body = json!({
            "post_info": {
                "title": request.content,
                "privacy_level": request.account.meta("privacy_level").unwrap_or("PUBLIC_TO_EVERYONE"),
            },
            "source_info": {
                "source": "PULL_FROM_URL",
                "video_url": video_url,
            }
        });

        let call = self
            .http
            .post("post/publish/video/init/")
            .bearer_auth(request.access_token.expose_secret())
            .json(&body);
        let response = self.http.send(call).await?;

        if let Some(error) = body_error(&response.body) {
            return Err(error);
        }

        let id = id_at(&response.body, "/data/publish_id").ok_or_else(|| {
            PlatformError::Permanent("TikTok response did not include a publish id".to_string())
        })?;

        Ok(Publication {
            url: request
                .account
                .meta("username")
                .map(|user| format!("https://www.tiktok.com/@{}", user)),
            platform_post_id: id,
            raw: Some(response.raw),
        })
    }
}
