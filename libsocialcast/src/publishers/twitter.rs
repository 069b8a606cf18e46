//! Twitter / X publisher (API v2)
//!
//! Media is shared as links appended to the tweet text.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::json;

use super::http::{id_at, HttpClient};
use super::{ContentRules, MediaRequirement, PlatformPublisher, Publication, PublishRequest};
use crate::error::{PlatformError, Result};

pub const DEFAULT_API_BASE: &str = "https://api.x.com/2";

pub struct TwitterPublisher {
    http: HttpClient,
    timeout: Duration,
}

impl TwitterPublisher {
    pub fn new(api_base: Option<&str>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(api_base.unwrap_or(DEFAULT_API_BASE), timeout)?,
            timeout,
        })
    }
}

fn tweet_text(content: &str, media_urls: &[String]) -> String {
    let content = content.trim();
    if media_urls.is_empty() {
        return content.to_string();
    }
    let links = media_urls.join(" ");
    if content.is_empty() {
        links
    } else {
        format!("{}\n{}", content, links)
    }
}

#[async_trait]
impl PlatformPublisher for TwitterPublisher {
    fn platform(&self) -> &str {
        "twitter"
    }

    fn rules(&self) -> ContentRules {
        ContentRules {
            max_chars: Some(280),
            media: MediaRequirement::TextOrMedia,
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn publish(&self, request: &PublishRequest) -> std::result::Result<Publication, PlatformError> {
        let call = self
            .http
            .post("tweets")
            .bearer_auth(request.access_token.expose_secret())
            .json(&json!({ "text": tweet_text(&request.content, &request.media_urls) }));

        let response = self.http.send(call).await?;

        let id = id_at(&response.body, "/data/id").ok_or_else(|| {
            PlatformError::Permanent("Twitter response did not include a tweet id".to_string())
        })?;
        let handle = request.account.meta("username").unwrap_or("i/web");

        Ok(Publication {
            url: Some(format!("https://x.com/{}/status/{}", handle, id)),
            platform_post_id: id,
            raw: Some(response.raw),
        })
    }
}
