//! LinkedIn publisher (UGC posts API)

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::json;

use super::http::{id_at, HttpClient};
use super::{ContentRules, MediaRequirement, PlatformPublisher, Publication, PublishRequest};
use crate::error::{PlatformError, Result};

pub const DEFAULT_API_BASE: &str = "https://api.linkedin.com/v2";

pub struct LinkedInPublisher {
    http: HttpClient,
    timeout: Duration,
}

impl LinkedInPublisher {
    pub fn new(api_base: Option<&str>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(api_base.unwrap_or(DEFAULT_API_BASE), timeout)?,
            timeout,
        })
    }
}

fn share_body(author: &str, request: &PublishRequest) -> serde_json::Value {
    let media: Vec<_> = request
        .media_urls
        .iter()
        .map(|url| json!({ "status": "READY", "originalUrl": url }))
        .collect();
    let category = if media.is_empty() { "NONE" } else { "ARTICLE" };

    json!({
        "author": author,
        "lifecycleState": "PUBLISHED",
        "specificContent": {
            "com.linkedin.ugc.ShareContent": {
                "shareCommentary": { "text": request.content },
                "shareMediaCategory": category,
                "media": media,
            }
        },
        "visibility": {
            "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC"
        }
    })
}

#[async_trait]
impl PlatformPublisher for LinkedInPublisher {
    fn platform(&self) -> &str {
        "linkedin"
    }

    fn rules(&self) -> ContentRules {
        ContentRules {
            max_chars: Some(3_000),
            media: MediaRequirement::TextOrMedia,
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn publish(&self, request: &PublishRequest) -> std::result::Result<Publication, PlatformError> {
        let author = request
            .account
            .meta("author_urn")
            .map(str::to_string)
            .unwrap_or_else(|| format!("urn:li:person:{}", request.account.id));

        let call = self
            .http
            .post("ugcPosts")
            .bearer_auth(request.access_token.expose_secret())
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&share_body(&author, request));

        let response = self.http.send(call).await?;

        // LinkedIn answers 201 with the URN in a header and often an empty body
        let id = response
            .headers
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| id_at(&response.body, "/id"))
            .ok_or_else(|| {
                PlatformError::Permanent("LinkedIn response did not include a post URN".to_string())
            })?;

        Ok(Publication {
            url: Some(format!("https://www.linkedin.com/feed/update/{}/", id)),
            platform_post_id: id,
            raw: (!response.raw.is_empty()).then_some(response.raw),
        })
    }
}
