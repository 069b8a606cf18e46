//! Pinterest publisher (API v5 pins)

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::json;

use super::http::{id_at, HttpClient};
use super::{ContentRules, MediaRequirement, PlatformPublisher, Publication, PublishRequest};
use crate::error::{PlatformError, Result};

pub const DEFAULT_API_BASE: &str = "https://api.pinterest.com/v5";

pub struct PinterestPublisher {
    http: HttpClient,
    timeout: Duration,
}

impl PinterestPublisher {
    pub fn new(api_base: Option<&str>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(api_base.unwrap_or(DEFAULT_API_BASE), timeout)?,
            timeout,
        })
    }
}

#[async_trait]
impl PlatformPublisher for PinterestPublisher {
    fn platform(&self) -> &str {
        "pinterest"
    }

    fn rules(&self) -> ContentRules {
        ContentRules {
            max_chars: Some(500),
            media: MediaRequirement::AtLeastOne,
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn publish(&self, request: &PublishRequest) -> std::result::Result<Publication, PlatformError> {
        let board_id = request.account.meta("board_id").ok_or_else(|| {
            PlatformError::Validation("pinterest target is missing a board_id".to_string())
        })?;
        let image_url = request.media_urls.first().ok_or_else(|| {
            PlatformError::Validation("pinterest requires at least one media reference".to_string())
        })?;

        let mut body = json!({
            "board_id": board_id,
            "description": request.content,
            "media_source": {
                "source_type": "image_url",
                "url": image_url,
            }
        });
        if let Some(link) = request.account.meta("link") {
            body["link"] = json!(link);
        }

        let call = self
            .http
            .post("pins")
            .bearer_auth(request.access_token.expose_secret())
            .json(&body);
        let response = self.http.send(call).await?;

        let id = id_at(&response.body, "/id").ok_or_else(|| {
            PlatformError::Permanent("Pinterest response did not include a pin id".to_string())
        })?;

        Ok(Publication {
            url: Some(format!("https://www.pinterest.com/pin/{}/", id)),
            platform_post_id: id,
            raw: Some(response.raw),
        })
    }
}
