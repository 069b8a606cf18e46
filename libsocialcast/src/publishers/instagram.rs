//! Instagram business account publisher (Graph API)
//!
//! Publishing is a container create followed by a publish of that
//! container. A failed container step leaves nothing visible, so the pair is
//! treated as one publish attempt.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;

use super::http::{id_at, HttpClient};
use super::{
    is_video, ContentRules, MediaRequirement, PlatformPublisher, Publication, PublishRequest,
};
use crate::error::{PlatformError, Result};

pub const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v18.0";

pub struct InstagramPublisher {
    http: HttpClient,
    timeout: Duration,
}

impl InstagramPublisher {
    pub fn new(api_base: Option<&str>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(api_base.unwrap_or(DEFAULT_API_BASE), timeout)?,
            timeout,
        })
    }
}

#[async_trait]
impl PlatformPublisher for InstagramPublisher {
    fn platform(&self) -> &str {
        "instagram"
    }

    fn rules(&self) -> ContentRules {
        ContentRules {
            max_chars: Some(2_200),
            media: MediaRequirement::AtLeastOne,
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn publish(&self, request: &PublishRequest) -> std::result::Result<Publication, PlatformError> {
        let media_url = request.media_urls.first().ok_or_else(|| {
            PlatformError::Validation("instagram requires at least one media reference".to_string())
        })?;
        let ig_user = request
            .account
            .meta("ig_user_id")
            .unwrap_or(&request.account.id);
        let token = request.access_token.expose_secret();

        let mut container = vec![
            ("caption", request.content.as_str()),
            ("access_token", token),
        ];
        if is_video(media_url) {
            container.push(("media_type", "REELS"));
            container.push(("video_url", media_url.as_str()));
        } else {
            container.push(("image_url", media_url.as_str()));
        }

        let created = self
            .http
            .send(self.http.post(&format!("{}/media", ig_user)).form(&container))
            .await?;
        let creation_id = id_at(&created.body, "/id").ok_or_else(|| {
            PlatformError::Transient("Instagram did not return a media container id".to_string())
        })?;

        let published = self
            .http
            .send(
                self.http
                    .post(&format!("{}/media_publish", ig_user))
                    .form(&[("creation_id", creation_id.as_str()), ("access_token", token)]),
            )
            .await?;

        let id = id_at(&published.body, "/id").ok_or_else(|| {
            PlatformError::Permanent("Instagram response did not include a media id".to_string())
        })?;

        Ok(Publication {
            url: Some(format!("https://www.instagram.com/p/{}/", id)),
            platform_post_id: id,
            raw: Some(published.raw),
        })
    }
}
