//! Facebook page publisher (Graph API)

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;

use super::http::{id_at, HttpClient};
use super::{ContentRules, MediaRequirement, PlatformPublisher, Publication, PublishRequest};
use crate::error::{PlatformError, Result};

pub const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v18.0";

pub struct FacebookPublisher {
    http: HttpClient,
    timeout: Duration,
}

impl FacebookPublisher {
    pub fn new(api_base: Option<&str>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(api_base.unwrap_or(DEFAULT_API_BASE), timeout)?,
            timeout,
        })
    }
}

#[async_trait]
impl PlatformPublisher for FacebookPublisher {
    fn platform(&self) -> &str {
        "facebook"
    }

    fn rules(&self) -> ContentRules {
        ContentRules {
            max_chars: Some(63_206),
            media: MediaRequirement::TextOrMedia,
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn publish(&self, request: &PublishRequest) -> std::result::Result<Publication, PlatformError> {
        let page_id = request
            .account
            .meta("page_id")
            .unwrap_or(&request.account.id);
        let token = request.access_token.expose_secret();

        // A photo post carries the text as its caption
        let call = match request.media_urls.first() {
            Some(url) => self.http.post(&format!("{}/photos", page_id)).form(&[
                ("url", url.as_str()),
                ("caption", request.content.as_str()),
                ("access_token", token),
            ]),
            None => self.http.post(&format!("{}/feed", page_id)).form(&[
                ("message", request.content.as_str()),
                ("access_token", token),
            ]),
        };

        let response = self.http.send(call).await?;

        let id = id_at(&response.body, "/post_id")
            .or_else(|| id_at(&response.body, "/id"))
            .ok_or_else(|| {
                PlatformError::Permanent("Facebook response did not include a post id".to_string())
            })?;

        Ok(Publication {
            url: Some(format!("https://www.facebook.com/{}", id)),
            platform_post_id: id,
            raw: Some(response.raw),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publishers::http::testing::{serve, CannedResponse};
    use crate::types::SocialAccount;
    use secrecy::SecretString;

    fn request(media_urls: Vec<String>) -> PublishRequest {
        PublishRequest {
            post_id: "p1".to_string(),
            content: "Spring sale".to_string(),
            media: media_urls.clone(),
            media_urls,
            account: SocialAccount::new("acct-1", "facebook").with_metadata("page_id", "555"),
            access_token: SecretString::from("page-token".to_string()),
        }
    }

    #[tokio::test]
    async fn test_text_post_goes_to_feed() {
        let stub = serve(vec![CannedResponse::json(200, r#"{"id":"555_42"}"#)]).await;
        let publisher = FacebookPublisher::new(Some(&stub.base), Duration::from_secs(5)).unwrap();

        let publication = publisher.publish(&request(vec![])).await.unwrap();

        assert_eq!(publication.platform_post_id, "555_42");
        assert_eq!(
            publication.url.as_deref(),
            Some("https://www.facebook.com/555_42")
        );
        let sent = stub.request(0);
        assert!(sent.starts_with("POST /555/feed"));
        assert!(sent.contains("access_token=page-token"));
    }

    #[tokio::test]
    async fn test_photo_post_prefers_post_id() {
        let stub = serve(vec![CannedResponse::json(
            200,
            r#"{"id":"photo_9","post_id":"555_77"}"#,
        )])
        .await;
        let publisher = FacebookPublisher::new(Some(&stub.base), Duration::from_secs(5)).unwrap();

        let publication = publisher
            .publish(&request(vec!["https://cdn.example.com/a.jpg".to_string()]))
            .await
            .unwrap();

        assert_eq!(publication.platform_post_id, "555_77");
        assert!(stub.request(0).starts_with("POST /555/photos"));
    }

    #[tokio::test]
    async fn test_expired_token_is_permanent() {
        let stub = serve(vec![CannedResponse::json(
            401,
            r#"{"error":{"message":"Session has expired","code":190}}"#,
        )])
        .await;
        let publisher = FacebookPublisher::new(Some(&stub.base), Duration::from_secs(5)).unwrap();

        let err = publisher.publish(&request(vec![])).await.unwrap_err();
        assert!(matches!(err, PlatformError::Permanent(_)));
    }
}
