//! Publisher that logs instead of calling the platform
//!
//! Stands in for a real platform (same name, same content rules) so dry
//! runs exercise validation, breakers and result recording end to end.

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use super::{ContentRules, PlatformPublisher, Publication, PublishRequest};
use crate::error::PlatformError;

pub struct LogPublisher {
    platform: String,
    rules: ContentRules,
}

impl LogPublisher {
    pub fn new(platform: impl Into<String>, rules: ContentRules) -> Self {
        Self {
            platform: platform.into(),
            rules,
        }
    }

    /// Log-only stand-in with the rules of `publisher`
    pub fn standing_in_for(publisher: &dyn PlatformPublisher) -> Self {
        Self::new(publisher.platform(), publisher.rules())
    }
}

#[async_trait]
impl PlatformPublisher for LogPublisher {
    fn platform(&self) -> &str {
        &self.platform
    }

    fn rules(&self) -> ContentRules {
        self.rules
    }

    async fn publish(&self, request: &PublishRequest) -> Result<Publication, PlatformError> {
        let id = format!("log-{}", Uuid::new_v4());

        info!(
            platform = %self.platform,
            post_id = %request.post_id,
            account_id = %request.account.id,
            media = request.media_urls.len(),
            "Would publish {} characters",
            request.content.chars().count()
        );

        Ok(Publication {
            platform_post_id: id,
            url: None,
            raw: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publishers::MediaRequirement;
    use crate::types::SocialAccount;
    use secrecy::SecretString;

    #[tokio::test]
    async fn test_log_publisher_keeps_rules_and_succeeds() {
        let publisher = LogPublisher::new(
            "instagram",
            ContentRules {
                max_chars: Some(2_200),
                media: MediaRequirement::AtLeastOne,
            },
        );
        assert!(publisher.validate("caption", &[]).is_err());

        let publication = publisher
            .publish(&PublishRequest {
                post_id: "p1".to_string(),
                content: "caption".to_string(),
                media: vec!["a.jpg".to_string()],
                media_urls: vec!["https://cdn/a.jpg".to_string()],
                account: SocialAccount::new("ig", "instagram"),
                access_token: SecretString::from("unused".to_string()),
            })
            .await
            .unwrap();

        assert!(publication.platform_post_id.starts_with("log-"));
    }
}
