//! Interfaces to the systems the publishing pipeline depends on
//!
//! Credentials, media hosting and downstream consumers live outside this
//! crate. The engine only sees these traits; the implementations here cover
//! static configuration and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::Value;

use crate::config::Config;
use crate::error::{ConfigError, PlatformError, Result};

/// Resolves a currently valid access token for an account.
///
/// Refresh and expiry are the provider's business. A missing or revoked
/// account is a permanent failure for that target.
#[async_trait]
pub trait AccountCredentialProvider: Send + Sync {
    async fn access_token(&self, account_id: &str) -> std::result::Result<SecretString, PlatformError>;
}

/// Turns opaque media references into public URLs
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve_urls(&self, references: &[String]) -> std::result::Result<Vec<String>, PlatformError>;
}

/// Fire-and-forget sink for pipeline events.
///
/// Callers log and ignore errors; a broken sink never fails a dispatch.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &str, payload: Value) -> Result<()>;
}

/// Tokens from configuration (`token` inline or `token_env`)
#[derive(Default)]
pub struct StaticCredentialProvider {
    tokens: HashMap<String, String>,
}

impl StaticCredentialProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, account_id: impl Into<String>, token: impl Into<String>) -> Self {
        self.tokens.insert(account_id.into(), token.into());
        self
    }

    /// Read every `[[accounts]]` entry. A `token_env` that is not set is a
    /// configuration error.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut provider = Self::new();

        for account in &config.accounts {
            let token = match (&account.token, &account.token_env) {
                (Some(token), _) => token.clone(),
                (None, Some(var)) => std::env::var(var).map_err(|_| ConfigError::InvalidValue {
                    field: format!("accounts.{}.token_env", account.id),
                    reason: format!("environment variable {} is not set", var),
                })?,
                (None, None) => {
                    return Err(ConfigError::MissingField(format!("accounts.{}.token", account.id)).into())
                }
            };
            provider.tokens.insert(account.id.clone(), token);
        }

        Ok(provider)
    }
}

#[async_trait]
impl AccountCredentialProvider for StaticCredentialProvider {
    async fn access_token(&self, account_id: &str) -> std::result::Result<SecretString, PlatformError> {
        self.tokens
            .get(account_id)
            .map(|t| SecretString::from(t.clone()))
            .ok_or_else(|| {
                PlatformError::Permanent(format!(
                    "No credentials for account '{}', reconnect the account",
                    account_id
                ))
            })
    }
}

/// Prefixes relative references with a base URL; absolute URLs pass through
#[derive(Debug, Clone, Default)]
pub struct BaseUrlMediaResolver {
    base_url: Option<String>,
}

impl BaseUrlMediaResolver {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            base_url: base_url.map(|b| b.trim_end_matches('/').to_string()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.media.base_url.clone())
    }

    fn resolve_one(&self, reference: &str) -> std::result::Result<String, PlatformError> {
        if reference.starts_with("https://") || reference.starts_with("http://") {
            return Ok(reference.to_string());
        }

        match &self.base_url {
            Some(base) => Ok(format!("{}/{}", base, reference.trim_start_matches('/'))),
            None => Err(PlatformError::Validation(format!(
                "Media reference '{}' is not a URL and no media base_url is configured",
                reference
            ))),
        }
    }
}

#[async_trait]
impl MediaResolver for BaseUrlMediaResolver {
    async fn resolve_urls(&self, references: &[String]) -> std::result::Result<Vec<String>, PlatformError> {
        references.iter().map(|r| self.resolve_one(r)).collect()
    }
}
