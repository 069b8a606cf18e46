//! Error types for Socialcast

use std::time::Duration;

use thiserror::Error;

use crate::types::FailureClass;

pub type Result<T> = std::result::Result<T, SocialcastError>;

#[derive(Error, Debug)]
pub enum SocialcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Resilience error: {0}")]
    Resilience(#[from] ResilienceError),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl SocialcastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SocialcastError::InvalidInput(_) | SocialcastError::NotFound(_) => 3,
            SocialcastError::Platform(PlatformError::Permanent(_)) => 2,
            SocialcastError::Config(_) | SocialcastError::Database(_) => 2,
            SocialcastError::UnsupportedPlatform(_) => 2,
            SocialcastError::Platform(_)
            | SocialcastError::Resilience(_)
            | SocialcastError::InvalidState(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },
}

/// Classified failure returned by a platform publisher.
///
/// Publishers never decide whether to retry; they only say what kind of
/// failure happened. Cloneable because the retry loop keeps the last one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Transient platform error: {0}")]
    Transient(String),

    #[error("Rate limit exceeded: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Permanent platform error: {0}")]
    Permanent(String),
}

impl PlatformError {
    pub fn class(&self) -> FailureClass {
        match self {
            PlatformError::Validation(_) => FailureClass::Validation,
            PlatformError::Transient(_) => FailureClass::Transient,
            PlatformError::RateLimited { .. } => FailureClass::RateLimited,
            PlatformError::Permanent(_) => FailureClass::Permanent,
        }
    }

    /// Only transient and rate-limited failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PlatformError::Transient(_) | PlatformError::RateLimited { .. }
        )
    }
}

/// Failure surfaced by the resilience guard after breaker and retry policy
/// have been applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResilienceError {
    #[error("Circuit open for '{key}': platform temporarily unavailable")]
    CircuitOpen { key: String, attempts: u32 },

    #[error("{error} (after {attempts} attempt(s))")]
    Failed { error: PlatformError, attempts: u32 },

    /// The caller's pre-attempt check refused the next attempt
    #[error("Stopped after {attempts} attempt(s): {reason}")]
    Stopped { reason: String, attempts: u32 },
}

impl ResilienceError {
    pub fn class(&self) -> FailureClass {
        match self {
            ResilienceError::CircuitOpen { .. } => FailureClass::CircuitOpen,
            ResilienceError::Failed { error, .. } => error.class(),
            ResilienceError::Stopped { .. } => FailureClass::Transient,
        }
    }

    /// Number of times the wrapped operation was actually invoked.
    pub fn attempts(&self) -> u32 {
        match self {
            ResilienceError::CircuitOpen { attempts, .. }
            | ResilienceError::Failed { attempts, .. }
            | ResilienceError::Stopped { attempts, .. } => *attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = SocialcastError::InvalidInput("Empty content".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_not_found() {
        let error = SocialcastError::NotFound("schedule abc".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_permanent_platform_error() {
        let error = SocialcastError::Platform(PlatformError::Permanent("token revoked".to_string()));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_transient_platform_error() {
        let error = SocialcastError::Platform(PlatformError::Transient("502".to_string()));
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_config_error() {
        let error = SocialcastError::Config(ConfigError::MissingField("database.path".to_string()));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_invalid_state() {
        let error = SocialcastError::InvalidState("post is publishing".to_string());
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting_platform() {
        let error = SocialcastError::Platform(PlatformError::Validation(
            "Instagram requires at least one media reference".to_string(),
        ));
        assert_eq!(
            error.to_string(),
            "Platform error: Content validation failed: Instagram requires at least one media reference"
        );
    }

    #[test]
    fn test_rate_limited_formatting_ignores_retry_after() {
        let error = PlatformError::RateLimited {
            message: "Too many requests".to_string(),
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(error.to_string(), "Rate limit exceeded: Too many requests");
    }

    #[test]
    fn test_platform_error_classes() {
        assert_eq!(
            PlatformError::Validation("x".into()).class(),
            FailureClass::Validation
        );
        assert_eq!(
            PlatformError::Transient("x".into()).class(),
            FailureClass::Transient
        );
        assert_eq!(
            PlatformError::Permanent("x".into()).class(),
            FailureClass::Permanent
        );
        assert_eq!(
            PlatformError::RateLimited {
                message: "x".into(),
                retry_after: None
            }
            .class(),
            FailureClass::RateLimited
        );
    }

    #[test]
    fn test_only_transient_and_rate_limited_are_retryable() {
        assert!(PlatformError::Transient("x".into()).is_retryable());
        assert!(PlatformError::RateLimited {
            message: "x".into(),
            retry_after: None
        }
        .is_retryable());
        assert!(!PlatformError::Validation("x".into()).is_retryable());
        assert!(!PlatformError::Permanent("x".into()).is_retryable());
    }

    #[test]
    fn test_resilience_error_preserves_classification() {
        let open = ResilienceError::CircuitOpen {
            key: "twitter".to_string(),
            attempts: 0,
        };
        assert_eq!(open.class(), FailureClass::CircuitOpen);
        assert_eq!(open.attempts(), 0);
        assert!(open.to_string().contains("temporarily unavailable"));

        let failed = ResilienceError::Failed {
            error: PlatformError::Permanent("401".into()),
            attempts: 1,
        };
        assert_eq!(failed.class(), FailureClass::Permanent);
        assert_eq!(failed.attempts(), 1);
        assert!(failed.to_string().contains("after 1 attempt(s)"));
    }

    #[test]
    fn test_error_conversion_from_resilience_error() {
        let err: SocialcastError = ResilienceError::CircuitOpen {
            key: "tiktok".to_string(),
            attempts: 2,
        }
        .into();

        match err {
            SocialcastError::Resilience(ResilienceError::CircuitOpen { key, .. }) => {
                assert_eq!(key, "tiktok");
            }
            _ => panic!("Expected SocialcastError::Resilience"),
        }
    }

    #[test]
    fn test_platform_error_clone() {
        let original = PlatformError::Transient("Connection reset".to_string());
        let cloned = original.clone();
        assert_eq!(original, cloned);
    }
}
