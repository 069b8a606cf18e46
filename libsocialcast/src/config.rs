//! Configuration management for Socialcast

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub resilience: ResilienceConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub platforms: BTreeMap<String, PlatformConfig>,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Circuit breaker and retry settings shared by every platform dependency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResilienceConfig {
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub rate_limit_floor_secs: u64,
    /// Persist breaker state in the database instead of process memory.
    pub persist_circuit_state: bool,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout_secs: 60,
            max_retries: 3,
            base_delay_ms: 1000,
            rate_limit_floor_secs: 30,
            persist_circuit_state: true,
        }
    }
}

impl ResilienceConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn rate_limit_floor(&self) -> Duration {
        Duration::from_secs(self.rate_limit_floor_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Seconds between sweeps of the schedule table
    pub poll_interval: u64,
    /// Upper bound on platform calls in flight at once
    pub max_concurrent_publishes: usize,
    /// Seconds after which an abandoned claim may be taken over
    pub claim_lease_secs: u64,
    /// Maximum due schedules claimed per sweep
    pub sweep_batch: u32,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            poll_interval: 60,
            max_concurrent_publishes: 8,
            claim_lease_secs: 300,
            sweep_batch: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlatformConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Override the platform API base URL (staging, proxies)
    pub api_base: Option<String>,
    pub timeout_secs: Option<u64>,
    pub rate_limit_floor_secs: Option<u64>,
    /// Log publishes instead of calling the platform (staging, demos)
    #[serde(default)]
    pub log_only: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base: None,
            timeout_secs: None,
            rate_limit_floor_secs: None,
            log_only: false,
        }
    }
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MediaConfig {
    /// Prefix for media references that are not already absolute URLs
    pub base_url: Option<String>,
}

/// Static credentials for an account, either inline or read from the environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountConfig {
    pub id: String,
    pub token: Option<String>,
    pub token_env: Option<String>,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        let mut platforms = BTreeMap::new();
        for name in ["facebook", "instagram", "linkedin", "pinterest", "tiktok", "twitter"] {
            platforms.insert(name.to_string(), PlatformConfig::default());
        }

        Self {
            database: DatabaseConfig {
                path: "~/.local/share/socialcast/socialcast.db".to_string(),
            },
            resilience: ResilienceConfig::default(),
            scheduling: SchedulingConfig::default(),
            platforms,
            media: MediaConfig::default(),
            accounts: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::MissingField("database.path".to_string()).into());
        }
        if self.resilience.failure_threshold == 0 {
            return Err(invalid("resilience.failure_threshold", "must be at least 1"));
        }
        if self.resilience.max_retries == 0 {
            return Err(invalid("resilience.max_retries", "must be at least 1"));
        }
        if self.scheduling.max_concurrent_publishes == 0 {
            return Err(invalid("scheduling.max_concurrent_publishes", "must be at least 1"));
        }
        if self.scheduling.claim_lease_secs == 0 {
            return Err(invalid("scheduling.claim_lease_secs", "must be at least 1"));
        }
        for account in &self.accounts {
            if account.token.is_none() && account.token_env.is_none() {
                return Err(invalid(
                    &format!("accounts.{}", account.id),
                    "either token or token_env is required",
                ));
            }
        }
        Ok(())
    }

    /// Database path, honouring the `SOCIALCAST_DB_PATH` override
    pub fn database_path(&self) -> String {
        std::env::var("SOCIALCAST_DB_PATH").unwrap_or_else(|_| self.database.path.clone())
    }

    pub fn enabled_platforms(&self) -> impl Iterator<Item = (&String, &PlatformConfig)> {
        self.platforms.iter().filter(|(_, p)| p.enabled)
    }
}

fn invalid(field: &str, reason: &str) -> crate::error::SocialcastError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SOCIALCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("socialcast").join("config.toml"))
}

/// Resolve the data directory path following XDG Base Directory spec
pub fn resolve_data_path() -> Result<PathBuf> {
    let data_dir =
        dirs::data_dir().ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("socialcast"))
}
