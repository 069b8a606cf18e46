//! Core types for Socialcast

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A composed post and the platforms it should reach.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: String,
    pub owner_id: String,
    pub content: String,
    /// Opaque media references, resolved to URLs by the media collaborator.
    pub media: Vec<String>,
    pub targets: Vec<Target>,
    pub status: PostStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Post {
    pub fn new(owner_id: String, content: String, media: Vec<String>, targets: Vec<Target>) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id,
            content,
            media,
            targets,
            status: PostStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn target(&self, platform: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.platform == platform)
    }
}

/// Input for creating a post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub owner_id: String,
    pub content: String,
    #[serde(default)]
    pub media: Vec<String>,
    pub targets: Vec<Target>,
}

/// Aggregate post status, derived from publish results once dispatch starts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Publishing,
    Published,
    PartiallyPublished,
    Failed,
    Cancelled,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Publishing => "publishing",
            PostStatus::Published => "published",
            PostStatus::PartiallyPublished => "partially_published",
            PostStatus::Failed => "failed",
            PostStatus::Cancelled => "cancelled",
        }
    }

    /// User edits are only accepted before dispatch has started.
    pub fn is_editable(&self) -> bool {
        matches!(self, PostStatus::Draft | PostStatus::Scheduled)
    }

    /// Whether a new schedule may be attached to a post in this status.
    pub fn accepts_schedule(&self) -> bool {
        matches!(
            self,
            PostStatus::Draft
                | PostStatus::Scheduled
                | PostStatus::Failed
                | PostStatus::PartiallyPublished
        )
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "scheduled" => Ok(PostStatus::Scheduled),
            "publishing" => Ok(PostStatus::Publishing),
            "published" => Ok(PostStatus::Published),
            "partially_published" => Ok(PostStatus::PartiallyPublished),
            "failed" => Ok(PostStatus::Failed),
            "cancelled" => Ok(PostStatus::Cancelled),
            other => Err(format!("unknown post status '{}'", other)),
        }
    }
}

/// A social account as seen by the core. Credentials live elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SocialAccount {
    pub id: String,
    pub platform: String,
    /// Platform specific identifiers (page id, board id, author urn, ...).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl SocialAccount {
    pub fn new(id: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            platform: platform.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// A (platform, account) pair a post is meant to be published to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Target {
    pub platform: String,
    pub account: SocialAccount,
}

impl Target {
    pub fn new(account: SocialAccount) -> Self {
        Self {
            platform: account.platform.clone(),
            account,
        }
    }
}

/// A request to publish a post at a given time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schedule {
    pub id: String,
    pub post_id: String,
    pub scheduled_at: i64,
    pub status: ScheduleStatus,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Schedule {
    pub fn new(post_id: String, scheduled_at: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            post_id,
            scheduled_at,
            status: ScheduleStatus::Pending,
            claimed_by: None,
            claimed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Pending,
    Due,
    Dispatched,
    Published,
    Failed,
    Cancelled,
}

impl ScheduleStatus {
    pub const ALL: [ScheduleStatus; 6] = [
        ScheduleStatus::Pending,
        ScheduleStatus::Due,
        ScheduleStatus::Dispatched,
        ScheduleStatus::Published,
        ScheduleStatus::Failed,
        ScheduleStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "pending",
            ScheduleStatus::Due => "due",
            ScheduleStatus::Dispatched => "dispatched",
            ScheduleStatus::Published => "published",
            ScheduleStatus::Failed => "failed",
            ScheduleStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScheduleStatus::Published | ScheduleStatus::Failed | ScheduleStatus::Cancelled
        )
    }

    /// Pending and due schedules can still be cancelled or moved.
    pub fn is_open(&self) -> bool {
        matches!(self, ScheduleStatus::Pending | ScheduleStatus::Due)
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ScheduleStatus::Pending),
            "due" => Ok(ScheduleStatus::Due),
            "dispatched" => Ok(ScheduleStatus::Dispatched),
            "published" => Ok(ScheduleStatus::Published),
            "failed" => Ok(ScheduleStatus::Failed),
            "cancelled" => Ok(ScheduleStatus::Cancelled),
            other => Err(format!("unknown schedule status '{}'", other)),
        }
    }
}

/// Classification persisted with a failed publish result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    Validation,
    Transient,
    Permanent,
    RateLimited,
    CircuitOpen,
    Unsupported,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::Validation => "validation",
            FailureClass::Transient => "transient",
            FailureClass::Permanent => "permanent",
            FailureClass::RateLimited => "rate_limited",
            FailureClass::CircuitOpen => "circuit_open",
            FailureClass::Unsupported => "unsupported",
        }
    }

    /// Short remediation hint shown next to a failed platform.
    pub fn user_hint(&self) -> &'static str {
        match self {
            FailureClass::Validation => "content does not meet the platform's requirements",
            FailureClass::Transient => "platform error, retry later",
            FailureClass::Permanent => "authorization or permission problem, reconnect the account",
            FailureClass::RateLimited => "platform rate limit reached, retry later",
            FailureClass::CircuitOpen => "platform temporarily unavailable",
            FailureClass::Unsupported => "platform is not supported",
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "validation" => Ok(FailureClass::Validation),
            "transient" => Ok(FailureClass::Transient),
            "permanent" => Ok(FailureClass::Permanent),
            "rate_limited" => Ok(FailureClass::RateLimited),
            "circuit_open" => Ok(FailureClass::CircuitOpen),
            "unsupported" => Ok(FailureClass::Unsupported),
            other => Err(format!("unknown failure class '{}'", other)),
        }
    }
}

/// Outcome of one dispatch of one target. Append-only: a later dispatch
/// writes a new row instead of touching this one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublishResult {
    pub id: Option<i64>,
    pub post_id: String,
    pub schedule_id: Option<String>,
    pub platform: String,
    pub account_id: String,
    pub success: bool,
    pub platform_post_id: Option<String>,
    pub url: Option<String>,
    pub failure_class: Option<FailureClass>,
    pub error_message: Option<String>,
    /// Raw platform response (JSON) on success, for diagnostics.
    pub raw_response: Option<String>,
    /// Number of times the platform was actually called for this result.
    pub attempts: u32,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CircuitState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "closed" => Ok(CircuitState::Closed),
            "open" => Ok(CircuitState::Open),
            "half_open" => Ok(CircuitState::HalfOpen),
            other => Err(format!("unknown circuit state '{}'", other)),
        }
    }
}

/// Breaker state for one dependency key. Timestamps are unix milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<i64>,
    pub opened_at: Option<i64>,
}
