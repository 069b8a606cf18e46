//! Socialcast - scheduled publishing to social platforms
//!
//! This library holds the publishing pipeline shared by the `social-send`
//! daemon and the `social-queue` CLI: posts and schedules in SQLite, one
//! publisher per platform, and a resilience layer (circuit breaker plus
//! bounded retry) around every outbound call.

pub mod collaborators;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod publishers;
pub mod resilience;
pub mod scheduling;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::{Database, ScheduleFilter};
pub use engine::{DispatchReport, EngineConfig, PostReport, ScheduleEngine, SweepReport};
pub use error::{PlatformError, Result, SocialcastError};
pub use publishers::{PlatformPublisher, PublisherRegistry};
pub use resilience::ResilienceGuard;
pub use types::{NewPost, Post, PostStatus, PublishResult, Schedule, ScheduleStatus, Target};
