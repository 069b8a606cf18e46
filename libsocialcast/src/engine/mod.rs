//! Scheduling and dispatch of posts
//!
//! [`ScheduleEngine`] owns the post and schedule lifecycle. A sweep
//! promotes pending schedules whose time has come, claims them, and fans
//! each claimed post out to its targets concurrently. Every (post,
//! platform) pair is guarded by a lease in the database, so two sweeps
//! running at once never publish the same target twice.
//!
//! ```no_run
//! use libsocialcast::{Config, ScheduleEngine};
//!
//! # async fn example() -> libsocialcast::Result<()> {
//! let config = Config::load()?;
//! let engine = ScheduleEngine::from_config(&config).await?;
//!
//! let report = engine.sweep(chrono::Utc::now()).await?;
//! println!("{} schedule(s) dispatched", report.dispatches.len());
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod pool;
pub mod status;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use secrecy::SecretString;
use serde::Serialize;
use serde_json::json;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::collaborators::{
    AccountCredentialProvider, BaseUrlMediaResolver, EventSink, MediaResolver,
    StaticCredentialProvider,
};
use crate::config::{Config, SchedulingConfig};
use crate::db::{Database, ScheduleFilter};
use crate::error::{PlatformError, ResilienceError, Result, SocialcastError};
use crate::events::{TracingEventSink, POST_PUBLISHED, POST_PUBLISH_FAILED, SCHEDULE_CANCELLED};
use crate::publishers::registry::normalize_platform;
use crate::publishers::{PlatformPublisher, Publication, PublishRequest, PublisherRegistry};
use crate::resilience::{
    CircuitBreakerConfig, CircuitStateStore, InMemoryCircuitStore, ResilienceGuard, RetryPolicy,
    SqliteCircuitStore,
};
use crate::types::{
    CircuitSnapshot, FailureClass, NewPost, Post, PostStatus, PublishResult, Schedule,
    ScheduleStatus, Target,
};

pub use batch::{BatchItem, BatchStatus, RecurrenceInterval, RecurringPlan};
pub use pool::{DispatchPool, TickReport};
pub use status::{
    derive_post_status, PipelineStats, PlatformStats, PostReport, TargetReport, TargetState,
};

/// Delay between checks while another dispatch holds a target's claim
const CLAIM_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Tunables for one engine instance
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Identity written into schedule and target claims
    pub worker_id: String,
    /// Age after which a claim is considered abandoned
    pub claim_lease: Duration,
    pub max_concurrent_publishes: usize,
    pub sweep_batch: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_scheduling(&SchedulingConfig::default())
    }
}

impl EngineConfig {
    pub fn from_scheduling(config: &SchedulingConfig) -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::new_v4()),
            claim_lease: Duration::from_secs(config.claim_lease_secs),
            max_concurrent_publishes: config.max_concurrent_publishes.max(1),
            sweep_batch: config.sweep_batch.max(1),
        }
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }
}

/// What happened to one target during a dispatch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TargetOutcome {
    Published { result: PublishResult },
    Failed { result: PublishResult },
    /// A success was already recorded; nothing was sent
    AlreadyPublished { platform: String },
    /// Bookkeeping failed; the target was left for a later dispatch
    Error { platform: String, message: String },
}

impl TargetOutcome {
    pub fn platform(&self) -> &str {
        match self {
            TargetOutcome::Published { result } | TargetOutcome::Failed { result } => {
                &result.platform
            }
            TargetOutcome::AlreadyPublished { platform }
            | TargetOutcome::Error { platform, .. } => platform,
        }
    }

    pub fn result(&self) -> Option<&PublishResult> {
        match self {
            TargetOutcome::Published { result } | TargetOutcome::Failed { result } => Some(result),
            _ => None,
        }
    }
}

/// Result of dispatching one post
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchReport {
    pub post_id: String,
    pub schedule_id: Option<String>,
    /// Aggregate post status after the dispatch
    pub status: PostStatus,
    pub targets: Vec<TargetOutcome>,
}

impl DispatchReport {
    pub fn published(&self) -> usize {
        self.targets
            .iter()
            .filter(|t| matches!(t, TargetOutcome::Published { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.targets
            .iter()
            .filter(|t| matches!(t, TargetOutcome::Failed { .. }))
            .count()
    }
}

/// Result of one sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    /// Pending schedules moved to due
    pub promoted: u64,
    /// Due schedules another worker claimed first
    pub skipped: usize,
    pub dispatches: Vec<DispatchReport>,
    pub reaped: ReapReport,
}

/// Schedules claimed by one pass, before anything is dispatched
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClaimReport {
    pub promoted: u64,
    pub skipped: usize,
    pub reaped: ReapReport,
    pub claimed: Vec<Schedule>,
}

/// Abandoned work cleaned up before a sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReapReport {
    pub expired_claims: u64,
    pub stale_schedules: usize,
}

pub struct ScheduleEngine {
    db: Database,
    registry: PublisherRegistry,
    guard: ResilienceGuard,
    credentials: Arc<dyn AccountCredentialProvider>,
    media: Arc<dyn MediaResolver>,
    events: Arc<dyn EventSink>,
    outbound: Semaphore,
    config: EngineConfig,
}

/// Assembles a [`ScheduleEngine`] from parts; anything not set falls back
/// to the in-memory and static defaults
pub struct ScheduleEngineBuilder {
    db: Database,
    registry: PublisherRegistry,
    guard: Option<ResilienceGuard>,
    credentials: Option<Arc<dyn AccountCredentialProvider>>,
    media: Option<Arc<dyn MediaResolver>>,
    events: Option<Arc<dyn EventSink>>,
    config: EngineConfig,
}

impl ScheduleEngineBuilder {
    pub fn guard(mut self, guard: ResilienceGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn credentials(mut self, credentials: Arc<dyn AccountCredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn media(mut self, media: Arc<dyn MediaResolver>) -> Self {
        self.media = Some(media);
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> ScheduleEngine {
        let guard = self.guard.unwrap_or_else(|| {
            ResilienceGuard::new(
                CircuitBreakerConfig::default(),
                RetryPolicy::default(),
                Arc::new(InMemoryCircuitStore::new()),
            )
        });

        ScheduleEngine {
            db: self.db,
            registry: self.registry,
            guard,
            credentials: self
                .credentials
                .unwrap_or_else(|| Arc::new(StaticCredentialProvider::new())),
            media: self
                .media
                .unwrap_or_else(|| Arc::new(BaseUrlMediaResolver::default())),
            events: self.events.unwrap_or_else(|| Arc::new(TracingEventSink)),
            outbound: Semaphore::new(self.config.max_concurrent_publishes.max(1)),
            config: self.config,
        }
    }
}

impl ScheduleEngine {
    pub fn builder(db: Database, registry: PublisherRegistry) -> ScheduleEngineBuilder {
        ScheduleEngineBuilder {
            db,
            registry,
            guard: None,
            credentials: None,
            media: None,
            events: None,
            config: EngineConfig::default(),
        }
    }

    /// Wire the engine from configuration: database, publishers, breaker
    /// store, static credentials and media base URL
    pub async fn from_config(config: &Config) -> Result<Self> {
        Self::from_config_as(config, EngineConfig::from_scheduling(&config.scheduling)).await
    }

    /// Like [`from_config`](Self::from_config) with explicit engine tunables
    pub async fn from_config_as(config: &Config, engine: EngineConfig) -> Result<Self> {
        config.validate()?;

        let db = Database::new(&config.database_path()).await?;
        let registry = PublisherRegistry::from_config(config)?;

        let store: Arc<dyn CircuitStateStore> = if config.resilience.persist_circuit_state {
            Arc::new(SqliteCircuitStore::new(db.clone()))
        } else {
            Arc::new(InMemoryCircuitStore::new())
        };

        Ok(Self::builder(db, registry)
            .guard(ResilienceGuard::from_config(config, store))
            .credentials(Arc::new(StaticCredentialProvider::from_config(config)?))
            .media(Arc::new(BaseUrlMediaResolver::from_config(config)))
            .config(engine)
            .build())
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn registry(&self) -> &PublisherRegistry {
        &self.registry
    }

    pub fn guard(&self) -> &ResilienceGuard {
        &self.guard
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Posts and schedules
    // ------------------------------------------------------------------

    /// Store a new draft post.
    ///
    /// Targets must be non-empty, name registered platforms, and name each
    /// platform at most once.
    pub async fn create_post(&self, new_post: NewPost) -> Result<Post> {
        if new_post.targets.is_empty() {
            return Err(SocialcastError::InvalidInput(
                "A post needs at least one target".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(new_post.targets.len());
        for target in new_post.targets {
            let platform = normalize_platform(&target.platform);
            if !self.registry.contains(&platform) {
                return Err(SocialcastError::UnsupportedPlatform(target.platform));
            }
            if !seen.insert(platform.clone()) {
                return Err(SocialcastError::InvalidInput(format!(
                    "Platform '{}' is targeted more than once",
                    platform
                )));
            }

            let mut account = target.account;
            account.platform = platform.clone();
            targets.push(Target { platform, account });
        }

        let post = Post::new(new_post.owner_id, new_post.content, new_post.media, targets);
        self.db.create_post(&post).await?;

        info!(
            "Created post {} for {}",
            post.id,
            post.targets
                .iter()
                .map(|t| t.platform.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(post)
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Post> {
        self.db
            .get_post(post_id)
            .await?
            .ok_or_else(|| SocialcastError::NotFound(format!("post {}", post_id)))
    }

    /// Replace content and media of a post that has not started publishing
    pub async fn update_post_content(
        &self,
        post_id: &str,
        content: String,
        media: Vec<String>,
    ) -> Result<Post> {
        let post = self.get_post(post_id).await?;
        if !post.status.is_editable() {
            return Err(SocialcastError::InvalidState(format!(
                "Post {} is {} and can no longer be edited",
                post_id, post.status
            )));
        }

        // The row may have moved on since it was read
        if !self.db.update_post_content(post_id, &content, &media).await? {
            return Err(SocialcastError::InvalidState(format!(
                "Post {} started publishing and can no longer be edited",
                post_id
            )));
        }

        self.get_post(post_id).await
    }

    /// Attach a schedule to a post. Times earlier than now are rejected.
    pub async fn create_schedule(&self, post_id: &str, at: DateTime<Utc>) -> Result<Schedule> {
        reject_past(at)?;
        self.insert_schedule(post_id, at.timestamp()).await
    }

    async fn insert_schedule(&self, post_id: &str, scheduled_at: i64) -> Result<Schedule> {
        let post = self.get_post(post_id).await?;
        if !post.status.accepts_schedule() {
            return Err(SocialcastError::InvalidState(format!(
                "Post {} is {} and cannot be scheduled",
                post_id, post.status
            )));
        }

        let schedule = Schedule::new(post.id.clone(), scheduled_at);
        self.db.create_schedule(&schedule).await?;

        if post.status == PostStatus::Draft {
            self.db
                .update_post_status(&post.id, PostStatus::Scheduled)
                .await?;
        }

        info!(
            "Scheduled post {} for {} (schedule {})",
            post.id,
            DateTime::from_timestamp(scheduled_at, 0)
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| scheduled_at.to_string()),
            schedule.id
        );
        Ok(schedule)
    }

    /// Cancel a schedule that has not been dispatched yet.
    ///
    /// Returns `false` when the schedule is already dispatched, published
    /// or cancelled. A scheduled post left with no open schedule and no
    /// results becomes cancelled.
    pub async fn cancel_schedule(&self, schedule_id: &str) -> Result<bool> {
        let schedule = self.get_schedule(schedule_id).await?;

        if !self
            .db
            .cancel_schedule(schedule_id, Utc::now().timestamp())
            .await?
        {
            debug!(
                "Schedule {} is {} and was not cancelled",
                schedule_id, schedule.status
            );
            return Ok(false);
        }

        let post = self.get_post(&schedule.post_id).await?;
        if post.status == PostStatus::Scheduled
            && self.db.active_schedule_count(&post.id).await? == 0
            && self.db.get_publish_results(&post.id).await?.is_empty()
        {
            self.db
                .update_post_status(&post.id, PostStatus::Cancelled)
                .await?;
        }

        info!("Cancelled schedule {} for post {}", schedule_id, post.id);
        self.emit(
            SCHEDULE_CANCELLED,
            json!({ "schedule_id": schedule_id, "post_id": post.id }),
        )
        .await;

        Ok(true)
    }

    /// Move an open schedule to a new time. Returns `false` once it has
    /// been dispatched or closed.
    pub async fn reschedule(&self, schedule_id: &str, at: DateTime<Utc>) -> Result<bool> {
        reject_past(at)?;
        self.get_schedule(schedule_id).await?;

        let moved = self
            .db
            .reschedule(schedule_id, at.timestamp(), Utc::now().timestamp())
            .await?;
        if moved {
            info!("Rescheduled {} to {}", schedule_id, at.to_rfc3339());
        }
        Ok(moved)
    }

    pub async fn get_schedule(&self, schedule_id: &str) -> Result<Schedule> {
        self.db
            .get_schedule(schedule_id)
            .await?
            .ok_or_else(|| SocialcastError::NotFound(format!("schedule {}", schedule_id)))
    }

    pub async fn list_schedules(&self, filter: &ScheduleFilter) -> Result<Vec<Schedule>> {
        self.db.list_schedules(filter).await
    }

    /// Open schedules firing within `window` from now
    pub async fn upcoming(&self, window: Duration) -> Result<Vec<Schedule>> {
        let now = Utc::now().timestamp();
        let until = i64::try_from(window.as_secs())
            .map(|secs| now.saturating_add(secs))
            .unwrap_or(i64::MAX);
        self.db.upcoming_schedules(now, until).await
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Publish a post right away, through a schedule stamped with now
    pub async fn publish_now(&self, post_id: &str) -> Result<DispatchReport> {
        let now = Utc::now().timestamp();
        let schedule = self.insert_schedule(post_id, now).await?;

        if !self
            .db
            .claim_schedule(&schedule.id, &self.config.worker_id, now)
            .await?
        {
            // A sweep picked it up between insert and claim
            return Err(SocialcastError::InvalidState(format!(
                "Schedule {} was claimed by another worker",
                schedule.id
            )));
        }

        self.dispatch_claimed(&schedule).await
    }

    /// Dispatch again, only to targets without a recorded success
    pub async fn retry_publish(&self, post_id: &str) -> Result<DispatchReport> {
        let post = self.get_post(post_id).await?;
        match post.status {
            PostStatus::Failed | PostStatus::PartiallyPublished => self.publish_now(post_id).await,
            other => Err(SocialcastError::InvalidState(format!(
                "Post {} is {}; only failed or partially published posts can be retried",
                post_id, other
            ))),
        }
    }

    /// One pass of the scheduler at `now`: reap abandoned work, promote
    /// pending schedules, claim a batch of due ones and dispatch them.
    ///
    /// Returns once every claimed dispatch has finished, retries included.
    /// [`DispatchPool`] runs the dispatches in the background instead.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let batch = self.claim_due(now).await?;

        let mut dispatches = Vec::with_capacity(batch.claimed.len());
        for (schedule, outcome) in batch.claimed.iter().zip(
            join_all(batch.claimed.iter().map(|s| self.dispatch_claimed(s))).await,
        ) {
            match outcome {
                Ok(report) => dispatches.push(report),
                Err(e) => error!("Dispatch of schedule {} failed: {}", schedule.id, e),
            }
        }

        Ok(SweepReport {
            promoted: batch.promoted,
            skipped: batch.skipped,
            dispatches,
            reaped: batch.reaped,
        })
    }

    /// Reap abandoned work, promote pending schedules and claim a batch of
    /// due ones for this worker. Nothing is published yet.
    pub async fn claim_due(&self, now: DateTime<Utc>) -> Result<ClaimReport> {
        let now = now.timestamp();
        let reaped = self.reap_expired(now).await?;

        let promoted = self.db.promote_due_schedules(now).await?;
        let due = self.db.due_schedules(self.config.sweep_batch).await?;

        let mut claimed = Vec::with_capacity(due.len());
        let mut skipped = 0;
        for schedule in due {
            if self
                .db
                .claim_schedule(&schedule.id, &self.config.worker_id, now)
                .await?
            {
                claimed.push(schedule);
            } else {
                skipped += 1;
            }
        }

        if !claimed.is_empty() {
            info!("Claimed {} due schedule(s)", claimed.len());
        }

        Ok(ClaimReport {
            promoted,
            skipped,
            reaped,
            claimed,
        })
    }

    /// Drop expired target claims and fail schedules whose worker vanished
    pub async fn reap_expired(&self, now: i64) -> Result<ReapReport> {
        let cutoff = now - self.config.claim_lease.as_secs() as i64;

        let expired_claims = self.db.delete_expired_claims(cutoff).await?;
        let stale_posts = self.db.fail_stale_dispatches(cutoff).await?;

        if expired_claims > 0 || !stale_posts.is_empty() {
            warn!(
                "Reaped {} expired claim(s) and {} stale dispatch(es)",
                expired_claims,
                stale_posts.len()
            );
        }

        for post_id in &stale_posts {
            self.refresh_post_status(post_id).await?;
        }

        Ok(ReapReport {
            expired_claims,
            stale_schedules: stale_posts.len(),
        })
    }

    /// Publish the post of a schedule this worker has claimed
    pub async fn dispatch_claimed(&self, schedule: &Schedule) -> Result<DispatchReport> {
        let post = match self.db.get_post(&schedule.post_id).await? {
            Some(post) => post,
            None => {
                self.db
                    .finish_schedule(&schedule.id, ScheduleStatus::Failed)
                    .await?;
                return Err(SocialcastError::NotFound(format!(
                    "post {} of schedule {}",
                    schedule.post_id, schedule.id
                )));
            }
        };

        self.db
            .update_post_status(&post.id, PostStatus::Publishing)
            .await?;

        let targets = join_all(
            post.targets
                .iter()
                .map(|target| self.dispatch_target(&post, Some(&schedule.id), target)),
        )
        .await;

        let results = self.db.get_publish_results(&post.id).await?;
        let all_published = post
            .targets
            .iter()
            .all(|t| results.iter().any(|r| r.success && r.platform == t.platform));
        let final_status = if all_published {
            ScheduleStatus::Published
        } else {
            ScheduleStatus::Failed
        };
        self.db.finish_schedule(&schedule.id, final_status).await?;

        let status = self.refresh_post_status(&post.id).await?;
        info!(
            "Schedule {} for post {} finished {} (post {})",
            schedule.id, post.id, final_status, status
        );

        Ok(DispatchReport {
            post_id: post.id,
            schedule_id: Some(schedule.id.clone()),
            status,
            targets,
        })
    }

    async fn dispatch_target(
        &self,
        post: &Post,
        schedule_id: Option<&str>,
        target: &Target,
    ) -> TargetOutcome {
        match self.try_dispatch_target(post, schedule_id, target).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    "Dispatch of post {} to {} failed: {}",
                    post.id, target.platform, e
                );
                TargetOutcome::Error {
                    platform: target.platform.clone(),
                    message: e.to_string(),
                }
            }
        }
    }

    async fn try_dispatch_target(
        &self,
        post: &Post,
        schedule_id: Option<&str>,
        target: &Target,
    ) -> Result<TargetOutcome> {
        let platform = target.platform.clone();

        loop {
            if self.db.has_successful_result(&post.id, &platform).await? {
                debug!("Post {} already published to {}", post.id, platform);
                return Ok(TargetOutcome::AlreadyPublished { platform });
            }

            let claimed = self
                .db
                .try_claim_target(
                    &post.id,
                    &platform,
                    &self.config.worker_id,
                    Utc::now().timestamp(),
                    self.config.claim_lease,
                )
                .await?;

            if claimed {
                let outcome = self.publish_claimed(post, schedule_id, target).await;

                if let Err(e) = self
                    .db
                    .release_target(&post.id, &platform, &self.config.worker_id)
                    .await
                {
                    warn!(
                        "Failed to release claim on post {} for {}: {}",
                        post.id, platform, e
                    );
                }

                match outcome? {
                    Some(outcome) => return Ok(outcome),
                    // Lost the claim mid-dispatch; wait on the new holder
                    None => continue,
                }
            }

            // Another dispatch is publishing this target. Its result decides
            // ours, so keep our schedule alive until it releases or expires.
            debug!(
                "Post {} on {} is claimed elsewhere, waiting",
                post.id, platform
            );
            if let Some(schedule_id) = schedule_id {
                self.db
                    .renew_schedule_claim(
                        schedule_id,
                        &self.config.worker_id,
                        Utc::now().timestamp(),
                    )
                    .await?;
            }
            tokio::time::sleep(CLAIM_POLL_INTERVAL).await;
        }
    }

    /// Publish one target under a held claim and record the result.
    ///
    /// `None` when the claim was lost before an attempt could be made.
    async fn publish_claimed(
        &self,
        post: &Post,
        schedule_id: Option<&str>,
        target: &Target,
    ) -> Result<Option<TargetOutcome>> {
        // A worker that held the claim before us may have finished
        if self.db.has_successful_result(&post.id, &target.platform).await? {
            return Ok(Some(TargetOutcome::AlreadyPublished {
                platform: target.platform.clone(),
            }));
        }

        let publisher = match self.registry.get(&target.platform) {
            Ok(publisher) => publisher,
            Err(e) => {
                let result = failure(
                    post,
                    schedule_id,
                    target,
                    FailureClass::Unsupported,
                    e.to_string(),
                    0,
                );
                return self.record(result).await.map(Some);
            }
        };

        let request = match self.prepare(post, target, publisher.as_ref()).await {
            Ok(request) => request,
            Err(e) => {
                let result = failure(post, schedule_id, target, e.class(), e.to_string(), 0);
                return self.record(result).await.map(Some);
            }
        };

        let timeout = publisher.timeout();
        // The lease is renewed before each attempt, so it has to outlive
        // one wait plus one call
        let max_wait = self.config.claim_lease.saturating_sub(timeout) / 2;
        let publisher = publisher.as_ref();
        let request = &request;
        let outbound = &self.outbound;

        let outcome = self
            .guard
            .execute_gated(
                &target.platform,
                max_wait,
                move |_| self.hold_target(&post.id, schedule_id, &target.platform),
                move |attempt| async move {
                    let _permit = outbound.acquire().await.map_err(|_| {
                        PlatformError::Transient("Publish slots are closed".to_string())
                    })?;
                    debug!(
                        "Publishing post {} to {} (attempt {})",
                        request.post_id,
                        publisher.platform(),
                        attempt
                    );
                    match tokio::time::timeout(timeout, publisher.publish(request)).await {
                        Ok(result) => result,
                        Err(_) => Err(PlatformError::Transient(format!(
                            "No response within {}s",
                            timeout.as_secs()
                        ))),
                    }
                },
            )
            .await;

        let result = match outcome {
            Ok(attempted) => success(
                post,
                schedule_id,
                target,
                attempted.value,
                attempted.attempts,
            ),
            Err(ResilienceError::Stopped { reason, .. }) => {
                if self.db.has_successful_result(&post.id, &target.platform).await? {
                    return Ok(Some(TargetOutcome::AlreadyPublished {
                        platform: target.platform.clone(),
                    }));
                }
                warn!(
                    "Gave up post {} on {}: {}",
                    post.id, target.platform, reason
                );
                return Ok(None);
            }
            Err(e) => failure(
                post,
                schedule_id,
                target,
                e.class(),
                e.to_string(),
                e.attempts(),
            ),
        };

        self.record(result).await.map(Some)
    }

    /// Renew this worker's claims ahead of an attempt; `Err` when the
    /// attempt must not go out
    async fn hold_target(
        &self,
        post_id: &str,
        schedule_id: Option<&str>,
        platform: &str,
    ) -> std::result::Result<(), String> {
        let now = Utc::now().timestamp();
        let worker = &self.config.worker_id;

        match self.db.renew_target_claim(post_id, platform, worker, now).await {
            Ok(true) => {}
            Ok(false) => return Err(format!("claim on {} is no longer held", platform)),
            Err(e) => return Err(format!("could not renew claim on {}: {}", platform, e)),
        }

        if let Some(schedule_id) = schedule_id {
            if let Err(e) = self.db.renew_schedule_claim(schedule_id, worker, now).await {
                warn!("Could not renew claim on schedule {}: {}", schedule_id, e);
            }
        }

        match self.db.has_successful_result(post_id, platform).await {
            Ok(false) => Ok(()),
            Ok(true) => Err(format!("already published to {}", platform)),
            Err(e) => Err(format!("could not check results for {}: {}", platform, e)),
        }
    }

    /// Validate content and gather the token and media URLs for a call
    async fn prepare(
        &self,
        post: &Post,
        target: &Target,
        publisher: &dyn PlatformPublisher,
    ) -> std::result::Result<PublishRequest, PlatformError> {
        publisher.validate(&post.content, &post.media)?;

        let access_token: SecretString = self.credentials.access_token(&target.account.id).await?;
        let media_urls = self.media.resolve_urls(&post.media).await?;

        Ok(PublishRequest {
            post_id: post.id.clone(),
            content: post.content.clone(),
            media: post.media.clone(),
            media_urls,
            account: target.account.clone(),
            access_token,
        })
    }

    async fn record(&self, mut result: PublishResult) -> Result<TargetOutcome> {
        result.id = Some(self.db.create_publish_result(&result).await?);

        if result.success {
            info!(
                "Published post {} to {} as {}",
                result.post_id,
                result.platform,
                result.platform_post_id.as_deref().unwrap_or("?")
            );
            self.emit(
                POST_PUBLISHED,
                json!({
                    "post_id": result.post_id,
                    "platform": result.platform,
                    "account_id": result.account_id,
                    "platform_post_id": result.platform_post_id,
                    "url": result.url,
                }),
            )
            .await;
            Ok(TargetOutcome::Published { result })
        } else {
            warn!(
                "Publishing post {} to {} failed ({}): {}",
                result.post_id,
                result.platform,
                result
                    .failure_class
                    .map(|c| c.as_str())
                    .unwrap_or("unknown"),
                result.error_message.as_deref().unwrap_or("")
            );
            self.emit(
                POST_PUBLISH_FAILED,
                json!({
                    "post_id": result.post_id,
                    "platform": result.platform,
                    "account_id": result.account_id,
                    "failure_class": result.failure_class,
                    "error": result.error_message,
                }),
            )
            .await;
            Ok(TargetOutcome::Failed { result })
        }
    }

    async fn emit(&self, event: &str, payload: serde_json::Value) {
        if let Err(e) = self.events.publish(event, payload).await {
            warn!("Failed to emit {} event: {}", event, e);
        }
    }

    /// Recompute and store the aggregate status of a post
    async fn refresh_post_status(&self, post_id: &str) -> Result<PostStatus> {
        let post = self.get_post(post_id).await?;
        let results = self.db.get_publish_results(post_id).await?;
        let in_flight = self
            .db
            .claimed_platforms(post_id, Utc::now().timestamp(), self.config.claim_lease)
            .await?;

        let status = match derive_post_status(&post.targets, &results, &in_flight) {
            Some(status) => status,
            // Nothing attempted: back to waiting on its schedules
            None if post.status == PostStatus::Publishing => {
                if self.db.active_schedule_count(post_id).await? > 0 {
                    PostStatus::Scheduled
                } else {
                    PostStatus::Draft
                }
            }
            None => post.status,
        };

        if status != post.status {
            self.db.update_post_status(post_id, status).await?;
        }
        Ok(status)
    }

    // ------------------------------------------------------------------
    // Reporting
    // ------------------------------------------------------------------

    pub async fn get_post_report(&self, post_id: &str) -> Result<PostReport> {
        let post = self.get_post(post_id).await?;
        let schedules = self
            .db
            .list_schedules(&ScheduleFilter {
                post_id: Some(post_id.to_string()),
                ..Default::default()
            })
            .await?;
        let results = self.db.get_publish_results(post_id).await?;

        Ok(PostReport::build(post, schedules, results))
    }

    pub async fn stats(&self) -> Result<PipelineStats> {
        let schedules = self
            .db
            .schedule_counts()
            .await?
            .into_iter()
            .map(|(status, count)| (status.as_str().to_string(), count))
            .collect();

        let platforms = self
            .db
            .platform_counts()
            .await?
            .into_iter()
            .map(|(platform, counts)| (platform, PlatformStats::new(counts.published, counts.failed)))
            .collect();

        Ok(PipelineStats {
            schedules,
            platforms,
        })
    }

    /// Breaker state for every key seen by this process or the store
    pub async fn circuit_states(&self) -> Result<Vec<(String, CircuitSnapshot)>> {
        self.guard.breakers().snapshot().await
    }
}

fn reject_past(at: DateTime<Utc>) -> Result<()> {
    if at.timestamp() < Utc::now().timestamp() {
        return Err(SocialcastError::InvalidInput(format!(
            "Schedule time {} is in the past",
            at.to_rfc3339()
        )));
    }
    Ok(())
}

fn base_result(post: &Post, schedule_id: Option<&str>, target: &Target) -> PublishResult {
    PublishResult {
        id: None,
        post_id: post.id.clone(),
        schedule_id: schedule_id.map(str::to_string),
        platform: target.platform.clone(),
        account_id: target.account.id.clone(),
        success: false,
        platform_post_id: None,
        url: None,
        failure_class: None,
        error_message: None,
        raw_response: None,
        attempts: 0,
        created_at: Utc::now().timestamp(),
    }
}

fn success(
    post: &Post,
    schedule_id: Option<&str>,
    target: &Target,
    publication: Publication,
    attempts: u32,
) -> PublishResult {
    PublishResult {
        success: true,
        platform_post_id: Some(publication.platform_post_id),
        url: publication.url,
        raw_response: publication.raw,
        attempts,
        ..base_result(post, schedule_id, target)
    }
}

fn failure(
    post: &Post,
    schedule_id: Option<&str>,
    target: &Target,
    class: FailureClass,
    message: String,
    attempts: u32,
) -> PublishResult {
    PublishResult {
        failure_class: Some(class),
        error_message: Some(message),
        attempts,
        ..base_result(post, schedule_id, target)
    }
}
