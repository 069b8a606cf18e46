//! End-to-end dispatch scenarios for the schedule engine
//!
//! These tests drive the engine against a real SQLite file with mock
//! publishers and cover:
//! - Partial publishing and retries that skip published targets
//! - Concurrent sweeps and overlapping schedules never double-posting
//! - Cancellation, validation and circuit breaker short-circuits
//! - Event emission and the outbound concurrency bound
//! - Claim leases held through long retries, and background dispatch

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use libsocialcast::collaborators::{EventSink, StaticCredentialProvider};
use libsocialcast::engine::{
    DispatchPool, EngineConfig, ReapReport, ScheduleEngine, TargetOutcome,
};
use libsocialcast::error::{PlatformError, Result, SocialcastError};
use libsocialcast::events::{
    EventBus, POST_PUBLISHED, POST_PUBLISH_FAILED, SCHEDULE_CANCELLED,
};
use libsocialcast::publishers::instagram::InstagramPublisher;
use libsocialcast::publishers::mock::MockPublisher;
use libsocialcast::publishers::{Publication, PublisherRegistry};
use libsocialcast::resilience::{
    CircuitBreakerConfig, InMemoryCircuitStore, ResilienceGuard, RetryPolicy,
};
use libsocialcast::types::{
    CircuitState, FailureClass, NewPost, PostStatus, Schedule, ScheduleStatus, SocialAccount,
    Target,
};
use libsocialcast::Database;
use serde_json::Value;
use tempfile::TempDir;

const PLATFORMS: &[&str] = &["instagram", "linkedin", "twitter"];

/// Helper to create a test database
async fn create_test_db() -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
    (temp_dir, db)
}

/// Retries in milliseconds so tests stay fast
fn fast_guard(failure_threshold: u32) -> ResilienceGuard {
    ResilienceGuard::new(
        CircuitBreakerConfig {
            failure_threshold,
            reset_timeout: Duration::from_secs(60),
        },
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5)),
        Arc::new(InMemoryCircuitStore::new()),
    )
}

fn credentials() -> Arc<StaticCredentialProvider> {
    let provider = PLATFORMS
        .iter()
        .fold(StaticCredentialProvider::new(), |p, platform| {
            p.with_token(format!("acct-{}", platform), "token")
        });
    Arc::new(provider)
}

fn engine(db: Database, registry: PublisherRegistry, worker: &str) -> ScheduleEngine {
    ScheduleEngine::builder(db, registry)
        .guard(fast_guard(3))
        .credentials(credentials())
        .config(EngineConfig::default().with_worker_id(worker))
        .build()
}

fn new_post(platforms: &[&str]) -> NewPost {
    NewPost {
        owner_id: "owner".to_string(),
        content: "Launch day".to_string(),
        media: vec![],
        targets: platforms
            .iter()
            .map(|p| Target::new(SocialAccount::new(format!("acct-{}", p), *p)))
            .collect(),
    }
}

/// Insert a schedule that is already due, bypassing the past-time check
async fn due_schedule(db: &Database, post_id: &str) -> Schedule {
    let schedule = Schedule::new(post_id.to_string(), Utc::now().timestamp() - 5);
    db.create_schedule(&schedule).await.unwrap();
    schedule
}

fn outcome_for<'a>(targets: &'a [TargetOutcome], platform: &str) -> &'a TargetOutcome {
    targets
        .iter()
        .find(|t| t.platform() == platform)
        .unwrap_or_else(|| panic!("No outcome for {}", platform))
}

#[tokio::test]
async fn test_partial_publish_then_retry_skips_published_target() {
    let (_dir, db) = create_test_db().await;

    let twitter = MockPublisher::success("twitter");
    let twitter_calls = twitter.calls();
    let linkedin = MockPublisher::scripted(
        "linkedin",
        vec![Err(PlatformError::Permanent("HTTP 401".to_string()))],
    );
    let linkedin_calls = linkedin.calls();
    let registry = PublisherRegistry::new().with(twitter).with(linkedin);
    let engine = engine(db.clone(), registry, "worker-a");

    let post = engine
        .create_post(new_post(&["twitter", "linkedin"]))
        .await
        .unwrap();
    let report = engine.publish_now(&post.id).await.unwrap();

    assert_eq!(report.status, PostStatus::PartiallyPublished);
    let failed = outcome_for(&report.targets, "linkedin").result().unwrap();
    assert!(!failed.success);
    assert_eq!(failed.failure_class, Some(FailureClass::Permanent));
    assert_eq!(failed.attempts, 1);
    assert_eq!(linkedin_calls.count(), 1);

    // The retry goes back to linkedin only
    let retry = engine.retry_publish(&post.id).await.unwrap();
    assert_eq!(retry.status, PostStatus::Published);
    assert!(matches!(
        outcome_for(&retry.targets, "twitter"),
        TargetOutcome::AlreadyPublished { .. }
    ));
    assert_eq!(twitter_calls.count(), 1);
    assert_eq!(linkedin_calls.count(), 2);

    let results = db.get_publish_results(&post.id).await.unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(
        results
            .iter()
            .filter(|r| r.platform == "twitter" && r.success)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_overlapping_schedules_publish_once() {
    let (_dir, db) = create_test_db().await;

    let twitter = MockPublisher::success("twitter").with_delay(Duration::from_millis(50));
    let calls = twitter.calls();
    let engine = engine(db.clone(), PublisherRegistry::new().with(twitter), "worker-a");

    let post = engine.create_post(new_post(&["twitter"])).await.unwrap();
    let first = due_schedule(&db, &post.id).await;
    let second = due_schedule(&db, &post.id).await;

    let report = engine.sweep(Utc::now()).await.unwrap();

    assert_eq!(report.dispatches.len(), 2);
    assert_eq!(calls.count(), 1);
    assert_eq!(db.get_publish_results(&post.id).await.unwrap().len(), 1);
    assert_eq!(
        engine.get_post(&post.id).await.unwrap().status,
        PostStatus::Published
    );

    // The schedule that waited on the other one's claim still succeeded
    for schedule in [&first, &second] {
        assert_eq!(
            engine.get_schedule(&schedule.id).await.unwrap().status,
            ScheduleStatus::Published
        );
    }
    assert!(report
        .dispatches
        .iter()
        .all(|d| d.status == PostStatus::Published));
}

#[tokio::test]
async fn test_concurrent_sweeps_never_double_post() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("shared.db");
    let db_a = Database::new(db_path.to_str().unwrap()).await.unwrap();
    let db_b = Database::new(db_path.to_str().unwrap()).await.unwrap();

    let twitter = MockPublisher::success("twitter").with_delay(Duration::from_millis(20));
    let linkedin = MockPublisher::success("linkedin").with_delay(Duration::from_millis(20));
    let twitter_calls = twitter.calls();
    let linkedin_calls = linkedin.calls();
    let registry = PublisherRegistry::new().with(twitter).with(linkedin);

    let engine_a = engine(db_a.clone(), registry.clone(), "worker-a");
    let engine_b = engine(db_b, registry, "worker-b");

    let mut post_ids = Vec::new();
    for _ in 0..5 {
        let post = engine_a
            .create_post(new_post(&["twitter", "linkedin"]))
            .await
            .unwrap();
        due_schedule(&db_a, &post.id).await;
        post_ids.push(post.id);
    }

    let now = Utc::now();
    let (a, b) = tokio::join!(engine_a.sweep(now), engine_b.sweep(now));
    let (a, b) = (a.unwrap(), b.unwrap());

    // Every schedule went to exactly one worker
    assert_eq!(a.dispatches.len() + b.dispatches.len(), 5);
    assert_eq!(twitter_calls.count(), 5);
    assert_eq!(linkedin_calls.count(), 5);

    for post_id in &post_ids {
        let results = db_a.get_publish_results(post_id).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success));
    }
}

#[tokio::test]
async fn test_cancelled_schedule_produces_no_results() {
    let (_dir, db) = create_test_db().await;

    let twitter = MockPublisher::success("twitter");
    let calls = twitter.calls();
    let engine = engine(db.clone(), PublisherRegistry::new().with(twitter), "worker-a");

    let post = engine.create_post(new_post(&["twitter"])).await.unwrap();
    let schedule = engine
        .create_schedule(&post.id, Utc::now() + chrono::Duration::minutes(10))
        .await
        .unwrap();
    assert!(engine.cancel_schedule(&schedule.id).await.unwrap());

    let report = engine
        .sweep(Utc::now() + chrono::Duration::hours(1))
        .await
        .unwrap();

    assert!(report.dispatches.is_empty());
    assert_eq!(calls.count(), 0);
    assert!(db.get_publish_results(&post.id).await.unwrap().is_empty());
    assert_eq!(
        engine.get_schedule(&schedule.id).await.unwrap().status,
        ScheduleStatus::Cancelled
    );
}

#[tokio::test]
async fn test_cancel_after_dispatch_returns_false() {
    let (_dir, db) = create_test_db().await;
    let engine = engine(
        db,
        PublisherRegistry::new().with(MockPublisher::success("twitter")),
        "worker-a",
    );

    let post = engine.create_post(new_post(&["twitter"])).await.unwrap();
    let report = engine.publish_now(&post.id).await.unwrap();
    let schedule_id = report.schedule_id.unwrap();

    assert!(!engine.cancel_schedule(&schedule_id).await.unwrap());
    assert!(!engine
        .reschedule(&schedule_id, Utc::now() + chrono::Duration::hours(1))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_instagram_without_media_fails_validation_without_network() {
    let (_dir, db) = create_test_db().await;

    // Nothing listens on this address; any request would surface as transient
    let instagram =
        InstagramPublisher::new(Some("http://127.0.0.1:9"), Duration::from_secs(1)).unwrap();
    let engine = engine(db, PublisherRegistry::new().with(instagram), "worker-a");

    let post = engine.create_post(new_post(&["instagram"])).await.unwrap();
    let report = engine.publish_now(&post.id).await.unwrap();

    let result = outcome_for(&report.targets, "instagram").result().unwrap();
    assert!(!result.success);
    assert_eq!(result.failure_class, Some(FailureClass::Validation));
    assert_eq!(result.attempts, 0);
    assert_eq!(report.status, PostStatus::Failed);
}

#[tokio::test]
async fn test_breaker_opens_and_skips_calls() {
    let (_dir, db) = create_test_db().await;

    let linkedin = MockPublisher::failing(
        "linkedin",
        PlatformError::Transient("HTTP 503".to_string()),
    );
    let calls = linkedin.calls();
    let engine = engine(db, PublisherRegistry::new().with(linkedin), "worker-a");

    let first = engine.create_post(new_post(&["linkedin"])).await.unwrap();
    let report = engine.publish_now(&first.id).await.unwrap();
    let result = outcome_for(&report.targets, "linkedin").result().unwrap();
    assert_eq!(result.failure_class, Some(FailureClass::Transient));
    assert_eq!(result.attempts, 3);
    assert_eq!(calls.count(), 3);

    // Three consecutive failures opened the circuit
    let second = engine.create_post(new_post(&["linkedin"])).await.unwrap();
    let report = engine.publish_now(&second.id).await.unwrap();
    let result = outcome_for(&report.targets, "linkedin").result().unwrap();
    assert_eq!(result.failure_class, Some(FailureClass::CircuitOpen));
    assert_eq!(result.attempts, 0);
    assert_eq!(calls.count(), 3);

    let states = engine.circuit_states().await.unwrap();
    let (_, snapshot) = states.iter().find(|(key, _)| key == "linkedin").unwrap();
    assert_eq!(snapshot.state, CircuitState::Open);
}

#[tokio::test]
async fn test_rate_limited_then_success() {
    let (_dir, db) = create_test_db().await;

    let twitter = MockPublisher::scripted(
        "twitter",
        vec![Err(PlatformError::RateLimited {
            message: "HTTP 429".to_string(),
            retry_after: Some(Duration::from_millis(10)),
        })],
    );
    let calls = twitter.calls();
    let engine = engine(db, PublisherRegistry::new().with(twitter), "worker-a");

    let post = engine.create_post(new_post(&["twitter"])).await.unwrap();
    let report = engine.publish_now(&post.id).await.unwrap();

    let result = outcome_for(&report.targets, "twitter").result().unwrap();
    assert!(result.success);
    assert_eq!(result.attempts, 2);
    assert_eq!(calls.count(), 2);
}

#[tokio::test]
async fn test_outbound_calls_are_bounded() {
    let (_dir, db) = create_test_db().await;

    let twitter = MockPublisher::success("twitter").with_delay(Duration::from_millis(40));
    let calls = twitter.calls();
    let engine = ScheduleEngine::builder(db.clone(), PublisherRegistry::new().with(twitter))
        .guard(fast_guard(3))
        .credentials(credentials())
        .config(EngineConfig {
            max_concurrent_publishes: 2,
            ..EngineConfig::default()
        })
        .build();

    for _ in 0..5 {
        let post = engine.create_post(new_post(&["twitter"])).await.unwrap();
        due_schedule(&db, &post.id).await;
    }

    let report = engine.sweep(Utc::now()).await.unwrap();

    assert_eq!(report.dispatches.len(), 5);
    assert_eq!(calls.count(), 5);
    assert!(calls.max_in_flight() <= 2, "saw {}", calls.max_in_flight());
}

#[tokio::test]
async fn test_events_emitted_per_target() {
    let (_dir, db) = create_test_db().await;

    let bus = EventBus::new(16);
    let mut receiver = bus.subscribe();
    let registry = PublisherRegistry::new()
        .with(MockPublisher::success("twitter"))
        .with(MockPublisher::failing(
            "linkedin",
            PlatformError::Validation("too long".to_string()),
        ));
    let engine = ScheduleEngine::builder(db, registry)
        .guard(fast_guard(3))
        .credentials(credentials())
        .events(Arc::new(bus))
        .build();

    let post = engine
        .create_post(new_post(&["twitter", "linkedin"]))
        .await
        .unwrap();
    engine.publish_now(&post.id).await.unwrap();

    let mut names = vec![
        receiver.recv().await.unwrap(),
        receiver.recv().await.unwrap(),
    ]
    .into_iter()
    .map(|e| {
        assert_eq!(e.payload["post_id"], post.id.as_str());
        e.name
    })
    .collect::<Vec<_>>();
    names.sort();

    assert_eq!(names, vec![POST_PUBLISH_FAILED, POST_PUBLISHED]);
}

#[tokio::test]
async fn test_cancel_emits_schedule_cancelled() {
    let (_dir, db) = create_test_db().await;

    let bus = EventBus::new(16);
    let mut receiver = bus.subscribe();
    let engine = ScheduleEngine::builder(
        db,
        PublisherRegistry::new().with(MockPublisher::success("twitter")),
    )
    .credentials(credentials())
    .events(Arc::new(bus))
    .build();

    let post = engine.create_post(new_post(&["twitter"])).await.unwrap();
    let schedule = engine
        .create_schedule(&post.id, Utc::now() + chrono::Duration::minutes(30))
        .await
        .unwrap();
    assert!(engine.cancel_schedule(&schedule.id).await.unwrap());

    let event = receiver.recv().await.unwrap();
    assert_eq!(event.name, SCHEDULE_CANCELLED);
    assert_eq!(event.payload["schedule_id"], schedule.id.as_str());
    assert_eq!(event.payload["post_id"], post.id.as_str());
}

struct BrokenSink;

#[async_trait]
impl EventSink for BrokenSink {
    async fn publish(&self, _event: &str, _payload: Value) -> Result<()> {
        Err(SocialcastError::InvalidState("sink is down".to_string()))
    }
}

#[tokio::test]
async fn test_broken_event_sink_does_not_fail_dispatch() {
    let (_dir, db) = create_test_db().await;
    let engine = ScheduleEngine::builder(
        db,
        PublisherRegistry::new().with(MockPublisher::success("twitter")),
    )
    .credentials(credentials())
    .events(Arc::new(BrokenSink))
    .build();

    let post = engine.create_post(new_post(&["twitter"])).await.unwrap();
    let report = engine.publish_now(&post.id).await.unwrap();

    assert_eq!(report.status, PostStatus::Published);
}

#[tokio::test]
async fn test_abandoned_dispatch_is_reaped_and_taken_over() {
    let (_dir, db) = create_test_db().await;

    let twitter = MockPublisher::success("twitter");
    let calls = twitter.calls();
    let engine = engine(db.clone(), PublisherRegistry::new().with(twitter), "worker-a");

    let post = engine.create_post(new_post(&["twitter"])).await.unwrap();
    let schedule = due_schedule(&db, &post.id).await;

    // A worker claimed both the schedule and the target, then died
    let long_ago = Utc::now().timestamp() - 3600;
    assert!(db
        .claim_schedule(&schedule.id, "dead-worker", long_ago)
        .await
        .unwrap());
    assert!(db
        .try_claim_target(
            &post.id,
            "twitter",
            "dead-worker",
            long_ago,
            Duration::from_secs(300)
        )
        .await
        .unwrap());

    let report = engine.sweep(Utc::now()).await.unwrap();
    assert_eq!(report.reaped.stale_schedules, 1);
    assert_eq!(report.reaped.expired_claims, 1);
    assert_eq!(
        engine.get_schedule(&schedule.id).await.unwrap().status,
        ScheduleStatus::Failed
    );

    let report = engine.publish_now(&post.id).await.unwrap();
    assert_eq!(report.status, PostStatus::Published);
    assert_eq!(calls.count(), 1);
}

#[tokio::test]
async fn test_media_only_post_reaches_publisher_with_urls() {
    let (_dir, db) = create_test_db().await;

    let twitter = MockPublisher::scripted(
        "twitter",
        vec![Ok(Publication {
            platform_post_id: "123".to_string(),
            url: Some("https://x.com/i/web/status/123".to_string()),
            raw: None,
        })],
    );
    let engine = ScheduleEngine::builder(db, PublisherRegistry::new().with(twitter))
        .credentials(credentials())
        .media(Arc::new(
            libsocialcast::collaborators::BaseUrlMediaResolver::new(Some(
                "https://cdn.example.com".to_string(),
            )),
        ))
        .build();

    let mut post = new_post(&["twitter"]);
    post.content = String::new();
    post.media = vec!["a.jpg".to_string()];
    let post = engine.create_post(post).await.unwrap();

    let report = engine.publish_now(&post.id).await.unwrap();
    let result = outcome_for(&report.targets, "twitter").result().unwrap();
    assert_eq!(result.platform_post_id.as_deref(), Some("123"));
    assert_eq!(
        result.url.as_deref(),
        Some("https://x.com/i/web/status/123")
    );
}

fn leased_engine(
    db: Database,
    registry: PublisherRegistry,
    worker: &str,
    policy: RetryPolicy,
    lease: Duration,
) -> ScheduleEngine {
    let guard = ResilienceGuard::new(
        CircuitBreakerConfig {
            failure_threshold: 10,
            reset_timeout: Duration::from_secs(60),
        },
        policy,
        Arc::new(InMemoryCircuitStore::new()),
    );
    ScheduleEngine::builder(db, registry)
        .guard(guard)
        .credentials(credentials())
        .config(EngineConfig {
            claim_lease: lease,
            ..EngineConfig::default().with_worker_id(worker)
        })
        .build()
}

fn rate_limited(
    retry_after: Option<Duration>,
) -> std::result::Result<Publication, PlatformError> {
    Err(PlatformError::RateLimited {
        message: "HTTP 429".to_string(),
        retry_after,
    })
}

#[tokio::test]
async fn test_retry_after_longer_than_lease_is_left_for_later() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("shared.db");
    let db_a = Database::new(db_path.to_str().unwrap()).await.unwrap();
    let db_b = Database::new(db_path.to_str().unwrap()).await.unwrap();

    let twitter = MockPublisher::scripted(
        "twitter",
        vec![rate_limited(Some(Duration::from_secs(5)))],
    )
    .with_timeout(Duration::from_millis(200));
    let calls = twitter.calls();
    let registry = PublisherRegistry::new().with(twitter);
    let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5));
    let lease = Duration::from_secs(2);

    let engine_a = leased_engine(
        db_a.clone(),
        registry.clone(),
        "worker-a",
        policy.clone(),
        lease,
    );
    let engine_b = leased_engine(db_b, registry, "worker-b", policy, lease);

    let post = engine_a.create_post(new_post(&["twitter"])).await.unwrap();

    // Waiting 5s would outlive the 2s lease, so the attempt is recorded as is
    let started = Instant::now();
    let report = engine_a.publish_now(&post.id).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    let result = outcome_for(&report.targets, "twitter").result().unwrap();
    assert!(!result.success);
    assert_eq!(result.failure_class, Some(FailureClass::RateLimited));
    assert_eq!(result.attempts, 1);
    assert_eq!(report.status, PostStatus::Failed);

    let retry = engine_b.retry_publish(&post.id).await.unwrap();
    assert_eq!(retry.status, PostStatus::Published);

    assert_eq!(calls.count(), 2);
    let results = db_a.get_publish_results(&post.id).await.unwrap();
    assert_eq!(results.iter().filter(|r| r.success).count(), 1);
}

#[tokio::test]
async fn test_long_retry_keeps_claims_alive() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("shared.db");
    let db_a = Database::new(db_path.to_str().unwrap()).await.unwrap();
    let db_b = Database::new(db_path.to_str().unwrap()).await.unwrap();

    // Six rate limits 700ms apart keep the dispatch busy for over 4s
    let twitter = MockPublisher::scripted(
        "twitter",
        (0..6).map(|_| rate_limited(None)).collect(),
    )
    .with_timeout(Duration::from_millis(100));
    let calls = twitter.calls();
    let registry = PublisherRegistry::new().with(twitter);
    let policy = RetryPolicy::new(8, Duration::from_millis(1), Duration::from_millis(700));
    let lease = Duration::from_secs(2);

    let engine_a = leased_engine(
        db_a.clone(),
        registry.clone(),
        "worker-a",
        policy.clone(),
        lease,
    );
    let engine_b = leased_engine(db_b, registry, "worker-b", policy, lease);

    let post = engine_a.create_post(new_post(&["twitter"])).await.unwrap();

    let (report, reaped) = tokio::join!(engine_a.publish_now(&post.id), async {
        // Past the lease since the first claim
        tokio::time::sleep(Duration::from_millis(3200)).await;
        engine_b.sweep(Utc::now()).await
    });

    let reaped = reaped.unwrap().reaped;
    assert_eq!(reaped, ReapReport::default());

    let report = report.unwrap();
    assert_eq!(report.status, PostStatus::Published);
    let result = outcome_for(&report.targets, "twitter").result().unwrap();
    assert!(result.success);
    assert_eq!(result.attempts, 7);
    assert_eq!(calls.count(), 7);

    let results = db_a.get_publish_results(&post.id).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(
        engine_a
            .get_schedule(report.schedule_id.as_deref().unwrap())
            .await
            .unwrap()
            .status,
        ScheduleStatus::Published
    );
}

#[tokio::test]
async fn test_pool_tick_does_not_wait_on_retries() {
    let (_dir, db) = create_test_db().await;

    let twitter = MockPublisher::scripted(
        "twitter",
        vec![rate_limited(Some(Duration::from_secs(2)))],
    );
    let twitter_calls = twitter.calls();
    let linkedin = MockPublisher::success("linkedin");
    let registry = PublisherRegistry::new().with(twitter).with(linkedin);
    let engine = Arc::new(engine(db.clone(), registry, "worker-a"));

    let slow = engine.create_post(new_post(&["twitter"])).await.unwrap();
    due_schedule(&db, &slow.id).await;

    let quick = engine.create_post(new_post(&["linkedin"])).await.unwrap();
    let later = Schedule::new(quick.id.clone(), Utc::now().timestamp() + 1);
    db.create_schedule(&later).await.unwrap();

    let mut pool = DispatchPool::new(Arc::clone(&engine));

    let started = Instant::now();
    let first = pool.tick(Utc::now()).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(first.claims.claimed.len(), 1);
    assert_eq!(first.in_flight, 1);

    // The next poll picks up the linkedin schedule while twitter waits out its retry
    let second = pool
        .tick(Utc::now() + chrono::Duration::seconds(2))
        .await
        .unwrap();
    assert_eq!(second.claims.claimed.len(), 1);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let quick_results = db.get_publish_results(&quick.id).await.unwrap();
    assert!(quick_results.iter().any(|r| r.success));
    assert!(db.get_publish_results(&slow.id).await.unwrap().is_empty());

    let finished = pool.drain().await;
    assert_eq!(finished.len(), 2);
    assert!(finished.iter().all(|d| d.status == PostStatus::Published));
    assert_eq!(twitter_calls.count(), 2);
    assert_eq!(pool.in_flight(), 0);
}
