//! Aggregate post status and per-platform reporting
//!
//! A post's status is never set by hand once dispatch starts; it is
//! recomputed from the targets, the recorded results and the live claims.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::types::{FailureClass, Post, PostStatus, PublishResult, Schedule, Target};

/// Status implied by the results so far, or `None` when nothing was attempted.
///
/// - `publishing` while any target holds a live claim
/// - `published` when every target has a success
/// - `partially_published` when some but not all do
/// - `failed` when targets were attempted and none succeeded
pub fn derive_post_status(
    targets: &[Target],
    results: &[PublishResult],
    in_flight: &[String],
) -> Option<PostStatus> {
    if targets.iter().any(|t| in_flight.contains(&t.platform)) {
        return Some(PostStatus::Publishing);
    }

    let attempted: HashSet<&str> = results.iter().map(|r| r.platform.as_str()).collect();
    let succeeded: HashSet<&str> = results
        .iter()
        .filter(|r| r.success)
        .map(|r| r.platform.as_str())
        .collect();

    let attempted_targets = targets
        .iter()
        .filter(|t| attempted.contains(t.platform.as_str()))
        .count();
    if attempted_targets == 0 {
        return None;
    }

    let succeeded_targets = targets
        .iter()
        .filter(|t| succeeded.contains(t.platform.as_str()))
        .count();

    Some(if succeeded_targets == targets.len() {
        PostStatus::Published
    } else if succeeded_targets > 0 {
        PostStatus::PartiallyPublished
    } else {
        PostStatus::Failed
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    Pending,
    Published,
    Failed,
}

/// Latest known outcome for one target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetReport {
    pub platform: String,
    pub account_id: String,
    pub state: TargetState,
    pub platform_post_id: Option<String>,
    pub url: Option<String>,
    pub failure_class: Option<FailureClass>,
    pub error_message: Option<String>,
    /// Remediation hint for the failure class
    pub hint: Option<String>,
    /// Dispatches recorded for this target
    pub dispatches: usize,
}

/// Everything the UI needs to show per-platform outcomes of a post
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostReport {
    pub post: Post,
    pub targets: Vec<TargetReport>,
    pub schedules: Vec<Schedule>,
    pub results: Vec<PublishResult>,
}

impl PostReport {
    pub fn build(post: Post, schedules: Vec<Schedule>, results: Vec<PublishResult>) -> Self {
        let targets = post
            .targets
            .iter()
            .map(|target| target_report(target, &results))
            .collect();

        Self {
            post,
            targets,
            schedules,
            results,
        }
    }
}

fn target_report(target: &Target, results: &[PublishResult]) -> TargetReport {
    let mine: Vec<&PublishResult> = results
        .iter()
        .filter(|r| r.platform == target.platform)
        .collect();

    // A success is final; otherwise the most recent failure is what matters
    let latest = mine
        .iter()
        .find(|r| r.success)
        .or_else(|| mine.last())
        .copied();

    let state = match latest {
        Some(r) if r.success => TargetState::Published,
        Some(_) => TargetState::Failed,
        None => TargetState::Pending,
    };

    TargetReport {
        platform: target.platform.clone(),
        account_id: target.account.id.clone(),
        state,
        platform_post_id: latest.and_then(|r| r.platform_post_id.clone()),
        url: latest.and_then(|r| r.url.clone()),
        failure_class: latest.and_then(|r| r.failure_class),
        error_message: latest.and_then(|r| r.error_message.clone()),
        hint: latest
            .and_then(|r| r.failure_class)
            .map(|c| c.user_hint().to_string()),
        dispatches: mine.len(),
    }
}

/// Per-platform publish counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlatformStats {
    pub published: u64,
    pub failed: u64,
    /// Share of results that succeeded, 0.0 to 1.0
    pub success_rate: f64,
}

impl PlatformStats {
    pub fn new(published: u64, failed: u64) -> Self {
        let total = published + failed;
        let success_rate = if total == 0 {
            0.0
        } else {
            published as f64 / total as f64
        };
        Self {
            published,
            failed,
            success_rate,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineStats {
    /// Schedule counts keyed by status
    pub schedules: BTreeMap<String, u64>,
    pub platforms: BTreeMap<String, PlatformStats>,
}
