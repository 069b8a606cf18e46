//! Operations over many posts or schedules at once
//!
//! Each item is handled on its own: a failure is reported on that item and
//! the rest of the batch still runs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::ScheduleEngine;
use crate::error::{Result, SocialcastError};
use crate::scheduling::parse_schedule;
use crate::types::{NewPost, Post, PostStatus, Schedule};

pub use crate::scheduling::{RecurrenceInterval, RecurringPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Scheduled,
    Cancelled,
    Rescheduled,
    /// The schedule was already dispatched or closed; nothing changed
    Skipped,
    Error,
}

/// Outcome for one post or schedule of a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItem {
    /// Post id for scheduling, schedule id for cancel and reschedule
    pub id: String,
    pub status: BatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchItem {
    fn ok(id: &str, status: BatchStatus, schedule: Option<Schedule>) -> Self {
        Self {
            id: id.to_string(),
            status,
            schedule,
            error: None,
        }
    }

    fn error(id: &str, error: &SocialcastError) -> Self {
        Self {
            id: id.to_string(),
            status: BatchStatus::Error,
            schedule: None,
            error: Some(error.to_string()),
        }
    }
}

impl ScheduleEngine {
    /// Schedule each post with the same expression, in order.
    ///
    /// Every time is parsed against the one before it, so `random:` ranges
    /// space the posts out one after another. `anchor` seeds the first.
    pub async fn schedule_batch(
        &self,
        post_ids: &[String],
        input: &str,
        anchor: Option<i64>,
    ) -> Vec<BatchItem> {
        let mut last = anchor;
        let mut items = Vec::with_capacity(post_ids.len());

        for post_id in post_ids {
            let scheduled = match parse_schedule(input, last) {
                Ok(at) => self.create_schedule(post_id, at).await,
                Err(e) => Err(e),
            };

            match scheduled {
                Ok(schedule) => {
                    last = Some(schedule.scheduled_at);
                    items.push(BatchItem::ok(post_id, BatchStatus::Scheduled, Some(schedule)));
                }
                Err(e) => {
                    warn!("Could not schedule post {}: {}", post_id, e);
                    items.push(BatchItem::error(post_id, &e));
                }
            }
        }

        info!(
            "Scheduled {} of {} post(s)",
            count(&items, BatchStatus::Scheduled),
            post_ids.len()
        );
        items
    }

    /// Create one post per occurrence of `plan`, each with its own schedule.
    ///
    /// Occurrences that are already past are left out; a plan with none
    /// left in the future is rejected. Invalid content or targets fail
    /// before any post is created.
    pub async fn schedule_recurring(
        &self,
        new_post: NewPost,
        plan: &RecurringPlan,
    ) -> Result<Vec<BatchItem>> {
        let now = Utc::now();
        let occurrences: Vec<DateTime<Utc>> = plan
            .occurrences()?
            .into_iter()
            .filter(|at| *at > now)
            .collect();

        if occurrences.is_empty() {
            return Err(SocialcastError::InvalidInput(format!(
                "No {} occurrence between {} and {} is in the future",
                plan.interval, plan.start, plan.end
            )));
        }

        let mut items = Vec::with_capacity(occurrences.len());
        for at in occurrences {
            let post = self.create_post(new_post.clone()).await?;
            match self.create_schedule(&post.id, at).await {
                Ok(schedule) => {
                    items.push(BatchItem::ok(&post.id, BatchStatus::Scheduled, Some(schedule)))
                }
                Err(e) => {
                    warn!("Could not schedule recurring post {}: {}", post.id, e);
                    items.push(BatchItem::error(&post.id, &e));
                }
            }
        }

        info!(
            "Created {} {} post(s) from {} to {}",
            items.len(),
            plan.interval,
            plan.start,
            plan.end
        );
        Ok(items)
    }

    /// Cancel every schedule that is still open
    pub async fn cancel_schedules(&self, schedule_ids: &[String]) -> Vec<BatchItem> {
        let mut items = Vec::with_capacity(schedule_ids.len());
        for id in schedule_ids {
            items.push(match self.cancel_schedule(id).await {
                Ok(true) => BatchItem::ok(id, BatchStatus::Cancelled, None),
                Ok(false) => BatchItem::ok(id, BatchStatus::Skipped, None),
                Err(e) => BatchItem::error(id, &e),
            });
        }
        items
    }

    /// Move every open schedule to `at`
    pub async fn reschedule_many(
        &self,
        schedule_ids: &[String],
        at: DateTime<Utc>,
    ) -> Vec<BatchItem> {
        let mut items = Vec::with_capacity(schedule_ids.len());
        for id in schedule_ids {
            let moved = match self.reschedule(id, at).await {
                Ok(true) => self
                    .get_schedule(id)
                    .await
                    .map(|s| BatchItem::ok(id, BatchStatus::Rescheduled, Some(s))),
                Ok(false) => Ok(BatchItem::ok(id, BatchStatus::Skipped, None)),
                Err(e) => Err(e),
            };
            items.push(moved.unwrap_or_else(|e| BatchItem::error(id, &e)));
        }
        items
    }

    /// Most recently created posts, optionally only those in `status`
    pub async fn list_posts(&self, status: Option<PostStatus>, limit: u32) -> Result<Vec<Post>> {
        self.db.list_posts(status, limit).await
    }
}

fn count(items: &[BatchItem], status: BatchStatus) -> usize {
    items.iter().filter(|i| i.status == status).count()
}
