//! Background dispatch for the daemon
//!
//! A [`DispatchPool`] claims due schedules and hands each one to its own
//! task, so a dispatch waiting out a retry never holds up the next poll.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error};

use super::{ClaimReport, DispatchReport, ScheduleEngine};
use crate::error::Result;

/// What one poll started and what finished since the previous one
#[derive(Debug, Default, Serialize)]
pub struct TickReport {
    pub claims: ClaimReport,
    /// Dispatches that completed since the last tick
    pub finished: Vec<DispatchReport>,
    /// Dispatches still running after this tick
    pub in_flight: usize,
}

pub struct DispatchPool {
    engine: Arc<ScheduleEngine>,
    tasks: JoinSet<(String, Result<DispatchReport>)>,
}

impl DispatchPool {
    pub fn new(engine: Arc<ScheduleEngine>) -> Self {
        Self {
            engine,
            tasks: JoinSet::new(),
        }
    }

    pub fn engine(&self) -> &ScheduleEngine {
        &self.engine
    }

    /// Collect finished dispatches, then claim what is due at `now` and
    /// start a task for each claimed schedule. Does not wait on them.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<TickReport> {
        let mut finished = Vec::new();
        while let Some(joined) = self.tasks.try_join_next() {
            self.collect(joined, &mut finished);
        }

        let claims = self.engine.claim_due(now).await?;
        for schedule in claims.claimed.iter().cloned() {
            let engine = Arc::clone(&self.engine);
            self.tasks.spawn(async move {
                let report = engine.dispatch_claimed(&schedule).await;
                (schedule.id, report)
            });
        }

        if !claims.claimed.is_empty() {
            debug!(
                "Started {} dispatch(es), {} running",
                claims.claimed.len(),
                self.tasks.len()
            );
        }

        Ok(TickReport {
            claims,
            finished,
            in_flight: self.tasks.len(),
        })
    }

    /// Wait for every running dispatch
    pub async fn drain(&mut self) -> Vec<DispatchReport> {
        let mut finished = Vec::new();
        while let Some(joined) = self.tasks.join_next().await {
            self.collect(joined, &mut finished);
        }
        finished
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    fn collect(
        &self,
        joined: std::result::Result<(String, Result<DispatchReport>), tokio::task::JoinError>,
        finished: &mut Vec<DispatchReport>,
    ) {
        match joined {
            Ok((_, Ok(report))) => finished.push(report),
            Ok((schedule_id, Err(e))) => {
                error!("Dispatch of schedule {} failed: {}", schedule_id, e)
            }
            Err(e) => error!("Dispatch task ended abnormally: {}", e),
        }
    }
}
