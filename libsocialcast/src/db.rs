//! Database operations for Socialcast
//!
//! Every state transition that two sweeps could race on is a single
//! conditional statement, so the row count tells the caller whether it won.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use crate::error::{DbError, Result};
use crate::types::{
    CircuitSnapshot, CircuitState, FailureClass, Post, PostStatus, PublishResult, Schedule,
    ScheduleStatus, SocialAccount, Target,
};

/// Filter for listing schedules
#[derive(Debug, Clone, Default)]
pub struct ScheduleFilter {
    pub status: Option<ScheduleStatus>,
    pub post_id: Option<String>,
    pub limit: Option<u32>,
}

/// Per-platform publish counters
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct PlatformCounts {
    pub published: u64,
    pub failed: u64,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database and run migrations.
    ///
    /// `:memory:` opens a private in-memory database on a single connection.
    pub async fn new(db_path: &str) -> Result<Self> {
        let in_memory = db_path == ":memory:";

        let options = if in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(DbError::SqlxError)?
        } else {
            let expanded_path = shellexpand::tilde(db_path).to_string();
            let path = Path::new(&expanded_path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
            }
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
        };

        let options = options
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(8)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    // ------------------------------------------------------------------
    // Posts
    // ------------------------------------------------------------------

    /// Insert a post together with its targets
    pub async fn create_post(&self, post: &Post) -> Result<()> {
        let media = encode_json(&post.media)?;
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        sqlx::query(
            r#"
            INSERT INTO posts (id, owner_id, content, media, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.owner_id)
        .bind(&post.content)
        .bind(media)
        .bind(post.status.as_str())
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;

        for (position, target) in post.targets.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO post_targets (post_id, platform, account_id, account_metadata, position)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&post.id)
            .bind(&target.platform)
            .bind(&target.account.id)
            .bind(encode_json(&target.account.metadata)?)
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;
        }

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Get a post (with targets) by ID
    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, content, media, status, created_at, updated_at
            FROM posts WHERE id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let targets = self.get_targets(post_id).await?;
        Ok(Some(post_from_row(&row, targets)?))
    }

    async fn get_targets(&self, post_id: &str) -> Result<Vec<Target>> {
        let rows = sqlx::query(
            r#"
            SELECT platform, account_id, account_metadata
            FROM post_targets WHERE post_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter()
            .map(|r| {
                let platform: String = r.get("platform");
                let metadata: BTreeMap<String, String> =
                    decode_json("post_targets", &r.get::<String, _>("account_metadata"))?;
                Ok(Target {
                    platform: platform.clone(),
                    account: SocialAccount {
                        id: r.get("account_id"),
                        platform,
                        metadata,
                    },
                })
            })
            .collect()
    }

    /// List posts, newest first
    pub async fn list_posts(&self, status: Option<PostStatus>, limit: u32) -> Result<Vec<Post>> {
        let rows = match status {
            Some(status) => sqlx::query(
                r#"
                SELECT id FROM posts WHERE status = ?
                ORDER BY created_at DESC LIMIT ?
                "#,
            )
            .bind(status.as_str())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query(
                r#"
                SELECT id FROM posts ORDER BY created_at DESC LIMIT ?
                "#,
            )
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await,
        }
        .map_err(DbError::SqlxError)?;

        let mut posts = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            if let Some(post) = self.get_post(&id).await? {
                posts.push(post);
            }
        }
        Ok(posts)
    }

    /// Update post status
    pub async fn update_post_status(&self, post_id: &str, status: PostStatus) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE posts SET status = ?, updated_at = ? WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(now())
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Update post content, only while the post is still editable.
    ///
    /// Returns false when the post moved past the editable states.
    pub async fn update_post_content(
        &self,
        post_id: &str,
        content: &str,
        media: &[String],
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE posts SET content = ?, media = ?, updated_at = ?
            WHERE id = ? AND status IN ('draft', 'scheduled')
            "#,
        )
        .bind(content)
        .bind(encode_json(media)?)
        .bind(now())
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    // ------------------------------------------------------------------
    // Schedules
    // ------------------------------------------------------------------

    pub async fn create_schedule(&self, schedule: &Schedule) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO schedules (id, post_id, scheduled_at, status, claimed_by, claimed_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&schedule.id)
        .bind(&schedule.post_id)
        .bind(schedule.scheduled_at)
        .bind(schedule.status.as_str())
        .bind(&schedule.claimed_by)
        .bind(schedule.claimed_at)
        .bind(schedule.created_at)
        .bind(schedule.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_schedule(&self, schedule_id: &str) -> Result<Option<Schedule>> {
        let row = sqlx::query(
            r#"
            SELECT id, post_id, scheduled_at, status, claimed_by, claimed_at, created_at, updated_at
            FROM schedules WHERE id = ?
            "#,
        )
        .bind(schedule_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(schedule_from_row).transpose()
    }

    pub async fn list_schedules(&self, filter: &ScheduleFilter) -> Result<Vec<Schedule>> {
        let mut where_clauses = vec!["1=1"];
        if filter.status.is_some() {
            where_clauses.push("status = ?");
        }
        if filter.post_id.is_some() {
            where_clauses.push("post_id = ?");
        }

        let query_str = format!(
            r#"
            SELECT id, post_id, scheduled_at, status, claimed_by, claimed_at, created_at, updated_at
            FROM schedules
            WHERE {}
            ORDER BY scheduled_at ASC
            LIMIT ?
            "#,
            where_clauses.join(" AND ")
        );

        let mut query = sqlx::query(&query_str);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(ref post_id) = filter.post_id {
            query = query.bind(post_id);
        }
        query = query.bind(filter.limit.map(i64::from).unwrap_or(-1));

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter().map(schedule_from_row).collect()
    }

    /// Pending schedules falling due within `[now, until]`
    pub async fn upcoming_schedules(&self, now: i64, until: i64) -> Result<Vec<Schedule>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, scheduled_at, status, claimed_by, claimed_at, created_at, updated_at
            FROM schedules
            WHERE status = 'pending' AND scheduled_at >= ? AND scheduled_at <= ?
            ORDER BY scheduled_at ASC
            "#,
        )
        .bind(now)
        .bind(until)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(schedule_from_row).collect()
    }

    /// Move every pending schedule whose time has come to `due`
    pub async fn promote_due_schedules(&self, now: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE schedules SET status = 'due', updated_at = ?
            WHERE status = 'pending' AND scheduled_at <= ?
            "#,
        )
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected())
    }

    pub async fn due_schedules(&self, limit: u32) -> Result<Vec<Schedule>> {
        self.list_schedules(&ScheduleFilter {
            status: Some(ScheduleStatus::Due),
            post_id: None,
            limit: Some(limit),
        })
        .await
    }

    /// Atomically claim an open schedule for dispatch.
    ///
    /// Only one caller can move a given schedule to `dispatched`.
    pub async fn claim_schedule(&self, schedule_id: &str, worker: &str, now: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE schedules
            SET status = 'dispatched', claimed_by = ?, claimed_at = ?, updated_at = ?
            WHERE id = ? AND status IN ('pending', 'due')
            "#,
        )
        .bind(worker)
        .bind(now)
        .bind(now)
        .bind(schedule_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Move a dispatched schedule to its terminal status
    pub async fn finish_schedule(&self, schedule_id: &str, status: ScheduleStatus) -> Result<bool> {
        debug_assert!(matches!(
            status,
            ScheduleStatus::Published | ScheduleStatus::Failed
        ));

        let result = sqlx::query(
            r#"
            UPDATE schedules SET status = ?, updated_at = ?
            WHERE id = ? AND status = 'dispatched'
            "#,
        )
        .bind(status.as_str())
        .bind(now())
        .bind(schedule_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn cancel_schedule(&self, schedule_id: &str, now: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE schedules SET status = 'cancelled', updated_at = ?
            WHERE id = ? AND status IN ('pending', 'due')
            "#,
        )
        .bind(now)
        .bind(schedule_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Move an open schedule to a new time; it becomes pending again
    pub async fn reschedule(&self, schedule_id: &str, scheduled_at: i64, now: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE schedules SET scheduled_at = ?, status = 'pending', updated_at = ?
            WHERE id = ? AND status IN ('pending', 'due')
            "#,
        )
        .bind(scheduled_at)
        .bind(now)
        .bind(schedule_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Schedules of a post that are not yet terminal
    pub async fn active_schedule_count(&self, post_id: &str) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n FROM schedules
            WHERE post_id = ? AND status IN ('pending', 'due', 'dispatched')
            "#,
        )
        .bind(post_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.get("n"))
    }

    /// Fail dispatched schedules whose claim is older than `cutoff`.
    ///
    /// Returns the affected post ids so their aggregate can be recomputed.
    pub async fn fail_stale_dispatches(&self, cutoff: i64) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            UPDATE schedules SET status = 'failed', updated_at = ?
            WHERE status = 'dispatched' AND claimed_at < ?
            RETURNING post_id
            "#,
        )
        .bind(now())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(|r| r.get("post_id")).collect())
    }

    pub async fn schedule_counts(&self) -> Result<HashMap<ScheduleStatus, u64>> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS n FROM schedules GROUP BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let mut counts = HashMap::new();
        for row in rows {
            let status = parse_column::<ScheduleStatus>("schedules", &row.get::<String, _>("status"))?;
            counts.insert(status, row.get::<i64, _>("n") as u64);
        }
        Ok(counts)
    }

    // ------------------------------------------------------------------
    // Publish results
    // ------------------------------------------------------------------

    /// Append a publish result and return its row id
    pub async fn create_publish_result(&self, result: &PublishResult) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO publish_results
                (post_id, schedule_id, platform, account_id, success, platform_post_id, url,
                 failure_class, error_message, raw_response, attempts, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&result.post_id)
        .bind(&result.schedule_id)
        .bind(&result.platform)
        .bind(&result.account_id)
        .bind(if result.success { 1 } else { 0 })
        .bind(&result.platform_post_id)
        .bind(&result.url)
        .bind(result.failure_class.map(|c| c.as_str()))
        .bind(&result.error_message)
        .bind(&result.raw_response)
        .bind(result.attempts as i64)
        .bind(result.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.get("id"))
    }

    /// All results for a post in insertion order
    pub async fn get_publish_results(&self, post_id: &str) -> Result<Vec<PublishResult>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, schedule_id, platform, account_id, success, platform_post_id, url,
                   failure_class, error_message, raw_response, attempts, created_at
            FROM publish_results
            WHERE post_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(publish_result_from_row).collect()
    }

    pub async fn has_successful_result(&self, post_id: &str, platform: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM publish_results
                WHERE post_id = ? AND platform = ? AND success = 1
            ) AS found
            "#,
        )
        .bind(post_id)
        .bind(platform)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.get::<i64, _>("found") != 0)
    }

    pub async fn platform_counts(&self) -> Result<BTreeMap<String, PlatformCounts>> {
        let rows = sqlx::query(
            r#"
            SELECT platform,
                   SUM(CASE WHEN success = 1 THEN 1 ELSE 0 END) AS published,
                   SUM(CASE WHEN success = 0 THEN 1 ELSE 0 END) AS failed
            FROM publish_results
            GROUP BY platform
            ORDER BY platform
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| {
                (
                    r.get::<String, _>("platform"),
                    PlatformCounts {
                        published: r.get::<i64, _>("published") as u64,
                        failed: r.get::<i64, _>("failed") as u64,
                    },
                )
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Per (post, platform) claims
    // ------------------------------------------------------------------

    /// Take the publish lease for a (post, platform) pair.
    ///
    /// Succeeds when no claim exists or the existing one is older than
    /// `lease`. A single upsert, so concurrent callers cannot both win.
    pub async fn try_claim_target(
        &self,
        post_id: &str,
        platform: &str,
        worker: &str,
        now: i64,
        lease: Duration,
    ) -> Result<bool> {
        let expired_before = now - lease.as_secs() as i64;

        let result = sqlx::query(
            r#"
            INSERT INTO publish_claims (post_id, platform, claimed_by, claimed_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(post_id, platform) DO UPDATE
                SET claimed_by = excluded.claimed_by, claimed_at = excluded.claimed_at
                WHERE publish_claims.claimed_at < ?
            "#,
        )
        .bind(post_id)
        .bind(platform)
        .bind(worker)
        .bind(now)
        .bind(expired_before)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn release_target(&self, post_id: &str, platform: &str, worker: &str) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM publish_claims
            WHERE post_id = ? AND platform = ? AND claimed_by = ?
            "#,
        )
        .bind(post_id)
        .bind(platform)
        .bind(worker)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Push the lease of a held target claim forward.
    ///
    /// `false` when the caller no longer holds it (reaped or taken over).
    pub async fn renew_target_claim(
        &self,
        post_id: &str,
        platform: &str,
        worker: &str,
        now: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE publish_claims SET claimed_at = ?
            WHERE post_id = ? AND platform = ? AND claimed_by = ?
            "#,
        )
        .bind(now)
        .bind(post_id)
        .bind(platform)
        .bind(worker)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Push the claim on a dispatched schedule forward so it is not reaped
    pub async fn renew_schedule_claim(
        &self,
        schedule_id: &str,
        worker: &str,
        now: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE schedules SET claimed_at = ?, updated_at = ?
            WHERE id = ? AND status = 'dispatched' AND claimed_by = ?
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(schedule_id)
        .bind(worker)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Platforms of a post with a live (unexpired) claim
    pub async fn claimed_platforms(
        &self,
        post_id: &str,
        now: i64,
        lease: Duration,
    ) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT platform FROM publish_claims
            WHERE post_id = ? AND claimed_at >= ?
            "#,
        )
        .bind(post_id)
        .bind(now - lease.as_secs() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(|r| r.get("platform")).collect())
    }

    pub async fn delete_expired_claims(&self, cutoff: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM publish_claims WHERE claimed_at < ?
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected())
    }

    // ------------------------------------------------------------------
    // Circuit states
    // ------------------------------------------------------------------

    pub async fn load_circuit_state(&self, key: &str) -> Result<Option<CircuitSnapshot>> {
        let row = sqlx::query(
            r#"
            SELECT dependency_key, state, consecutive_failures, last_failure_at, opened_at
            FROM circuit_states WHERE dependency_key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref()
            .map(|r| circuit_from_row(r).map(|(_, snapshot)| snapshot))
            .transpose()
    }

    pub async fn save_circuit_state(&self, key: &str, snapshot: &CircuitSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO circuit_states
                (dependency_key, state, consecutive_failures, last_failure_at, opened_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(dependency_key) DO UPDATE SET
                state = excluded.state,
                consecutive_failures = excluded.consecutive_failures,
                last_failure_at = excluded.last_failure_at,
                opened_at = excluded.opened_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(snapshot.state.as_str())
        .bind(snapshot.consecutive_failures as i64)
        .bind(snapshot.last_failure_at)
        .bind(snapshot.opened_at)
        .bind(now())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn list_circuit_states(&self) -> Result<Vec<(String, CircuitSnapshot)>> {
        let rows = sqlx::query(
            r#"
            SELECT dependency_key, state, consecutive_failures, last_failure_at, opened_at
            FROM circuit_states ORDER BY dependency_key
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(circuit_from_row).collect()
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn encode_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| {
        DbError::Corrupt {
            table: "posts",
            reason: e.to_string(),
        }
        .into()
    })
}

fn decode_json<T: serde::de::DeserializeOwned>(table: &'static str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        DbError::Corrupt {
            table,
            reason: e.to_string(),
        }
        .into()
    })
}

fn parse_column<T: FromStr<Err = String>>(table: &'static str, raw: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|reason| DbError::Corrupt { table, reason }.into())
}

fn post_from_row(row: &SqliteRow, targets: Vec<Target>) -> Result<Post> {
    Ok(Post {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        content: row.get("content"),
        media: decode_json("posts", &row.get::<String, _>("media"))?,
        targets,
        status: parse_column("posts", &row.get::<String, _>("status"))?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn schedule_from_row(row: &SqliteRow) -> Result<Schedule> {
    Ok(Schedule {
        id: row.get("id"),
        post_id: row.get("post_id"),
        scheduled_at: row.get("scheduled_at"),
        status: parse_column("schedules", &row.get::<String, _>("status"))?,
        claimed_by: row.get("claimed_by"),
        claimed_at: row.get("claimed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn publish_result_from_row(row: &SqliteRow) -> Result<PublishResult> {
    let failure_class = row
        .get::<Option<String>, _>("failure_class")
        .map(|raw| parse_column::<FailureClass>("publish_results", &raw))
        .transpose()?;

    Ok(PublishResult {
        id: row.get("id"),
        post_id: row.get("post_id"),
        schedule_id: row.get("schedule_id"),
        platform: row.get("platform"),
        account_id: row.get("account_id"),
        success: row.get::<i64, _>("success") != 0,
        platform_post_id: row.get("platform_post_id"),
        url: row.get("url"),
        failure_class,
        error_message: row.get("error_message"),
        raw_response: row.get("raw_response"),
        attempts: row.get::<i64, _>("attempts") as u32,
        created_at: row.get("created_at"),
    })
}

fn circuit_from_row(row: &SqliteRow) -> Result<(String, CircuitSnapshot)> {
    Ok((
        row.get("dependency_key"),
        CircuitSnapshot {
            state: parse_column::<CircuitState>("circuit_states", &row.get::<String, _>("state"))?,
            consecutive_failures: row.get::<i64, _>("consecutive_failures") as u32,
            last_failure_at: row.get("last_failure_at"),
            opened_at: row.get("opened_at"),
        },
    ))
}
