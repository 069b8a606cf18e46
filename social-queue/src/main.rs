//! social-queue - Create, schedule and inspect posts
//!
//! Unix-style front end to the socialcast publishing pipeline. Every
//! command prints plain text by default and JSON with `--format json`.

use std::io::{IsTerminal, Read};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use libsocialcast::engine::{BatchItem, BatchStatus, TargetOutcome, TargetState};
use libsocialcast::logging::LoggingConfig;
use libsocialcast::scheduling::{
    parse_schedule, parse_time_of_day, RecurrenceInterval, RecurringPlan,
};
use libsocialcast::types::SocialAccount;
use libsocialcast::{
    Config, DispatchReport, NewPost, PostStatus, Result, Schedule, ScheduleEngine, ScheduleFilter,
    ScheduleStatus, SocialcastError, Target,
};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "social-queue")]
#[command(version)]
#[command(about = "Create, schedule and inspect posts")]
#[command(long_about = "\
social-queue - Create, schedule and inspect posts

DESCRIPTION:
    social-queue manages posts in the socialcast queue: create a post for
    one or more platforms, schedule it, move or cancel schedules, publish
    right away, and see what happened on every platform.

    The social-send daemon publishes scheduled posts when they are due.

COMMANDS:
    create           Create a post (optionally scheduling it with --at)
    schedule         Schedule a post
    schedule-many    Schedule several posts one after another
    recurring        Create one post per daily, weekly or monthly occurrence
    cancel           Cancel one or more schedules
    reschedule       Move a schedule to a different time
    reschedule-many  Move several schedules to one time
    now              Publish a post immediately
    retry            Publish again to platforms that failed
    status           Show per-platform outcomes of a post
    list             List schedules
    posts            List posts
    stats            Show publishing statistics
    breakers         Show circuit breaker state per platform

USAGE EXAMPLES:
    # Create a post for two accounts and print its id
    social-queue create \"Launch day!\" -t twitter:acct-1 -t linkedin:acct-2

    # Schedule it
    social-queue schedule <POST_ID> \"tomorrow 9am\"
    social-queue schedule <POST_ID> 2h
    social-queue schedule <POST_ID> random:1h-4h

    # Space three posts 1-3 hours apart
    social-queue schedule-many random:1h-3h <POST_ID> <POST_ID> <POST_ID>

    # Every weekday morning for a week
    social-queue recurring \"Tip of the day\" -t twitter:acct-1 \\
        --start 2026-03-02 --end 2026-03-06 --every daily --time 09:00

    # Where did it go?
    social-queue status <POST_ID> --format json

SCHEDULE TIMES:
    RFC 3339 (2026-03-01T09:00:00Z), durations from now (30m, 2h, 1 day),
    natural language (tomorrow 3pm) or random:MIN-MAX. Times in the past
    are rejected.

CONFIGURATION:
    Configuration file: ~/.config/socialcast/config.toml

    Override with environment variables:
        SOCIALCAST_CONFIG    - Path to config file
        SOCIALCAST_DB_PATH   - Path to database file

EXIT CODES:
    0 - Success
    1 - Operation failed (a platform failed, schedule no longer open, ...)
    2 - Database, configuration or platform setup error
    3 - Invalid input (bad id, time format, etc.)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a post
    Create {
        /// Post text (read from stdin when omitted)
        content: Option<String>,

        /// Target as PLATFORM:ACCOUNT_ID (repeatable)
        #[arg(short, long = "target", value_name = "PLATFORM:ACCOUNT", required = true)]
        targets: Vec<String>,

        /// Media reference (repeatable)
        #[arg(short, long = "media", value_name = "REF")]
        media: Vec<String>,

        /// Account metadata as PLATFORM:KEY=VALUE (repeatable)
        #[arg(long = "meta", value_name = "PLATFORM:KEY=VALUE")]
        meta: Vec<String>,

        /// Owner recorded on the post
        #[arg(long, default_value = "local")]
        owner: String,

        /// Schedule the new post right away
        #[arg(long, value_name = "TIME")]
        at: Option<String>,
    },

    /// Schedule a post
    Schedule {
        post_id: String,

        /// When to publish (e.g. "tomorrow 3pm", "2h", "random:1h-3h")
        time: String,
    },

    /// Schedule several posts with one expression; `random:` ranges
    /// space them out one after another
    ScheduleMany {
        /// When to publish (same forms as `schedule`)
        time: String,

        #[arg(required = true)]
        post_ids: Vec<String>,
    },

    /// Create one post per occurrence of a daily, weekly or monthly plan
    Recurring {
        /// Post text (read from stdin when omitted)
        content: Option<String>,

        /// Target as PLATFORM:ACCOUNT_ID (repeatable)
        #[arg(short, long = "target", value_name = "PLATFORM:ACCOUNT", required = true)]
        targets: Vec<String>,

        /// Media reference (repeatable)
        #[arg(short, long = "media", value_name = "REF")]
        media: Vec<String>,

        /// Account metadata as PLATFORM:KEY=VALUE (repeatable)
        #[arg(long = "meta", value_name = "PLATFORM:KEY=VALUE")]
        meta: Vec<String>,

        /// Owner recorded on the posts
        #[arg(long, default_value = "local")]
        owner: String,

        /// First date, YYYY-MM-DD
        #[arg(long, value_name = "DATE")]
        start: String,

        /// Last date (inclusive), YYYY-MM-DD
        #[arg(long, value_name = "DATE")]
        end: String,

        /// daily, weekly or monthly
        #[arg(long, value_name = "INTERVAL", default_value = "daily")]
        every: String,

        /// Time of day in UTC, HH:MM (repeatable)
        #[arg(long = "time", value_name = "HH:MM", required = true)]
        times: Vec<String>,
    },

    /// Cancel schedules that have not been dispatched
    Cancel {
        #[arg(required = true)]
        schedule_ids: Vec<String>,
    },

    /// Move a schedule to a different time
    Reschedule {
        schedule_id: String,

        /// New time (same forms as `schedule`)
        time: String,
    },

    /// Move several schedules to the same time
    RescheduleMany {
        /// New time (same forms as `schedule`)
        time: String,

        #[arg(required = true)]
        schedule_ids: Vec<String>,
    },

    /// Publish a post immediately
    Now { post_id: String },

    /// Publish again, only to platforms without a success
    Retry { post_id: String },

    /// Show per-platform outcomes of a post
    Status { post_id: String },

    /// List schedules
    List {
        /// Only schedules with this status
        #[arg(long)]
        status: Option<String>,

        /// Only schedules of this post
        #[arg(long, value_name = "POST_ID")]
        post: Option<String>,

        /// Only open schedules firing within this duration (e.g. 24h)
        #[arg(long, value_name = "DURATION", conflicts_with_all = ["status", "post"])]
        within: Option<String>,

        #[arg(long)]
        limit: Option<u32>,
    },

    /// List posts, newest first
    Posts {
        /// Only posts with this status
        #[arg(long)]
        status: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: u32,
    },

    /// Show publishing statistics
    Stats,

    /// Show circuit breaker state per platform
    Breakers,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env("error", cli.verbose).init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

/// Runs the command and returns the process exit code
async fn run(cli: Cli) -> Result<i32> {
    let config = Config::load()?;
    let engine = ScheduleEngine::from_config(&config).await?;
    let format = cli.format;

    match cli.command {
        Commands::Create {
            content,
            targets,
            media,
            meta,
            owner,
            at,
        } => cmd_create(&engine, format, content, &targets, media, &meta, owner, at).await,
        Commands::Schedule { post_id, time } => cmd_schedule(&engine, format, &post_id, &time).await,
        Commands::ScheduleMany { time, post_ids } => {
            let anchor = random_anchor(&engine, &time).await?;
            let items = engine.schedule_batch(&post_ids, &time, anchor).await;
            output_batch(format, &items)
        }
        Commands::Recurring {
            content,
            targets,
            media,
            meta,
            owner,
            start,
            end,
            every,
            times,
        } => {
            let plan = RecurringPlan {
                start: parse_date(&start)?,
                end: parse_date(&end)?,
                interval: every.parse::<RecurrenceInterval>()?,
                times: times
                    .iter()
                    .map(|t| parse_time_of_day(t))
                    .collect::<Result<Vec<_>>>()?,
            };
            let new_post = new_post(content, &targets, media, &meta, owner)?;
            let items = engine.schedule_recurring(new_post, &plan).await?;
            output_batch(format, &items)
        }
        Commands::Cancel { schedule_ids } => match schedule_ids.as_slice() {
            [schedule_id] => cmd_cancel(&engine, format, schedule_id).await,
            _ => output_batch(format, &engine.cancel_schedules(&schedule_ids).await),
        },
        Commands::Reschedule { schedule_id, time } => {
            cmd_reschedule(&engine, format, &schedule_id, &time).await
        }
        Commands::RescheduleMany { time, schedule_ids } => {
            let when = parse_time(&engine, &time).await?;
            output_batch(format, &engine.reschedule_many(&schedule_ids, when).await)
        }
        Commands::Posts { status, limit } => cmd_posts(&engine, format, status, limit).await,
        Commands::Now { post_id } => {
            let report = engine.publish_now(&post_id).await?;
            output_dispatch(format, &report)
        }
        Commands::Retry { post_id } => {
            let report = engine.retry_publish(&post_id).await?;
            output_dispatch(format, &report)
        }
        Commands::Status { post_id } => cmd_status(&engine, format, &post_id).await,
        Commands::List {
            status,
            post,
            within,
            limit,
        } => cmd_list(&engine, format, status, post, within, limit).await,
        Commands::Stats => cmd_stats(&engine, format).await,
        Commands::Breakers => cmd_breakers(&engine, format).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn cmd_create(
    engine: &ScheduleEngine,
    format: OutputFormat,
    content: Option<String>,
    targets: &[String],
    media: Vec<String>,
    meta: &[String],
    owner: String,
    at: Option<String>,
) -> Result<i32> {
    let post = engine
        .create_post(new_post(content, targets, media, meta, owner)?)
        .await?;

    let schedule = match at {
        Some(time) => {
            let when = parse_time(engine, &time).await?;
            Some(engine.create_schedule(&post.id, when).await?)
        }
        None => None,
    };

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "post": post,
            "schedule": schedule,
        }))?,
        OutputFormat::Text => {
            println!("{}", post.id);
            if let Some(schedule) = schedule {
                println!(
                    "Scheduled {} for {}",
                    schedule.id,
                    format_timestamp(schedule.scheduled_at)
                );
            }
        }
    }

    Ok(0)
}

/// Assemble a post from command-line content, targets and metadata
fn new_post(
    content: Option<String>,
    targets: &[String],
    media: Vec<String>,
    meta: &[String],
    owner: String,
) -> Result<NewPost> {
    let content = match content {
        Some(content) => content,
        None => read_stdin()?,
    };
    if content.trim().is_empty() && media.is_empty() {
        return Err(SocialcastError::InvalidInput(
            "Content cannot be empty without media".to_string(),
        ));
    }

    let mut accounts = targets
        .iter()
        .map(|t| parse_target(t))
        .collect::<Result<Vec<SocialAccount>>>()?;
    for entry in meta {
        let (platform, key, value) = parse_meta(entry)?;
        let account = accounts
            .iter_mut()
            .find(|a| a.platform.eq_ignore_ascii_case(platform))
            .ok_or_else(|| {
                SocialcastError::InvalidInput(format!(
                    "Metadata for '{}' but no target on that platform",
                    platform
                ))
            })?;
        account.metadata.insert(key.to_string(), value.to_string());
    }

    Ok(NewPost {
        owner_id: owner,
        content,
        media,
        targets: accounts.into_iter().map(Target::new).collect(),
    })
}

async fn cmd_schedule(
    engine: &ScheduleEngine,
    format: OutputFormat,
    post_id: &str,
    time: &str,
) -> Result<i32> {
    let when = parse_time(engine, time).await?;
    let schedule = engine.create_schedule(post_id, when).await?;

    match format {
        OutputFormat::Json => print_json(&schedule)?,
        OutputFormat::Text => println!(
            "{} {}",
            schedule.id,
            format_timestamp(schedule.scheduled_at)
        ),
    }
    Ok(0)
}

async fn cmd_cancel(engine: &ScheduleEngine, format: OutputFormat, schedule_id: &str) -> Result<i32> {
    if !engine.cancel_schedule(schedule_id).await? {
        let schedule = engine.get_schedule(schedule_id).await?;
        return Err(SocialcastError::InvalidState(format!(
            "Schedule {} is {} and can no longer be cancelled",
            schedule_id, schedule.status
        )));
    }

    match format {
        OutputFormat::Json => print_json(&engine.get_schedule(schedule_id).await?)?,
        OutputFormat::Text => println!("Cancelled schedule {}", schedule_id),
    }
    Ok(0)
}

async fn cmd_reschedule(
    engine: &ScheduleEngine,
    format: OutputFormat,
    schedule_id: &str,
    time: &str,
) -> Result<i32> {
    let when = parse_time(engine, time).await?;
    if !engine.reschedule(schedule_id, when).await? {
        let schedule = engine.get_schedule(schedule_id).await?;
        return Err(SocialcastError::InvalidState(format!(
            "Schedule {} is {} and can no longer be moved",
            schedule_id, schedule.status
        )));
    }

    let schedule = engine.get_schedule(schedule_id).await?;
    match format {
        OutputFormat::Json => print_json(&schedule)?,
        OutputFormat::Text => println!(
            "Rescheduled {} to {}",
            schedule.id,
            format_timestamp(schedule.scheduled_at)
        ),
    }
    Ok(0)
}

async fn cmd_status(engine: &ScheduleEngine, format: OutputFormat, post_id: &str) -> Result<i32> {
    let report = engine.get_post_report(post_id).await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => {
            println!("{} [{}]", report.post.id, report.post.status);
            println!("{}", truncate_content(&report.post.content, 60));
            for target in &report.targets {
                let detail = match target.state {
                    TargetState::Published => target
                        .url
                        .clone()
                        .or_else(|| target.platform_post_id.clone())
                        .unwrap_or_default(),
                    TargetState::Failed => format!(
                        "{} - {}",
                        target.error_message.as_deref().unwrap_or("unknown error"),
                        target.hint.as_deref().unwrap_or("")
                    ),
                    TargetState::Pending => String::new(),
                };
                println!(
                    "  {:<10} {:<10} {}",
                    target.platform,
                    state_label(target.state),
                    detail
                );
            }
            for schedule in &report.schedules {
                println!(
                    "  schedule {} {} {}",
                    schedule.id,
                    schedule.status,
                    format_timestamp(schedule.scheduled_at)
                );
            }
        }
    }
    Ok(0)
}

async fn cmd_list(
    engine: &ScheduleEngine,
    format: OutputFormat,
    status: Option<String>,
    post: Option<String>,
    within: Option<String>,
    limit: Option<u32>,
) -> Result<i32> {
    let mut schedules = match within {
        Some(within) => {
            let window = humantime::parse_duration(&within).map_err(|e| {
                SocialcastError::InvalidInput(format!("Invalid duration '{}': {}", within, e))
            })?;
            engine.upcoming(window).await?
        }
        None => {
            let status = status
                .map(|s| s.parse::<ScheduleStatus>())
                .transpose()
                .map_err(SocialcastError::InvalidInput)?;
            engine
                .list_schedules(&ScheduleFilter {
                    status,
                    post_id: post,
                    limit,
                })
                .await?
        }
    };
    if let Some(limit) = limit {
        schedules.truncate(limit as usize);
    }

    match format {
        OutputFormat::Json => print_json(&schedules)?,
        OutputFormat::Text => output_list_text(&schedules),
    }
    Ok(0)
}

async fn cmd_posts(
    engine: &ScheduleEngine,
    format: OutputFormat,
    status: Option<String>,
    limit: u32,
) -> Result<i32> {
    let status = status
        .map(|s| s.parse::<PostStatus>())
        .transpose()
        .map_err(SocialcastError::InvalidInput)?;
    let posts = engine.list_posts(status, limit).await?;

    match format {
        OutputFormat::Json => print_json(&posts)?,
        OutputFormat::Text => {
            for post in &posts {
                let platforms: Vec<&str> =
                    post.targets.iter().map(|t| t.platform.as_str()).collect();
                println!(
                    "{} | {} | {} | {}",
                    post.id,
                    post.status,
                    platforms.join(","),
                    truncate_content(&post.content, 40)
                );
            }
        }
    }
    Ok(0)
}

fn output_list_text(schedules: &[Schedule]) {
    let now = Utc::now().timestamp();
    for schedule in schedules {
        let when = if schedule.status.is_open() {
            format_time_until(now, schedule.scheduled_at)
        } else {
            format_timestamp(schedule.scheduled_at)
        };
        println!(
            "{} | {} | {} | {}",
            schedule.id, schedule.post_id, schedule.status, when
        );
    }
}

async fn cmd_stats(engine: &ScheduleEngine, format: OutputFormat) -> Result<i32> {
    let stats = engine.stats().await?;

    match format {
        OutputFormat::Json => print_json(&stats)?,
        OutputFormat::Text => {
            println!("Schedules:");
            for status in ScheduleStatus::ALL {
                let count = stats.schedules.get(status.as_str()).copied().unwrap_or(0);
                println!("  {:<11} {}", status.as_str(), count);
            }
            println!("Platforms:");
            for (platform, counts) in &stats.platforms {
                println!(
                    "  {:<11} {} published, {} failed ({:.0}% success)",
                    platform,
                    counts.published,
                    counts.failed,
                    counts.success_rate * 100.0
                );
            }
        }
    }
    Ok(0)
}

async fn cmd_breakers(engine: &ScheduleEngine, format: OutputFormat) -> Result<i32> {
    let states = engine.circuit_states().await?;

    match format {
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = states
                .iter()
                .map(|(key, snapshot)| {
                    serde_json::json!({
                        "key": key,
                        "state": snapshot.state,
                        "consecutive_failures": snapshot.consecutive_failures,
                        "last_failure_at": snapshot.last_failure_at,
                        "opened_at": snapshot.opened_at,
                    })
                })
                .collect();
            print_json(&json)?;
        }
        OutputFormat::Text => {
            for (key, snapshot) in &states {
                println!(
                    "{:<11} {:<9} {} consecutive failure(s)",
                    key,
                    snapshot.state.as_str(),
                    snapshot.consecutive_failures
                );
            }
        }
    }
    Ok(0)
}

/// Print a dispatch report; exit 1 unless every target is published
fn output_dispatch(format: OutputFormat, report: &DispatchReport) -> Result<i32> {
    match format {
        OutputFormat::Json => print_json(report)?,
        OutputFormat::Text => {
            for outcome in &report.targets {
                let line = match outcome {
                    TargetOutcome::Published { result } => format!(
                        "published {}",
                        result
                            .url
                            .as_deref()
                            .or(result.platform_post_id.as_deref())
                            .unwrap_or("")
                    ),
                    TargetOutcome::Failed { result } => format!(
                        "failed ({}): {}",
                        result.failure_class.map(|c| c.as_str()).unwrap_or("unknown"),
                        result.error_message.as_deref().unwrap_or("")
                    ),
                    TargetOutcome::AlreadyPublished { .. } => "already published".to_string(),
                    TargetOutcome::Error { message, .. } => format!("error: {}", message),
                };
                println!("{}: {}", outcome.platform(), line);
            }
            println!("Post {} is {}", report.post_id, report.status);
        }
    }

    Ok(if report.status == PostStatus::Published {
        0
    } else {
        1
    })
}

/// Print per-item batch results; exit 1 unless every item went through
fn output_batch(format: OutputFormat, items: &[BatchItem]) -> Result<i32> {
    match format {
        OutputFormat::Json => print_json(items)?,
        OutputFormat::Text => {
            for item in items {
                let detail = match (&item.schedule, &item.error) {
                    (_, Some(error)) => error.clone(),
                    (Some(schedule), None) => format!(
                        "{} {}",
                        schedule.id,
                        format_timestamp(schedule.scheduled_at)
                    ),
                    (None, None) => String::new(),
                };
                println!("{} {} {}", item.id, batch_label(item.status), detail);
            }
        }
    }

    let all_done = items
        .iter()
        .all(|i| !matches!(i.status, BatchStatus::Error | BatchStatus::Skipped));
    Ok(if all_done { 0 } else { 1 })
}

/// Parse a schedule time; `random:` offsets follow the latest open schedule
async fn parse_time(engine: &ScheduleEngine, input: &str) -> Result<DateTime<Utc>> {
    let last_scheduled = random_anchor(engine, input).await?;
    parse_schedule(input, last_scheduled)
}

/// Latest open schedule, for `random:` inputs only
async fn random_anchor(engine: &ScheduleEngine, input: &str) -> Result<Option<i64>> {
    if !input.trim_start().starts_with("random:") {
        return Ok(None);
    }
    Ok(engine
        .upcoming(Duration::from_secs(365 * 24 * 3600))
        .await?
        .iter()
        .map(|s| s.scheduled_at)
        .max())
}

fn parse_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").map_err(|_| {
        SocialcastError::InvalidInput(format!("Invalid date '{}'. Expected YYYY-MM-DD", input))
    })
}

fn parse_target(input: &str) -> Result<SocialAccount> {
    match input.split_once(':') {
        Some((platform, account)) if !platform.is_empty() && !account.is_empty() => {
            Ok(SocialAccount::new(account, platform))
        }
        _ => Err(SocialcastError::InvalidInput(format!(
            "Invalid target '{}'. Expected PLATFORM:ACCOUNT_ID",
            input
        ))),
    }
}

fn parse_meta(input: &str) -> Result<(&str, &str, &str)> {
    input
        .split_once(':')
        .and_then(|(platform, pair)| {
            pair.split_once('=')
                .map(|(key, value)| (platform, key, value))
        })
        .filter(|(platform, key, _)| !platform.is_empty() && !key.is_empty())
        .ok_or_else(|| {
            SocialcastError::InvalidInput(format!(
                "Invalid metadata '{}'. Expected PLATFORM:KEY=VALUE",
                input
            ))
        })
}

fn read_stdin() -> Result<String> {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Ok(String::new());
    }

    let mut content = String::new();
    stdin
        .read_to_string(&mut content)
        .map_err(|e| SocialcastError::InvalidInput(format!("Failed to read stdin: {}", e)))?;
    Ok(content.trim_end().to_string())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| SocialcastError::InvalidState(format!("Failed to encode output: {}", e)))?;
    println!("{}", json);
    Ok(())
}

fn state_label(state: TargetState) -> &'static str {
    match state {
        TargetState::Pending => "pending",
        TargetState::Published => "published",
        TargetState::Failed => "failed",
    }
}

fn batch_label(status: BatchStatus) -> &'static str {
    match status {
        BatchStatus::Scheduled => "scheduled",
        BatchStatus::Cancelled => "cancelled",
        BatchStatus::Rescheduled => "rescheduled",
        BatchStatus::Skipped => "skipped",
        BatchStatus::Error => "error",
    }
}

fn format_timestamp(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

/// Truncate content to max characters with ellipsis
fn truncate_content(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        content.to_string()
    } else {
        let truncated: String = content.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// Format time until scheduled time in human-readable format
fn format_time_until(now: i64, scheduled_at: i64) -> String {
    let diff = scheduled_at - now;

    if diff < 0 {
        return "overdue".to_string();
    }

    let minutes = diff / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("in {} day{}", days, if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("in {} hour{}", hours, if hours == 1 { "" } else { "s" })
    } else if minutes > 0 {
        format!("in {} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        "in <1 minute".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target() {
        let account = parse_target("twitter:acct-1").unwrap();
        assert_eq!(account.platform, "twitter");
        assert_eq!(account.id, "acct-1");

        assert!(parse_target("twitter").is_err());
        assert!(parse_target(":acct").is_err());
        assert!(parse_target("twitter:").is_err());
    }

    #[test]
    fn test_parse_meta() {
        assert_eq!(
            parse_meta("pinterest:board_id=42").unwrap(),
            ("pinterest", "board_id", "42")
        );
        assert_eq!(
            parse_meta("linkedin:author_urn=urn:li:organization:7").unwrap(),
            ("linkedin", "author_urn", "urn:li:organization:7")
        );
        assert!(parse_meta("pinterest:board_id").is_err());
        assert!(parse_meta("board_id=42").is_err());
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2026-03-02").unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
        );
        assert!(parse_date("03/02/2026").is_err());
    }

    #[test]
    fn test_truncate_content_counts_chars() {
        assert_eq!(truncate_content("short", 10), "short");
        assert_eq!(truncate_content("héllo wörld", 5), "héllo...");
    }

    #[test]
    fn test_format_time_until() {
        assert_eq!(format_time_until(0, -5), "overdue");
        assert_eq!(format_time_until(0, 30), "in <1 minute");
        assert_eq!(format_time_until(0, 120), "in 2 minutes");
        assert_eq!(format_time_until(0, 3600), "in 1 hour");
        assert_eq!(format_time_until(0, 3 * 86400), "in 3 days");
    }
}
