//! cadence-queue - Create, schedule and manage posts
//!
//! Unix-style tool over the post lifecycle: every subcommand maps to one
//! lifecycle operation, prints the result to stdout, and reports errors on
//! stderr with a meaningful exit code.

use std::io::Read;
use std::sync::Arc;

use chrono::DateTime;
use clap::{Parser, Subcommand};
use libcadence::db::PostFilter;
use libcadence::logging::LoggingConfig;
use libcadence::scheduling::parse_timezone;
use libcadence::service::posts::{NewPost, PostService, PostStats};
use libcadence::types::ActivityEntry;
use libcadence::{CadenceError, Config, Database, MediaKind, Platform, Post, PostStatus, Result, SystemClock};

#[derive(Parser, Debug)]
#[command(name = "cadence-queue")]
#[command(version)]
#[command(about = "Create, schedule and manage posts")]
#[command(long_about = "\
cadence-queue - Create, schedule and manage posts

DESCRIPTION:
    cadence-queue manages the posts that cadence-send publishes. A post is
    a draft until it is scheduled; queued posts are published once their
    time arrives. Failed posts stay failed until retried.

COMMANDS:
    create      Create a draft or queued post
    list        List posts
    show        Show one post
    schedule    Queue a draft, or move a queued post to a new time
    unschedule  Take a queued post back to draft
    cancel      Cancel a draft or queued post
    retry       Queue a failed post again
    edit        Replace the content of a draft or queued post
    delete      Delete a draft, cancelled or failed post
    stats       Show post counts per status
    log         Show recent activity

USAGE EXAMPLES:
    # Queue a post for tomorrow morning (in the configured timezone)
    cadence-queue create --platform linkedin --at \"tomorrow 9am\" \"Big news!\"

    # Save a draft from stdin
    echo \"Thoughts on Rust\" | cadence-queue create --platform threads --draft

    # Schedule it two hours from now
    cadence-queue schedule <POST_ID> 2h

    # List failed posts as JSON
    cadence-queue list --status failed --format json

SCHEDULE FORMATS:
    RFC 3339:       2025-11-20T15:00:00+07:00
    Wall clock:     \"2025-11-20 15:00\" (in --timezone or the default)
    Relative:       30m, 2h, 1d
    Natural:        \"tomorrow 3pm\", \"next monday 10am\"

CONFIGURATION:
    Configuration file: ~/.config/cadence/config.toml
    Database location: ~/.local/share/cadence/cadence.db

    Override with environment variables:
        CADENCE_CONFIG    - Path to config file
        CADENCE_DB_PATH   - Path to database file
        CADENCE_USER      - User to act as

EXIT CODES:
    0 - Success
    1 - Operation not allowed in the post's current state
    2 - Database or configuration error
    3 - Invalid input or unknown post
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// User to act as (default: defaults.user_id from config)
    #[arg(short, long, global = true, env = "CADENCE_USER")]
    user: Option<String>,

    /// Output format: text or json
    #[arg(short, long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    #[arg(help = "Enable verbose logging to stderr (useful for debugging)")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a post (content from the argument or stdin)
    Create {
        /// Post content; read from stdin when omitted
        content: Option<String>,

        /// Target platform: linkedin or threads
        #[arg(short, long)]
        platform: String,

        /// When to publish (default: as soon as possible)
        #[arg(long, value_name = "TIME")]
        at: Option<String>,

        /// IANA timezone for wall-clock times (default: from config)
        #[arg(long)]
        timezone: Option<String>,

        /// Save as draft instead of queueing
        #[arg(long)]
        draft: bool,

        /// Media type: text, image or video
        #[arg(long, default_value = "text")]
        media_type: String,

        /// Path or URL of the attached media
        #[arg(long)]
        media_path: Option<String>,
    },

    /// List posts, newest first
    List {
        /// Only posts with this status
        #[arg(long)]
        status: Option<String>,

        /// Only posts for this platform
        #[arg(short, long)]
        platform: Option<String>,

        /// Maximum number of posts to show
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Show one post
    Show { post_id: String },

    /// Queue a draft, or move a queued post to a new time
    Schedule {
        post_id: String,

        /// New schedule time (e.g., "tomorrow 3pm", "2h")
        time: String,

        /// IANA timezone for wall-clock times (default: the post's)
        #[arg(long)]
        timezone: Option<String>,
    },

    /// Take a queued post back to draft
    Unschedule { post_id: String },

    /// Cancel a draft or queued post
    Cancel { post_id: String },

    /// Queue a failed post again at its original time
    Retry { post_id: String },

    /// Replace the content of a draft or queued post
    Edit { post_id: String, content: String },

    /// Delete a draft, cancelled or failed post
    Delete { post_id: String },

    /// Show post counts per status
    Stats,

    /// Show recent activity
    Log {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env("error", cli.verbose).init();

    // Run the main logic and handle errors
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::new(&config.database_path()).await?;
    let posts = PostService::new(db.clone(), Arc::new(SystemClock), &config.defaults.timezone);

    let user = cli.user.unwrap_or_else(|| config.defaults.user_id.clone());
    let json = cli.format == "json";
    tracing::debug!(user = %user, db = %config.database_path(), "Managing posts");

    match cli.command {
        Commands::Create {
            content,
            platform,
            at,
            timezone,
            draft,
            media_type,
            media_path,
        } => {
            let content = match content {
                Some(content) => content,
                None => read_stdin()?,
            };
            let request = NewPost {
                user_id: user,
                platform: platform.parse()?,
                content,
                media_kind: media_type.parse::<MediaKind>()?,
                media_path,
                scheduled_at: at,
                timezone,
                draft,
            };
            let post = posts.create(request).await?;
            if json {
                print_json(&post)?;
            } else {
                println!("{}", post.id);
            }
        }
        Commands::List {
            status,
            platform,
            limit,
        } => {
            let filter = PostFilter {
                status: status.as_deref().map(str::parse::<PostStatus>).transpose()?,
                platform: platform.as_deref().map(str::parse::<Platform>).transpose()?,
                limit,
            };
            let list = posts.list(&user, &filter).await?;
            if json {
                print_json(&list)?;
            } else {
                for post in &list {
                    println!("{}", summary_line(post));
                }
            }
        }
        Commands::Show { post_id } => {
            let post = posts.get(&user, &post_id).await?;
            output_post(&post, json)?;
        }
        Commands::Schedule {
            post_id,
            time,
            timezone,
        } => {
            let post = posts
                .schedule(&user, &post_id, &time, timezone.as_deref())
                .await?;
            output_post(&post, json)?;
        }
        Commands::Unschedule { post_id } => {
            let post = posts.unschedule(&user, &post_id).await?;
            output_post(&post, json)?;
        }
        Commands::Cancel { post_id } => {
            let post = posts.cancel(&user, &post_id).await?;
            output_post(&post, json)?;
        }
        Commands::Retry { post_id } => {
            let post = posts.retry(&user, &post_id).await?;
            output_post(&post, json)?;
        }
        Commands::Edit { post_id, content } => {
            let post = posts.edit_content(&user, &post_id, &content).await?;
            output_post(&post, json)?;
        }
        Commands::Delete { post_id } => {
            posts.delete(&user, &post_id).await?;
            if json {
                print_json(&serde_json::json!({"id": post_id, "deleted": true}))?;
            } else {
                println!("Deleted {}", post_id);
            }
        }
        Commands::Stats => {
            let stats = posts.stats(&user).await?;
            if json {
                print_json(&stats)?;
            } else {
                output_stats_text(&stats);
            }
        }
        Commands::Log { limit } => {
            let entries = db.recent_activity(&user, limit).await?;
            if json {
                print_json(&entries)?;
            } else {
                for entry in &entries {
                    println!("{}", activity_line(entry));
                }
            }
        }
    }

    Ok(())
}

fn read_stdin() -> Result<String> {
    let mut content = String::new();
    std::io::stdin()
        .read_to_string(&mut content)
        .map_err(|e| CadenceError::Validation(format!("Failed to read content from stdin: {}", e)))?;
    Ok(content.trim_end_matches('\n').to_string())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CadenceError::Validation(format!("Failed to encode output: {}", e)))?;
    println!("{}", text);
    Ok(())
}

fn output_post(post: &Post, json: bool) -> Result<()> {
    if json {
        return print_json(post);
    }

    println!("id:           {}", post.id);
    println!("platform:     {}", post.platform);
    println!("status:       {}", post.status);
    println!("scheduled:    {}", format_local(post.scheduled_at, &post.timezone));
    println!("timezone:     {}", post.timezone);
    println!("media:        {}", post.media_kind);
    if let Some(path) = &post.media_path {
        println!("media path:   {}", path);
    }
    if let Some(permalink) = &post.permalink {
        println!("permalink:    {}", permalink);
    }
    if let Some(error) = &post.error_message {
        println!("error:        {}", error);
    }
    println!();
    println!("{}", post.content);
    Ok(())
}

fn output_stats_text(stats: &PostStats) {
    println!("draft:     {}", stats.draft);
    println!("queued:    {}", stats.queued);
    println!("posted:    {}", stats.posted);
    println!("failed:    {}", stats.failed);
    println!("cancelled: {}", stats.cancelled);
    println!("total:     {}", stats.total);
}

/// One line per post: id, platform, status, local schedule, content preview
fn summary_line(post: &Post) -> String {
    format!(
        "{} | {} | {} | {} | {}",
        post.id,
        post.platform,
        post.status,
        format_local(post.scheduled_at, &post.timezone),
        truncate_content(&post.content, 50)
    )
}

fn activity_line(entry: &ActivityEntry) -> String {
    let when = DateTime::from_timestamp(entry.created_at, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| entry.created_at.to_string());
    let entity = match (&entry.entity_type, &entry.entity_id) {
        (Some(kind), Some(id)) => format!(" {}:{}", kind, id),
        _ => String::new(),
    };
    format!("{} {:5} {}{}", when, entry.level, entry.action, entity)
}

/// Render a timestamp in the post's own timezone
fn format_local(timestamp: i64, timezone: &str) -> String {
    let Some(utc) = DateTime::from_timestamp(timestamp, 0) else {
        return timestamp.to_string();
    };
    match parse_timezone(timezone) {
        Ok(tz) => utc.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z").to_string(),
        Err(_) => utc.format("%Y-%m-%d %H:%M UTC").to_string(),
    }
}

/// Truncate content to `max_chars` characters with ellipsis
fn truncate_content(content: &str, max_chars: usize) -> String {
    let single_line = content.replace('\n', " ");
    if single_line.chars().count() <= max_chars {
        single_line
    } else {
        let head: String = single_line.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_content_counts_chars() {
        assert_eq!(truncate_content("short", 10), "short");
        assert_eq!(truncate_content("héllo wörld", 5), "héllo...");
        assert_eq!(truncate_content("two\nlines", 20), "two lines");
    }

    #[test]
    fn test_format_local_uses_post_timezone() {
        // 2025-06-15T02:00:00Z
        assert_eq!(format_local(1_749_952_800, "Asia/Jakarta"), "2025-06-15 09:00 WIB");
        assert_eq!(format_local(1_749_952_800, "UTC"), "2025-06-15 02:00 UTC");
    }
}
