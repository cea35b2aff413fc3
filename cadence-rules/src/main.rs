//! cadence-rules - Manage auto-reply rules and stop words
//!
//! Rules map a keyword to a reply template for one platform. Stop words
//! veto every rule for comments that contain them. `cadence-rules test`
//! shows what a comment would trigger without sending anything.

use std::sync::Arc;

use chrono::DateTime;
use clap::{Parser, Subcommand};
use libcadence::cooldown::CooldownTracker;
use libcadence::logging::LoggingConfig;
use libcadence::matcher::RuleMatcher;
use libcadence::service::rules::{NewRule, RuleService, RuleUpdate};
use libcadence::{
    AutoReplyRule, CadenceError, Clock, Config, Database, MatchResult, Platform, Result, StopWord,
    SystemClock,
};

#[derive(Parser, Debug)]
#[command(name = "cadence-rules")]
#[command(version)]
#[command(about = "Manage auto-reply rules and stop words")]
#[command(long_about = "\
cadence-rules - Manage auto-reply rules and stop words

DESCRIPTION:
    An auto-reply rule answers comments containing its keyword (case
    insensitive) on one platform. When several rules match, the longest
    keyword wins. A comment containing any stop word gets no reply, and an
    author who was replied to recently is skipped until the cooldown
    window has passed.

    Templates may use {author}, {keyword} and {platform}.

USAGE EXAMPLES:
    # Reply to pricing questions on LinkedIn
    cadence-rules add --platform linkedin --keyword pricing \\
        --reply \"Hi {author}, pricing is on our website.\"

    # Never auto-reply to comments mentioning refunds
    cadence-rules stopword add --platform linkedin refund

    # See what a comment would trigger
    cadence-rules test --platform linkedin --author @bob \"what's the pricing?\"

CONFIGURATION:
    Configuration file: ~/.config/cadence/config.toml

    Override with environment variables:
        CADENCE_CONFIG    - Path to config file
        CADENCE_DB_PATH   - Path to database file
        CADENCE_USER      - User to act as

EXIT CODES:
    0 - Success
    2 - Database or configuration error
    3 - Invalid input or unknown rule
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
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add a rule
    Add {
        #[arg(short, long)]
        platform: String,

        /// Text to look for in comments
        #[arg(short, long)]
        keyword: String,

        /// Reply template
        #[arg(short, long)]
        reply: String,

        /// Create the rule disabled
        #[arg(long)]
        disabled: bool,
    },

    /// Change a rule
    Update {
        rule_id: String,

        #[arg(short, long)]
        keyword: Option<String>,

        #[arg(short, long)]
        reply: Option<String>,

        #[arg(long, conflicts_with = "disable")]
        enable: bool,

        #[arg(long)]
        disable: bool,
    },

    /// Delete a rule
    Delete { rule_id: String },

    /// List rules
    List {
        #[arg(short, long)]
        platform: Option<String>,
    },

    /// Manage stop words
    #[command(subcommand)]
    Stopword(StopwordCommands),

    /// Show what a comment would trigger, without replying
    Test {
        /// Comment text
        text: String,

        #[arg(short, long)]
        platform: String,

        /// Comment author handle
        #[arg(short, long, default_value = "someone")]
        author: String,
    },
}

#[derive(Subcommand, Debug)]
enum StopwordCommands {
    /// Add a stop word
    Add {
        word: String,

        #[arg(short, long)]
        platform: String,
    },

    /// Remove a stop word
    Remove {
        word: String,

        #[arg(short, long)]
        platform: String,
    },

    /// List stop words
    List {
        #[arg(short, long)]
        platform: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env("error", cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::new(&config.database_path()).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let rules = RuleService::new(db.clone(), clock.clone());

    let user = cli.user.unwrap_or_else(|| config.defaults.user_id.clone());
    let json = cli.format == "json";
    tracing::debug!(user = %user, "Managing rules");

    match cli.command {
        Commands::Add {
            platform,
            keyword,
            reply,
            disabled,
        } => {
            let rule = rules
                .create_rule(NewRule {
                    user_id: user,
                    platform: platform.parse()?,
                    keyword,
                    reply_template: reply,
                    is_active: !disabled,
                })
                .await?;
            if json {
                print_json(&rule)?;
            } else {
                println!("{}", rule.id);
            }
        }
        Commands::Update {
            rule_id,
            keyword,
            reply,
            enable,
            disable,
        } => {
            let is_active = match (enable, disable) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let rule = rules
                .update_rule(
                    &user,
                    &rule_id,
                    RuleUpdate {
                        keyword,
                        reply_template: reply,
                        is_active,
                    },
                )
                .await?;
            output_rules(&[rule], json)?;
        }
        Commands::Delete { rule_id } => {
            rules.delete_rule(&user, &rule_id).await?;
            if json {
                print_json(&serde_json::json!({"id": rule_id, "deleted": true}))?;
            } else {
                println!("Deleted {}", rule_id);
            }
        }
        Commands::List { platform } => {
            let platform = parse_platform_filter(platform.as_deref())?;
            let list = rules.list_rules(&user, platform).await?;
            output_rules(&list, json)?;
        }
        Commands::Stopword(StopwordCommands::Add { word, platform }) => {
            let stop_word = rules.add_stop_word(&user, platform.parse()?, &word).await?;
            output_stop_words(&[stop_word], json)?;
        }
        Commands::Stopword(StopwordCommands::Remove { word, platform }) => {
            rules
                .remove_stop_word(&user, platform.parse()?, &word)
                .await?;
            if json {
                print_json(&serde_json::json!({"word": word, "removed": true}))?;
            } else {
                println!("Removed '{}'", word.trim());
            }
        }
        Commands::Stopword(StopwordCommands::List { platform }) => {
            let platform = parse_platform_filter(platform.as_deref())?;
            let words = rules.list_stop_words(&user, platform).await?;
            output_stop_words(&words, json)?;
        }
        Commands::Test {
            text,
            platform,
            author,
        } => {
            // A fresh tracker: dry runs never see or leave cooldowns
            let matcher = RuleMatcher::new(
                db,
                Arc::new(CooldownTracker::new(config.auto_reply.cooldown_secs)),
            );
            let result = matcher
                .evaluate(&user, platform.parse()?, &text, &author, clock.now())
                .await?;
            output_match(&result, json)?;
        }
    }

    Ok(())
}

fn parse_platform_filter(platform: Option<&str>) -> Result<Option<Platform>> {
    platform.map(str::parse::<Platform>).transpose()
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CadenceError::Validation(format!("Failed to encode output: {}", e)))?;
    println!("{}", text);
    Ok(())
}

fn output_rules(rules: &[AutoReplyRule], json: bool) -> Result<()> {
    if json {
        return print_json(rules);
    }

    for rule in rules {
        println!(
            "{} | {} | {} | {} | {}",
            rule.id,
            rule.platform,
            if rule.is_active { "active" } else { "disabled" },
            rule.keyword,
            rule.reply_template
        );
    }
    Ok(())
}

fn output_stop_words(words: &[StopWord], json: bool) -> Result<()> {
    if json {
        return print_json(words);
    }

    for word in words {
        let added = DateTime::from_timestamp(word.created_at, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!("{} | {} | {}", word.platform, word.word, added);
    }
    Ok(())
}

fn output_match(result: &MatchResult, json: bool) -> Result<()> {
    let value = match result {
        MatchResult::Suppressed { word } => serde_json::json!({
            "outcome": result.label(),
            "stop_word": word,
        }),
        MatchResult::NoMatch => serde_json::json!({"outcome": result.label()}),
        MatchResult::Cooldown {
            rule_id,
            remaining_secs,
        } => serde_json::json!({
            "outcome": result.label(),
            "rule_id": rule_id,
            "remaining_secs": remaining_secs,
        }),
        MatchResult::Fire(fired) => serde_json::json!({
            "outcome": result.label(),
            "rule_id": fired.rule.id,
            "keyword": fired.rule.keyword,
            "reply": fired.reply,
        }),
    };

    if json {
        return print_json(&value);
    }

    match result {
        MatchResult::Suppressed { word } => println!("suppressed by stop word '{}'", word),
        MatchResult::NoMatch => println!("no rule matches"),
        MatchResult::Cooldown { remaining_secs, .. } => {
            println!("author in cooldown for {}s", remaining_secs)
        }
        MatchResult::Fire(fired) => {
            println!("rule {} (keyword '{}') would reply:", fired.rule.id, fired.rule.keyword);
            println!("{}", fired.reply);
        }
    }
    Ok(())
}
