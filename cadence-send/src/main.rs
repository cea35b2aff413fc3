//! cadence-send - Background daemon for scheduled posting and auto-replies
//!
//! Publishes queued posts when they become due and answers matching
//! comments, until told to stop.

use anyhow::Context;
use clap::Parser;
use libcadence::logging::LoggingConfig;
use libcadence::scheduler::run_until_shutdown;
use libcadence::service::events::EventReceiver;
use libcadence::{CadenceError, CadenceService, Config};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "cadence-send")]
#[command(version)]
#[command(about = "Background daemon for scheduled posting and auto-replies")]
#[command(long_about = "\
cadence-send - Background daemon for scheduled posting and auto-replies

DESCRIPTION:
    cadence-send is a long-running daemon with two loops:

    - the dispatch loop publishes queued posts whose scheduled time has
      arrived, respecting per-platform hourly post limits
    - the reply loop polls new comments and sends keyword auto-replies,
      respecting stop words, per-author cooldowns and hourly reply limits

    Failed posts are marked failed and are never retried automatically;
    use `cadence-queue retry` to queue them again.

USAGE:
    # Run in foreground (logs to stderr)
    cadence-send

    # Check for due posts every 30 seconds
    cadence-send --poll-interval 30

    # Publish posts only
    cadence-send --no-replies

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current cycle)

CONFIGURATION:
    Configuration file: ~/.config/cadence/config.toml
    Database location: ~/.local/share/cadence/cadence.db

    [scheduling]
    poll_interval = 60      # seconds between dispatch cycles
    publish_timeout = 30    # seconds before a publish call fails
    max_concurrency = 4

    [scheduling.rate_limits.linkedin]
    posts_per_hour = 10
    replies_per_hour = 30

    [auto_reply]
    enabled = true
    cooldown_secs = 60
    poll_interval = 60

    [publisher]
    endpoint = \"https://gateway.example/v1\"
    token_file = \"~/.config/cadence/gateway.token\"

    Override with environment variables:
        CADENCE_CONFIG      - Path to config file
        CADENCE_DB_PATH     - Path to database file
        CADENCE_LOG_FORMAT  - text, json or pretty
        CADENCE_LOG_LEVEL   - error, warn, info, debug or trace

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration or database error
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    #[arg(help = "How often to check for due posts (default: 60)")]
    poll_interval: Option<u64>,

    /// Disable the auto-reply loop
    #[arg(long)]
    no_replies: bool,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    #[arg(help = "Enable verbose logging (useful for debugging)")]
    verbose: bool,

    /// Run once and exit (for testing)
    #[arg(long, hide = true)]
    #[arg(help = "Run one dispatch cycle and one reply poll, print the reports, and exit")]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env("info", cli.verbose).init();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<CadenceError>()
            .map(CadenceError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    let replies_enabled = config.auto_reply.enabled && !cli.no_replies;
    let poll_interval = cli
        .poll_interval
        .unwrap_or(config.scheduling.poll_interval)
        .max(1);
    let reply_interval = config.auto_reply.poll_interval;

    let service = CadenceService::from_config(config).await?;
    if service.config().publisher.is_none() {
        warn!("No [publisher] configured: due posts will stay queued");
    }

    info!("cadence-send daemon starting");
    tokio::spawn(log_events(service.subscribe()));

    if cli.once {
        run_once(&service, replies_enabled).await?;
        info!("cadence-send: processed once, exiting");
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone()).context("installing signal handlers")?;

    info!("Poll interval: {}s", poll_interval);
    let dispatch_loop = run_until_shutdown(Duration::from_secs(poll_interval), &shutdown, || {
        let dispatcher = service.dispatcher();
        async move {
            if let Err(e) = dispatcher.run_cycle().await {
                error!("Error dispatching posts: {}", e);
            }
        }
    });

    if replies_enabled {
        info!("Auto-reply poll interval: {}s", reply_interval);
        let reply_loop = run_until_shutdown(Duration::from_secs(reply_interval), &shutdown, || {
            let responder = service.responder();
            async move {
                if let Err(e) = responder.poll_all().await {
                    error!("Error polling comments: {}", e);
                }
            }
        });
        tokio::join!(dispatch_loop, reply_loop);
    } else {
        info!("Auto-replies disabled");
        dispatch_loop.await;
    }

    info!("cadence-send daemon stopped");
    Ok(())
}

/// One dispatch cycle and one reply poll; reports go to stdout as JSON
async fn run_once(service: &CadenceService, replies_enabled: bool) -> anyhow::Result<()> {
    let dispatch = service.dispatcher().run_cycle().await?;
    let replies = if replies_enabled {
        Some(service.responder().poll_all().await?)
    } else {
        None
    };

    let report = serde_json::json!({
        "dispatch": dispatch,
        "replies": replies,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Mirror outcome events into the debug log
async fn log_events(mut events: EventReceiver) {
    use tokio::sync::broadcast::error::RecvError;

    loop {
        match events.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => debug!(event = %json, "Outcome event"),
                Err(e) => warn!("Unserializable event: {}", e),
            },
            Err(RecvError::Lagged(missed)) => warn!("Event log fell behind, {} events dropped", missed),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> std::io::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!(signal = sig, "Received shutdown signal, stopping gracefully...");
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> std::io::Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, stopping gracefully...");
            shutdown.store(true, Ordering::Relaxed);
        }
    });
    Ok(())
}
