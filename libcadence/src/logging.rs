//! Logging setup shared by the Cadence binaries
//!
//! Diagnostics always go to stderr so command output on stdout stays
//! parseable. Format and level come from `CADENCE_LOG_FORMAT` and
//! `CADENCE_LOG_LEVEL`; `RUST_LOG`, when set, overrides the level with a
//! full filter directive.
//!
//! ```no_run
//! use libcadence::logging::{LogFormat, LoggingConfig};
//!
//! // Daemon under a supervisor: one JSON object per line
//! LoggingConfig::new(LogFormat::Json, "info", false).init();
//! ```

use std::fmt;
use std::str::FromStr;

use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Plain lines without colors
    Text,
    /// One JSON object per event
    Json,
    /// Multi-line colored output for development
    Pretty,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [LogFormat::Text, LogFormat::Json, LogFormat::Pretty]
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown log format '{}' (expected text, json or pretty)", s))
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
    /// Lowers the default level to `debug`
    pub verbose: bool,
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: &str, verbose: bool) -> Self {
        Self {
            format,
            level: level.to_string(),
            verbose,
        }
    }

    /// Build from `CADENCE_LOG_FORMAT` / `CADENCE_LOG_LEVEL`
    ///
    /// `default_level` applies when the level variable is unset; command
    /// tools pass "error" so stdout stays clean, the daemon passes "info".
    /// An unrecognized format falls back to text.
    pub fn from_env(default_level: &str, verbose: bool) -> Self {
        let format = std::env::var("CADENCE_LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(LogFormat::Text);
        let level =
            std::env::var("CADENCE_LOG_LEVEL").unwrap_or_else(|_| default_level.to_string());

        Self::new(format, &level, verbose)
    }

    /// Level directive used when `RUST_LOG` is unset
    pub fn effective_level(&self) -> &str {
        if self.verbose {
            "debug"
        } else {
            &self.level
        }
    }

    /// Install the global subscriber
    ///
    /// Must run once, before any other subscriber is set.
    pub fn init(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.effective_level()));
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr);

        match self.format {
            LogFormat::Text => builder.with_ansi(false).with_target(false).init(),
            LogFormat::Json => builder
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_file(true)
                .with_line_number(true)
                .init(),
            LogFormat::Pretty => builder.pretty().with_file(true).with_line_number(true).init(),
        }
    }
}
