//! Configuration management for Cadence

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::types::{Platform, DEFAULT_TIMEZONE};

/// Recognized per-platform posting limits (posts per hour)
pub const POSTS_PER_HOUR_CHOICES: [u32; 4] = [5, 10, 20, 50];

/// Recognized per-platform auto-reply limits (replies per hour)
pub const REPLIES_PER_HOUR_CHOICES: [u32; 4] = [10, 30, 60, 100];

/// Recognized auto-reply cooldown windows in seconds
pub const COOLDOWN_CHOICES: [u64; 4] = [30, 60, 120, 300];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub auto_reply: AutoReplyConfig,
    #[serde(default)]
    pub publisher: Option<PublisherConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/cadence/cadence.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// User the command-line tools act as when `--user` is not given
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            timezone: default_timezone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Seconds between dispatch cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Upper bound on a single publish call, in seconds
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout: u64,
    /// Number of (user, platform) pairs dispatched in parallel
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Per-platform limits keyed by platform name
    #[serde(default)]
    pub rate_limits: BTreeMap<String, PlatformLimits>,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            publish_timeout: default_publish_timeout(),
            max_concurrency: default_max_concurrency(),
            rate_limits: BTreeMap::new(),
        }
    }
}

impl SchedulingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout)
    }

    /// Limits for a platform, falling back to defaults when not configured
    pub fn limits_for(&self, platform: Platform) -> PlatformLimits {
        self.rate_limits
            .get(platform.as_str())
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformLimits {
    #[serde(default = "default_posts_per_hour")]
    pub posts_per_hour: u32,
    #[serde(default = "default_replies_per_hour")]
    pub replies_per_hour: u32,
}

impl Default for PlatformLimits {
    fn default() -> Self {
        Self {
            posts_per_hour: default_posts_per_hour(),
            replies_per_hour: default_replies_per_hour(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoReplyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Minimum seconds between replies to the same author
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    /// Seconds between comment polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

impl Default for AutoReplyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_secs: default_cooldown(),
            poll_interval: default_poll_interval(),
        }
    }
}

/// Relay gateway that owns platform credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    pub endpoint: String,
    /// File holding the bearer token for the gateway
    #[serde(default)]
    pub token_file: Option<String>,
    /// Platforms routed through the gateway (all when empty)
    #[serde(default)]
    pub platforms: Vec<String>,
}

fn default_user_id() -> String {
    "local".to_string()
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn default_poll_interval() -> u64 {
    60
}

fn default_publish_timeout() -> u64 {
    30
}

fn default_max_concurrency() -> usize {
    4
}

fn default_posts_per_hour() -> u32 {
    10
}

fn default_replies_per_hour() -> u32 {
    30
}

fn default_cooldown() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file yields the built-in defaults. `CADENCE_DB_PATH`
    /// overrides the database path either way.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        let mut config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            tracing::debug!("No config at {}, using defaults", config_path.display());
            Self::default()
        };

        if let Ok(db_path) = std::env::var("CADENCE_DB_PATH") {
            config.database.path = db_path;
        }

        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values outside the recognized option sets
    pub fn validate(&self) -> Result<()> {
        if self.scheduling.poll_interval == 0 {
            return Err(invalid("scheduling.poll_interval", "must be greater than 0"));
        }
        if self.scheduling.publish_timeout == 0 {
            return Err(invalid("scheduling.publish_timeout", "must be greater than 0"));
        }
        if self.scheduling.max_concurrency == 0 {
            return Err(invalid("scheduling.max_concurrency", "must be greater than 0"));
        }
        if self.auto_reply.poll_interval == 0 {
            return Err(invalid("auto_reply.poll_interval", "must be greater than 0"));
        }

        for (name, limits) in &self.scheduling.rate_limits {
            if name.parse::<Platform>().is_err() {
                return Err(invalid(
                    &format!("scheduling.rate_limits.{}", name),
                    "unknown platform",
                ));
            }
            if !POSTS_PER_HOUR_CHOICES.contains(&limits.posts_per_hour) {
                return Err(invalid(
                    &format!("scheduling.rate_limits.{}.posts_per_hour", name),
                    &format!(
                        "must be one of {} (got {})",
                        join(&POSTS_PER_HOUR_CHOICES),
                        limits.posts_per_hour
                    ),
                ));
            }
            if !REPLIES_PER_HOUR_CHOICES.contains(&limits.replies_per_hour) {
                return Err(invalid(
                    &format!("scheduling.rate_limits.{}.replies_per_hour", name),
                    &format!(
                        "must be one of {} (got {})",
                        join(&REPLIES_PER_HOUR_CHOICES),
                        limits.replies_per_hour
                    ),
                ));
            }
        }

        if !COOLDOWN_CHOICES.contains(&self.auto_reply.cooldown_secs) {
            return Err(invalid(
                "auto_reply.cooldown_secs",
                &format!(
                    "must be one of {} (got {})",
                    join(&COOLDOWN_CHOICES),
                    self.auto_reply.cooldown_secs
                ),
            ));
        }

        if self.defaults.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(invalid("defaults.timezone", "unknown IANA timezone"));
        }

        if let Some(publisher) = &self.publisher {
            if publisher.endpoint.trim().is_empty() {
                return Err(ConfigError::MissingField("publisher.endpoint".to_string()).into());
            }
            for name in &publisher.platforms {
                if name.parse::<Platform>().is_err() {
                    return Err(invalid("publisher.platforms", &format!("unknown platform '{}'", name)));
                }
            }
        }

        Ok(())
    }

    /// Database path with `~` expanded
    pub fn database_path(&self) -> String {
        shellexpand::tilde(&self.database.path).to_string()
    }
}

fn invalid(field: &str, message: &str) -> crate::error::CadenceError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CADENCE_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("cadence").join("config.toml"))
}

/// Resolve the data directory path following XDG Base Directory spec
pub fn resolve_data_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("cadence"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CadenceError;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();

        assert_eq!(config.scheduling.poll_interval, 60);
        assert_eq!(config.scheduling.publish_timeout, 30);
        assert_eq!(config.auto_reply.cooldown_secs, 60);
        assert_eq!(config.defaults.user_id, "local");
        assert_eq!(config.defaults.timezone, "Asia/Jakarta");
        assert!(config.publisher.is_none());
        assert_eq!(
            config.scheduling.limits_for(Platform::LinkedIn),
            PlatformLimits::default()
        );
    }

    #[test]
    fn test_parses_full_config() {
        let config = Config::parse(
            r#"
[database]
path = "/tmp/cadence.db"

[defaults]
user_id = "alice"
timezone = "Europe/Berlin"

[scheduling]
poll_interval = 15
publish_timeout = 10
max_concurrency = 2

[scheduling.rate_limits.linkedin]
posts_per_hour = 5
replies_per_hour = 100

[auto_reply]
cooldown_secs = 300

[publisher]
endpoint = "http://localhost:9000"
platforms = ["threads"]
"#,
        )
        .unwrap();

        assert_eq!(config.database.path, "/tmp/cadence.db");
        assert_eq!(config.defaults.user_id, "alice");
        assert_eq!(config.scheduling.poll_interval(), Duration::from_secs(15));
        assert_eq!(config.scheduling.max_concurrency, 2);
        let linkedin = config.scheduling.limits_for(Platform::LinkedIn);
        assert_eq!(linkedin.posts_per_hour, 5);
        assert_eq!(linkedin.replies_per_hour, 100);
        // Threads falls back to defaults
        assert_eq!(config.scheduling.limits_for(Platform::Threads).posts_per_hour, 10);
        assert_eq!(config.auto_reply.cooldown_secs, 300);
        assert_eq!(config.publisher.unwrap().platforms, vec!["threads"]);
    }

    #[test]
    fn test_rejects_unrecognized_posts_per_hour() {
        let err = Config::parse(
            r#"
[scheduling.rate_limits.linkedin]
posts_per_hour = 7
"#,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            CadenceError::Config(ConfigError::InvalidValue { .. })
        ));
        assert!(err.to_string().contains("posts_per_hour"));
        assert!(err.to_string().contains("5, 10, 20, 50"));
    }

    #[test]
    fn test_rejects_unrecognized_replies_per_hour() {
        let err = Config::parse(
            r#"
[scheduling.rate_limits.threads]
replies_per_hour = 25
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("replies_per_hour"));
    }

    #[test]
    fn test_rejects_unknown_platform_in_limits() {
        let err = Config::parse(
            r#"
[scheduling.rate_limits.mastodon]
posts_per_hour = 10
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown platform"));
    }

    #[test]
    fn test_rejects_unrecognized_cooldown() {
        let err = Config::parse("[auto_reply]\ncooldown_secs = 45\n").unwrap_err();
        assert!(err.to_string().contains("cooldown_secs"));
    }

    #[test]
    fn test_rejects_zero_poll_interval() {
        let err = Config::parse("[scheduling]\npoll_interval = 0\n").unwrap_err();
        assert!(err.to_string().contains("poll_interval"));
    }

    #[test]
    fn test_rejects_unknown_timezone() {
        let err = Config::parse("[defaults]\ntimezone = \"Mars/Olympus\"\n").unwrap_err();
        assert!(err.to_string().contains("timezone"));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = Config::parse("invalid toml content [[[").unwrap_err();
        assert!(matches!(err, CadenceError::Config(ConfigError::ParseError(_))));
    }

    #[test]
    #[serial]
    fn test_load_missing_file_falls_back_to_defaults() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.toml");
        std::env::set_var("CADENCE_CONFIG", &missing);
        std::env::remove_var("CADENCE_DB_PATH");

        let config = Config::load().unwrap();
        assert_eq!(config.scheduling.poll_interval, 60);

        std::env::remove_var("CADENCE_CONFIG");
    }

    #[test]
    #[serial]
    fn test_db_path_env_override() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.toml");
        std::fs::write(&config_path, "[database]\npath = \"/from/file.db\"\n").unwrap();
        std::env::set_var("CADENCE_CONFIG", &config_path);
        std::env::set_var("CADENCE_DB_PATH", "/from/env.db");

        let config = Config::load().unwrap();
        assert_eq!(config.database.path, "/from/env.db");

        std::env::remove_var("CADENCE_CONFIG");
        std::env::remove_var("CADENCE_DB_PATH");
    }
}
