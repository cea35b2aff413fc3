//! Error types for Cadence

use thiserror::Error;

use crate::types::PostStatus;

pub type Result<T> = std::result::Result<T, CadenceError>;

#[derive(Error, Debug)]
pub enum CadenceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid state transition: cannot {action} post {post_id} while it is {from}")]
    InvalidStateTransition {
        post_id: String,
        from: PostStatus,
        action: &'static str,
    },

    #[error("Not found: {0}")]
    NotFound(String),
}

impl CadenceError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CadenceError::Validation(_) | CadenceError::NotFound(_) => 3,
            CadenceError::Config(_) | CadenceError::Database(_) => 2,
            CadenceError::Platform(_) | CadenceError::InvalidStateTransition { .. } => 1,
        }
    }

    /// Shorthand used by validators
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        CadenceError::Validation(message.into())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Malformed row: {0}")]
    InvalidRow(String),
}

/// Failure reported by a platform publisher
///
/// The dispatcher does not distinguish retryable from permanent variants;
/// every variant ends the attempt and is recorded on the post.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content rejected: {0}")]
    Validation(String),

    #[error("Publishing failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Publish call timed out after {0}s")]
    Timeout(u64),

    #[error("No publisher configured for {0}")]
    NotConfigured(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_validation() {
        let error = CadenceError::Validation("Content is required".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_not_found() {
        let error = CadenceError::NotFound("post abc".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_environment_errors() {
        let config = CadenceError::Config(ConfigError::MissingField("database.path".to_string()));
        assert_eq!(config.exit_code(), 2);

        let db = CadenceError::Database(DbError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "File not found",
        )));
        assert_eq!(db.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_state_and_platform_errors() {
        let transition = CadenceError::InvalidStateTransition {
            post_id: "p1".to_string(),
            from: PostStatus::Posted,
            action: "cancel",
        };
        assert_eq!(transition.exit_code(), 1);

        let platform = CadenceError::Platform(PlatformError::Timeout(30));
        assert_eq!(platform.exit_code(), 1);
    }

    #[test]
    fn test_invalid_transition_message() {
        let error = CadenceError::InvalidStateTransition {
            post_id: "p1".to_string(),
            from: PostStatus::Cancelled,
            action: "retry",
        };
        assert_eq!(
            error.to_string(),
            "Invalid state transition: cannot retry post p1 while it is cancelled"
        );
    }

    #[test]
    fn test_platform_error_formatting() {
        let error = CadenceError::Platform(PlatformError::Posting("gateway returned 502".to_string()));
        assert_eq!(
            error.to_string(),
            "Platform error: Publishing failed: gateway returned 502"
        );

        assert_eq!(
            PlatformError::Timeout(30).to_string(),
            "Publish call timed out after 30s"
        );
    }

    #[test]
    fn test_config_invalid_value_formatting() {
        let error = ConfigError::InvalidValue {
            field: "auto_reply.cooldown_secs".to_string(),
            message: "must be one of 30, 60, 120, 300 (got 45)".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("auto_reply.cooldown_secs"));
        assert!(message.contains("got 45"));
    }

    #[test]
    fn test_error_conversion_from_platform_error() {
        let error: CadenceError = PlatformError::Network("connection reset".to_string()).into();
        assert!(matches!(error, CadenceError::Platform(PlatformError::Network(_))));
    }
}
