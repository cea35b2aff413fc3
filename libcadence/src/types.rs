//! Core types for Cadence

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CadenceError;

/// Timezone applied to posts created without an explicit one
pub const DEFAULT_TIMEZONE: &str = "Asia/Jakarta";

/// Social platform a post or rule targets
///
/// Each variant carries the platform's capabilities (name, content limit);
/// publishing itself goes through [`crate::platforms::Publisher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    LinkedIn,
    Threads,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::LinkedIn, Platform::Threads];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::LinkedIn => "linkedin",
            Platform::Threads => "threads",
        }
    }

    /// Maximum post length in characters
    pub fn max_content_length(&self) -> usize {
        match self {
            Platform::LinkedIn => 3000,
            Platform::Threads => 500,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "linkedin" => Ok(Platform::LinkedIn),
            "threads" => Ok(Platform::Threads),
            other => Err(CadenceError::Validation(format!(
                "Unknown platform '{}'. Valid options: linkedin, threads",
                other
            ))),
        }
    }
}

/// Lifecycle state of a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Queued,
    Posted,
    Failed,
    Cancelled,
}

impl PostStatus {
    pub const ALL: [PostStatus; 5] = [
        PostStatus::Draft,
        PostStatus::Queued,
        PostStatus::Posted,
        PostStatus::Failed,
        PostStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Queued => "queued",
            PostStatus::Posted => "posted",
            PostStatus::Failed => "failed",
            PostStatus::Cancelled => "cancelled",
        }
    }

    /// No transition leaves a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, PostStatus::Posted | PostStatus::Cancelled)
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Ok(PostStatus::Draft),
            "queued" => Ok(PostStatus::Queued),
            "posted" => Ok(PostStatus::Posted),
            "failed" => Ok(PostStatus::Failed),
            "cancelled" => Ok(PostStatus::Cancelled),
            other => Err(CadenceError::Validation(format!(
                "Unknown status '{}'. Valid options: draft, queued, posted, failed, cancelled",
                other
            ))),
        }
    }
}

/// Kind of media attached to a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Text,
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Text => "text",
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(MediaKind::Text),
            "image" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            other => Err(CadenceError::Validation(format!(
                "Unknown media type '{}'. Valid options: text, image, video",
                other
            ))),
        }
    }
}

/// A single piece of content targeted at one platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub platform: Platform,
    pub content: String,
    pub media_kind: MediaKind,
    pub media_path: Option<String>,
    /// Unix timestamp (seconds) at which the post becomes due
    pub scheduled_at: i64,
    /// IANA timezone the user scheduled in
    pub timezone: String,
    pub status: PostStatus,
    pub external_id: Option<String>,
    pub permalink: Option<String>,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Post {
    /// Create a text-only draft owned by `user_id`
    pub fn new(user_id: &str, platform: Platform, content: String, now: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            platform,
            content,
            media_kind: MediaKind::Text,
            media_path: None,
            scheduled_at: now,
            timezone: DEFAULT_TIMEZONE.to_string(),
            status: PostStatus::Draft,
            external_id: None,
            permalink: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A queued post whose scheduled time has arrived
    pub fn is_due(&self, now: i64) -> bool {
        self.status == PostStatus::Queued && self.scheduled_at <= now
    }

    /// Publish fields are present exactly when posted; error exactly when failed
    pub fn is_consistent(&self) -> bool {
        let posted = self.status == PostStatus::Posted;
        let failed = self.status == PostStatus::Failed;
        self.external_id.is_some() == posted
            && self.permalink.is_some() == posted
            && self.error_message.is_some() == failed
    }
}

/// Keyword-triggered reply owned by one user on one platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoReplyRule {
    pub id: String,
    pub user_id: String,
    pub platform: Platform,
    pub keyword: String,
    pub reply_template: String,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Text that suppresses all auto-replies for a comment containing it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopWord {
    pub id: String,
    pub user_id: String,
    pub platform: Platform,
    pub word: String,
    pub created_at: i64,
}

/// Watermark of the newest processed comment for a (user, platform) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentOffset {
    pub user_id: String,
    pub platform: Platform,
    pub last_checked_at: i64,
    /// Comments newer than `last_checked_at` that were already handled
    ///
    /// Non-empty only after a poll stopped partway through comments that
    /// share a timestamp.
    #[serde(default)]
    pub handled_ids: Vec<String>,
    pub updated_at: i64,
}

/// A comment or mention received on one of the user's posts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundComment {
    /// Platform comment id, used as the reply parent
    pub id: String,
    pub user_id: String,
    pub platform: Platform,
    pub author_handle: String,
    pub text: String,
    pub timestamp: i64,
}

/// Entry in the per-user activity log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: Option<i64>,
    pub user_id: String,
    pub level: String,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub details: Option<serde_json::Value>,
    pub created_at: i64,
}

impl ActivityEntry {
    pub fn info(user_id: &str, action: &str, now: i64) -> Self {
        Self {
            id: None,
            user_id: user_id.to_string(),
            level: "info".to_string(),
            action: action.to_string(),
            entity_type: None,
            entity_id: None,
            details: None,
            created_at: now,
        }
    }

    pub fn error(user_id: &str, action: &str, now: i64) -> Self {
        Self {
            level: "error".to_string(),
            ..Self::info(user_id, action, now)
        }
    }

    pub fn entity(mut self, entity_type: &str, entity_id: &str) -> Self {
        self.entity_type = Some(entity_type.to_string());
        self.entity_id = Some(entity_id.to_string());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
