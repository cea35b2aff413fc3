//! Platform publishing abstraction
//!
//! The engine never talks to LinkedIn or Threads directly. Everything goes
//! through the [`Publisher`] trait, which exposes exactly two outbound
//! operations: publish a post and publish a reply. Authentication, token
//! refresh and platform-side retries belong to the implementation.
//!
//! Inbound comments arrive through the separate [`CommentFeed`] trait.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use libcadence::platforms::{mock::MockPublisher, PublisherRegistry};
//! use libcadence::Platform;
//!
//! let mut registry = PublisherRegistry::new();
//! registry.register(Arc::new(MockPublisher::success(Platform::Threads)));
//!
//! assert!(registry.get(Platform::Threads).is_ok());
//! assert!(registry.get(Platform::LinkedIn).is_err());
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{PlatformError, Result};
use crate::types::{InboundComment, MediaKind, Platform, Post};

// Mock publisher is available for all builds to support integration tests
pub mod mock;
pub mod webhook;

/// Content handed to a publisher for one post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub post_id: String,
    pub user_id: String,
    pub platform: Platform,
    pub content: String,
    pub media_kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_path: Option<String>,
}

impl PublishRequest {
    pub fn from_post(post: &Post) -> Self {
        Self {
            post_id: post.id.clone(),
            user_id: post.user_id.clone(),
            platform: post.platform,
            content: post.content.clone(),
            media_kind: post.media_kind,
            media_path: post.media_path.clone(),
        }
    }
}

/// Platform identifiers of a published post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedPost {
    pub external_id: String,
    pub permalink: String,
}

/// A reply to an inbound comment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyRequest {
    pub user_id: String,
    pub platform: Platform,
    /// Platform id of the comment being answered
    pub parent_comment_id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedReply {
    pub external_id: String,
}

/// Outbound operations for one platform
///
/// Implementations must be safe to call concurrently for different users;
/// the dispatcher guarantees at most one call per (user, platform) at a time.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// The platform this publisher serves
    fn platform(&self) -> Platform;

    /// Publish a post
    ///
    /// # Errors
    ///
    /// Returns `PlatformError` for any failure; the caller records the
    /// message on the post and does not retry.
    async fn publish_post(&self, request: &PublishRequest) -> Result<PublishedPost>;

    /// Publish a reply under an existing comment
    async fn publish_reply(&self, request: &ReplyRequest) -> Result<PublishedReply>;
}

/// Source of inbound comments and mentions
#[async_trait]
pub trait CommentFeed: Send + Sync {
    /// Comments on `user_id`'s content newer than `since` (unix seconds)
    async fn fetch_comments(
        &self,
        user_id: &str,
        platform: Platform,
        since: i64,
    ) -> Result<Vec<InboundComment>>;
}

/// Publishers and comment feeds selected by platform
#[derive(Clone, Default)]
pub struct PublisherRegistry {
    publishers: HashMap<Platform, Arc<dyn Publisher>>,
    feeds: HashMap<Platform, Arc<dyn CommentFeed>>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a publisher under its own platform, replacing any previous one
    pub fn register(&mut self, publisher: Arc<dyn Publisher>) {
        self.publishers.insert(publisher.platform(), publisher);
    }

    pub fn register_feed(&mut self, platform: Platform, feed: Arc<dyn CommentFeed>) {
        self.feeds.insert(platform, feed);
    }

    /// Publisher for `platform`
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::NotConfigured` when nothing is registered.
    pub fn get(&self, platform: Platform) -> Result<Arc<dyn Publisher>> {
        self.publishers
            .get(&platform)
            .cloned()
            .ok_or_else(|| PlatformError::NotConfigured(platform.to_string()).into())
    }

    pub fn feed(&self, platform: Platform) -> Option<Arc<dyn CommentFeed>> {
        self.feeds.get(&platform).cloned()
    }

    /// Platforms with a registered publisher, in stable order
    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self.publishers.keys().copied().collect();
        platforms.sort();
        platforms
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }
}

/// Run a publisher call with an upper bound on its duration
///
/// Expiry is reported as `PlatformError::Timeout`; the call's future is
/// dropped.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(PlatformError::Timeout(limit.as_secs()).into()),
    }
}
