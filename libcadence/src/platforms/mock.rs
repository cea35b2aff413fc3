//! Mock publisher and comment feed for testing
//!
//! The mock can succeed, fail with a chosen [`PlatformError`], or stall for
//! a configurable delay. It records every call so tests can assert on what
//! was published and in which order, and it tracks how many calls were in
//! flight at once.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{PlatformError, Result};
use crate::platforms::{
    CommentFeed, PublishRequest, PublishedPost, PublishedReply, Publisher, ReplyRequest,
};
use crate::types::{InboundComment, Platform};

/// Configuration for mock publisher behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub platform: Platform,

    /// Error returned by every `publish_post` call
    pub post_error: Option<PlatformError>,

    /// Error returned by every `publish_reply` call
    pub reply_error: Option<PlatformError>,

    /// Delay before completing either call
    pub delay: Duration,
}

impl MockConfig {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            post_error: None,
            reply_error: None,
            delay: Duration::ZERO,
        }
    }
}

#[derive(Default)]
struct Recorded {
    posts: Mutex<Vec<PublishRequest>>,
    replies: Mutex<Vec<ReplyRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    sequence: AtomicUsize,
}

/// Mock publisher for testing
///
/// Clones share their call records.
#[derive(Clone)]
pub struct MockPublisher {
    config: MockConfig,
    recorded: Arc<Recorded>,
}

impl MockPublisher {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            recorded: Arc::new(Recorded::default()),
        }
    }

    /// A publisher whose calls always succeed
    pub fn success(platform: Platform) -> Self {
        Self::new(MockConfig::new(platform))
    }

    /// A publisher whose post and reply calls fail with `error`
    pub fn failing(platform: Platform, error: PlatformError) -> Self {
        Self::new(MockConfig {
            post_error: Some(error.clone()),
            reply_error: Some(error),
            ..MockConfig::new(platform)
        })
    }

    /// A publisher that waits `delay` before succeeding
    pub fn with_delay(platform: Platform, delay: Duration) -> Self {
        Self::new(MockConfig {
            delay,
            ..MockConfig::new(platform)
        })
    }

    /// Posts published successfully, in call order
    pub fn published_posts(&self) -> Vec<PublishRequest> {
        self.recorded
            .posts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replies published successfully, in call order
    pub fn published_replies(&self) -> Vec<ReplyRequest> {
        self.recorded
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Total calls made, including failed ones
    pub fn call_count(&self) -> usize {
        self.recorded.sequence.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.recorded.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> usize {
        let sequence = self.recorded.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let now_in_flight = self.recorded.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.recorded
            .max_in_flight
            .fetch_max(now_in_flight, Ordering::SeqCst);

        if !self.config.delay.is_zero() {
            tokio::time::sleep(self.config.delay).await;
        }
        sequence
    }

    fn leave(&self) {
        self.recorded.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn platform(&self) -> Platform {
        self.config.platform
    }

    async fn publish_post(&self, request: &PublishRequest) -> Result<PublishedPost> {
        let guard = InFlight(self);
        let sequence = self.enter().await;
        drop(guard);

        if let Some(error) = &self.config.post_error {
            return Err(error.clone().into());
        }

        self.recorded
            .posts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let external_id = format!("{}-post-{}", self.config.platform, sequence);
        Ok(PublishedPost {
            permalink: format!("https://{}.example/p/{}", self.config.platform, external_id),
            external_id,
        })
    }

    async fn publish_reply(&self, request: &ReplyRequest) -> Result<PublishedReply> {
        let guard = InFlight(self);
        let sequence = self.enter().await;
        drop(guard);

        if let Some(error) = &self.config.reply_error {
            return Err(error.clone().into());
        }

        self.recorded
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        Ok(PublishedReply {
            external_id: format!("{}-reply-{}", self.config.platform, sequence),
        })
    }
}

/// Decrements the in-flight counter even when the call is cancelled by a
/// timeout mid-delay
struct InFlight<'a>(&'a MockPublisher);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.leave();
    }
}

/// In-memory comment source
#[derive(Clone, Default)]
pub struct MockCommentFeed {
    comments: Arc<Mutex<Vec<InboundComment>>>,
    error: Option<PlatformError>,
}

impl MockCommentFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// A feed whose every fetch fails with `error`
    pub fn failing(error: PlatformError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn push(&self, comment: InboundComment) {
        self.comments
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(comment);
    }
}

#[async_trait]
impl CommentFeed for MockCommentFeed {
    async fn fetch_comments(
        &self,
        user_id: &str,
        platform: Platform,
        since: i64,
    ) -> Result<Vec<InboundComment>> {
        if let Some(error) = &self.error {
            return Err(error.clone().into());
        }

        let comments = self.comments.lock().unwrap_or_else(|e| e.into_inner());
        Ok(comments
            .iter()
            .filter(|c| c.user_id == user_id && c.platform == platform && c.timestamp > since)
            .cloned()
            .collect())
    }
}
