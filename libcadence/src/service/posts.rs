//! Post service - persisted lifecycle operations
//!
//! Wraps the pure transitions in [`crate::lifecycle`] with storage. Every
//! write is guarded on the status the post had when it was read, so a
//! concurrent change (say, the dispatcher posting it while the user
//! cancels) turns into `InvalidStateTransition` instead of a lost update.

use serde::Serialize;
use std::sync::Arc;

use crate::clock::Clock;
use crate::db::{Database, PostFilter};
use crate::error::{CadenceError, Result};
use crate::lifecycle;
use crate::scheduling::parse_timezone;
use crate::types::{ActivityEntry, MediaKind, Platform, Post, PostStatus};

/// Input for creating a post
#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: String,
    pub platform: Platform,
    pub content: String,
    pub media_kind: MediaKind,
    pub media_path: Option<String>,
    /// Schedule input; `None` queues the post for the next cycle
    pub scheduled_at: Option<String>,
    /// IANA timezone; `None` uses the configured default
    pub timezone: Option<String>,
    /// Store as draft instead of queueing
    pub draft: bool,
}

impl NewPost {
    /// A text post queued for the next cycle
    pub fn text(user_id: &str, platform: Platform, content: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            platform,
            content: content.to_string(),
            media_kind: MediaKind::Text,
            media_path: None,
            scheduled_at: None,
            timezone: None,
            draft: false,
        }
    }
}

/// Post counts per status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PostStats {
    pub draft: i64,
    pub queued: i64,
    pub posted: i64,
    pub failed: i64,
    pub cancelled: i64,
    pub total: i64,
}

#[derive(Clone)]
pub struct PostService {
    db: Database,
    clock: Arc<dyn Clock>,
    default_timezone: String,
}

impl PostService {
    pub fn new(db: Database, clock: Arc<dyn Clock>, default_timezone: &str) -> Self {
        Self {
            db,
            clock,
            default_timezone: default_timezone.to_string(),
        }
    }

    /// Validate and store a new post as draft or queued
    pub async fn create(&self, request: NewPost) -> Result<Post> {
        let now = self.clock.now();
        let timezone = request
            .timezone
            .unwrap_or_else(|| self.default_timezone.clone());

        let mut post = Post::new(&request.user_id, request.platform, request.content, now);
        post.media_kind = request.media_kind;
        post.media_path = request.media_path;

        if request.draft {
            lifecycle::validate_content(post.platform, &post.content)?;
            lifecycle::validate_media(post.media_kind, post.media_path.as_deref())?;
            post.timezone = parse_timezone(&timezone)?.name().to_string();
            if let Some(at) = &request.scheduled_at {
                // Validate the instant now; the draft keeps it for later
                let mut probe = post.clone();
                lifecycle::schedule(&mut probe, at, &timezone, now)?;
                post.scheduled_at = probe.scheduled_at;
            }
        } else {
            let at = request
                .scheduled_at
                .unwrap_or_else(|| self.clock.now_utc().to_rfc3339());
            lifecycle::schedule(&mut post, &at, &timezone, now)?;
        }

        self.db.insert_post(&post).await?;
        tracing::info!(
            post_id = %post.id,
            user_id = %post.user_id,
            platform = %post.platform,
            status = %post.status,
            scheduled_at = post.scheduled_at,
            "Post created"
        );
        self.record(
            ActivityEntry::info(&post.user_id, "post_created", now)
                .entity("post", &post.id)
                .details(serde_json::json!({
                    "platform": post.platform,
                    "status": post.status,
                    "scheduled_at": post.scheduled_at,
                })),
        )
        .await;

        Ok(post)
    }

    /// A post owned by `user_id`
    pub async fn get(&self, user_id: &str, post_id: &str) -> Result<Post> {
        match self.db.get_post(post_id).await? {
            Some(post) if post.user_id == user_id => Ok(post),
            _ => Err(CadenceError::NotFound(format!("post {}", post_id))),
        }
    }

    pub async fn list(&self, user_id: &str, filter: &PostFilter) -> Result<Vec<Post>> {
        self.db.list_posts(user_id, filter).await
    }

    pub async fn stats(&self, user_id: &str) -> Result<PostStats> {
        let mut stats = PostStats::default();
        for (status, count) in self.db.count_posts_by_status(user_id).await? {
            match status {
                PostStatus::Draft => stats.draft = count,
                PostStatus::Queued => stats.queued = count,
                PostStatus::Posted => stats.posted = count,
                PostStatus::Failed => stats.failed = count,
                PostStatus::Cancelled => stats.cancelled = count,
            }
            stats.total += count;
        }
        Ok(stats)
    }

    /// Queue a draft, or move a queued post to a new time
    pub async fn schedule(
        &self,
        user_id: &str,
        post_id: &str,
        scheduled_at: &str,
        timezone: Option<&str>,
    ) -> Result<Post> {
        let post = self.get(user_id, post_id).await?;
        let timezone = timezone.unwrap_or(&post.timezone).to_string();
        let post = self
            .transition(post, |p, now| lifecycle::schedule(p, scheduled_at, &timezone, now))
            .await?;
        self.record(
            ActivityEntry::info(user_id, "post_scheduled", post.updated_at)
                .entity("post", &post.id)
                .details(serde_json::json!({"scheduled_at": post.scheduled_at, "timezone": post.timezone})),
        )
        .await;
        Ok(post)
    }

    pub async fn unschedule(&self, user_id: &str, post_id: &str) -> Result<Post> {
        let post = self.get(user_id, post_id).await?;
        let post = self.transition(post, lifecycle::unschedule).await?;
        self.record(ActivityEntry::info(user_id, "post_unscheduled", post.updated_at).entity("post", &post.id))
            .await;
        Ok(post)
    }

    pub async fn cancel(&self, user_id: &str, post_id: &str) -> Result<Post> {
        let post = self.get(user_id, post_id).await?;
        let post = self.transition(post, lifecycle::cancel).await?;
        self.record(ActivityEntry::info(user_id, "post_cancelled", post.updated_at).entity("post", &post.id))
            .await;
        Ok(post)
    }

    pub async fn retry(&self, user_id: &str, post_id: &str) -> Result<Post> {
        let post = self.get(user_id, post_id).await?;
        let post = self.transition(post, lifecycle::retry).await?;
        self.record(ActivityEntry::info(user_id, "post_retried", post.updated_at).entity("post", &post.id))
            .await;
        Ok(post)
    }

    pub async fn edit_content(&self, user_id: &str, post_id: &str, content: &str) -> Result<Post> {
        let post = self.get(user_id, post_id).await?;
        self.transition(post, |p, now| lifecycle::edit_content(p, content.to_string(), now))
            .await
    }

    /// Remove a draft, cancelled or failed post
    pub async fn delete(&self, user_id: &str, post_id: &str) -> Result<()> {
        let post = self.get(user_id, post_id).await?;
        lifecycle::ensure_deletable(&post)?;

        if !self.db.delete_post(&post.id, post.status).await? {
            return Err(self.conflict(&post.id, "delete").await);
        }
        self.record(
            ActivityEntry::info(user_id, "post_deleted", self.clock.now()).entity("post", &post.id),
        )
        .await;
        Ok(())
    }

    /// Record a successful publish
    ///
    /// Repeating the call with the same external id is a no-op.
    pub async fn mark_posted(&self, post_id: &str, external_id: &str, permalink: &str) -> Result<Post> {
        let post = self
            .db
            .get_post(post_id)
            .await?
            .ok_or_else(|| CadenceError::NotFound(format!("post {}", post_id)))?;

        let now = self.clock.now();
        let mut updated = post.clone();
        if !lifecycle::mark_posted(&mut updated, external_id, permalink, now)? {
            return Ok(post);
        }

        if !self.db.save_post(&updated, post.status).await? {
            return Err(self.conflict(post_id, "mark posted").await);
        }
        Ok(updated)
    }

    /// Record a failed publish attempt
    pub async fn mark_failed(&self, post_id: &str, reason: &str) -> Result<Post> {
        let post = self
            .db
            .get_post(post_id)
            .await?
            .ok_or_else(|| CadenceError::NotFound(format!("post {}", post_id)))?;

        self.transition(post, |p, now| lifecycle::mark_failed(p, reason, now))
            .await
    }

    /// Apply a transition in memory, then persist it guarded on the prior status
    async fn transition<F>(&self, post: Post, apply: F) -> Result<Post>
    where
        F: FnOnce(&mut Post, i64) -> Result<()>,
    {
        let expected = post.status;
        let mut updated = post;
        apply(&mut updated, self.clock.now())?;

        if !self.db.save_post(&updated, expected).await? {
            return Err(self.conflict(&updated.id, "update").await);
        }
        Ok(updated)
    }

    /// Error for a guarded write that matched no row
    async fn conflict(&self, post_id: &str, action: &'static str) -> CadenceError {
        match self.db.get_post(post_id).await {
            Ok(Some(current)) => CadenceError::InvalidStateTransition {
                post_id: post_id.to_string(),
                from: current.status,
                action,
            },
            Ok(None) => CadenceError::NotFound(format!("post {}", post_id)),
            Err(e) => e,
        }
    }

    async fn record(&self, entry: ActivityEntry) {
        if let Err(e) = self.db.log_activity(&entry).await {
            tracing::warn!(action = %entry.action, error = %e, "Failed to write activity log");
        }
    }
}
