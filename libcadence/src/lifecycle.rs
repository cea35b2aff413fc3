//! Post lifecycle state machine
//!
//! ```text
//!   draft ──schedule──▶ queued ──publish ok──▶ posted
//!     ▲                  │  │
//!     └──unschedule──────┘  └──publish error──▶ failed ──retry──▶ queued
//!
//!   draft | queued ──cancel──▶ cancelled
//! ```
//!
//! Every function here works on an in-memory [`Post`] and either applies a
//! complete transition or returns an error without touching the post.
//! Persistence is the caller's job (see [`crate::service::posts`]).

use chrono::DateTime;

use crate::error::{CadenceError, Result};
use crate::scheduling::{parse_schedule, parse_timezone};
use crate::types::{MediaKind, Platform, Post, PostStatus};

/// Check content against the platform's character limit
pub fn validate_content(platform: Platform, content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(CadenceError::validation("Content is required"));
    }

    let length = content.chars().count();
    let limit = platform.max_content_length();
    if length > limit {
        return Err(CadenceError::validation(format!(
            "Content exceeds {}'s {} character limit (got {} characters)",
            platform, limit, length
        )));
    }

    Ok(())
}

/// Image and video posts need a media path; text posts must not carry one
pub fn validate_media(kind: MediaKind, path: Option<&str>) -> Result<()> {
    let has_path = path.is_some_and(|p| !p.trim().is_empty());
    match kind {
        MediaKind::Text if has_path => Err(CadenceError::validation(
            "Text posts cannot carry a media path",
        )),
        MediaKind::Image | MediaKind::Video if !has_path => Err(CadenceError::validation(
            format!("A media path is required for {} posts", kind),
        )),
        _ => Ok(()),
    }
}

fn ensure(post: &Post, allowed: &[PostStatus], action: &'static str) -> Result<()> {
    if allowed.contains(&post.status) {
        Ok(())
    } else {
        Err(CadenceError::InvalidStateTransition {
            post_id: post.id.clone(),
            from: post.status,
            action,
        })
    }
}

/// Queue a draft (or move an already queued post) to `scheduled_at`
///
/// `scheduled_at` accepts anything [`parse_schedule`] understands; wall-clock
/// input is read in `timezone`.
pub fn schedule(post: &mut Post, scheduled_at: &str, timezone: &str, now: i64) -> Result<()> {
    ensure(post, &[PostStatus::Draft, PostStatus::Queued], "schedule")?;
    validate_content(post.platform, &post.content)?;
    validate_media(post.media_kind, post.media_path.as_deref())?;

    let tz = parse_timezone(timezone)?;
    let now_utc = DateTime::from_timestamp(now, 0)
        .ok_or_else(|| CadenceError::validation("Clock is out of range"))?;
    let instant = parse_schedule(scheduled_at, tz, now_utc)?;

    post.scheduled_at = instant.timestamp();
    post.timezone = tz.name().to_string();
    post.status = PostStatus::Queued;
    post.updated_at = now;
    Ok(())
}

/// Take a queued post back to draft
pub fn unschedule(post: &mut Post, now: i64) -> Result<()> {
    ensure(post, &[PostStatus::Queued], "unschedule")?;
    post.status = PostStatus::Draft;
    post.updated_at = now;
    Ok(())
}

/// Cancel a post that has not been dispatched
pub fn cancel(post: &mut Post, now: i64) -> Result<()> {
    ensure(post, &[PostStatus::Draft, PostStatus::Queued], "cancel")?;
    post.status = PostStatus::Cancelled;
    post.updated_at = now;
    Ok(())
}

/// Re-queue a failed post at its original scheduled time
///
/// A past scheduled time makes the post due on the next dispatch cycle.
pub fn retry(post: &mut Post, now: i64) -> Result<()> {
    ensure(post, &[PostStatus::Failed], "retry")?;
    post.status = PostStatus::Queued;
    post.error_message = None;
    post.updated_at = now;
    Ok(())
}

/// Replace the content of a post that has not been dispatched
pub fn edit_content(post: &mut Post, content: String, now: i64) -> Result<()> {
    ensure(post, &[PostStatus::Draft, PostStatus::Queued], "edit")?;
    validate_content(post.platform, &content)?;
    post.content = content;
    post.updated_at = now;
    Ok(())
}

/// Record a successful publish
///
/// Returns `Ok(false)` when the post is already posted with the same
/// external id, in which case nothing changes.
pub fn mark_posted(post: &mut Post, external_id: &str, permalink: &str, now: i64) -> Result<bool> {
    if post.status == PostStatus::Posted && post.external_id.as_deref() == Some(external_id) {
        return Ok(false);
    }

    ensure(post, &[PostStatus::Queued], "mark posted")?;
    post.status = PostStatus::Posted;
    post.external_id = Some(external_id.to_string());
    post.permalink = Some(permalink.to_string());
    post.error_message = None;
    post.updated_at = now;
    Ok(true)
}

/// Record a failed publish attempt
pub fn mark_failed(post: &mut Post, reason: &str, now: i64) -> Result<()> {
    ensure(post, &[PostStatus::Queued], "mark failed")?;
    post.status = PostStatus::Failed;
    post.error_message = Some(reason.to_string());
    post.updated_at = now;
    Ok(())
}

/// Posts that may be deleted outright rather than cancelled
pub fn ensure_deletable(post: &Post) -> Result<()> {
    ensure(
        post,
        &[PostStatus::Draft, PostStatus::Cancelled, PostStatus::Failed],
        "delete",
    )
}
