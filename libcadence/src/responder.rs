//! Auto-reply dispatch
//!
//! The [`Responder`] turns a matcher decision into an actual reply: it takes
//! a reply token, claims the author's cooldown, then publishes under the
//! publish timeout. [`Responder::poll`] feeds it comments from a
//! [`CommentFeed`], newest-offset first, and advances the stored offset.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::db::Database;
use crate::error::{CadenceError, Result};
use crate::matcher::{FiredReply, MatchResult, RuleMatcher};
use crate::platforms::{with_timeout, CommentFeed, PublisherRegistry, ReplyRequest};
use crate::rate_limiter::{Action, RateLimiter};
use crate::service::events::{Event, EventBus};
use crate::types::{ActivityEntry, InboundComment, Platform};

/// What happened to one inbound comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReplyOutcome {
    Suppressed { word: String },
    NoMatch,
    Cooldown { remaining_secs: i64 },
    /// The reply bucket was empty; the cooldown was not touched
    RateLimited,
    Sent { rule_id: String, external_id: String },
    /// Publishing failed; the cooldown stays consumed
    Failed { rule_id: String, error: String },
}

/// Counts for one poll of a comment feed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollReport {
    pub fetched: usize,
    pub sent: usize,
    pub failed: usize,
    pub suppressed: usize,
    pub cooldown: usize,
    pub rate_limited: usize,
    pub no_match: usize,
}

impl PollReport {
    fn record(&mut self, outcome: &ReplyOutcome) {
        match outcome {
            ReplyOutcome::Suppressed { .. } => self.suppressed += 1,
            ReplyOutcome::NoMatch => self.no_match += 1,
            ReplyOutcome::Cooldown { .. } => self.cooldown += 1,
            ReplyOutcome::RateLimited => self.rate_limited += 1,
            ReplyOutcome::Sent { .. } => self.sent += 1,
            ReplyOutcome::Failed { .. } => self.failed += 1,
        }
    }

    fn merge(&mut self, other: PollReport) {
        self.fetched += other.fetched;
        self.sent += other.sent;
        self.failed += other.failed;
        self.suppressed += other.suppressed;
        self.cooldown += other.cooldown;
        self.rate_limited += other.rate_limited;
        self.no_match += other.no_match;
    }
}

#[derive(Clone)]
pub struct Responder {
    db: Database,
    matcher: RuleMatcher,
    publishers: Arc<PublisherRegistry>,
    limiter: Arc<RateLimiter>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    publish_timeout: Duration,
}

impl Responder {
    pub fn new(
        db: Database,
        matcher: RuleMatcher,
        publishers: Arc<PublisherRegistry>,
        limiter: Arc<RateLimiter>,
        events: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            matcher,
            publishers,
            limiter,
            events,
            clock,
            publish_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Evaluate one comment and send the reply if a rule fires
    pub async fn process_comment(&self, comment: &InboundComment) -> Result<ReplyOutcome> {
        let result = self
            .matcher
            .evaluate(
                &comment.user_id,
                comment.platform,
                &comment.text,
                &comment.author_handle,
                comment.timestamp,
            )
            .await?;

        match result {
            MatchResult::Suppressed { word } => {
                tracing::debug!(comment_id = %comment.id, word = %word, "Reply suppressed by stop word");
                self.events.emit(Event::ReplySuppressed {
                    user_id: comment.user_id.clone(),
                    platform: comment.platform.to_string(),
                    comment_id: comment.id.clone(),
                    word: word.clone(),
                });
                Ok(ReplyOutcome::Suppressed { word })
            }
            MatchResult::NoMatch => Ok(ReplyOutcome::NoMatch),
            MatchResult::Cooldown { remaining_secs, .. } => {
                Ok(self.cooldown(comment, remaining_secs))
            }
            MatchResult::Fire(fired) => self.dispatch(comment, fired).await,
        }
    }

    async fn dispatch(&self, comment: &InboundComment, fired: FiredReply) -> Result<ReplyOutcome> {
        let publisher = self.publishers.get(comment.platform)?;

        if !self
            .limiter
            .try_acquire(&comment.user_id, comment.platform, Action::Reply)
        {
            tracing::info!(
                user_id = %comment.user_id,
                platform = %comment.platform,
                comment_id = %comment.id,
                "Reply rate limit reached"
            );
            self.events.emit(Event::ReplyRateLimited {
                user_id: comment.user_id.clone(),
                platform: comment.platform.to_string(),
                comment_id: comment.id.clone(),
            });
            return Ok(ReplyOutcome::RateLimited);
        }

        let cooldowns = self.matcher.cooldowns();
        let claimed = cooldowns.try_claim(
            &comment.user_id,
            comment.platform,
            &comment.author_handle,
            comment.timestamp,
            self.clock.now(),
        );
        if !claimed {
            // Lost to a concurrent reply for the same author
            self.limiter
                .refund(&comment.user_id, comment.platform, Action::Reply);
            let remaining = cooldowns
                .remaining(
                    &comment.user_id,
                    comment.platform,
                    &comment.author_handle,
                    comment.timestamp,
                )
                .unwrap_or(0);
            return Ok(self.cooldown(comment, remaining));
        }

        let request = ReplyRequest {
            user_id: comment.user_id.clone(),
            platform: comment.platform,
            parent_comment_id: comment.id.clone(),
            text: fired.reply,
        };

        match with_timeout(self.publish_timeout, publisher.publish_reply(&request)).await {
            Ok(published) => {
                tracing::info!(
                    rule_id = %fired.rule.id,
                    comment_id = %comment.id,
                    author = %comment.author_handle,
                    "Auto-reply sent"
                );
                self.record(
                    ActivityEntry::info(&comment.user_id, "auto_reply_sent", self.clock.now())
                        .entity("auto_reply_rule", &fired.rule.id)
                        .details(serde_json::json!({
                            "platform": comment.platform,
                            "comment_id": comment.id,
                            "author": comment.author_handle,
                            "external_id": published.external_id,
                        })),
                )
                .await;
                self.events.emit(Event::ReplyFired {
                    user_id: comment.user_id.clone(),
                    platform: comment.platform.to_string(),
                    rule_id: fired.rule.id.clone(),
                    comment_id: comment.id.clone(),
                    author: comment.author_handle.clone(),
                });
                Ok(ReplyOutcome::Sent {
                    rule_id: fired.rule.id,
                    external_id: published.external_id,
                })
            }
            Err(e) => {
                let error = match e {
                    CadenceError::Platform(platform_error) => platform_error.to_string(),
                    other => other.to_string(),
                };
                tracing::warn!(
                    rule_id = %fired.rule.id,
                    comment_id = %comment.id,
                    error = %error,
                    "Auto-reply failed"
                );
                self.record(
                    ActivityEntry::error(&comment.user_id, "auto_reply_failed", self.clock.now())
                        .entity("auto_reply_rule", &fired.rule.id)
                        .details(serde_json::json!({
                            "platform": comment.platform,
                            "comment_id": comment.id,
                            "error": error,
                        })),
                )
                .await;
                self.events.emit(Event::ReplyFailed {
                    user_id: comment.user_id.clone(),
                    platform: comment.platform.to_string(),
                    comment_id: comment.id.clone(),
                    error: error.clone(),
                });
                Ok(ReplyOutcome::Failed {
                    rule_id: fired.rule.id,
                    error,
                })
            }
        }
    }

    fn cooldown(&self, comment: &InboundComment, remaining_secs: i64) -> ReplyOutcome {
        tracing::debug!(
            comment_id = %comment.id,
            author = %comment.author_handle,
            remaining_secs,
            "Author in cooldown"
        );
        self.events.emit(Event::ReplyCooldown {
            user_id: comment.user_id.clone(),
            platform: comment.platform.to_string(),
            comment_id: comment.id.clone(),
            author: comment.author_handle.clone(),
            remaining_secs,
        });
        ReplyOutcome::Cooldown { remaining_secs }
    }

    /// Fetch and process new comments for one (user, platform) pair
    ///
    /// The first poll of a pair starts from now rather than replaying the
    /// feed's history. The stored offset only moves forward. If processing
    /// stops on an error, the offset stays just below the failing comment's
    /// timestamp and the ids already handled at that timestamp are stored
    /// with it, so the next poll resumes at the failing comment without
    /// answering its same-second siblings twice.
    pub async fn poll(
        &self,
        user_id: &str,
        platform: Platform,
        feed: &dyn CommentFeed,
    ) -> Result<PollReport> {
        let now = self.clock.now();
        let (since, already_handled) = match self.db.get_comment_offset(user_id, platform).await? {
            Some(offset) => (offset.last_checked_at, offset.handled_ids),
            None => {
                self.db
                    .advance_comment_offset(user_id, platform, now, now)
                    .await?;
                (now, Vec::new())
            }
        };

        let mut comments: Vec<InboundComment> = feed
            .fetch_comments(user_id, platform, since)
            .await?
            .into_iter()
            .filter(|c| c.user_id == user_id && c.platform == platform && c.timestamp > since)
            .collect();
        comments.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

        let mut report = PollReport {
            fetched: comments.len(),
            ..Default::default()
        };
        let mut watermark = since;
        // (timestamp, id) of every comment handled now or on an earlier poll
        let mut handled: Vec<(i64, &str)> = Vec::new();
        let mut failure = None;

        for comment in &comments {
            if already_handled.contains(&comment.id) {
                tracing::debug!(comment_id = %comment.id, "Comment already handled");
                handled.push((comment.timestamp, comment.id.as_str()));
                watermark = watermark.max(comment.timestamp);
                continue;
            }

            match self.process_comment(comment).await {
                Ok(outcome) => {
                    report.record(&outcome);
                    handled.push((comment.timestamp, comment.id.as_str()));
                    watermark = watermark.max(comment.timestamp);
                }
                Err(e) => {
                    watermark = watermark.min(comment.timestamp - 1).max(since);
                    failure = Some(e);
                    break;
                }
            }
        }

        let handled_ids: Vec<String> = if failure.is_some() {
            handled
                .iter()
                .filter(|(timestamp, _)| *timestamp > watermark)
                .map(|(_, id)| id.to_string())
                .collect()
        } else {
            Vec::new()
        };

        if watermark > since || handled_ids != already_handled {
            self.db
                .save_comment_offset(user_id, platform, watermark, &handled_ids, self.clock.now())
                .await?;
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Poll every pair that has at least one active rule
    ///
    /// Errors for one pair are logged and do not stop the others.
    pub async fn poll_all(&self) -> Result<PollReport> {
        let mut total = PollReport::default();

        for (user_id, platform) in self.db.reply_targets().await? {
            let Some(feed) = self.publishers.feed(platform) else {
                tracing::debug!(%platform, "No comment feed configured, skipping");
                continue;
            };

            match self.poll(&user_id, platform, feed.as_ref()).await {
                Ok(report) => total.merge(report),
                Err(e) => {
                    tracing::error!(user_id = %user_id, %platform, error = %e, "Comment poll failed")
                }
            }
        }

        let now = self.clock.now();
        self.matcher.cooldowns().prune(now);
        self.limiter.prune();

        if total.fetched > 0 {
            tracing::info!(
                fetched = total.fetched,
                sent = total.sent,
                failed = total.failed,
                suppressed = total.suppressed,
                cooldown = total.cooldown,
                rate_limited = total.rate_limited,
                "Comment poll complete"
            );
        }
        Ok(total)
    }

    async fn record(&self, entry: ActivityEntry) {
        if let Err(e) = self.db.log_activity(&entry).await {
            tracing::warn!(action = %entry.action, error = %e, "Failed to write activity log");
        }
    }
}
