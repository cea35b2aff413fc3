//! Scheduler/dispatcher for due posts
//!
//! One call to [`Dispatcher::run_cycle`] publishes everything that is due:
//!
//! 1. load queued posts with `scheduled_at <= now`, oldest first
//! 2. group them by (user, platform), keeping that order
//! 3. run groups concurrently, up to `max_concurrency`, and never two
//!    workers for the same pair
//! 4. within a group, for each post in order: re-read it, take a rate-limit
//!    token, publish under a timeout, record the outcome
//!
//! An empty bucket stops the group; its remaining posts stay queued for a
//! later cycle. Publish errors and timeouts mark the post failed and are
//! never retried automatically.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::Clock;
use crate::db::Database;
use crate::error::{CadenceError, Result};
use crate::platforms::{with_timeout, PublishRequest, Publisher, PublisherRegistry};
use crate::rate_limiter::{Action, RateLimiter};
use crate::service::events::{Event, EventBus};
use crate::service::posts::PostService;
use crate::types::{ActivityEntry, Platform, Post, DEFAULT_TIMEZONE};

/// Outcome counts for one dispatch cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Posts that were due when the cycle started
    pub due: usize,
    pub dispatched: usize,
    pub failed: usize,
    /// Left queued because the pair's bucket was empty
    pub rate_limited: usize,
    /// Left alone: no longer due, pair busy, or no publisher
    pub skipped: usize,
}

impl CycleReport {
    fn merge(&mut self, other: CycleReport) {
        self.dispatched += other.dispatched;
        self.failed += other.failed;
        self.rate_limited += other.rate_limited;
        self.skipped += other.skipped;
    }
}

type PairKey = (String, Platform);

/// Marks a (user, platform) pair as being dispatched; released on drop
struct PairClaim {
    in_flight: Arc<Mutex<HashSet<PairKey>>>,
    key: PairKey,
}

impl Drop for PairClaim {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    db: Database,
    posts: PostService,
    publishers: Arc<PublisherRegistry>,
    limiter: Arc<RateLimiter>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    publish_timeout: Duration,
    max_concurrency: usize,
    in_flight: Arc<Mutex<HashSet<PairKey>>>,
}

impl Dispatcher {
    pub fn new(
        db: Database,
        publishers: Arc<PublisherRegistry>,
        limiter: Arc<RateLimiter>,
        events: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            posts: PostService::new(db.clone(), clock.clone(), DEFAULT_TIMEZONE),
            db,
            publishers,
            limiter,
            events,
            clock,
            publish_timeout: Duration::from_secs(30),
            max_concurrency: 4,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    fn claim(&self, key: &PairKey) -> Option<PairClaim> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.insert(key.clone()).then(|| PairClaim {
            in_flight: self.in_flight.clone(),
            key: key.clone(),
        })
    }

    /// Publish every due post once
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let due = self.db.due_posts(self.clock.now()).await?;
        let mut report = CycleReport {
            due: due.len(),
            ..Default::default()
        };

        if due.is_empty() {
            return Ok(report);
        }
        tracing::info!(count = due.len(), "Found due posts");

        let mut groups: Vec<(PairKey, Vec<Post>)> = Vec::new();
        let mut positions: HashMap<PairKey, usize> = HashMap::new();
        for post in due {
            let key = (post.user_id.clone(), post.platform);
            match positions.get(&key) {
                Some(&i) => groups[i].1.push(post),
                None => {
                    positions.insert(key.clone(), groups.len());
                    groups.push((key, vec![post]));
                }
            }
        }

        let mut workers = Vec::new();
        for (key, posts) in groups {
            match self.claim(&key) {
                Some(claim) => workers.push((claim, posts)),
                None => {
                    tracing::debug!(user_id = %key.0, platform = %key.1, "Pair already in flight, skipping");
                    for post in &posts {
                        self.skip(post, "pair already in flight");
                    }
                    report.skipped += posts.len();
                }
            }
        }

        let results: Vec<CycleReport> = stream::iter(workers)
            .map(|(claim, posts)| async move {
                let report = self.dispatch_group(&posts).await;
                drop(claim);
                report
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        for group_report in results {
            report.merge(group_report);
        }

        tracing::info!(
            due = report.due,
            dispatched = report.dispatched,
            failed = report.failed,
            rate_limited = report.rate_limited,
            skipped = report.skipped,
            "Dispatch cycle complete"
        );
        self.events.emit(Event::CycleCompleted {
            due: report.due,
            dispatched: report.dispatched,
            failed: report.failed,
            rate_limited: report.rate_limited,
            skipped: report.skipped,
        });

        Ok(report)
    }

    /// Dispatch one pair's posts in order
    async fn dispatch_group(&self, posts: &[Post]) -> CycleReport {
        let mut report = CycleReport::default();
        let Some(first) = posts.first() else {
            return report;
        };

        let publisher = match self.publishers.get(first.platform) {
            Ok(publisher) => publisher,
            Err(e) => {
                tracing::error!(platform = %first.platform, error = %e, "Posts left queued");
                for post in posts {
                    self.skip(post, "no publisher configured");
                }
                report.skipped = posts.len();
                return report;
            }
        };

        for (i, post) in posts.iter().enumerate() {
            match self.dispatch_one(publisher.as_ref(), post).await {
                Ok(Dispatch::Posted) => report.dispatched += 1,
                Ok(Dispatch::Failed) => report.failed += 1,
                Ok(Dispatch::Skipped) => report.skipped += 1,
                Ok(Dispatch::RateLimited) => {
                    for waiting in &posts[i..] {
                        self.events.emit(Event::PostRateLimited {
                            post_id: waiting.id.clone(),
                            user_id: waiting.user_id.clone(),
                            platform: waiting.platform.to_string(),
                        });
                    }
                    tracing::info!(
                        user_id = %post.user_id,
                        platform = %post.platform,
                        waiting = posts.len() - i,
                        "Rate limit reached, posts stay queued"
                    );
                    report.rate_limited += posts.len() - i;
                    break;
                }
                Err(e) => {
                    tracing::error!(post_id = %post.id, error = %e, "Dispatch aborted for pair");
                    report.skipped += posts.len() - i;
                    break;
                }
            }
        }

        report
    }

    async fn dispatch_one(&self, publisher: &dyn Publisher, post: &Post) -> Result<Dispatch> {
        // The post may have been cancelled or rescheduled since the cycle began
        let current = match self.db.get_post(&post.id).await? {
            Some(current) if current.is_due(self.clock.now()) => current,
            Some(current) => {
                self.skip(&current, &format!("no longer due (status {})", current.status));
                return Ok(Dispatch::Skipped);
            }
            None => {
                self.skip(post, "deleted");
                return Ok(Dispatch::Skipped);
            }
        };

        if !self
            .limiter
            .try_acquire(&current.user_id, current.platform, Action::Post)
        {
            return Ok(Dispatch::RateLimited);
        }

        let request = PublishRequest::from_post(&current);
        let outcome = with_timeout(self.publish_timeout, publisher.publish_post(&request)).await;

        match outcome {
            Ok(published) => {
                match self
                    .posts
                    .mark_posted(&current.id, &published.external_id, &published.permalink)
                    .await
                {
                    Ok(_) => {}
                    Err(e @ CadenceError::InvalidStateTransition { .. }) => {
                        // Published on the platform, but the user changed the post meanwhile
                        tracing::error!(
                            post_id = %current.id,
                            external_id = %published.external_id,
                            error = %e,
                            "Post published but could not be marked posted"
                        );
                        self.record(
                            ActivityEntry::error(&current.user_id, "post_publish_conflict", self.clock.now())
                                .entity("post", &current.id)
                                .details(serde_json::json!({
                                    "external_id": published.external_id,
                                    "error": e.to_string(),
                                })),
                        )
                        .await;
                        return Ok(Dispatch::Skipped);
                    }
                    Err(e) => return Err(e),
                }

                tracing::info!(
                    post_id = %current.id,
                    platform = %current.platform,
                    external_id = %published.external_id,
                    "Post published"
                );
                self.record(
                    ActivityEntry::info(&current.user_id, "post_published", self.clock.now())
                        .entity("post", &current.id)
                        .details(serde_json::json!({
                            "external_id": published.external_id,
                            "permalink": published.permalink,
                        })),
                )
                .await;
                self.events.emit(Event::PostDispatched {
                    post_id: current.id.clone(),
                    user_id: current.user_id.clone(),
                    platform: current.platform.to_string(),
                    external_id: published.external_id,
                });
                Ok(Dispatch::Posted)
            }
            Err(e) => {
                let reason = failure_reason(&e);
                match self.posts.mark_failed(&current.id, &reason).await {
                    Ok(_) => {}
                    Err(conflict @ CadenceError::InvalidStateTransition { .. }) => {
                        tracing::warn!(post_id = %current.id, error = %conflict, "Failure not recorded");
                        return Ok(Dispatch::Skipped);
                    }
                    Err(other) => return Err(other),
                }

                tracing::warn!(post_id = %current.id, platform = %current.platform, error = %reason, "Publish failed");
                self.record(
                    ActivityEntry::error(&current.user_id, "post_failed", self.clock.now())
                        .entity("post", &current.id)
                        .details(serde_json::json!({"error": reason})),
                )
                .await;
                self.events.emit(Event::PostFailed {
                    post_id: current.id.clone(),
                    user_id: current.user_id.clone(),
                    platform: current.platform.to_string(),
                    error: reason,
                });
                Ok(Dispatch::Failed)
            }
        }
    }

    fn skip(&self, post: &Post, reason: &str) {
        tracing::debug!(post_id = %post.id, reason, "Post skipped");
        self.events.emit(Event::PostSkipped {
            post_id: post.id.clone(),
            user_id: post.user_id.clone(),
            platform: post.platform.to_string(),
            reason: reason.to_string(),
        });
    }

    async fn record(&self, entry: ActivityEntry) {
        if let Err(e) = self.db.log_activity(&entry).await {
            tracing::warn!(action = %entry.action, error = %e, "Failed to write activity log");
        }
    }
}

enum Dispatch {
    Posted,
    Failed,
    Skipped,
    RateLimited,
}

/// Text stored on a failed post
fn failure_reason(error: &CadenceError) -> String {
    match error {
        CadenceError::Platform(platform_error) => platform_error.to_string(),
        other => other.to_string(),
    }
}

/// Call `tick` every `interval` until `shutdown` is set
///
/// The flag is checked at least once a second while waiting; a tick that
/// is already running is allowed to finish.
pub async fn run_until_shutdown<F, Fut>(interval: Duration, shutdown: &AtomicBool, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let slice = Duration::from_secs(1).min(interval);
    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        tick().await;

        let mut waited = Duration::ZERO;
        while waited < interval {
            if shutdown.load(Ordering::Relaxed) {
                return;
            }
            tokio::time::sleep(slice).await;
            waited += slice;
        }
    }
}
