//! Rate limiting for dispatched posts and auto-replies
//!
//! One token bucket per (user, platform, action). A bucket holds up to the
//! hourly limit and is refilled to capacity once a full window has passed
//! since its last refill, so a pair never exceeds N actions in the window
//! that starts with its first action.
//!
//! Buckets live in memory behind a single mutex; check-and-take is atomic,
//! so overlapping dispatch cycles cannot spend the same token twice.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::config::SchedulingConfig;
use crate::types::Platform;

/// Length of a rate-limit window in seconds
pub const WINDOW_SECS: i64 = 3600;

/// What a token is spent on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Post,
    Reply,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Post => write!(f, "post"),
            Action::Reply => write!(f, "reply"),
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    refilled_at: i64,
}

type BucketKey = (String, Platform, Action);

pub struct RateLimiter {
    limits: HashMap<(Platform, Action), u32>,
    buckets: Mutex<HashMap<BucketKey, Bucket>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// A limiter with no limits; every acquire succeeds until one is set
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            limits: HashMap::new(),
            buckets: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Per-platform post and reply limits from configuration
    pub fn from_config(config: &SchedulingConfig, clock: Arc<dyn Clock>) -> Self {
        Platform::ALL.iter().fold(Self::new(clock), |limiter, &platform| {
            let limits = config.limits_for(platform);
            limiter
                .with_limit(platform, Action::Post, limits.posts_per_hour)
                .with_limit(platform, Action::Reply, limits.replies_per_hour)
        })
    }

    pub fn with_limit(mut self, platform: Platform, action: Action, per_hour: u32) -> Self {
        self.limits.insert((platform, action), per_hour);
        self
    }

    /// Hourly limit for a platform and action, `None` when unlimited
    pub fn limit(&self, platform: Platform, action: Action) -> Option<u32> {
        self.limits.get(&(platform, action)).copied()
    }

    /// Take one token if available
    ///
    /// Returns false, without side effects, when the bucket is empty.
    pub fn try_acquire(&self, user_id: &str, platform: Platform, action: Action) -> bool {
        let Some(capacity) = self.limit(platform, action) else {
            return true;
        };

        let now = self.clock.now();
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let bucket = buckets
            .entry((user_id.to_string(), platform, action))
            .or_insert(Bucket {
                tokens: capacity,
                refilled_at: now,
            });

        refill(bucket, capacity, now);

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            tracing::debug!(
                user_id,
                %platform,
                %action,
                remaining = bucket.tokens,
                "Rate limit token taken"
            );
            true
        } else {
            false
        }
    }

    /// Return a token taken by [`try_acquire`](Self::try_acquire) that was not used
    pub fn refund(&self, user_id: &str, platform: Platform, action: Action) {
        let Some(capacity) = self.limit(platform, action) else {
            return;
        };

        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(bucket) = buckets.get_mut(&(user_id.to_string(), platform, action)) {
            bucket.tokens = (bucket.tokens + 1).min(capacity);
        }
    }

    /// Tokens left right now, `None` when unlimited
    pub fn remaining(&self, user_id: &str, platform: Platform, action: Action) -> Option<u32> {
        let capacity = self.limit(platform, action)?;
        let now = self.clock.now();
        let buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());

        Some(match buckets.get(&(user_id.to_string(), platform, action)) {
            Some(bucket) if now - bucket.refilled_at < WINDOW_SECS => bucket.tokens,
            _ => capacity,
        })
    }

    /// Drop buckets that would be full on next use
    pub fn prune(&self) {
        let now = self.clock.now();
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        buckets.retain(|_, bucket| now - bucket.refilled_at < WINDOW_SECS);
    }
}

fn refill(bucket: &mut Bucket, capacity: u32, now: i64) {
    if now - bucket.refilled_at >= WINDOW_SECS {
        bucket.tokens = capacity;
        bucket.refilled_at = now;
    }
}
