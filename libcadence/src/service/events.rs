//! Event system for dispatch and auto-reply outcomes
//!
//! This module provides an in-process event bus so that outcomes which are
//! not errors (rate limited, suppressed, cooldown) stay distinguishable for
//! observers without being surfaced as failures.
//!
//! # Architecture
//!
//! The event bus uses `tokio::sync::broadcast` for multi-subscriber support.
//! The dispatcher and responder emit events; the daemon logs them and tests
//! assert on them.
//!
//! # Non-Blocking Behavior
//!
//! If no subscribers exist, events are dropped immediately. Subscribers can
//! lag without blocking emitters.
//!
//! # Example
//!
//! ```no_run
//! use libcadence::service::events::{EventBus, Event};
//!
//! # async fn example() {
//! let event_bus = EventBus::new(100);
//! let mut receiver = event_bus.subscribe();
//!
//! event_bus.emit(Event::PostRateLimited {
//!     post_id: "abc123".to_string(),
//!     user_id: "local".to_string(),
//!     platform: "threads".to_string(),
//! });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Event receiver type alias
pub type EventReceiver = broadcast::Receiver<Event>;

/// Event bus for distributing outcome events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    /// Create a new event bus buffering `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events emitted from now on
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: Event) {
        // send() fails only when nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Outcome events
///
/// Platforms are carried as their lowercase names so events serialize to
/// flat JSON for log shippers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A due post was published
    PostDispatched {
        post_id: String,
        user_id: String,
        platform: String,
        external_id: String,
    },

    /// A publish attempt failed or timed out; the post is now failed
    PostFailed {
        post_id: String,
        user_id: String,
        platform: String,
        error: String,
    },

    /// The pair's bucket was empty; the post stays queued
    PostRateLimited {
        post_id: String,
        user_id: String,
        platform: String,
    },

    /// A due post was not attempted this cycle
    PostSkipped {
        post_id: String,
        user_id: String,
        platform: String,
        reason: String,
    },

    /// An auto-reply was published
    ReplyFired {
        user_id: String,
        platform: String,
        rule_id: String,
        comment_id: String,
        author: String,
    },

    /// A stop word blocked every rule for the comment
    ReplySuppressed {
        user_id: String,
        platform: String,
        comment_id: String,
        word: String,
    },

    /// The author was replied to too recently
    ReplyCooldown {
        user_id: String,
        platform: String,
        comment_id: String,
        author: String,
        remaining_secs: i64,
    },

    /// The pair's reply bucket was empty
    ReplyRateLimited {
        user_id: String,
        platform: String,
        comment_id: String,
    },

    /// Publishing a fired reply failed; the cooldown stays consumed
    ReplyFailed {
        user_id: String,
        platform: String,
        comment_id: String,
        error: String,
    },

    /// One dispatch cycle finished
    CycleCompleted {
        due: usize,
        dispatched: usize,
        failed: usize,
        rate_limited: usize,
        skipped: usize,
    },
}
