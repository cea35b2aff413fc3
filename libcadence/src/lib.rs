//! Cadence - post scheduling and auto-reply engine
//!
//! This library holds everything the `cadence-*` tools share: the post
//! lifecycle, the dispatcher that publishes due posts under per-platform
//! rate limits, the keyword auto-reply matcher and responder, storage,
//! configuration and logging.

pub mod clock;
pub mod config;
pub mod cooldown;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod matcher;
pub mod platforms;
pub mod rate_limiter;
pub mod responder;
pub mod scheduler;
pub mod scheduling;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use db::{Database, PostFilter};
pub use error::{CadenceError, Result};
pub use matcher::MatchResult;
pub use responder::ReplyOutcome;
pub use scheduler::CycleReport;
pub use service::CadenceService;
pub use types::{AutoReplyRule, InboundComment, MediaKind, Platform, Post, PostStatus, StopWord};
