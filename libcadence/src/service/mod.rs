//! Service layer for Cadence
//!
//! This module provides the API the command-line tools are built on, so
//! each binary stays a thin argument-parsing shell.
//!
//! # Architecture
//!
//! `CadenceService` is the facade. It owns the shared resources (database,
//! clock, rate limiter, cooldown tracker, publisher registry, event bus) and
//! hands out the specialized services built on them:
//!
//! - `PostService`: post lifecycle operations
//! - `RuleService`: auto-reply rules and stop words
//! - `RuleMatcher`: comment evaluation
//! - `Dispatcher`: publishing due posts
//! - `Responder`: sending auto-replies and polling comment feeds
//! - `EventBus`: outcome event distribution
//!
//! # Example
//!
//! ```no_run
//! use libcadence::service::CadenceService;
//! use libcadence::service::posts::NewPost;
//! use libcadence::Platform;
//!
//! # async fn example() -> libcadence::Result<()> {
//! let service = CadenceService::new().await?;
//!
//! let post = service
//!     .posts()
//!     .create(NewPost {
//!         scheduled_at: Some("tomorrow 9am".to_string()),
//!         ..NewPost::text("local", Platform::LinkedIn, "Launch day!")
//!     })
//!     .await?;
//! println!("Queued {}", post.id);
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod posts;
pub mod rules;

use std::sync::Arc;

use self::events::{EventBus, EventReceiver};
use self::posts::PostService;
use self::rules::RuleService;
use crate::clock::{Clock, SystemClock};
use crate::cooldown::CooldownTracker;
use crate::matcher::RuleMatcher;
use crate::platforms::webhook::WebhookPublisher;
use crate::platforms::{Publisher, PublisherRegistry};
use crate::rate_limiter::RateLimiter;
use crate::responder::Responder;
use crate::scheduler::Dispatcher;
use crate::{Config, Database, Result};

/// Main service facade
///
/// All sub-services share the same database pool, clock, limiter and
/// cooldown tracker, so a dispatcher and a responder obtained from one
/// facade enforce limits together.
pub struct CadenceService {
    config: Config,
    db: Database,
    posts: PostService,
    rules: RuleService,
    matcher: RuleMatcher,
    dispatcher: Dispatcher,
    responder: Responder,
    event_bus: EventBus,
}

impl CadenceService {
    /// Create a service from the configuration at the default location
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    /// Create a service with the system clock and the configured gateway
    ///
    /// Without a `[publisher]` section the registry is empty: posts stay
    /// queued and no comments are polled.
    pub async fn from_config(config: Config) -> Result<Self> {
        let db = Database::new(&config.database_path()).await?;

        let mut registry = PublisherRegistry::new();
        match &config.publisher {
            Some(publisher_config) => {
                for publisher in WebhookPublisher::from_config(publisher_config)? {
                    let publisher = Arc::new(publisher);
                    registry.register_feed(publisher.platform(), publisher.clone());
                    registry.register(publisher);
                }
            }
            None => tracing::debug!("No publisher configured"),
        }

        Ok(Self::with_components(config, db, registry, Arc::new(SystemClock)))
    }

    /// Assemble a service from already-built parts
    pub fn with_components(
        config: Config,
        db: Database,
        registry: PublisherRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let event_bus = EventBus::default();
        let publishers = Arc::new(registry);
        let limiter = Arc::new(RateLimiter::from_config(&config.scheduling, clock.clone()));
        let cooldowns = Arc::new(CooldownTracker::new(config.auto_reply.cooldown_secs));

        let posts = PostService::new(db.clone(), clock.clone(), &config.defaults.timezone);
        let rules = RuleService::new(db.clone(), clock.clone());
        let matcher = RuleMatcher::new(db.clone(), cooldowns);

        let dispatcher = Dispatcher::new(
            db.clone(),
            publishers.clone(),
            limiter.clone(),
            event_bus.clone(),
            clock.clone(),
        )
        .with_publish_timeout(config.scheduling.publish_timeout())
        .with_max_concurrency(config.scheduling.max_concurrency);

        let responder = Responder::new(
            db.clone(),
            matcher.clone(),
            publishers,
            limiter,
            event_bus.clone(),
            clock,
        )
        .with_publish_timeout(config.scheduling.publish_timeout());

        Self {
            config,
            db,
            posts,
            rules,
            matcher,
            dispatcher,
            responder,
            event_bus,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Access the database directly
    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn posts(&self) -> &PostService {
        &self.posts
    }

    pub fn rules(&self) -> &RuleService {
        &self.rules
    }

    pub fn matcher(&self) -> &RuleMatcher {
        &self.matcher
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn responder(&self) -> &Responder {
        &self.responder
    }

    /// Subscribe to outcome events from the dispatcher and responder
    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::platforms::mock::MockPublisher;
    use crate::service::events::Event;
    use crate::service::posts::NewPost;
    use crate::types::{Platform, PostStatus};

    #[tokio::test]
    async fn test_from_config_without_publisher_keeps_posts_queued() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.database.path = temp.path().join("cadence.db").to_string_lossy().to_string();

        let service = CadenceService::from_config(config).await.unwrap();
        let post = service
            .posts()
            .create(NewPost::text("local", Platform::Threads, "hello"))
            .await
            .unwrap();

        let report = service.dispatcher().run_cycle().await.unwrap();
        assert_eq!(report.skipped, 1);
        let stored = service.posts().get("local", &post.id).await.unwrap();
        assert_eq!(stored.status, PostStatus::Queued);
    }

    #[tokio::test]
    async fn test_shared_event_bus() {
        let db = Database::in_memory().await.unwrap();
        let mut registry = PublisherRegistry::new();
        registry.register(Arc::new(MockPublisher::success(Platform::LinkedIn)));

        let service = CadenceService::with_components(
            Config::default(),
            db,
            registry,
            Arc::new(ManualClock::new(1_750_000_000)),
        );
        let mut events = service.subscribe();

        service
            .posts()
            .create(NewPost::text("local", Platform::LinkedIn, "hello"))
            .await
            .unwrap();
        service.dispatcher().run_cycle().await.unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            Event::PostDispatched { .. }
        ));
    }
}
