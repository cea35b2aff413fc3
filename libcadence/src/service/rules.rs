//! Rule service - auto-reply rules and stop words

use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::db::Database;
use crate::error::{CadenceError, Result};
use crate::types::{ActivityEntry, AutoReplyRule, Platform, StopWord};

pub const MAX_KEYWORD_LENGTH: usize = 100;
pub const MAX_TEMPLATE_LENGTH: usize = 1000;
pub const MAX_STOP_WORD_LENGTH: usize = 100;

/// Input for creating a rule
#[derive(Debug, Clone)]
pub struct NewRule {
    pub user_id: String,
    pub platform: Platform,
    pub keyword: String,
    pub reply_template: String,
    pub is_active: bool,
}

/// Partial update; `None` fields are left as they are
#[derive(Debug, Clone, Default)]
pub struct RuleUpdate {
    pub keyword: Option<String>,
    pub reply_template: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Clone)]
pub struct RuleService {
    db: Database,
    clock: Arc<dyn Clock>,
}

fn validate_keyword(keyword: &str) -> Result<String> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return Err(CadenceError::validation("Keyword is required"));
    }
    if keyword.chars().count() > MAX_KEYWORD_LENGTH {
        return Err(CadenceError::validation(format!(
            "Keyword must be at most {} characters",
            MAX_KEYWORD_LENGTH
        )));
    }
    Ok(keyword.to_string())
}

fn validate_template(template: &str) -> Result<String> {
    if template.trim().is_empty() {
        return Err(CadenceError::validation("Reply template is required"));
    }
    if template.chars().count() > MAX_TEMPLATE_LENGTH {
        return Err(CadenceError::validation(format!(
            "Reply template must be at most {} characters",
            MAX_TEMPLATE_LENGTH
        )));
    }
    Ok(template.to_string())
}

impl RuleService {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub async fn create_rule(&self, request: NewRule) -> Result<AutoReplyRule> {
        let now = self.clock.now();
        let rule = AutoReplyRule {
            id: Uuid::new_v4().to_string(),
            user_id: request.user_id,
            platform: request.platform,
            keyword: validate_keyword(&request.keyword)?,
            reply_template: validate_template(&request.reply_template)?,
            is_active: request.is_active,
            created_at: now,
            updated_at: now,
        };

        self.db.insert_rule(&rule).await?;
        tracing::info!(rule_id = %rule.id, keyword = %rule.keyword, platform = %rule.platform, "Rule created");
        self.record(
            ActivityEntry::info(&rule.user_id, "rule_created", now)
                .entity("auto_reply_rule", &rule.id)
                .details(serde_json::json!({"keyword": rule.keyword, "platform": rule.platform})),
        )
        .await;

        Ok(rule)
    }

    pub async fn get_rule(&self, user_id: &str, rule_id: &str) -> Result<AutoReplyRule> {
        match self.db.get_rule(rule_id).await? {
            Some(rule) if rule.user_id == user_id => Ok(rule),
            _ => Err(CadenceError::NotFound(format!("rule {}", rule_id))),
        }
    }

    pub async fn update_rule(
        &self,
        user_id: &str,
        rule_id: &str,
        update: RuleUpdate,
    ) -> Result<AutoReplyRule> {
        let mut rule = self.get_rule(user_id, rule_id).await?;

        if let Some(keyword) = update.keyword {
            rule.keyword = validate_keyword(&keyword)?;
        }
        if let Some(template) = update.reply_template {
            rule.reply_template = validate_template(&template)?;
        }
        if let Some(active) = update.is_active {
            rule.is_active = active;
        }
        rule.updated_at = self.clock.now();

        if !self.db.update_rule(&rule).await? {
            return Err(CadenceError::NotFound(format!("rule {}", rule_id)));
        }
        self.record(
            ActivityEntry::info(user_id, "rule_updated", rule.updated_at)
                .entity("auto_reply_rule", &rule.id),
        )
        .await;

        Ok(rule)
    }

    pub async fn delete_rule(&self, user_id: &str, rule_id: &str) -> Result<()> {
        if !self.db.delete_rule(user_id, rule_id).await? {
            return Err(CadenceError::NotFound(format!("rule {}", rule_id)));
        }
        self.record(
            ActivityEntry::info(user_id, "rule_deleted", self.clock.now())
                .entity("auto_reply_rule", rule_id),
        )
        .await;
        Ok(())
    }

    pub async fn list_rules(
        &self,
        user_id: &str,
        platform: Option<Platform>,
    ) -> Result<Vec<AutoReplyRule>> {
        self.db.list_rules(user_id, platform).await
    }

    pub async fn add_stop_word(
        &self,
        user_id: &str,
        platform: Platform,
        word: &str,
    ) -> Result<StopWord> {
        let word = word.trim();
        if word.is_empty() {
            return Err(CadenceError::validation("Stop word is required"));
        }
        if word.chars().count() > MAX_STOP_WORD_LENGTH {
            return Err(CadenceError::validation(format!(
                "Stop word must be at most {} characters",
                MAX_STOP_WORD_LENGTH
            )));
        }

        let stop_word = StopWord {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            platform,
            word: word.to_string(),
            created_at: self.clock.now(),
        };
        self.db.insert_stop_word(&stop_word).await?;
        Ok(stop_word)
    }

    pub async fn remove_stop_word(&self, user_id: &str, platform: Platform, word: &str) -> Result<()> {
        if !self.db.delete_stop_word(user_id, platform, word.trim()).await? {
            return Err(CadenceError::NotFound(format!(
                "stop word '{}' on {}",
                word.trim(),
                platform
            )));
        }
        Ok(())
    }

    pub async fn list_stop_words(
        &self,
        user_id: &str,
        platform: Option<Platform>,
    ) -> Result<Vec<StopWord>> {
        self.db.list_stop_words(user_id, platform).await
    }

    async fn record(&self, entry: ActivityEntry) {
        if let Err(e) = self.db.log_activity(&entry).await {
            tracing::warn!(action = %entry.action, error = %e, "Failed to write activity log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    async fn service() -> RuleService {
        let db = Database::in_memory().await.unwrap();
        RuleService::new(db, Arc::new(ManualClock::new(1_000)))
    }

    fn new_rule(keyword: &str) -> NewRule {
        NewRule {
            user_id: "u1".to_string(),
            platform: Platform::LinkedIn,
            keyword: keyword.to_string(),
            reply_template: "Thanks {author}!".to_string(),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_create_rule_trims_keyword() {
        let service = service().await;
        let rule = service.create_rule(new_rule("  pricing ")).await.unwrap();
        assert_eq!(rule.keyword, "pricing");
        assert_eq!(rule.created_at, 1_000);
    }

    #[tokio::test]
    async fn test_create_rule_validation() {
        let service = service().await;

        assert!(matches!(
            service.create_rule(new_rule("   ")).await,
            Err(CadenceError::Validation(_))
        ));
        assert!(service.create_rule(new_rule(&"k".repeat(100))).await.is_ok());
        assert!(service.create_rule(new_rule(&"k".repeat(101))).await.is_err());

        let long_template = NewRule {
            reply_template: "t".repeat(1001),
            ..new_rule("price")
        };
        assert!(service.create_rule(long_template).await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_keywords_are_allowed() {
        let service = service().await;
        service.create_rule(new_rule("price")).await.unwrap();
        service.create_rule(new_rule("price")).await.unwrap();
        assert_eq!(service.list_rules("u1", None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_and_delete_are_owner_scoped() {
        let service = service().await;
        let rule = service.create_rule(new_rule("price")).await.unwrap();

        let err = service
            .update_rule("u2", &rule.id, RuleUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CadenceError::NotFound(_)));

        let updated = service
            .update_rule(
                "u1",
                &rule.id,
                RuleUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!updated.is_active);
        assert_eq!(updated.keyword, "price");

        assert!(service.delete_rule("u2", &rule.id).await.is_err());
        service.delete_rule("u1", &rule.id).await.unwrap();
        assert!(service.get_rule("u1", &rule.id).await.is_err());
    }

    #[tokio::test]
    async fn test_stop_word_management() {
        let service = service().await;
        service.add_stop_word("u1", Platform::Threads, " Spam ").await.unwrap();

        let duplicate = service.add_stop_word("u1", Platform::Threads, "spam").await;
        assert!(matches!(duplicate, Err(CadenceError::Validation(_))));
        assert!(service.add_stop_word("u1", Platform::Threads, "").await.is_err());

        let words = service.list_stop_words("u1", Some(Platform::Threads)).await.unwrap();
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].word, "Spam");

        service.remove_stop_word("u1", Platform::Threads, "SPAM").await.unwrap();
        assert!(matches!(
            service.remove_stop_word("u1", Platform::Threads, "spam").await,
            Err(CadenceError::NotFound(_))
        ));
    }
}
