//! Auto-reply rule matching
//!
//! Decides what should happen for one inbound comment, in order:
//!
//! 1. any stop word present → [`MatchResult::Suppressed`]
//! 2. no active rule keyword present → [`MatchResult::NoMatch`]
//! 3. the author was replied to within the cooldown window → [`MatchResult::Cooldown`]
//! 4. otherwise → [`MatchResult::Fire`] with the rendered reply
//!
//! Matching never records a cooldown; that happens when the reply is
//! dispatched (see [`crate::responder`]).

use std::cmp::Reverse;
use std::sync::Arc;

use crate::cooldown::CooldownTracker;
use crate::db::Database;
use crate::error::Result;
use crate::types::{AutoReplyRule, Platform, StopWord};

/// A rule that fired and the reply text it produced
#[derive(Debug, Clone, PartialEq)]
pub struct FiredReply {
    pub rule: AutoReplyRule,
    pub reply: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Suppressed { word: String },
    NoMatch,
    Cooldown { rule_id: String, remaining_secs: i64 },
    Fire(FiredReply),
}

impl MatchResult {
    /// Short label used in logs and events
    pub fn label(&self) -> &'static str {
        match self {
            MatchResult::Suppressed { .. } => "suppressed",
            MatchResult::NoMatch => "no_match",
            MatchResult::Cooldown { .. } => "cooldown",
            MatchResult::Fire(_) => "fire",
        }
    }
}

/// First stop word contained in `text`, ignoring case
pub fn find_stop_word<'a>(text: &str, stop_words: &'a [StopWord]) -> Option<&'a StopWord> {
    let folded = text.to_lowercase();
    stop_words.iter().find(|sw| {
        let word = sw.word.trim().to_lowercase();
        !word.is_empty() && folded.contains(&word)
    })
}

/// Pick the rule to fire for `text`
///
/// Only active rules whose keyword occurs in the text (ignoring case) are
/// candidates. The longest keyword wins; ties go to the earliest
/// `created_at`, then to the earlier position in `rules`.
pub fn select_rule<'a>(text: &str, rules: &'a [AutoReplyRule]) -> Option<&'a AutoReplyRule> {
    let folded = text.to_lowercase();
    rules
        .iter()
        .enumerate()
        .filter(|(_, rule)| {
            let keyword = rule.keyword.trim().to_lowercase();
            rule.is_active && !keyword.is_empty() && folded.contains(&keyword)
        })
        .min_by_key(|(position, rule)| {
            (
                Reverse(rule.keyword.trim().chars().count()),
                rule.created_at,
                *position,
            )
        })
        .map(|(_, rule)| rule)
}

/// Substitute placeholders in a reply template
///
/// `{author}` and `{{author}}` become the author handle without a leading
/// `@`; `{keyword}` and `{platform}` are also recognized.
pub fn render_template(template: &str, author: &str, keyword: &str, platform: Platform) -> String {
    let handle = author.trim().trim_start_matches('@');
    template
        .replace("{{author}}", handle)
        .replace("{author}", handle)
        .replace("{keyword}", keyword.trim())
        .replace("{platform}", platform.as_str())
}

/// Evaluate a comment against already-loaded stop words and rules
pub fn evaluate_with(
    cooldowns: &CooldownTracker,
    comment: &CommentContext<'_>,
    stop_words: &[StopWord],
    rules: &[AutoReplyRule],
) -> MatchResult {
    if let Some(stop_word) = find_stop_word(comment.text, stop_words) {
        return MatchResult::Suppressed {
            word: stop_word.word.clone(),
        };
    }

    let Some(rule) = select_rule(comment.text, rules) else {
        return MatchResult::NoMatch;
    };

    if let Some(remaining_secs) =
        cooldowns.remaining(comment.user_id, comment.platform, comment.author, comment.timestamp)
    {
        return MatchResult::Cooldown {
            rule_id: rule.id.clone(),
            remaining_secs,
        };
    }

    MatchResult::Fire(FiredReply {
        reply: render_template(&rule.reply_template, comment.author, &rule.keyword, comment.platform),
        rule: rule.clone(),
    })
}

/// The parts of an inbound comment the matcher looks at
#[derive(Debug, Clone, Copy)]
pub struct CommentContext<'a> {
    pub user_id: &'a str,
    pub platform: Platform,
    pub text: &'a str,
    pub author: &'a str,
    pub timestamp: i64,
}

/// Matcher backed by stored rules and stop words
#[derive(Clone)]
pub struct RuleMatcher {
    db: Database,
    cooldowns: Arc<CooldownTracker>,
}

impl RuleMatcher {
    pub fn new(db: Database, cooldowns: Arc<CooldownTracker>) -> Self {
        Self { db, cooldowns }
    }

    pub fn cooldowns(&self) -> &Arc<CooldownTracker> {
        &self.cooldowns
    }

    /// Decide the outcome for one comment; the cooldown is checked as of
    /// the comment's `timestamp`
    pub async fn evaluate(
        &self,
        user_id: &str,
        platform: Platform,
        text: &str,
        author: &str,
        timestamp: i64,
    ) -> Result<MatchResult> {
        let stop_words = self.db.list_stop_words(user_id, Some(platform)).await?;
        let rules = self.db.active_rules(user_id, platform).await?;

        let comment = CommentContext {
            user_id,
            platform,
            text,
            author,
            timestamp,
        };
        let result = evaluate_with(&self.cooldowns, &comment, &stop_words, &rules);

        tracing::debug!(
            user_id,
            %platform,
            author,
            outcome = result.label(),
            "Evaluated comment"
        );

        Ok(result)
    }
}
