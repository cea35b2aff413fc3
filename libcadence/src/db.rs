//! Database operations for Cadence

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CadenceError, DbError, Result};
use crate::types::{
    ActivityEntry, AutoReplyRule, CommentOffset, MediaKind, Platform, Post, PostStatus, StopWord,
};

const POST_COLUMNS: &str = "id, user_id, platform, content, media_kind, media_path, scheduled_at, \
     timezone, status, external_id, permalink, error_message, created_at, updated_at";

const RULE_COLUMNS: &str =
    "id, user_id, platform, keyword, reply_template, is_active, created_at, updated_at";

/// Filters for listing a user's posts
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub status: Option<PostStatus>,
    pub platform: Option<Platform>,
    pub limit: Option<usize>,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `db_path` and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(DbError::SqlxError)?;

        Self::migrate(pool).await
    }

    /// Private in-memory database
    ///
    /// Every connection to `:memory:` is a separate database, so the pool
    /// holds exactly one connection for its whole lifetime.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(DbError::SqlxError)?;

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(DbError::SqlxError)?;

        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    // ---- posts ----

    pub async fn insert_post(&self, post: &Post) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO posts (id, user_id, platform, content, media_kind, media_path,
                               scheduled_at, timezone, status, external_id, permalink,
                               error_message, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.user_id)
        .bind(post.platform.as_str())
        .bind(&post.content)
        .bind(post.media_kind.as_str())
        .bind(&post.media_path)
        .bind(post.scheduled_at)
        .bind(&post.timezone)
        .bind(post.status.as_str())
        .bind(&post.external_id)
        .bind(&post.permalink)
        .bind(&post.error_message)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS))
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.as_ref().map(post_from_row).transpose()
    }

    /// Write every mutable field of `post`, but only if the stored row is
    /// still in `expected` status
    ///
    /// Returns false when the row was missing or had moved to another status.
    pub async fn save_post(&self, post: &Post, expected: PostStatus) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET content = ?, media_kind = ?, media_path = ?, scheduled_at = ?, timezone = ?,
                status = ?, external_id = ?, permalink = ?, error_message = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(&post.content)
        .bind(post.media_kind.as_str())
        .bind(&post.media_path)
        .bind(post.scheduled_at)
        .bind(&post.timezone)
        .bind(post.status.as_str())
        .bind(&post.external_id)
        .bind(&post.permalink)
        .bind(&post.error_message)
        .bind(post.updated_at)
        .bind(&post.id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete a post if it is still in `expected` status
    pub async fn delete_post(&self, post_id: &str, expected: PostStatus) -> Result<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ? AND status = ?")
            .bind(post_id)
            .bind(expected.as_str())
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// A user's posts, newest first
    pub async fn list_posts(&self, user_id: &str, filter: &PostFilter) -> Result<Vec<Post>> {
        let mut where_clauses = vec!["user_id = ?"];
        if filter.status.is_some() {
            where_clauses.push("status = ?");
        }
        if filter.platform.is_some() {
            where_clauses.push("platform = ?");
        }

        let query_str = format!(
            "SELECT {} FROM posts WHERE {} ORDER BY created_at DESC, rowid DESC LIMIT ?",
            POST_COLUMNS,
            where_clauses.join(" AND ")
        );

        let mut query = sqlx::query(&query_str).bind(user_id);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(platform) = filter.platform {
            query = query.bind(platform.as_str());
        }
        // SQLite treats a negative LIMIT as no limit
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        query = query.bind(limit);

        let rows = query.fetch_all(&self.pool).await.map_err(DbError::SqlxError)?;
        rows.iter().map(post_from_row).collect()
    }

    /// Queued posts whose scheduled time has arrived, across all users
    ///
    /// Ordered by scheduled time, then creation time, then insertion order.
    pub async fn due_posts(&self, now: i64) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM posts
            WHERE status = 'queued' AND scheduled_at <= ?
            ORDER BY scheduled_at ASC, created_at ASC, rowid ASC
            "#,
            POST_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(post_from_row).collect()
    }

    /// Post counts per status for one user; statuses with no posts are omitted
    pub async fn count_posts_by_status(&self, user_id: &str) -> Result<Vec<(PostStatus, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS total FROM posts
            WHERE user_id = ?
            GROUP BY status
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter()
            .map(|r| {
                let status = parse_column::<PostStatus>(r.get("status"), "status")?;
                Ok((status, r.get::<i64, _>("total")))
            })
            .collect()
    }

    // ---- auto-reply rules ----

    pub async fn insert_rule(&self, rule: &AutoReplyRule) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO auto_reply_rules (id, user_id, platform, keyword, reply_template,
                                          is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&rule.id)
        .bind(&rule.user_id)
        .bind(rule.platform.as_str())
        .bind(&rule.keyword)
        .bind(&rule.reply_template)
        .bind(rule.is_active)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_rule(&self, rule_id: &str) -> Result<Option<AutoReplyRule>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM auto_reply_rules WHERE id = ?",
            RULE_COLUMNS
        ))
        .bind(rule_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(rule_from_row).transpose()
    }

    /// Update the editable fields of a rule; false when the rule is gone
    pub async fn update_rule(&self, rule: &AutoReplyRule) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE auto_reply_rules
            SET keyword = ?, reply_template = ?, is_active = ?, updated_at = ?
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(&rule.keyword)
        .bind(&rule.reply_template)
        .bind(rule.is_active)
        .bind(rule.updated_at)
        .bind(&rule.id)
        .bind(&rule.user_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn delete_rule(&self, user_id: &str, rule_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM auto_reply_rules WHERE id = ? AND user_id = ?")
            .bind(rule_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// All of a user's rules, oldest first
    pub async fn list_rules(
        &self,
        user_id: &str,
        platform: Option<Platform>,
    ) -> Result<Vec<AutoReplyRule>> {
        let rows = match platform {
            Some(platform) => {
                sqlx::query(&format!(
                    "SELECT {} FROM auto_reply_rules WHERE user_id = ? AND platform = ? \
                     ORDER BY created_at ASC, rowid ASC",
                    RULE_COLUMNS
                ))
                .bind(user_id)
                .bind(platform.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM auto_reply_rules WHERE user_id = ? \
                     ORDER BY platform ASC, created_at ASC, rowid ASC",
                    RULE_COLUMNS
                ))
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(DbError::SqlxError)?;

        rows.iter().map(rule_from_row).collect()
    }

    /// Active rules for one (user, platform) in creation order
    pub async fn active_rules(&self, user_id: &str, platform: Platform) -> Result<Vec<AutoReplyRule>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM auto_reply_rules \
             WHERE user_id = ? AND platform = ? AND is_active = 1 \
             ORDER BY created_at ASC, rowid ASC",
            RULE_COLUMNS
        ))
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(rule_from_row).collect()
    }

    /// Every (user, platform) pair with at least one active rule
    pub async fn reply_targets(&self) -> Result<Vec<(String, Platform)>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT user_id, platform FROM auto_reply_rules
            WHERE is_active = 1
            ORDER BY user_id, platform
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter()
            .map(|r| {
                let platform = parse_column::<Platform>(r.get("platform"), "platform")?;
                Ok((r.get("user_id"), platform))
            })
            .collect()
    }

    // ---- stop words ----

    /// Store a stop word; a duplicate (ignoring case) is a validation error
    pub async fn insert_stop_word(&self, word: &StopWord) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO stop_words (id, user_id, platform, word, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&word.id)
        .bind(&word.user_id)
        .bind(word.platform.as_str())
        .bind(&word.word)
        .bind(word.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(CadenceError::Validation(
                format!("Stop word '{}' already exists for {}", word.word, word.platform),
            )),
            Err(e) => Err(DbError::SqlxError(e).into()),
        }
    }

    /// Remove a stop word, matching case-insensitively
    pub async fn delete_stop_word(&self, user_id: &str, platform: Platform, word: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM stop_words WHERE user_id = ? AND platform = ? AND word = ? COLLATE NOCASE",
        )
        .bind(user_id)
        .bind(platform.as_str())
        .bind(word)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_stop_words(
        &self,
        user_id: &str,
        platform: Option<Platform>,
    ) -> Result<Vec<StopWord>> {
        let rows = match platform {
            Some(platform) => {
                sqlx::query(
                    "SELECT id, user_id, platform, word, created_at FROM stop_words \
                     WHERE user_id = ? AND platform = ? ORDER BY word COLLATE NOCASE",
                )
                .bind(user_id)
                .bind(platform.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT id, user_id, platform, word, created_at FROM stop_words \
                     WHERE user_id = ? ORDER BY platform, word COLLATE NOCASE",
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(DbError::SqlxError)?;

        rows.iter()
            .map(|r| {
                Ok(StopWord {
                    id: r.get("id"),
                    user_id: r.get("user_id"),
                    platform: parse_column(r.get("platform"), "platform")?,
                    word: r.get("word"),
                    created_at: r.get("created_at"),
                })
            })
            .collect()
    }

    // ---- comment offsets ----

    pub async fn get_comment_offset(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Option<CommentOffset>> {
        let row = sqlx::query(
            "SELECT user_id, platform, last_checked_at, handled_ids, updated_at FROM comment_offsets \
             WHERE user_id = ? AND platform = ?",
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(|r| {
            let handled: String = r.get("handled_ids");
            Ok(CommentOffset {
                user_id: r.get("user_id"),
                platform: parse_column(r.get("platform"), "platform")?,
                last_checked_at: r.get("last_checked_at"),
                handled_ids: serde_json::from_str(&handled).map_err(|e| {
                    DbError::InvalidRow(format!("unexpected handled_ids '{}': {}", handled, e))
                })?,
                updated_at: r.get("updated_at"),
            })
        })
        .transpose()
    }

    /// Move the offset forward to `checked_at`; an older value is ignored
    pub async fn advance_comment_offset(
        &self,
        user_id: &str,
        platform: Platform,
        checked_at: i64,
        now: i64,
    ) -> Result<()> {
        self.save_comment_offset(user_id, platform, checked_at, &[], now)
            .await
    }

    /// Store the offset together with the ids already handled past it
    ///
    /// The ids are replaced only when `checked_at` is not older than the
    /// stored offset, so a stale write can neither move the offset back nor
    /// clobber newer ids.
    pub async fn save_comment_offset(
        &self,
        user_id: &str,
        platform: Platform,
        checked_at: i64,
        handled_ids: &[String],
        now: i64,
    ) -> Result<()> {
        let handled = serde_json::to_string(handled_ids)
            .map_err(|e| DbError::InvalidRow(format!("handled_ids: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO comment_offsets (user_id, platform, last_checked_at, handled_ids, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id, platform) DO UPDATE SET
                handled_ids = CASE
                    WHEN excluded.last_checked_at >= last_checked_at THEN excluded.handled_ids
                    ELSE handled_ids
                END,
                last_checked_at = MAX(last_checked_at, excluded.last_checked_at),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .bind(checked_at)
        .bind(handled)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    // ---- activity log ----

    pub async fn log_activity(&self, entry: &ActivityEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO activity_log (user_id, level, action, entity_type, entity_id, details, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.user_id)
        .bind(&entry.level)
        .bind(&entry.action)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(entry.details.as_ref().map(|d| d.to_string()))
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// A user's most recent activity, newest first
    pub async fn recent_activity(&self, user_id: &str, limit: usize) -> Result<Vec<ActivityEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, level, action, entity_type, entity_id, details, created_at
            FROM activity_log
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| ActivityEntry {
                id: Some(r.get("id")),
                user_id: r.get("user_id"),
                level: r.get("level"),
                action: r.get("action"),
                entity_type: r.get("entity_type"),
                entity_id: r.get("entity_id"),
                details: r
                    .get::<Option<String>, _>("details")
                    .and_then(|d| serde_json::from_str(&d).ok()),
                created_at: r.get("created_at"),
            })
            .collect())
    }
}

fn parse_column<T: FromStr>(value: String, column: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| DbError::InvalidRow(format!("unexpected {} '{}'", column, value)).into())
}

fn post_from_row(r: &SqliteRow) -> Result<Post> {
    Ok(Post {
        id: r.get("id"),
        user_id: r.get("user_id"),
        platform: parse_column(r.get("platform"), "platform")?,
        content: r.get("content"),
        media_kind: parse_column::<MediaKind>(r.get("media_kind"), "media_kind")?,
        media_path: r.get("media_path"),
        scheduled_at: r.get("scheduled_at"),
        timezone: r.get("timezone"),
        status: parse_column(r.get("status"), "status")?,
        external_id: r.get("external_id"),
        permalink: r.get("permalink"),
        error_message: r.get("error_message"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

fn rule_from_row(r: &SqliteRow) -> Result<AutoReplyRule> {
    Ok(AutoReplyRule {
        id: r.get("id"),
        user_id: r.get("user_id"),
        platform: parse_column(r.get("platform"), "platform")?,
        keyword: r.get("keyword"),
        reply_template: r.get("reply_template"),
        is_active: r.get("is_active"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn queued_post(user: &str, platform: Platform, scheduled_at: i64, created_at: i64) -> Post {
        let mut post = Post::new(user, platform, "Hello".to_string(), created_at);
        post.status = PostStatus::Queued;
        post.scheduled_at = scheduled_at;
        post
    }

    fn rule(user: &str, keyword: &str, created_at: i64) -> AutoReplyRule {
        AutoReplyRule {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.to_string(),
            platform: Platform::LinkedIn,
            keyword: keyword.to_string(),
            reply_template: "Thanks {author}!".to_string(),
            is_active: true,
            created_at,
            updated_at: created_at,
        }
    }

    fn stop_word(user: &str, word: &str) -> StopWord {
        StopWord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.to_string(),
            platform: Platform::LinkedIn,
            word: word.to_string(),
            created_at: 100,
        }
    }

    #[tokio::test]
    async fn test_file_database_creates_parent_directories() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("dir").join("cadence.db");

        let db = Database::new(path.to_str().unwrap()).await.unwrap();
        let post = queued_post("u1", Platform::LinkedIn, 10, 1);
        db.insert_post(&post).await.unwrap();

        assert!(path.exists());
        assert_eq!(db.get_post(&post.id).await.unwrap(), Some(post));
    }

    #[tokio::test]
    async fn test_insert_and_get_post_round_trips_all_fields() {
        let db = Database::in_memory().await.unwrap();
        let mut post = Post::new("u1", Platform::Threads, "Picture day".to_string(), 500);
        post.media_kind = MediaKind::Image;
        post.media_path = Some("media/a.png".to_string());
        post.timezone = "Europe/Berlin".to_string();

        db.insert_post(&post).await.unwrap();
        let loaded = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(loaded, post);
    }

    #[tokio::test]
    async fn test_get_missing_post_returns_none() {
        let db = Database::in_memory().await.unwrap();
        assert!(db.get_post("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_post_is_guarded_by_expected_status() {
        let db = Database::in_memory().await.unwrap();
        let mut post = queued_post("u1", Platform::LinkedIn, 10, 1);
        db.insert_post(&post).await.unwrap();

        post.status = PostStatus::Cancelled;
        assert!(db.save_post(&post, PostStatus::Queued).await.unwrap());

        // A second writer still expecting queued loses
        let mut stale = post.clone();
        stale.status = PostStatus::Posted;
        stale.external_id = Some("ext".to_string());
        stale.permalink = Some("https://example.com".to_string());
        assert!(!db.save_post(&stale, PostStatus::Queued).await.unwrap());

        let stored = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Cancelled);
        assert!(stored.external_id.is_none());
    }

    #[tokio::test]
    async fn test_due_posts_ordering_and_filtering() {
        let db = Database::in_memory().await.unwrap();

        let later = queued_post("u1", Platform::LinkedIn, 300, 1);
        let tie_newer = queued_post("u1", Platform::LinkedIn, 200, 20);
        let tie_older = queued_post("u1", Platform::LinkedIn, 200, 10);
        let future = queued_post("u1", Platform::LinkedIn, 10_000, 1);
        let mut draft = queued_post("u1", Platform::LinkedIn, 100, 1);
        draft.status = PostStatus::Draft;

        for post in [&later, &tie_newer, &tie_older, &future, &draft] {
            db.insert_post(post).await.unwrap();
        }

        let due = db.due_posts(1_000).await.unwrap();
        let ids: Vec<&str> = due.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec![tie_older.id.as_str(), tie_newer.id.as_str(), later.id.as_str()]);
    }

    #[tokio::test]
    async fn test_due_posts_identical_timestamps_use_insertion_order() {
        let db = Database::in_memory().await.unwrap();
        let first = queued_post("u1", Platform::Threads, 50, 5);
        let second = queued_post("u1", Platform::Threads, 50, 5);
        db.insert_post(&first).await.unwrap();
        db.insert_post(&second).await.unwrap();

        let due = db.due_posts(50).await.unwrap();
        assert_eq!(due[0].id, first.id);
        assert_eq!(due[1].id, second.id);
    }

    #[tokio::test]
    async fn test_list_posts_filters_and_scopes_by_user() {
        let db = Database::in_memory().await.unwrap();
        let a = queued_post("u1", Platform::LinkedIn, 10, 1);
        let b = queued_post("u1", Platform::Threads, 10, 2);
        let mut c = queued_post("u1", Platform::Threads, 10, 3);
        c.status = PostStatus::Draft;
        let other = queued_post("u2", Platform::Threads, 10, 4);
        for post in [&a, &b, &c, &other] {
            db.insert_post(post).await.unwrap();
        }

        let all = db.list_posts("u1", &PostFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, c.id, "newest first");

        let threads_queued = db
            .list_posts(
                "u1",
                &PostFilter {
                    status: Some(PostStatus::Queued),
                    platform: Some(Platform::Threads),
                    limit: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(threads_queued.len(), 1);
        assert_eq!(threads_queued[0].id, b.id);

        let limited = db
            .list_posts("u1", &PostFilter { limit: Some(2), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_count_posts_by_status() {
        let db = Database::in_memory().await.unwrap();
        db.insert_post(&queued_post("u1", Platform::LinkedIn, 1, 1)).await.unwrap();
        db.insert_post(&queued_post("u1", Platform::LinkedIn, 1, 1)).await.unwrap();
        let mut failed = queued_post("u1", Platform::LinkedIn, 1, 1);
        failed.status = PostStatus::Failed;
        failed.error_message = Some("boom".to_string());
        db.insert_post(&failed).await.unwrap();

        let mut counts = db.count_posts_by_status("u1").await.unwrap();
        counts.sort_by_key(|(status, _)| status.as_str());
        assert_eq!(counts, vec![(PostStatus::Failed, 1), (PostStatus::Queued, 2)]);
    }

    #[tokio::test]
    async fn test_delete_post_guarded() {
        let db = Database::in_memory().await.unwrap();
        let post = queued_post("u1", Platform::LinkedIn, 1, 1);
        db.insert_post(&post).await.unwrap();

        assert!(!db.delete_post(&post.id, PostStatus::Draft).await.unwrap());
        assert!(db.delete_post(&post.id, PostStatus::Queued).await.unwrap());
        assert!(db.get_post(&post.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rules_crud_and_active_ordering() {
        let db = Database::in_memory().await.unwrap();
        let newer = rule("u1", "pricing", 200);
        let older = rule("u1", "price", 100);
        let mut inactive = rule("u1", "hello", 50);
        inactive.is_active = false;
        for r in [&newer, &older, &inactive] {
            db.insert_rule(r).await.unwrap();
        }

        let active = db.active_rules("u1", Platform::LinkedIn).await.unwrap();
        let keywords: Vec<&str> = active.iter().map(|r| r.keyword.as_str()).collect();
        assert_eq!(keywords, vec!["price", "pricing"]);

        let mut edited = older.clone();
        edited.is_active = false;
        edited.updated_at = 300;
        assert!(db.update_rule(&edited).await.unwrap());
        assert_eq!(db.get_rule(&older.id).await.unwrap(), Some(edited));

        assert!(!db.delete_rule("u2", &newer.id).await.unwrap(), "other users cannot delete");
        assert!(db.delete_rule("u1", &newer.id).await.unwrap());
        assert_eq!(db.list_rules("u1", None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reply_targets_only_include_active_rules() {
        let db = Database::in_memory().await.unwrap();
        db.insert_rule(&rule("u1", "price", 1)).await.unwrap();
        db.insert_rule(&rule("u1", "demo", 2)).await.unwrap();
        let mut off = rule("u2", "price", 3);
        off.is_active = false;
        db.insert_rule(&off).await.unwrap();

        let targets = db.reply_targets().await.unwrap();
        assert_eq!(targets, vec![("u1".to_string(), Platform::LinkedIn)]);
    }

    #[tokio::test]
    async fn test_stop_words_unique_ignoring_case() {
        let db = Database::in_memory().await.unwrap();
        db.insert_stop_word(&stop_word("u1", "spam")).await.unwrap();

        let err = db.insert_stop_word(&stop_word("u1", "SPAM")).await.unwrap_err();
        assert!(matches!(err, CadenceError::Validation(_)));

        // Same word for another user is fine
        db.insert_stop_word(&stop_word("u2", "spam")).await.unwrap();

        assert!(db.delete_stop_word("u1", Platform::LinkedIn, "Spam").await.unwrap());
        assert!(db.list_stop_words("u1", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_comment_offset_never_moves_backwards() {
        let db = Database::in_memory().await.unwrap();
        assert!(db.get_comment_offset("u1", Platform::Threads).await.unwrap().is_none());

        db.advance_comment_offset("u1", Platform::Threads, 500, 600).await.unwrap();
        db.advance_comment_offset("u1", Platform::Threads, 400, 700).await.unwrap();

        let offset = db.get_comment_offset("u1", Platform::Threads).await.unwrap().unwrap();
        assert_eq!(offset.last_checked_at, 500);
        assert_eq!(offset.updated_at, 700);

        db.advance_comment_offset("u1", Platform::Threads, 900, 950).await.unwrap();
        let offset = db.get_comment_offset("u1", Platform::Threads).await.unwrap().unwrap();
        assert_eq!(offset.last_checked_at, 900);
        assert!(offset.handled_ids.is_empty());
    }

    #[tokio::test]
    async fn test_handled_ids_follow_the_newest_offset() {
        let db = Database::in_memory().await.unwrap();
        let ids = vec!["c1".to_string(), "c2".to_string()];

        db.save_comment_offset("u1", Platform::LinkedIn, 500, &ids, 600)
            .await
            .unwrap();
        let offset = db.get_comment_offset("u1", Platform::LinkedIn).await.unwrap().unwrap();
        assert_eq!(offset.handled_ids, ids);

        // Stale write keeps both offset and ids
        db.save_comment_offset("u1", Platform::LinkedIn, 400, &[], 700)
            .await
            .unwrap();
        let offset = db.get_comment_offset("u1", Platform::LinkedIn).await.unwrap().unwrap();
        assert_eq!(offset.last_checked_at, 500);
        assert_eq!(offset.handled_ids, ids);

        db.advance_comment_offset("u1", Platform::LinkedIn, 501, 800).await.unwrap();
        let offset = db.get_comment_offset("u1", Platform::LinkedIn).await.unwrap().unwrap();
        assert_eq!(offset.last_checked_at, 501);
        assert!(offset.handled_ids.is_empty());
    }

    #[tokio::test]
    async fn test_activity_log_round_trip() {
        let db = Database::in_memory().await.unwrap();
        db.log_activity(&ActivityEntry::info("u1", "post_created", 10).entity("post", "p1"))
            .await
            .unwrap();
        db.log_activity(
            &ActivityEntry::error("u1", "post_failed", 20)
                .entity("post", "p1")
                .details(serde_json::json!({"error": "timeout"})),
        )
        .await
        .unwrap();
        db.log_activity(&ActivityEntry::info("u2", "post_created", 30)).await.unwrap();

        let entries = db.recent_activity("u1", 10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "post_failed");
        assert_eq!(entries[0].details.as_ref().unwrap()["error"], "timeout");
        assert_eq!(entries[1].entity_id.as_deref(), Some("p1"));
    }
}
