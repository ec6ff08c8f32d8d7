mod competitions;
mod follows;
mod members;
mod subscriptions;
mod topics;

use std::{path::Path, str::FromStr, time::Duration};

pub use sqlx::Error;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Executor, Sqlite,
};
use teloxide::types::{ChatId, MessageId, UserId};

type Pool = sqlx::Pool<Sqlite>;

/// The one and only database. Backed by a pool of exactly one connection, so every
/// statement is serialized; SQLite wouldn't let two writers through anyway.
pub struct Database {
    pool: Pool,
}

impl Database {
    /// Open (creating if needed) the database file at `path`.
    pub async fn new(path: &str) -> Result<Database, Error> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{path}"))?
            .create_if_missing(true)
            .pragma("cache_size", "-32768");
        Self::connect_with(options).await
    }

    /// A fresh database that lives in memory. Used by tests.
    #[allow(unused)]
    pub async fn new_in_memory() -> Result<Database, Error> {
        Self::connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?).await
    }

    async fn connect_with(options: SqliteConnectOptions) -> Result<Database, Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            // An in-memory database vanishes with its connection, so never recycle it.
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(
                options
                    .foreign_keys(true)
                    .busy_timeout(Duration::from_secs(600)),
            )
            .await?;

        create_tables(&pool).await?;

        let db = Database { pool };
        db.idle_cleanup().await;
        Ok(db)
    }

    pub async fn idle_cleanup(&self) {
        let _ = sqlx::query("ANALYZE;").execute(&self.pool).await;
    }

    /// Write a consistent snapshot of the whole database into a new file at `path`.
    /// Fails if `path` already exists.
    pub async fn backup_to(&self, path: &Path) -> Result<(), Error> {
        sqlx::query("VACUUM INTO ?;")
            .bind(path.to_string_lossy().into_owned())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

async fn create_tables(pool: &Pool) -> Result<(), Error> {
    // AUTHORS: users who created at least one tracked topic or were followed.
    pool.execute(sqlx::query(
        "CREATE TABLE IF NOT EXISTS authors (
            author_id INTEGER PRIMARY KEY NOT NULL,
            author_name TEXT NOT NULL,
            created_at TEXT NOT NULL
        ) STRICT;",
    ))
    .await?;

    pool.execute(sqlx::query(
        "CREATE TABLE IF NOT EXISTS followers (
            id INTEGER PRIMARY KEY NOT NULL,
            user_id INTEGER NOT NULL,
            author_id INTEGER NOT NULL REFERENCES authors(author_id) ON DELETE CASCADE,
            followed_at TEXT NOT NULL,
            UNIQUE(user_id, author_id)
        ) STRICT;",
    ))
    .await?;

    // TOPICS: every forum topic seen being created or edited.
    // author_id is NULL for topics we only learned about from later messages.
    pool.execute(sqlx::query(
        "CREATE TABLE IF NOT EXISTS topics (
            chat_id INTEGER NOT NULL,
            thread_id INTEGER NOT NULL,
            author_id INTEGER NULL,
            title TEXT NOT NULL,
            created_at TEXT NOT NULL,
            closed INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY(chat_id, thread_id)
        ) STRICT;",
    ))
    .await?;

    pool.execute(sqlx::query(
        "CREATE TABLE IF NOT EXISTS author_posts (
            chat_id INTEGER NOT NULL,
            thread_id INTEGER NOT NULL,
            author_id INTEGER NOT NULL REFERENCES authors(author_id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            PRIMARY KEY(chat_id, thread_id)
        ) STRICT;",
    ))
    .await?;

    // previous_viewed_at is what the profile page counts "new" against while paging.
    pool.execute(sqlx::query(
        "CREATE TABLE IF NOT EXISTS user_last_view (
            user_id INTEGER PRIMARY KEY NOT NULL,
            last_viewed_at TEXT NOT NULL,
            previous_viewed_at TEXT NOT NULL
        ) STRICT;",
    ))
    .await?;

    // Submission ID lists are JSON arrays of strings.
    pool.execute(sqlx::query(
        "CREATE TABLE IF NOT EXISTS competitions (
            chat_id INTEGER NOT NULL,
            message_id INTEGER NOT NULL,
            thread_id INTEGER NULL,
            title TEXT NOT NULL,
            last_submission_ids TEXT NOT NULL,
            pending_submission_ids TEXT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY(chat_id, message_id)
        ) STRICT;",
    ))
    .await?;

    pool.execute(sqlx::query(
        "CREATE TABLE IF NOT EXISTS competition_subscriptions (
            id INTEGER PRIMARY KEY NOT NULL,
            user_id INTEGER NOT NULL,
            chat_id INTEGER NOT NULL,
            message_id INTEGER NOT NULL,
            subscribed_at TEXT NOT NULL,
            UNIQUE(user_id, chat_id, message_id),
            FOREIGN KEY(chat_id, message_id)
                REFERENCES competitions(chat_id, message_id) ON DELETE CASCADE
        ) STRICT;",
    ))
    .await?;

    // Keyword lists are JSON arrays of lowercase strings.
    pool.execute(sqlx::query(
        "CREATE TABLE IF NOT EXISTS keyword_subscriptions (
            user_id INTEGER NOT NULL,
            chat_id INTEGER NOT NULL,
            is_subscribed INTEGER NOT NULL,
            followed_keywords TEXT NOT NULL,
            blocked_keywords TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY(user_id, chat_id)
        ) STRICT;",
    ))
    .await?;

    pool.execute(sqlx::query(
        "CREATE TABLE IF NOT EXISTS thread_favorites (
            id INTEGER PRIMARY KEY NOT NULL,
            user_id INTEGER NOT NULL,
            chat_id INTEGER NOT NULL,
            thread_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            favorited_at TEXT NOT NULL,
            UNIQUE(user_id, chat_id, thread_id)
        ) STRICT;",
    ))
    .await?;

    pool.execute(sqlx::query(
        "CREATE TABLE IF NOT EXISTS active_thread_members (
            chat_id INTEGER NOT NULL,
            thread_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            last_seen_at TEXT NOT NULL,
            PRIMARY KEY(chat_id, thread_id, user_id)
        ) STRICT;",
    ))
    .await?;

    for index in [
        "CREATE INDEX IF NOT EXISTS followers_author ON followers(author_id);",
        "CREATE INDEX IF NOT EXISTS author_posts_author ON author_posts(author_id);",
        "CREATE INDEX IF NOT EXISTS keyword_subscriptions_chat ON keyword_subscriptions(chat_id);",
        concat!(
            "CREATE INDEX IF NOT EXISTS competition_subscriptions_message ON ",
            "competition_subscriptions(chat_id, message_id);"
        ),
        "CREATE INDEX IF NOT EXISTS active_thread_members_user ON active_thread_members(user_id);",
    ] {
        pool.execute(sqlx::query(index)).await?;
    }

    Ok(())
}

// SQLite has no unsigned integers, and Telegram user IDs fit in 52 bits anyway.

#[allow(clippy::cast_possible_wrap)]
fn user_to_db(user: UserId) -> i64 {
    user.0 as i64
}

#[allow(clippy::cast_sign_loss)]
fn user_from_db(user: i64) -> UserId {
    UserId(user as u64)
}

fn chat_from_db(chat: i64) -> ChatId {
    ChatId(chat)
}

fn message_from_db(message: i32) -> MessageId {
    MessageId(message)
}

fn encode_list(list: &[String]) -> String {
    serde_json::to_string(list).unwrap_or_else(|_| "[]".to_string())
}

fn decode_list(text: &str) -> Result<Vec<String>, Error> {
    serde_json::from_str(text).map_err(|e| Error::Decode(Box::new(e)))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn creating_tables_twice_is_fine() {
        let db = Database::new_in_memory().await.unwrap();
        create_tables(&db.pool).await.unwrap();
    }

    #[tokio::test]
    async fn backup_writes_a_readable_copy() {
        let dir = tempfile::tempdir().unwrap();
        // VACUUM INTO quietly writes nothing for in-memory databases.
        let source = dir.path().join("source.sqlite");
        let db = Database::new(source.to_str().unwrap()).await.unwrap();
        db.ensure_author_exists(UserId(7), "seven").await.unwrap();

        let path = dir.path().join("copy.sqlite");
        db.backup_to(&path).await.unwrap();

        let copy = Database::new(path.to_str().unwrap()).await.unwrap();
        let name: String = sqlx::query_scalar("SELECT author_name FROM authors;")
            .fetch_one(&copy.pool)
            .await
            .unwrap();
        assert_eq!(name, "seven");

        // Refuses to overwrite.
        assert!(db.backup_to(&path).await.is_err());
    }

    #[test]
    fn list_encoding() {
        let list = vec!["a".to_string(), "b c".to_string()];
        assert_eq!(decode_list(&encode_list(&list)).unwrap(), list);
        assert!(decode_list("not json").is_err());
    }
}
