use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use teloxide::types::UserId;

use super::{chat_from_db, message_from_db, user_from_db, user_to_db, Database, Error};
use crate::types::{Topic, TopicRef};

fn topic_from_row(row: SqliteRow) -> Topic {
    Topic {
        topic: TopicRef::new(
            chat_from_db(row.get("chat_id")),
            message_from_db(row.get("thread_id")),
        ),
        author_id: row.get::<Option<i64>, _>("author_id").map(user_from_db),
        title: row.get("title"),
        closed: row.get::<i64, _>("closed") != 0,
    }
}

impl Database {
    /// Record a freshly created topic. If it was already known (say, from a message
    /// posted in it), its author and title get filled in.
    pub async fn upsert_topic(
        &self,
        topic: TopicRef,
        author: Option<UserId>,
        title: &str,
        created_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO topics(chat_id, thread_id, author_id, title, created_at)
            VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(chat_id, thread_id) DO
            UPDATE SET author_id=COALESCE(excluded.author_id, author_id),
                title=excluded.title;",
        )
        .bind(topic.chat_id.0)
        .bind(topic.thread_id.0)
        .bind(author.map(user_to_db))
        .bind(title)
        .bind(created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remember a topic we only learned about from a message inside it, unless we
    /// know it already. The title is a placeholder until the topic gets edited.
    pub async fn ensure_topic_exists(&self, topic: TopicRef, title: &str) -> Result<(), Error> {
        sqlx::query(
            "INSERT OR IGNORE INTO topics(chat_id, thread_id, author_id, title, created_at)
            VALUES (?, ?, NULL, ?, ?);",
        )
        .bind(topic.chat_id.0)
        .bind(topic.thread_id.0)
        .bind(title)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_topic(&self, topic: TopicRef) -> Result<Option<Topic>, Error> {
        sqlx::query(
            "SELECT chat_id, thread_id, author_id, title, closed
            FROM topics WHERE chat_id=? AND thread_id=?;",
        )
        .bind(topic.chat_id.0)
        .bind(topic.thread_id.0)
        .map(topic_from_row)
        .fetch_optional(&self.pool)
        .await
    }

    /// Rename a topic, along with every favorite that points at it.
    pub async fn rename_topic(&self, topic: TopicRef, title: &str) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE topics SET title=? WHERE chat_id=? AND thread_id=?;")
            .bind(title)
            .bind(topic.chat_id.0)
            .bind(topic.thread_id.0)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE thread_favorites SET title=? WHERE chat_id=? AND thread_id=?;")
            .bind(title)
            .bind(topic.chat_id.0)
            .bind(topic.thread_id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await
    }

    pub async fn set_topic_closed(&self, topic: TopicRef, closed: bool) -> Result<(), Error> {
        sqlx::query("UPDATE topics SET closed=? WHERE chat_id=? AND thread_id=?;")
            .bind(i64::from(closed))
            .bind(topic.chat_id.0)
            .bind(topic.thread_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
