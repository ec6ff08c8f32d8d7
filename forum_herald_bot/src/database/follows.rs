use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use teloxide::types::UserId;

use super::{user_from_db, user_to_db, Database, Error};
use crate::types::TopicRef;

impl Database {
    /// Make sure the author has a row, refreshing their stored name if it does.
    pub async fn ensure_author_exists(&self, author: UserId, name: &str) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO authors(author_id, author_name, created_at)
            VALUES (?, ?, ?)
        ON CONFLICT(author_id) DO
            UPDATE SET author_name=excluded.author_name;",
        )
        .bind(user_to_db(author))
        .bind(name)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_author_name(&self, author: UserId) -> Result<Option<String>, Error> {
        sqlx::query_scalar("SELECT author_name FROM authors WHERE author_id=?;")
            .bind(user_to_db(author))
            .fetch_optional(&self.pool)
            .await
    }

    /// Returns `true` if the user started following the author, `false` if they already did.
    pub async fn add_follower(
        &self,
        user: UserId,
        author: UserId,
        author_name: &str,
    ) -> Result<bool, Error> {
        self.ensure_author_exists(author, author_name).await?;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO followers(user_id, author_id, followed_at) VALUES (?, ?, ?);",
        )
        .bind(user_to_db(user))
        .bind(user_to_db(author))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns `true` if the user stopped following the author, `false` if they didn't to begin with.
    pub async fn remove_follower(&self, user: UserId, author: UserId) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM followers WHERE user_id=? AND author_id=?;")
            .bind(user_to_db(user))
            .bind(user_to_db(author))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_followers_for_author(&self, author: UserId) -> Result<Vec<UserId>, Error> {
        sqlx::query("SELECT user_id FROM followers WHERE author_id=? ORDER BY id;")
            .bind(user_to_db(author))
            .map(|row: SqliteRow| user_from_db(row.get("user_id")))
            .fetch_all(&self.pool)
            .await
    }

    pub async fn get_followed_authors(&self, user: UserId) -> Result<Vec<UserId>, Error> {
        sqlx::query("SELECT author_id FROM followers WHERE user_id=? ORDER BY id;")
            .bind(user_to_db(user))
            .map(|row: SqliteRow| user_from_db(row.get("author_id")))
            .fetch_all(&self.pool)
            .await
    }

    /// Followed authors of this user along with their stored names, oldest follow first.
    pub async fn get_followed_authors_with_names(
        &self,
        user: UserId,
    ) -> Result<Vec<(UserId, String)>, Error> {
        sqlx::query(
            "SELECT f.author_id, a.author_name
            FROM followers f
            JOIN authors a ON f.author_id = a.author_id
            WHERE f.user_id=?
            ORDER BY f.id;",
        )
        .bind(user_to_db(user))
        .map(|row: SqliteRow| {
            (
                user_from_db(row.get("author_id")),
                row.get::<String, _>("author_name"),
            )
        })
        .fetch_all(&self.pool)
        .await
    }

    /// Record a topic made by an author. Does nothing if it was recorded already.
    pub async fn add_post(
        &self,
        topic: TopicRef,
        author: UserId,
        created_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        sqlx::query(
            "INSERT OR IGNORE INTO author_posts(chat_id, thread_id, author_id, created_at)
            VALUES (?, ?, ?, ?);",
        )
        .bind(topic.chat_id.0)
        .bind(topic.thread_id.0)
        .bind(user_to_db(author))
        .bind(created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns when the user last looked at their follows, and sets that to now.
    /// Someone who never looked gets the Unix epoch.
    pub async fn get_and_update_last_view(&self, user: UserId) -> Result<DateTime<Utc>, Error> {
        let last_view: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT last_viewed_at FROM user_last_view WHERE user_id=?;")
                .bind(user_to_db(user))
                .fetch_optional(&self.pool)
                .await?;
        let last_view = last_view.unwrap_or_default();

        sqlx::query(
            "INSERT INTO user_last_view(user_id, last_viewed_at, previous_viewed_at)
            VALUES (?, ?, ?)
        ON CONFLICT(user_id) DO
            UPDATE SET last_viewed_at=excluded.last_viewed_at,
                previous_viewed_at=excluded.previous_viewed_at;",
        )
        .bind(user_to_db(user))
        .bind(Utc::now())
        .bind(last_view)
        .execute(&self.pool)
        .await?;

        Ok(last_view)
    }

    /// The view time that [`Self::get_and_update_last_view`] returned most recently,
    /// without touching anything. Used to keep "new" counts stable while paging.
    pub async fn get_previous_view(&self, user: UserId) -> Result<DateTime<Utc>, Error> {
        let previous: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT previous_viewed_at FROM user_last_view WHERE user_id=?;")
                .bind(user_to_db(user))
                .fetch_optional(&self.pool)
                .await?;
        Ok(previous.unwrap_or_default())
    }

    /// Count topics made by each of these authors strictly after `since`.
    /// Authors with no new topics are absent from the map.
    pub async fn get_new_post_counts(
        &self,
        authors: &[UserId],
        since: DateTime<Utc>,
    ) -> Result<HashMap<UserId, i64>, Error> {
        if authors.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; authors.len()].join(",");
        let sql = format!(
            "SELECT author_id, COUNT(*) AS new_posts
            FROM author_posts
            WHERE author_id IN ({placeholders}) AND julianday(created_at) > julianday(?)
            GROUP BY author_id;"
        );

        let mut query = sqlx::query(&sql);
        for author in authors {
            query = query.bind(user_to_db(*author));
        }

        query
            .bind(since)
            .map(|row: SqliteRow| {
                (
                    user_from_db(row.get("author_id")),
                    row.get::<i64, _>("new_posts"),
                )
            })
            .fetch_all(&self.pool)
            .await
            .map(|rows| rows.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::Duration;
    use teloxide::types::{ChatId, MessageId};

    use super::*;

    const USER: UserId = UserId(1);
    const AUTHOR: UserId = UserId(2);

    #[tokio::test]
    async fn follow_twice_then_unfollow_twice() {
        let db = Database::new_in_memory().await.unwrap();
        assert!(db.add_follower(USER, AUTHOR, "author").await.unwrap());
        assert!(!db.add_follower(USER, AUTHOR, "author").await.unwrap());
        assert_eq!(db.get_followers_for_author(AUTHOR).await.unwrap(), vec![USER]);
        assert_eq!(db.get_followed_authors(USER).await.unwrap(), vec![AUTHOR]);

        assert!(db.remove_follower(USER, AUTHOR).await.unwrap());
        assert!(!db.remove_follower(USER, AUTHOR).await.unwrap());
        assert!(db.get_followers_for_author(AUTHOR).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn author_names_are_refreshed() {
        let db = Database::new_in_memory().await.unwrap();
        db.add_follower(USER, AUTHOR, "old name").await.unwrap();
        db.ensure_author_exists(AUTHOR, "new name").await.unwrap();
        assert_eq!(
            db.get_followed_authors_with_names(USER).await.unwrap(),
            vec![(AUTHOR, "new name".to_string())]
        );
        assert_eq!(
            db.get_author_name(AUTHOR).await.unwrap().as_deref(),
            Some("new name")
        );
        assert_eq!(db.get_author_name(USER).await.unwrap(), None);
    }

    #[tokio::test]
    async fn new_post_counts_respect_the_cutoff() {
        let db = Database::new_in_memory().await.unwrap();
        db.ensure_author_exists(AUTHOR, "author").await.unwrap();
        let now = Utc::now();
        let chat = ChatId(-1001);
        db.add_post(TopicRef::new(chat, MessageId(10)), AUTHOR, now - Duration::hours(2))
            .await
            .unwrap();
        db.add_post(TopicRef::new(chat, MessageId(11)), AUTHOR, now)
            .await
            .unwrap();
        // Recording the same topic twice changes nothing.
        db.add_post(TopicRef::new(chat, MessageId(11)), AUTHOR, now)
            .await
            .unwrap();

        let counts = db
            .get_new_post_counts(&[AUTHOR, UserId(3)], now - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(counts.get(&AUTHOR), Some(&1));
        assert_eq!(counts.get(&UserId(3)), None);

        let counts = db
            .get_new_post_counts(&[AUTHOR], DateTime::<Utc>::default())
            .await
            .unwrap();
        assert_eq!(counts.get(&AUTHOR), Some(&2));

        assert!(db.get_new_post_counts(&[], now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn last_view_rolls_over() {
        let db = Database::new_in_memory().await.unwrap();
        let first = db.get_and_update_last_view(USER).await.unwrap();
        assert_eq!(first, DateTime::<Utc>::default());
        assert_eq!(db.get_previous_view(USER).await.unwrap(), first);

        let second = db.get_and_update_last_view(USER).await.unwrap();
        assert!(second > first);
        assert_eq!(db.get_previous_view(USER).await.unwrap(), second);
    }
}
