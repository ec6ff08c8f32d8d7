use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use teloxide::types::{ChatId, UserId};

use super::{chat_from_db, message_from_db, user_from_db, user_to_db, Database, Error};
use crate::types::{ActiveThread, FavoriteThread, TopicRef};

fn topic_ref_from_row(row: &SqliteRow) -> TopicRef {
    TopicRef::new(
        chat_from_db(row.get("chat_id")),
        message_from_db(row.get("thread_id")),
    )
}

// Favorites.
impl Database {
    /// Returns `true` if the topic wasn't a favorite yet.
    pub async fn add_favorite(
        &self,
        user: UserId,
        topic: TopicRef,
        title: &str,
    ) -> Result<bool, Error> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO thread_favorites(user_id, chat_id, thread_id, title, favorited_at)
            VALUES (?, ?, ?, ?, ?);",
        )
        .bind(user_to_db(user))
        .bind(topic.chat_id.0)
        .bind(topic.thread_id.0)
        .bind(title)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns `true` if the topic was a favorite.
    pub async fn remove_favorite(&self, user: UserId, topic: TopicRef) -> Result<bool, Error> {
        let result = sqlx::query(
            "DELETE FROM thread_favorites WHERE user_id=? AND chat_id=? AND thread_id=?;",
        )
        .bind(user_to_db(user))
        .bind(topic.chat_id.0)
        .bind(topic.thread_id.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// One page of a user's favorites, newest first. `page` starts at 1.
    pub async fn get_user_favorites(
        &self,
        user: UserId,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<FavoriteThread>, Error> {
        let offset = page.saturating_sub(1) * page_size;
        sqlx::query(
            "SELECT chat_id, thread_id, title, favorited_at FROM thread_favorites
            WHERE user_id=?
            ORDER BY favorited_at DESC, id DESC
            LIMIT ? OFFSET ?;",
        )
        .bind(user_to_db(user))
        .bind(i64::try_from(page_size).unwrap_or(i64::MAX))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .map(|row: SqliteRow| FavoriteThread {
            topic: topic_ref_from_row(&row),
            title: row.get("title"),
            favorited_at: row.get::<DateTime<Utc>, _>("favorited_at"),
        })
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get_favorites_count(&self, user: UserId) -> Result<usize, Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM thread_favorites WHERE user_id=?;")
            .bind(user_to_db(user))
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Favorite all of these topics at once, skipping ones that already are.
    /// Returns how many were newly added.
    pub async fn batch_add_favorites(
        &self,
        user: UserId,
        topics: &[ActiveThread],
    ) -> Result<u64, Error> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let mut added = 0;

        for thread in topics {
            added += sqlx::query(
                "INSERT OR IGNORE INTO thread_favorites(user_id, chat_id, thread_id, title,
                    favorited_at)
                VALUES (?, ?, ?, ?, ?);",
            )
            .bind(user_to_db(user))
            .bind(thread.topic.chat_id.0)
            .bind(thread.topic.thread_id.0)
            .bind(&thread.title)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;
        Ok(added)
    }

    /// Unfavorite all of these topics at once. Returns how many were removed.
    pub async fn batch_remove_favorites(
        &self,
        user: UserId,
        topics: &[TopicRef],
    ) -> Result<u64, Error> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;

        for topic in topics {
            removed += sqlx::query(
                "DELETE FROM thread_favorites WHERE user_id=? AND chat_id=? AND thread_id=?;",
            )
            .bind(user_to_db(user))
            .bind(topic.chat_id.0)
            .bind(topic.thread_id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;
        Ok(removed)
    }
}

// Active topic members.
impl Database {
    /// Note that the user just posted in this topic.
    pub async fn record_active_member(
        &self,
        topic: TopicRef,
        user: UserId,
        seen_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO active_thread_members(chat_id, thread_id, user_id, last_seen_at)
            VALUES (?, ?, ?, ?)
        ON CONFLICT(chat_id, thread_id, user_id) DO
            UPDATE SET last_seen_at=excluded.last_seen_at;",
        )
        .bind(topic.chat_id.0)
        .bind(topic.thread_id.0)
        .bind(user_to_db(user))
        .bind(seen_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Topics the user has been active in, most recent first, optionally limited to
    /// one chat. Closed topics are left out.
    pub async fn get_user_active_threads(
        &self,
        user: UserId,
        chat: Option<ChatId>,
    ) -> Result<Vec<ActiveThread>, Error> {
        sqlx::query(
            "SELECT m.chat_id, m.thread_id, t.title
            FROM active_thread_members m
            JOIN topics t ON t.chat_id=m.chat_id AND t.thread_id=m.thread_id
            WHERE m.user_id=?1 AND t.closed=0 AND (?2 IS NULL OR m.chat_id=?2)
            ORDER BY m.last_seen_at DESC;",
        )
        .bind(user_to_db(user))
        .bind(chat.map(|x| x.0))
        .map(|row: SqliteRow| ActiveThread {
            topic: topic_ref_from_row(&row),
            title: row.get("title"),
        })
        .fetch_all(&self.pool)
        .await
    }

    /// Like [`Self::get_user_active_threads`], minus the ones already favorited.
    pub async fn get_unfavorited_active_threads(
        &self,
        user: UserId,
    ) -> Result<Vec<ActiveThread>, Error> {
        sqlx::query(
            "SELECT m.chat_id, m.thread_id, t.title
            FROM active_thread_members m
            JOIN topics t ON t.chat_id=m.chat_id AND t.thread_id=m.thread_id
            WHERE m.user_id=? AND t.closed=0
                AND NOT EXISTS (SELECT 1 FROM thread_favorites f
                    WHERE f.user_id=m.user_id AND f.chat_id=m.chat_id
                        AND f.thread_id=m.thread_id)
            ORDER BY m.last_seen_at DESC;",
        )
        .bind(user_to_db(user))
        .map(|row: SqliteRow| ActiveThread {
            topic: topic_ref_from_row(&row),
            title: row.get("title"),
        })
        .fetch_all(&self.pool)
        .await
    }

    /// Forget memberships in this chat not refreshed since `cutoff`.
    pub async fn prune_inactive_members(
        &self,
        chat: ChatId,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, Error> {
        sqlx::query(
            "DELETE FROM active_thread_members
            WHERE chat_id=? AND julianday(last_seen_at) < julianday(?);",
        )
        .bind(chat.0)
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map(|x| x.rows_affected())
    }

    /// Forget memberships of closed topics in this chat.
    pub async fn prune_closed_topic_members(&self, chat: ChatId) -> Result<u64, Error> {
        sqlx::query(
            "DELETE FROM active_thread_members
            WHERE chat_id=?1 AND thread_id IN
                (SELECT thread_id FROM topics WHERE chat_id=?1 AND closed=1);",
        )
        .bind(chat.0)
        .execute(&self.pool)
        .await
        .map(|x| x.rows_affected())
    }

    /// Distinct users with at least one membership in this chat.
    pub async fn get_active_members_for_chat(&self, chat: ChatId) -> Result<Vec<UserId>, Error> {
        sqlx::query(
            "SELECT DISTINCT user_id FROM active_thread_members WHERE chat_id=? ORDER BY user_id;",
        )
        .bind(chat.0)
        .map(|row: SqliteRow| user_from_db(row.get("user_id")))
        .fetch_all(&self.pool)
        .await
    }

    /// Drop every membership of the user in this chat, for when they left it.
    pub async fn remove_member_from_chat(&self, chat: ChatId, user: UserId) -> Result<u64, Error> {
        sqlx::query("DELETE FROM active_thread_members WHERE chat_id=? AND user_id=?;")
            .bind(chat.0)
            .bind(user_to_db(user))
            .execute(&self.pool)
            .await
            .map(|x| x.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::Duration;
    use teloxide::types::MessageId;

    use super::*;

    const USER: UserId = UserId(1);
    const CHAT: ChatId = ChatId(-1001);

    fn topic(id: i32) -> TopicRef {
        TopicRef::new(CHAT, MessageId(id))
    }

    async fn db_with_topics(count: i32) -> Database {
        let db = Database::new_in_memory().await.unwrap();
        for id in 1..=count {
            db.upsert_topic(topic(id), None, &format!("Topic {id}"), Utc::now())
                .await
                .unwrap();
        }
        db
    }

    #[tokio::test]
    async fn favorites_paging() {
        let db = db_with_topics(0).await;
        for id in 1..=5 {
            assert!(db.add_favorite(USER, topic(id), &format!("Topic {id}")).await.unwrap());
        }
        assert!(!db.add_favorite(USER, topic(1), "Topic 1").await.unwrap());
        assert_eq!(db.get_favorites_count(USER).await.unwrap(), 5);

        let first = db.get_user_favorites(USER, 1, 2).await.unwrap();
        let third = db.get_user_favorites(USER, 3, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(third.len(), 1);
        // Newest first.
        assert_eq!(first[0].topic, topic(5));
        assert_eq!(third[0].topic, topic(1));

        assert!(db.remove_favorite(USER, topic(3)).await.unwrap());
        assert!(!db.remove_favorite(USER, topic(3)).await.unwrap());
        assert_eq!(db.get_favorites_count(UserId(2)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn batch_favorites() {
        let db = db_with_topics(3).await;
        for id in 1..=3 {
            db.record_active_member(topic(id), USER, Utc::now())
                .await
                .unwrap();
        }
        db.add_favorite(USER, topic(2), "Topic 2").await.unwrap();

        let unfavorited = db.get_unfavorited_active_threads(USER).await.unwrap();
        assert_eq!(unfavorited.len(), 2);

        let all = db.get_user_active_threads(USER, None).await.unwrap();
        assert_eq!(db.batch_add_favorites(USER, &all).await.unwrap(), 2);
        assert!(db.get_unfavorited_active_threads(USER).await.unwrap().is_empty());

        assert_eq!(
            db.batch_remove_favorites(USER, &[topic(1), topic(2), topic(9)])
                .await
                .unwrap(),
            2
        );
        assert_eq!(db.get_favorites_count(USER).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn active_member_pruning() {
        let db = db_with_topics(3).await;
        let now = Utc::now();
        db.record_active_member(topic(1), USER, now - Duration::days(30))
            .await
            .unwrap();
        db.record_active_member(topic(2), USER, now).await.unwrap();
        db.record_active_member(topic(3), UserId(2), now)
            .await
            .unwrap();
        db.set_topic_closed(topic(3), true).await.unwrap();

        // Closed topics are hidden even before pruning.
        assert!(db
            .get_user_active_threads(UserId(2), Some(CHAT))
            .await
            .unwrap()
            .is_empty());

        assert_eq!(
            db.prune_inactive_members(CHAT, now - Duration::days(14))
                .await
                .unwrap(),
            1
        );
        assert_eq!(db.prune_closed_topic_members(CHAT).await.unwrap(), 1);

        assert_eq!(db.get_active_members_for_chat(CHAT).await.unwrap(), vec![USER]);
        let active = db.get_user_active_threads(USER, Some(CHAT)).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].topic, topic(2));
        assert!(db
            .get_user_active_threads(USER, Some(ChatId(-5)))
            .await
            .unwrap()
            .is_empty());

        assert_eq!(db.remove_member_from_chat(CHAT, USER).await.unwrap(), 1);
        assert!(db.get_active_members_for_chat(CHAT).await.unwrap().is_empty());
    }
}
