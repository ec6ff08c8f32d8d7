use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};
use teloxide::types::{ChatId, MessageId, UserId};

use super::{
    chat_from_db, decode_list, encode_list, message_from_db, user_from_db, user_to_db, Database,
    Error,
};
use crate::types::Competition;

fn competition_from_row(row: SqliteRow) -> Result<Competition, Error> {
    Ok(Competition {
        chat_id: chat_from_db(row.get("chat_id")),
        message_id: message_from_db(row.get("message_id")),
        thread_id: row.get::<Option<i32>, _>("thread_id").map(message_from_db),
        title: row.get("title"),
        last_submission_ids: decode_list(row.get("last_submission_ids"))?,
        pending_submission_ids: row
            .get::<Option<&str>, _>("pending_submission_ids")
            .map(decode_list)
            .transpose()?,
    })
}

const SELECT_COMPETITIONS: &str = "SELECT chat_id, message_id, thread_id, title,
    last_submission_ids, pending_submission_ids FROM competitions";

impl Database {
    /// Insert the competition with the given starting submissions, unless it's
    /// already tracked, in which case nothing changes.
    pub async fn ensure_competition_exists(
        &self,
        chat: ChatId,
        message: MessageId,
        thread: Option<MessageId>,
        title: &str,
        initial_ids: &[String],
    ) -> Result<(), Error> {
        let now = Utc::now();
        sqlx::query(
            "INSERT OR IGNORE INTO competitions(chat_id, message_id, thread_id, title,
                last_submission_ids, pending_submission_ids, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, NULL, ?, ?);",
        )
        .bind(chat.0)
        .bind(message.0)
        .bind(thread.map(|x| x.0))
        .bind(title)
        .bind(encode_list(initial_ids))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns `true` if the subscription is new.
    pub async fn add_competition_subscriber(
        &self,
        user: UserId,
        chat: ChatId,
        message: MessageId,
    ) -> Result<bool, Error> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO competition_subscriptions(user_id, chat_id, message_id,
                subscribed_at)
            VALUES (?, ?, ?, ?);",
        )
        .bind(user_to_db(user))
        .bind(chat.0)
        .bind(message.0)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns `true` if the user was subscribed. A competition left with no
    /// subscribers stops being tracked.
    pub async fn remove_competition_subscriber(
        &self,
        user: UserId,
        chat: ChatId,
        message: MessageId,
    ) -> Result<bool, Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "DELETE FROM competition_subscriptions
            WHERE user_id=? AND chat_id=? AND message_id=?;",
        )
        .bind(user_to_db(user))
        .bind(chat.0)
        .bind(message.0)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM competitions
            WHERE chat_id=? AND message_id=?
                AND NOT EXISTS (SELECT 1 FROM competition_subscriptions s
                    WHERE s.chat_id=competitions.chat_id
                        AND s.message_id=competitions.message_id);",
        )
        .bind(chat.0)
        .bind(message.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_competition(
        &self,
        chat: ChatId,
        message: MessageId,
    ) -> Result<Option<Competition>, Error> {
        let row = sqlx::query(&format!(
            "{SELECT_COMPETITIONS} WHERE chat_id=? AND message_id=?;"
        ))
        .bind(chat.0)
        .bind(message.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(competition_from_row).transpose()
    }

    pub async fn get_subscribers_for_competition(
        &self,
        chat: ChatId,
        message: MessageId,
    ) -> Result<Vec<UserId>, Error> {
        sqlx::query(
            "SELECT user_id FROM competition_subscriptions
            WHERE chat_id=? AND message_id=? ORDER BY id;",
        )
        .bind(chat.0)
        .bind(message.0)
        .map(|row: SqliteRow| user_from_db(row.get("user_id")))
        .fetch_all(&self.pool)
        .await
    }

    /// Stash the submission IDs of a fresh edit for the checker loop. Returns `false`
    /// if the message isn't a tracked competition.
    pub async fn set_pending_submissions(
        &self,
        chat: ChatId,
        message: MessageId,
        ids: &[String],
    ) -> Result<bool, Error> {
        let result = sqlx::query(
            "UPDATE competitions SET pending_submission_ids=?, updated_at=?
            WHERE chat_id=? AND message_id=?;",
        )
        .bind(encode_list(ids))
        .bind(Utc::now())
        .bind(chat.0)
        .bind(message.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Make `ids` the notified-about set and drop any pending list.
    pub async fn update_competition_submissions(
        &self,
        chat: ChatId,
        message: MessageId,
        ids: &[String],
    ) -> Result<(), Error> {
        sqlx::query(
            "UPDATE competitions
            SET last_submission_ids=?, pending_submission_ids=NULL, updated_at=?
            WHERE chat_id=? AND message_id=?;",
        )
        .bind(encode_list(ids))
        .bind(Utc::now())
        .bind(chat.0)
        .bind(message.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Make `ids` the notified-about set after processing the `processed` pending list.
    /// An edit stashed in the meantime stays pending.
    pub async fn commit_pending_submissions(
        &self,
        chat: ChatId,
        message: MessageId,
        ids: &[String],
        processed: &[String],
    ) -> Result<(), Error> {
        sqlx::query(
            "UPDATE competitions
            SET last_submission_ids=?,
                pending_submission_ids=CASE WHEN pending_submission_ids=? THEN NULL
                    ELSE pending_submission_ids END,
                updated_at=?
            WHERE chat_id=? AND message_id=?;",
        )
        .bind(encode_list(ids))
        .bind(encode_list(processed))
        .bind(Utc::now())
        .bind(chat.0)
        .bind(message.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drop the pending list if it's still the `processed` one, keeping the
    /// notified-about set as is.
    pub async fn clear_pending_submissions(
        &self,
        chat: ChatId,
        message: MessageId,
        processed: &[String],
    ) -> Result<(), Error> {
        sqlx::query(
            "UPDATE competitions SET pending_submission_ids=NULL
            WHERE chat_id=? AND message_id=? AND pending_submission_ids=?;",
        )
        .bind(chat.0)
        .bind(message.0)
        .bind(encode_list(processed))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Every competition that has at least one subscriber.
    pub async fn get_all_followed_competitions(&self) -> Result<Vec<Competition>, Error> {
        let rows = sqlx::query(&format!(
            "{SELECT_COMPETITIONS} c WHERE EXISTS (SELECT 1 FROM competition_subscriptions s
                WHERE s.chat_id=c.chat_id AND s.message_id=c.message_id)
            ORDER BY created_at;"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(competition_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    const CHAT: ChatId = ChatId(-1001);
    const MESSAGE: MessageId = MessageId(77);

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|x| x.to_string()).collect()
    }

    #[tokio::test]
    async fn subscribe_and_unsubscribe() {
        let db = Database::new_in_memory().await.unwrap();
        db.ensure_competition_exists(CHAT, MESSAGE, None, "Contest", &ids(&["a"]))
            .await
            .unwrap();
        // Second insert doesn't reset anything.
        db.ensure_competition_exists(CHAT, MESSAGE, None, "Contest", &[])
            .await
            .unwrap();

        assert!(db.add_competition_subscriber(UserId(1), CHAT, MESSAGE).await.unwrap());
        assert!(!db.add_competition_subscriber(UserId(1), CHAT, MESSAGE).await.unwrap());
        assert!(db.add_competition_subscriber(UserId(2), CHAT, MESSAGE).await.unwrap());

        let competition = db.get_competition(CHAT, MESSAGE).await.unwrap().unwrap();
        assert_eq!(competition.last_submission_ids, ids(&["a"]));
        assert_eq!(
            db.get_subscribers_for_competition(CHAT, MESSAGE).await.unwrap(),
            vec![UserId(1), UserId(2)]
        );

        assert!(db.remove_competition_subscriber(UserId(1), CHAT, MESSAGE).await.unwrap());
        assert!(!db.remove_competition_subscriber(UserId(1), CHAT, MESSAGE).await.unwrap());
        assert!(db.get_competition(CHAT, MESSAGE).await.unwrap().is_some());

        // Last one out turns off the lights.
        assert!(db.remove_competition_subscriber(UserId(2), CHAT, MESSAGE).await.unwrap());
        assert!(db.get_competition(CHAT, MESSAGE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pending_submissions_lifecycle() {
        let db = Database::new_in_memory().await.unwrap();
        assert!(!db.set_pending_submissions(CHAT, MESSAGE, &ids(&["a"])).await.unwrap());

        db.ensure_competition_exists(CHAT, MESSAGE, Some(MessageId(5)), "Contest", &ids(&["a"]))
            .await
            .unwrap();
        db.add_competition_subscriber(UserId(1), CHAT, MESSAGE)
            .await
            .unwrap();

        assert!(db.set_pending_submissions(CHAT, MESSAGE, &ids(&["a", "b"])).await.unwrap());
        let followed = db.get_all_followed_competitions().await.unwrap();
        assert_eq!(followed.len(), 1);
        assert_eq!(followed[0].thread_id, Some(MessageId(5)));
        assert_eq!(followed[0].pending_submission_ids, Some(ids(&["a", "b"])));

        db.update_competition_submissions(CHAT, MESSAGE, &ids(&["a", "b"]))
            .await
            .unwrap();
        let competition = db.get_competition(CHAT, MESSAGE).await.unwrap().unwrap();
        assert_eq!(competition.last_submission_ids, ids(&["a", "b"]));
        assert_eq!(competition.pending_submission_ids, None);
    }

    #[tokio::test]
    async fn edits_during_processing_stay_pending() {
        let db = Database::new_in_memory().await.unwrap();
        db.ensure_competition_exists(CHAT, MESSAGE, None, "Contest", &ids(&["a"]))
            .await
            .unwrap();

        db.set_pending_submissions(CHAT, MESSAGE, &ids(&["a", "b"])).await.unwrap();
        // Another edit lands while "b" is being announced.
        db.set_pending_submissions(CHAT, MESSAGE, &ids(&["a", "b", "c"])).await.unwrap();
        db.commit_pending_submissions(CHAT, MESSAGE, &ids(&["a", "b"]), &ids(&["a", "b"]))
            .await
            .unwrap();

        let competition = db.get_competition(CHAT, MESSAGE).await.unwrap().unwrap();
        assert_eq!(competition.last_submission_ids, ids(&["a", "b"]));
        assert_eq!(competition.pending_submission_ids, Some(ids(&["a", "b", "c"])));

        db.clear_pending_submissions(CHAT, MESSAGE, &ids(&["a"])).await.unwrap();
        let competition = db.get_competition(CHAT, MESSAGE).await.unwrap().unwrap();
        assert_eq!(competition.pending_submission_ids, Some(ids(&["a", "b", "c"])));

        db.clear_pending_submissions(CHAT, MESSAGE, &ids(&["a", "b", "c"]))
            .await
            .unwrap();
        let competition = db.get_competition(CHAT, MESSAGE).await.unwrap().unwrap();
        assert_eq!(competition.last_submission_ids, ids(&["a", "b"]));
        assert_eq!(competition.pending_submission_ids, None);
    }
}
