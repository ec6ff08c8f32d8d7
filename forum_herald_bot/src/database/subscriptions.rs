use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};
use teloxide::types::{ChatId, UserId};

use super::{chat_from_db, decode_list, encode_list, user_from_db, user_to_db, Database, Error};
use crate::types::KeywordSubscription;

fn subscription_from_row(row: SqliteRow) -> Result<KeywordSubscription, Error> {
    Ok(KeywordSubscription {
        user_id: user_from_db(row.get("user_id")),
        chat_id: chat_from_db(row.get("chat_id")),
        is_subscribed: row.get::<i64, _>("is_subscribed") != 0,
        followed_keywords: decode_list(row.get("followed_keywords"))?,
        blocked_keywords: decode_list(row.get("blocked_keywords"))?,
    })
}

const SELECT_SUBSCRIPTIONS: &str = "SELECT user_id, chat_id, is_subscribed, followed_keywords,
    blocked_keywords FROM keyword_subscriptions";

impl Database {
    pub async fn get_keyword_subscription(
        &self,
        user: UserId,
        chat: ChatId,
    ) -> Result<Option<KeywordSubscription>, Error> {
        let row = sqlx::query(&format!(
            "{SELECT_SUBSCRIPTIONS} WHERE user_id=? AND chat_id=?;"
        ))
        .bind(user_to_db(user))
        .bind(chat.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(subscription_from_row).transpose()
    }

    /// Insert or overwrite the subscription row as a whole.
    pub async fn upsert_keyword_subscription(
        &self,
        subscription: &KeywordSubscription,
    ) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO keyword_subscriptions(user_id, chat_id, is_subscribed,
                followed_keywords, blocked_keywords, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id, chat_id) DO
            UPDATE SET is_subscribed=excluded.is_subscribed,
                followed_keywords=excluded.followed_keywords,
                blocked_keywords=excluded.blocked_keywords,
                updated_at=excluded.updated_at;",
        )
        .bind(user_to_db(subscription.user_id))
        .bind(subscription.chat_id.0)
        .bind(i64::from(subscription.is_subscribed))
        .bind(encode_list(&subscription.followed_keywords))
        .bind(encode_list(&subscription.blocked_keywords))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Every active subscription to this chat.
    pub async fn get_all_subscriptions_for_chat(
        &self,
        chat: ChatId,
    ) -> Result<Vec<KeywordSubscription>, Error> {
        let rows = sqlx::query(&format!(
            "{SELECT_SUBSCRIPTIONS} WHERE chat_id=? AND is_subscribed=1 ORDER BY user_id;"
        ))
        .bind(chat.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(subscription_from_row).collect()
    }

    /// Every subscription row of this user, active or not.
    pub async fn get_subscriptions_for_user(
        &self,
        user: UserId,
    ) -> Result<Vec<KeywordSubscription>, Error> {
        let rows = sqlx::query(&format!(
            "{SELECT_SUBSCRIPTIONS} WHERE user_id=? ORDER BY chat_id;"
        ))
        .bind(user_to_db(user))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(subscription_from_row).collect()
    }
}
