use teloxide::types::{ChatId, UserId};

use crate::{
    database::{Database, Error},
    types::{ActiveThread, FavoriteThread, Page, TopicRef},
};

/// Title used for topics the bot never saw the name of.
pub fn placeholder_title(topic: TopicRef) -> String {
    format!("Topic #{}", topic.thread_id.0)
}

/// One page of favorites, newest first. `page` starts at 1.
pub async fn get_user_favorites(
    db: &Database,
    user: UserId,
    page: usize,
    page_size: usize,
) -> Result<Vec<FavoriteThread>, Error> {
    db.get_user_favorites(user, page, page_size).await
}

pub async fn get_favorites_count(db: &Database, user: UserId) -> Result<usize, Error> {
    db.get_favorites_count(user).await
}

/// Like [`get_user_favorites`], but for showing: `page` is 0-based and gets clamped
/// into range, and the page position comes along.
pub async fn get_favorites_page(
    db: &Database,
    user: UserId,
    page: usize,
    page_size: usize,
) -> Result<(Vec<FavoriteThread>, Page), Error> {
    let count = db.get_favorites_count(user).await?;
    let page = Page::clamped(page, count, page_size);
    let favorites = db.get_user_favorites(user, page.index + 1, page_size).await?;
    Ok((favorites, page))
}

/// Returns `true` if it wasn't a favorite yet.
pub async fn add_favorite(db: &Database, user: UserId, topic: TopicRef) -> Result<bool, Error> {
    let title = match db.get_topic(topic).await? {
        Some(x) => x.title,
        None => placeholder_title(topic),
    };
    let added = db.add_favorite(user, topic, &title).await?;
    if added {
        log::info!("User {user} favorited {topic}.");
    }
    Ok(added)
}

/// Returns `true` if it was a favorite.
pub async fn remove_favorite(db: &Database, user: UserId, topic: TopicRef) -> Result<bool, Error> {
    let removed = db.remove_favorite(user, topic).await?;
    if removed {
        log::info!("User {user} unfavorited {topic}.");
    }
    Ok(removed)
}

pub async fn get_active_threads_for_user(
    db: &Database,
    user: UserId,
    chat: Option<ChatId>,
) -> Result<Vec<ActiveThread>, Error> {
    db.get_user_active_threads(user, chat).await
}

pub async fn get_unfavorited_threads_for_user(
    db: &Database,
    user: UserId,
) -> Result<Vec<ActiveThread>, Error> {
    db.get_unfavorited_active_threads(user).await
}

/// Favorite all of these, returning how many weren't favorites already.
pub async fn batch_favorite_threads(
    db: &Database,
    user: UserId,
    threads: &[ActiveThread],
) -> Result<u64, Error> {
    let added = db.batch_add_favorites(user, threads).await?;
    log::info!("User {user} favorited {added} topic(s) in one go.");
    Ok(added)
}

/// Unfavorite all of these, returning how many were favorites.
pub async fn batch_unfavorite_threads(
    db: &Database,
    user: UserId,
    topics: &[TopicRef],
) -> Result<u64, Error> {
    let removed = db.batch_remove_favorites(user, topics).await?;
    log::info!("User {user} unfavorited {removed} topic(s) in one go.");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::Utc;
    use teloxide::types::MessageId;

    use super::*;

    const USER: UserId = UserId(1);
    const CHAT: ChatId = ChatId(-1001);

    #[tokio::test]
    async fn titles_come_from_known_topics() {
        let db = Database::new_in_memory().await.unwrap();
        let known = TopicRef::new(CHAT, MessageId(1));
        let unknown = TopicRef::new(CHAT, MessageId(2));
        db.upsert_topic(known, None, "Known", Utc::now()).await.unwrap();

        assert!(add_favorite(&db, USER, known).await.unwrap());
        assert!(add_favorite(&db, USER, unknown).await.unwrap());
        assert!(!add_favorite(&db, USER, known).await.unwrap());

        let mut titles: Vec<String> = get_user_favorites(&db, USER, 1, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|x| x.title)
            .collect();
        titles.sort();
        assert_eq!(titles, vec!["Known", "Topic #2"]);

        assert!(remove_favorite(&db, USER, unknown).await.unwrap());
        assert!(!remove_favorite(&db, USER, unknown).await.unwrap());
    }

    #[tokio::test]
    async fn pages_are_clamped() {
        let db = Database::new_in_memory().await.unwrap();
        for id in 1..=3 {
            db.add_favorite(USER, TopicRef::new(CHAT, MessageId(id)), "x")
                .await
                .unwrap();
        }

        let (favorites, page) = get_favorites_page(&db, USER, 7, 2).await.unwrap();
        assert_eq!(page, Page { index: 1, total: 2 });
        assert_eq!(favorites.len(), 1);

        let (favorites, page) = get_favorites_page(&db, UserId(2), 0, 2).await.unwrap();
        assert_eq!(page, Page { index: 0, total: 1 });
        assert!(favorites.is_empty());
        assert_eq!(get_favorites_count(&db, USER).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn batch_operations() {
        let db = Database::new_in_memory().await.unwrap();
        let topics: Vec<TopicRef> = (1..=3).map(|x| TopicRef::new(CHAT, MessageId(x))).collect();
        for topic in &topics {
            db.upsert_topic(*topic, None, "t", Utc::now()).await.unwrap();
            db.record_active_member(*topic, USER, Utc::now())
                .await
                .unwrap();
        }

        let active = get_active_threads_for_user(&db, USER, Some(CHAT))
            .await
            .unwrap();
        assert_eq!(active.len(), 3);

        add_favorite(&db, USER, topics[0]).await.unwrap();
        let unfavorited = get_unfavorited_threads_for_user(&db, USER).await.unwrap();
        assert_eq!(unfavorited.len(), 2);
        assert_eq!(batch_favorite_threads(&db, USER, &unfavorited).await.unwrap(), 2);
        assert_eq!(batch_unfavorite_threads(&db, USER, &topics).await.unwrap(), 3);
    }
}
