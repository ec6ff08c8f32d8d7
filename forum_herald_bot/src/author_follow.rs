use chrono::{DateTime, Utc};
use teloxide::types::UserId;

use crate::{
    database::{Database, Error},
    types::{FollowResult, TopicRef, UnfollowResult},
};

/// Record a new topic by this author: the author, the topic itself, and the author's
/// post. Safe to call more than once for the same topic.
pub async fn process_new_thread(
    db: &Database,
    topic: TopicRef,
    author: UserId,
    author_name: &str,
    title: &str,
    created_at: DateTime<Utc>,
) -> Result<(), Error> {
    db.ensure_author_exists(author, author_name).await?;
    db.upsert_topic(topic, Some(author), title, created_at)
        .await?;
    db.add_post(topic, author, created_at).await?;
    log::debug!("Recorded topic {topic} by author {author} ({author_name}).");
    Ok(())
}

pub async fn follow_author(
    db: &Database,
    user: UserId,
    author: UserId,
    author_name: &str,
) -> Result<FollowResult, Error> {
    if user == author {
        return Ok(FollowResult::CannotFollowSelf);
    }

    if db.add_follower(user, author, author_name).await? {
        log::info!("User {user} followed author {author}.");
        Ok(FollowResult::Success)
    } else {
        Ok(FollowResult::AlreadyFollowed)
    }
}

pub async fn unfollow_author(
    db: &Database,
    user: UserId,
    author: UserId,
) -> Result<UnfollowResult, Error> {
    if db.remove_follower(user, author).await? {
        log::info!("User {user} unfollowed author {author}.");
        Ok(UnfollowResult::Success)
    } else {
        Ok(UnfollowResult::NotFollowed)
    }
}

pub async fn get_user_follows(db: &Database, user: UserId) -> Result<Vec<UserId>, Error> {
    db.get_followed_authors(user).await
}

pub async fn get_user_follows_details(
    db: &Database,
    user: UserId,
) -> Result<Vec<(UserId, String)>, Error> {
    db.get_followed_authors_with_names(user).await
}

pub async fn get_author_followers(db: &Database, author: UserId) -> Result<Vec<UserId>, Error> {
    db.get_followers_for_author(author).await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use teloxide::types::{ChatId, MessageId};

    use super::*;

    const USER: UserId = UserId(10);
    const AUTHOR: UserId = UserId(20);

    #[tokio::test]
    async fn follow_results() {
        let db = Database::new_in_memory().await.unwrap();

        assert_eq!(
            follow_author(&db, USER, USER, "me").await.unwrap(),
            FollowResult::CannotFollowSelf
        );
        assert_eq!(
            follow_author(&db, USER, AUTHOR, "author").await.unwrap(),
            FollowResult::Success
        );
        assert_eq!(
            follow_author(&db, USER, AUTHOR, "author").await.unwrap(),
            FollowResult::AlreadyFollowed
        );

        assert_eq!(get_user_follows(&db, USER).await.unwrap(), vec![AUTHOR]);
        assert_eq!(get_author_followers(&db, AUTHOR).await.unwrap(), vec![USER]);
        assert!(get_user_follows(&db, AUTHOR).await.unwrap().is_empty());

        assert_eq!(
            unfollow_author(&db, USER, AUTHOR).await.unwrap(),
            UnfollowResult::Success
        );
        assert_eq!(
            unfollow_author(&db, USER, AUTHOR).await.unwrap(),
            UnfollowResult::NotFollowed
        );
    }

    #[tokio::test]
    async fn new_thread_is_recorded_once() {
        let db = Database::new_in_memory().await.unwrap();
        let topic = TopicRef::new(ChatId(-1001), MessageId(3));
        let created_at = Utc::now();

        process_new_thread(&db, topic, AUTHOR, "author", "Hello", created_at)
            .await
            .unwrap();
        process_new_thread(&db, topic, AUTHOR, "renamed author", "Hello", created_at)
            .await
            .unwrap();

        let stored = db.get_topic(topic).await.unwrap().unwrap();
        assert_eq!(stored.author_id, Some(AUTHOR));

        let counts = db
            .get_new_post_counts(&[AUTHOR], DateTime::<Utc>::default())
            .await
            .unwrap();
        assert_eq!(counts.get(&AUTHOR), Some(&1));

        follow_author(&db, USER, AUTHOR, "author").await.unwrap();
        assert_eq!(
            get_user_follows_details(&db, USER).await.unwrap(),
            vec![(AUTHOR, "author".to_string())]
        );
    }
}
