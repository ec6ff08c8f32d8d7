use chrono::{DateTime, Utc};
use teloxide::types::UserId;

use crate::{
    database::{Database, Error},
    types::FollowedAuthor,
};

/// The user's followed authors with new-topic counts since their last look, busiest
/// first. Counts as a look, so the next call counts from now.
pub async fn get_user_profile_data(
    db: &Database,
    user: UserId,
) -> Result<Vec<FollowedAuthor>, Error> {
    let since = db.get_and_update_last_view(user).await?;
    followed_authors_since(db, user, since).await
}

/// Same as [`get_user_profile_data`], but counts from the look before the latest one,
/// without counting as a look itself. For flipping pages of the same profile view.
pub async fn get_user_profile_data_again(
    db: &Database,
    user: UserId,
) -> Result<Vec<FollowedAuthor>, Error> {
    let since = db.get_previous_view(user).await?;
    followed_authors_since(db, user, since).await
}

async fn followed_authors_since(
    db: &Database,
    user: UserId,
    since: DateTime<Utc>,
) -> Result<Vec<FollowedAuthor>, Error> {
    let authors = db.get_followed_authors_with_names(user).await?;
    let ids: Vec<UserId> = authors.iter().map(|(id, _)| *id).collect();
    let counts = db.get_new_post_counts(&ids, since).await?;

    let mut profile: Vec<FollowedAuthor> = authors
        .into_iter()
        .map(|(author_id, author_name)| FollowedAuthor {
            new_posts: counts.get(&author_id).copied().unwrap_or(0),
            author_id,
            author_name,
        })
        .collect();

    // Stable, so ties keep follow order.
    profile.sort_by(|a, b| b.new_posts.cmp(&a.new_posts));
    Ok(profile)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use teloxide::types::{ChatId, MessageId};

    use super::*;
    use crate::{author_follow, types::TopicRef};

    const USER: UserId = UserId(1);

    #[tokio::test]
    async fn busiest_authors_first_and_counts_reset() {
        let db = Database::new_in_memory().await.unwrap();
        let chat = ChatId(-1001);

        for (author, name) in [(UserId(2), "quiet"), (UserId(3), "busy")] {
            author_follow::follow_author(&db, USER, author, name)
                .await
                .unwrap();
        }
        for thread in 1..=2 {
            author_follow::process_new_thread(
                &db,
                TopicRef::new(chat, MessageId(thread)),
                UserId(3),
                "busy",
                "Post",
                Utc::now(),
            )
            .await
            .unwrap();
        }

        let profile = get_user_profile_data(&db, USER).await.unwrap();
        assert_eq!(profile.len(), 2);
        assert_eq!(profile[0].author_name, "busy");
        assert_eq!(profile[0].new_posts, 2);
        assert_eq!(profile[1].new_posts, 0);

        // Paging keeps the counts.
        let again = get_user_profile_data_again(&db, USER).await.unwrap();
        assert_eq!(again, profile);

        // A fresh look starts from zero.
        let profile = get_user_profile_data(&db, USER).await.unwrap();
        assert!(profile.iter().all(|x| x.new_posts == 0));
        assert_eq!(profile[0].author_name, "quiet");
    }
}
