use std::collections::BTreeSet;

use teloxide::types::{ChatId, UserId};

use crate::{
    database::{Database, Error},
    types::KeywordSubscription,
};

/// Lowercase, drop empty entries, deduplicate and sort.
pub fn normalize_keywords<'a>(keywords: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    keywords
        .into_iter()
        .map(|x| x.trim().to_lowercase())
        .filter(|x| !x.is_empty())
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect()
}

/// Parse the parameters of `/keywords`, which look like
/// `follow rust, tokio; block spoilers`. Either part may be left out; a missing
/// part clears that list.
///
/// Returns `None` if there's something that isn't a `follow` or `block` part.
pub fn parse_keywords_params(params: &str) -> Option<(Vec<String>, Vec<String>)> {
    let mut followed = Vec::new();
    let mut blocked = Vec::new();

    for part in params.split(';').map(str::trim).filter(|x| !x.is_empty()) {
        let (kind, list) = part.split_once(char::is_whitespace).unwrap_or((part, ""));
        let list = list.split(',');
        match kind.to_lowercase().as_str() {
            "follow" => followed = normalize_keywords(list),
            "block" => blocked = normalize_keywords(list),
            _ => return None,
        }
    }

    Some((followed, blocked))
}

/// Hashtags in a topic title, lowercased and without the `#`. These stand in for tags.
pub fn topic_tags(title: &str) -> Vec<String> {
    title
        .split_whitespace()
        .filter_map(|word| word.strip_prefix('#'))
        .map(|tag| {
            tag.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '_')
                .to_lowercase()
        })
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// Whether a topic whose lowercased title and tags are `search_content` should
/// notify the owner of `subscription`.
///
/// Blocked keywords win over everything. Then, if any keywords are followed, one of
/// them has to match. With no followed keywords, everything notifies.
pub fn should_notify(subscription: &KeywordSubscription, search_content: &str) -> bool {
    let matches = |keywords: &[String]| {
        keywords
            .iter()
            .any(|keyword| search_content.contains(keyword.as_str()))
    };

    if matches(&subscription.blocked_keywords) {
        return false;
    }

    subscription.followed_keywords.is_empty() || matches(&subscription.followed_keywords)
}

/// Pick who to notify about a new topic out of these subscriptions. The owner
/// never gets notified about their own topic.
pub fn users_to_notify(
    subscriptions: &[KeywordSubscription],
    owner: Option<UserId>,
    title: &str,
    tags: &[String],
) -> Vec<UserId> {
    let mut search_content = title.to_lowercase();
    for tag in tags {
        search_content.push(' ');
        search_content.push_str(&tag.to_lowercase());
    }

    let mut users = Vec::new();
    for subscription in subscriptions {
        if !subscription.is_subscribed
            || Some(subscription.user_id) == owner
            || users.contains(&subscription.user_id)
        {
            continue;
        }
        if should_notify(subscription, &search_content) {
            users.push(subscription.user_id);
        }
    }
    users
}

pub async fn get_subscription(
    db: &Database,
    user: UserId,
    chat: ChatId,
) -> Result<Option<KeywordSubscription>, Error> {
    db.get_keyword_subscription(user, chat).await
}

/// Replace the keyword lists, leaving the subscribed state as it was
/// (not subscribed if there was no row).
pub async fn update_subscription(
    db: &Database,
    user: UserId,
    chat: ChatId,
    followed: &[String],
    blocked: &[String],
) -> Result<KeywordSubscription, Error> {
    let is_subscribed = get_subscription(db, user, chat)
        .await?
        .is_some_and(|x| x.is_subscribed);

    let subscription = KeywordSubscription {
        user_id: user,
        chat_id: chat,
        is_subscribed,
        followed_keywords: normalize_keywords(followed.iter().map(String::as_str)),
        blocked_keywords: normalize_keywords(blocked.iter().map(String::as_str)),
    };
    db.upsert_keyword_subscription(&subscription).await?;
    log::info!("User {user} updated keywords in chat {chat}.");
    Ok(subscription)
}

/// Subscribe, keeping existing keywords.
pub async fn follow_channel(db: &Database, user: UserId, chat: ChatId) -> Result<(), Error> {
    let subscription = match get_subscription(db, user, chat).await? {
        Some(existing) => KeywordSubscription {
            is_subscribed: true,
            ..existing
        },
        None => KeywordSubscription {
            user_id: user,
            chat_id: chat,
            is_subscribed: true,
            followed_keywords: Vec::new(),
            blocked_keywords: Vec::new(),
        },
    };
    db.upsert_keyword_subscription(&subscription).await?;
    log::info!("User {user} subscribed to chat {chat}.");
    Ok(())
}

/// Unsubscribe, keeping existing keywords. Returns `false` if there was nothing to
/// unsubscribe from.
pub async fn unfollow_channel(db: &Database, user: UserId, chat: ChatId) -> Result<bool, Error> {
    let Some(existing) = get_subscription(db, user, chat).await? else {
        log::warn!("User {user} tried to unsubscribe from chat {chat} without ever subscribing.");
        return Ok(false);
    };

    db.upsert_keyword_subscription(&KeywordSubscription {
        is_subscribed: false,
        ..existing
    })
    .await?;
    log::info!("User {user} unsubscribed from chat {chat}.");
    Ok(true)
}

/// Users subscribed to this chat that want to hear about a new topic.
pub async fn process_new_thread(
    db: &Database,
    chat: ChatId,
    owner: Option<UserId>,
    title: &str,
    tags: &[String],
) -> Result<Vec<UserId>, Error> {
    let subscriptions = db.get_all_subscriptions_for_chat(chat).await?;
    let users = users_to_notify(&subscriptions, owner, title, tags);
    log::debug!(
        "Topic \"{title}\" in chat {chat} matched {} subscriber(s).",
        users.len()
    );
    Ok(users)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    const CHAT: ChatId = ChatId(-1001);

    fn sub(user: u64, followed: &[&str], blocked: &[&str]) -> KeywordSubscription {
        KeywordSubscription {
            user_id: UserId(user),
            chat_id: CHAT,
            is_subscribed: true,
            followed_keywords: normalize_keywords(followed.iter().copied()),
            blocked_keywords: normalize_keywords(blocked.iter().copied()),
        }
    }

    #[test]
    fn keyword_normalization() {
        assert_eq!(
            normalize_keywords(["Rust", " tokio ", "", "rust", "Async"]),
            vec!["async", "rust", "tokio"]
        );
    }

    #[test]
    fn keywords_params() {
        let (followed, blocked) = parse_keywords_params("follow Rust, tokio; block spoilers").unwrap();
        assert_eq!(followed, vec!["rust", "tokio"]);
        assert_eq!(blocked, vec!["spoilers"]);

        let (followed, blocked) = parse_keywords_params("block a,b").unwrap();
        assert!(followed.is_empty());
        assert_eq!(blocked, vec!["a", "b"]);

        assert_eq!(parse_keywords_params(""), Some((vec![], vec![])));
        assert_eq!(parse_keywords_params("follow"), Some((vec![], vec![])));
        assert_eq!(parse_keywords_params("subscribe a"), None);
    }

    #[test]
    fn hashtags() {
        assert_eq!(
            topic_tags("New map #Release, #beta_2! #"),
            vec!["release", "beta_2"]
        );
        assert!(topic_tags("no tags here").is_empty());
    }

    #[test]
    fn notification_priority() {
        let subs = vec![
            // Everything.
            sub(1, &[], &[]),
            // Only rust.
            sub(2, &["rust"], &[]),
            // Everything but spoilers, even if rust.
            sub(3, &["rust"], &["spoilers"]),
            // Only go.
            sub(4, &["go"], &[]),
            // The owner.
            sub(5, &[], &[]),
            // Duplicate row for user 1.
            sub(1, &[], &[]),
        ];

        let tags = vec!["spoilers".to_string()];
        let users = users_to_notify(&subs, Some(UserId(5)), "Rust news", &tags);
        assert_eq!(users, vec![UserId(1), UserId(2)]);

        let users = users_to_notify(&subs, None, "RUST news", &[]);
        assert_eq!(users, vec![UserId(1), UserId(2), UserId(3), UserId(5)]);

        let mut inactive = sub(6, &[], &[]);
        inactive.is_subscribed = false;
        assert!(users_to_notify(&[inactive], None, "anything", &[]).is_empty());
    }

    #[tokio::test]
    async fn subscribe_lifecycle() {
        let db = Database::new_in_memory().await.unwrap();
        let user = UserId(1);

        // Nothing to unsubscribe from yet.
        assert!(!unfollow_channel(&db, user, CHAT).await.unwrap());
        assert_eq!(get_subscription(&db, user, CHAT).await.unwrap(), None);

        // Keywords first: that alone doesn't subscribe.
        let updated = update_subscription(
            &db,
            user,
            CHAT,
            &["Rust".to_string(), "rust".to_string()],
            &[],
        )
        .await
        .unwrap();
        assert!(!updated.is_subscribed);
        assert_eq!(updated.followed_keywords, vec!["rust"]);

        follow_channel(&db, user, CHAT).await.unwrap();
        let current = get_subscription(&db, user, CHAT).await.unwrap().unwrap();
        assert!(current.is_subscribed);
        assert_eq!(current.followed_keywords, vec!["rust"]);

        assert_eq!(
            process_new_thread(&db, CHAT, None, "rust thing", &[])
                .await
                .unwrap(),
            vec![user]
        );
        assert!(process_new_thread(&db, CHAT, None, "other thing", &[])
            .await
            .unwrap()
            .is_empty());

        assert!(unfollow_channel(&db, user, CHAT).await.unwrap());
        let current = get_subscription(&db, user, CHAT).await.unwrap().unwrap();
        assert!(!current.is_subscribed);
        assert_eq!(current.followed_keywords, vec!["rust"]);
        assert!(process_new_thread(&db, CHAT, None, "rust thing", &[])
            .await
            .unwrap()
            .is_empty());
    }
}
