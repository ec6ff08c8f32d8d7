pub mod callbacks;
pub mod commands;

use std::{collections::HashSet, sync::Arc};

use bot_commons::useful_methods::{user_display_name, MessageStuff};
use teloxide::{
    types::{Me, Message, UserId},
    Bot, RequestError,
};

use crate::{
    actions::ghost_ping,
    author_follow, competition,
    config::Config,
    cooldown::CommandCooldown,
    database::Database,
    error::BotResult,
    favorites::placeholder_title,
    scanner::ThreadScanner,
    subscription,
    types::TopicRef,
};

pub use callbacks::handle_callback_query;

pub async fn handle_message(
    bot: Bot,
    me: Me,
    message: Message,
    db: Arc<Database>,
    config: Arc<Config>,
    scanner: Arc<ThreadScanner>,
    follow_cooldown: Arc<CommandCooldown>,
) -> Result<(), RequestError> {
    // Bot ignores messages made by itself.
    if message.from.as_ref().map(|x| x.id) == Some(me.id) {
        return Ok(());
    }

    if config.is_resource_chat(message.chat.id) {
        if let Err(e) = track_forum_activity(&bot, &message, &db, &config).await {
            log::error!(
                "Failed to track message {} in chat {}: {e}",
                message.id.0,
                message.chat.id
            );
        }
    }

    commands::handle_command(&bot, &me, &message, &db, &config, &scanner, &follow_cooldown).await
}

/// Keep the topic records of a tracked forum up to date with this message.
async fn track_forum_activity(
    bot: &Bot,
    message: &Message,
    db: &Database,
    config: &Arc<Config>,
) -> BotResult<()> {
    let chat = message.chat.id;

    if let Some(created) = message.forum_topic_created() {
        // A topic's ID is the ID of the message that created it.
        let topic = TopicRef::new(chat, message.id);
        return on_topic_created(bot, message, db, config, topic, &created.name).await;
    }

    let Some(thread) = message.thread_id else {
        return Ok(());
    };
    let topic = TopicRef::new(chat, thread.0);

    if let Some(edited) = message.forum_topic_edited() {
        if let Some(name) = &edited.name {
            log::debug!("Topic {topic} renamed to \"{name}\".");
            db.rename_topic(topic, name).await?;
        }
    } else if message.forum_topic_closed().is_some() {
        db.set_topic_closed(topic, true).await?;
    } else if message.forum_topic_reopened().is_some() {
        db.set_topic_closed(topic, false).await?;
    } else if let Some(user) = message.from.as_ref().filter(|x| !x.is_bot) {
        db.ensure_topic_exists(topic, &placeholder_title(topic))
            .await?;
        db.record_active_member(topic, user.id, message.date).await?;
    }

    Ok(())
}

/// Record a new topic, then ghost ping everyone who wants to know about it: the
/// author's followers and the chat's matching subscribers.
async fn on_topic_created(
    bot: &Bot,
    message: &Message,
    db: &Database,
    config: &Arc<Config>,
    topic: TopicRef,
    title: &str,
) -> BotResult<()> {
    log::info!("New topic {topic}: \"{title}\".");

    let author = message.from.as_ref().filter(|x| !x.is_bot);

    if let Some(author) = author {
        author_follow::process_new_thread(
            db,
            topic,
            author.id,
            &user_display_name(author),
            title,
            message.date,
        )
        .await?;
    } else {
        db.upsert_topic(topic, None, title, message.date).await?;
    }

    let users = topic_ping_targets(db, topic, author.map(|x| x.id), title).await?;

    if users.is_empty() {
        return Ok(());
    }

    let bot = bot.clone();
    let config = config.clone();
    tokio::spawn(async move {
        ghost_ping(&bot, &config, topic, &users).await;
    });

    Ok(())
}

/// Everyone to ghost ping about a new topic: the author's followers, then the chat's
/// subscribers whose keywords match. Nobody twice, and never the author.
async fn topic_ping_targets(
    db: &Database,
    topic: TopicRef,
    author: Option<UserId>,
    title: &str,
) -> BotResult<Vec<UserId>> {
    let mut users = Vec::new();
    if let Some(author) = author {
        users.extend(author_follow::get_author_followers(db, author).await?);
    }

    let tags = subscription::topic_tags(title);
    users.extend(subscription::process_new_thread(db, topic.chat_id, author, title, &tags).await?);

    let mut seen = HashSet::new();
    users.retain(|x| Some(*x) != author && seen.insert(*x));
    Ok(users)
}

/// Edits of followed competitions stash their submissions for the checker loop.
pub async fn handle_edited_message(
    message: Message,
    db: Arc<Database>,
) -> Result<(), RequestError> {
    let Some(text) = message.text_full() else {
        return Ok(());
    };

    if let Err(e) = competition::note_competition_edit(&db, message.chat.id, message.id, text).await
    {
        log::error!(
            "Failed to note an edit of message {} in chat {}: {e}",
            message.id.0,
            message.chat.id
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::Utc;
    use teloxide::types::{ChatId, MessageId};

    use super::*;

    const CHAT: ChatId = ChatId(-1001);
    const AUTHOR: UserId = UserId(10);

    #[tokio::test]
    async fn followers_and_subscribers_are_pinged_once() {
        let db = Database::new_in_memory().await.unwrap();
        let topic = TopicRef::new(CHAT, MessageId(5));

        author_follow::follow_author(&db, UserId(1), AUTHOR, "author")
            .await
            .unwrap();
        author_follow::follow_author(&db, UserId(2), AUTHOR, "author")
            .await
            .unwrap();
        // 2 also subscribes, 3 only subscribes, and the author subscribes to their own chat.
        for user in [UserId(2), UserId(3), AUTHOR] {
            subscription::follow_channel(&db, user, CHAT).await.unwrap();
        }
        // 4 doesn't want this kind of topic.
        subscription::follow_channel(&db, UserId(4), CHAT).await.unwrap();
        subscription::update_subscription(&db, UserId(4), CHAT, &[], &["rust".to_string()])
            .await
            .unwrap();

        author_follow::process_new_thread(&db, topic, AUTHOR, "author", "Rust news", Utc::now())
            .await
            .unwrap();

        let users = topic_ping_targets(&db, topic, Some(AUTHOR), "Rust news")
            .await
            .unwrap();
        assert_eq!(users, vec![UserId(1), UserId(2), UserId(3)]);
    }

    #[tokio::test]
    async fn authorless_topics_ping_subscribers() {
        let db = Database::new_in_memory().await.unwrap();
        let topic = TopicRef::new(CHAT, MessageId(5));
        subscription::follow_channel(&db, UserId(3), CHAT).await.unwrap();

        let users = topic_ping_targets(&db, topic, None, "Announcements")
            .await
            .unwrap();
        assert_eq!(users, vec![UserId(3)]);
    }
}
