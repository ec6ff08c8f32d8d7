use bot_commons::{retry_on_server_error, useful_methods::BotStuff};
use teloxide::{
    requests::{Request, Requester},
    types::UserId,
    ApiError, Bot, RequestError,
};

use crate::{config::Config, misc::mention_html, types::TopicRef};

/// Notify these users about a topic by mentioning them in it, then deleting the mention.
///
/// Waits a bit first so that the topic has a chance to get its first post, and sends
/// the mentions in chunks with a pause between them. Failures are logged, and the
/// remaining chunks still get sent.
pub async fn ghost_ping(bot: &Bot, config: &Config, topic: TopicRef, users: &[UserId]) {
    if users.is_empty() {
        return;
    }

    log::info!(
        "Ghost pinging {} user(s) in {topic} in chunks of {}.",
        users.len(),
        config.ghost_ping_chunk_size
    );

    tokio::time::sleep(config.ghost_ping_initial_delay).await;

    let chunks: Vec<&[UserId]> = users.chunks(config.ghost_ping_chunk_size).collect();
    let chunk_count = chunks.len();

    for (index, chunk) in chunks.into_iter().enumerate() {
        let text = ghost_ping_text(chunk);

        match bot
            .send_html(topic.chat_id, text, Some(topic.thread()))
            .await
        {
            Ok(message) => {
                let deleted = retry_on_server_error("delete ghost ping", || {
                    bot.delete_message(message.chat.id, message.id).send()
                })
                .await;
                if let Err(e) = deleted {
                    log::error!("Failed to delete ghost ping in {topic}: {e}");
                }
            }
            Err(RequestError::Api(e @ (ApiError::ChatNotFound | ApiError::BotKicked))) => {
                log::error!("Can't ghost ping in {topic} at all: {e}");
                return;
            }
            Err(e) => {
                log::error!("Failed to ghost ping chunk {} in {topic}: {e}", index + 1);
            }
        }

        if index + 1 < chunk_count {
            tokio::time::sleep(config.ghost_ping_chunk_delay).await;
        }
    }
}

/// One mention per user, all in one message.
fn ghost_ping_text(users: &[UserId]) -> String {
    users
        .iter()
        .map(|x| mention_html(*x, "🔔"))
        .collect::<Vec<String>>()
        .join(" ")
}

/// Whether this error means the user can't be messaged by this bot, which
/// is their choice and not worth more than a log line.
pub fn is_user_unreachable(error: &RequestError) -> bool {
    matches!(
        error,
        RequestError::Api(
            ApiError::BotBlocked
                | ApiError::UserDeactivated
                | ApiError::CantInitiateConversation
                | ApiError::CantTalkWithBots
                | ApiError::ChatNotFound
        )
    )
}

/// Send a direct message to a user. Returns `Ok(false)` if they can't be reached.
pub async fn send_dm(bot: &Bot, user: UserId, text: String) -> Result<bool, RequestError> {
    match bot.send_html(user, text, None).await {
        Ok(_) => Ok(true),
        Err(e) if is_user_unreachable(&e) => {
            log::warn!("Can't DM user {user}: {e}");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
