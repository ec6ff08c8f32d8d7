use html_escape::encode_text;
use teloxide::types::{ChatId, MessageId, UserId};

use crate::types::TopicRef;

/// A `tg://user` link with the given text. Telegram notifies the user about it
/// like about an @-mention, even for users without a username.
#[must_use]
pub fn mention_html(user: UserId, text: &str) -> String {
    format!("<a href=\"tg://user?id={}\">{}</a>", user, encode_text(text))
}

const SUPERGROUP_ID_OFFSET: i64 = -1_000_000_000_000;

/// The number Telegram uses for this supergroup in `t.me/c/...` links.
/// `None` for chats that aren't supergroups or channels.
#[must_use]
pub fn internal_chat_id(chat: ChatId) -> Option<i64> {
    let internal = SUPERGROUP_ID_OFFSET.checked_sub(chat.0)?;
    (internal > 0).then_some(internal)
}

/// The inverse of [`internal_chat_id`].
#[must_use]
pub fn chat_id_from_internal(internal: i64) -> Option<ChatId> {
    if internal <= 0 {
        return None;
    }
    SUPERGROUP_ID_OFFSET.checked_sub(internal).map(ChatId)
}

/// Link to a topic, or `None` if the chat can't be linked to.
#[must_use]
pub fn topic_link(topic: TopicRef) -> Option<String> {
    let internal = internal_chat_id(topic.chat_id)?;
    Some(format!("https://t.me/c/{internal}/{}", topic.thread_id.0))
}

/// Link to a message, inside a topic if it's in one.
#[must_use]
pub fn message_link(chat: ChatId, thread: Option<MessageId>, message: MessageId) -> Option<String> {
    let internal = internal_chat_id(chat)?;
    Some(match thread {
        Some(thread) => format!("https://t.me/c/{internal}/{}/{}", thread.0, message.0),
        None => format!("https://t.me/c/{internal}/{}", message.0),
    })
}

/// Topic title as an HTML link to it if possible, escaped text otherwise.
#[must_use]
pub fn topic_title_html(topic: TopicRef, title: &str) -> String {
    match topic_link(topic) {
        Some(link) => format!("<a href=\"{link}\">{}</a>", encode_text(title)),
        None => encode_text(title).into_owned(),
    }
}

/// Cut a string to at most `max_chars` characters, adding an ellipsis if it was cut.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_id_conversions() {
        assert_eq!(internal_chat_id(ChatId(-1001234567890)), Some(1234567890));
        assert_eq!(chat_id_from_internal(1234567890), Some(ChatId(-1001234567890)));
        // Basic groups and private chats have no t.me/c links.
        assert_eq!(internal_chat_id(ChatId(-12345)), None);
        assert_eq!(internal_chat_id(ChatId(12345)), None);
        assert_eq!(chat_id_from_internal(0), None);
        assert_eq!(chat_id_from_internal(i64::MAX), None);
        assert_eq!(internal_chat_id(ChatId(i64::MAX)), None);
    }

    #[test]
    fn links() {
        let chat = ChatId(-1001234567890);
        assert_eq!(
            topic_link(TopicRef::new(chat, MessageId(5))).as_deref(),
            Some("https://t.me/c/1234567890/5")
        );
        assert_eq!(
            message_link(chat, Some(MessageId(5)), MessageId(9)).as_deref(),
            Some("https://t.me/c/1234567890/5/9")
        );
        assert_eq!(
            message_link(chat, None, MessageId(9)).as_deref(),
            Some("https://t.me/c/1234567890/9")
        );
        assert_eq!(
            topic_title_html(TopicRef::new(ChatId(5), MessageId(1)), "a<b"),
            "a&lt;b"
        );
    }

    #[test]
    fn truncation() {
        assert_eq!(truncate_chars("hello", 5), "hello");
        assert_eq!(truncate_chars("hello world", 6), "hello…");
        assert_eq!(truncate_chars("привет мир", 4), "при…");
    }
}
