use std::{collections::HashSet, sync::OnceLock};

use regex::Regex;
use teloxide::types::{ChatId, MessageId};
use url::Url;

use crate::misc::chat_id_from_internal;

/// Every submission ID in a competition message, in order of appearance.
///
/// IDs look like `🆔Submission ID: abc123` or `🆔投稿ID：abc123`, with the ID
/// possibly wrapped in backticks.
pub fn extract_submission_ids(text: &str) -> Vec<String> {
    static SUBMISSION_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = SUBMISSION_REGEX.get_or_init(|| {
        Regex::new(r"🆔\s*(?:投稿ID|Submission ID)\s*[:：]\s*`?(\w+)`?")
            .expect("Submission ID regex should compile")
    });

    regex
        .captures_iter(text)
        .filter_map(|x| x.get(1))
        .map(|x| x.as_str().to_string())
        .collect()
}

/// IDs in `new` that aren't in `old`, in the order of `new`.
pub fn find_new_submissions(old: &[String], new: &[String]) -> Vec<String> {
    let old: HashSet<&str> = old.iter().map(String::as_str).collect();
    new.iter()
        .filter(|x| !old.contains(x.as_str()))
        .cloned()
        .collect()
}

/// A title for a competition: the first non-empty line of its message.
pub fn competition_title(text: &str) -> String {
    let line = text
        .lines()
        .map(str::trim)
        .find(|x| !x.is_empty())
        .unwrap_or("Competition");
    crate::misc::truncate_chars(line, 64)
}

/// Chat part of a message link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkedChat {
    /// From a `t.me/c/...` link of a private supergroup.
    Id(ChatId),
    /// From a `t.me/<username>/...` link of a public one.
    Username(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageLink {
    pub chat: LinkedChat,
    pub thread: Option<MessageId>,
    pub message: MessageId,
}

/// Parse a link to a message, as Telegram's "Copy Message Link" makes them:
///
/// * `https://t.me/c/<internal chat id>/<message>`
/// * `https://t.me/c/<internal chat id>/<topic>/<message>`
/// * `https://t.me/<username>/<message>`
/// * `https://t.me/<username>/<topic>/<message>`
///
/// The `https://` may be left out. Anything else is `None`.
pub fn parse_message_link(link: &str) -> Option<MessageLink> {
    let link = link.trim();
    let url = match Url::parse(link) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(&format!("https://{link}")).ok()?,
        Err(_) => return None,
    };

    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    if !matches!(url.host_str()?, "t.me" | "telegram.me") {
        return None;
    }

    let segments: Vec<&str> = url.path_segments()?.filter(|x| !x.is_empty()).collect();

    let (chat, rest) = match segments.as_slice() {
        ["c", internal, rest @ ..] => {
            let internal: i64 = internal.parse().ok()?;
            (LinkedChat::Id(chat_id_from_internal(internal)?), rest)
        }
        [username, rest @ ..] if is_valid_username(username) => {
            (LinkedChat::Username((*username).to_string()), rest)
        }
        _ => return None,
    };

    let (thread, message) = match rest {
        [message] => (None, parse_id(message)?),
        [thread, message] => (Some(parse_id(thread)?), parse_id(message)?),
        _ => return None,
    };

    Some(MessageLink {
        chat,
        thread,
        message,
    })
}

fn parse_id(id: &str) -> Option<MessageId> {
    id.parse::<i32>().ok().filter(|x| *x > 0).map(MessageId)
}

/// Telegram usernames are 5 to 32 characters of ASCII letters, digits and underscores,
/// starting with a letter.
fn is_valid_username(username: &str) -> bool {
    (5..=32).contains(&username.len())
        && username.starts_with(|c: char| c.is_ascii_alphabetic())
        && username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn submission_ids() {
        let text = "Summer cup\n\
            🆔投稿ID：`abc123`\n\
            some entry\n\
            🆔Submission ID: def_456\n\
            🆔 Submission ID：`7`\n\
            🆔Other: nope";
        assert_eq!(extract_submission_ids(text), vec!["abc123", "def_456", "7"]);
        assert!(extract_submission_ids("no ids").is_empty());
    }

    #[test]
    fn new_submissions_keep_order() {
        let old = vec!["a".to_string(), "b".to_string()];
        let new = vec!["c".to_string(), "a".to_string(), "d".to_string()];
        assert_eq!(find_new_submissions(&old, &new), vec!["c", "d"]);
        assert!(find_new_submissions(&new, &old[..1]).is_empty());
    }

    #[test]
    fn titles() {
        assert_eq!(competition_title("\n  Summer cup  \nrules"), "Summer cup");
        assert_eq!(competition_title(""), "Competition");
    }

    #[test]
    fn message_links() {
        assert_eq!(
            parse_message_link("https://t.me/c/1234567890/55"),
            Some(MessageLink {
                chat: LinkedChat::Id(ChatId(-1001234567890)),
                thread: None,
                message: MessageId(55),
            })
        );
        assert_eq!(
            parse_message_link("t.me/c/1234567890/3/55"),
            Some(MessageLink {
                chat: LinkedChat::Id(ChatId(-1001234567890)),
                thread: Some(MessageId(3)),
                message: MessageId(55),
            })
        );
        assert_eq!(
            parse_message_link("https://t.me/some_forum/55?single"),
            Some(MessageLink {
                chat: LinkedChat::Username("some_forum".to_string()),
                thread: None,
                message: MessageId(55),
            })
        );

        for bad in [
            "",
            "https://example.com/c/123/55",
            "https://t.me/c/abc/55",
            "https://t.me/c/123",
            "https://t.me/c/123/1/2/3",
            "https://t.me/c/123/-5",
            "https://t.me/c/9223372036854775807/5",
            "https://t.me/ab/55",
            "ftp://t.me/c/123/55",
        ] {
            assert_eq!(parse_message_link(bad), None, "{bad}");
        }
    }
}
