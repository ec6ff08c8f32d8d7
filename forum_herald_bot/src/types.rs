use std::fmt::Display;

use chrono::{DateTime, Utc};
use teloxide::types::{ChatId, MessageId, ThreadId, UserId};

/// A forum topic: the chat it's in, plus the ID of the message that created it.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct TopicRef {
    pub chat_id: ChatId,
    pub thread_id: MessageId,
}

impl TopicRef {
    pub fn new(chat_id: ChatId, thread_id: MessageId) -> Self {
        TopicRef { chat_id, thread_id }
    }

    /// The form teloxide wants for `message_thread_id` parameters.
    pub fn thread(&self) -> ThreadId {
        ThreadId(self.thread_id)
    }
}

impl Display for TopicRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.chat_id, self.thread_id.0)
    }
}

/// A topic the bot has seen being created or edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub topic: TopicRef,
    pub author_id: Option<UserId>,
    pub title: String,
    pub closed: bool,
}

/// Result of [`follow_author`](crate::author_follow::follow_author).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowResult {
    Success,
    AlreadyFollowed,
    CannotFollowSelf,
}

/// Result of [`unfollow_author`](crate::author_follow::unfollow_author).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnfollowResult {
    Success,
    NotFollowed,
}

/// An author someone follows, along with how many topics they made since that someone
/// last looked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowedAuthor {
    pub author_id: UserId,
    pub author_name: String,
    pub new_posts: i64,
}

/// Per-user, per-chat keyword subscription settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordSubscription {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub is_subscribed: bool,
    /// If non-empty, only topics matching one of these notify.
    pub followed_keywords: Vec<String>,
    /// Topics matching any of these never notify.
    pub blocked_keywords: Vec<String>,
}

/// A competition message that somebody follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Competition {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub thread_id: Option<MessageId>,
    pub title: String,
    /// Submission IDs subscribers have already been notified about.
    pub last_submission_ids: Vec<String>,
    /// Submission IDs from the latest edit, not yet processed by the checker.
    pub pending_submission_ids: Option<Vec<String>>,
}

/// A topic bookmarked by a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoriteThread {
    pub topic: TopicRef,
    pub title: String,
    pub favorited_at: DateTime<Utc>,
}

/// A topic a user has recently been posting in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveThread {
    pub topic: TopicRef,
    pub title: String,
}

/// Page position within a paginated list. Pages are 0-based here; only the UI
/// shows them 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub index: usize,
    pub total: usize,
}

impl Page {
    /// Make a page for a list of `item_count` items, clamping `index` into range.
    pub fn clamped(index: usize, item_count: usize, page_size: usize) -> Page {
        let total = item_count.div_ceil(page_size.max(1)).max(1);
        Page {
            index: index.min(total - 1),
            total,
        }
    }

    pub fn offset(&self, page_size: usize) -> usize {
        self.index * page_size
    }

    pub fn has_prev(&self) -> bool {
        self.index > 0
    }

    pub fn has_next(&self) -> bool {
        self.index + 1 < self.total
    }
}

impl Display for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Page {} / {}", self.index + 1, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_clamping() {
        let page = Page::clamped(0, 0, 10);
        assert_eq!(page, Page { index: 0, total: 1 });
        assert!(!page.has_prev() && !page.has_next());

        let page = Page::clamped(5, 21, 10);
        assert_eq!(page, Page { index: 2, total: 3 });
        assert!(page.has_prev() && !page.has_next());
        assert_eq!(page.offset(10), 20);

        let page = Page::clamped(1, 20, 10);
        assert_eq!(page.total, 2);
        assert_eq!(page.to_string(), "Page 2 / 2");
    }
}
