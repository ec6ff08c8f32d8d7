//! Text and inline keyboards of the management menus.
//!
//! Everything here is pure: handlers fetch the data, these functions lay it out.

use std::{fmt::Display, fmt::Write, str::FromStr};

use html_escape::encode_text;
use teloxide::types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup, MessageId, UserId};

use crate::{
    misc::{internal_chat_id, topic_title_html, truncate_chars},
    types::{ActiveThread, FavoriteThread, FollowedAuthor, KeywordSubscription, Page, TopicRef},
};

/// Longest button label, in characters.
const BUTTON_LABEL_LENGTH: usize = 40;

/// Payload of a menu button.
///
/// Telegram limits callback data to 64 bytes, so it's a short space separated string
/// like `AF_UNF 12345 0`. Page numbers are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuCallback {
    MainMenu,
    Close,
    AuthorsPage(usize),
    UnfollowAuthor(UserId, usize),
    Subscriptions,
    ToggleSubscription(ChatId),
    FavoritesPage(usize),
    RemoveFavorite(TopicRef, usize),
    RemoveFavoritesPage(usize),
    ActivePage(usize),
    AddActive(TopicRef, usize),
    AddAllActive,
}

impl Display for MenuCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MenuCallback::MainMenu => write!(f, "MENU"),
            MenuCallback::Close => write!(f, "CLOSE"),
            MenuCallback::AuthorsPage(page) => write!(f, "AF_PAGE {page}"),
            MenuCallback::UnfollowAuthor(author, page) => write!(f, "AF_UNF {author} {page}"),
            MenuCallback::Subscriptions => write!(f, "SUB_LIST"),
            MenuCallback::ToggleSubscription(chat) => write!(f, "SUB_TGL {chat}"),
            MenuCallback::FavoritesPage(page) => write!(f, "FAV_PAGE {page}"),
            MenuCallback::RemoveFavorite(topic, page) => write!(
                f,
                "FAV_RM {} {} {page}",
                topic.chat_id, topic.thread_id.0
            ),
            MenuCallback::RemoveFavoritesPage(page) => write!(f, "FAV_RMPAGE {page}"),
            MenuCallback::ActivePage(page) => write!(f, "ACT_PAGE {page}"),
            MenuCallback::AddActive(topic, page) => write!(
                f,
                "ACT_ADD {} {} {page}",
                topic.chat_id, topic.thread_id.0
            ),
            MenuCallback::AddAllActive => write!(f, "ACT_ALL"),
        }
    }
}

impl FromStr for MenuCallback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let kind = words.next().ok_or("empty callback data")?;
        let args: Vec<&str> = words.collect();

        fn num<T: FromStr>(x: Option<&&str>) -> Result<T, String> {
            let x = x.ok_or("missing argument")?;
            x.parse().map_err(|_| format!("bad argument \"{x}\""))
        }
        let topic = |chat: Option<&&str>, thread: Option<&&str>| -> Result<TopicRef, String> {
            Ok(TopicRef::new(ChatId(num(chat)?), MessageId(num(thread)?)))
        };

        let expected_args = match kind {
            "MENU" | "CLOSE" | "SUB_LIST" | "ACT_ALL" => 0,
            "AF_PAGE" | "SUB_TGL" | "FAV_PAGE" | "FAV_RMPAGE" | "ACT_PAGE" => 1,
            "AF_UNF" => 2,
            "FAV_RM" | "ACT_ADD" => 3,
            _ => return Err(format!("unknown callback \"{kind}\"")),
        };
        if args.len() != expected_args {
            return Err(format!("wrong number of arguments for \"{kind}\""));
        }

        Ok(match kind {
            "MENU" => MenuCallback::MainMenu,
            "CLOSE" => MenuCallback::Close,
            "SUB_LIST" => MenuCallback::Subscriptions,
            "ACT_ALL" => MenuCallback::AddAllActive,
            "AF_PAGE" => MenuCallback::AuthorsPage(num(args.first())?),
            "SUB_TGL" => MenuCallback::ToggleSubscription(ChatId(num(args.first())?)),
            "FAV_PAGE" => MenuCallback::FavoritesPage(num(args.first())?),
            "FAV_RMPAGE" => MenuCallback::RemoveFavoritesPage(num(args.first())?),
            "ACT_PAGE" => MenuCallback::ActivePage(num(args.first())?),
            "AF_UNF" => MenuCallback::UnfollowAuthor(UserId(num(args.first())?), num(args.get(1))?),
            "FAV_RM" => MenuCallback::RemoveFavorite(topic(args.first(), args.get(1))?, num(args.get(2))?),
            _ => MenuCallback::AddActive(topic(args.first(), args.get(1))?, num(args.get(2))?),
        })
    }
}

fn button(label: impl AsRef<str>, callback: MenuCallback) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(
        truncate_chars(label.as_ref(), BUTTON_LABEL_LENGTH),
        callback.to_string(),
    )
}

/// A row of "previous page", "next page" buttons, whichever apply.
fn paging_row(page: Page, make: fn(usize) -> MenuCallback) -> Vec<InlineKeyboardButton> {
    let mut row = Vec::new();
    if page.has_prev() {
        row.push(button("◀️ Previous", make(page.index - 1)));
    }
    if page.has_next() {
        row.push(button("Next ▶️", make(page.index + 1)));
    }
    row
}

fn back_row() -> Vec<InlineKeyboardButton> {
    vec![
        button("⬅️ Main menu", MenuCallback::MainMenu),
        button("✖️ Close", MenuCallback::Close),
    ]
}

/// Prepend a status line, like "Unfollowed so and so", if there is one.
fn with_status(status: Option<&str>, text: String) -> String {
    match status {
        Some(status) => format!("<i>{}</i>\n\n{text}", encode_text(status)),
        None => text,
    }
}

pub fn main_menu() -> (String, InlineKeyboardMarkup) {
    let text = concat!(
        "<b>Your herald settings</b>\n\n",
        "Choose what to manage:"
    )
    .to_string();

    let keyboard = InlineKeyboardMarkup::new(vec![
        vec![button("👤 Followed authors", MenuCallback::AuthorsPage(0))],
        vec![button("📢 Chat subscriptions", MenuCallback::Subscriptions)],
        vec![button("⭐ Favorite topics", MenuCallback::FavoritesPage(0))],
        vec![button("✖️ Close", MenuCallback::Close)],
    ]);

    (text, keyboard)
}

/// One page of followed authors, each with an unfollow button.
pub fn authors_page(
    authors: &[FollowedAuthor],
    page: Page,
    page_size: usize,
    status: Option<&str>,
) -> (String, InlineKeyboardMarkup) {
    let mut rows = Vec::new();

    let text = if authors.is_empty() {
        String::from(concat!(
            "<b>Followed authors</b>\n\n",
            "You don't follow anyone yet. Send /follow_author inside someone's topic, ",
            "or as a reply to their message."
        ))
    } else {
        let mut text = format!("<b>Followed authors</b> ({})\n\n", page);
        let shown = authors.iter().skip(page.offset(page_size)).take(page_size);
        for author in shown {
            let _ = write!(text, "• {}", encode_text(&author.author_name));
            if author.new_posts > 0 {
                let _ = write!(text, ", <b>{} new</b>", author.new_posts);
            }
            text.push('\n');

            rows.push(vec![button(
                format!("➖ Unfollow {}", author.author_name),
                MenuCallback::UnfollowAuthor(author.author_id, page.index),
            )]);
        }
        text
    };

    rows.push(paging_row(page, MenuCallback::AuthorsPage));
    rows.push(back_row());
    rows.retain(|x| !x.is_empty());

    (with_status(status, text), InlineKeyboardMarkup::new(rows))
}

/// Every chat the user has settings in, with a button to flip the subscription.
pub fn subscriptions_view(
    subscriptions: &[KeywordSubscription],
    status: Option<&str>,
) -> (String, InlineKeyboardMarkup) {
    let mut rows = Vec::new();

    let mut text = String::from("<b>Chat subscriptions</b>\n\n");
    if subscriptions.is_empty() {
        text.push_str(concat!(
            "You have no subscriptions. Send /subscribe in a forum chat to get pinged ",
            "about its new topics."
        ));
    }

    for subscription in subscriptions {
        let chat = subscription.chat_id;
        let name = match internal_chat_id(chat) {
            Some(internal) => format!("<a href=\"https://t.me/c/{internal}\">Chat {chat}</a>"),
            None => format!("Chat {chat}"),
        };
        let state = if subscription.is_subscribed {
            "✅ subscribed"
        } else {
            "❌ not subscribed"
        };
        let _ = writeln!(text, "<b>{name}</b>: {state}");

        let _ = writeln!(
            text,
            "  Following: {}",
            match subscription.followed_keywords.is_empty() {
                true => String::from("everything"),
                false => encode_text(&subscription.followed_keywords.join(", ")).into_owned(),
            }
        );
        if !subscription.blocked_keywords.is_empty() {
            let _ = writeln!(
                text,
                "  Blocked: {}",
                encode_text(&subscription.blocked_keywords.join(", "))
            );
        }

        let label = match subscription.is_subscribed {
            true => format!("🔕 Unsubscribe from chat {chat}"),
            false => format!("🔔 Subscribe to chat {chat}"),
        };
        rows.push(vec![button(label, MenuCallback::ToggleSubscription(chat))]);
    }

    if !subscriptions.is_empty() {
        text.push_str("\nChange keywords with /keywords inside the chat.");
    }

    rows.push(back_row());
    (with_status(status, text), InlineKeyboardMarkup::new(rows))
}

/// One page of favorites. `favorites` is just that page.
pub fn favorites_page(
    favorites: &[FavoriteThread],
    page: Page,
    status: Option<&str>,
) -> (String, InlineKeyboardMarkup) {
    let mut rows = Vec::new();

    let text = if favorites.is_empty() {
        String::from(concat!(
            "<b>Favorite topics</b>\n\n",
            "No favorites yet. Send /favorite inside a topic, ",
            "or add topics you've been posting in below."
        ))
    } else {
        let mut text = format!("<b>Favorite topics</b> ({})\n\n", page);
        for (number, favorite) in favorites.iter().enumerate() {
            let _ = writeln!(
                text,
                "{}. {}",
                number + 1,
                topic_title_html(favorite.topic, &favorite.title)
            );
            rows.push(vec![button(
                format!("🗑 {}. {}", number + 1, favorite.title),
                MenuCallback::RemoveFavorite(favorite.topic, page.index),
            )]);
        }
        text
    };

    rows.push(paging_row(page, MenuCallback::FavoritesPage));
    if !favorites.is_empty() {
        rows.push(vec![button(
            "🗑 Remove this whole page",
            MenuCallback::RemoveFavoritesPage(page.index),
        )]);
    }
    rows.push(vec![button(
        "➕ Add from my active topics",
        MenuCallback::ActivePage(0),
    )]);
    rows.push(back_row());
    rows.retain(|x| !x.is_empty());

    (with_status(status, text), InlineKeyboardMarkup::new(rows))
}

/// One page of active, not yet favorited topics. `threads` is the whole list.
pub fn active_threads_page(
    threads: &[ActiveThread],
    page: Page,
    page_size: usize,
    status: Option<&str>,
) -> (String, InlineKeyboardMarkup) {
    let mut rows = Vec::new();

    let text = if threads.is_empty() {
        String::from(concat!(
            "<b>Your active topics</b>\n\n",
            "Nothing to add: every topic you've recently posted in is a favorite already."
        ))
    } else {
        let mut text = format!("<b>Your active topics</b> ({})\n\n", page);
        let shown = threads.iter().skip(page.offset(page_size)).take(page_size);
        for (number, thread) in shown.enumerate() {
            let _ = writeln!(
                text,
                "{}. {}",
                number + 1,
                topic_title_html(thread.topic, &thread.title)
            );
            rows.push(vec![button(
                format!("⭐ {}. {}", number + 1, thread.title),
                MenuCallback::AddActive(thread.topic, page.index),
            )]);
        }
        text
    };

    rows.push(paging_row(page, MenuCallback::ActivePage));
    if !threads.is_empty() {
        rows.push(vec![button(
            format!("⭐ Favorite all {}", threads.len()),
            MenuCallback::AddAllActive,
        )]);
    }
    rows.push(vec![button("⬅️ Back to favorites", MenuCallback::FavoritesPage(0))]);
    rows.retain(|x| !x.is_empty());

    (with_status(status, text), InlineKeyboardMarkup::new(rows))
}
