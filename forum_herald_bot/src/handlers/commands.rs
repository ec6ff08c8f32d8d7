use std::{future::Future, pin::Pin};

use bot_commons::{
    get_admin_of, retry_on_server_error,
    useful_methods::{user_display_name, MessageStuff},
};
use html_escape::encode_text;
use teloxide::{
    payloads::{ForwardMessageSetters, SendMessageSetters},
    requests::{Request, Requester},
    sugar::request::{RequestLinkPreviewExt, RequestReplyExt},
    types::{BotCommand, ChatId, InlineKeyboardMarkup, Me, Message, MessageId, ParseMode, User, UserId},
    Bot, RequestError,
};

use crate::{
    author_follow,
    competition::{self, parsing::competition_title, parsing::LinkedChat},
    config::Config,
    cooldown::CommandCooldown,
    database::Database,
    error::BotResult,
    favorites,
    profile,
    scanner::ThreadScanner,
    subscription,
    types::{FollowResult, KeywordSubscription, Page, TopicRef, UnfollowResult},
    views,
};

pub const COMMANDS: &[Command] = &[
    START,
    HELP,
    MENU,
    FOLLOW_AUTHOR,
    UNFOLLOW_AUTHOR,
    MY_FOLLOWS,
    SUBSCRIBE,
    UNSUBSCRIBE,
    KEYWORDS,
    SUBSCRIPTIONS,
    FOLLOW_COMPETITION,
    UNFOLLOW_COMPETITION,
    FAVORITE,
    UNFAVORITE,
    FAVORITES,
    ____SEPARATOR,
    RESCAN,
];

pub type Ret = BotResult<()>;
pub type CommandFuture<'a> = Pin<Box<dyn Future<Output = Ret> + Send + 'a>>;

pub struct CommandParams<'a> {
    pub bot: &'a Bot,
    pub bot_me: &'a Me,
    pub message: &'a Message,
    pub db: &'a Database,
    pub config: &'a Config,
    pub scanner: &'a ThreadScanner,
    pub follow_cooldown: &'a CommandCooldown,
    pub message_text: &'a str,
    pub command_len: usize,
}

impl<'a> CommandParams<'a> {
    pub fn new<'new>(
        bot: &'new Bot,
        bot_me: &'new Me,
        message: &'new Message,
        db: &'new Database,
        config: &'new Config,
        scanner: &'new ThreadScanner,
        follow_cooldown: &'new CommandCooldown,
    ) -> Option<CommandParams<'new>> {
        let message_text = message.text_full()?;

        if !message_text.starts_with('/') {
            return None;
        }

        let command = message_text.split_whitespace().next()?;

        if !command.is_ascii() {
            // Telegram commands must be ASCII.
            // See https://core.telegram.org/bots/api#botcommand
            return None;
        }

        let command_len = command.len();

        Some(CommandParams {
            bot,
            bot_me,
            message,
            db,
            config,
            scanner,
            follow_cooldown,
            message_text,
            command_len,
        })
    }

    pub fn make_future(self) -> Option<CommandFuture<'a>> {
        // If the command is "/menu@Forum_Herald_Bot", trim the "@" and everything after it.
        let callname = if let Some(username_start) = self.command().find('@') {
            // While we're here, also check if the username is actually ours.
            // Bot names are guaranteed ASCII, so ignore ASCII case specifically.
            if !self.command()[username_start + '@'.len_utf8()..]
                .eq_ignore_ascii_case(self.bot_me.username())
            {
                // This command is not for us. Ignore.
                return None;
            }

            &self.command()[0..username_start]
        } else {
            self.command()
        };
        for command in COMMANDS {
            if command.is_matching_callname(callname) {
                return Some((command.function)(self));
            }
        }
        None
    }

    /// If the input is `/keywords follow rust`, this is `/keywords`.
    #[inline]
    pub fn command(&self) -> &'a str {
        &self.message_text[..self.command_len]
    }

    /// If the input is `/keywords follow rust`, this is `follow rust`.
    #[inline]
    pub fn get_params(&self) -> &'a str {
        self.message_text[self.command_len..].trim()
    }

    /// The person who sent the command, unless it's an anonymous admin or a channel.
    pub fn sender(&self) -> Option<&'a User> {
        self.message.from.as_ref().filter(|x| !x.is_bot)
    }

    /// The forum topic the command was sent in, if any.
    pub fn topic_here(&self) -> Option<TopicRef> {
        self.message
            .thread_id
            .map(|x| TopicRef::new(self.message.chat.id, x.0))
    }

    pub async fn reply(&self, text: impl Into<String>) -> Result<Message, RequestError> {
        let text: String = text.into();
        retry_on_server_error("reply to command", || {
            self.bot
                .send_message(self.message.chat.id, text.clone())
                .parse_mode(ParseMode::Html)
                .disable_link_preview(true)
                .reply_to(self.message.id)
                .send()
        })
        .await
    }

    pub async fn reply_with_keyboard(
        &self,
        (text, keyboard): (String, InlineKeyboardMarkup),
    ) -> Result<Message, RequestError> {
        retry_on_server_error("reply with a menu", || {
            self.bot
                .send_message(self.message.chat.id, text.clone())
                .parse_mode(ParseMode::Html)
                .disable_link_preview(true)
                .reply_markup(keyboard.clone())
                .reply_to(self.message.id)
                .send()
        })
        .await
    }
}

pub struct Command {
    pub callname: &'static str,
    pub description: &'static str,
    pub function: fn(CommandParams) -> CommandFuture,
    hidden: bool,
}

impl Command {
    pub fn is_matching_callname(&self, command: &str) -> bool {
        self.callname
            .split_ascii_whitespace()
            .next()
            .is_some_and(|x| x.eq_ignore_ascii_case(command))
    }

    pub fn get_help(&self, mut output: impl std::fmt::Write) -> Result<(), std::fmt::Error> {
        // useful for the separator "command"
        if self.callname.is_empty() && self.description.is_empty() {
            return Ok(());
        }

        output.write_str(self.callname)?;
        if !self.description.is_empty() {
            output.write_str(" - ")?;
            output.write_str(self.description)?;
        }

        Ok(())
    }

    pub fn generate_help() -> String {
        let mut response = String::from(concat!(
            "<b>Forum Herald</b> pings you about new forum topics and competition ",
            "submissions you care about.\n\n"
        ));
        for command in COMMANDS {
            if command.hidden {
                continue;
            }
            // Writing into a String can't fail.
            let _ = command.get_help(&mut response);
            response += "\n\n";
        }
        response.truncate(response.trim_end().len());
        response
    }

    pub fn generate_bot_commands() -> Vec<BotCommand> {
        let mut output = Vec::new();

        for command in COMMANDS {
            if command.hidden {
                continue;
            }
            let Some(callname) = command.callname.split_ascii_whitespace().next() else {
                continue;
            };

            // Cut off the /
            let callname = callname[1..].trim().to_string();
            let description = command
                .description
                .replace("&lt;", "<")
                .replace("&gt;", ">");

            output.push(BotCommand {
                command: callname,
                description,
            });
        }

        output
    }
}

/// Run the command in this message, if there is one. Failures are logged and
/// apologized for.
pub async fn handle_command(
    bot: &Bot,
    me: &Me,
    message: &Message,
    db: &Database,
    config: &Config,
    scanner: &ThreadScanner,
    follow_cooldown: &CommandCooldown,
) -> Result<(), RequestError> {
    let Some(params) =
        CommandParams::new(bot, me, message, db, config, scanner, follow_cooldown)
    else {
        return Ok(());
    };
    let command = params.command().to_string();
    let Some(future) = params.make_future() else {
        return Ok(());
    };

    if let Err(e) = future.await {
        log::error!(
            "Command {command} in chat {} failed: {e}",
            message.chat.id
        );
        bot.send_message(
            message.chat.id,
            "Something went wrong, sorry. Please try again later.",
        )
        .reply_to(message.id)
        .await?;
    }

    Ok(())
}

/// The message this one replies to, unless that's just the creation of the topic
/// it was posted in. Telegram marks every topic message as a reply to that.
fn explicit_reply(message: &Message) -> Option<&Message> {
    message
        .reply_to_message()
        .filter(|x| x.forum_topic_created().is_none())
}

/// Who created the topic this message was posted in, as far as Telegram tells us.
fn topic_creator(message: &Message) -> Option<&User> {
    message
        .reply_to_message()
        .filter(|x| x.forum_topic_created().is_some())
        .and_then(|x| x.from.as_ref())
        .filter(|x| !x.is_bot)
}

///////////////////////////////////////
/////////////////COMMAND DEFINITIONS
///////////////////////////////////////

/// Wraps the function's return value in a pinning closure.
macro_rules! wrap {
    ($thing:expr) => {
        |tp| Box::pin($thing(tp))
    };
}

/// Reply with this and stop.
macro_rules! goodbye {
    ($tp:expr, $text:expr) => {{
        $tp.reply($text).await?;
        return Ok(());
    }};
}

/// Get the sender, or tell them off for being anonymous.
macro_rules! sender_or_goodbye {
    ($tp:expr) => {
        match $tp.sender() {
            Some(x) => x,
            None => goodbye!(
                $tp,
                "I can't tell who you are. Anonymous admins and channels can't use this."
            ),
        }
    };
}

/// Stop if this user ran a follow command too recently.
macro_rules! follow_cooldown {
    ($tp:expr, $user:expr) => {
        if let Err(left) = $tp.follow_cooldown.try_use($user.id) {
            goodbye!(
                $tp,
                format!(
                    "Slow down! Try again in {:.1} seconds.",
                    left.as_secs_f64()
                )
            );
        }
    };
}

/// Stop with a pointer to the private chat, unless we're in it.
macro_rules! private_only {
    ($tp:expr) => {
        if !$tp.message.chat.is_private() {
            goodbye!(
                $tp,
                format!(
                    "This works in <a href=\"https://t.me/{}\">private chat with me</a>.",
                    $tp.bot_me.username()
                )
            );
        }
    };
}

/// Stop, unless we're in one of the forums this bot keeps track of.
macro_rules! resource_chat_only {
    ($tp:expr) => {
        if !$tp.config.is_resource_chat($tp.message.chat.id) {
            goodbye!($tp, "This works only in the forums I keep track of.");
        }
    };
}

pub const START: Command = Command {
    callname: "/start",
    description: "",
    function: wrap!(start),
    hidden: true,
};
async fn start(tp: CommandParams<'_>) -> Ret {
    if !tp.message.chat.is_private() {
        return Ok(());
    }
    goodbye!(
        tp,
        "hi!

I ping you when authors you follow open new forum topics, when topics matching your keywords appear, \
and when competitions you follow get new submissions.

For a full list of commands, send /help
To manage everything in one place, send /menu"
    );
}

pub const HELP: Command = Command {
    callname: "/help",
    description: "Show this list.",
    function: wrap!(help),
    hidden: false,
};
async fn help(tp: CommandParams<'_>) -> Ret {
    goodbye!(tp, Command::generate_help());
}

pub const MENU: Command = Command {
    callname: "/menu",
    description: "Manage your follows, subscriptions and favorites.",
    function: wrap!(menu),
    hidden: false,
};
async fn menu(tp: CommandParams<'_>) -> Ret {
    private_only!(tp);
    tp.reply_with_keyboard(views::main_menu()).await?;
    Ok(())
}

/// The author a follow command is about: the sender of the message it replies to,
/// or else the creator of the topic it's sent in.
async fn target_author(tp: &CommandParams<'_>) -> BotResult<Option<(UserId, String)>> {
    if let Some(replied) = explicit_reply(tp.message) {
        return Ok(replied
            .from
            .as_ref()
            .filter(|x| !x.is_bot)
            .map(|x| (x.id, user_display_name(x))));
    }

    if let Some(creator) = topic_creator(tp.message) {
        return Ok(Some((creator.id, user_display_name(creator))));
    }

    let Some(topic) = tp.topic_here() else {
        return Ok(None);
    };
    let Some(author) = tp.db.get_topic(topic).await?.and_then(|x| x.author_id) else {
        return Ok(None);
    };
    let name = tp
        .db
        .get_author_name(author)
        .await?
        .unwrap_or_else(|| format!("user {author}"));
    Ok(Some((author, name)))
}

const NO_AUTHOR: &str =
    "Send this inside someone's topic, or as a reply to one of their messages.";

pub const FOLLOW_AUTHOR: Command = Command {
    callname: "/follow_author",
    description: "Get pinged in every new topic of an author. Send it inside their topic, or as a reply to their message.",
    function: wrap!(follow_author),
    hidden: false,
};
async fn follow_author(tp: CommandParams<'_>) -> Ret {
    let user = sender_or_goodbye!(tp);
    follow_cooldown!(tp, user);
    let Some((author, name)) = target_author(&tp).await? else {
        goodbye!(tp, NO_AUTHOR);
    };

    let name_html = encode_text(&name);
    let response = match author_follow::follow_author(tp.db, user.id, author, &name).await? {
        FollowResult::Success => format!(
            "✅ You now follow <b>{name_html}</b>. I'll ping you in their new topics."
        ),
        FollowResult::AlreadyFollowed => format!("You already follow <b>{name_html}</b>."),
        FollowResult::CannotFollowSelf => "You can't follow yourself.".to_string(),
    };
    goodbye!(tp, response);
}

pub const UNFOLLOW_AUTHOR: Command = Command {
    callname: "/unfollow_author",
    description: "Stop following an author. Works like /follow_author.",
    function: wrap!(unfollow_author),
    hidden: false,
};
async fn unfollow_author(tp: CommandParams<'_>) -> Ret {
    let user = sender_or_goodbye!(tp);
    follow_cooldown!(tp, user);
    let Some((author, name)) = target_author(&tp).await? else {
        goodbye!(tp, NO_AUTHOR);
    };

    let name_html = encode_text(&name);
    let response = match author_follow::unfollow_author(tp.db, user.id, author).await? {
        UnfollowResult::Success => format!("You no longer follow <b>{name_html}</b>."),
        UnfollowResult::NotFollowed => format!("You don't follow <b>{name_html}</b>."),
    };
    goodbye!(tp, response);
}

pub const MY_FOLLOWS: Command = Command {
    callname: "/my_follows",
    description: "List the authors you follow, with how many topics they opened since you last looked.",
    function: wrap!(my_follows),
    hidden: false,
};
async fn my_follows(tp: CommandParams<'_>) -> Ret {
    private_only!(tp);
    let user = sender_or_goodbye!(tp);

    let authors = profile::get_user_profile_data(tp.db, user.id).await?;
    let page_size = tp.config.profile_page_size;
    let page = Page::clamped(0, authors.len(), page_size);
    tp.reply_with_keyboard(views::authors_page(&authors, page, page_size, None))
        .await?;
    Ok(())
}

pub const SUBSCRIBE: Command = Command {
    callname: "/subscribe",
    description: "Get pinged about new topics in this forum.",
    function: wrap!(subscribe),
    hidden: false,
};
async fn subscribe(tp: CommandParams<'_>) -> Ret {
    resource_chat_only!(tp);
    let user = sender_or_goodbye!(tp);

    subscription::follow_channel(tp.db, user.id, tp.message.chat.id).await?;
    goodbye!(
        tp,
        "🔔 I'll ping you about new topics here. Narrow it down with /keywords."
    );
}

pub const UNSUBSCRIBE: Command = Command {
    callname: "/unsubscribe",
    description: "Stop getting pinged about new topics in this forum. Your keywords are kept.",
    function: wrap!(unsubscribe),
    hidden: false,
};
async fn unsubscribe(tp: CommandParams<'_>) -> Ret {
    resource_chat_only!(tp);
    let user = sender_or_goodbye!(tp);

    if subscription::unfollow_channel(tp.db, user.id, tp.message.chat.id).await? {
        goodbye!(tp, "🔕 No more pings about new topics here.");
    } else {
        goodbye!(tp, "You weren't subscribed here.");
    }
}

fn describe_keywords(subscription: &KeywordSubscription) -> String {
    let list = |x: &[String]| match x.is_empty() {
        true => String::from("<i>none</i>"),
        false => encode_text(&x.join(", ")).into_owned(),
    };
    let mut text = format!(
        "Following: {}\nBlocked: {}",
        list(&subscription.followed_keywords),
        list(&subscription.blocked_keywords)
    );
    if !subscription.is_subscribed {
        text.push_str("\n\nYou're not subscribed here though. Send /subscribe to be.");
    }
    text
}

const KEYWORDS_USAGE: &str = concat!(
    "Usage: <code>/keywords follow rust, tokio; block spoilers</code>\n\n",
    "With followed keywords, only topics mentioning one of them in the title or ",
    "hashtags ping you. Blocked keywords stop pings no matter what. ",
    "Leaving a part out clears it."
);

pub const KEYWORDS: Command = Command {
    callname: "/keywords &lt;follow a, b; block c&gt;",
    description: "Set which new topics of this forum ping you. Without parameters, shows the current ones.",
    function: wrap!(keywords),
    hidden: false,
};
async fn keywords(tp: CommandParams<'_>) -> Ret {
    resource_chat_only!(tp);
    let user = sender_or_goodbye!(tp);
    let chat = tp.message.chat.id;

    let params = tp.get_params();
    if params.is_empty() {
        let Some(existing) = subscription::get_subscription(tp.db, user.id, chat).await? else {
            goodbye!(
                tp,
                format!("You have no settings here yet.\n\n{KEYWORDS_USAGE}")
            );
        };
        goodbye!(tp, describe_keywords(&existing));
    }

    let Some((followed, blocked)) = subscription::parse_keywords_params(params) else {
        goodbye!(tp, KEYWORDS_USAGE);
    };
    let updated =
        subscription::update_subscription(tp.db, user.id, chat, &followed, &blocked).await?;
    goodbye!(tp, format!("Keywords saved.\n\n{}", describe_keywords(&updated)));
}

pub const SUBSCRIPTIONS: Command = Command {
    callname: "/subscriptions",
    description: "List the forums you're subscribed to.",
    function: wrap!(subscriptions),
    hidden: false,
};
async fn subscriptions(tp: CommandParams<'_>) -> Ret {
    private_only!(tp);
    let user = sender_or_goodbye!(tp);

    let subscriptions = tp.db.get_subscriptions_for_user(user.id).await?;
    tp.reply_with_keyboard(views::subscriptions_view(&subscriptions, None))
        .await?;
    Ok(())
}

const COMPETITION_USAGE: &str = concat!(
    "Reply to the competition message with this, ",
    "or pass a link to it, like <code>/follow_competition https://t.me/c/123/456</code>."
);

const USERNAME_LINK: &str = concat!(
    "I can't use links to public chats by their username. ",
    "Reply to the competition message instead, ",
    "or use a <code>t.me/c/...</code> link to it."
);

/// Read the text of a message in another chat by forwarding it here and deleting
/// the copy right away. `None` if the bot can't see the message or it has no text.
async fn read_linked_message(
    tp: &CommandParams<'_>,
    chat: ChatId,
    message: MessageId,
) -> BotResult<Option<String>> {
    let mut request = tp
        .bot
        .forward_message(tp.message.chat.id, chat, message)
        .disable_notification(true);
    if let Some(thread) = tp.message.thread_id {
        request = request.message_thread_id(thread);
    }

    let copy = match request.await {
        Ok(x) => x,
        Err(e) => {
            log::debug!("Couldn't forward message {} of chat {chat}: {e}", message.0);
            return Ok(None);
        }
    };

    let text = copy.text_full().map(str::to_owned);
    if let Err(e) = tp.bot.delete_message(copy.chat.id, copy.id).await {
        log::warn!("Failed to delete a forwarded competition copy: {e}");
    }
    Ok(text)
}

pub const FOLLOW_COMPETITION: Command = Command {
    callname: "/follow_competition &lt;link&gt;",
    description: "Get a direct message for every new submission of a competition. Reply to it, or pass a link to it.",
    function: wrap!(follow_competition),
    hidden: false,
};
async fn follow_competition(tp: CommandParams<'_>) -> Ret {
    let user = sender_or_goodbye!(tp);
    let params = tp.get_params();

    let (chat, message, thread, text) = if let Some(replied) = explicit_reply(tp.message) {
        (
            replied.chat.id,
            replied.id,
            replied.thread_id.map(|x| x.0),
            replied.text_full().map(str::to_owned),
        )
    } else if !params.is_empty() {
        let Some(link) = competition::parse_message_link(params) else {
            goodbye!(tp, COMPETITION_USAGE);
        };
        let LinkedChat::Id(chat) = link.chat else {
            goodbye!(tp, USERNAME_LINK);
        };
        let text = read_linked_message(&tp, chat, link.message).await?;
        (chat, link.message, link.thread, text)
    } else {
        goodbye!(tp, COMPETITION_USAGE);
    };

    let Some(text) = text else {
        goodbye!(
            tp,
            "I can't read that message. Make sure I'm in that chat and that the message has text."
        );
    };

    let ids = competition::extract_submission_ids(&text);
    let title = competition_title(&text);
    let new =
        competition::follow_competition(tp.db, user.id, chat, message, thread, &title, &ids)
            .await?;

    let title_html = encode_text(&title);
    if new {
        goodbye!(
            tp,
            format!(
                "🏆 Following <b>{title_html}</b>. It has {} submission(s) so far; \
                I'll DM you about new ones. Make sure you've started a private chat with me!",
                ids.len()
            )
        );
    } else {
        goodbye!(tp, format!("You already follow <b>{title_html}</b>."));
    }
}

pub const UNFOLLOW_COMPETITION: Command = Command {
    callname: "/unfollow_competition &lt;link&gt;",
    description: "Stop following a competition. Works like /follow_competition.",
    function: wrap!(unfollow_competition),
    hidden: false,
};
async fn unfollow_competition(tp: CommandParams<'_>) -> Ret {
    let user = sender_or_goodbye!(tp);
    let params = tp.get_params();

    let (chat, message) = if let Some(replied) = explicit_reply(tp.message) {
        (replied.chat.id, replied.id)
    } else if !params.is_empty() {
        let Some(link) = competition::parse_message_link(params) else {
            goodbye!(tp, COMPETITION_USAGE);
        };
        let LinkedChat::Id(chat) = link.chat else {
            goodbye!(tp, USERNAME_LINK);
        };
        (chat, link.message)
    } else {
        goodbye!(tp, COMPETITION_USAGE);
    };

    if competition::unfollow_competition(tp.db, user.id, chat, message).await? {
        goodbye!(tp, "You no longer follow that competition.");
    } else {
        goodbye!(tp, "You weren't following that competition.");
    }
}

pub const FAVORITE: Command = Command {
    callname: "/favorite",
    description: "Add the topic you send this in to your favorites.",
    function: wrap!(favorite),
    hidden: false,
};
async fn favorite(tp: CommandParams<'_>) -> Ret {
    let user = sender_or_goodbye!(tp);
    let Some(topic) = tp.topic_here() else {
        goodbye!(tp, "Send this inside a topic to add it to your favorites.");
    };

    if favorites::add_favorite(tp.db, user.id, topic).await? {
        goodbye!(
            tp,
            "⭐ Added to your favorites. See them all with /favorites in private."
        );
    } else {
        goodbye!(tp, "This topic is already one of your favorites.");
    }
}

pub const UNFAVORITE: Command = Command {
    callname: "/unfavorite",
    description: "Remove the topic you send this in from your favorites.",
    function: wrap!(unfavorite),
    hidden: false,
};
async fn unfavorite(tp: CommandParams<'_>) -> Ret {
    let user = sender_or_goodbye!(tp);
    let Some(topic) = tp.topic_here() else {
        goodbye!(tp, "Send this inside a topic to remove it from your favorites.");
    };

    if favorites::remove_favorite(tp.db, user.id, topic).await? {
        goodbye!(tp, "Removed from your favorites.");
    } else {
        goodbye!(tp, "This topic isn't one of your favorites.");
    }
}

pub const FAVORITES: Command = Command {
    callname: "/favorites",
    description: "List your favorite topics.",
    function: wrap!(favorites_list),
    hidden: false,
};
async fn favorites_list(tp: CommandParams<'_>) -> Ret {
    private_only!(tp);
    let user = sender_or_goodbye!(tp);

    let (favorites, page) =
        favorites::get_favorites_page(tp.db, user.id, 0, tp.config.favorites_page_size).await?;
    tp.reply_with_keyboard(views::favorites_page(&favorites, page, None))
        .await?;
    Ok(())
}

pub const ____SEPARATOR: Command = Command {
    callname: "",
    description: "",
    function: wrap!(do_nothing),
    hidden: false,
};
async fn do_nothing(_: CommandParams<'_>) -> Ret {
    Ok(())
}

pub const RESCAN: Command = Command {
    callname: "/rescan",
    description: "(admins) Refresh who's active in which topic of this forum right now.",
    function: wrap!(rescan),
    hidden: false,
};
async fn rescan(tp: CommandParams<'_>) -> Ret {
    resource_chat_only!(tp);
    let user = sender_or_goodbye!(tp);
    let chat = tp.message.chat.id;

    if get_admin_of(tp.bot, user.id, chat).await?.is_none() {
        goodbye!(tp, "Only admins of this chat can do that.");
    }

    match tp.scanner.try_scan_chat(tp.bot, tp.db, chat).await? {
        Some(report) => goodbye!(tp, format!("Scan done: {report}.")),
        None => goodbye!(tp, "A scan is already running. Try again in a bit."),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn bot_commands_skip_hidden_and_separators() {
        let commands = Command::generate_bot_commands();
        let names: Vec<&str> = commands.iter().map(|x| x.command.as_str()).collect();

        assert!(!names.contains(&"start"));
        assert!(!names.contains(&""));
        assert!(names.contains(&"follow_author"));
        assert!(names.contains(&"rescan"));

        // Telegram wants 1-32 characters of lowercase letters, digits and underscores.
        for name in names {
            assert!((1..=32).contains(&name.len()));
            assert!(name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
        }
        for command in &commands {
            assert!((1..=256).contains(&command.description.len()));
            assert!(!command.description.contains("&lt;"));
        }
    }

    #[test]
    fn help_lists_visible_commands() {
        let help = Command::generate_help();
        assert!(help.contains("/keywords &lt;follow a, b; block c&gt; - "));
        assert!(help.contains("/favorites - List your favorite topics."));
        assert!(!help.contains("/start"));
        assert!(!help.ends_with('\n'));
    }

    #[test]
    fn callname_matching() {
        assert!(KEYWORDS.is_matching_callname("/keywords"));
        assert!(KEYWORDS.is_matching_callname("/KEYWORDS"));
        assert!(!KEYWORDS.is_matching_callname("/keyword"));
        assert!(!____SEPARATOR.is_matching_callname(""));
    }
}
