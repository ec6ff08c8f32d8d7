use std::sync::Arc;

use teloxide::{
    payloads::{AnswerCallbackQuerySetters, EditMessageTextSetters},
    requests::Requester,
    sugar::request::RequestLinkPreviewExt,
    types::{CallbackQuery, InlineKeyboardMarkup, ParseMode, UserId},
    ApiError, Bot, RequestError,
};

use crate::{
    author_follow,
    config::Config,
    database::Database,
    error::BotResult,
    favorites, profile, subscription,
    types::{Page, TopicRef, UnfollowResult},
    views::{self, MenuCallback},
};

/// What a press of a menu button turns the menu into. `None` closes it.
type MenuView = Option<(String, InlineKeyboardMarkup)>;

pub async fn handle_callback_query(
    bot: Bot,
    query: CallbackQuery,
    db: Arc<Database>,
    config: Arc<Config>,
) -> Result<(), RequestError> {
    macro_rules! goodbye {
        ($text:expr) => {
            bot.answer_callback_query(query.id.clone())
                .text($text)
                .await?;
            return Ok(());
        };
        () => {
            bot.answer_callback_query(query.id.clone()).await?;
            return Ok(());
        };
    }

    let Some(query_data) = &query.data else {
        goodbye!("No query data.");
    };

    let callback: MenuCallback = match query_data.parse() {
        Ok(x) => x,
        Err(e) => {
            goodbye!(format!("Invalid query data: {e}"));
        }
    };

    let Some(message) = query.regular_message() else {
        // May happen if the message is too old
        goodbye!("This menu is too old. Send /menu for a new one.");
    };

    let user = query.from.id;

    let view = match apply_callback(&db, &config, user, callback).await {
        Ok(x) => x,
        Err(e) => {
            log::error!("Menu action {callback} of user {user} failed: {e}");
            goodbye!("Something went wrong, sorry. Please try again later.");
        }
    };

    let Some((text, keyboard)) = view else {
        if bot.delete_message(message.chat.id, message.id).await.is_err() {
            // Too old to delete. At least get rid of the buttons.
            let _ = bot
                .edit_message_reply_markup(message.chat.id, message.id)
                .await;
        }
        goodbye!();
    };

    let edit_result = bot
        .edit_message_text(message.chat.id, message.id, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard)
        .disable_link_preview(true)
        .await;

    match edit_result {
        // Pressing the same page twice changes nothing, which is fine.
        Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => {}
        Err(e) => return Err(e),
    }

    goodbye!();
}

/// Do what the button says, and render the menu to show after.
async fn apply_callback(
    db: &Database,
    config: &Config,
    user: UserId,
    callback: MenuCallback,
) -> BotResult<MenuView> {
    Ok(Some(match callback {
        MenuCallback::MainMenu => views::main_menu(),
        MenuCallback::Close => return Ok(None),

        MenuCallback::AuthorsPage(page) => authors_view(db, config, user, page, None).await?,
        MenuCallback::UnfollowAuthor(author, page) => {
            let name = profile::get_user_profile_data_again(db, user)
                .await?
                .into_iter()
                .find(|x| x.author_id == author)
                .map(|x| x.author_name)
                .unwrap_or_else(|| format!("user {author}"));

            let status = match author_follow::unfollow_author(db, user, author).await? {
                UnfollowResult::Success => format!("Unfollowed {name}."),
                UnfollowResult::NotFollowed => format!("You didn't follow {name}."),
            };
            authors_view(db, config, user, page, Some(&status)).await?
        }

        MenuCallback::Subscriptions => subscriptions_view(db, user, None).await?,
        MenuCallback::ToggleSubscription(chat) => {
            let subscribed = subscription::get_subscription(db, user, chat)
                .await?
                .is_some_and(|x| x.is_subscribed);
            let status = if subscribed {
                subscription::unfollow_channel(db, user, chat).await?;
                format!("Unsubscribed from chat {chat}.")
            } else {
                subscription::follow_channel(db, user, chat).await?;
                format!("Subscribed to chat {chat}.")
            };
            subscriptions_view(db, user, Some(&status)).await?
        }

        MenuCallback::FavoritesPage(page) => favorites_view(db, config, user, page, None).await?,
        MenuCallback::RemoveFavorite(topic, page) => {
            let status = match favorites::remove_favorite(db, user, topic).await? {
                true => "Removed from favorites.",
                false => "That topic wasn't a favorite anymore.",
            };
            favorites_view(db, config, user, page, Some(status)).await?
        }
        MenuCallback::RemoveFavoritesPage(page) => {
            let (shown, _) =
                favorites::get_favorites_page(db, user, page, config.favorites_page_size).await?;
            let topics: Vec<TopicRef> = shown.iter().map(|x| x.topic).collect();
            let removed = favorites::batch_unfavorite_threads(db, user, &topics).await?;
            let status = format!("Removed {removed} favorite(s).");
            favorites_view(db, config, user, page, Some(&status)).await?
        }

        MenuCallback::ActivePage(page) => active_view(db, config, user, page, None).await?,
        MenuCallback::AddActive(topic, page) => {
            let status = match favorites::add_favorite(db, user, topic).await? {
                true => "Added to favorites.",
                false => "That topic is a favorite already.",
            };
            active_view(db, config, user, page, Some(status)).await?
        }
        MenuCallback::AddAllActive => {
            let threads = favorites::get_unfavorited_threads_for_user(db, user).await?;
            let added = favorites::batch_favorite_threads(db, user, &threads).await?;
            let status = format!("Added {added} topic(s) to favorites.");
            favorites_view(db, config, user, 0, Some(&status)).await?
        }
    }))
}

async fn authors_view(
    db: &Database,
    config: &Config,
    user: UserId,
    page: usize,
    status: Option<&str>,
) -> BotResult<(String, InlineKeyboardMarkup)> {
    // Flipping pages isn't a new look, so counts stay put.
    let authors = profile::get_user_profile_data_again(db, user).await?;
    let page_size = config.profile_page_size;
    let page = Page::clamped(page, authors.len(), page_size);
    Ok(views::authors_page(&authors, page, page_size, status))
}

async fn subscriptions_view(
    db: &Database,
    user: UserId,
    status: Option<&str>,
) -> BotResult<(String, InlineKeyboardMarkup)> {
    let subscriptions = db.get_subscriptions_for_user(user).await?;
    Ok(views::subscriptions_view(&subscriptions, status))
}

async fn favorites_view(
    db: &Database,
    config: &Config,
    user: UserId,
    page: usize,
    status: Option<&str>,
) -> BotResult<(String, InlineKeyboardMarkup)> {
    let (favorites, page) =
        favorites::get_favorites_page(db, user, page, config.favorites_page_size).await?;
    Ok(views::favorites_page(&favorites, page, status))
}

async fn active_view(
    db: &Database,
    config: &Config,
    user: UserId,
    page: usize,
    status: Option<&str>,
) -> BotResult<(String, InlineKeyboardMarkup)> {
    let threads = favorites::get_unfavorited_threads_for_user(db, user).await?;
    let page_size = config.favorites_page_size;
    let page = Page::clamped(page, threads.len(), page_size);
    Ok(views::active_threads_page(&threads, page, page_size, status))
}
