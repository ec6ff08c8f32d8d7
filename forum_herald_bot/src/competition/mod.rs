//! Following competition messages and telling followers about new submissions.
//!
//! Competitions are messages that get edited as submissions come in. Edits of
//! followed ones stash their current submission IDs as "pending", and
//! [`competition_check_spinloop`] periodically diffs those against what was seen
//! before and sends out direct messages.

pub mod parsing;

use std::{sync::Weak, time::Duration};

use html_escape::encode_text;
use teloxide::{
    types::{ChatId, MessageId, UserId},
    Bot,
};

use crate::{
    actions::send_dm,
    database::{Database, Error},
    error::BotResult,
    misc::message_link,
    types::Competition,
};

pub use parsing::{extract_submission_ids, find_new_submissions, parse_message_link};

/// Pause between direct messages, to stay well under Telegram's limits.
const NOTIFICATION_DELAY: Duration = Duration::from_millis(50);

/// Start tracking the competition if nobody did yet, and subscribe the user to it.
/// Returns `false` if they were subscribed already.
pub async fn follow_competition(
    db: &Database,
    user: UserId,
    chat: ChatId,
    message: MessageId,
    thread: Option<MessageId>,
    title: &str,
    initial_ids: &[String],
) -> Result<bool, Error> {
    db.ensure_competition_exists(chat, message, thread, title, initial_ids)
        .await?;
    let new = db.add_competition_subscriber(user, chat, message).await?;
    if new {
        log::info!("User {user} followed competition {chat}/{}.", message.0);
    }
    Ok(new)
}

/// Returns `false` if the user wasn't following it.
pub async fn unfollow_competition(
    db: &Database,
    user: UserId,
    chat: ChatId,
    message: MessageId,
) -> Result<bool, Error> {
    let removed = db
        .remove_competition_subscriber(user, chat, message)
        .await?;
    if removed {
        log::info!("User {user} unfollowed competition {chat}/{}.", message.0);
    }
    Ok(removed)
}

pub async fn get_followed_competition(
    db: &Database,
    chat: ChatId,
    message: MessageId,
) -> Result<Option<Competition>, Error> {
    db.get_competition(chat, message).await
}

pub async fn get_subscribers_for_competition(
    db: &Database,
    chat: ChatId,
    message: MessageId,
) -> Result<Vec<UserId>, Error> {
    db.get_subscribers_for_competition(chat, message).await
}

/// Mark these submission IDs as notified about.
pub async fn update_submission_state(
    db: &Database,
    chat: ChatId,
    message: MessageId,
    ids: &[String],
) -> Result<(), Error> {
    db.update_competition_submissions(chat, message, ids).await
}

pub async fn get_all_followed_competitions(db: &Database) -> Result<Vec<Competition>, Error> {
    db.get_all_followed_competitions().await
}

/// Handle an edit of some message. If it's a followed competition, remember its
/// current submissions for the checker. Returns `true` if it was one.
pub async fn note_competition_edit(
    db: &Database,
    chat: ChatId,
    message: MessageId,
    text: &str,
) -> Result<bool, Error> {
    let ids = extract_submission_ids(text);
    let noted = db.set_pending_submissions(chat, message, &ids).await?;
    if noted {
        log::debug!(
            "Competition {chat}/{} edited, now with {} submission(s).",
            message.0,
            ids.len()
        );
    }
    Ok(noted)
}

fn notification_text(competition: &Competition, submission_id: &str) -> String {
    let mut text = format!(
        "🏆 <b>Competition update</b>\n\nThe competition <b>{}</b> you follow has a new submission!\n\nSubmission ID: <code>{}</code>",
        encode_text(&competition.title),
        encode_text(submission_id),
    );
    if let Some(link) = message_link(
        competition.chat_id,
        competition.thread_id,
        competition.message_id,
    ) {
        text.push_str(&format!("\n<a href=\"{link}\">Jump to the competition</a>"));
    }
    text
}

/// Process the pending edit of one competition: notify every subscriber of every new
/// submission, then add those to the notified-about set. Returns how many new
/// submissions there were.
///
/// Submissions that vanish from an edit stay in the set, so an edit that drops the
/// list or shuffles entries around never gets anything announced twice.
pub async fn process_pending_competition(
    bot: &Bot,
    db: &Database,
    competition: &Competition,
) -> BotResult<usize> {
    let Some(pending) = &competition.pending_submission_ids else {
        return Ok(0);
    };

    let new = find_new_submissions(&competition.last_submission_ids, pending);

    if new.is_empty() {
        db.clear_pending_submissions(competition.chat_id, competition.message_id, pending)
            .await?;
        return Ok(0);
    }

    let subscribers = db
        .get_subscribers_for_competition(competition.chat_id, competition.message_id)
        .await?;

    log::info!(
        "Competition \"{}\" has {} new submission(s), notifying {} subscriber(s).",
        competition.title,
        new.len(),
        subscribers.len()
    );

    for user in subscribers {
        for submission_id in &new {
            match send_dm(bot, user, notification_text(competition, submission_id)).await {
                Ok(true) => {}
                // Unreachable, no point in trying the rest.
                Ok(false) => break,
                Err(e) => {
                    log::error!("Failed to notify user {user} about a submission: {e}");
                    break;
                }
            }
            tokio::time::sleep(NOTIFICATION_DELAY).await;
        }
    }

    let mut seen = competition.last_submission_ids.clone();
    seen.extend(new.iter().cloned());
    db.commit_pending_submissions(competition.chat_id, competition.message_id, &seen, pending)
        .await?;

    Ok(new.len())
}

/// Go through every followed competition once.
pub async fn check_competitions(bot: &Bot, db: &Database) -> BotResult<()> {
    for competition in db.get_all_followed_competitions().await? {
        if competition.pending_submission_ids.is_none() {
            continue;
        }
        if let Err(e) = process_pending_competition(bot, db, &competition).await {
            log::error!(
                "Failed to process competition {}/{}: {e}",
                competition.chat_id,
                competition.message_id.0
            );
        }
    }
    Ok(())
}

pub async fn competition_check_spinloop(bot: Bot, database: Weak<Database>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;

        let Some(database) = database.upgrade() else {
            // No more database!
            return;
        };

        if let Err(e) = check_competitions(&bot, &database).await {
            log::error!("Competition check failed: {e}");
        }
    }
}
