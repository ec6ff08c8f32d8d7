//! Keeping the list of who's active in which topic fresh.
//!
//! Telegram doesn't let bots list topics or their participants, so memberships are
//! recorded as people post (see [`crate::handlers`]), and a scan periodically throws
//! out the stale ones: old, in closed topics, or of people who left the chat.

use std::{fmt::Display, sync::Weak, time::Duration};

use bot_commons::retry_on_server_error;
use chrono::Utc;
use futures::future::join_all;
use teloxide::{
    requests::{Request, Requester},
    types::ChatId,
    Bot,
};
use tokio::sync::Mutex;

use crate::{config::Config, database::Database, error::BotResult};

/// What a scan of one chat did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub stale_pruned: u64,
    pub closed_pruned: u64,
    pub members_checked: usize,
    pub members_departed: usize,
}

impl Display for ScanReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} stale and {} closed-topic membership(s) pruned, {} member(s) checked, {} of them gone",
            self.stale_pruned, self.closed_pruned, self.members_checked, self.members_departed
        )
    }
}

pub struct ThreadScanner {
    concurrent_tasks: usize,
    chunk_delay: Duration,
    member_ttl: chrono::Duration,
    /// Held for the whole duration of a scan, so manual and periodic ones don't overlap.
    scan_lock: Mutex<()>,
}

impl ThreadScanner {
    pub fn new(config: &Config) -> ThreadScanner {
        log::info!(
            "Scanner configured: {} concurrent checks, {:?} between chunks.",
            config.scanner_concurrent_tasks,
            config.scanner_chunk_delay
        );
        ThreadScanner {
            concurrent_tasks: config.scanner_concurrent_tasks.max(1),
            chunk_delay: config.scanner_chunk_delay,
            member_ttl: config.active_member_ttl,
            scan_lock: Mutex::new(()),
        }
    }

    /// Scan a chat, waiting for any running scan to finish first.
    pub async fn scan_chat(&self, bot: &Bot, db: &Database, chat: ChatId) -> BotResult<ScanReport> {
        let _guard = self.scan_lock.lock().await;
        self.scan_chat_locked(bot, db, chat).await
    }

    /// Scan a chat, unless a scan is already running, in which case `None` is returned.
    pub async fn try_scan_chat(
        &self,
        bot: &Bot,
        db: &Database,
        chat: ChatId,
    ) -> BotResult<Option<ScanReport>> {
        let Ok(_guard) = self.scan_lock.try_lock() else {
            return Ok(None);
        };
        self.scan_chat_locked(bot, db, chat).await.map(Some)
    }

    async fn scan_chat_locked(
        &self,
        bot: &Bot,
        db: &Database,
        chat: ChatId,
    ) -> BotResult<ScanReport> {
        log::info!("Scanning active topic members of chat {chat}...");

        let mut report = self.prune(db, chat).await?;

        let members = db.get_active_members_for_chat(chat).await?;
        let total = members.len();
        report.members_checked = total;

        let chunks: Vec<_> = members.chunks(self.concurrent_tasks).collect();
        let chunk_count = chunks.len();

        for (index, chunk) in chunks.into_iter().enumerate() {
            let results = join_all(chunk.iter().map(|&user| async move {
                let member = retry_on_server_error("get chat member", || {
                    bot.get_chat_member(chat, user).send()
                })
                .await;
                (user, member)
            }))
            .await;

            for (user, result) in results {
                match result {
                    Ok(member) if member.is_present() => {}
                    Ok(_) => {
                        db.remove_member_from_chat(chat, user).await?;
                        report.members_departed += 1;
                        log::debug!("User {user} left chat {chat}, forgetting their topics.");
                    }
                    Err(e) => {
                        log::warn!("Failed to check membership of user {user} in chat {chat}: {e}");
                    }
                }
            }

            if index + 1 < chunk_count {
                log::debug!(
                    "Checked {}/{total} members of chat {chat}, pausing...",
                    (index + 1) * self.concurrent_tasks
                );
                tokio::time::sleep(self.chunk_delay).await;
            }
        }

        log::info!("Scan of chat {chat} done: {report}.");
        Ok(report)
    }

    /// The part of the scan that doesn't need Telegram.
    async fn prune(&self, db: &Database, chat: ChatId) -> BotResult<ScanReport> {
        let cutoff = Utc::now() - self.member_ttl;
        Ok(ScanReport {
            stale_pruned: db.prune_inactive_members(chat, cutoff).await?,
            closed_pruned: db.prune_closed_topic_members(chat).await?,
            ..ScanReport::default()
        })
    }
}

/// Periodically scan every resource chat. The first scan happens one interval after
/// starting. A scan that fails waits for the next interval like any other.
pub async fn scanner_spinloop(
    bot: Bot,
    database: Weak<Database>,
    scanner: std::sync::Arc<ThreadScanner>,
    config: std::sync::Arc<Config>,
) {
    log::info!(
        "Periodic scanning every {:.1} hours.",
        config.scanner_interval.as_secs_f64() / 3600.0
    );

    loop {
        tokio::time::sleep(config.scanner_interval).await;

        let Some(database) = database.upgrade() else {
            // No more database!
            return;
        };

        for &chat in &config.resource_chat_ids {
            if let Err(e) = scanner.scan_chat(&bot, &database, chat).await {
                log::error!("Periodic scan of chat {chat} failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use teloxide::types::{MessageId, UserId};

    use super::*;
    use crate::types::TopicRef;

    #[tokio::test]
    async fn pruning() {
        let db = Database::new_in_memory().await.unwrap();
        let config = Config::default();
        let scanner = ThreadScanner::new(&config);
        let chat = ChatId(-1001);

        let open = TopicRef::new(chat, MessageId(1));
        let closed = TopicRef::new(chat, MessageId(2));
        db.upsert_topic(open, None, "open", Utc::now()).await.unwrap();
        db.upsert_topic(closed, None, "closed", Utc::now()).await.unwrap();
        db.set_topic_closed(closed, true).await.unwrap();

        let long_ago = Utc::now() - config.active_member_ttl - chrono::Duration::days(1);
        db.record_active_member(open, UserId(1), long_ago).await.unwrap();
        db.record_active_member(open, UserId(2), Utc::now()).await.unwrap();
        db.record_active_member(closed, UserId(2), Utc::now()).await.unwrap();

        let report = scanner.prune(&db, chat).await.unwrap();
        assert_eq!(report.stale_pruned, 1);
        assert_eq!(report.closed_pruned, 1);
        assert_eq!(db.get_active_members_for_chat(chat).await.unwrap(), vec![UserId(2)]);
    }

    #[tokio::test]
    async fn manual_scan_backs_off_while_busy() {
        let db = Database::new_in_memory().await.unwrap();
        let bot = Bot::new("123456:not-a-real-token");
        let scanner = ThreadScanner::new(&Config::default());

        let _guard = scanner.scan_lock.lock().await;
        let report = scanner
            .try_scan_chat(&bot, &db, ChatId(-1001))
            .await
            .unwrap();
        assert_eq!(report, None);
    }
}
