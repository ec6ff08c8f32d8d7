use std::{collections::HashSet, fs, path::PathBuf, str::FromStr, time::Duration};

use teloxide::types::ChatId;

/// Runtime settings, read from the environment (and a `.env` file, if present).
#[derive(Clone, Debug)]
pub struct Config {
    /// Path of the SQLite database file.
    pub db_path: String,
    /// Forum chats whose topics are tracked. Everything else is ignored.
    pub resource_chat_ids: HashSet<ChatId>,
    pub profile_page_size: usize,
    pub favorites_page_size: usize,
    pub ghost_ping_initial_delay: Duration,
    pub ghost_ping_chunk_size: usize,
    pub ghost_ping_chunk_delay: Duration,
    pub competition_check_interval: Duration,
    pub scanner_interval: Duration,
    pub scanner_concurrent_tasks: usize,
    pub scanner_chunk_delay: Duration,
    pub active_member_ttl: chrono::Duration,
    /// How often one user may run `/follow_author` or `/unfollow_author`.
    pub follow_command_cooldown: Duration,
    pub backup_interval: Duration,
    pub backup_dir: PathBuf,
    pub backup_keep: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: "forum_herald.sqlite".to_string(),
            resource_chat_ids: HashSet::new(),
            profile_page_size: 10,
            favorites_page_size: 10,
            ghost_ping_initial_delay: Duration::from_secs(5),
            ghost_ping_chunk_size: 50,
            ghost_ping_chunk_delay: Duration::from_secs_f64(1.5),
            competition_check_interval: Duration::from_secs(60),
            scanner_interval: Duration::from_secs(6 * 60 * 60),
            scanner_concurrent_tasks: 25,
            scanner_chunk_delay: Duration::from_secs_f64(0.5),
            active_member_ttl: chrono::Duration::days(14),
            follow_command_cooldown: Duration::from_secs(5),
            backup_interval: Duration::from_secs(24 * 60 * 60),
            backup_dir: PathBuf::from("backups"),
            backup_keep: 7,
        }
    }
}

/// Read and parse an environment variable, falling back to `default` with a warning
/// if it doesn't parse.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    let Ok(value) = std::env::var(name) else {
        return default;
    };
    match value.trim().parse() {
        Ok(x) => x,
        Err(_) => {
            log::warn!("Invalid value \"{value}\" for {name}, using the default.");
            default
        }
    }
}

fn env_secs_or(name: &str, default: Duration) -> Duration {
    let secs = env_or(name, default.as_secs_f64());
    if secs.is_finite() && secs >= 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        log::warn!("Negative or infinite duration for {name}, using the default.");
        default
    }
}

/// A whole positive number of days that chrono can represent, or `None`.
fn days_to_duration(days: i64) -> Option<chrono::Duration> {
    if days <= 0 {
        return None;
    }
    chrono::Duration::try_days(days)
}

fn env_days_or(name: &str, default: chrono::Duration) -> chrono::Duration {
    let days = env_or(name, default.num_days());
    days_to_duration(days).unwrap_or_else(|| {
        log::warn!("Out of range day count {days} for {name}, using the default.");
        default
    })
}

/// Parse a comma or whitespace separated list of chat IDs. Junk entries are skipped.
pub fn parse_chat_id_list(list: &str) -> HashSet<ChatId> {
    list.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|x| !x.is_empty())
        .filter_map(|x| match x.parse::<i64>() {
            Ok(id) => Some(ChatId(id)),
            Err(_) => {
                log::warn!("Ignoring invalid chat ID \"{x}\" in RESOURCE_CHAT_IDS.");
                None
            }
        })
        .collect()
}

impl Config {
    pub fn from_env() -> Config {
        if let Err(e) = dotenv::dotenv() {
            log::debug!("No .env file loaded: {e}");
        }

        let d = Config::default();

        Config {
            db_path: std::env::var("DB_PATH").unwrap_or(d.db_path),
            resource_chat_ids: std::env::var("RESOURCE_CHAT_IDS")
                .map(|x| parse_chat_id_list(&x))
                .unwrap_or_default(),
            profile_page_size: env_or("PROFILE_VIEW_PAGE_SIZE", d.profile_page_size).max(1),
            favorites_page_size: env_or("FAVORITES_PAGE_SIZE", d.favorites_page_size).max(1),
            ghost_ping_initial_delay: env_secs_or(
                "GHOST_PING_INITIAL_DELAY_SECONDS",
                d.ghost_ping_initial_delay,
            ),
            ghost_ping_chunk_size: env_or("GHOST_PING_CHUNK_SIZE", d.ghost_ping_chunk_size).max(1),
            ghost_ping_chunk_delay: env_secs_or(
                "GHOST_PING_CHUNK_DELAY_SECONDS",
                d.ghost_ping_chunk_delay,
            ),
            competition_check_interval: env_secs_or(
                "COMPETITION_CHECK_INTERVAL_SECONDS",
                d.competition_check_interval,
            ),
            scanner_interval: env_secs_or("SCANNER_INTERVAL_SECONDS", d.scanner_interval),
            scanner_concurrent_tasks: env_or(
                "SCANNER_CONCURRENT_TASKS",
                d.scanner_concurrent_tasks,
            )
            .max(1),
            scanner_chunk_delay: env_secs_or("SCANNER_CHUNK_DELAY_SECONDS", d.scanner_chunk_delay),
            active_member_ttl: env_days_or("ACTIVE_MEMBER_TTL_DAYS", d.active_member_ttl),
            follow_command_cooldown: env_secs_or(
                "FOLLOW_COMMAND_COOLDOWN_SECONDS",
                d.follow_command_cooldown,
            ),
            backup_interval: env_secs_or("BACKUP_INTERVAL_SECONDS", d.backup_interval),
            backup_dir: std::env::var("BACKUP_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.backup_dir),
            backup_keep: env_or("BACKUP_KEEP", d.backup_keep).max(1),
        }
    }

    pub fn is_resource_chat(&self, chat: ChatId) -> bool {
        self.resource_chat_ids.contains(&chat)
    }
}

/// Load the bot token from the `key` file (`key_debug` in debug builds), or from the
/// `BOT_TOKEN` environment variable if there's no such file.
pub fn load_bot_token() -> Option<String> {
    let key_file = match cfg!(debug_assertions) {
        true => "key_debug",
        false => "key",
    };
    match fs::read_to_string(key_file) {
        Ok(key) => Some(key.trim().to_string()),
        Err(_) => std::env::var("BOT_TOKEN").ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_id_list_parsing() {
        let ids = parse_chat_id_list("-1001234, -1005678  -1009,junk,");
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&ChatId(-1001234)));
        assert!(ids.contains(&ChatId(-1005678)));
        assert!(ids.contains(&ChatId(-1009)));
        assert!(parse_chat_id_list("").is_empty());
    }

    #[test]
    fn day_counts() {
        assert_eq!(days_to_duration(14), Some(chrono::Duration::days(14)));
        assert_eq!(days_to_duration(0), None);
        assert_eq!(days_to_duration(-3), None);
        assert_eq!(days_to_duration(999_999_999_999_999), None);
    }

    #[test]
    fn bad_day_counts_fall_back() {
        let default = chrono::Duration::days(14);

        std::env::set_var("FORUM_HERALD_TEST_TTL_HUGE", "999999999999999");
        assert_eq!(env_days_or("FORUM_HERALD_TEST_TTL_HUGE", default), default);

        std::env::set_var("FORUM_HERALD_TEST_TTL_NEGATIVE", "-1");
        assert_eq!(env_days_or("FORUM_HERALD_TEST_TTL_NEGATIVE", default), default);

        std::env::set_var("FORUM_HERALD_TEST_TTL_OK", "30");
        assert_eq!(
            env_days_or("FORUM_HERALD_TEST_TTL_OK", default),
            chrono::Duration::days(30)
        );

        assert_eq!(env_days_or("FORUM_HERALD_TEST_TTL_UNSET", default), default);
    }
}
