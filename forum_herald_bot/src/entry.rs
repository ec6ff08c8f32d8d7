use std::sync::Arc;
use teloxide::{dptree::deps, prelude::*};

use crate::{
    backup::backup_spinloop,
    competition::competition_check_spinloop,
    config::{load_bot_token, Config},
    cooldown::CommandCooldown,
    database::Database,
    handlers::{self, commands::Command},
    scanner::{scanner_spinloop, ThreadScanner},
};

/// # Panics
///
/// Panics if there's no bot token, or if the database can't be opened.
pub async fn entry() {
    log::info!("ASYNC WOOOO");

    let config = Arc::new(Config::from_env());
    if config.resource_chat_ids.is_empty() {
        log::warn!("RESOURCE_CHAT_IDS is empty, no forum topics will be tracked!");
    }

    let key = load_bot_token().expect("Could not load the bot key file or BOT_TOKEN!");
    let bot = Bot::new(key);

    bot.set_my_commands(Command::generate_bot_commands())
        .await
        .expect("Failed to set bot commands!");

    let db = Arc::new(
        Database::new(&config.db_path)
            .await
            .expect("Could not init the database!"),
    );

    let scanner = Arc::new(ThreadScanner::new(&config));
    let follow_cooldown = Arc::new(CommandCooldown::new(config.follow_command_cooldown));

    tokio::spawn(backup_spinloop(
        Arc::downgrade(&db),
        config.backup_interval,
        config.backup_dir.clone(),
        config.backup_keep,
    ));

    tokio::spawn(competition_check_spinloop(
        bot.clone(),
        Arc::downgrade(&db),
        config.competition_check_interval,
    ));

    tokio::spawn(scanner_spinloop(
        bot.clone(),
        Arc::downgrade(&db),
        scanner.clone(),
        config.clone(),
    ));

    log::info!("Creating the handler...");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handlers::handle_message))
        .branch(Update::filter_edited_message().endpoint(handlers::handle_edited_message))
        .branch(Update::filter_edited_channel_post().endpoint(handlers::handle_edited_message))
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback_query));

    log::info!("Dispatching the dispatcher!");

    Dispatcher::builder(bot, handler)
        .default_handler(|_| async {})
        .dependencies(deps![db, config, scanner, follow_cooldown])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    log::info!("it appears we have been bonked.");
}
