//! Media Saver Bot - Main Entry Point
//!
//! A Telegram bot that downloads Instagram, TikTok, Snapchat, Likee and
//! YouTube media for its users, with an admin panel on top.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use media_saver_bot::config::{BotConfig, BotSettings};
use media_saver_bot::download::Downloader;
use media_saver_bot::handlers::{AppState, State, schema};
use media_saver_bot::scheduler::{BadgeScheduler, ProfileBadge, SchedulerMessage};
use media_saver_bot::storage::Database;
use media_saver_bot::system::mark_bot_started;
use media_saver_bot::telegram::{build_bot, user_key};

/// Telegram bot that saves media from social networks.
#[derive(Parser, Debug)]
#[command(name = "media_saver_bot")]
#[command(about = "Download Instagram, TikTok and YouTube media through Telegram")]
#[command(version)]
struct Args {
    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let env_loaded = dotenvy::from_filename(&args.env_file);

    let settings =
        BotSettings::from_env_with_defaults().context("Invalid settings in environment")?;
    settings
        .ensure_runtime_dirs()
        .context("Failed to create runtime directories")?;

    let _log_guard = init_logging(&args.log_level, &settings.log_dir);
    if let Err(e) = env_loaded {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    let config = BotConfig::from_env().context("Failed to load bot configuration from environment")?;
    let main_admin_id = user_key(config.main_admin_id);

    let db = Database::open(&settings.database_path)
        .await
        .context("Failed to open the database")?;
    db.add_admin(main_admin_id, None)
        .await
        .context("Failed to register the main admin")?;
    mark_bot_started();

    let downloader =
        Downloader::new(settings.download.clone()).context("Failed to build the downloader")?;
    let bot = build_bot(&config.token);

    let badge = Arc::new(ProfileBadge::new(db.clone(), settings.profile_badge_enabled));
    let (scheduler_tx, scheduler_rx) = mpsc::channel::<SchedulerMessage>(32);
    let scheduler = BadgeScheduler::new(
        bot.clone(),
        Arc::clone(&badge),
        settings.profile_update_interval,
    );
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(scheduler_rx).await;
    });

    let app = Arc::new(AppState {
        db: db.clone(),
        downloader,
        settings,
        main_admin_id,
        badge,
    });

    info!("Starting media saver bot (main admin {})...", main_admin_id);

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![InMemStorage::<State>::new(), app])
        .default_handler(|update| async move {
            debug!("Unhandled update: {:?}", update.kind);
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "An error occurred while handling an update",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Shutting down...");
    if scheduler_tx.send(SchedulerMessage::Shutdown).await.is_err() {
        warn!("Scheduler already stopped");
    }
    let _ = scheduler_handle.await;
    db.close().await;

    Ok(())
}

/// Logs to stderr and to `bot.log` inside `log_dir`.
///
/// The returned guard flushes the file writer and must live until exit.
fn init_logging(level: &str, log_dir: &Path) -> WorkerGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never(log_dir, "bot.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    guard
}
