//! # EnrollBot
//!
//! Watches Bulgarian citizenship enrollment requests and tells users on
//! Telegram when the status changes.
//!
//! Usage:
//!   enrollbot                              # Run the bot (same as `serve`)
//!   enrollbot check 1111/0000 123456       # One-off status check, printed to stdout
//!   enrollbot jobs                         # Show scheduled poll jobs
//!   enrollbot --config ./config.toml serve # Custom config file

use anyhow::Result;
use clap::{Parser, Subcommand};
use enrollbot_channels::TelegramChannel;
use enrollbot_core::EnrollBotConfig;
use enrollbot_core::traits::StatusScraper;
use enrollbot_scheduler::{CronTrigger, SchedulerDb, SchedulerEngine, spawn_scheduler};
use enrollbot_scraper::EnrollScraper;
use enrollbot_store::SqliteStateStore;
use enrollbot_tracker::{Bot, PollTask, TrackingService};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "enrollbot",
    version,
    about = "📮 EnrollBot: enrollment status watcher for Telegram"
)]
struct Cli {
    /// Config file (default: ~/.enrollbot/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bot and the poll scheduler
    Serve,
    /// Check one request now and print the status
    Check {
        request_number: String,
        pin_code: String,
    },
    /// List scheduled poll jobs
    Jobs,
}

fn load_config(path: Option<&PathBuf>) -> Result<EnrollBotConfig> {
    let config = match path {
        Some(path) => EnrollBotConfig::load_from(path)?,
        None => EnrollBotConfig::load()?,
    };
    Ok(config.with_env())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "enrollbot=debug,enrollbot_tracker=debug,enrollbot_scheduler=debug,enrollbot_scraper=debug"
    } else {
        "enrollbot=info,enrollbot_tracker=info,enrollbot_scheduler=info,enrollbot_channels=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_ref())?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Check {
            request_number,
            pin_code,
        } => check(&config, &request_number, &pin_code).await,
        Command::Jobs => jobs(&config),
    }
}

async fn serve(config: EnrollBotConfig) -> Result<()> {
    config.validate()?;
    let trigger = CronTrigger::parse(&config.scheduler.cron)?;

    let store = Arc::new(SqliteStateStore::open(&config.storage.state_db_path())?);
    let scheduler_db = SchedulerDb::open(&config.storage.scheduler_db_path())?;
    let engine = Arc::new(Mutex::new(SchedulerEngine::new(scheduler_db)?));
    let scraper = Arc::new(EnrollScraper::new(&config.scraper)?);
    let channel = TelegramChannel::new(&config.telegram);

    let me = channel.get_me().await?;
    tracing::info!(
        "Telegram bot: @{} ({})",
        me.username.as_deref().unwrap_or("unknown"),
        me.first_name
    );

    let poll = Arc::new(PollTask::new(scraper, store.clone(), Arc::new(channel.clone())));
    let service = Arc::new(TrackingService::new(store, engine.clone(), poll.clone(), trigger));
    let bot = Arc::new(Bot::new(channel.clone(), service));

    println!("📮 EnrollBot v{}", env!("CARGO_PKG_VERSION"));
    println!("   🗄️  Data Dir:   {}", config.storage.data_path().display());
    println!("   ⏰ Schedule:   {}", config.scheduler.cron);
    println!("   🌐 Status URL: {}", config.scraper.url);
    println!();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = tokio::spawn(spawn_scheduler(
        engine,
        poll,
        config.scheduler.check_interval_secs,
        shutdown_rx.clone(),
    ));
    let bot_task = tokio::spawn(bot.run(channel.start_polling(shutdown_rx)));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    shutdown_tx.send(true)?;

    scheduler_task.await?;
    bot_task.await?;
    Ok(())
}

async fn check(config: &EnrollBotConfig, request_number: &str, pin_code: &str) -> Result<()> {
    let scraper = EnrollScraper::new(&config.scraper)?;
    let status = scraper.check_status(request_number, pin_code).await?;
    println!("{status}");
    Ok(())
}

fn jobs(config: &EnrollBotConfig) -> Result<()> {
    let store = SqliteStateStore::open(&config.storage.state_db_path())?;
    let db = SchedulerDb::open(&config.storage.scheduler_db_path())?;
    let jobs = db.load_jobs()?;
    println!("Users with tracked requests: {}", store.user_count()?);
    if jobs.is_empty() {
        println!("No scheduled jobs.");
        return Ok(());
    }
    for job in jobs {
        println!(
            "{}  [{}]  next: {}  runs: {}",
            job.id,
            job.cron,
            job.next_run
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".into()),
            job.run_count
        );
    }
    Ok(())
}
