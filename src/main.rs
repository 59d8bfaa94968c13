//! Polymarket auto-post service: entry point.
//!
//! Loads configuration, wires the action pipeline, and runs the scheduler,
//! operator alerts and HTTP API until SIGINT/SIGTERM.

mod actions;
mod config;
mod db;
mod error;
mod events;
mod llm;
mod logging;
mod poster;
mod scheduler;
mod screenshot;
mod telegram;
mod web;

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::actions::accounts::{AccountConfigs, StaticAccountConfigs};
use crate::actions::fetcher::{ContentFetcher, PolymarketFetcher};
use crate::actions::generator::ContentGenerator;
use crate::actions::store::{ActionStore, SqlActionStore};
use crate::actions::trigger::TriggerEvaluator;
use crate::config::{Config, PosterKind};
use crate::db::pool;
use crate::events::bus::EventBus;
use crate::llm::{LlmClient, OpenAiClient};
use crate::poster::{Poster, TelegramPoster, TwitterPoster};
use crate::scheduler::QueueScheduler;
use crate::screenshot::{ScreenshotCapturer, WebDriverLauncher};
use crate::telegram::alerts::AlertForwarder;
use crate::telegram::api::{TelegramApi, DEFAULT_API_URL};

fn build_poster(config: &Config) -> anyhow::Result<Arc<dyn Poster>> {
    let timeout = Duration::from_secs(config.poster.timeout_secs);
    match config.poster.kind {
        PosterKind::Twitter => {
            let token = config
                .poster
                .twitter_bearer_token
                .clone()
                .ok_or_else(|| anyhow::anyhow!("TWITTER_BEARER_TOKEN is required for the twitter poster"))?;
            Ok(Arc::new(TwitterPoster::new(&config.poster.twitter_api_url, token, timeout)?))
        }
        PosterKind::Telegram => {
            let token = config
                .telegram
                .bot_token
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("TELEGRAM_BOT_TOKEN is required for the telegram poster"))?;
            let chat_id = config
                .poster
                .telegram_chat_id
                .clone()
                .ok_or_else(|| anyhow::anyhow!("TELEGRAM_POST_CHAT_ID is required for the telegram poster"))?;
            let api = TelegramApi::new(DEFAULT_API_URL, token, timeout)?;
            Ok(Arc::new(TelegramPoster::new(api, chat_id)))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (ignore if missing)
    let _ = dotenvy::dotenv();

    let config = Config::load()?;
    logging::structured::init_logging(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        poster = ?config.poster.kind,
        "polymarket-autopost starting"
    );

    // Database
    let db_pool = pool::create_pool(&config.database.url, config.database.max_connections).await?;
    pool::run_migrations(&db_pool).await?;

    let event_bus = Arc::new(EventBus::new(1024));
    let store: Arc<dyn ActionStore> = Arc::new(SqlActionStore::new(db_pool.clone()));
    let accounts = Arc::new(StaticAccountConfigs::new(config.accounts.clone()));
    if accounts.is_empty() {
        warn!("no [accounts.*] configured, signals will not create actions");
    } else {
        info!(accounts = accounts.len(), "account configs loaded");
    }
    let accounts: Arc<dyn AccountConfigs> = accounts;

    // Collaborators
    let llm: Arc<dyn LlmClient> = Arc::new(OpenAiClient::new(&config.llm)?);
    let generator = Arc::new(ContentGenerator::new(llm, Duration::from_secs(config.llm.timeout_secs)));
    let fetcher: Arc<dyn ContentFetcher> = Arc::new(PolymarketFetcher::new(&config.fetcher)?);
    let capturer = Arc::new(ScreenshotCapturer::new(
        Arc::new(WebDriverLauncher::new(&config.screenshot)?),
        &config.screenshot,
        &config.polymarket_web_url,
    ));
    let poster = build_poster(&config)?;

    let evaluator = Arc::new(TriggerEvaluator::new(
        store.clone(),
        accounts.clone(),
        event_bus.clone(),
        config.polymarket_web_url.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Scheduler
    let scheduler = QueueScheduler::new(
        store.clone(),
        accounts.clone(),
        generator.clone(),
        poster,
        event_bus.clone(),
        config.scheduler.clone(),
        shutdown_rx.clone(),
    )
    .with_fetcher(fetcher.clone())
    .with_capturer(
        capturer.clone(),
        Duration::from_secs(config.screenshot.max_age_hours * 3600),
    )
    .with_post_timeout(Duration::from_secs(config.poster.timeout_secs));
    let scheduler_handle = tokio::spawn(async move { scheduler.run().await });

    // Operator alerts (if configured)
    let alerts_handle = match (&config.telegram.bot_token, &config.telegram.chat_id) {
        (Some(token), Some(chat_id)) => {
            let api = TelegramApi::new(DEFAULT_API_URL, token, Duration::from_secs(10))?;
            let forwarder = AlertForwarder::new(api, chat_id.clone(), event_bus.subscribe());
            let rx = shutdown_rx.clone();
            Some(tokio::spawn(async move { forwarder.run(rx).await }))
        }
        _ => {
            info!("telegram alerts not configured");
            None
        }
    };

    // Web API (if enabled)
    let web_handle = if config.web.enabled {
        let state = web::server::AppState {
            db: db_pool.clone(),
            store: store.clone(),
            accounts: accounts.clone(),
            evaluator: evaluator.clone(),
            generator: generator.clone(),
            fetcher: Some(fetcher.clone()),
            capturer: Some(capturer.clone()),
        };
        let web_server = web::server::WebServer::new(config.web.clone(), state);
        let rx = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = web_server.start(rx).await {
                error!(error = %e, "web server error");
            }
        }))
    } else {
        None
    };

    info!("all subsystems started, waiting for shutdown signal");
    wait_for_shutdown().await?;

    warn!("shutting down, finishing in-flight action");
    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler_handle.await {
        error!(error = %e, "scheduler task panicked");
    }
    capturer.close().await;
    for handle in [alerts_handle, web_handle].into_iter().flatten() {
        let _ = handle.await;
    }
    db_pool.close().await;

    info!("shutdown complete");
    Ok(())
}

async fn wait_for_shutdown() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            res = signal::ctrl_c() => { res?; info!("received SIGINT"); }
            _ = sigterm.recv() => { info!("received SIGTERM"); }
        }
    }
    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("received SIGINT");
    }
    Ok(())
}
