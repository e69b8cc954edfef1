//! Shelter Bot - zombie-apocalypse survival game for Telegram
//!
//! Players answer generated survival scenarios, build shelters with their
//! groups, and spend coins on gear. Every inbound update is routed through
//! a single dispatcher.

mod chat;
mod config;
mod content;
mod db;
mod dispatcher;
mod reference;
mod runtime;
mod state_machine;
mod stores;
mod telegram;
mod wizard;

use config::BotConfig;
use content::{GeminiBackend, KeyRing, RotatingModel, ScenarioService};
use db::Database;
use dispatcher::{Dependencies, Dispatcher};
use reference::ReferenceData;
use runtime::{BotRuntime, DatabaseStore};
use std::sync::Arc;
use stores::{ActiveMessageTracker, InMemoryDonationPrompts, InMemorySessionRepository};
use telegram::TelegramClient;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shelter_bot=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false),
        )
        .init();

    let config = BotConfig::from_env()?;

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;
    db.seed_shop_items()?;
    let store = Arc::new(DatabaseStore::new(db));

    let lookup = Arc::new(ReferenceData::load_dir(&config.reference_data_dir)?);

    let backend = GeminiBackend::new(&config.gemini_model)?;
    let keys = KeyRing::new(config.gemini_api_keys.iter().map(String::as_str));
    if keys.is_exhausted() {
        tracing::warn!("No content keys configured. Set GEMINI_API_KEYS to enable scenarios.");
    } else {
        tracing::info!(
            keys = keys.len(),
            model = %config.gemini_model,
            "Scenario generation enabled"
        );
    }
    let content = Arc::new(ScenarioService::new(
        RotatingModel::new(backend, keys),
        store.clone(),
        config.scenario_history_limit,
    ));

    let telegram =
        Arc::new(TelegramClient::connect(&config.telegram_token, config.poll_timeout).await?);

    let dispatcher = Arc::new(Dispatcher::new(Dependencies {
        transport: telegram.clone(),
        store: store.clone(),
        history: store,
        content,
        lookup,
        sessions: Arc::new(InMemorySessionRepository::with_ttl(config.session_ttl)),
        donations: Arc::new(InMemoryDonationPrompts::new()),
        menus: ActiveMessageTracker::in_memory(),
        admin: config.admin_user_id,
    }));

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Could not listen for Ctrl-C");
                return;
            }
            tracing::info!("Ctrl-C received, shutting down");
            shutdown.cancel();
        });
    }

    BotRuntime::new(telegram, dispatcher, shutdown).run().await;
    Ok(())
}
