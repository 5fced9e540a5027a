pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod fallback;
pub mod llm;
pub mod models;
pub mod notifications;
pub mod planner;
pub mod progress;
pub mod registry;
pub mod scheduler;
pub mod selector;
pub mod state;

#[cfg(test)]
mod test_utils;

use std::error::Error;
use std::sync::Arc;

use config::EngineConfig;
use db::{PlanStore, SqliteStore};
use llm::{ContentGenerator, GeneratorClient, UnconfiguredGenerator};
use notifications::{LogSink, NotificationDispatcher, NotificationSink, WebhookPush};
use registry::PlanRegistry;
use scheduler::{MidnightScheduler, StoredPerformance};
use state::AppState;

pub async fn run() -> Result<(), Box<dyn Error>> {
  // Load environment variables from .env file
  dotenvy::dotenv().ok();
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

  let config = EngineConfig::from_env()?;

  let pool = db::initialize_db(&config.database_url).await?;
  let sqlite = Arc::new(SqliteStore::new(pool));
  let store: Arc<dyn PlanStore> = sqlite.clone();
  let registry: Arc<dyn PlanRegistry> = sqlite;

  let generator: Arc<dyn ContentGenerator> = match &config.generator {
    Some(generator_config) => {
      let client = GeneratorClient::new(generator_config)?;
      log::info!("Content generator ready ({})", client.provider());
      Arc::new(client)
    }
    None => {
      log::warn!("GENERATOR_API_KEY not set, all plans and schedules will use fallback templates");
      Arc::new(UnconfiguredGenerator)
    }
  };

  let push: Option<Arc<dyn NotificationSink>> = config
    .dispatch
    .push_webhook
    .clone()
    .map(|url| Arc::new(WebhookPush::new(url)) as Arc<dyn NotificationSink>);

  let scheduler = Arc::new(MidnightScheduler::new(
    registry.clone(),
    store.clone(),
    generator.clone(),
    Arc::new(StoredPerformance::new(store.clone())),
    config.scheduler.clone(),
  ));
  let dispatcher = Arc::new(NotificationDispatcher::new(
    store.clone(),
    Arc::new(LogSink),
    push,
    config.dispatch.clone(),
  ));

  scheduler.start().await;
  dispatcher.start().await;

  let state = Arc::new(AppState {
    store,
    registry,
    generator,
    scheduler: scheduler.clone(),
    dispatcher: dispatcher.clone(),
  });

  let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
  log::info!("Listening on {}", config.bind_addr);
  let served = axum::serve(listener, commands::router(state))
    .with_graceful_shutdown(shutdown_signal())
    .await;

  scheduler.stop().await;
  dispatcher.stop().await;
  served?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    log::error!("Failed to listen for shutdown signal: {}", e);
  }
  log::info!("Shutting down");
}
