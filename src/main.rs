use anyhow::Result;
use tracing::info;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

mod activity;
mod ai;
mod bot;
mod clock;
mod commands;
mod config;
mod error;
mod metrics;
mod moderation;
mod protocol;
mod ratelimit;
mod replies;
mod report;
mod server;
mod snapshot;
mod state;
mod stats;
mod status;
mod tasks;
mod transport;
mod window;

use ai::OpenAiCompatClient;
use bot::Bot;
use metrics::Metrics;
use snapshot::SnapshotStore;
use state::BotState;
use transport::BridgeTransport;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("group_warden=info".parse()?)
        )
        .init();

    info!("Starting group-warden");

    let config = config::load_config()?;
    info!("Configuration loaded");
    info!("Server: {}{}", config.server.bind_addr, config.server.ws_path);

    let metrics = Arc::new(Metrics::new());
    let state = Arc::new(BotState::new(&config));
    let store = Arc::new(SnapshotStore::new(&config.snapshot.path));
    state.load_from(&store).await;

    let transport = Arc::new(BridgeTransport::new(Duration::from_millis(
        config.server.request_timeout_ms,
    )));
    let ai = Arc::new(OpenAiCompatClient::from_config(&config.ai)?);
    if ai.is_enabled() {
        info!("AI assistant enabled ({})", config.ai.model);
    }
    let bot = Arc::new(Bot::new(
        &config,
        state.clone(),
        transport.clone(),
        ai,
        metrics.clone(),
    )?);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    tokio::spawn(bot.run(events_rx));

    tasks::spawn_compactor(state.clone(), metrics.clone(), config.tracking.cleanup_interval_ms);
    tasks::spawn_snapshots(state.clone(), store.clone(), metrics.clone(), config.snapshot.interval_ms);

    let metrics_config = config.metrics.clone();
    let metrics_clone = metrics.clone();
    tokio::spawn(async move {
        metrics::run_metrics_server(metrics_config, metrics_clone).await;
    });

    server::run(config, state.clone(), transport, events_tx, metrics.clone()).await?;

    // Final checkpoint
    tasks::save_snapshot(&state, &store, &metrics).await;
    info!("Shutdown complete");

    Ok(())
}
