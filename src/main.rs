//! Spotplug Scheduler Service
//!
//! Refreshes day-ahead prices and reconciles smart plugs against them.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=info cargo run
//! ```

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use spotplug::{
    registry, run_server, CommandHandler, Config, DryRunClient, EleringClient, ScheduleStore,
    Scheduler, SchedulerConfig, SchedulerEvent,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Smart Plug Scheduler");

    let config = Config::from_env();
    info!(
        "Price refresh every {}s, reconciliation every {}s, actuation policy {:?}",
        config.refresh_interval.as_secs(),
        config.tick_interval.as_secs(),
        config.policy
    );

    let records = registry::load(&config.registry_path)?;
    let store = Arc::new(
        ScheduleStore::from_records(records).context("Registry contains invalid devices")?,
    );

    // Create broadcast channel for scheduler events (to WebSocket clients)
    let (event_tx, _) = broadcast::channel::<SchedulerEvent>(256);

    let scheduler = Arc::new(Scheduler::new(
        store,
        Arc::new(DryRunClient::new()),
        Arc::new(EleringClient::with_url(&config.price_url, &config.price_area)),
        SchedulerConfig {
            policy: config.policy,
            stale_after: config.stale_after,
        },
        event_tx.clone(),
    ));
    warn!("No vendor device client configured; plugs are simulated (dry run)");

    // Start WebSocket server
    let handler = Arc::new(CommandHandler::new(
        scheduler.clone(),
        config.registry_path.clone(),
    ));
    let server_rx = event_tx.subscribe();
    let addr = config.bind_addr.clone();
    tokio::spawn(async move {
        run_server(&addr, server_rx, handler).await;
    });

    // Initial price fetch before the first reconciliation
    scheduler.refresh_prices(chrono::Utc::now()).await;

    // Price refresh task
    let refresh_scheduler = scheduler.clone();
    let refresh_interval = config.refresh_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(refresh_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; the initial fetch already ran.
        interval.tick().await;

        loop {
            interval.tick().await;
            refresh_scheduler.refresh_prices(chrono::Utc::now()).await;
            info!("Next price update in {}s", refresh_interval.as_secs());
        }
    });

    // Reconciliation loop
    let mut interval = tokio::time::interval(config.tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                scheduler.tick(chrono::Utc::now()).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}
