mod api;
mod config;
mod db;
mod error;
mod fetcher;
mod poller;
mod state;
mod transformer;
mod types;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::CycleLatency;
use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::db::store::SqliteGameStore;
use crate::error::Result;
use crate::fetcher::EspnFetcher;
use crate::poller::{Poller, PollerSettings};
use crate::state::GameCache;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    if cfg.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::new(&cfg.log_level))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(&cfg.log_level))
            .init();
    }

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", cfg.db_path)).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);

    // --- Shared state ---
    let cache = GameCache::new();
    let store = SqliteGameStore::new(pool.clone());
    let health = Arc::new(HealthState::new());
    let latency = Arc::new(CycleLatency::new());

    // --- Poller ---
    let fetcher = EspnFetcher::new(&cfg)?;
    let poller = Poller::new(
        Arc::new(fetcher),
        Arc::new(store.clone()),
        Arc::clone(&cache),
        Arc::clone(&health),
        Arc::clone(&latency),
        PollerSettings::from_config(&cfg),
    );
    let poller_handle = poller.spawn();

    // --- HTTP API server ---
    let app = router(ApiState {
        cache,
        store,
        health,
        latency,
    });
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    let shutdown_poller = Arc::clone(&poller);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {e}");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received, draining");
            shutdown_poller.shutdown();
        })
        .await?;

    // The poller finishes its in-flight cycle before the pool goes away.
    if let Err(e) = poller_handle.await {
        error!("Poller task ended abnormally: {e}");
    }
    pool.close().await;
    info!("Shutdown complete");

    Ok(())
}
