// =============================================================================
// Aegis Trader — Main Entry Point
// =============================================================================
//
// Boots both hunter agents and the options orchestrator behind a single
// scheduler, starts the dashboard API, and waits on Ctrl+C to save the
// runtime config before exiting.

mod activity;
mod analysis;
mod api;
mod app_state;
mod broker;
mod decimal;
mod error;
mod execution;
mod hunter;
mod indicators;
mod jobs;
mod market_data;
mod market_hours;
mod orchestrator;
mod persistence;
mod position_engine;
mod risk;
mod runtime_config;
mod scheduler;
mod trade;
mod types;
mod watchlist;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::jobs::{HunterJob, HunterKind, MaintenanceJob, RegimeJob};
use crate::runtime_config::RuntimeConfig;

const CONFIG_PATH: &str = "runtime_config.json";
const MAINTENANCE_INTERVAL_MINUTES: u32 = 15;
const REGIME_INTERVAL_MINUTES: u32 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("aegis-trader starting up");

    let config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load runtime config, using defaults");
        RuntimeConfig::default()
    });
    info!(dry_run = config.dry_run, "runtime config loaded");

    let db_path = std::env::var("DATABASE_PATH").unwrap_or_else(|_| "aegis.db".into());
    let pool = persistence::connect(&db_path).await?;
    let persistence = persistence::Persistence::new(pool);

    let state = Arc::new(AppState::new(config, CONFIG_PATH, persistence)?);

    {
        let config = state.runtime_config.read();
        let crypto_cfg = serde_json::to_string(&config.crypto_hunter.hunter).unwrap_or_default();
        let equities_cfg = serde_json::to_string(&config.gem_hunter.hunter).unwrap_or_default();
        let crypto_capital = config.crypto_hunter.hunter.risk.allocated_capital;
        let equities_capital = config.gem_hunter.hunter.risk.allocated_capital;
        drop(config);

        for (stack, cfg_json, capital) in [
            (&state.crypto, crypto_cfg, crypto_capital),
            (&state.equities, equities_cfg, equities_capital),
        ] {
            if let Err(e) = state
                .persistence
                .upsert_agent(
                    &stack.agent_id,
                    &stack.agent_id,
                    &stack.kind.to_string(),
                    &stack.status.read().to_string(),
                    &cfg_json,
                    capital,
                )
                .await
            {
                warn!(agent_id = %stack.agent_id, error = %e, "failed to register agent row");
            }
        }
    }

    state.scheduler.schedule(Arc::new(HunterJob::new(
        HunterKind::Crypto,
        state.crypto.hunter.clone(),
        state.runtime_config.clone(),
        state.crypto.positions.clone(),
        state.crypto.trades.clone(),
        state.crypto.watchlist.clone(),
        state.activity.clone(),
        state.persistence.clone(),
        state.events.clone(),
    )));

    state.scheduler.schedule(Arc::new(HunterJob::new(
        HunterKind::Equities,
        state.equities.hunter.clone(),
        state.runtime_config.clone(),
        state.equities.positions.clone(),
        state.equities.trades.clone(),
        state.equities.watchlist.clone(),
        state.activity.clone(),
        state.persistence.clone(),
        state.events.clone(),
    )));

    state.scheduler.schedule(Arc::new(RegimeJob::new(
        "orchestrator",
        REGIME_INTERVAL_MINUTES,
        state.regime.clone(),
        state.equities.broker.clone(),
        state.equities.positions.clone(),
        state.persistence.clone(),
        state.events.clone(),
        state.recommendations.clone(),
        state.equities.risk.clone(),
        state.runtime_config.clone(),
    )));

    state.scheduler.schedule(Arc::new(MaintenanceJob::new(
        MAINTENANCE_INTERVAL_MINUTES,
        state.activity.clone(),
        state.recommendations.clone(),
        vec![state.crypto.watchlist.clone(), state.equities.watchlist.clone()],
    )));

    info!(jobs = ?state.scheduler.status(), "scheduler started");

    let bind_addr = std::env::var("AEGIS_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".into());
    let api_state = state.clone();
    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .expect("failed to bind API server");
        info!(addr = %bind_addr, "API server listening");
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    info!("all subsystems running, press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received, stopping gracefully");

    state.scheduler.stop_all();
    if let Err(e) = state.save_config().await {
        error!(error = %e, "failed to save runtime config on shutdown");
    }

    info!("aegis-trader shut down complete");
    Ok(())
}
