use std::time::Duration;

mod app;
mod auth;
mod config;
mod db;
mod error;
#[cfg(test)]
mod memory;
mod notify;
mod reset;
mod state;

use crate::{config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "jobportal=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    let pool = db::connect(&config).await?;
    db::migrate(&pool).await?;

    auth::password::prime_dummy_hash().await?;

    let state = AppState::init(&config, pool.clone());
    let sweeper = reset::spawn_sweeper(
        state.ledger.clone(),
        Duration::from_secs(config.reset.sweep_interval_secs.max(1)),
    );

    let result = app::serve(app::build_app(state)).await;

    sweeper.abort();
    pool.close().await;
    tracing::info!("database pool closed");
    result
}
