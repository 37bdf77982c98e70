//! Recompute and persist the prediction cache without starting the server.

use api_server::config::ServerConfig;
use api_server::{init_tracing, AppState};
use chrono::Utc;
use prediction_core::format_timestamp;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env()?;
    let state = AppState::from_config(&config);

    println!("Updating cache with current predictions...");
    let set = state.coordinator.refresh_now().await;

    println!(
        "Cache updated: {} predictions written to {}",
        set.predictions.len(),
        config.cache_file.display()
    );
    println!("New timestamp: {}", set.last_updated.as_deref().unwrap_or("-"));
    println!("Current time: {}", format_timestamp(Utc::now().naive_utc()));
    Ok(())
}
