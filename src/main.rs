// src/main.rs
use stock_rewards::adapter::RewardCoordinator;
use stock_rewards::config::Config;
use stock_rewards::domain::errors::AppResult;

use tokio::signal::ctrl_c;

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    config.init_logging()?;

    log::info!("Starting stock_rewards v{}", env!("CARGO_PKG_VERSION"));
    log::info!(
        "Tracking {} symbols, prices refreshed every {}s, stale after {} minutes",
        config.pricing.base_prices.len(),
        config.pricing.refresh_interval_secs,
        config.pricing.staleness_minutes
    );

    let mut coordinator = RewardCoordinator::from_config(&config)?;
    coordinator.start().await?;

    // Wait for shutdown signal
    log::info!("Reward ledger is running. Press Ctrl+C to stop.");
    ctrl_c().await?;

    log::info!("Shutting down...");
    coordinator.stop().await;

    log::info!("Shutdown complete. Goodbye!");
    Ok(())
}
