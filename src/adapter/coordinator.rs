// src/adapter/coordinator.rs
// Reward system coordinator

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::application::service::{LedgerEngine, PriceOracle};
use crate::application::usecase::{RewardRecorder, ValuationAggregator};
use crate::config::Config;
use crate::domain::errors::AppResult;
use crate::domain::repository::StockConfigRepository;
use crate::domain::service::{Clock, PriceFeed};
use crate::infrastructure::{SqliteStore, SyntheticPriceFeed, SystemClock};

/// Owns the wired components and the background price refresh.
pub struct RewardCoordinator {
    store: SqliteStore,
    oracle: Arc<PriceOracle>,
    ledger: Arc<LedgerEngine>,
    recorder: Arc<RewardRecorder>,
    valuation: Arc<ValuationAggregator>,
    seed_symbols: Vec<String>,
    refresh_interval: Duration,
    refresh_task: Option<JoinHandle<()>>,
}

impl RewardCoordinator {
    /// Open the configured database and wire a synthetic price feed.
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = SqliteStore::open(&config.database.path, clock.clone())?;

        let base_prices: HashMap<_, _> = config
            .pricing
            .base_prices
            .iter()
            .map(|(symbol, price)| (symbol.clone(), *price))
            .collect();
        let feed: Arc<dyn PriceFeed> = Arc::new(SyntheticPriceFeed::new(base_prices));

        log::info!("Using reward database at {}", config.database.path);
        Ok(Self::build(config, store, feed, clock))
    }

    /// Wire components around an existing store, feed and clock.
    pub fn build(
        config: &Config,
        store: SqliteStore,
        feed: Arc<dyn PriceFeed>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let shared = Arc::new(store.clone());

        let oracle = Arc::new(
            PriceOracle::new(shared.clone(), shared.clone(), feed, clock.clone())
                .with_staleness(chrono::Duration::minutes(config.pricing.staleness_minutes)),
        );

        let ledger = Arc::new(LedgerEngine::new(shared.clone(), clock.clone()));

        let recorder = Arc::new(
            RewardRecorder::new(shared.clone(), oracle.clone(), ledger.clone())
                .with_max_quantity(config.rewards.max_quantity),
        );

        let valuation = Arc::new(
            ValuationAggregator::new(
                shared.clone(),
                shared,
                ledger.clone(),
                oracle.clone(),
                clock,
            )
            .with_split_multipliers(config.pricing.apply_split_multipliers),
        );

        Self {
            store,
            oracle,
            ledger,
            recorder,
            valuation,
            seed_symbols: config.pricing.base_prices.keys().cloned().collect(),
            refresh_interval: Duration::from_secs(config.pricing.refresh_interval_secs),
            refresh_task: None,
        }
    }

    /// Seed stock configuration and start the periodic price refresh.
    pub async fn start(&mut self) -> AppResult<()> {
        if self.refresh_task.is_some() {
            return Ok(());
        }

        self.store.seed_stock_configs(&self.seed_symbols).await?;
        self.refresh_task = Some(self.spawn_price_refresher());

        log::info!("Reward coordinator started");
        Ok(())
    }

    pub async fn stop(&mut self) {
        if let Some(task) = self.refresh_task.take() {
            task.abort();
            let _ = task.await;
            log::info!("Reward coordinator stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.refresh_task.is_some()
    }

    pub fn recorder(&self) -> Arc<RewardRecorder> {
        self.recorder.clone()
    }

    pub fn valuation(&self) -> Arc<ValuationAggregator> {
        self.valuation.clone()
    }

    pub fn oracle(&self) -> Arc<PriceOracle> {
        self.oracle.clone()
    }

    pub fn ledger(&self) -> Arc<LedgerEngine> {
        self.ledger.clone()
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    fn spawn_price_refresher(&self) -> JoinHandle<()> {
        let oracle = self.oracle.clone();
        let period = self.refresh_interval;

        tokio::spawn(async move {
            log::info!("Price refresher started (every {}s)", period.as_secs());

            // The first tick completes immediately.
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                if let Err(e) = oracle.refresh_all().await {
                    log::error!("Price refresh failed: {}", e);
                }
            }
        })
    }
}
