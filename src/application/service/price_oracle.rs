// src/application/service/price_oracle.rs
// Current and historical INR prices with synthetic fallback

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::calendar::{end_of_day, start_of_day};
use crate::domain::errors::{RewardError, RewardResult};
use crate::domain::models::{round_inr, PriceSample};
use crate::domain::repository::{PriceRepository, StockConfigRepository};
use crate::domain::service::{Clock, PriceFeed};

/// Samples older than this are replaced rather than served.
pub const DEFAULT_STALENESS_MINUTES: i64 = 120;

pub struct PriceOracle {
    prices: Arc<dyn PriceRepository>,
    stocks: Arc<dyn StockConfigRepository>,
    feed: Arc<dyn PriceFeed>,
    clock: Arc<dyn Clock>,
    staleness: Duration,
}

impl PriceOracle {
    pub fn new(
        prices: Arc<dyn PriceRepository>,
        stocks: Arc<dyn StockConfigRepository>,
        feed: Arc<dyn PriceFeed>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            prices,
            stocks,
            feed,
            clock,
            staleness: Duration::minutes(DEFAULT_STALENESS_MINUTES),
        }
    }

    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.staleness = staleness;
        self
    }

    /// Most recent fresh sample, or a newly synthesized and persisted one.
    pub async fn current_price(&self, symbol: &str) -> RewardResult<Decimal> {
        let now = self.clock.now();

        match self.prices.latest_price(symbol).await {
            Ok(Some(sample)) if !sample.is_stale(now, self.staleness) => {
                return Ok(sample.price_inr);
            }
            Ok(Some(sample)) => {
                log::warn!(
                    "Price for {} is stale (observed {}), generating new price",
                    symbol,
                    sample.observed_at
                );
            }
            Ok(None) => {
                log::debug!("No stored price for {}, generating one", symbol);
            }
            Err(e) => {
                log::error!("Failed to look up latest price for {}: {}", symbol, e);
                return Err(e);
            }
        }

        self.synthesize(symbol).await
    }

    /// Latest sample at or before `at`, falling back to the current price
    /// when the series starts later than `at`.
    pub async fn price_at(&self, symbol: &str, at: DateTime<Utc>) -> RewardResult<Decimal> {
        match self.prices.price_at_or_before(symbol, at).await? {
            Some(sample) => Ok(sample.price_inr),
            None => {
                log::warn!(
                    "No price history found for {} at {}, using current price",
                    symbol,
                    at
                );
                self.current_price(symbol).await
            }
        }
    }

    /// Persist a sample observed now and re-anchor the feed on it.
    pub async fn save_price(&self, symbol: &str, price: Decimal) -> RewardResult<PriceSample> {
        let sample = self
            .prices
            .insert_price(symbol, round_inr(price), self.clock.now())
            .await?;
        self.feed.observe(symbol, sample.price_inr);

        log::debug!("Saved price {} for {}", sample.price_inr, symbol);
        Ok(sample)
    }

    /// Append a fresh sample for every active configured symbol.
    ///
    /// Returns how many symbols were refreshed. Per-symbol failures are
    /// logged and skipped.
    pub async fn refresh_all(&self) -> RewardResult<usize> {
        let mut symbols = self.stocks.active_symbols().await?;
        if symbols.is_empty() {
            symbols = self.feed.symbols();
        }

        log::info!("Updating prices for {} stocks...", symbols.len());

        let mut refreshed = 0;
        for symbol in &symbols {
            let price = match self.feed.quote(symbol).await {
                Ok(price) => price,
                Err(e) => {
                    log::error!("Failed to generate price for {}: {}", symbol, e);
                    continue;
                }
            };

            match self.save_price(symbol, price).await {
                Ok(_) => refreshed += 1,
                Err(e) => log::error!("Failed to save price for {}: {}", symbol, e),
            }
        }

        log::info!("Refreshed prices for {}/{} stocks", refreshed, symbols.len());
        Ok(refreshed)
    }

    /// Last observed price per symbol within the UTC day `date`.
    pub async fn prices_for_date(&self, date: NaiveDate) -> RewardResult<BTreeMap<String, Decimal>> {
        let samples = self
            .prices
            .latest_prices_between(start_of_day(date), end_of_day(date))
            .await?;

        Ok(samples
            .into_iter()
            .map(|sample| (sample.symbol, sample.price_inr))
            .collect())
    }

    async fn synthesize(&self, symbol: &str) -> RewardResult<Decimal> {
        let price = self
            .feed
            .quote(symbol)
            .await
            .map(round_inr)
            .map_err(|e| {
                log::error!("Price generation failed for {}: {}", symbol, e);
                match e {
                    RewardError::PriceUnavailable { .. } => e,
                    other => RewardError::PriceUnavailable {
                        symbol: symbol.to_string(),
                        reason: other.to_string(),
                    },
                }
            })?;

        // A failed cache write must not block the read.
        if let Err(e) = self.save_price(symbol, price).await {
            log::warn!("Failed to save generated price for {}: {}", symbol, e);
        }

        Ok(price)
    }
}
