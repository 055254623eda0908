// src/infrastructure/market/mod.rs
// Synthetic market data used when no real price feed is wired in

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

use crate::domain::errors::{RewardError, RewardResult};
use crate::domain::models::round_inr;
use crate::domain::service::PriceFeed;

/// Base price used for symbols with no configured seed.
pub const DEFAULT_BASE_PRICE: Decimal = dec!(1000);

/// Generated prices move at most 5% (500 basis points) from the base.
pub const MAX_VARIATION_BPS: i64 = 500;

/// Random-walk price generator anchored on the last persisted price.
///
/// The base table is owned by this instance. Concurrent updates to the same
/// symbol are last-writer-wins, which only shifts the centre of the next quote.
pub struct SyntheticPriceFeed {
    base_prices: Mutex<HashMap<String, Decimal>>,
    rng: Mutex<StdRng>,
}

impl SyntheticPriceFeed {
    pub fn new(base_prices: HashMap<String, Decimal>) -> Self {
        Self::with_rng(base_prices, StdRng::from_entropy())
    }

    /// Deterministic sequence for reproducible runs.
    pub fn with_seed(base_prices: HashMap<String, Decimal>, seed: u64) -> Self {
        Self::with_rng(base_prices, StdRng::seed_from_u64(seed))
    }

    fn with_rng(base_prices: HashMap<String, Decimal>, rng: StdRng) -> Self {
        Self {
            base_prices: Mutex::new(base_prices),
            rng: Mutex::new(rng),
        }
    }

    pub fn base_price(&self, symbol: &str) -> Option<Decimal> {
        self.base_prices.lock().get(symbol).copied()
    }

    /// Base price moved by a uniform variation in [-5%, +5%], rounded to 4 dp.
    pub fn generate(&self, symbol: &str) -> Decimal {
        let base = *self
            .base_prices
            .lock()
            .entry(symbol.to_string())
            .or_insert_with(|| {
                log::warn!("No base price for {}, using default {}", symbol, DEFAULT_BASE_PRICE);
                DEFAULT_BASE_PRICE
            });

        let bps = self.rng.lock().gen_range(-MAX_VARIATION_BPS..=MAX_VARIATION_BPS);
        let variation = Decimal::new(bps, 4);

        round_inr(base * (Decimal::ONE + variation))
    }
}

#[async_trait]
impl PriceFeed for SyntheticPriceFeed {
    async fn quote(&self, symbol: &str) -> RewardResult<Decimal> {
        Ok(self.generate(symbol))
    }

    fn observe(&self, symbol: &str, price: Decimal) {
        self.base_prices.lock().insert(symbol.to_string(), price);
    }

    fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.base_prices.lock().keys().cloned().collect();
        symbols.sort();
        symbols
    }
}

/// Feed that quotes a fixed price per symbol until told otherwise.
///
/// Unknown symbols cannot be quoted.
#[derive(Default)]
pub struct StaticPriceFeed {
    prices: Mutex<HashMap<String, Decimal>>,
}

impl StaticPriceFeed {
    pub fn new<I, S>(prices: I) -> Self
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: Into<String>,
    {
        Self {
            prices: Mutex::new(prices.into_iter().map(|(s, p)| (s.into(), p)).collect()),
        }
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.lock().insert(symbol.to_string(), price);
    }
}

#[async_trait]
impl PriceFeed for StaticPriceFeed {
    async fn quote(&self, symbol: &str) -> RewardResult<Decimal> {
        self.prices
            .lock()
            .get(symbol)
            .copied()
            .ok_or_else(|| RewardError::PriceUnavailable {
                symbol: symbol.to_string(),
                reason: "no quote configured".to_string(),
            })
    }

    fn observe(&self, _symbol: &str, _price: Decimal) {}

    fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.prices.lock().keys().cloned().collect();
        symbols.sort();
        symbols
    }
}
