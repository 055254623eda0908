// src/domain/service/mod.rs
// Collaborator interfaces the core depends on

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::errors::RewardResult;

/// Source of fresh prices, either synthetic or backed by a market feed.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Produce a new INR price for `symbol`.
    async fn quote(&self, symbol: &str) -> RewardResult<Decimal>;

    /// Told about every price that has just been persisted.
    fn observe(&self, symbol: &str, price: Decimal);

    /// Symbols the feed knows how to quote.
    fn symbols(&self) -> Vec<String>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
