// src/domain/repository/mod.rs
// Repository interfaces for domain entities

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::errors::RewardResult;
use crate::domain::models::{
    LedgerEntry, NewLedgerEntry, NewRewardGrant, PriceSample, RewardGrant, StockConfig,
};

/// Write handle scoped to an open storage transaction.
pub trait LedgerWriter {
    fn insert_entries(&self, entries: &[NewLedgerEntry]) -> RewardResult<Vec<LedgerEntry>>;
}

/// Callback run inside the grant transaction once the grant row exists.
pub type PostEntries<'a> =
    dyn Fn(&RewardGrant, &dyn LedgerWriter) -> RewardResult<Vec<LedgerEntry>> + Send + Sync + 'a;

/// Repository interface for reward grants
#[async_trait]
pub trait RewardRepository: Send + Sync {
    /// Live grant with the same (user, symbol, quantity, timestamp), if any.
    async fn find_live_grant(&self, grant: &NewRewardGrant) -> RewardResult<Option<RewardGrant>>;

    async fn get_grant(&self, id: i64) -> RewardResult<Option<RewardGrant>>;

    /// Insert `grant` and run `post` in the same transaction.
    ///
    /// Any error from `post` rolls the grant back. A live-tuple uniqueness
    /// violation is reported as `RewardError::DuplicateGrant`.
    async fn create_grant_with_entries(
        &self,
        grant: &NewRewardGrant,
        post: &PostEntries<'_>,
    ) -> RewardResult<(RewardGrant, Vec<LedgerEntry>)>;

    /// Live grants with `start <= event_ts <= end`, newest first.
    async fn grants_between(
        &self,
        user_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RewardResult<Vec<RewardGrant>>;

    /// The user's earliest live grant.
    async fn first_grant(&self, user_id: i64) -> RewardResult<Option<RewardGrant>>;
}

/// Repository interface for ledger entries
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Insert all entries in one transaction.
    async fn insert_entries(&self, entries: &[NewLedgerEntry]) -> RewardResult<Vec<LedgerEntry>>;

    async fn entries_for_grant(&self, grant_id: i64) -> RewardResult<Vec<LedgerEntry>>;

    /// (symbol, quantity) of every STOCK leg on the user's live grants,
    /// optionally restricted to grants with `event_ts <= as_of`.
    async fn stock_legs(
        &self,
        user_id: i64,
        as_of: Option<DateTime<Utc>>,
    ) -> RewardResult<Vec<(String, Decimal)>>;
}

/// Repository interface for the price series
#[async_trait]
pub trait PriceRepository: Send + Sync {
    async fn latest_price(&self, symbol: &str) -> RewardResult<Option<PriceSample>>;

    /// Latest sample with `observed_at <= at`.
    async fn price_at_or_before(
        &self,
        symbol: &str,
        at: DateTime<Utc>,
    ) -> RewardResult<Option<PriceSample>>;

    async fn insert_price(
        &self,
        symbol: &str,
        price_inr: Decimal,
        observed_at: DateTime<Utc>,
    ) -> RewardResult<PriceSample>;

    /// Latest sample per symbol observed within `[start, end]`.
    async fn latest_prices_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RewardResult<Vec<PriceSample>>;
}

/// Repository interface for per-symbol configuration
#[async_trait]
pub trait StockConfigRepository: Send + Sync {
    async fn stock_config(&self, symbol: &str) -> RewardResult<Option<StockConfig>>;

    async fn active_symbols(&self) -> RewardResult<Vec<String>>;

    /// Create an active, multiplier-1 row for each symbol lacking one.
    async fn seed_stock_configs(&self, symbols: &[String]) -> RewardResult<()>;
}
