// src/application/usecase/valuation.rs
// Read-only views combining ledger holdings with prices

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::application::service::{LedgerEngine, PriceOracle};
use crate::domain::calendar::{days_between, end_of_day, start_of_day};
use crate::domain::errors::RewardResult;
use crate::domain::models::{
    round_inr, round_quantity, DailyValuation, Holdings, Portfolio, PortfolioHolding,
    RewardGrant, TodayStats,
};
use crate::domain::repository::{RewardRepository, StockConfigRepository};
use crate::domain::service::Clock;

#[async_trait]
pub trait ValuationUseCase: Send + Sync {
    /// Grants with event time inside the current UTC day, newest first.
    async fn today_grants(&self, user_id: i64) -> RewardResult<Vec<RewardGrant>>;

    /// End-of-day INR value for each day from the first grant through yesterday.
    async fn historical_daily_value(&self, user_id: i64) -> RewardResult<Vec<DailyValuation>>;

    async fn stats_today(&self, user_id: i64) -> RewardResult<TodayStats>;

    async fn portfolio(&self, user_id: i64) -> RewardResult<Portfolio>;
}

pub struct ValuationAggregator {
    rewards: Arc<dyn RewardRepository>,
    stocks: Arc<dyn StockConfigRepository>,
    ledger: Arc<LedgerEngine>,
    oracle: Arc<PriceOracle>,
    clock: Arc<dyn Clock>,
    apply_split_multipliers: bool,
}

impl ValuationAggregator {
    pub fn new(
        rewards: Arc<dyn RewardRepository>,
        stocks: Arc<dyn StockConfigRepository>,
        ledger: Arc<LedgerEngine>,
        oracle: Arc<PriceOracle>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            rewards,
            stocks,
            ledger,
            oracle,
            clock,
            apply_split_multipliers: false,
        }
    }

    /// Scale summed holdings by each symbol's configured multiplier at read time.
    pub fn with_split_multipliers(mut self, enabled: bool) -> Self {
        self.apply_split_multipliers = enabled;
        self
    }

    async fn current_holdings(&self, user_id: i64) -> RewardResult<Holdings> {
        let raw = self.ledger.holdings(user_id).await?;
        self.adjust_for_splits(raw).await
    }

    async fn holdings_at(&self, user_id: i64, as_of: DateTime<Utc>) -> RewardResult<Holdings> {
        let raw = self.ledger.holdings_as_of(user_id, as_of).await?;
        self.adjust_for_splits(raw).await
    }

    async fn adjust_for_splits(&self, mut holdings: Holdings) -> RewardResult<Holdings> {
        if !self.apply_split_multipliers {
            return Ok(holdings);
        }

        for (symbol, quantity) in holdings.iter_mut() {
            if let Some(config) = self.stocks.stock_config(symbol).await? {
                if config.multiplier != Decimal::ONE {
                    *quantity = round_quantity(*quantity * config.multiplier);
                }
            }
        }
        Ok(holdings)
    }

    /// Value every holding at its current price.
    async fn price_holdings(&self, holdings: Holdings) -> RewardResult<Portfolio> {
        let mut priced = Vec::with_capacity(holdings.len());
        let mut total = Decimal::ZERO;

        for (symbol, quantity) in holdings {
            let current_price = self.oracle.current_price(&symbol).await?;
            let value = current_price * quantity;
            total += value;

            priced.push(PortfolioHolding {
                symbol,
                quantity,
                current_price,
                current_value: round_inr(value),
            });
        }

        Ok(Portfolio {
            holdings: priced,
            total_value: round_inr(total),
        })
    }
}

#[async_trait]
impl ValuationUseCase for ValuationAggregator {
    async fn today_grants(&self, user_id: i64) -> RewardResult<Vec<RewardGrant>> {
        let today = self.clock.now().date_naive();
        self.rewards
            .grants_between(user_id, start_of_day(today), end_of_day(today))
            .await
    }

    async fn historical_daily_value(&self, user_id: i64) -> RewardResult<Vec<DailyValuation>> {
        let first = match self.rewards.first_grant(user_id).await? {
            Some(grant) => grant,
            None => return Ok(Vec::new()),
        };

        let yesterday = self.clock.now().date_naive() - Duration::days(1);
        let days = days_between(first.event_ts.date_naive(), yesterday);

        let mut series = Vec::with_capacity(days.len());
        for date in days {
            let close = end_of_day(date);
            let holdings = self.holdings_at(user_id, close).await?;

            let mut value = Decimal::ZERO;
            for (symbol, quantity) in &holdings {
                let price = self.oracle.price_at(symbol, close).await?;
                value += price * quantity;
            }

            series.push(DailyValuation {
                date,
                value_inr: round_inr(value),
            });
        }

        log::debug!(
            "Computed {} daily valuations for user {}",
            series.len(),
            user_id
        );
        Ok(series)
    }

    async fn stats_today(&self, user_id: i64) -> RewardResult<TodayStats> {
        let mut today_rewards = BTreeMap::new();
        for grant in self.today_grants(user_id).await? {
            *today_rewards.entry(grant.symbol).or_insert(Decimal::ZERO) += grant.quantity;
        }

        let holdings = self.current_holdings(user_id).await?;
        let portfolio = self.price_holdings(holdings).await?;

        Ok(TodayStats {
            today_rewards,
            portfolio_value_inr: portfolio.total_value,
        })
    }

    async fn portfolio(&self, user_id: i64) -> RewardResult<Portfolio> {
        let holdings = self.current_holdings(user_id).await?;
        self.price_holdings(holdings).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::NewRewardGrant;
    use crate::domain::repository::PriceRepository;
    use crate::infrastructure::{FixedClock, SqliteStore, StaticPriceFeed};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, hour, 0, 0).unwrap()
    }

    struct Fixture {
        clock: Arc<FixedClock>,
        store: SqliteStore,
        ledger: Arc<LedgerEngine>,
        aggregator: ValuationAggregator,
    }

    fn fixture(now: DateTime<Utc>) -> Fixture {
        let clock = Arc::new(FixedClock::new(now));
        let store = SqliteStore::in_memory(clock.clone()).unwrap();
        let shared = Arc::new(store.clone());
        let feed = Arc::new(StaticPriceFeed::new([
            ("TCS", dec!(3700)),
            ("INFY", dec!(1500.333)),
        ]));
        let oracle = Arc::new(PriceOracle::new(
            shared.clone(),
            shared.clone(),
            feed,
            clock.clone(),
        ));
        let ledger = Arc::new(LedgerEngine::new(shared.clone(), clock.clone()));
        let aggregator = ValuationAggregator::new(
            shared.clone(),
            shared,
            ledger.clone(),
            oracle,
            clock.clone(),
        );
        Fixture {
            clock,
            store,
            ledger,
            aggregator,
        }
    }

    async fn grant(f: &Fixture, symbol: &str, quantity: Decimal, at: DateTime<Utc>) -> RewardGrant {
        let new = NewRewardGrant {
            user_id: 1,
            symbol: symbol.to_string(),
            quantity,
            event_ts: at,
        };
        let ledger = &f.ledger;
        let (grant, _) = f
            .store
            .create_grant_with_entries(&new, &|g, w| ledger.post_entries(g, dec!(100), w))
            .await
            .unwrap();
        grant
    }

    #[tokio::test]
    async fn today_grants_cover_only_the_current_utc_day() {
        let f = fixture(ts(23, 12));
        grant(&f, "TCS", dec!(1), ts(22, 23)).await;
        grant(&f, "TCS", dec!(2), ts(23, 0)).await;
        grant(&f, "INFY", dec!(3), ts(23, 11)).await;

        let today = f.aggregator.today_grants(1).await.unwrap();
        let symbols: Vec<_> = today.iter().map(|g| g.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["INFY", "TCS"]);
    }

    #[tokio::test]
    async fn historical_series_runs_from_first_grant_through_yesterday() {
        let f = fixture(ts(24, 8));
        f.store.insert_price("TCS", dec!(3600), ts(21, 10)).await.unwrap();
        f.store.insert_price("TCS", dec!(3650), ts(22, 10)).await.unwrap();
        grant(&f, "TCS", dec!(1), ts(21, 9)).await;
        grant(&f, "TCS", dec!(2), ts(23, 9)).await;

        let series = f.aggregator.historical_daily_value(1).await.unwrap();
        let dates: Vec<_> = series.iter().map(|d| d.date.to_string()).collect();
        assert_eq!(dates, vec!["2025-01-21", "2025-01-22", "2025-01-23"]);

        let values: Vec<_> = series.iter().map(|d| d.value_inr).collect();
        assert_eq!(values, vec![dec!(3600), dec!(3650), dec!(10950)]);
    }

    #[tokio::test]
    async fn historical_series_is_empty_without_grants() {
        let f = fixture(ts(24, 8));
        assert!(f.aggregator.historical_daily_value(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stats_group_todays_rewards_and_value_the_portfolio() {
        let f = fixture(ts(23, 12));
        grant(&f, "TCS", dec!(1), ts(22, 9)).await;
        grant(&f, "TCS", dec!(0.5), ts(23, 9)).await;
        grant(&f, "TCS", dec!(0.25), ts(23, 10)).await;
        grant(&f, "INFY", dec!(2), ts(23, 11)).await;

        let stats = f.aggregator.stats_today(1).await.unwrap();
        assert_eq!(stats.today_rewards.get("TCS"), Some(&dec!(0.75)));
        assert_eq!(stats.today_rewards.get("INFY"), Some(&dec!(2)));
        // 1.75 * 3700 + 2 * 1500.333
        assert_eq!(stats.portfolio_value_inr, dec!(9475.666));
    }

    #[tokio::test]
    async fn portfolio_total_matches_priced_holdings() {
        let f = fixture(ts(23, 12));
        grant(&f, "INFY", dec!(0.333333), ts(23, 9)).await;
        grant(&f, "TCS", dec!(2), ts(23, 10)).await;

        let portfolio = f.aggregator.portfolio(1).await.unwrap();
        assert_eq!(portfolio.holdings.len(), 2);

        let infy = &portfolio.holdings[0];
        assert_eq!(infy.symbol, "INFY");
        assert_eq!(infy.current_price, dec!(1500.333));
        assert_eq!(infy.current_value, dec!(500.1105));

        let expected = round_inr(dec!(1500.333) * dec!(0.333333) + dec!(3700) * dec!(2));
        assert_eq!(portfolio.total_value, expected);
    }

    #[tokio::test]
    async fn split_multipliers_apply_only_when_enabled() {
        let f = fixture(ts(23, 12));
        f.store.seed_stock_configs(&["TCS".to_string()]).await.unwrap();
        f.store.update_stock_config("TCS", dec!(2), true).await.unwrap();
        grant(&f, "TCS", dec!(1.5), ts(23, 9)).await;

        let raw = f.aggregator.portfolio(1).await.unwrap();
        assert_eq!(raw.holdings[0].quantity, dec!(1.5));

        let Fixture {
            aggregator, ledger, ..
        } = f;
        let adjusted = aggregator.with_split_multipliers(true).portfolio(1).await.unwrap();
        assert_eq!(adjusted.holdings[0].quantity, dec!(3));
        assert_eq!(adjusted.total_value, dec!(11100));

        assert_eq!(ledger.holdings(1).await.unwrap().get("TCS"), Some(&dec!(1.5)));
    }

    #[tokio::test]
    async fn clock_moves_the_today_window() {
        let f = fixture(ts(23, 12));
        grant(&f, "TCS", dec!(1), ts(23, 9)).await;
        assert_eq!(f.aggregator.today_grants(1).await.unwrap().len(), 1);

        f.clock.set(ts(24, 0));
        assert!(f.aggregator.today_grants(1).await.unwrap().is_empty());
        assert_eq!(f.aggregator.historical_daily_value(1).await.unwrap().len(), 1);
    }
}
