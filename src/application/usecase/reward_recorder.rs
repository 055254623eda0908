// src/application/usecase/reward_recorder.rs
// The write path: validate, dedup, price, persist atomically

use async_trait::async_trait;
use chrono::SubsecRound;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use crate::application::service::{LedgerEngine, PriceOracle};
use crate::domain::errors::{RewardError, RewardResult};
use crate::domain::models::{
    round_quantity, LedgerEntry, NewRewardGrant, ReversalOutcome, RewardGrant,
};
use crate::domain::repository::RewardRepository;

/// Largest quantity a single grant may carry unless configured otherwise.
pub const DEFAULT_MAX_QUANTITY: Decimal = dec!(10000);

pub const MAX_SYMBOL_LEN: usize = 20;

/// A stored grant together with the entries posted for it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedReward {
    pub grant: RewardGrant,
    pub entries: Vec<LedgerEntry>,
    pub price_per_share: Decimal,
}

#[async_trait]
pub trait RewardRecordingUseCase: Send + Sync {
    async fn record_reward(&self, claim: NewRewardGrant) -> RewardResult<RecordedReward>;

    async fn reverse_reward(&self, grant_id: i64) -> RewardResult<ReversalOutcome>;
}

pub struct RewardRecorder {
    rewards: Arc<dyn RewardRepository>,
    oracle: Arc<PriceOracle>,
    ledger: Arc<LedgerEngine>,
    max_quantity: Decimal,
}

impl RewardRecorder {
    pub fn new(
        rewards: Arc<dyn RewardRepository>,
        oracle: Arc<PriceOracle>,
        ledger: Arc<LedgerEngine>,
    ) -> Self {
        Self {
            rewards,
            oracle,
            ledger,
            max_quantity: DEFAULT_MAX_QUANTITY,
        }
    }

    pub fn with_max_quantity(mut self, max_quantity: Decimal) -> Self {
        self.max_quantity = max_quantity;
        self
    }

    /// Normalize a claim or explain why it cannot be recorded.
    pub fn validate(&self, claim: NewRewardGrant) -> RewardResult<NewRewardGrant> {
        if claim.user_id <= 0 {
            return Err(RewardError::validation("user id must be a positive integer"));
        }

        validate_symbol(&claim.symbol)?;

        let quantity = round_quantity(claim.quantity);
        if quantity <= Decimal::ZERO {
            return Err(RewardError::validation("quantity must be positive"));
        }
        if quantity > self.max_quantity {
            return Err(RewardError::validation(format!(
                "quantity exceeds maximum of {} shares",
                self.max_quantity
            )));
        }

        Ok(NewRewardGrant {
            quantity: quantity.normalize(),
            // Storage keeps microseconds; dedup must compare what is stored.
            event_ts: claim.event_ts.trunc_subsecs(6),
            ..claim
        })
    }
}

pub fn validate_symbol(symbol: &str) -> RewardResult<()> {
    if symbol.is_empty() {
        return Err(RewardError::validation("symbol must not be empty"));
    }
    if symbol.len() > MAX_SYMBOL_LEN {
        return Err(RewardError::validation(format!(
            "symbol must be at most {} characters",
            MAX_SYMBOL_LEN
        )));
    }

    let mut chars = symbol.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_uppercase());
    let rest_ok = chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    if !starts_with_letter || !rest_ok {
        return Err(RewardError::validation(format!(
            "invalid symbol {:?}: expected uppercase letters and digits",
            symbol
        )));
    }

    Ok(())
}

#[async_trait]
impl RewardRecordingUseCase for RewardRecorder {
    async fn record_reward(&self, claim: NewRewardGrant) -> RewardResult<RecordedReward> {
        let claim = self.validate(claim).map_err(|e| {
            log::debug!("Rejected reward claim: {}", e);
            e
        })?;

        if let Some(existing) = self.rewards.find_live_grant(&claim).await? {
            log::info!(
                "Duplicate reward for user {} ({} {} at {}), existing grant {}",
                claim.user_id,
                claim.quantity,
                claim.symbol,
                claim.event_ts,
                existing.id
            );
            return Err(RewardError::DuplicateGrant);
        }

        // A synthesized price is saved here, outside the grant transaction,
        // and stays in price_history even if the insert below fails.
        let price = self.oracle.current_price(&claim.symbol).await?;

        let ledger = &self.ledger;
        let (grant, entries) = self
            .rewards
            .create_grant_with_entries(&claim, &|g, w| ledger.post_entries(g, price, w))
            .await
            .map_err(|e| {
                match &e {
                    RewardError::DuplicateGrant => log::info!(
                        "Concurrent duplicate reward for user {} on {}",
                        claim.user_id,
                        claim.symbol
                    ),
                    other => log::error!(
                        "Failed to record reward for user {} on {}: {}",
                        claim.user_id,
                        claim.symbol,
                        other
                    ),
                }
                e
            })?;

        log::info!(
            "Recorded reward {}: user {} received {} {} at {} INR/share",
            grant.id,
            grant.user_id,
            grant.quantity,
            grant.symbol,
            price
        );

        Ok(RecordedReward {
            grant,
            entries,
            price_per_share: price,
        })
    }

    async fn reverse_reward(&self, grant_id: i64) -> RewardResult<ReversalOutcome> {
        let grant = match self.rewards.get_grant(grant_id).await? {
            Some(grant) if grant.is_live() => grant,
            _ => return Err(RewardError::GrantNotFound(grant_id)),
        };

        self.ledger.reverse(&grant).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::LedgerRepository;
    use crate::infrastructure::{FixedClock, SqliteStore, StaticPriceFeed};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 23, hour, 0, 0).unwrap()
    }

    fn setup() -> (SqliteStore, RewardRecorder) {
        let clock = Arc::new(FixedClock::new(ts(12)));
        let store = SqliteStore::in_memory(clock.clone()).unwrap();
        let feed = Arc::new(StaticPriceFeed::new([("RELIANCE", dec!(2450.50))]));
        let shared = Arc::new(store.clone());
        let oracle = PriceOracle::new(shared.clone(), shared.clone(), feed, clock.clone());
        let ledger = LedgerEngine::new(shared.clone(), clock);
        let recorder = RewardRecorder::new(shared, Arc::new(oracle), Arc::new(ledger));
        (store, recorder)
    }

    fn claim(user_id: i64, symbol: &str, quantity: Decimal) -> NewRewardGrant {
        NewRewardGrant {
            user_id,
            symbol: symbol.to_string(),
            quantity,
            event_ts: ts(9),
        }
    }

    #[test]
    fn symbol_rules() {
        assert!(validate_symbol("RELIANCE").is_ok());
        assert!(validate_symbol("M2M").is_ok());
        assert!(validate_symbol("ABCDEFGHIJKLMNOPQRST").is_ok());

        for bad in ["", "reliance", "TCS.NS", "2TCS", "ABCDEFGHIJKLMNOPQRSTU", "TC S"] {
            assert!(
                matches!(validate_symbol(bad), Err(RewardError::Validation(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn validation_normalizes_quantity_and_timestamp() {
        let (_, recorder) = setup();
        let mut raw = claim(1, "RELIANCE", dec!(2.5000004));
        raw.event_ts = ts(9) + Duration::nanoseconds(1_500_999);

        let valid = recorder.validate(raw).unwrap();
        assert_eq!(valid.quantity, dec!(2.5));
        assert_eq!(valid.event_ts, ts(9) + Duration::microseconds(1_500));
    }

    #[test]
    fn validation_rejects_out_of_range_input() {
        let (_, recorder) = setup();
        let cases = [
            claim(0, "RELIANCE", dec!(1)),
            claim(-3, "RELIANCE", dec!(1)),
            claim(1, "RELIANCE", dec!(0)),
            claim(1, "RELIANCE", dec!(-1)),
            claim(1, "RELIANCE", dec!(0.0000004)),
            claim(1, "RELIANCE", dec!(10000.000001)),
        ];
        for case in cases {
            assert!(matches!(
                recorder.validate(case),
                Err(RewardError::Validation(_))
            ));
        }
        assert!(recorder.validate(claim(1, "RELIANCE", dec!(10000))).is_ok());
    }

    #[test]
    fn max_quantity_is_configurable() {
        let (_, recorder) = setup();
        let recorder = recorder.with_max_quantity(dec!(5));
        assert!(recorder.validate(claim(1, "RELIANCE", dec!(5))).is_ok());
        assert!(recorder.validate(claim(1, "RELIANCE", dec!(5.5))).is_err());
    }

    #[tokio::test]
    async fn records_grant_with_three_entries() {
        let (store, recorder) = setup();

        let recorded = recorder
            .record_reward(claim(1, "RELIANCE", dec!(2.5)))
            .await
            .unwrap();

        assert_eq!(recorded.price_per_share, dec!(2450.50));
        assert_eq!(recorded.entries.len(), 3);
        assert_eq!(
            store.entries_for_grant(recorded.grant.id).await.unwrap(),
            recorded.entries
        );
    }

    #[tokio::test]
    async fn identical_claim_is_rejected_as_duplicate() {
        let (store, recorder) = setup();

        recorder
            .record_reward(claim(1, "RELIANCE", dec!(2.5)))
            .await
            .unwrap();
        let dup = recorder
            .record_reward(claim(1, "RELIANCE", dec!(2.500000)))
            .await;

        assert!(matches!(dup, Err(RewardError::DuplicateGrant)));
        assert_eq!(store.stock_legs(1, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unpriceable_symbol_leaves_no_rows() {
        let (store, recorder) = setup();

        let err = recorder
            .record_reward(claim(1, "UNLISTED", dec!(1)))
            .await
            .unwrap_err();

        assert!(matches!(err, RewardError::PriceUnavailable { .. }));
        assert!(store.first_grant(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reverse_reward_requires_a_live_grant() {
        let (store, recorder) = setup();

        assert!(matches!(
            recorder.reverse_reward(99).await,
            Err(RewardError::GrantNotFound(99))
        ));

        let recorded = recorder
            .record_reward(claim(1, "RELIANCE", dec!(1)))
            .await
            .unwrap();
        assert!(matches!(
            recorder.reverse_reward(recorded.grant.id).await.unwrap(),
            ReversalOutcome::Reversed(_)
        ));

        store.soft_delete_grant(recorded.grant.id).await.unwrap();
        assert!(matches!(
            recorder.reverse_reward(recorded.grant.id).await,
            Err(RewardError::GrantNotFound(_))
        ));
    }
}
