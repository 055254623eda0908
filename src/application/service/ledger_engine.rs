// src/application/service/ledger_engine.rs
// Balanced entry sets per grant and holdings by summation

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::domain::errors::{RewardError, RewardResult};
use crate::domain::fees::FeeBreakdown;
use crate::domain::models::{
    round_inr, EntryKind, Holdings, LedgerEntry, NewLedgerEntry, ReversalOutcome, RewardGrant,
};
use crate::domain::repository::{LedgerRepository, LedgerWriter};
use crate::domain::service::Clock;

pub struct LedgerEngine {
    ledger: Arc<dyn LedgerRepository>,
    clock: Arc<dyn Clock>,
}

impl LedgerEngine {
    pub fn new(ledger: Arc<dyn LedgerRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { ledger, clock }
    }

    /// The STOCK, CASH and FEE legs for a grant valued at `price`.
    pub fn posting(grant: &RewardGrant, price: Decimal, fees: &FeeBreakdown) -> Vec<NewLedgerEntry> {
        let total_value = round_inr(price * grant.quantity);

        let leg = |kind, symbol: Option<String>, quantity, amount_inr| NewLedgerEntry {
            reward_event_id: grant.id,
            kind,
            symbol,
            quantity,
            amount_inr,
            entry_ts: grant.event_ts,
            reverses_entry_id: None,
        };

        vec![
            leg(
                EntryKind::Stock,
                Some(grant.symbol.clone()),
                grant.quantity,
                total_value,
            ),
            leg(EntryKind::Cash, None, Decimal::ZERO, -total_value),
            leg(EntryKind::Fee, None, Decimal::ZERO, -fees.total),
        ]
    }

    /// Post the three legs through `writer`, inside the caller's transaction.
    pub fn post_entries(
        &self,
        grant: &RewardGrant,
        price: Decimal,
        writer: &dyn LedgerWriter,
    ) -> RewardResult<Vec<LedgerEntry>> {
        let fees = FeeBreakdown::calculate(price, grant.quantity);
        let entries = writer.insert_entries(&Self::posting(grant, price, &fees))?;

        log::debug!(
            "Posted {} ledger entries for grant {} (fees {})",
            entries.len(),
            grant.id,
            fees.total
        );
        Ok(entries)
    }

    /// Net positive STOCK quantity per symbol over the user's live grants.
    pub async fn holdings(&self, user_id: i64) -> RewardResult<Holdings> {
        let legs = self.ledger.stock_legs(user_id, None).await?;
        Ok(net_positive(legs))
    }

    /// Same as `holdings`, counting only grants with `event_ts <= as_of`.
    pub async fn holdings_as_of(
        &self,
        user_id: i64,
        as_of: DateTime<Utc>,
    ) -> RewardResult<Holdings> {
        let legs = self.ledger.stock_legs(user_id, Some(as_of)).await?;
        Ok(net_positive(legs))
    }

    /// Append the negation of every original entry of `grant`.
    ///
    /// A grant is reversed at most once; later calls report
    /// `ReversalOutcome::AlreadyReversed` and write nothing.
    pub async fn reverse(&self, grant: &RewardGrant) -> RewardResult<ReversalOutcome> {
        let existing = self.ledger.entries_for_grant(grant.id).await?;
        if existing.iter().any(LedgerEntry::is_reversal) {
            log::info!("Grant {} is already reversed", grant.id);
            return Ok(ReversalOutcome::AlreadyReversed);
        }

        let now = self.clock.now();
        let reversal: Vec<NewLedgerEntry> = existing.iter().map(|e| e.negated(now)).collect();
        if reversal.is_empty() {
            log::warn!("Grant {} has no ledger entries to reverse", grant.id);
            return Ok(ReversalOutcome::Reversed(Vec::new()));
        }

        match self.ledger.insert_entries(&reversal).await {
            Ok(entries) => {
                log::info!(
                    "Reversed grant {} with {} offsetting entries",
                    grant.id,
                    entries.len()
                );
                Ok(ReversalOutcome::Reversed(entries))
            }
            // Lost a race with a concurrent reversal.
            Err(RewardError::AlreadyReversed(_)) => Ok(ReversalOutcome::AlreadyReversed),
            Err(e) => Err(e),
        }
    }

    pub async fn entries_for(&self, grant_id: i64) -> RewardResult<Vec<LedgerEntry>> {
        self.ledger.entries_for_grant(grant_id).await
    }
}

fn net_positive(legs: Vec<(String, Decimal)>) -> Holdings {
    let mut holdings = Holdings::new();
    for (symbol, quantity) in legs {
        *holdings.entry(symbol).or_insert(Decimal::ZERO) += quantity;
    }
    holdings.retain(|_, quantity| *quantity > Decimal::ZERO);
    holdings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::NewRewardGrant;
    use crate::domain::repository::RewardRepository;
    use crate::infrastructure::{FixedClock, SqliteStore};
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn ts(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, hour, 0, 0).unwrap()
    }

    fn setup() -> (Arc<FixedClock>, SqliteStore, LedgerEngine) {
        let clock = Arc::new(FixedClock::new(ts(23, 12)));
        let store = SqliteStore::in_memory(clock.clone()).unwrap();
        let engine = LedgerEngine::new(Arc::new(store.clone()), clock.clone());
        (clock, store, engine)
    }

    async fn grant(
        store: &SqliteStore,
        engine: &LedgerEngine,
        symbol: &str,
        quantity: Decimal,
        at: DateTime<Utc>,
        price: Decimal,
    ) -> (RewardGrant, Vec<LedgerEntry>) {
        let new = NewRewardGrant {
            user_id: 1,
            symbol: symbol.to_string(),
            quantity,
            event_ts: at,
        };
        store
            .create_grant_with_entries(&new, &|g, w| engine.post_entries(g, price, w))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn posting_is_balanced() {
        let (_, store, engine) = setup();
        let (g, entries) = grant(&store, &engine, "RELIANCE", dec!(2.5), ts(23, 9), dec!(2450.50)).await;

        assert_eq!(entries.len(), 3);
        let stock = &entries[0];
        assert_eq!(stock.kind, EntryKind::Stock);
        assert_eq!(stock.symbol.as_deref(), Some("RELIANCE"));
        assert_eq!(stock.quantity, dec!(2.5));
        assert_eq!(stock.amount_inr, dec!(6126.25));

        let cash = &entries[1];
        assert_eq!(cash.kind, EntryKind::Cash);
        assert_eq!(cash.quantity, Decimal::ZERO);
        assert_eq!(cash.amount_inr, dec!(-6126.25));

        let fee = &entries[2];
        assert_eq!(fee.kind, EntryKind::Fee);
        assert_eq!(fee.amount_inr, dec!(-8.2949));

        let net: Decimal = entries.iter().map(|e| e.amount_inr).sum();
        assert_eq!(net, fee.amount_inr);
        assert!(entries.iter().all(|e| e.entry_ts == g.event_ts));
    }

    #[tokio::test]
    async fn holdings_sum_and_drop_non_positive() {
        let (_, store, engine) = setup();
        grant(&store, &engine, "TCS", dec!(1.25), ts(20, 9), dec!(3680)).await;
        grant(&store, &engine, "TCS", dec!(0.75), ts(22, 9), dec!(3700)).await;
        grant(&store, &engine, "INFY", dec!(3), ts(22, 10), dec!(1500)).await;

        let holdings = engine.holdings(1).await.unwrap();
        assert_eq!(holdings.get("TCS"), Some(&dec!(2)));
        assert_eq!(holdings.get("INFY"), Some(&dec!(3)));

        let earlier = engine.holdings_as_of(1, ts(21, 0)).await.unwrap();
        assert_eq!(earlier.len(), 1);
        assert_eq!(earlier.get("TCS"), Some(&dec!(1.25)));

        assert!(engine.holdings(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reversal_nullifies_grant_and_keeps_audit_trail() {
        let (clock, store, engine) = setup();
        let (kept, _) = grant(&store, &engine, "ITC", dec!(10), ts(22, 9), dec!(455.6)).await;
        let (undone, _) = grant(&store, &engine, "ITC", dec!(4), ts(23, 9), dec!(460)).await;
        clock.advance(Duration::hours(1));

        let outcome = engine.reverse(&undone).await.unwrap();
        let ReversalOutcome::Reversed(reversal) = outcome else {
            panic!("expected reversal entries");
        };
        assert_eq!(reversal.len(), 3);
        assert!(reversal.iter().all(|e| e.entry_ts == ts(23, 13)));

        let all = engine.entries_for(undone.id).await.unwrap();
        assert_eq!(all.len(), 6);
        for kind in [EntryKind::Stock, EntryKind::Cash, EntryKind::Fee] {
            let qty: Decimal = all.iter().filter(|e| e.kind == kind).map(|e| e.quantity).sum();
            let amt: Decimal = all.iter().filter(|e| e.kind == kind).map(|e| e.amount_inr).sum();
            assert_eq!(qty, Decimal::ZERO);
            assert_eq!(amt, Decimal::ZERO);
        }

        assert_eq!(engine.holdings(1).await.unwrap().get("ITC"), Some(&kept.quantity));
    }

    #[tokio::test]
    async fn second_reversal_is_a_no_op() {
        let (_, store, engine) = setup();
        let (g, _) = grant(&store, &engine, "SBIN", dec!(5), ts(23, 9), dec!(620.4)).await;

        assert!(matches!(
            engine.reverse(&g).await.unwrap(),
            ReversalOutcome::Reversed(_)
        ));
        assert_eq!(
            engine.reverse(&g).await.unwrap(),
            ReversalOutcome::AlreadyReversed
        );
        assert_eq!(engine.entries_for(g.id).await.unwrap().len(), 6);
        assert!(engine.holdings(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn storage_rejects_a_duplicate_reversal_leg() {
        let (_, store, engine) = setup();
        let (g, entries) = grant(&store, &engine, "LT", dec!(1), ts(23, 9), dec!(3420.7)).await;

        let negated: Vec<_> = entries.iter().map(|e| e.negated(ts(23, 12))).collect();
        store.insert_entries(&negated).await.unwrap();

        let err = store.insert_entries(&negated).await.unwrap_err();
        assert!(matches!(err, RewardError::AlreadyReversed(id) if id == g.id));
        assert_eq!(engine.entries_for(g.id).await.unwrap().len(), 6);
    }
}
