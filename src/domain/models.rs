// src/domain/models.rs
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Fractional digits carried by share quantities.
pub const QUANTITY_SCALE: u32 = 6;

/// Fractional digits carried by INR amounts and prices.
pub const INR_SCALE: u32 = 4;

/// Round a share quantity to 6 decimal places (half away from zero).
pub fn round_quantity(quantity: Decimal) -> Decimal {
    quantity.round_dp_with_strategy(QUANTITY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Round an INR amount to 4 decimal places (half away from zero).
pub fn round_inr(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(INR_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Net STOCK quantity per symbol.
pub type Holdings = BTreeMap<String, Decimal>;

/// A reward claim that has passed validation but is not yet stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRewardGrant {
    pub user_id: i64,
    pub symbol: String,
    pub quantity: Decimal,
    pub event_ts: DateTime<Utc>,
}

/// One recorded instance of a user earning a quantity of a stock.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardGrant {
    pub id: i64,
    pub user_id: i64,
    pub symbol: String,
    pub quantity: Decimal,
    pub event_ts: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl RewardGrant {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Stock,
    Cash,
    Fee,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Stock => "STOCK",
            EntryKind::Cash => "CASH",
            EntryKind::Fee => "FEE",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STOCK" => Ok(EntryKind::Stock),
            "CASH" => Ok(EntryKind::Cash),
            "FEE" => Ok(EntryKind::Fee),
            other => Err(format!("unknown ledger entry kind: {}", other)),
        }
    }
}

/// A ledger leg ready to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEntry {
    pub reward_event_id: i64,
    pub kind: EntryKind,
    pub symbol: Option<String>,
    pub quantity: Decimal,
    pub amount_inr: Decimal,
    pub entry_ts: DateTime<Utc>,
    /// Set on reversal legs, pointing at the leg being negated.
    pub reverses_entry_id: Option<i64>,
}

/// A stored ledger leg. Entries are append-only.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub id: i64,
    pub reward_event_id: i64,
    pub kind: EntryKind,
    pub symbol: Option<String>,
    pub quantity: Decimal,
    pub amount_inr: Decimal,
    pub entry_ts: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub reverses_entry_id: Option<i64>,
}

impl LedgerEntry {
    pub fn is_reversal(&self) -> bool {
        self.reverses_entry_id.is_some()
    }

    /// The offsetting leg for this entry, stamped at `at`.
    pub fn negated(&self, at: DateTime<Utc>) -> NewLedgerEntry {
        NewLedgerEntry {
            reward_event_id: self.reward_event_id,
            kind: self.kind,
            symbol: self.symbol.clone(),
            quantity: -self.quantity,
            amount_inr: -self.amount_inr,
            entry_ts: at,
            reverses_entry_id: Some(self.id),
        }
    }
}

/// Result of asking the ledger to reverse a grant.
#[derive(Debug, Clone, PartialEq)]
pub enum ReversalOutcome {
    Reversed(Vec<LedgerEntry>),
    AlreadyReversed,
}

/// An observed or generated INR price.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSample {
    pub id: i64,
    pub symbol: String,
    pub price_inr: Decimal,
    pub observed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PriceSample {
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        now - self.observed_at > threshold
    }
}

/// Per-symbol split/bonus multiplier and activation flag.
#[derive(Debug, Clone, PartialEq)]
pub struct StockConfig {
    pub symbol: String,
    pub multiplier: Decimal,
    pub is_active: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// INR value of a user's holdings at the end of one UTC day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyValuation {
    pub date: NaiveDate,
    pub value_inr: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TodayStats {
    pub today_rewards: BTreeMap<String, Decimal>,
    pub portfolio_value_inr: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioHolding {
    pub symbol: String,
    pub quantity: Decimal,
    pub current_price: Decimal,
    pub current_value: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub holdings: Vec<PortfolioHolding>,
    pub total_value: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round_inr(dec!(6.12625)), dec!(6.1263));
        assert_eq!(round_inr(dec!(-6.12625)), dec!(-6.1263));
        assert_eq!(round_quantity(dec!(1.2345675)), dec!(1.234568));
        assert_eq!(round_quantity(dec!(2.5)), dec!(2.5));
    }

    #[test]
    fn entry_kind_parses_its_own_rendering() {
        for kind in [EntryKind::Stock, EntryKind::Cash, EntryKind::Fee] {
            assert_eq!(kind.as_str().parse::<EntryKind>().unwrap(), kind);
        }
        assert!("BOND".parse::<EntryKind>().is_err());
    }

    #[test]
    fn negated_entry_points_back_at_original() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 23, 10, 0, 0).unwrap();
        let entry = LedgerEntry {
            id: 41,
            reward_event_id: 9,
            kind: EntryKind::Stock,
            symbol: Some("TCS".into()),
            quantity: dec!(1.5),
            amount_inr: dec!(5521.125),
            entry_ts: ts,
            created_at: ts,
            reverses_entry_id: None,
        };
        let later = ts + Duration::days(2);
        let reversal = entry.negated(later);
        assert_eq!(reversal.quantity, dec!(-1.5));
        assert_eq!(reversal.amount_inr, dec!(-5521.125));
        assert_eq!(reversal.entry_ts, later);
        assert_eq!(reversal.reverses_entry_id, Some(41));
        assert_eq!(reversal.reward_event_id, 9);
    }

    #[test]
    fn staleness_is_strictly_older_than_threshold() {
        let now = Utc.with_ymd_and_hms(2025, 1, 23, 12, 0, 0).unwrap();
        let sample = |observed_at| PriceSample {
            id: 1,
            symbol: "TCS".into(),
            price_inr: dec!(3680.75),
            observed_at,
            created_at: observed_at,
        };
        assert!(!sample(now - Duration::hours(2)).is_stale(now, Duration::hours(2)));
        assert!(sample(now - Duration::hours(3)).is_stale(now, Duration::hours(2)));
    }
}
