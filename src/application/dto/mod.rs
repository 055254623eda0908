// src/application/dto/mod.rs
// Request and response shapes for the reward ledger

pub mod parser;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::application::usecase::RecordedReward;
use crate::domain::models::{
    DailyValuation, LedgerEntry, Portfolio, PortfolioHolding, RewardGrant, TodayStats,
};

pub use parser::parse_create_reward;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRewardRequest {
    pub user_id: i64,
    pub symbol: String,
    #[serde(deserialize_with = "decimal_from_number_or_string")]
    pub quantity: Decimal,
    /// RFC 3339 instant; the offset is required.
    pub timestamp: String,
}

/// Accepts `2.5` as well as `"2.5"`. Exponent forms such as `1e-3` are allowed.
fn decimal_from_number_or_string<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let text = match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s,
        other => {
            return Err(D::Error::custom(format!(
                "expected a decimal number or string, got {}",
                other
            )))
        }
    };

    Decimal::from_str(text.trim())
        .or_else(|_| Decimal::from_scientific(text.trim()))
        .map_err(|e| D::Error::custom(format!("invalid decimal {:?}: {}", text, e)))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardGrantView {
    pub id: i64,
    pub user_id: i64,
    pub symbol: String,
    pub quantity: Decimal,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<&RewardGrant> for RewardGrantView {
    fn from(grant: &RewardGrant) -> Self {
        Self {
            id: grant.id,
            user_id: grant.user_id,
            symbol: grant.symbol.clone(),
            quantity: grant.quantity,
            timestamp: grant.event_ts,
            created_at: grant.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntryView {
    pub id: i64,
    pub entry_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub quantity: Decimal,
    pub amount_inr: Decimal,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverses_entry_id: Option<i64>,
}

impl From<&LedgerEntry> for LedgerEntryView {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            id: entry.id,
            entry_type: entry.kind.to_string(),
            symbol: entry.symbol.clone(),
            quantity: entry.quantity,
            amount_inr: entry.amount_inr,
            timestamp: entry.entry_ts,
            reverses_entry_id: entry.reverses_entry_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRewardResponse {
    pub reward: RewardGrantView,
    pub price_per_share: Decimal,
    pub entries: Vec<LedgerEntryView>,
}

impl From<&RecordedReward> for CreateRewardResponse {
    fn from(recorded: &RecordedReward) -> Self {
        Self {
            reward: RewardGrantView::from(&recorded.grant),
            price_per_share: recorded.price_per_share,
            entries: recorded.entries.iter().map(LedgerEntryView::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyValuationView {
    pub date: String,
    #[serde(rename = "valueINR")]
    pub value_inr: Decimal,
}

impl From<&DailyValuation> for DailyValuationView {
    fn from(day: &DailyValuation) -> Self {
        Self {
            date: format_date(day.date),
            value_inr: day.value_inr,
        }
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsView {
    pub today_rewards: BTreeMap<String, Decimal>,
    #[serde(rename = "portfolioValueINR")]
    pub portfolio_value_inr: Decimal,
}

impl From<&TodayStats> for StatsView {
    fn from(stats: &TodayStats) -> Self {
        Self {
            today_rewards: stats.today_rewards.clone(),
            portfolio_value_inr: stats.portfolio_value_inr,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioHoldingView {
    pub symbol: String,
    pub quantity: Decimal,
    pub current_price: Decimal,
    pub current_value: Decimal,
}

impl From<&PortfolioHolding> for PortfolioHoldingView {
    fn from(holding: &PortfolioHolding) -> Self {
        Self {
            symbol: holding.symbol.clone(),
            quantity: holding.quantity,
            current_price: holding.current_price,
            current_value: holding.current_value,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioView {
    pub holdings: Vec<PortfolioHoldingView>,
    pub total_value: Decimal,
}

impl From<&Portfolio> for PortfolioView {
    fn from(portfolio: &Portfolio) -> Self {
        Self {
            holdings: portfolio.holdings.iter().map(PortfolioHoldingView::from).collect(),
            total_value: portfolio.total_value,
        }
    }
}
