// src/infrastructure/storage/schema.rs
// Schema migration and column codecs

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::domain::models::{round_inr, round_quantity, INR_SCALE, QUANTITY_SCALE};

/// Apply all schema migrations. Safe to run on every start.
pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(include_str!("../../../migrations/001_reward_ledger.sql"))
}

pub fn encode_ts(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

pub fn decode_ts(idx: usize, micros: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp out of range: {}", micros).into(),
        )
    })
}

/// Fixed-scale text so equal quantities compare equal in SQL.
pub fn encode_quantity(quantity: Decimal) -> String {
    fixed_scale(round_quantity(quantity), QUANTITY_SCALE)
}

pub fn encode_inr(amount: Decimal) -> String {
    fixed_scale(round_inr(amount), INR_SCALE)
}

fn fixed_scale(value: Decimal, scale: u32) -> String {
    let mut value = if value.is_zero() { Decimal::ZERO } else { value };
    value.rescale(scale);
    value.to_string()
}

pub fn decode_decimal(idx: usize, text: &str) -> rusqlite::Result<Decimal> {
    Decimal::from_str(text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn migration_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('reward_events', 'ledger_entries', 'price_history', 'stock_config')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 4);
    }

    #[test]
    fn quantities_encode_canonically() {
        assert_eq!(encode_quantity(dec!(2.5)), "2.500000");
        assert_eq!(encode_quantity(dec!(2.500000)), "2.500000");
        assert_eq!(encode_quantity(dec!(0.0000004)), "0.000000");
        assert_eq!(encode_quantity(-Decimal::ZERO), "0.000000");
        assert_eq!(encode_inr(dec!(-6126.25)), "-6126.2500");
    }

    #[test]
    fn timestamps_keep_microseconds() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 23, 10, 30, 0).unwrap()
            + chrono::Duration::microseconds(123_456);
        assert_eq!(decode_ts(0, encode_ts(ts)).unwrap(), ts);
    }
}
