// src/infrastructure/storage/mod.rs
// SQLite-backed repositories

pub mod schema;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::errors::{RewardError, RewardResult};
use crate::domain::models::{
    round_inr, round_quantity, EntryKind, LedgerEntry, NewLedgerEntry, NewRewardGrant,
    PriceSample, RewardGrant, StockConfig,
};
use crate::domain::repository::{
    LedgerRepository, LedgerWriter, PostEntries, PriceRepository, RewardRepository,
    StockConfigRepository,
};
use crate::domain::service::Clock;
use schema::{decode_decimal, decode_ts, encode_inr, encode_quantity, encode_ts};

const GRANT_COLUMNS: &str =
    "id, user_id, stock_symbol, quantity, event_ts, created_at, deleted_at";

const ENTRY_COLUMNS: &str = "id, reward_event_id, entry_type, stock_symbol, quantity, \
     amount_inr, entry_ts, created_at, reverses_entry_id";

const PRICE_COLUMNS: &str = "id, stock_symbol, price_inr, observed_at, created_at";

/// One SQLite database holding grants, ledger entries, prices and stock config.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    pub fn open(path: &str, clock: Arc<dyn Clock>) -> RewardResult<Self> {
        let conn = Connection::open(path)?;
        // WAL is ignored by :memory: databases.
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::init(conn, clock)
    }

    pub fn in_memory(clock: Arc<dyn Clock>) -> RewardResult<Self> {
        Self::init(Connection::open_in_memory()?, clock)
    }

    fn init(conn: Connection, clock: Arc<dyn Clock>) -> RewardResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::migrate(&conn)?;
        log::debug!("Reward ledger schema ready");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock,
        })
    }

    /// Mark a grant as no longer live. Its ledger entries stay for audit.
    pub async fn soft_delete_grant(&self, id: i64) -> RewardResult<bool> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE reward_events SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
            params![id, encode_ts(self.clock.now())],
        )?;
        Ok(changed > 0)
    }
}

struct SqliteLedgerWriter<'a> {
    conn: &'a Connection,
    created_at: DateTime<Utc>,
}

impl LedgerWriter for SqliteLedgerWriter<'_> {
    fn insert_entries(&self, entries: &[NewLedgerEntry]) -> RewardResult<Vec<LedgerEntry>> {
        insert_entry_rows(self.conn, entries, self.created_at)
    }
}

fn insert_entry_rows(
    conn: &Connection,
    entries: &[NewLedgerEntry],
    created_at: DateTime<Utc>,
) -> RewardResult<Vec<LedgerEntry>> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO ledger_entries (reward_event_id, entry_type, stock_symbol, quantity,
             amount_inr, entry_ts, created_at, reverses_entry_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;

    let mut stored = Vec::with_capacity(entries.len());
    for entry in entries {
        stmt.execute(params![
            entry.reward_event_id,
            entry.kind.as_str(),
            entry.symbol,
            encode_quantity(entry.quantity),
            encode_inr(entry.amount_inr),
            encode_ts(entry.entry_ts),
            encode_ts(created_at),
            entry.reverses_entry_id,
        ])
        .map_err(|e| match entry.reverses_entry_id {
            Some(_) if is_unique_violation(&e) => {
                RewardError::AlreadyReversed(entry.reward_event_id)
            }
            _ => RewardError::from(e),
        })?;

        stored.push(LedgerEntry {
            id: conn.last_insert_rowid(),
            reward_event_id: entry.reward_event_id,
            kind: entry.kind,
            symbol: entry.symbol.clone(),
            quantity: round_quantity(entry.quantity),
            amount_inr: round_inr(entry.amount_inr),
            entry_ts: entry.entry_ts,
            created_at,
            reverses_entry_id: entry.reverses_entry_id,
        });
    }

    Ok(stored)
}

fn insert_grant_row(
    conn: &Connection,
    grant: &NewRewardGrant,
    created_at: DateTime<Utc>,
) -> RewardResult<RewardGrant> {
    conn.execute(
        "INSERT INTO reward_events (user_id, stock_symbol, quantity, event_ts, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            grant.user_id,
            grant.symbol,
            encode_quantity(grant.quantity),
            encode_ts(grant.event_ts),
            encode_ts(created_at),
        ],
    )
    .map_err(map_grant_insert_error)?;

    Ok(RewardGrant {
        id: conn.last_insert_rowid(),
        user_id: grant.user_id,
        symbol: grant.symbol.clone(),
        quantity: round_quantity(grant.quantity),
        event_ts: grant.event_ts,
        created_at,
        deleted_at: None,
    })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// The live-tuple unique index is the last line of dedup.
fn map_grant_insert_error(e: rusqlite::Error) -> RewardError {
    if is_unique_violation(&e) {
        RewardError::DuplicateGrant
    } else {
        RewardError::from(e)
    }
}

fn grant_from_row(row: &Row<'_>) -> rusqlite::Result<RewardGrant> {
    let quantity: String = row.get(3)?;
    let deleted_at: Option<i64> = row.get(6)?;
    Ok(RewardGrant {
        id: row.get(0)?,
        user_id: row.get(1)?,
        symbol: row.get(2)?,
        quantity: decode_decimal(3, &quantity)?,
        event_ts: decode_ts(4, row.get(4)?)?,
        created_at: decode_ts(5, row.get(5)?)?,
        deleted_at: deleted_at.map(|ts| decode_ts(6, ts)).transpose()?,
    })
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let kind: String = row.get(2)?;
    let quantity: String = row.get(4)?;
    let amount: String = row.get(5)?;
    Ok(LedgerEntry {
        id: row.get(0)?,
        reward_event_id: row.get(1)?,
        kind: kind.parse::<EntryKind>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
        })?,
        symbol: row.get(3)?,
        quantity: decode_decimal(4, &quantity)?,
        amount_inr: decode_decimal(5, &amount)?,
        entry_ts: decode_ts(6, row.get(6)?)?,
        created_at: decode_ts(7, row.get(7)?)?,
        reverses_entry_id: row.get(8)?,
    })
}

fn price_from_row(row: &Row<'_>) -> rusqlite::Result<PriceSample> {
    let price: String = row.get(2)?;
    Ok(PriceSample {
        id: row.get(0)?,
        symbol: row.get(1)?,
        price_inr: decode_decimal(2, &price)?,
        observed_at: decode_ts(3, row.get(3)?)?,
        created_at: decode_ts(4, row.get(4)?)?,
    })
}

fn stock_config_from_row(row: &Row<'_>) -> rusqlite::Result<StockConfig> {
    let multiplier: String = row.get(1)?;
    Ok(StockConfig {
        symbol: row.get(0)?,
        multiplier: decode_decimal(1, &multiplier)?,
        is_active: row.get(2)?,
        notes: row.get(3)?,
        created_at: decode_ts(4, row.get(4)?)?,
        updated_at: decode_ts(5, row.get(5)?)?,
    })
}

#[async_trait]
impl RewardRepository for SqliteStore {
    async fn find_live_grant(&self, grant: &NewRewardGrant) -> RewardResult<Option<RewardGrant>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM reward_events
             WHERE user_id = ?1 AND stock_symbol = ?2 AND quantity = ?3 AND event_ts = ?4
               AND deleted_at IS NULL
             LIMIT 1",
            GRANT_COLUMNS
        );
        let found = conn
            .query_row(
                &sql,
                params![
                    grant.user_id,
                    grant.symbol,
                    encode_quantity(grant.quantity),
                    encode_ts(grant.event_ts),
                ],
                grant_from_row,
            )
            .optional()?;
        Ok(found)
    }

    async fn get_grant(&self, id: i64) -> RewardResult<Option<RewardGrant>> {
        let conn = self.conn.lock().await;
        let sql = format!("SELECT {} FROM reward_events WHERE id = ?1", GRANT_COLUMNS);
        Ok(conn.query_row(&sql, [id], grant_from_row).optional()?)
    }

    async fn create_grant_with_entries(
        &self,
        grant: &NewRewardGrant,
        post: &PostEntries<'_>,
    ) -> RewardResult<(RewardGrant, Vec<LedgerEntry>)> {
        let mut conn = self.conn.lock().await;
        let now = self.clock.now();

        // Dropping an uncommitted transaction rolls it back.
        let tx = conn.transaction()?;
        let stored = insert_grant_row(&tx, grant, now)?;
        let writer = SqliteLedgerWriter {
            conn: &tx,
            created_at: now,
        };
        let entries = post(&stored, &writer)?;
        tx.commit()?;

        Ok((stored, entries))
    }

    async fn grants_between(
        &self,
        user_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RewardResult<Vec<RewardGrant>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM reward_events
             WHERE user_id = ?1 AND deleted_at IS NULL AND event_ts >= ?2 AND event_ts <= ?3
             ORDER BY event_ts DESC, id DESC",
            GRANT_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let grants = stmt
            .query_map(
                params![user_id, encode_ts(start), encode_ts(end)],
                grant_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(grants)
    }

    async fn first_grant(&self, user_id: i64) -> RewardResult<Option<RewardGrant>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM reward_events
             WHERE user_id = ?1 AND deleted_at IS NULL
             ORDER BY event_ts ASC, id ASC
             LIMIT 1",
            GRANT_COLUMNS
        );
        Ok(conn.query_row(&sql, [user_id], grant_from_row).optional()?)
    }
}

#[async_trait]
impl LedgerRepository for SqliteStore {
    async fn insert_entries(&self, entries: &[NewLedgerEntry]) -> RewardResult<Vec<LedgerEntry>> {
        let mut conn = self.conn.lock().await;
        let now = self.clock.now();

        let tx = conn.transaction()?;
        let stored = insert_entry_rows(&tx, entries, now)?;
        tx.commit()?;

        Ok(stored)
    }

    async fn entries_for_grant(&self, grant_id: i64) -> RewardResult<Vec<LedgerEntry>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM ledger_entries WHERE reward_event_id = ?1 ORDER BY id ASC",
            ENTRY_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let entries = stmt
            .query_map([grant_id], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    async fn stock_legs(
        &self,
        user_id: i64,
        as_of: Option<DateTime<Utc>>,
    ) -> RewardResult<Vec<(String, Decimal)>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT le.stock_symbol, le.quantity
             FROM ledger_entries le
             JOIN reward_events re ON le.reward_event_id = re.id
             WHERE re.user_id = ?1
               AND le.entry_type = 'STOCK'
               AND le.stock_symbol IS NOT NULL
               AND re.deleted_at IS NULL
               AND (?2 IS NULL OR re.event_ts <= ?2)",
        )?;
        let legs = stmt
            .query_map(params![user_id, as_of.map(encode_ts)], |row| {
                let symbol: String = row.get(0)?;
                let quantity: String = row.get(1)?;
                Ok((symbol, decode_decimal(1, &quantity)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(legs)
    }
}

#[async_trait]
impl PriceRepository for SqliteStore {
    async fn latest_price(&self, symbol: &str) -> RewardResult<Option<PriceSample>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM price_history
             WHERE stock_symbol = ?1
             ORDER BY observed_at DESC, id DESC
             LIMIT 1",
            PRICE_COLUMNS
        );
        Ok(conn.query_row(&sql, [symbol], price_from_row).optional()?)
    }

    async fn price_at_or_before(
        &self,
        symbol: &str,
        at: DateTime<Utc>,
    ) -> RewardResult<Option<PriceSample>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM price_history
             WHERE stock_symbol = ?1 AND observed_at <= ?2
             ORDER BY observed_at DESC, id DESC
             LIMIT 1",
            PRICE_COLUMNS
        );
        let found = conn
            .query_row(&sql, params![symbol, encode_ts(at)], price_from_row)
            .optional()?;
        Ok(found)
    }

    async fn insert_price(
        &self,
        symbol: &str,
        price_inr: Decimal,
        observed_at: DateTime<Utc>,
    ) -> RewardResult<PriceSample> {
        let conn = self.conn.lock().await;
        let created_at = self.clock.now();
        conn.execute(
            "INSERT INTO price_history (stock_symbol, price_inr, observed_at, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                symbol,
                encode_inr(price_inr),
                encode_ts(observed_at),
                encode_ts(created_at),
            ],
        )?;

        Ok(PriceSample {
            id: conn.last_insert_rowid(),
            symbol: symbol.to_string(),
            price_inr: round_inr(price_inr),
            observed_at,
            created_at,
        })
    }

    async fn latest_prices_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RewardResult<Vec<PriceSample>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM price_history p
             WHERE p.id = (
                 SELECT q.id FROM price_history q
                 WHERE q.stock_symbol = p.stock_symbol
                   AND q.observed_at >= ?1 AND q.observed_at <= ?2
                 ORDER BY q.observed_at DESC, q.id DESC
                 LIMIT 1
             )
             ORDER BY p.stock_symbol ASC",
            PRICE_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let samples = stmt
            .query_map(params![encode_ts(start), encode_ts(end)], price_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(samples)
    }
}

#[async_trait]
impl StockConfigRepository for SqliteStore {
    async fn stock_config(&self, symbol: &str) -> RewardResult<Option<StockConfig>> {
        let conn = self.conn.lock().await;
        let found = conn
            .query_row(
                "SELECT stock_symbol, multiplier, is_active, notes, created_at, updated_at
                 FROM stock_config WHERE stock_symbol = ?1",
                [symbol],
                stock_config_from_row,
            )
            .optional()?;
        Ok(found)
    }

    async fn active_symbols(&self) -> RewardResult<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT stock_symbol FROM stock_config WHERE is_active = 1 ORDER BY stock_symbol ASC",
        )?;
        let symbols = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(symbols)
    }

    async fn seed_stock_configs(&self, symbols: &[String]) -> RewardResult<()> {
        let mut conn = self.conn.lock().await;
        let now = encode_ts(self.clock.now());

        let tx = conn.transaction()?;
        let mut created = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO stock_config
                     (stock_symbol, multiplier, is_active, notes, created_at, updated_at)
                 VALUES (?1, '1.000000', 1, 'Initial configuration', ?2, ?2)",
            )?;
            for symbol in symbols {
                created += stmt.execute(params![symbol, now])?;
            }
        }
        tx.commit()?;

        if created > 0 {
            log::info!("Seeded stock configuration for {} symbols", created);
        }
        Ok(())
    }
}

impl SqliteStore {
    /// Change a symbol's split multiplier or active flag.
    pub async fn update_stock_config(
        &self,
        symbol: &str,
        multiplier: Decimal,
        is_active: bool,
    ) -> RewardResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE stock_config SET multiplier = ?2, is_active = ?3, updated_at = ?4
             WHERE stock_symbol = ?1",
            params![
                symbol,
                encode_quantity(multiplier),
                is_active,
                encode_ts(self.clock.now())
            ],
        )?;
        Ok(())
    }
}
