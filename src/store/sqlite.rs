// =============================================================================
// SQLite Feature Store
// =============================================================================
//
// Tables:
//   stocks                — one row per ticker
//   technical_prices      — daily OHLCV, unique on (stock_id, date)
//   technical_indicators  — engine output, unique on (stock_id, date)
//
// Indicator writes are an upsert inside one transaction per instrument: the
// conflict clause overwrites every indicator column and stamps `updated_at`,
// so re-running on the same input leaves the table unchanged apart from the
// timestamp.  A single connection is shared behind a mutex.
//
// Databases created by older builds may lack columns added since; schema init
// adds every missing nullable column before anything is written.
// =============================================================================

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::{debug, info, warn};

use super::FeatureStore;
use crate::engine::admit;
use crate::error::MinerError;
use crate::types::{IndicatorRow, PriceBar, UpsertReport};

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS stocks (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    ticker       TEXT UNIQUE NOT NULL,
    company_name TEXT,
    sector       TEXT,
    industry     TEXT,
    currency     TEXT DEFAULT 'IDR',
    is_active    INTEGER DEFAULT 1,
    created_at   TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS technical_prices (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    stock_id    INTEGER NOT NULL REFERENCES stocks(id) ON DELETE CASCADE,
    date        TEXT NOT NULL,
    open        REAL,
    high        REAL,
    low         REAL,
    close       REAL NOT NULL,
    adj_close   REAL,
    volume      INTEGER,
    data_source TEXT,
    UNIQUE(stock_id, date)
);
CREATE TABLE IF NOT EXISTS technical_indicators (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    stock_id      INTEGER NOT NULL REFERENCES stocks(id) ON DELETE CASCADE,
    date          TEXT NOT NULL,
    rsi           REAL,
    macd          REAL,
    macd_signal   REAL,
    sma_20        REAL,
    sma_50        REAL,
    ema_20        REAL,
    bb_upper      REAL,
    bb_lower      REAL,
    bb_middle     REAL,
    daily_return  REAL,
    volatility_20 REAL,
    volume_sma_20 REAL,
    volume_ratio  REAL,
    atr_14        REAL,
    stoch_rsi     REAL,
    updated_at    TEXT DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(stock_id, date)
);
";

const UPSERT_SQL: &str = "
INSERT INTO technical_indicators (
    stock_id, date,
    rsi, macd, macd_signal,
    sma_20, sma_50, ema_20,
    bb_upper, bb_lower, bb_middle,
    daily_return, volatility_20,
    volume_sma_20, volume_ratio,
    atr_14, stoch_rsi,
    updated_at
) VALUES (
    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
    CURRENT_TIMESTAMP
)
ON CONFLICT (stock_id, date) DO UPDATE SET
    rsi           = excluded.rsi,
    macd          = excluded.macd,
    macd_signal   = excluded.macd_signal,
    sma_20        = excluded.sma_20,
    sma_50        = excluded.sma_50,
    ema_20        = excluded.ema_20,
    bb_upper      = excluded.bb_upper,
    bb_lower      = excluded.bb_lower,
    bb_middle     = excluded.bb_middle,
    daily_return  = excluded.daily_return,
    volatility_20 = excluded.volatility_20,
    volume_sma_20 = excluded.volume_sma_20,
    volume_ratio  = excluded.volume_ratio,
    atr_14        = excluded.atr_14,
    stoch_rsi     = excluded.stoch_rsi,
    updated_at    = CURRENT_TIMESTAMP
";

/// Columns schema init adds when an existing table lacks them.
///
/// SQLite's `ADD COLUMN` rejects non-constant defaults, so timestamp columns
/// are declared bare here and the writers set them explicitly.
const EXPECTED_COLUMNS: &[(&str, &[(&str, &str)])] = &[
    (
        "stocks",
        &[
            ("company_name", "TEXT"),
            ("sector", "TEXT"),
            ("industry", "TEXT"),
            ("currency", "TEXT DEFAULT 'IDR'"),
            ("is_active", "INTEGER DEFAULT 1"),
            ("created_at", "TEXT"),
        ],
    ),
    (
        "technical_prices",
        &[
            ("open", "REAL"),
            ("high", "REAL"),
            ("low", "REAL"),
            ("adj_close", "REAL"),
            ("volume", "INTEGER"),
            ("data_source", "TEXT"),
        ],
    ),
    (
        "technical_indicators",
        &[
            ("rsi", "REAL"),
            ("macd", "REAL"),
            ("macd_signal", "REAL"),
            ("sma_20", "REAL"),
            ("sma_50", "REAL"),
            ("ema_20", "REAL"),
            ("bb_upper", "REAL"),
            ("bb_lower", "REAL"),
            ("bb_middle", "REAL"),
            ("daily_return", "REAL"),
            ("volatility_20", "REAL"),
            ("volume_sma_20", "REAL"),
            ("volume_ratio", "REAL"),
            ("atr_14", "REAL"),
            ("stoch_rsi", "REAL"),
            ("updated_at", "TEXT"),
        ],
    ),
];

fn existing_columns(conn: &Connection, table: &str) -> Result<HashSet<String>, MinerError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |r| r.get::<_, String>(1))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(names)
}

/// Add every expected column an existing table is missing.  Returns how many
/// were added.
fn add_missing_columns(conn: &Connection) -> Result<usize, MinerError> {
    let mut added = 0;
    for (table, columns) in EXPECTED_COLUMNS {
        let present = existing_columns(conn, table)?;
        for (name, decl) in columns.iter() {
            if present.contains(*name) {
                continue;
            }
            conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {name} {decl}"))?;
            warn!(table = *table, column = *name, "added missing column");
            added += 1;
        }
    }
    Ok(added)
}

/// A price row as stored; every field except `close` may be NULL.
struct StoredBar {
    date: NaiveDate,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: f64,
    volume: Option<i64>,
}

impl StoredBar {
    fn into_bar(self) -> Result<PriceBar, MinerError> {
        let missing =
            |field: &str| MinerError::MalformedInput(format!("missing {field} on {}", self.date));
        Ok(PriceBar {
            date: self.date,
            open: self.open.ok_or_else(|| missing("open"))?,
            high: self.high.ok_or_else(|| missing("high"))?,
            low: self.low.ok_or_else(|| missing("low"))?,
            close: self.close,
            volume: self.volume.ok_or_else(|| missing("volume"))?,
        })
    }
}

/// Whether a write error concerns only the row being written (constraint or
/// type problems) rather than the store itself.
fn is_row_error(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(err, _) => matches!(
            err.code,
            ErrorCode::ConstraintViolation | ErrorCode::TypeMismatch | ErrorCode::TooBig
        ),
        rusqlite::Error::ToSqlConversionFailure(_) => true,
        _ => false,
    }
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MinerError> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| MinerError::Persistence(format!("cannot open {}: {e}", path.display())))?;
        info!(path = %path.display(), "sqlite store opened");
        Self::with_connection(conn)
    }

    /// A throwaway store, mostly for tests and dry runs.
    pub fn open_in_memory() -> Result<Self, MinerError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, MinerError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn stock_id(conn: &Connection, ticker: &str) -> Result<Option<i64>, MinerError> {
        let id = conn
            .query_row("SELECT id FROM stocks WHERE ticker = ?1", [ticker], |r| r.get(0))
            .optional()?;
        Ok(id)
    }
}

impl FeatureStore for SqliteStore {
    fn init_schema(&self) -> Result<(), MinerError> {
        let conn = self.conn.lock();
        conn.execute_batch(SCHEMA)?;
        let added = add_missing_columns(&conn)?;
        info!(columns_added = added, "schema verified");
        Ok(())
    }

    fn ping(&self) -> Result<(), MinerError> {
        let one: i64 = self.conn.lock().query_row("SELECT 1", [], |r| r.get(0))?;
        debug!(result = one, "store ping");
        Ok(())
    }

    fn list_instruments(&self) -> Result<Vec<String>, MinerError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT ticker FROM stocks ORDER BY ticker")?;
        let tickers = stmt
            .query_map([], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(tickers)
    }

    fn load_prices(&self, instrument: &str) -> Result<Option<Vec<PriceBar>>, MinerError> {
        let conn = self.conn.lock();
        let Some(stock_id) = Self::stock_id(&conn, instrument)? else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT date, open, high, low, close, volume
             FROM technical_prices
             WHERE stock_id = ?1
             ORDER BY date",
        )?;
        let stored = stmt
            .query_map([stock_id], |row| {
                Ok(StoredBar {
                    date: row.get(0)?,
                    open: row.get(1)?,
                    high: row.get(2)?,
                    low: row.get(3)?,
                    close: row.get(4)?,
                    volume: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let bars = stored
            .into_iter()
            .map(StoredBar::into_bar)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(bars))
    }

    fn upsert(&self, instrument: &str, rows: &[IndicatorRow]) -> Result<UpsertReport, MinerError> {
        let (admitted, skipped) = admit(rows);
        let mut report = UpsertReport {
            skipped,
            ..UpsertReport::default()
        };

        let mut conn = self.conn.lock();
        let stock_id = Self::stock_id(&conn, instrument)?
            .ok_or_else(|| MinerError::UnknownInstrument(instrument.to_string()))?;

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(UPSERT_SQL)?;
            for r in admitted {
                let result = stmt.execute(params![
                    stock_id,
                    r.date,
                    r.rsi,
                    r.macd,
                    r.macd_signal,
                    r.sma_20,
                    r.sma_50,
                    r.ema_20,
                    r.bb_upper,
                    r.bb_lower,
                    r.bb_middle,
                    r.daily_return,
                    r.volatility_20,
                    r.volume_sma_20,
                    r.volume_ratio,
                    r.atr_14,
                    r.stoch_rsi,
                ]);
                match result {
                    Ok(_) => report.written += 1,
                    Err(e) if is_row_error(&e) => {
                        debug!(instrument, date = %r.date, error = %e, "indicator row rejected");
                        report.failed += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        tx.commit()?;

        Ok(report)
    }

    fn load_indicators(
        &self,
        instrument: &str,
        limit: usize,
    ) -> Result<Vec<IndicatorRow>, MinerError> {
        let conn = self.conn.lock();
        let stock_id = Self::stock_id(&conn, instrument)?
            .ok_or_else(|| MinerError::UnknownInstrument(instrument.to_string()))?;

        let mut stmt = conn.prepare(
            "SELECT date, rsi, macd, macd_signal, sma_20, sma_50, ema_20,
                    bb_upper, bb_middle, bb_lower, daily_return, volatility_20,
                    volume_sma_20, volume_ratio, atr_14, stoch_rsi
             FROM technical_indicators
             WHERE stock_id = ?1
             ORDER BY date DESC
             LIMIT ?2",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows = stmt
            .query_map(params![stock_id, limit], |r| {
                Ok(IndicatorRow {
                    date: r.get(0)?,
                    rsi: r.get(1)?,
                    macd: r.get(2)?,
                    macd_signal: r.get(3)?,
                    sma_20: r.get(4)?,
                    sma_50: r.get(5)?,
                    ema_20: r.get(6)?,
                    bb_upper: r.get(7)?,
                    bb_middle: r.get(8)?,
                    bb_lower: r.get(9)?,
                    daily_return: r.get(10)?,
                    volatility_20: r.get(11)?,
                    volume_sma_20: r.get(12)?,
                    volume_ratio: r.get(13)?,
                    atr_14: r.get(14)?,
                    stoch_rsi: r.get(15)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        // Reverse to chronological order.
        rows.reverse();
        Ok(rows)
    }

    fn insert_prices(&self, instrument: &str, bars: &[PriceBar]) -> Result<usize, MinerError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("INSERT OR IGNORE INTO stocks (ticker) VALUES (?1)", [instrument])?;
        let stock_id = Self::stock_id(&tx, instrument)?
            .ok_or_else(|| MinerError::Persistence(format!("failed to register {instrument}")))?;

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO technical_prices
                 (stock_id, date, open, high, low, close, adj_close, volume, data_source)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7, 'csv_import')",
            )?;
            for b in bars {
                inserted += stmt.execute(params![
                    stock_id, b.date, b.open, b.high, b.low, b.close, b.volume
                ])?;
            }
        }
        tx.commit()?;

        Ok(inserted)
    }
}
