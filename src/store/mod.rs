// =============================================================================
// Feature Store — the boundary between the orchestrator and persistence
// =============================================================================
//
// The orchestrator only ever sees `dyn FeatureStore`, so the concrete backend
// is chosen once in `main` and injected.  Implementations must be safe to
// share across worker tasks.

pub mod sqlite;

use crate::error::MinerError;
use crate::types::{IndicatorRow, PriceBar, UpsertReport};

pub use sqlite::SqliteStore;

pub trait FeatureStore: Send + Sync {
    /// Create any missing tables.  Safe to call repeatedly.
    fn init_schema(&self) -> Result<(), MinerError>;

    /// Cheap round-trip proving the store is reachable.
    fn ping(&self) -> Result<(), MinerError>;

    /// Every known ticker, ascending.
    fn list_instruments(&self) -> Result<Vec<String>, MinerError>;

    /// Full price history for `instrument`, ascending by date.
    ///
    /// `Ok(None)` when the instrument is unknown.  Bars with missing mandatory
    /// fields are reported as `MalformedInput` rather than patched up.
    fn load_prices(&self, instrument: &str) -> Result<Option<Vec<PriceBar>>, MinerError>;

    /// Insert-or-overwrite every admissible row, keyed by `(instrument, date)`.
    fn upsert(&self, instrument: &str, rows: &[IndicatorRow]) -> Result<UpsertReport, MinerError>;

    /// The most recent `limit` persisted rows, ascending by date.
    fn load_indicators(
        &self,
        instrument: &str,
        limit: usize,
    ) -> Result<Vec<IndicatorRow>, MinerError>;

    /// Add bars that are not stored yet, creating the instrument if needed.
    /// Returns the number of bars actually inserted.
    fn insert_prices(&self, instrument: &str, bars: &[PriceBar]) -> Result<usize, MinerError>;
}
