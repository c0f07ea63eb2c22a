// =============================================================================
// Shared types used across the feature miner
// =============================================================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One daily OHLCV bar for a single instrument.
///
/// Inside the engine every field is complete; rows with missing fields are
/// rejected at the store boundary before a `PriceBar` is ever built.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// Derived feature values for one date.
///
/// `None` means the indicator is undefined for that date (warm-up not yet
/// satisfied, or a division by zero / undefined operand).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRow {
    pub date: NaiveDate,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub ema_20: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_lower: Option<f64>,
    pub daily_return: Option<f64>,
    pub volatility_20: Option<f64>,
    pub volume_sma_20: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub atr_14: Option<f64>,
    pub stoch_rsi: Option<f64>,
}

impl IndicatorRow {
    /// A row for `date` with every indicator undefined.
    #[cfg(test)]
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            rsi: None,
            macd: None,
            macd_signal: None,
            sma_20: None,
            sma_50: None,
            ema_20: None,
            bb_upper: None,
            bb_middle: None,
            bb_lower: None,
            daily_return: None,
            volatility_20: None,
            volume_sma_20: None,
            volume_ratio: None,
            atr_14: None,
            stoch_rsi: None,
        }
    }

    /// Whether the row carries the mandatory indicators required for storage.
    pub fn is_admissible(&self) -> bool {
        self.rsi.is_some() && self.sma_50.is_some()
    }
}

/// Counts returned by an indicator upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertReport {
    /// Rows inserted or overwritten.
    pub written: usize,
    /// Rows rejected by the admission policy (undefined RSI or SMA-50).
    pub skipped: usize,
    /// Rows that were admissible but failed to write individually.
    pub failed: usize,
}

impl std::fmt::Display for UpsertReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "written={}, skipped={}, failed={}",
            self.written, self.skipped, self.failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn empty_row_is_not_admissible() {
        assert!(!IndicatorRow::empty(date()).is_admissible());
    }

    #[test]
    fn admission_needs_both_rsi_and_sma_50() {
        let mut row = IndicatorRow::empty(date());
        row.rsi = Some(55.0);
        assert!(!row.is_admissible());
        row.sma_50 = Some(101.0);
        assert!(row.is_admissible());
        row.rsi = None;
        assert!(!row.is_admissible());
    }

    #[test]
    fn report_display() {
        let r = UpsertReport { written: 3, skipped: 2, failed: 0 };
        assert_eq!(r.to_string(), "written=3, skipped=2, failed=0");
    }
}
