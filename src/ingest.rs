// =============================================================================
// CSV Price Ingestion
// =============================================================================
//
// Reads daily bars from a CSV file with the header
//
//   date,open,high,low,close,volume
//
// and hands them to the store, which keeps already-stored dates untouched.
// Rows are sorted and de-duplicated by date before they leave this module,
// so the engine always sees an ordered series.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{info, warn};

use crate::store::FeatureStore;
use crate::types::PriceBar;

#[derive(Debug, Deserialize)]
struct CsvBar {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    /// Some providers export volume as a float.
    volume: f64,
}

impl CsvBar {
    fn into_bar(self) -> Result<PriceBar> {
        if !self.volume.is_finite() || self.volume < 0.0 {
            bail!("invalid volume {} on {}", self.volume, self.date);
        }
        Ok(PriceBar {
            date: self.date,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume.round() as i64,
        })
    }
}

/// Parse bars from any CSV reader; later rows win on duplicate dates.
pub fn read_bars<R: std::io::Read>(reader: R) -> Result<Vec<PriceBar>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut by_date: BTreeMap<NaiveDate, PriceBar> = BTreeMap::new();

    for (line, record) in rdr.deserialize::<CsvBar>().enumerate() {
        // +2: one for the header, one for 1-based numbering
        let raw = record.with_context(|| format!("bad CSV record on line {}", line + 2))?;
        let bar = raw.into_bar()?;
        if by_date.insert(bar.date, bar).is_some() {
            warn!(line = line + 2, "duplicate date in CSV, keeping the later row");
        }
    }

    Ok(by_date.into_values().collect())
}

/// Import a CSV file for `ticker`; returns the number of new bars stored.
pub fn import_csv(store: &dyn FeatureStore, ticker: &str, path: &Path) -> Result<usize> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let bars = read_bars(std::io::BufReader::new(file))
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let inserted = store
        .insert_prices(ticker, &bars)
        .with_context(|| format!("failed to store prices for {ticker}"))?;

    info!(
        ticker,
        path = %path.display(),
        read = bars.len(),
        inserted,
        "price import finished"
    );
    Ok(inserted)
}
