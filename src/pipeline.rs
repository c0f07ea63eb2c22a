// =============================================================================
// Batch Orchestrator — load, compute, upsert for each instrument
// =============================================================================
//
// Per instrument:
//   1. load price history + run the engine   (blocking, under a timeout)
//   2. upsert the rows                        (blocking, never timed out)
//
// Only step 1 is raced against the clock, so an expired instrument has not
// written anything and its result is simply dropped.  Instruments run on a
// worker pool bounded by `max_concurrency`.
//
// Failure policy:
//   - InsufficientHistory / MalformedInput / UnknownInstrument / Timeout /
//     Worker  => warn, skip the instrument, keep going.
//   - Persistence                                     => abort the batch.
// =============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::config::MinerConfig;
use crate::engine::{compute_indicators_with, EngineOptions};
use crate::error::MinerError;
use crate::store::FeatureStore;
use crate::types::{IndicatorRow, UpsertReport};

/// What the orchestrator needs from the config.
#[derive(Debug, Clone, Copy)]
pub struct RunSettings {
    pub min_history_bars: usize,
    pub max_concurrency: usize,
    pub instrument_timeout: Duration,
    pub engine: EngineOptions,
}

impl RunSettings {
    pub fn from_config(cfg: &MinerConfig) -> Self {
        Self {
            min_history_bars: cfg.min_history_bars,
            max_concurrency: cfg.max_concurrency.max(1),
            instrument_timeout: cfg.instrument_timeout(),
            engine: cfg.engine_options(),
        }
    }
}

/// Result of processing one instrument that did not abort the batch.
#[derive(Debug)]
pub enum InstrumentOutcome {
    Written(UpsertReport),
    Skipped(MinerError),
}

#[derive(Debug, Clone)]
pub struct SkippedInstrument {
    pub ticker: String,
    pub reason: String,
}

/// Totals for one batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub instruments: usize,
    pub succeeded: usize,
    pub rows_written: usize,
    pub rows_skipped: usize,
    pub rows_failed: usize,
    pub skipped: Vec<SkippedInstrument>,
}

impl BatchSummary {
    fn record(&mut self, ticker: &str, outcome: InstrumentOutcome) {
        self.instruments += 1;
        match outcome {
            InstrumentOutcome::Written(r) => {
                self.succeeded += 1;
                self.rows_written += r.written;
                self.rows_skipped += r.skipped;
                self.rows_failed += r.failed;
            }
            InstrumentOutcome::Skipped(e) => self.skipped.push(SkippedInstrument {
                ticker: ticker.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

pub struct Orchestrator {
    store: Arc<dyn FeatureStore>,
    settings: RunSettings,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn FeatureStore>, settings: RunSettings) -> Self {
        Self { store, settings }
    }

    /// Fail fast if the store cannot be reached at all.
    pub async fn check_store(&self) -> Result<(), MinerError> {
        let store = self.store.clone();
        run_blocking(move || store.ping()).await?;
        Ok(())
    }

    /// Process a single instrument.  `Err` only for fatal errors.
    pub async fn run_one(&self, ticker: &str) -> Result<InstrumentOutcome, MinerError> {
        self.check_store().await?;
        self.process(ticker).await
    }

    /// Process `tickers`, or every instrument in the store when empty.
    pub async fn run_all(&self, tickers: &[String]) -> Result<BatchSummary, MinerError> {
        self.check_store().await?;

        let tickers = if tickers.is_empty() {
            let store = self.store.clone();
            run_blocking(move || store.list_instruments()).await?
        } else {
            tickers.to_vec()
        };

        info!(
            count = tickers.len(),
            max_concurrency = self.settings.max_concurrency,
            "starting indicator batch"
        );
        let started = Instant::now();

        let mut results = stream::iter(tickers)
            .map(|ticker| async move {
                let outcome = self.process(&ticker).await;
                (ticker, outcome)
            })
            .buffer_unordered(self.settings.max_concurrency.max(1));

        let mut summary = BatchSummary::default();
        while let Some((ticker, outcome)) = results.next().await {
            match outcome {
                Ok(outcome) => summary.record(&ticker, outcome),
                Err(e) => {
                    error!(ticker = %ticker, error = %e, "fatal store failure, aborting batch");
                    return Err(e);
                }
            }
        }

        info!(
            instruments = summary.instruments,
            succeeded = summary.succeeded,
            skipped = summary.skipped.len(),
            rows_written = summary.rows_written,
            rows_skipped = summary.rows_skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "indicator batch finished"
        );
        Ok(summary)
    }

    async fn process(&self, ticker: &str) -> Result<InstrumentOutcome, MinerError> {
        let result = match self.prepare(ticker).await {
            Ok(rows) => self.write(ticker, rows).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(report) => {
                info!(
                    ticker,
                    saved = report.written,
                    skipped = report.skipped,
                    failed = report.failed,
                    "indicators updated"
                );
                Ok(InstrumentOutcome::Written(report))
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(ticker, reason = %e, "instrument skipped");
                Ok(InstrumentOutcome::Skipped(e))
            }
        }
    }

    /// Load history and compute rows, bounded by the instrument timeout.
    async fn prepare(&self, ticker: &str) -> Result<Vec<IndicatorRow>, MinerError> {
        let store = self.store.clone();
        let settings = self.settings;
        let owned = ticker.to_string();

        let work = run_blocking(move || {
            let bars = store
                .load_prices(&owned)?
                .ok_or_else(|| MinerError::UnknownInstrument(owned.clone()))?;
            if bars.len() < settings.min_history_bars {
                return Err(MinerError::InsufficientHistory {
                    bars: bars.len(),
                    required: settings.min_history_bars,
                });
            }
            let started = Instant::now();
            let rows = compute_indicators_with(&bars, &settings.engine)?;
            debug!(
                ticker = %owned,
                bars = bars.len(),
                elapsed_us = started.elapsed().as_micros() as u64,
                "indicators computed"
            );
            Ok(rows)
        });

        match tokio::time::timeout(settings.instrument_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(MinerError::Timeout(settings.instrument_timeout)),
        }
    }

    async fn write(
        &self,
        ticker: &str,
        rows: Vec<IndicatorRow>,
    ) -> Result<UpsertReport, MinerError> {
        let store = self.store.clone();
        let owned = ticker.to_string();
        run_blocking(move || store.upsert(&owned, &rows)).await
    }
}

/// Run store / engine work on the blocking pool.
async fn run_blocking<T, F>(f: F) -> Result<T, MinerError>
where
    F: FnOnce() -> Result<T, MinerError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MinerError::Worker(e.to_string()))?
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::PriceBar;
    use chrono::{Duration as Days, NaiveDate};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn bars(n: usize) -> Vec<PriceBar> {
        (0..n)
            .map(|i| {
                let c = 500.0 - (i as f64 * 0.4).sin() * 10.0 + i as f64 * 0.2;
                PriceBar {
                    date: NaiveDate::from_ymd_opt(2023, 6, 1).unwrap() + Days::days(i as i64),
                    open: c,
                    high: c + 2.0,
                    low: c - 2.0,
                    close: c,
                    volume: 5_000,
                }
            })
            .collect()
    }

    fn settings() -> RunSettings {
        RunSettings {
            min_history_bars: 60,
            max_concurrency: 2,
            instrument_timeout: Duration::from_secs(5),
            engine: EngineOptions::default(),
        }
    }

    fn seeded(instruments: &[(&str, usize)]) -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.init_schema().unwrap();
        for (ticker, n) in instruments {
            store.insert_prices(ticker, &bars(*n)).unwrap();
        }
        store
    }

    /// Wraps a real store and injects failures / delays per instrument.
    struct ScriptedStore {
        inner: SqliteStore,
        failing_upsert: Option<&'static str>,
        malformed: Option<&'static str>,
        load_delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        upserts: Mutex<Vec<String>>,
        ping_fails: bool,
    }

    impl ScriptedStore {
        fn new(inner: SqliteStore) -> Self {
            Self {
                inner,
                failing_upsert: None,
                malformed: None,
                load_delay: Duration::ZERO,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                upserts: Mutex::new(Vec::new()),
                ping_fails: false,
            }
        }
    }

    impl FeatureStore for ScriptedStore {
        fn init_schema(&self) -> Result<(), MinerError> {
            self.inner.init_schema()
        }

        fn ping(&self) -> Result<(), MinerError> {
            if self.ping_fails {
                return Err(MinerError::Persistence("connection refused".into()));
            }
            self.inner.ping()
        }

        fn list_instruments(&self) -> Result<Vec<String>, MinerError> {
            self.inner.list_instruments()
        }

        fn load_prices(&self, instrument: &str) -> Result<Option<Vec<PriceBar>>, MinerError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.load_delay);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.malformed == Some(instrument) {
                return Err(MinerError::MalformedInput("missing volume on 2023-06-02".into()));
            }
            self.inner.load_prices(instrument)
        }

        fn upsert(
            &self,
            instrument: &str,
            rows: &[IndicatorRow],
        ) -> Result<UpsertReport, MinerError> {
            if self.failing_upsert == Some(instrument) {
                return Err(MinerError::Persistence("disk I/O error".into()));
            }
            self.upserts.lock().push(instrument.to_string());
            self.inner.upsert(instrument, rows)
        }

        fn load_indicators(
            &self,
            instrument: &str,
            limit: usize,
        ) -> Result<Vec<IndicatorRow>, MinerError> {
            self.inner.load_indicators(instrument, limit)
        }

        fn insert_prices(&self, instrument: &str, bars: &[PriceBar]) -> Result<usize, MinerError> {
            self.inner.insert_prices(instrument, bars)
        }
    }

    #[tokio::test]
    async fn batch_processes_all_instruments() {
        let store = Arc::new(seeded(&[("AAA", 80), ("BBB", 90), ("SHORT", 30)]));
        let orch = Orchestrator::new(store.clone(), settings());

        let summary = orch.run_all(&[]).await.unwrap();
        assert_eq!(summary.instruments, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].ticker, "SHORT");
        assert!(summary.skipped[0].reason.contains("insufficient history"));
        // sma_50 gates the first 49 rows of each series
        assert_eq!(summary.rows_written, (80 - 49) + (90 - 49));
        assert_eq!(summary.rows_skipped, 49 * 2);

        assert_eq!(store.load_indicators("AAA", 1000).unwrap().len(), 31);
        assert!(store.load_indicators("SHORT", 1000).unwrap().is_empty());
    }

    #[tokio::test]
    async fn explicit_ticker_list_includes_unknowns() {
        let store = Arc::new(seeded(&[("AAA", 80)]));
        let orch = Orchestrator::new(store, settings());

        let summary = orch
            .run_all(&["AAA".to_string(), "GHOST".to_string()])
            .await
            .unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.skipped.len(), 1);
        assert!(summary.skipped[0].reason.contains("unknown instrument"));
    }

    #[tokio::test]
    async fn single_instrument_mode() {
        let store = Arc::new(seeded(&[("AAA", 70)]));
        let orch = Orchestrator::new(store, settings());
        match orch.run_one("AAA").await.unwrap() {
            InstrumentOutcome::Written(r) => {
                assert_eq!(r.written, 21);
                assert_eq!(r.skipped, 49);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rerun_leaves_same_rows() {
        let store = Arc::new(seeded(&[("AAA", 75)]));
        let orch = Orchestrator::new(store.clone(), settings());
        orch.run_all(&[]).await.unwrap();
        let first = store.load_indicators("AAA", 1000).unwrap();
        orch.run_all(&[]).await.unwrap();
        let second = store.load_indicators("AAA", 1000).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn malformed_instrument_does_not_abort() {
        let mut scripted = ScriptedStore::new(seeded(&[("AAA", 80), ("BAD", 80), ("CCC", 80)]));
        scripted.malformed = Some("BAD");
        let store = Arc::new(scripted);
        let orch = Orchestrator::new(store.clone(), settings());

        let summary = orch.run_all(&[]).await.unwrap();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].ticker, "BAD");
        assert!(summary.skipped[0].reason.contains("malformed input"));
        assert!(!store.upserts.lock().contains(&"BAD".to_string()));
    }

    #[tokio::test]
    async fn persistence_failure_aborts_batch() {
        let mut scripted = ScriptedStore::new(seeded(&[("AAA", 80), ("BBB", 80)]));
        scripted.failing_upsert = Some("BBB");
        let orch = Orchestrator::new(Arc::new(scripted), settings());

        let err = orch.run_all(&[]).await.unwrap_err();
        assert!(matches!(err, MinerError::Persistence(_)));
    }

    #[tokio::test]
    async fn unreachable_store_is_fatal_up_front() {
        let mut scripted = ScriptedStore::new(seeded(&[("AAA", 80)]));
        scripted.ping_fails = true;
        let store = Arc::new(scripted);
        let orch = Orchestrator::new(store.clone(), settings());

        assert!(orch.run_all(&[]).await.unwrap_err().is_fatal());
        assert!(orch.run_one("AAA").await.unwrap_err().is_fatal());
        assert!(store.upserts.lock().is_empty());
    }

    #[tokio::test]
    async fn timed_out_instrument_writes_nothing() {
        let mut scripted = ScriptedStore::new(seeded(&[("SLOW", 80)]));
        scripted.load_delay = Duration::from_millis(300);
        let store = Arc::new(scripted);
        let mut s = settings();
        s.instrument_timeout = Duration::from_millis(20);
        let orch = Orchestrator::new(store.clone(), s);

        let summary = orch.run_all(&[]).await.unwrap();
        assert_eq!(summary.succeeded, 0);
        assert!(summary.skipped[0].reason.contains("timed out"));
        assert!(store.upserts.lock().is_empty());
        assert!(store.load_indicators("SLOW", 10).unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_is_bounded() {
        let names = ["A1", "A2", "A3", "A4", "A5", "A6"];
        let seeds: Vec<(&str, usize)> = names.iter().map(|n| (*n, 65)).collect();
        let mut scripted = ScriptedStore::new(seeded(&seeds));
        scripted.load_delay = Duration::from_millis(40);
        let store = Arc::new(scripted);
        let orch = Orchestrator::new(store.clone(), settings());

        let summary = orch.run_all(&[]).await.unwrap();
        assert_eq!(summary.succeeded, names.len());
        assert!(store.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn settings_from_config() {
        let mut cfg = MinerConfig::default();
        cfg.max_concurrency = 0;
        cfg.mask_rsi_warmup = true;
        let s = RunSettings::from_config(&cfg);
        assert_eq!(s.max_concurrency, 1);
        assert_eq!(s.min_history_bars, 60);
        assert!(s.engine.mask_rsi_warmup);
    }
}
