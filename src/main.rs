// =============================================================================
// Feature Miner — Main Entry Point
// =============================================================================
//
// Reads daily price history from the feature store, derives the technical
// indicator set for each instrument and writes it back by idempotent upsert.
// Per-instrument problems are logged and skipped; an unreachable store or a
// failed write ends the process with a non-zero exit code.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod config;
mod engine;
mod error;
mod indicators;
mod ingest;
mod pipeline;
mod store;
mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::MinerConfig;
use crate::pipeline::{InstrumentOutcome, Orchestrator, RunSettings};
use crate::store::{FeatureStore, SqliteStore};

#[derive(Debug, Parser)]
#[command(
    name = "feature-miner",
    version,
    about = "Technical indicator miner for daily price data"
)]
struct Cli {
    /// JSON config file; defaults are used when it is missing.
    #[arg(long, global = true, default_value = "miner_config.json")]
    config: PathBuf,

    /// Override the SQLite database path.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compute and store indicators for every instrument, or just one.
    Run {
        #[arg(long)]
        ticker: Option<String>,
    },
    /// Create or verify the database schema.
    InitDb,
    /// Import daily bars from a CSV file (date,open,high,low,close,volume).
    Ingest {
        #[arg(long)]
        ticker: String,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print the most recent stored indicator rows as JSON.
    Show {
        #[arg(long)]
        ticker: String,
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Feature Miner — Starting Up                       ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = MinerConfig::load(&cli.config).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        MinerConfig::default()
    });
    config.apply_env();
    if let Some(db) = &cli.db {
        config.database_path = db.display().to_string();
    }

    // ── 2. Open the store ────────────────────────────────────────────────
    let store: Arc<dyn FeatureStore> = Arc::new(
        SqliteStore::open(&config.database_path)
            .with_context(|| format!("cannot open feature store at {}", config.database_path))?,
    );
    store.init_schema().context("failed to initialise schema")?;

    // ── 3. Dispatch ──────────────────────────────────────────────────────
    match cli.command {
        Command::InitDb => {
            if !cli.config.exists() {
                config.save(&cli.config)?;
            }
            info!(path = %config.database_path, "database ready");
        }

        Command::Ingest { ticker, csv } => {
            let ticker = ticker.trim().to_uppercase();
            ingest::import_csv(store.as_ref(), &ticker, &csv)?;
        }

        Command::Show { ticker, limit } => {
            let ticker = ticker.trim().to_uppercase();
            let rows = store
                .load_indicators(&ticker, limit.unwrap_or(config.show_limit))
                .with_context(|| format!("failed to read indicators for {ticker}"))?;
            if rows.is_empty() {
                warn!(ticker = %ticker, "no stored indicators");
            }
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }

        Command::Run { ticker } => {
            let orchestrator = Orchestrator::new(store.clone(), RunSettings::from_config(&config));
            match ticker {
                Some(t) => {
                    let t = t.trim().to_uppercase();
                    if let InstrumentOutcome::Written(report) = orchestrator.run_one(&t).await? {
                        info!(ticker = %t, %report, "single instrument run complete");
                    }
                }
                None => {
                    let summary = orchestrator.run_all(&config.tickers).await?;
                    for s in &summary.skipped {
                        warn!(ticker = %s.ticker, reason = %s.reason, "skipped in this run");
                    }
                }
            }
        }
    }

    info!("Feature Miner finished.");
    Ok(())
}
