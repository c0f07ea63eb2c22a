// =============================================================================
// Error taxonomy for the feature miner
// =============================================================================
//
// Undefined indicator values are not errors; they travel as `None`.  What is
// left here is everything the orchestrator has to classify: per-instrument
// problems are logged and skipped, persistence failures abort the batch.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MinerError {
    /// Fewer bars than the largest indicator warm-up (plus margin).
    #[error("insufficient history: {bars} bars, need at least {required}")]
    InsufficientHistory { bars: usize, required: usize },

    /// Non-monotonic dates, non-finite prices or missing mandatory fields.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The ticker has no entry in the instrument table.
    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),

    /// The store could not be reached or a write transaction failed.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// Load + compute exceeded the per-instrument time budget.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The blocking worker for one instrument died (panic or cancellation).
    #[error("worker failed: {0}")]
    Worker(String),
}

impl MinerError {
    /// Fatal errors abort the whole batch; everything else only skips the
    /// instrument that raised it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

impl From<rusqlite::Error> for MinerError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::IntegralValueOutOfRange(..) => Self::MalformedInput(e.to_string()),
            other => Self::Persistence(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_persistence_is_fatal() {
        assert!(MinerError::Persistence("db gone".into()).is_fatal());
        assert!(!MinerError::MalformedInput("bad".into()).is_fatal());
        assert!(!MinerError::UnknownInstrument("XYZ".into()).is_fatal());
        assert!(!MinerError::Timeout(std::time::Duration::from_secs(30)).is_fatal());
        assert!(!MinerError::Worker("panicked".into()).is_fatal());
        assert!(!MinerError::InsufficientHistory { bars: 10, required: 60 }.is_fatal());
    }

    #[test]
    fn sqlite_decode_errors_are_malformed_input() {
        let err: MinerError = rusqlite::Error::InvalidColumnType(
            2,
            "close".into(),
            rusqlite::types::Type::Null,
        )
        .into();
        assert!(matches!(err, MinerError::MalformedInput(_)));
    }

    #[test]
    fn other_sqlite_errors_are_persistence() {
        let err: MinerError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(err.is_fatal());
    }

    #[test]
    fn messages_are_readable() {
        let e = MinerError::InsufficientHistory { bars: 12, required: 60 };
        assert_eq!(e.to_string(), "insufficient history: 12 bars, need at least 60");
    }
}
