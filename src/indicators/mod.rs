// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicators the feature miner
// persists.  Every function takes index-aligned input columns and returns a
// column of the same length; `None` marks an undefined value (warm-up not
// satisfied, division by zero, or an undefined operand).

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod returns;
pub mod rolling;
pub mod rsi;
pub mod volume;

/// An index-aligned column of optional values.
pub type Series = Vec<Option<f64>>;
