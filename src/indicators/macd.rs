// =============================================================================
// Moving Average Convergence / Divergence (MACD)
// =============================================================================
//
//   MACD   = EMA(fast) - EMA(slow)
//   Signal = EMA(signal) of MACD
//
// Both legs are span EMAs seeded on the first bar, so MACD and its signal
// line are defined from the first close onward.

use super::ema::ema_span;
use super::Series;

/// MACD line and its signal line, index-aligned with the input closes.
#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub macd: Series,
    pub signal: Series,
}

pub fn calculate_macd(
    closes: &[Option<f64>],
    fast: usize,
    slow: usize,
    signal: usize,
) -> MacdSeries {
    let fast_ema = ema_span(closes, fast);
    let slow_ema = ema_span(closes, slow);

    let macd: Series = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        })
        .collect();
    let signal = ema_span(&macd, signal);

    MacdSeries { macd, signal }
}
