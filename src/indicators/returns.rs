// =============================================================================
// Daily Returns and Realised Volatility
// =============================================================================
//
//   return_t     = (close_t - close_{t-1}) / close_{t-1}
//   volatility_t = sample std of the last `period` returns
//
// The first bar has no prior close, so volatility needs `period + 1` bars.

use super::rolling::{rolling_std, safe_div};
use super::Series;

/// Simple close-to-close returns; a zero previous close yields `None`.
pub fn daily_returns(closes: &[Option<f64>]) -> Series {
    let mut out = Vec::with_capacity(closes.len());
    for i in 0..closes.len() {
        let prev = i.checked_sub(1).and_then(|p| closes[p]);
        let change = match (closes[i], prev) {
            (Some(cur), Some(prev)) => Some(cur - prev),
            _ => None,
        };
        out.push(safe_div(change, prev));
    }
    out
}

/// Rolling sample standard deviation of `returns`.
pub fn volatility(returns: &[Option<f64>], period: usize) -> Series {
    rolling_std(returns, period)
}
