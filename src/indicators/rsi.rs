// =============================================================================
// Relative Strength Index (RSI) — Wilder's Smoothing, and Stochastic RSI
// =============================================================================
//
// Step 1 — Per-bar price changes: delta_t = close_t - close_{t-1}
//          (undefined on the first bar).
// Step 2 — gain_t = max(delta_t, 0),  loss_t = max(-delta_t, 0).
// Step 3 — Wilder-smooth both (alpha = 1 / period), seeded by the first
//          defined change.
// Step 4 — RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)
//
// A zero average loss is a division by zero and leaves RSI undefined.
//
// StochRSI = (RSI - min(RSI, n)) / (max(RSI, n) - min(RSI, n)), undefined when
// the window is flat or contains an undefined RSI.
// =============================================================================

use super::ema::wilder;
use super::rolling::{rolling_max, rolling_min, safe_div};
use super::Series;

/// Close-to-close changes; the first element is always `None`.
pub fn price_changes(closes: &[Option<f64>]) -> Series {
    let mut out = Vec::with_capacity(closes.len());
    for i in 0..closes.len() {
        let delta = match (i.checked_sub(1).and_then(|p| closes[p]), closes[i]) {
            (Some(prev), Some(cur)) => Some(cur - prev),
            _ => None,
        };
        out.push(delta);
    }
    out
}

/// Compute the full RSI series for `closes` with Wilder period `period`.
pub fn calculate_rsi(closes: &[Option<f64>], period: usize) -> Series {
    let deltas = price_changes(closes);
    let gains: Series = deltas.iter().map(|d| d.map(|d| d.max(0.0))).collect();
    let losses: Series = deltas.iter().map(|d| d.map(|d| (-d).max(0.0))).collect();

    let avg_gain = wilder(&gains, period);
    let avg_loss = wilder(&losses, period);

    avg_gain
        .iter()
        .zip(&avg_loss)
        .map(|(&g, &l)| rsi_from_averages(g, l))
        .collect()
}

/// Mask the first `warmup` values of an RSI series.
pub fn mask_warmup(rsi: &[Option<f64>], warmup: usize) -> Series {
    rsi.iter()
        .enumerate()
        .map(|(i, v)| if i < warmup { None } else { *v })
        .collect()
}

/// Stochastic oscillator applied to an RSI series.
pub fn calculate_stoch_rsi(rsi: &[Option<f64>], period: usize) -> Series {
    let lo = rolling_min(rsi, period);
    let hi = rolling_max(rsi, period);

    rsi.iter()
        .zip(lo.iter().zip(&hi))
        .map(|(&r, (&lo, &hi))| {
            let range = match (hi, lo) {
                (Some(h), Some(l)) => Some(h - l),
                _ => None,
            };
            let offset = match (r, lo) {
                (Some(r), Some(l)) => Some(r - l),
                _ => None,
            };
            safe_div(offset, range)
        })
        .collect()
}

// =============================================================================
// Internal helpers
// =============================================================================

// A zero average loss gives `None`, even when gains are positive: a run with
// no losses yet has no defined RS, and it is not clipped to 100.
fn rsi_from_averages(avg_gain: Option<f64>, avg_loss: Option<f64>) -> Option<f64> {
    let rs = safe_div(avg_gain, avg_loss)?;
    let rsi = 100.0 - 100.0 / (1.0 + rs);
    rsi.is_finite().then_some(rsi)
}
