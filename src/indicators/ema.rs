// =============================================================================
// Exponential Moving Average (EMA) and Wilder's Smoothing
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   EMA_0 = x_0
//   EMA_t = alpha * x_t + (1 - alpha) * EMA_{t-1}
//
// Span form:   alpha = 2 / (span + 1)
// Wilder form: alpha = 1 / period
//
// The series is seeded by the first defined observation, so an EMA is defined
// from the very first bar.  Early values are statistically unstable; callers
// that care must mask them themselves.
// =============================================================================

use super::Series;

/// Smoothing factor for a span-style EMA.
pub fn span_alpha(span: usize) -> f64 {
    2.0 / (span as f64 + 1.0)
}

/// Smoothing factor for Wilder's moving average.
pub fn wilder_alpha(period: usize) -> f64 {
    1.0 / period as f64
}

/// Exponentially smooth `values` with factor `alpha`.
///
/// Leading `None`s stay `None`; the first defined sample seeds the recursion.
/// An undefined sample after the seed yields `None` at that index and leaves
/// the running average untouched.
pub fn ema(values: &[Option<f64>], alpha: f64) -> Series {
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;

    for v in values {
        let next = match (*v, prev) {
            (Some(x), None) => Some(x),
            (Some(x), Some(p)) => Some(alpha * x + (1.0 - alpha) * p),
            (None, _) => None,
        };
        if next.is_some() {
            prev = next;
        }
        out.push(next);
    }
    out
}

/// EMA with `alpha = 2 / (span + 1)`.
pub fn ema_span(values: &[Option<f64>], span: usize) -> Series {
    if span == 0 {
        return vec![None; values.len()];
    }
    ema(values, span_alpha(span))
}

/// Wilder's moving average, `alpha = 1 / period`.
pub fn wilder(values: &[Option<f64>], period: usize) -> Series {
    if period == 0 {
        return vec![None; values.len()];
    }
    ema(values, wilder_alpha(period))
}
