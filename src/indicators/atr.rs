// =============================================================================
// Average True Range (ATR)
// =============================================================================
//
// ATR measures volatility by decomposing the entire range of a bar.
//
// True Range (TR) for each bar after the first:
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
//
// ATR is the plain rolling mean of the last `period` TR values.  TR needs a
// previous close, so the first defined ATR sits at index `period`
// (i.e. `period + 1` bars).
// =============================================================================

use super::rolling::rolling_mean;
use super::Series;

/// True range per bar; the first bar has no previous close and is `None`.
pub fn true_range(high: &[Option<f64>], low: &[Option<f64>], close: &[Option<f64>]) -> Series {
    let n = high.len().min(low.len()).min(close.len());
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let prev_close = i.checked_sub(1).and_then(|p| close[p]);
        let tr = match (high[i], low[i], prev_close) {
            (Some(h), Some(l), Some(pc)) => {
                let hl = h - l;
                let hc = (h - pc).abs();
                let lc = (l - pc).abs();
                Some(hl.max(hc).max(lc))
            }
            _ => None,
        };
        out.push(tr);
    }
    out
}

pub fn calculate_atr(
    high: &[Option<f64>],
    low: &[Option<f64>],
    close: &[Option<f64>],
    period: usize,
) -> Series {
    rolling_mean(&true_range(high, low, close), period)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::rolling::lift;

    /// Split `(high, low, close)` triples into three series.
    fn hlc(bars: &[(f64, f64, f64)]) -> (Series, Series, Series) {
        let h: Vec<f64> = bars.iter().map(|b| b.0).collect();
        let l: Vec<f64> = bars.iter().map(|b| b.1).collect();
        let c: Vec<f64> = bars.iter().map(|b| b.2).collect();
        (lift(&h), lift(&l), lift(&c))
    }

    #[test]
    fn atr_warmup_is_period_plus_one() {
        let bars: Vec<(f64, f64, f64)> = (0..20)
            .map(|i| {
                let base = 100.0 + i as f64;
                (base + 3.0, base - 3.0, base + 1.0)
            })
            .collect();
        let (h, l, c) = hlc(&bars);
        let atr = calculate_atr(&h, &l, &c, 14);
        assert!(atr[..14].iter().all(Option::is_none));
        assert!(atr[14..].iter().all(Option::is_some));
    }

    #[test]
    fn atr_constant_range() {
        // close at the midpoint, no gaps: every TR is exactly H - L = 10
        let bars: Vec<(f64, f64, f64)> = (0..30).map(|_| (105.0, 95.0, 100.0)).collect();
        let (h, l, c) = hlc(&bars);
        let atr = calculate_atr(&h, &l, &c, 14);
        assert_eq!(atr[29], Some(10.0));
    }

    #[test]
    fn true_range_uses_prev_close() {
        // Gap scenario: |H - prevClose| > H - L
        let (h, l, c) = hlc(&[(105.0, 95.0, 95.0), (115.0, 108.0, 112.0)]);
        let tr = true_range(&h, &l, &c);
        assert_eq!(tr[0], None);
        assert_eq!(tr[1], Some(20.0));
    }

    #[test]
    fn true_range_gap_down() {
        let (h, l, c) = hlc(&[(105.0, 95.0, 104.0), (90.0, 85.0, 88.0)]);
        let tr = true_range(&h, &l, &c);
        assert_eq!(tr[1], Some(19.0));
    }

    #[test]
    fn atr_short_series_is_undefined() {
        let (h, l, c) = hlc(&[(2.0, 1.0, 1.5); 10]);
        assert!(calculate_atr(&h, &l, &c, 14).iter().all(Option::is_none));
    }
}
