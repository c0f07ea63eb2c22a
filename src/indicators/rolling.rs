// =============================================================================
// Trailing-window statistics
// =============================================================================
//
// Every function maps an index-aligned input series to an output series of
// the same length.  Output[t] depends only on input[t + 1 - window ..= t], so
// no value ever looks ahead.  A window that is not yet full, or that contains
// an undefined sample, produces `None`.

use super::Series;

/// Lift a plain column into a fully-defined `Series`.
#[cfg(test)]
pub fn lift(values: &[f64]) -> Series {
    values.iter().map(|&v| Some(v)).collect()
}

/// Apply `f` to every complete, fully-defined trailing window.
fn rolling<F>(values: &[Option<f64>], window: usize, mut f: F) -> Series
where
    F: FnMut(&[f64]) -> Option<f64>,
{
    let mut out = vec![None; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }

    let mut buf: Vec<f64> = Vec::with_capacity(window);
    for end in window..=values.len() {
        buf.clear();
        for v in &values[end - window..end] {
            match v {
                Some(x) => buf.push(*x),
                None => break,
            }
        }
        if buf.len() == window {
            out[end - 1] = f(&buf);
        }
    }
    out
}

/// Every sample equals the first one.
fn is_flat(window: &[f64]) -> bool {
    window.iter().all(|&x| x == window[0])
}

/// A flat window yields its value exactly, even for prices like 0.1.
fn mean(window: &[f64]) -> f64 {
    if is_flat(window) {
        return window[0];
    }
    window.iter().sum::<f64>() / window.len() as f64
}

/// Simple moving average over `window` samples.
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Series {
    rolling(values, window, |w| Some(mean(w)))
}

/// Sample (n - 1) standard deviation over `window` samples.
///
/// A window of fewer than two samples has no sample deviation, so the whole
/// output is `None` in that case.
pub fn rolling_std(values: &[Option<f64>], window: usize) -> Series {
    if window < 2 {
        return vec![None; values.len()];
    }
    rolling(values, window, |w| {
        if is_flat(w) {
            return Some(0.0);
        }
        let m = mean(w);
        let ss: f64 = w.iter().map(|x| (x - m) * (x - m)).sum();
        Some((ss / (w.len() - 1) as f64).sqrt())
    })
}

/// Minimum over `window` samples.
pub fn rolling_min(values: &[Option<f64>], window: usize) -> Series {
    rolling(values, window, |w| w.iter().copied().reduce(f64::min))
}

/// Maximum over `window` samples.
pub fn rolling_max(values: &[Option<f64>], window: usize) -> Series {
    rolling(values, window, |w| w.iter().copied().reduce(f64::max))
}

/// `num / den`, undefined when either side is undefined or `den` is zero.
pub fn safe_div(num: Option<f64>, den: Option<f64>) -> Option<f64> {
    match (num, den) {
        (Some(n), Some(d)) if d != 0.0 => {
            let q = n / d;
            q.is_finite().then_some(q)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Option<f64>, b: f64) -> bool {
        a.map_or(false, |a| (a - b).abs() < 1e-10)
    }

    #[test]
    fn mean_needs_full_window() {
        let s = rolling_mean(&lift(&[1.0, 2.0, 3.0, 4.0]), 3);
        assert_eq!(s[0], None);
        assert_eq!(s[1], None);
        assert!(approx(s[2], 2.0));
        assert!(approx(s[3], 3.0));
    }

    #[test]
    fn window_longer_than_input() {
        let s = rolling_mean(&lift(&[1.0, 2.0]), 5);
        assert_eq!(s, vec![None, None]);
    }

    #[test]
    fn undefined_sample_poisons_its_windows() {
        let input = vec![Some(1.0), None, Some(3.0), Some(4.0), Some(5.0)];
        let s = rolling_mean(&input, 2);
        assert_eq!(s[1], None);
        assert_eq!(s[2], None);
        assert!(approx(s[3], 3.5));
        assert!(approx(s[4], 4.5));
    }

    #[test]
    fn std_is_sample_deviation() {
        // [2, 4, 4, 4, 5, 5, 7, 9]: sample variance = 32 / 7
        let s = rolling_std(&lift(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 8);
        assert!(approx(s[7], (32.0_f64 / 7.0).sqrt()));
    }

    #[test]
    fn std_of_constant_window_is_zero() {
        let s = rolling_std(&lift(&[7.5; 5]), 5);
        assert_eq!(s[4], Some(0.0));
    }

    #[test]
    fn flat_window_with_inexact_price_is_exact() {
        for price in [0.1, 101.37, 1.0 / 3.0] {
            let input = lift(&[price; 20]);
            assert_eq!(rolling_mean(&input, 20)[19], Some(price));
            assert_eq!(rolling_std(&input, 20)[19], Some(0.0));
        }
    }

    #[test]
    fn std_needs_two_samples() {
        let s = rolling_std(&lift(&[1.0, 2.0, 3.0]), 1);
        assert!(s.iter().all(Option::is_none));
    }

    #[test]
    fn min_and_max() {
        let input = lift(&[3.0, 1.0, 4.0, 1.0, 5.0]);
        let lo = rolling_min(&input, 3);
        let hi = rolling_max(&input, 3);
        assert_eq!(lo[2], Some(1.0));
        assert_eq!(hi[2], Some(4.0));
        assert_eq!(lo[4], Some(1.0));
        assert_eq!(hi[4], Some(5.0));
    }

    #[test]
    fn safe_div_policy() {
        assert_eq!(safe_div(Some(6.0), Some(3.0)), Some(2.0));
        assert_eq!(safe_div(Some(6.0), Some(0.0)), None);
        assert_eq!(safe_div(None, Some(3.0)), None);
        assert_eq!(safe_div(Some(6.0), None), None);
    }
}
