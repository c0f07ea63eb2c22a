// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Bollinger Bands consist of a middle band (SMA), an upper band (SMA + k*σ),
// and a lower band (SMA - k*σ), where σ is the sample standard deviation of
// the same window.  A flat window collapses all three bands onto the SMA.

use super::rolling::rolling_std;
use super::Series;

/// Upper, middle and lower bands, index-aligned with the input closes.
#[derive(Debug, Clone, PartialEq)]
pub struct BollingerSeries {
    pub upper: Series,
    pub middle: Series,
    pub lower: Series,
}

/// Build the bands around an already computed middle band.
///
/// `middle` must be the `period` SMA of `closes`; it is passed in so the
/// engine can share the SMA column it already has.
pub fn bands_around(
    closes: &[Option<f64>],
    middle: Series,
    period: usize,
    num_std: f64,
) -> BollingerSeries {
    let std = rolling_std(closes, period);

    let (upper, lower) = middle
        .iter()
        .zip(&std)
        .map(|(m, s)| match (m, s) {
            (Some(m), Some(s)) => (Some(m + num_std * s), Some(m - num_std * s)),
            _ => (None, None),
        })
        .unzip();

    BollingerSeries { upper, middle, lower }
}

/// Calculate Bollinger Bands for the given closing prices.
#[cfg(test)]
pub fn calculate_bollinger(closes: &[Option<f64>], period: usize, num_std: f64) -> BollingerSeries {
    bands_around(closes, super::rolling::rolling_mean(closes, period), period, num_std)
}
