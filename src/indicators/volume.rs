// =============================================================================
// Volume Moving Average and Relative Volume
// =============================================================================

use super::rolling::{rolling_mean, safe_div};
use super::Series;

/// Volume SMA and the ratio of current volume to it.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeSeries {
    pub sma: Series,
    pub ratio: Series,
}

/// `ratio` is undefined wherever the SMA is undefined or zero.
pub fn calculate_volume(volumes: &[Option<f64>], period: usize) -> VolumeSeries {
    let sma = rolling_mean(volumes, period);
    let ratio = volumes
        .iter()
        .zip(&sma)
        .map(|(&v, &avg)| safe_div(v, avg))
        .collect();
    VolumeSeries { sma, ratio }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::rolling::lift;

    #[test]
    fn ratio_follows_sma_warmup() {
        let vols: Vec<f64> = (1..=25).map(|x| (x * 1000) as f64).collect();
        let out = calculate_volume(&lift(&vols), 20);
        assert!(out.ratio[..19].iter().all(Option::is_none));
        let sma = out.sma[24].unwrap();
        assert_eq!(out.ratio[24], Some(vols[24] / sma));
    }

    #[test]
    fn zero_average_volume_is_undefined() {
        let out = calculate_volume(&lift(&[0.0; 20]), 20);
        assert_eq!(out.sma[19], Some(0.0));
        assert_eq!(out.ratio[19], None);
    }
}
