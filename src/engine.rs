// =============================================================================
// Indicator Engine — price bars in, indicator rows out
// =============================================================================
//
// The engine is a pipeline of pure steps.  Each step reads columns produced by
// earlier steps and returns its own named column set:
//
//   PriceColumns ──┬─> TrendColumns ──> BandColumns (middle band = SMA-20)
//                  ├─> MomentumColumns (RSI ──> StochRSI, MACD ──> signal)
//                  ├─> ReturnColumns
//                  ├─> VolumeColumns
//                  └─> RangeColumns
//
// Nothing is carried between invocations; the full series is recomputed every
// time, and identical input yields bit-identical output.
// =============================================================================

use crate::error::MinerError;
use crate::indicators::{atr, bollinger, ema, macd, returns, rolling, rsi, volume, Series};
use crate::types::{IndicatorRow, PriceBar};

pub const SMA_SHORT: usize = 20;
pub const SMA_LONG: usize = 50;
pub const EMA_SPAN: usize = 20;
pub const RSI_PERIOD: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const BOLLINGER_PERIOD: usize = 20;
pub const BOLLINGER_STD: f64 = 2.0;
pub const VOLATILITY_PERIOD: usize = 20;
pub const VOLUME_SMA_PERIOD: usize = 20;
pub const ATR_PERIOD: usize = 14;
pub const STOCH_RSI_PERIOD: usize = 14;

/// Bars needed before an instrument is worth processing: the longest warm-up
/// (SMA-50) plus a safety margin.
pub const MIN_HISTORY_BARS: usize = SMA_LONG + 10;

/// Knobs that change how values are reported, never how they are computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// Report RSI (and therefore StochRSI) as undefined until the Wilder
    /// average has absorbed `RSI_PERIOD` price changes.
    pub mask_rsi_warmup: bool,
}

// =============================================================================
// Pipeline columns
// =============================================================================

/// Raw price columns lifted out of the bars.
#[derive(Debug, Clone)]
pub struct PriceColumns {
    pub high: Series,
    pub low: Series,
    pub close: Series,
    pub volume: Series,
}

#[derive(Debug, Clone)]
pub struct TrendColumns {
    pub sma_20: Series,
    pub sma_50: Series,
    pub ema_20: Series,
}

#[derive(Debug, Clone)]
pub struct MomentumColumns {
    pub rsi: Series,
    pub macd: Series,
    pub macd_signal: Series,
    pub stoch_rsi: Series,
}

#[derive(Debug, Clone)]
pub struct BandColumns {
    pub upper: Series,
    pub middle: Series,
    pub lower: Series,
}

#[derive(Debug, Clone)]
pub struct ReturnColumns {
    pub daily_return: Series,
    pub volatility_20: Series,
}

#[derive(Debug, Clone)]
pub struct VolumeColumns {
    pub volume_sma_20: Series,
    pub volume_ratio: Series,
}

#[derive(Debug, Clone)]
pub struct RangeColumns {
    pub atr_14: Series,
}

// =============================================================================
// Steps
// =============================================================================

pub fn price_columns(bars: &[PriceBar]) -> PriceColumns {
    PriceColumns {
        high: bars.iter().map(|b| Some(b.high)).collect(),
        low: bars.iter().map(|b| Some(b.low)).collect(),
        close: bars.iter().map(|b| Some(b.close)).collect(),
        volume: bars.iter().map(|b| Some(b.volume as f64)).collect(),
    }
}

pub fn trend_step(prices: &PriceColumns) -> TrendColumns {
    TrendColumns {
        sma_20: rolling::rolling_mean(&prices.close, SMA_SHORT),
        sma_50: rolling::rolling_mean(&prices.close, SMA_LONG),
        ema_20: ema::ema_span(&prices.close, EMA_SPAN),
    }
}

pub fn momentum_step(prices: &PriceColumns, opts: &EngineOptions) -> MomentumColumns {
    let mut rsi_col = rsi::calculate_rsi(&prices.close, RSI_PERIOD);
    if opts.mask_rsi_warmup {
        rsi_col = rsi::mask_warmup(&rsi_col, RSI_PERIOD);
    }
    let stoch_rsi = rsi::calculate_stoch_rsi(&rsi_col, STOCH_RSI_PERIOD);
    let m = macd::calculate_macd(&prices.close, MACD_FAST, MACD_SLOW, MACD_SIGNAL);

    MomentumColumns {
        rsi: rsi_col,
        macd: m.macd,
        macd_signal: m.signal,
        stoch_rsi,
    }
}

pub fn band_step(prices: &PriceColumns, trend: &TrendColumns) -> BandColumns {
    // The middle band and SMA-20 share a window; reuse the trend column.
    let bb = bollinger::bands_around(
        &prices.close,
        trend.sma_20.clone(),
        BOLLINGER_PERIOD,
        BOLLINGER_STD,
    );
    BandColumns {
        upper: bb.upper,
        middle: bb.middle,
        lower: bb.lower,
    }
}

pub fn return_step(prices: &PriceColumns) -> ReturnColumns {
    let daily_return = returns::daily_returns(&prices.close);
    let volatility_20 = returns::volatility(&daily_return, VOLATILITY_PERIOD);
    ReturnColumns {
        daily_return,
        volatility_20,
    }
}

pub fn volume_step(prices: &PriceColumns) -> VolumeColumns {
    let v = volume::calculate_volume(&prices.volume, VOLUME_SMA_PERIOD);
    VolumeColumns {
        volume_sma_20: v.sma,
        volume_ratio: v.ratio,
    }
}

pub fn range_step(prices: &PriceColumns) -> RangeColumns {
    RangeColumns {
        atr_14: atr::calculate_atr(&prices.high, &prices.low, &prices.close, ATR_PERIOD),
    }
}

// =============================================================================
// Entry points
// =============================================================================

/// Reject input the engine cannot compute on.
///
/// Dates must be strictly increasing, prices finite, volume non-negative.
pub fn validate_bars(bars: &[PriceBar]) -> Result<(), MinerError> {
    for (i, bar) in bars.iter().enumerate() {
        let prices = [
            ("open", bar.open),
            ("high", bar.high),
            ("low", bar.low),
            ("close", bar.close),
        ];
        if let Some((field, value)) = prices.iter().find(|(_, v)| !v.is_finite()) {
            return Err(MinerError::MalformedInput(format!(
                "non-finite {field} ({value}) on {}",
                bar.date
            )));
        }
        if bar.volume < 0 {
            return Err(MinerError::MalformedInput(format!(
                "negative volume ({}) on {}",
                bar.volume, bar.date
            )));
        }
        if i > 0 && bars[i - 1].date >= bar.date {
            return Err(MinerError::MalformedInput(format!(
                "dates not strictly increasing: {} followed by {}",
                bars[i - 1].date,
                bar.date
            )));
        }
    }
    Ok(())
}

/// Compute indicator rows with default options.
pub fn compute_indicators(bars: &[PriceBar]) -> Result<Vec<IndicatorRow>, MinerError> {
    compute_indicators_with(bars, &EngineOptions::default())
}

/// Compute one indicator row per bar, index-aligned with `bars`.
pub fn compute_indicators_with(
    bars: &[PriceBar],
    opts: &EngineOptions,
) -> Result<Vec<IndicatorRow>, MinerError> {
    validate_bars(bars)?;

    let prices = price_columns(bars);
    let trend = trend_step(&prices);
    let momentum = momentum_step(&prices, opts);
    let bands = band_step(&prices, &trend);
    let rets = return_step(&prices);
    let vol = volume_step(&prices);
    let range = range_step(&prices);

    let rows = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| IndicatorRow {
            date: bar.date,
            rsi: momentum.rsi[i],
            macd: momentum.macd[i],
            macd_signal: momentum.macd_signal[i],
            sma_20: trend.sma_20[i],
            sma_50: trend.sma_50[i],
            ema_20: trend.ema_20[i],
            bb_upper: bands.upper[i],
            bb_middle: bands.middle[i],
            bb_lower: bands.lower[i],
            daily_return: rets.daily_return[i],
            volatility_20: rets.volatility_20[i],
            volume_sma_20: vol.volume_sma_20[i],
            volume_ratio: vol.volume_ratio[i],
            atr_14: range.atr_14[i],
            stoch_rsi: momentum.stoch_rsi[i],
        })
        .collect();

    Ok(rows)
}

/// Split rows into those eligible for storage and a count of the rest.
pub fn admit(rows: &[IndicatorRow]) -> (Vec<&IndicatorRow>, usize) {
    let admitted: Vec<&IndicatorRow> = rows.iter().filter(|r| r.is_admissible()).collect();
    let skipped = rows.len() - admitted.len();
    (admitted, skipped)
}
