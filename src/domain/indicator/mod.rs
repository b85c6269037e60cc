//! Indicator enrichment for raw OHLCV series.
//!
//! Market data often arrives as plain OHLCV. These calculations derive the
//! indicator columns the scoring rules read:
//! - `rsi`: RSI(14), Wilder smoothing
//! - `macd`, `macd_signal`: MACD(12, 26, 9)
//! - `bollinger_upper`, `bollinger_lower`: Bollinger(20, 2σ), population stddev
//! - `sma20`: SMA(20) of close
//! - `adx`: ADX(14), Wilder smoothing
//! - `stoch_k`, `stoch_d`: Stochastic %K(14) and %D(3)
//! - `volume_sma`: SMA(10) of volume
//!
//! Every series has the same length as its input and holds `None` until the
//! window behind it is full.

pub mod adx;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod stochastic;

pub use adx::calculate_adx;
pub use bollinger::{BollingerSeries, calculate_bollinger};
pub use ema::calculate_ema;
pub use macd::{MacdSeries, calculate_macd};
pub use rsi::calculate_rsi;
pub use sma::calculate_sma;
pub use stochastic::{StochasticSeries, calculate_stochastic};

use crate::domain::ohlcv::{IndicatorBar, Indicators, OhlcvBar};

/// A time series aligned index-for-index with the bars it was computed from.
pub type Series = Vec<Option<f64>>;

pub const RSI_PERIOD: usize = 14;
pub const BOLLINGER_PERIOD: usize = 20;
pub const BOLLINGER_MULT: f64 = 2.0;
pub const SMA_PERIOD: usize = 20;
pub const ADX_PERIOD: usize = 14;
pub const STOCH_K_PERIOD: usize = 14;
pub const STOCH_D_PERIOD: usize = 3;
pub const VOLUME_SMA_PERIOD: usize = 10;

/// Compute every indicator column for `bars` (assumed in ascending time order).
pub fn enrich(bars: &[OhlcvBar]) -> Vec<IndicatorBar> {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

    let rsi = calculate_rsi(&closes, RSI_PERIOD);
    let macd = calculate_macd(
        &closes,
        macd::DEFAULT_FAST,
        macd::DEFAULT_SLOW,
        macd::DEFAULT_SIGNAL,
    );
    let bollinger = calculate_bollinger(&closes, BOLLINGER_PERIOD, BOLLINGER_MULT);
    let sma20 = calculate_sma(&closes, SMA_PERIOD);
    let adx = calculate_adx(bars, ADX_PERIOD);
    let stoch = calculate_stochastic(bars, STOCH_K_PERIOD, STOCH_D_PERIOD);
    let volume_sma = calculate_sma(&volumes, VOLUME_SMA_PERIOD);

    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let indicators = Indicators {
                rsi: rsi[i],
                macd: macd.line[i],
                macd_signal: macd.signal[i],
                bollinger_upper: bollinger.upper[i],
                bollinger_lower: bollinger.lower[i],
                sma20: sma20[i],
                adx: adx[i],
                stoch_k: stoch.k[i],
                stoch_d: stoch.d[i],
                volume_sma: volume_sma[i],
            };
            IndicatorBar::from_ohlcv(bar, indicators)
        })
        .collect()
}
