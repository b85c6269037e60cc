//! Stochastic oscillator.
//!
//! %K = 100 × (close - lowest_low(n)) / (highest_high(n) - lowest_low(n))
//! %D = SMA(d) of %K
//!
//! A flat window (highest == lowest) leaves %K undefined for that bar.

use super::Series;
use crate::domain::ohlcv::OhlcvBar;

#[derive(Debug, Clone, PartialEq)]
pub struct StochasticSeries {
    pub k: Series,
    pub d: Series,
}

pub fn calculate_stochastic(bars: &[OhlcvBar], k_period: usize, d_period: usize) -> StochasticSeries {
    let n = bars.len();
    let mut k = vec![None; n];
    let mut d = vec![None; n];

    if k_period == 0 || d_period == 0 {
        return StochasticSeries { k, d };
    }

    for i in (k_period - 1)..n {
        let window = &bars[i + 1 - k_period..=i];
        let highest = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let lowest = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        let range = highest - lowest;
        if range > 0.0 {
            k[i] = Some(100.0 * (bars[i].close - lowest) / range);
        }
    }

    for i in (d_period - 1)..n {
        let window = &k[i + 1 - d_period..=i];
        if window.iter().all(Option::is_some) {
            let sum: f64 = window.iter().flatten().sum();
            d[i] = Some(sum / d_period as f64);
        }
    }

    StochasticSeries { k, d }
}
