//! MACD (Moving Average Convergence Divergence).
//!
//! MACD Line = EMA(fast) - EMA(slow)
//! Signal Line = EMA(signal) of MACD Line
//!
//! Warmup: the line is defined from index slow-1, the signal from
//! slow-1 + signal-1.

use super::{Series, calculate_ema};

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub line: Series,
    pub signal: Series,
}

pub fn calculate_macd(closes: &[f64], fast: usize, slow: usize, signal_period: usize) -> MacdSeries {
    let defined: Vec<Option<f64>> = closes.iter().copied().map(Some).collect();
    let ema_fast = calculate_ema(&defined, fast);
    let ema_slow = calculate_ema(&defined, slow);

    let line: Series = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        })
        .collect();
    let signal = calculate_ema(&line, signal_period);

    MacdSeries { line, signal }
}
