//! Price bars: raw OHLCV samples and indicator-enriched bars.

use crate::domain::error::TraderError;
use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvBar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl OhlcvBar {
    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }
}

/// Precomputed indicator values for one bar.
///
/// A `None` means the rolling window behind that indicator does not have
/// enough history yet. It is never read as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub bollinger_upper: Option<f64>,
    pub bollinger_lower: Option<f64>,
    pub sma20: Option<f64>,
    pub adx: Option<f64>,
    pub stoch_k: Option<f64>,
    pub stoch_d: Option<f64>,
    pub volume_sma: Option<f64>,
}

impl Indicators {
    pub fn any_defined(&self) -> bool {
        [
            self.rsi,
            self.macd,
            self.macd_signal,
            self.bollinger_upper,
            self.bollinger_lower,
            self.sma20,
            self.adx,
            self.stoch_k,
            self.stoch_d,
            self.volume_sma,
        ]
        .iter()
        .any(Option::is_some)
    }
}

/// One timestamped OHLCV sample plus its indicator fields.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorBar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub indicators: Indicators,
}

impl IndicatorBar {
    pub fn from_ohlcv(bar: &OhlcvBar, indicators: Indicators) -> Self {
        IndicatorBar {
            timestamp: bar.timestamp,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            indicators,
        }
    }

    pub fn has_indicators(&self) -> bool {
        self.indicators.any_defined()
    }
}

/// Lookback such as `5d`, `2wk`, `1mo`, `1y`; `max` (or empty) means no limit.
pub fn parse_period(period: &str) -> Result<Option<TimeDelta>, TraderError> {
    let p = period.trim().to_lowercase();
    if p.is_empty() || p == "max" {
        return Ok(None);
    }
    let split = p.find(|c: char| !c.is_ascii_digit()).unwrap_or(p.len());
    let (digits, unit) = p.split_at(split);
    let n: i64 = digits
        .parse()
        .map_err(|_| TraderError::invalid(format!("invalid period '{}'", period)))?;
    let days_per_unit = match unit {
        "d" => 1,
        "w" | "wk" => 7,
        "mo" => 30,
        "y" => 365,
        _ => return Err(TraderError::invalid(format!("invalid period '{}'", period))),
    };
    n.checked_mul(days_per_unit)
        .and_then(TimeDelta::try_days)
        .map(Some)
        .ok_or_else(|| TraderError::invalid(format!("period '{}' out of range", period)))
}
