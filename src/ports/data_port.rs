//! Market data port trait.

use crate::domain::error::TraderError;
use crate::domain::ohlcv::IndicatorBar;

pub trait MarketDataPort: Send + Sync {
    /// Bars for `ticker` in ascending timestamp order.
    ///
    /// `period` is a lookback such as `5d`, `60d`, `1y` or `max`; `interval`
    /// is the bar size such as `5m` or `15m`. Any failure (unknown ticker,
    /// unreadable source) is reported as an error, never as a partial series.
    fn fetch(
        &self,
        ticker: &str,
        period: &str,
        interval: &str,
    ) -> Result<Vec<IndicatorBar>, TraderError>;
}
