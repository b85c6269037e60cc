//! Backtest replay engine.
//!
//! Replays bars in ascending timestamp order through the same scoring
//! function and anti-repeat gate used for live automation, on a disposable
//! portfolio. Each decision sees only the current bar and the one before it.

use crate::domain::automation::{AntiRepeatState, AutoTradeOutcome};
use crate::domain::error::TraderError;
use crate::domain::ohlcv::IndicatorBar;
use crate::domain::portfolio::{DEFAULT_INITIAL_CASH, Portfolio};
use crate::domain::position::ClosedTrade;
use crate::domain::signal::score;
use crate::domain::strategy::StrategyConfig;
use crate::ports::data_port::MarketDataPort;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_cash: f64,
    pub trade_quantity: i64,
    /// Inclusive replay window. Bars outside it still feed the indicators.
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_cash: DEFAULT_INITIAL_CASH,
            trade_quantity: 10,
            start: None,
            end: None,
        }
    }
}

impl BacktestConfig {
    pub fn with_quantity(trade_quantity: i64) -> Self {
        BacktestConfig {
            trade_quantity,
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<(), TraderError> {
        if self.trade_quantity <= 0 {
            return Err(TraderError::invalid(format!(
                "trade quantity must be positive, got {}",
                self.trade_quantity
            )));
        }
        if !(self.initial_cash.is_finite() && self.initial_cash > 0.0) {
            return Err(TraderError::invalid("initial cash must be positive"));
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(TraderError::invalid(format!(
                    "window start {} is after end {}",
                    start, end
                )));
            }
        }
        Ok(())
    }

    fn in_window(&self, day: NaiveDate) -> bool {
        self.start.is_none_or(|s| day >= s) && self.end.is_none_or(|e| day <= e)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub ticker: String,
    pub profit_pct: f64,
    /// Executed automated orders, buys plus sells.
    pub trade_count: usize,
    pub money_spent: f64,
    pub money_retrieved: f64,
    pub shares_still_held: i64,
    pub final_equity: f64,
    pub bars_replayed: usize,
    pub closed_trades: Vec<ClosedTrade>,
}

impl BacktestReport {
    /// Sentinel for a series on which no indicator was ever defined.
    pub fn empty(ticker: &str, initial_cash: f64) -> Self {
        BacktestReport {
            ticker: ticker.to_string(),
            profit_pct: 0.0,
            trade_count: 0,
            money_spent: 0.0,
            money_retrieved: 0.0,
            shares_still_held: 0,
            final_equity: initial_cash,
            bars_replayed: 0,
            closed_trades: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bars_replayed == 0
    }

    pub fn realized_pnl(&self) -> f64 {
        self.closed_trades.iter().map(|t| t.realized_pnl).sum()
    }
}

/// Replay `bars` for `ticker` under `strategy`.
pub fn run(
    ticker: &str,
    bars: &[IndicatorBar],
    strategy: &StrategyConfig,
    config: &BacktestConfig,
) -> Result<BacktestReport, TraderError> {
    config.validate()?;

    // Stable sort, so for a repeated timestamp the bar that came first in
    // `bars` is the one replayed.
    let mut ordered: Vec<&IndicatorBar> = bars.iter().filter(|b| b.close.is_finite()).collect();
    let unpriced = bars.len() - ordered.len();
    ordered.sort_by_key(|b| b.timestamp);
    let sorted = ordered.len();
    ordered.dedup_by_key(|b| b.timestamp);
    let duplicates = sorted - ordered.len();
    if unpriced > 0 || duplicates > 0 {
        debug!(ticker, unpriced, duplicates, "dropped bars before replay");
    }

    let window: Vec<usize> = (0..ordered.len())
        .filter(|&i| config.in_window(ordered[i].timestamp.date()))
        .collect();

    if !window.iter().any(|&i| ordered[i].has_indicators()) {
        debug!(ticker, bars = ordered.len(), "no indicator data, empty report");
        return Ok(BacktestReport::empty(ticker, config.initial_cash));
    }

    let mut portfolio = Portfolio::new(config.initial_cash);
    let mut gate = AntiRepeatState::new();
    let mut trade_count = 0;
    let mut money_spent = 0.0;
    let mut money_retrieved = 0.0;

    for &i in &window {
        let bar = ordered[i];
        let previous = i.checked_sub(1).map(|p| ordered[p]);
        let signal = score(bar, previous, strategy);

        match gate.apply(
            &mut portfolio,
            ticker,
            signal,
            config.trade_quantity,
            bar.close,
            bar.timestamp,
        ) {
            AutoTradeOutcome::Bought { quantity, price } => {
                trade_count += 1;
                money_spent += quantity as f64 * price;
            }
            AutoTradeOutcome::Sold {
                quantity, price, ..
            } => {
                trade_count += 1;
                money_retrieved += quantity as f64 * price;
            }
            AutoTradeOutcome::Repeated
            | AutoTradeOutcome::Observed
            | AutoTradeOutcome::Rejected(_) => {}
        }
    }

    let last_close = window
        .last()
        .map(|&i| ordered[i].close)
        .unwrap_or_default();
    let shares_still_held = portfolio.held(ticker);
    let final_equity = portfolio.cash() + shares_still_held as f64 * last_close;
    let profit_pct = (final_equity - config.initial_cash) / config.initial_cash * 100.0;

    let report = BacktestReport {
        ticker: ticker.to_string(),
        profit_pct,
        trade_count,
        money_spent,
        money_retrieved,
        shares_still_held,
        final_equity,
        bars_replayed: window.len(),
        closed_trades: portfolio.closed_trades().to_vec(),
    };
    info!(
        ticker,
        bars = report.bars_replayed,
        trades = report.trade_count,
        profit_pct = report.profit_pct,
        "backtest complete"
    );
    Ok(report)
}

/// Fetch bars through `data` and replay them.
///
/// Any provider failure, or an empty series, is reported as `NoData`.
pub fn run_for_ticker(
    data: &dyn MarketDataPort,
    ticker: &str,
    period: &str,
    interval: &str,
    strategy: &StrategyConfig,
    config: &BacktestConfig,
) -> Result<BacktestReport, TraderError> {
    let bars = fetch_bars(data, ticker, period, interval)?;
    run(ticker, &bars, strategy, config)
}

pub(crate) fn fetch_bars(
    data: &dyn MarketDataPort,
    ticker: &str,
    period: &str,
    interval: &str,
) -> Result<Vec<IndicatorBar>, TraderError> {
    let bars = data
        .fetch(ticker, period, interval)
        .map_err(|e| match e {
            TraderError::NoData { .. } => e,
            other => TraderError::no_data(ticker, other.to_string()),
        })?;
    if bars.is_empty() {
        return Err(TraderError::no_data(ticker, "empty series"));
    }
    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::Indicators;
    use crate::domain::strategy::CoefficientKey;
    use approx::assert_abs_diff_eq;
    use chrono::{Duration, NaiveDateTime};

    fn ts(i: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::days(i)
    }

    /// Bars whose only indicator is RSI.
    fn rsi_bars(series: &[(f64, Option<f64>)]) -> Vec<IndicatorBar> {
        series
            .iter()
            .enumerate()
            .map(|(i, &(close, rsi))| IndicatorBar {
                timestamp: ts(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1000.0,
                indicators: Indicators {
                    rsi,
                    ..Default::default()
                },
            })
            .collect()
    }

    fn rsi_only() -> StrategyConfig {
        let mut cfg = StrategyConfig::zero_weights();
        cfg.set(CoefficientKey::CoefRsi, 2.0);
        cfg.buy_sell_threshold = 1.0;
        cfg
    }

    #[test]
    fn undefined_indicators_yield_empty_report() {
        let bars = rsi_bars(&[(100.0, None), (101.0, None), (102.0, None)]);
        let report = run("AAPL", &bars, &StrategyConfig::default(), &BacktestConfig::default()).unwrap();
        assert!(report.is_empty());
        assert_eq!(report.trade_count, 0);
        assert_eq!(report.profit_pct, 0.0);
    }

    #[test]
    fn empty_series_yields_empty_report() {
        let report = run("AAPL", &[], &StrategyConfig::default(), &BacktestConfig::default()).unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn buy_low_sell_high() {
        let bars = rsi_bars(&[
            (100.0, None),
            (100.0, Some(20.0)),
            (105.0, Some(50.0)),
            (110.0, Some(80.0)),
        ]);
        let report = run("AAPL", &bars, &rsi_only(), &BacktestConfig::with_quantity(10)).unwrap();

        assert_eq!(report.trade_count, 2);
        assert_abs_diff_eq!(report.money_spent, 1000.0, epsilon = 1e-9);
        assert_abs_diff_eq!(report.money_retrieved, 1100.0, epsilon = 1e-9);
        assert_eq!(report.shares_still_held, 0);
        assert_eq!(report.closed_trades.len(), 1);
        assert_abs_diff_eq!(report.closed_trades[0].realized_pnl, 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(report.profit_pct, 100.0 / DEFAULT_INITIAL_CASH * 100.0, epsilon = 1e-9);
        assert_eq!(report.bars_replayed, 4);
    }

    #[test]
    fn standing_buy_signal_buys_once() {
        let series: Vec<(f64, Option<f64>)> = (0..6).map(|i| (100.0 + i as f64, Some(20.0))).collect();
        let bars = rsi_bars(&series);
        let report = run("AAPL", &bars, &rsi_only(), &BacktestConfig::with_quantity(5)).unwrap();
        assert_eq!(report.trade_count, 1);
        assert_eq!(report.shares_still_held, 5);
    }

    #[test]
    fn open_position_valued_at_last_close() {
        let bars = rsi_bars(&[(100.0, Some(20.0)), (120.0, Some(50.0))]);
        let config = BacktestConfig {
            initial_cash: 10_000.0,
            trade_quantity: 10,
            ..Default::default()
        };
        let report = run("AAPL", &bars, &rsi_only(), &config).unwrap();
        assert_abs_diff_eq!(report.final_equity, 10_200.0, epsilon = 1e-9);
        assert_abs_diff_eq!(report.profit_pct, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn unsorted_input_is_replayed_in_time_order() {
        let mut bars = rsi_bars(&[(100.0, Some(20.0)), (110.0, Some(80.0))]);
        bars.reverse();
        let report = run("AAPL", &bars, &rsi_only(), &BacktestConfig::with_quantity(1)).unwrap();
        assert_eq!(report.trade_count, 2);
        assert_abs_diff_eq!(report.closed_trades[0].realized_pnl, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn repeated_timestamp_keeps_first_bar() {
        let mut bars = rsi_bars(&[(100.0, Some(20.0)), (200.0, Some(80.0)), (110.0, Some(80.0))]);
        bars[1].timestamp = ts(0);
        bars[2].timestamp = ts(1);
        let report = run("AAPL", &bars, &rsi_only(), &BacktestConfig::with_quantity(1)).unwrap();
        assert_eq!(report.bars_replayed, 2);
        assert_eq!(report.trade_count, 2);
        assert_abs_diff_eq!(report.money_spent, 100.0, epsilon = 1e-12);
        assert_abs_diff_eq!(report.closed_trades[0].realized_pnl, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn unpriced_bars_are_skipped() {
        let bars = rsi_bars(&[(100.0, Some(20.0)), (110.0, Some(80.0)), (f64::NAN, Some(20.0))]);
        let report = run("AAPL", &bars, &rsi_only(), &BacktestConfig::with_quantity(1)).unwrap();
        assert_eq!(report.bars_replayed, 2);
        assert_eq!(report.trade_count, 2);
        assert!(report.profit_pct.is_finite());
        assert!(report.final_equity.is_finite());
    }

    #[test]
    fn future_bars_do_not_change_earlier_decisions() {
        let base = [(100.0, Some(20.0)), (101.0, Some(50.0)), (102.0, Some(50.0))];
        let short = rsi_bars(&base);
        let mut extended = base.to_vec();
        extended.push((50.0, Some(90.0)));
        let long = rsi_bars(&extended);

        let a = run("AAPL", &short, &rsi_only(), &BacktestConfig::with_quantity(1)).unwrap();
        let b = run("AAPL", &long, &rsi_only(), &BacktestConfig::with_quantity(1)).unwrap();
        assert_abs_diff_eq!(a.money_spent, b.money_spent, epsilon = 1e-12);
        assert_eq!(b.trade_count, a.trade_count + 1);
    }

    #[test]
    fn window_restricts_replay() {
        let bars = rsi_bars(&[
            (100.0, Some(20.0)),
            (100.0, Some(50.0)),
            (100.0, Some(80.0)),
        ]);
        let config = BacktestConfig {
            start: Some(ts(1).date()),
            end: Some(ts(2).date()),
            ..BacktestConfig::with_quantity(1)
        };
        let report = run("AAPL", &bars, &rsi_only(), &config).unwrap();
        assert_eq!(report.bars_replayed, 2);
        // the only buy signal sits before the window, the sell has nothing to sell
        assert_eq!(report.trade_count, 0);
    }

    #[test]
    fn inverted_window_rejected() {
        let config = BacktestConfig {
            start: Some(ts(5).date()),
            end: Some(ts(1).date()),
            ..Default::default()
        };
        assert!(matches!(
            run("AAPL", &[], &rsi_only(), &config),
            Err(TraderError::InvalidInput { .. })
        ));
    }

    #[test]
    fn buy_beyond_cash_is_skipped() {
        let bars = rsi_bars(&[(100.0, Some(20.0)), (100.0, Some(50.0))]);
        let config = BacktestConfig {
            initial_cash: 50.0,
            trade_quantity: 1,
            ..Default::default()
        };
        let report = run("AAPL", &bars, &rsi_only(), &config).unwrap();
        assert_eq!(report.trade_count, 0);
        assert_eq!(report.profit_pct, 0.0);
    }
}
