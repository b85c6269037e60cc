//! Signal scoring: one pure function shared by live trading and backtests.
//!
//! Each rule adds its coefficient to `buy_score` or `sell_score` when its
//! condition holds. A rule whose inputs are undefined on the current (or,
//! where required, previous) bar is skipped entirely.

use crate::domain::ohlcv::IndicatorBar;
use crate::domain::strategy::StrategyConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    Buy,
    Sell,
    Observe,
    Hold,
}

impl Signal {
    pub fn is_trade(self) -> bool {
        matches!(self, Signal::Buy | Signal::Sell)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Signal::Buy => "BUY",
            Signal::Sell => "SELL",
            Signal::Observe => "OBSERVE",
            Signal::Hold => "HOLD",
        };
        f.write_str(s)
    }
}

/// The decision plus the scores that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub signal: Signal,
    pub buy_score: f64,
    pub sell_score: f64,
}

pub fn score(bar: &IndicatorBar, previous: Option<&IndicatorBar>, cfg: &StrategyConfig) -> Signal {
    evaluate(bar, previous, cfg).signal
}

pub fn evaluate(
    bar: &IndicatorBar,
    previous: Option<&IndicatorBar>,
    cfg: &StrategyConfig,
) -> Evaluation {
    let mut buy = 0.0;
    let mut sell = 0.0;
    let ind = &bar.indicators;

    // Bollinger: both sides checked independently
    if let Some(lower) = ind.bollinger_lower {
        if bar.close < lower {
            buy += cfg.coef_bollinger;
        }
    }
    if let Some(upper) = ind.bollinger_upper {
        if bar.close > upper {
            sell += cfg.coef_bollinger;
        }
    }

    if let Some(rsi) = ind.rsi {
        if rsi < cfg.rsi_oversold {
            buy += cfg.coef_rsi;
        } else if rsi > cfg.rsi_overbought {
            sell += cfg.coef_rsi;
        }
    }

    if let Some(prev) = previous {
        let now = ind.macd.zip(ind.macd_signal);
        let before = prev.indicators.macd.zip(prev.indicators.macd_signal);
        if let (Some((macd, signal)), Some((prev_macd, prev_signal))) = (now, before) {
            if macd > signal && prev_macd <= prev_signal {
                buy += cfg.coef_macd;
            } else if macd < signal && prev_macd >= prev_signal {
                sell += cfg.coef_macd;
            }
        }
    }

    if let (Some(k), Some(d)) = (ind.stoch_k, ind.stoch_d) {
        if k < cfg.stoch_oversold && d < cfg.stoch_oversold {
            buy += cfg.coef_stoch;
        } else if k > cfg.stoch_overbought && d > cfg.stoch_overbought {
            sell += cfg.coef_stoch;
        }
    }

    if let (Some(adx), Some(sma20)) = (ind.adx, ind.sma20) {
        if adx > cfg.adx_trend_threshold {
            if bar.close > sma20 {
                buy += cfg.coef_adx_sma;
            } else {
                sell += cfg.coef_adx_sma;
            }
        }
    }

    if let (Some(prev), Some(volume_sma)) = (previous, ind.volume_sma) {
        if volume_sma != 0.0 && bar.volume > cfg.volume_sma_multiplier * volume_sma {
            if bar.close > prev.close {
                buy += cfg.coef_volume;
            } else if bar.close < prev.close {
                sell += cfg.coef_volume;
            }
        }
    }

    Evaluation {
        signal: decide(buy, sell, cfg.buy_sell_threshold),
        buy_score: buy,
        sell_score: sell,
    }
}

fn decide(buy: f64, sell: f64, margin: f64) -> Signal {
    if buy > sell + margin {
        Signal::Buy
    } else if sell > buy + margin {
        Signal::Sell
    } else if buy > 0.0 || sell > 0.0 {
        Signal::Observe
    } else {
        Signal::Hold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::Indicators;
    use chrono::NaiveDate;

    fn bar(close: f64, volume: f64, indicators: Indicators) -> IndicatorBar {
        IndicatorBar {
            timestamp: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume,
            indicators,
        }
    }

    fn only(key: crate::domain::strategy::CoefficientKey, weight: f64, margin: f64) -> StrategyConfig {
        let mut cfg = StrategyConfig::zero_weights();
        cfg.set(key, weight);
        cfg.buy_sell_threshold = margin;
        cfg
    }

    use crate::domain::strategy::CoefficientKey as K;

    #[test]
    fn rsi_oversold_buys() {
        let cfg = only(K::CoefRsi, 2.0, 1.0);
        let b = bar(100.0, 0.0, Indicators { rsi: Some(25.0), ..Default::default() });
        let eval = evaluate(&b, None, &cfg);
        assert_eq!(eval.buy_score, 2.0);
        assert_eq!(eval.sell_score, 0.0);
        assert_eq!(eval.signal, Signal::Buy);
    }

    #[test]
    fn rsi_overbought_sells() {
        let cfg = only(K::CoefRsi, 2.0, 1.0);
        let b = bar(100.0, 0.0, Indicators { rsi: Some(75.0), ..Default::default() });
        assert_eq!(score(&b, None, &cfg), Signal::Sell);
    }

    #[test]
    fn below_margin_observes() {
        let cfg = only(K::CoefRsi, 0.5, 1.0);
        let b = bar(100.0, 0.0, Indicators { rsi: Some(25.0), ..Default::default() });
        assert_eq!(score(&b, None, &cfg), Signal::Observe);
    }

    #[test]
    fn undefined_everything_holds() {
        let cfg = StrategyConfig::default();
        let b = bar(100.0, 1000.0, Indicators::default());
        let eval = evaluate(&b, None, &cfg);
        assert_eq!(eval.signal, Signal::Hold);
        assert_eq!(eval.buy_score, 0.0);
        assert_eq!(eval.sell_score, 0.0);
    }

    #[test]
    fn bollinger_sides_are_independent() {
        let cfg = only(K::CoefBollinger, 1.0, 0.5);
        let b = bar(
            90.0,
            0.0,
            Indicators {
                bollinger_lower: Some(95.0),
                bollinger_upper: Some(105.0),
                ..Default::default()
            },
        );
        assert_eq!(score(&b, None, &cfg), Signal::Buy);

        let b = bar(
            110.0,
            0.0,
            Indicators {
                bollinger_lower: Some(95.0),
                bollinger_upper: Some(105.0),
                ..Default::default()
            },
        );
        assert_eq!(score(&b, None, &cfg), Signal::Sell);
    }

    #[test]
    fn macd_crossover_needs_previous_bar() {
        let cfg = only(K::CoefMacd, 2.0, 1.0);
        let prev = bar(100.0, 0.0, Indicators { macd: Some(-0.1), macd_signal: Some(0.0), ..Default::default() });
        let now = bar(101.0, 0.0, Indicators { macd: Some(0.2), macd_signal: Some(0.0), ..Default::default() });

        assert_eq!(score(&now, None, &cfg), Signal::Hold);
        assert_eq!(score(&now, Some(&prev), &cfg), Signal::Buy);
        assert_eq!(score(&prev, Some(&now), &cfg), Signal::Sell);
    }

    #[test]
    fn macd_without_cross_is_silent() {
        let cfg = only(K::CoefMacd, 2.0, 1.0);
        let prev = bar(100.0, 0.0, Indicators { macd: Some(0.1), macd_signal: Some(0.0), ..Default::default() });
        let now = bar(101.0, 0.0, Indicators { macd: Some(0.2), macd_signal: Some(0.0), ..Default::default() });
        assert_eq!(score(&now, Some(&prev), &cfg), Signal::Hold);
    }

    #[test]
    fn macd_skipped_when_previous_undefined() {
        let cfg = only(K::CoefMacd, 2.0, 1.0);
        let prev = bar(100.0, 0.0, Indicators::default());
        let now = bar(101.0, 0.0, Indicators { macd: Some(0.2), macd_signal: Some(0.0), ..Default::default() });
        assert_eq!(score(&now, Some(&prev), &cfg), Signal::Hold);
    }

    #[test]
    fn stochastic_requires_both_lines() {
        let cfg = only(K::CoefStoch, 2.0, 1.0);
        let both = bar(100.0, 0.0, Indicators { stoch_k: Some(10.0), stoch_d: Some(15.0), ..Default::default() });
        let one = bar(100.0, 0.0, Indicators { stoch_k: Some(10.0), stoch_d: Some(25.0), ..Default::default() });
        let missing = bar(100.0, 0.0, Indicators { stoch_k: Some(10.0), ..Default::default() });

        assert_eq!(score(&both, None, &cfg), Signal::Buy);
        assert_eq!(score(&one, None, &cfg), Signal::Hold);
        assert_eq!(score(&missing, None, &cfg), Signal::Hold);
    }

    #[test]
    fn adx_trend_direction_follows_sma() {
        let cfg = only(K::CoefAdxSma, 2.0, 1.0);
        let up = bar(105.0, 0.0, Indicators { adx: Some(30.0), sma20: Some(100.0), ..Default::default() });
        let at = bar(100.0, 0.0, Indicators { adx: Some(30.0), sma20: Some(100.0), ..Default::default() });
        let weak = bar(105.0, 0.0, Indicators { adx: Some(20.0), sma20: Some(100.0), ..Default::default() });

        assert_eq!(score(&up, None, &cfg), Signal::Buy);
        assert_eq!(score(&at, None, &cfg), Signal::Sell);
        assert_eq!(score(&weak, None, &cfg), Signal::Hold);
    }

    #[test]
    fn volume_spike_follows_price_direction() {
        let cfg = only(K::CoefVolume, 2.0, 1.0);
        let prev = bar(100.0, 1000.0, Indicators::default());
        let spike_up = bar(101.0, 5000.0, Indicators { volume_sma: Some(1000.0), ..Default::default() });
        let spike_down = bar(99.0, 5000.0, Indicators { volume_sma: Some(1000.0), ..Default::default() });
        let spike_flat = bar(100.0, 5000.0, Indicators { volume_sma: Some(1000.0), ..Default::default() });

        assert_eq!(score(&spike_up, Some(&prev), &cfg), Signal::Buy);
        assert_eq!(score(&spike_down, Some(&prev), &cfg), Signal::Sell);
        assert_eq!(score(&spike_flat, Some(&prev), &cfg), Signal::Hold);
        assert_eq!(score(&spike_up, None, &cfg), Signal::Hold);
    }

    #[test]
    fn volume_rule_ignores_zero_sma() {
        let cfg = only(K::CoefVolume, 2.0, 1.0);
        let prev = bar(100.0, 1000.0, Indicators::default());
        let now = bar(101.0, 5000.0, Indicators { volume_sma: Some(0.0), ..Default::default() });
        assert_eq!(score(&now, Some(&prev), &cfg), Signal::Hold);
    }

    #[test]
    fn opposing_rules_cancel_into_observe() {
        let mut cfg = StrategyConfig::zero_weights();
        cfg.coef_rsi = 2.0;
        cfg.coef_adx_sma = 2.0;
        cfg.buy_sell_threshold = 1.0;
        let b = bar(
            90.0,
            0.0,
            Indicators {
                rsi: Some(20.0),
                adx: Some(40.0),
                sma20: Some(100.0),
                ..Default::default()
            },
        );
        let eval = evaluate(&b, None, &cfg);
        assert_eq!(eval.buy_score, 2.0);
        assert_eq!(eval.sell_score, 2.0);
        assert_eq!(eval.signal, Signal::Observe);
    }

    #[test]
    fn signal_display() {
        assert_eq!(Signal::Buy.to_string(), "BUY");
        assert_eq!(Signal::Hold.to_string(), "HOLD");
        assert!(Signal::Sell.is_trade());
        assert!(!Signal::Observe.is_trade());
    }
}
