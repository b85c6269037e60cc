//! Live trading session: score the newest bar, notify on signal changes,
//! and optionally route the signal through the automation gate.

use crate::domain::automation::AutoTradeOutcome;
use crate::domain::backtest::fetch_bars;
use crate::domain::config_store::ConfigStore;
use crate::domain::error::TraderError;
use crate::domain::ledger::Ledger;
use crate::domain::ohlcv::IndicatorBar;
use crate::domain::portfolio::PortfolioSummary;
use crate::domain::signal::{Evaluation, Signal, evaluate};
use crate::ports::data_port::MarketDataPort;
use chrono::{Local, NaiveDateTime};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct LiveSettings {
    pub period: String,
    pub interval: String,
}

impl Default for LiveSettings {
    fn default() -> Self {
        LiveSettings {
            period: "5d".to_string(),
            interval: "15m".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct TickReport {
    pub ticker: String,
    pub bar_time: NaiveDateTime,
    pub close: f64,
    pub evaluation: Evaluation,
    pub previous_signal: Option<Signal>,
    /// Set when automation was enabled for this tick.
    pub trade: Option<AutoTradeOutcome>,
}

impl TickReport {
    /// True when the signal differs from the previous tick's (or this is the first).
    pub fn changed(&self) -> bool {
        self.previous_signal != Some(self.evaluation.signal)
    }
}

pub struct LiveSession {
    data: Arc<dyn MarketDataPort>,
    config: Arc<ConfigStore>,
    ledger: Ledger,
    settings: LiveSettings,
    last_signals: BTreeMap<String, Signal>,
}

impl LiveSession {
    pub fn new(
        data: Arc<dyn MarketDataPort>,
        config: Arc<ConfigStore>,
        ledger: Ledger,
        settings: LiveSettings,
    ) -> Self {
        LiveSession {
            data,
            config,
            ledger,
            settings,
            last_signals: BTreeMap::new(),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    fn bars(&self, ticker: &str) -> Result<Vec<IndicatorBar>, TraderError> {
        fetch_bars(
            self.data.as_ref(),
            ticker,
            &self.settings.period,
            &self.settings.interval,
        )
    }

    /// Last close and its bar time.
    pub fn last_price(&self, ticker: &str) -> Result<(f64, NaiveDateTime), TraderError> {
        let bars = self.bars(ticker)?;
        bars.last()
            .map(|b| (b.close, b.timestamp))
            .ok_or_else(|| TraderError::no_data(ticker, "empty series"))
    }

    /// Score the newest bar of `ticker` under a snapshot of the live config.
    ///
    /// With `auto` set, the signal goes through the anti-repeat gate and may
    /// trade `quantity` shares at the last close.
    pub fn tick(&mut self, ticker: &str, quantity: i64, auto: bool) -> Result<TickReport, TraderError> {
        let bars = self.bars(ticker)?;
        let (bar, previous) = match bars.as_slice() {
            [] => return Err(TraderError::no_data(ticker, "empty series")),
            [only] => (only, None),
            [.., prev, last] => (last, Some(prev)),
        };

        let strategy = self.config.get();
        let evaluation = evaluate(bar, previous, &strategy);
        let previous_signal = self
            .last_signals
            .insert(ticker.to_string(), evaluation.signal);

        let report_changed = previous_signal != Some(evaluation.signal);
        if report_changed {
            info!(
                ticker,
                signal = %evaluation.signal,
                previous = ?previous_signal,
                buy_score = evaluation.buy_score,
                sell_score = evaluation.sell_score,
                "signal changed"
            );
        }

        let trade = auto.then(|| {
            self.ledger
                .auto_trade(ticker, evaluation.signal, quantity, bar.close, now())
        });

        Ok(TickReport {
            ticker: ticker.to_string(),
            bar_time: bar.timestamp,
            close: bar.close,
            evaluation,
            previous_signal,
            trade,
        })
    }

    /// Manual buy at the last close.
    pub fn buy(&mut self, ticker: &str, quantity: i64) -> Result<f64, TraderError> {
        let (price, _) = self.last_price(ticker)?;
        self.ledger.buy(ticker, quantity, price, now())?;
        Ok(price)
    }

    /// Manual sell at the last close; returns (price, realized PnL).
    pub fn sell(&mut self, ticker: &str, quantity: i64) -> Result<(f64, f64), TraderError> {
        let (price, _) = self.last_price(ticker)?;
        let pnl = self.ledger.sell(ticker, quantity, price, now())?;
        Ok((price, pnl))
    }

    /// Portfolio valued at last closes; tickers without data are marked at cost.
    pub fn summary(&self) -> PortfolioSummary {
        let mut prices = BTreeMap::new();
        for ticker in self.ledger.portfolio().positions().keys() {
            match self.last_price(ticker) {
                Ok((price, _)) => {
                    prices.insert(ticker.clone(), price);
                }
                Err(e) => warn!(ticker = %ticker, error = %e, "valuing position at cost"),
            }
        }
        self.ledger.portfolio().summary(&prices)
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}
