//! Anti-repeat gate for automated trading.
//!
//! The gate remembers, per ticker, the last signal automation acted on or
//! observed. An automated Buy or Sell only fires when the incoming signal
//! differs from that record, so a standing Buy produces one order rather
//! than one per tick.

use crate::domain::error::TraderError;
use crate::domain::portfolio::Portfolio;
use crate::domain::signal::Signal;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AntiRepeatState {
    last: BTreeMap<String, Signal>,
}

#[derive(Debug)]
pub enum AutoTradeOutcome {
    Bought { quantity: i64, price: f64 },
    Sold { quantity: i64, price: f64, realized_pnl: f64 },
    /// Same Buy/Sell as the last recorded one; nothing done.
    Repeated,
    /// Observe or Hold; recorded, no trade.
    Observed,
    /// The trade was attempted and refused by the portfolio. The gate is
    /// left unchanged so a later evaluation can retry.
    Rejected(TraderError),
}

impl AutoTradeOutcome {
    pub fn executed(&self) -> bool {
        matches!(
            self,
            AutoTradeOutcome::Bought { .. } | AutoTradeOutcome::Sold { .. }
        )
    }
}

impl AntiRepeatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self, ticker: &str) -> Option<Signal> {
        self.last.get(ticker).copied()
    }

    pub fn clear(&mut self) {
        self.last.clear();
    }

    /// Route `signal` for `ticker` into `portfolio`, trading `quantity`
    /// shares at `price` when the gate allows it.
    pub fn apply(
        &mut self,
        portfolio: &mut Portfolio,
        ticker: &str,
        signal: Signal,
        quantity: i64,
        price: f64,
        at: NaiveDateTime,
    ) -> AutoTradeOutcome {
        if !signal.is_trade() {
            self.last.insert(ticker.to_string(), signal);
            return AutoTradeOutcome::Observed;
        }
        if self.last(ticker) == Some(signal) {
            debug!(ticker, %signal, "signal unchanged, skipping automated trade");
            return AutoTradeOutcome::Repeated;
        }

        let result = match signal {
            Signal::Buy => portfolio
                .buy(ticker, quantity, price, at)
                .map(|()| AutoTradeOutcome::Bought { quantity, price }),
            _ => portfolio
                .sell(ticker, quantity, price, at)
                .map(|realized_pnl| AutoTradeOutcome::Sold {
                    quantity,
                    price,
                    realized_pnl,
                }),
        };

        match result {
            Ok(outcome) => {
                self.last.insert(ticker.to_string(), signal);
                info!(ticker, %signal, quantity, price, "automated trade executed");
                outcome
            }
            Err(e) => {
                warn!(ticker, %signal, error = %e, "automated trade rejected");
                AutoTradeOutcome::Rejected(e)
            }
        }
    }
}
