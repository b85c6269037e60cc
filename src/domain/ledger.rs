//! Live ledger: the operator's portfolio plus its automation gate, saved
//! after every successful mutation.

use crate::domain::automation::{AntiRepeatState, AutoTradeOutcome};
use crate::domain::error::TraderError;
use crate::domain::portfolio::Portfolio;
use crate::domain::signal::Signal;
use crate::ports::state_port::StatePort;
use chrono::NaiveDateTime;
use tracing::{error, info, warn};

pub struct Ledger {
    portfolio: Portfolio,
    gate: AntiRepeatState,
    store: Box<dyn StatePort<Portfolio>>,
    last_persist_error: Option<TraderError>,
}

impl Ledger {
    /// Load the stored portfolio, or start fresh with `initial_cash` when the
    /// snapshot is missing, unreadable or violates the ledger invariants.
    pub fn open(store: Box<dyn StatePort<Portfolio>>, initial_cash: f64) -> Self {
        let portfolio = match store.load() {
            Some(p) => match p.validate() {
                Ok(()) => {
                    info!(location = %store.location(), cash = p.cash(), positions = p.positions().len(), "portfolio loaded");
                    p
                }
                Err(e) => {
                    warn!(location = %store.location(), error = %e, "stored portfolio is inconsistent, starting fresh");
                    Portfolio::new(initial_cash)
                }
            },
            None => {
                info!(location = %store.location(), initial_cash, "no stored portfolio, starting fresh");
                Portfolio::new(initial_cash)
            }
        };
        Ledger {
            portfolio,
            gate: AntiRepeatState::new(),
            store,
            last_persist_error: None,
        }
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn gate(&self) -> &AntiRepeatState {
        &self.gate
    }

    /// The error from the most recent save, cleared by the next successful one.
    pub fn last_persist_error(&self) -> Option<&TraderError> {
        self.last_persist_error.as_ref()
    }

    pub fn buy(
        &mut self,
        ticker: &str,
        quantity: i64,
        price: f64,
        at: NaiveDateTime,
    ) -> Result<(), TraderError> {
        match self.portfolio.buy(ticker, quantity, price, at) {
            Ok(()) => {
                info!(ticker, quantity, price, cash = self.portfolio.cash(), "bought");
                self.persist();
                Ok(())
            }
            Err(e) => {
                warn!(ticker, quantity, price, error = %e, "buy rejected");
                Err(e)
            }
        }
    }

    pub fn sell(
        &mut self,
        ticker: &str,
        quantity: i64,
        price: f64,
        at: NaiveDateTime,
    ) -> Result<f64, TraderError> {
        match self.portfolio.sell(ticker, quantity, price, at) {
            Ok(pnl) => {
                info!(ticker, quantity, price, realized_pnl = pnl, "sold");
                self.persist();
                Ok(pnl)
            }
            Err(e) => {
                warn!(ticker, quantity, price, error = %e, "sell rejected");
                Err(e)
            }
        }
    }

    /// Irreversible: cash back to the baseline, positions and history cleared.
    pub fn reset(&mut self) {
        self.portfolio.reset();
        self.gate.clear();
        info!(cash = self.portfolio.cash(), "portfolio reset");
        self.persist();
    }

    /// Pass `signal` through the anti-repeat gate and trade if it fires.
    pub fn auto_trade(
        &mut self,
        ticker: &str,
        signal: Signal,
        quantity: i64,
        price: f64,
        at: NaiveDateTime,
    ) -> AutoTradeOutcome {
        let outcome = self
            .gate
            .apply(&mut self.portfolio, ticker, signal, quantity, price, at);
        if outcome.executed() {
            self.persist();
        }
        outcome
    }

    fn persist(&mut self) {
        match self.store.save(&self.portfolio) {
            Ok(()) => self.last_persist_error = None,
            Err(e) => {
                error!(location = %self.store.location(), error = %e, "failed to save portfolio");
                self.last_persist_error = Some(e);
            }
        }
    }
}
