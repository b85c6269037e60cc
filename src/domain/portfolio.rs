//! Paper-trading portfolio: cash, open positions, closed trades.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::TraderError;
use super::position::{ClosedTrade, Position};

pub const DEFAULT_INITIAL_CASH: f64 = 100_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    cash: f64,
    initial_cash: f64,
    #[serde(default)]
    positions: BTreeMap<String, Position>,
    #[serde(default)]
    closed_trades: Vec<ClosedTrade>,
}

impl Default for Portfolio {
    fn default() -> Self {
        Portfolio::new(DEFAULT_INITIAL_CASH)
    }
}

/// One row of a portfolio valuation.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRow {
    pub ticker: String,
    pub quantity: i64,
    pub average_price: f64,
    pub price: f64,
    pub market_value: f64,
    pub unrealized_pnl: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioSummary {
    pub cash: f64,
    pub initial_cash: f64,
    pub total_shares: i64,
    pub positions_value: f64,
    pub total_value: f64,
    pub pnl_pct: f64,
    pub realized_pnl: f64,
    pub rows: Vec<PositionRow>,
}

fn validate_order(ticker: &str, quantity: i64, price: f64) -> Result<(), TraderError> {
    if ticker.trim().is_empty() {
        return Err(TraderError::invalid("ticker must not be empty"));
    }
    if quantity <= 0 {
        return Err(TraderError::invalid(format!(
            "quantity must be a positive integer, got {}",
            quantity
        )));
    }
    if !(price.is_finite() && price > 0.0) {
        return Err(TraderError::invalid(format!(
            "price must be positive, got {}",
            price
        )));
    }
    Ok(())
}

impl Portfolio {
    pub fn new(initial_cash: f64) -> Self {
        Portfolio {
            cash: initial_cash,
            initial_cash,
            positions: BTreeMap::new(),
            closed_trades: Vec::new(),
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn initial_cash(&self) -> f64 {
        self.initial_cash
    }

    pub fn positions(&self) -> &BTreeMap<String, Position> {
        &self.positions
    }

    pub fn position(&self, ticker: &str) -> Option<&Position> {
        self.positions.get(ticker)
    }

    pub fn held(&self, ticker: &str) -> i64 {
        self.positions.get(ticker).map_or(0, |p| p.quantity)
    }

    pub fn closed_trades(&self) -> &[ClosedTrade] {
        &self.closed_trades
    }

    /// Buy `quantity` shares at `price`.
    ///
    /// Rejected with no state change when the order is malformed or its cost
    /// exceeds cash. `opened_at` is stamped only on first acquisition.
    pub fn buy(
        &mut self,
        ticker: &str,
        quantity: i64,
        price: f64,
        at: NaiveDateTime,
    ) -> Result<(), TraderError> {
        validate_order(ticker, quantity, price)?;

        let cost = quantity as f64 * price;
        if cost > self.cash {
            return Err(TraderError::InsufficientFunds {
                ticker: ticker.to_string(),
                required: cost,
                available: self.cash,
            });
        }

        self.cash -= cost;
        match self.positions.get_mut(ticker) {
            Some(pos) => pos.add(quantity, price),
            None => {
                self.positions.insert(
                    ticker.to_string(),
                    Position {
                        ticker: ticker.to_string(),
                        quantity,
                        average_price: price,
                        opened_at: at,
                    },
                );
            }
        }
        Ok(())
    }

    /// Sell `quantity` shares at `price`, returning the realized PnL.
    ///
    /// PnL is computed against the average price before the position is
    /// decremented; a position reaching zero is removed.
    pub fn sell(
        &mut self,
        ticker: &str,
        quantity: i64,
        price: f64,
        at: NaiveDateTime,
    ) -> Result<f64, TraderError> {
        validate_order(ticker, quantity, price)?;

        let held = self.held(ticker);
        let Some(pos) = self.positions.get_mut(ticker).filter(|_| held >= quantity) else {
            return Err(TraderError::InsufficientShares {
                ticker: ticker.to_string(),
                requested: quantity,
                held,
            });
        };

        let average_buy_price = pos.average_price;
        let realized_pnl = (price - average_buy_price) * quantity as f64;

        pos.quantity -= quantity;
        if pos.quantity == 0 {
            self.positions.remove(ticker);
        }
        self.cash += quantity as f64 * price;
        self.closed_trades.push(ClosedTrade {
            ticker: ticker.to_string(),
            quantity,
            average_buy_price,
            sell_price: price,
            realized_pnl,
            closed_at: at,
        });

        Ok(realized_pnl)
    }

    /// Back to `initial_cash` with no positions and no trade history.
    pub fn reset(&mut self) {
        self.cash = self.initial_cash;
        self.positions.clear();
        self.closed_trades.clear();
    }

    /// Check a loaded snapshot against the ledger invariants.
    pub fn validate(&self) -> Result<(), TraderError> {
        if !(self.cash.is_finite() && self.cash >= 0.0) {
            return Err(TraderError::invalid(format!("cash is negative: {}", self.cash)));
        }
        if !(self.initial_cash.is_finite() && self.initial_cash > 0.0) {
            return Err(TraderError::invalid("initial_cash must be positive"));
        }
        for (ticker, pos) in &self.positions {
            if pos.quantity <= 0 {
                return Err(TraderError::invalid(format!(
                    "position {} has non-positive quantity {}",
                    ticker, pos.quantity
                )));
            }
            if !(pos.average_price.is_finite() && pos.average_price > 0.0) {
                return Err(TraderError::invalid(format!(
                    "position {} has invalid average price",
                    ticker
                )));
            }
            if pos.ticker != *ticker {
                return Err(TraderError::invalid(format!(
                    "position keyed {} names {}",
                    ticker, pos.ticker
                )));
            }
        }
        Ok(())
    }

    pub fn realized_pnl(&self) -> f64 {
        self.closed_trades.iter().map(|t| t.realized_pnl).sum()
    }

    /// Cash plus positions marked at `prices`; a missing price marks at cost.
    pub fn total_equity(&self, prices: &BTreeMap<String, f64>) -> f64 {
        self.summary(prices).total_value
    }

    pub fn summary(&self, prices: &BTreeMap<String, f64>) -> PortfolioSummary {
        let rows: Vec<PositionRow> = self
            .positions
            .values()
            .map(|pos| {
                let price = prices.get(&pos.ticker).copied().unwrap_or(pos.average_price);
                PositionRow {
                    ticker: pos.ticker.clone(),
                    quantity: pos.quantity,
                    average_price: pos.average_price,
                    price,
                    market_value: pos.market_value(price),
                    unrealized_pnl: pos.unrealized_pnl(price),
                }
            })
            .collect();

        let positions_value: f64 = rows.iter().map(|r| r.market_value).sum();
        let total_value = self.cash + positions_value;
        PortfolioSummary {
            cash: self.cash,
            initial_cash: self.initial_cash,
            total_shares: rows.iter().map(|r| r.quantity).sum(),
            positions_value,
            total_value,
            pnl_pct: (total_value - self.initial_cash) / self.initial_cash * 100.0,
            realized_pnl: self.realized_pnl(),
            rows,
        }
    }
}
