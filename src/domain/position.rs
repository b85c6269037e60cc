//! Open positions and closed trade records.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A long holding. Only exists while `quantity > 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    #[serde(rename = "qty")]
    pub quantity: i64,
    /// Volume-weighted cost basis.
    #[serde(rename = "avg_price")]
    pub average_price: f64,
    #[serde(alias = "buy_date")]
    pub opened_at: NaiveDateTime,
}

impl Position {
    pub fn cost_basis(&self) -> f64 {
        self.quantity as f64 * self.average_price
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        (price - self.average_price) * self.quantity as f64
    }

    /// Merge an additional buy into the cost basis.
    pub(crate) fn add(&mut self, quantity: i64, price: f64) {
        let total = self.quantity + quantity;
        self.average_price =
            (self.average_price * self.quantity as f64 + price * quantity as f64) / total as f64;
        self.quantity = total;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub ticker: String,
    #[serde(rename = "qty")]
    pub quantity: i64,
    #[serde(rename = "avg_price")]
    pub average_buy_price: f64,
    pub sell_price: f64,
    pub realized_pnl: f64,
    pub closed_at: NaiveDateTime,
}

impl ClosedTrade {
    pub fn proceeds(&self) -> f64 {
        self.quantity as f64 * self.sell_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn opened() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn sample_position() -> Position {
        Position {
            ticker: "AAPL".into(),
            quantity: 10,
            average_price: 150.0,
            opened_at: opened(),
        }
    }

    #[test]
    fn market_value_and_pnl() {
        let pos = sample_position();
        assert!((pos.market_value(160.0) - 1600.0).abs() < f64::EPSILON);
        assert!((pos.unrealized_pnl(160.0) - 100.0).abs() < f64::EPSILON);
        assert!((pos.unrealized_pnl(140.0) + 100.0).abs() < f64::EPSILON);
        assert!((pos.cost_basis() - 1500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn add_recomputes_weighted_average() {
        let mut pos = sample_position();
        pos.add(10, 170.0);
        assert_eq!(pos.quantity, 20);
        assert!((pos.average_price - 160.0).abs() < 1e-9);
        assert_eq!(pos.opened_at, opened());
    }

    #[test]
    fn serialized_keys() {
        let json = serde_json::to_value(sample_position()).unwrap();
        assert_eq!(json["qty"], 10);
        assert_eq!(json["avg_price"], 150.0);
        assert!(json.get("opened_at").is_some());
    }

    #[test]
    fn closed_trade_proceeds() {
        let trade = ClosedTrade {
            ticker: "AAPL".into(),
            quantity: 15,
            average_buy_price: 160.0,
            sell_price: 180.0,
            realized_pnl: 300.0,
            closed_at: opened(),
        };
        assert!((trade.proceeds() - 2700.0).abs() < f64::EPSILON);
    }
}
