//! Core domain types and logic.

pub mod automation;
pub mod backtest;
pub mod backtest_cache;
pub mod config_store;
pub mod config_validation;
pub mod error;
pub mod indicator;
pub mod jobs;
pub mod ledger;
pub mod live;
pub mod ohlcv;
pub mod optimizer;
pub mod portfolio;
pub mod position;
pub mod signal;
pub mod strategy;
pub mod universe;
