//! papertrader: rule-based signal scoring, paper-trading ledger, causal
//! backtesting and genetic coefficient search.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
