//! Backtest results cached per (ticker, interval, window), stamped with the
//! strategy hash they were computed under.

use crate::domain::backtest::BacktestReport;
use crate::domain::error::TraderError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheKey {
    pub ticker: String,
    pub interval: String,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl CacheKey {
    pub fn new(ticker: &str, interval: &str, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        CacheKey {
            ticker: ticker.to_uppercase(),
            interval: interval.to_string(),
            start,
            end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedBacktest {
    pub key: CacheKey,
    pub config_hash: String,
    pub report: BacktestReport,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestCache {
    entries: Vec<CachedBacktest>,
}

impl BacktestCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The cached report for `key`, if any.
    ///
    /// A report computed under a different config hash is never returned:
    /// the lookup fails with `StaleConfig` and the caller must recompute.
    pub fn get(&self, key: &CacheKey, live_hash: &str) -> Result<Option<&BacktestReport>, TraderError> {
        match self.entries.iter().find(|e| e.key == *key) {
            None => Ok(None),
            Some(entry) if entry.config_hash == live_hash => Ok(Some(&entry.report)),
            Some(entry) => Err(TraderError::StaleConfig {
                cached: entry.config_hash.clone(),
                live: live_hash.to_string(),
            }),
        }
    }

    pub fn insert(&mut self, key: CacheKey, config_hash: &str, report: BacktestReport) {
        self.entries.retain(|e| e.key != key);
        self.entries.push(CachedBacktest {
            key,
            config_hash: config_hash.to_string(),
            report,
        });
    }

    pub fn remove(&mut self, key: &CacheKey) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.key != *key);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
