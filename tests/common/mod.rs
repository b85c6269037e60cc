#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use papertrader::domain::error::TraderError;
pub use papertrader::domain::ohlcv::{IndicatorBar, Indicators};
use papertrader::ports::data_port::MarketDataPort;
use papertrader::ports::state_port::StatePort;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub struct MockDataPort {
    pub data: HashMap<String, Vec<IndicatorBar>>,
    pub errors: HashMap<String, String>,
    pub fetches: AtomicUsize,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_bars(mut self, ticker: &str, bars: Vec<IndicatorBar>) -> Self {
        self.data.insert(ticker.to_string(), bars);
        self
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl MarketDataPort for MockDataPort {
    fn fetch(
        &self,
        ticker: &str,
        _period: &str,
        _interval: &str,
    ) -> Result<Vec<IndicatorBar>, TraderError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.errors.get(ticker) {
            return Err(TraderError::Data {
                reason: reason.clone(),
            });
        }
        self.data
            .get(ticker)
            .cloned()
            .ok_or_else(|| TraderError::no_data(ticker, "not found"))
    }
}

/// In-memory `StatePort`. Clones share the same slot, so a test can keep one
/// handle while another is boxed into a service.
pub struct MemoryStore<T> {
    slot: Arc<Mutex<Option<T>>>,
    fail: Arc<AtomicBool>,
    saves: Arc<AtomicUsize>,
}

impl<T> Clone for MemoryStore<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
            fail: Arc::clone(&self.fail),
            saves: Arc::clone(&self.saves),
        }
    }
}

impl<T: Clone> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            fail: Arc::new(AtomicBool::new(false)),
            saves: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with(value: T) -> Self {
        let store = Self::new();
        *store.slot.lock().unwrap() = Some(value);
        store
    }

    pub fn get(&self) -> Option<T> {
        self.slot.lock().unwrap().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl<T: Clone + Send> StatePort<T> for MemoryStore<T> {
    fn load(&self) -> Option<T> {
        self.get()
    }

    fn save(&self, value: &T) -> Result<(), TraderError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TraderError::Persistence {
                path: self.location(),
                reason: "disk full".into(),
            });
        }
        *self.slot.lock().unwrap() = Some(value.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn location(&self) -> String {
        "memory".into()
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Bar time for index `i`: one bar per day from 2024-01-01 09:30.
pub fn ts(i: usize) -> NaiveDateTime {
    date(2024, 1, 1).and_hms_opt(9, 30, 0).unwrap() + Duration::days(i as i64)
}

pub fn plain_bar(i: usize, close: f64) -> IndicatorBar {
    IndicatorBar {
        timestamp: ts(i),
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1_000.0,
        indicators: Indicators::default(),
    }
}

/// A bar whose only indicator is RSI. With the default strategy an RSI below
/// 30 scores Buy, above 70 scores Sell, and anything between is Hold.
pub fn rsi_bar(i: usize, close: f64, rsi: f64) -> IndicatorBar {
    IndicatorBar {
        indicators: Indicators {
            rsi: Some(rsi),
            ..Indicators::default()
        },
        ..plain_bar(i, close)
    }
}

pub fn rsi_series(points: &[(f64, f64)]) -> Vec<IndicatorBar> {
    points
        .iter()
        .enumerate()
        .map(|(i, &(close, rsi))| rsi_bar(i, close, rsi))
        .collect()
}

/// Oscillating closes with RSI moving against price, so the default strategy
/// buys dips and sells rallies.
pub fn oscillating_series(count: usize) -> Vec<IndicatorBar> {
    (0..count)
        .map(|i| {
            let wave = (i as f64 * 0.6).sin();
            rsi_bar(i, 100.0 + wave * 10.0, 50.0 + wave * 35.0)
        })
        .collect()
}
