//! Strategy coefficients and thresholds that drive signal scoring.
//!
//! A [`StrategyConfig`] is a plain value: the live copy lives in
//! [`ConfigStore`](crate::domain::config_store::ConfigStore), and every
//! scoring call, backtest, or optimizer individual works on its own copy.

use crate::domain::error::TraderError;
use crate::ports::config_port::ConfigPort;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// INI section holding the strategy keys.
pub const STRATEGY_SECTION: &str = "strategy";

/// Named numeric keys of a [`StrategyConfig`].
///
/// [`CoefficientKey::ALL`] fixes the gene order of optimizer individuals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CoefficientKey {
    CoefBollinger,
    CoefRsi,
    CoefMacd,
    CoefStoch,
    CoefAdxSma,
    CoefVolume,
    AdxTrendThreshold,
    BuySellThreshold,
    RsiOverbought,
    RsiOversold,
    StochOverbought,
    StochOversold,
    VolumeSmaMultiplier,
}

impl CoefficientKey {
    pub const ALL: [CoefficientKey; 13] = [
        CoefficientKey::CoefBollinger,
        CoefficientKey::CoefRsi,
        CoefficientKey::CoefMacd,
        CoefficientKey::CoefStoch,
        CoefficientKey::CoefAdxSma,
        CoefficientKey::CoefVolume,
        CoefficientKey::AdxTrendThreshold,
        CoefficientKey::BuySellThreshold,
        CoefficientKey::RsiOverbought,
        CoefficientKey::RsiOversold,
        CoefficientKey::StochOverbought,
        CoefficientKey::StochOversold,
        CoefficientKey::VolumeSmaMultiplier,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CoefficientKey::CoefBollinger => "coef_bollinger",
            CoefficientKey::CoefRsi => "coef_rsi",
            CoefficientKey::CoefMacd => "coef_macd",
            CoefficientKey::CoefStoch => "coef_stoch",
            CoefficientKey::CoefAdxSma => "coef_adx_sma",
            CoefficientKey::CoefVolume => "coef_volume",
            CoefficientKey::AdxTrendThreshold => "adx_trend_threshold",
            CoefficientKey::BuySellThreshold => "buy_sell_threshold",
            CoefficientKey::RsiOverbought => "rsi_overbought",
            CoefficientKey::RsiOversold => "rsi_oversold",
            CoefficientKey::StochOverbought => "stoch_overbought",
            CoefficientKey::StochOversold => "stoch_oversold",
            CoefficientKey::VolumeSmaMultiplier => "volume_sma_multiplier",
        }
    }

    /// Per-rule weights, as opposed to thresholds.
    pub fn is_weight(self) -> bool {
        matches!(
            self,
            CoefficientKey::CoefBollinger
                | CoefficientKey::CoefRsi
                | CoefficientKey::CoefMacd
                | CoefficientKey::CoefStoch
                | CoefficientKey::CoefAdxSma
                | CoefficientKey::CoefVolume
        )
    }
}

impl fmt::Display for CoefficientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CoefficientKey {
    type Err = TraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        CoefficientKey::ALL
            .iter()
            .copied()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| TraderError::invalid(format!("unknown strategy key '{}'", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub coef_bollinger: f64,
    pub coef_rsi: f64,
    pub coef_macd: f64,
    pub coef_stoch: f64,
    pub coef_adx_sma: f64,
    pub coef_volume: f64,
    pub adx_trend_threshold: f64,
    pub buy_sell_threshold: f64,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub stoch_overbought: f64,
    pub stoch_oversold: f64,
    pub volume_sma_multiplier: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            coef_bollinger: 0.8,
            coef_rsi: 2.4,
            coef_macd: 1.55,
            coef_stoch: 2.0,
            coef_adx_sma: 0.75,
            coef_volume: 1.0,
            adx_trend_threshold: 25.0,
            buy_sell_threshold: 1.4,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            stoch_overbought: 80.0,
            stoch_oversold: 20.0,
            volume_sma_multiplier: 1.5,
        }
    }
}

impl StrategyConfig {
    /// A config with every rule weight set to zero and default thresholds.
    pub fn zero_weights() -> Self {
        let mut cfg = StrategyConfig::default();
        for key in CoefficientKey::ALL.iter().filter(|k| k.is_weight()) {
            cfg.set(*key, 0.0);
        }
        cfg
    }

    /// Read `[strategy]` keys, using `fallback` for anything missing.
    pub fn from_config(config: &dyn ConfigPort, fallback: &StrategyConfig) -> Self {
        let mut cfg = fallback.clone();
        for key in CoefficientKey::ALL {
            let value = config.get_double(STRATEGY_SECTION, key.name(), fallback.get(key));
            cfg.set(key, value);
        }
        cfg
    }

    pub fn get(&self, key: CoefficientKey) -> f64 {
        match key {
            CoefficientKey::CoefBollinger => self.coef_bollinger,
            CoefficientKey::CoefRsi => self.coef_rsi,
            CoefficientKey::CoefMacd => self.coef_macd,
            CoefficientKey::CoefStoch => self.coef_stoch,
            CoefficientKey::CoefAdxSma => self.coef_adx_sma,
            CoefficientKey::CoefVolume => self.coef_volume,
            CoefficientKey::AdxTrendThreshold => self.adx_trend_threshold,
            CoefficientKey::BuySellThreshold => self.buy_sell_threshold,
            CoefficientKey::RsiOverbought => self.rsi_overbought,
            CoefficientKey::RsiOversold => self.rsi_oversold,
            CoefficientKey::StochOverbought => self.stoch_overbought,
            CoefficientKey::StochOversold => self.stoch_oversold,
            CoefficientKey::VolumeSmaMultiplier => self.volume_sma_multiplier,
        }
    }

    pub fn set(&mut self, key: CoefficientKey, value: f64) {
        let slot = match key {
            CoefficientKey::CoefBollinger => &mut self.coef_bollinger,
            CoefficientKey::CoefRsi => &mut self.coef_rsi,
            CoefficientKey::CoefMacd => &mut self.coef_macd,
            CoefficientKey::CoefStoch => &mut self.coef_stoch,
            CoefficientKey::CoefAdxSma => &mut self.coef_adx_sma,
            CoefficientKey::CoefVolume => &mut self.coef_volume,
            CoefficientKey::AdxTrendThreshold => &mut self.adx_trend_threshold,
            CoefficientKey::BuySellThreshold => &mut self.buy_sell_threshold,
            CoefficientKey::RsiOverbought => &mut self.rsi_overbought,
            CoefficientKey::RsiOversold => &mut self.rsi_oversold,
            CoefficientKey::StochOverbought => &mut self.stoch_overbought,
            CoefficientKey::StochOversold => &mut self.stoch_oversold,
            CoefficientKey::VolumeSmaMultiplier => &mut self.volume_sma_multiplier,
        };
        *slot = value;
    }

    pub fn to_map(&self) -> BTreeMap<String, f64> {
        CoefficientKey::ALL
            .iter()
            .map(|k| (k.name().to_string(), self.get(*k)))
            .collect()
    }

    /// Values in [`CoefficientKey::ALL`] order.
    pub fn to_vector(&self) -> Vec<f64> {
        CoefficientKey::ALL.iter().map(|k| self.get(*k)).collect()
    }

    pub fn from_vector(genes: &[f64]) -> Result<Self, TraderError> {
        if genes.len() != CoefficientKey::ALL.len() {
            return Err(TraderError::invalid(format!(
                "expected {} genes, got {}",
                CoefficientKey::ALL.len(),
                genes.len()
            )));
        }
        let mut cfg = StrategyConfig::default();
        for (key, value) in CoefficientKey::ALL.iter().zip(genes) {
            cfg.set(*key, *value);
        }
        Ok(cfg)
    }

    /// Copy of `self` with the known keys of `partial` overwritten.
    ///
    /// Returns the merged config and the names that matched no key.
    pub fn merged(&self, partial: &BTreeMap<String, f64>) -> (StrategyConfig, Vec<String>) {
        let mut cfg = self.clone();
        let mut unknown = Vec::new();
        for (name, value) in partial {
            match name.parse::<CoefficientKey>() {
                Ok(key) => cfg.set(key, *value),
                Err(_) => unknown.push(name.clone()),
            }
        }
        (cfg, unknown)
    }

    /// Stable digest over every key and value.
    ///
    /// Keys are hashed in name order with `{:?}` formatting, which
    /// round-trips f64 exactly.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for (name, value) in self.to_map() {
            hasher.update(format!("{}={:?}\n", name, value).as_bytes());
        }
        let digest = hex::encode(hasher.finalize());
        digest[..16].to_string()
    }
}
