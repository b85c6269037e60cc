//! Configuration validation.
//!
//! Strategy values are checked before they become live; application
//! settings are checked once at startup.

use crate::domain::error::TraderError;
use crate::domain::ohlcv::parse_period;
use crate::domain::strategy::{CoefficientKey, STRATEGY_SECTION, StrategyConfig};
use crate::ports::config_port::ConfigPort;

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> TraderError {
    TraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

pub fn validate_strategy(cfg: &StrategyConfig) -> Result<(), TraderError> {
    validate_finite(cfg)?;
    validate_weights(cfg)?;
    validate_margin(cfg)?;
    validate_band(
        cfg,
        CoefficientKey::RsiOversold,
        CoefficientKey::RsiOverbought,
    )?;
    validate_band(
        cfg,
        CoefficientKey::StochOversold,
        CoefficientKey::StochOverbought,
    )?;
    validate_adx_threshold(cfg)?;
    validate_volume_multiplier(cfg)?;
    Ok(())
}

fn validate_finite(cfg: &StrategyConfig) -> Result<(), TraderError> {
    for key in CoefficientKey::ALL {
        if !cfg.get(key).is_finite() {
            return Err(invalid(STRATEGY_SECTION, key.name(), "must be a finite number"));
        }
    }
    Ok(())
}

fn validate_weights(cfg: &StrategyConfig) -> Result<(), TraderError> {
    for key in CoefficientKey::ALL.iter().filter(|k| k.is_weight()) {
        if cfg.get(*key) < 0.0 {
            return Err(invalid(STRATEGY_SECTION, key.name(), "weight must be non-negative"));
        }
    }
    Ok(())
}

fn validate_margin(cfg: &StrategyConfig) -> Result<(), TraderError> {
    if cfg.buy_sell_threshold < 0.0 {
        return Err(invalid(
            STRATEGY_SECTION,
            CoefficientKey::BuySellThreshold.name(),
            "decision margin must be non-negative",
        ));
    }
    Ok(())
}

fn validate_band(
    cfg: &StrategyConfig,
    low: CoefficientKey,
    high: CoefficientKey,
) -> Result<(), TraderError> {
    let lo = cfg.get(low);
    let hi = cfg.get(high);
    if !(0.0..=100.0).contains(&lo) {
        return Err(invalid(STRATEGY_SECTION, low.name(), "must be between 0 and 100"));
    }
    if !(0.0..=100.0).contains(&hi) {
        return Err(invalid(STRATEGY_SECTION, high.name(), "must be between 0 and 100"));
    }
    if lo >= hi {
        return Err(invalid(
            STRATEGY_SECTION,
            low.name(),
            format!("must be below {} ({} >= {})", high.name(), lo, hi),
        ));
    }
    Ok(())
}

fn validate_adx_threshold(cfg: &StrategyConfig) -> Result<(), TraderError> {
    if cfg.adx_trend_threshold < 0.0 {
        return Err(invalid(
            STRATEGY_SECTION,
            CoefficientKey::AdxTrendThreshold.name(),
            "must be non-negative",
        ));
    }
    Ok(())
}

fn validate_volume_multiplier(cfg: &StrategyConfig) -> Result<(), TraderError> {
    if cfg.volume_sma_multiplier <= 0.0 {
        return Err(invalid(
            STRATEGY_SECTION,
            CoefficientKey::VolumeSmaMultiplier.name(),
            "must be positive",
        ));
    }
    Ok(())
}

/// A search range for one optimizer gene.
pub fn validate_range(key: CoefficientKey, min: f64, max: f64) -> Result<(), TraderError> {
    if !min.is_finite() || !max.is_finite() {
        return Err(invalid("optimizer", key.name(), "range bounds must be finite"));
    }
    if min > max {
        return Err(invalid(
            "optimizer",
            key.name(),
            format!("range min {} exceeds max {}", min, max),
        ));
    }
    Ok(())
}

/// Application settings checked at startup.
pub fn validate_settings(config: &dyn ConfigPort) -> Result<(), TraderError> {
    validate_initial_cash(config)?;
    validate_positive_int(config, "backtest", "trade_quantity", 10)?;
    validate_positive_int(config, "live", "trade_quantity", 1)?;
    validate_positive_int(config, "live", "poll_seconds", 300)?;
    validate_positive_int(config, "optimizer", "trade_quantity", 10)?;
    validate_positive_int(config, "optimizer", "tickers_per_eval", 3)?;
    validate_positive_int(config, "optimizer", "tournament_size", 3)?;
    validate_positive_int(config, "optimizer", "history_limit", 1000)?;
    for key in ["crossover_prob", "mutation_prob", "gene_mutation_prob"] {
        validate_probability(config, key)?;
    }
    validate_non_negative(config, "optimizer", "blend_alpha", 0.5)?;
    validate_non_negative(config, "optimizer", "mutation_sigma", 0.2)?;
    for section in ["backtest", "live", "optimizer"] {
        validate_period(config, section)?;
    }
    Ok(())
}

fn validate_period(config: &dyn ConfigPort, section: &str) -> Result<(), TraderError> {
    let Some(raw) = config.get_string(section, "period") else {
        return Ok(());
    };
    parse_period(&raw).map(|_| ()).map_err(|e| invalid(section, "period", e.to_string()))
}

fn validate_initial_cash(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let value = config.get_double("portfolio", "initial_cash", 100_000.0);
    if !(value.is_finite() && value > 0.0) {
        return Err(invalid("portfolio", "initial_cash", "initial_cash must be positive"));
    }
    Ok(())
}

fn validate_positive_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<(), TraderError> {
    if config.get_int(section, key, default) <= 0 {
        return Err(invalid(section, key, format!("{} must be positive", key)));
    }
    Ok(())
}

fn validate_probability(config: &dyn ConfigPort, key: &str) -> Result<(), TraderError> {
    let value = config.get_double("optimizer", key, 0.0);
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid("optimizer", key, format!("{} must be between 0 and 1", key)));
    }
    Ok(())
}

fn validate_non_negative(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<(), TraderError> {
    let value = config.get_double(section, key, default);
    if !(value.is_finite() && value >= 0.0) {
        return Err(invalid(section, key, format!("{} must be non-negative", key)));
    }
    Ok(())
}
