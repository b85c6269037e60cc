//! The live, mutable strategy configuration.
//!
//! Readers always receive an owned snapshot, so a run that captured a
//! config at its start never observes later edits.

use crate::domain::config_validation::validate_strategy;
use crate::domain::error::TraderError;
use crate::domain::strategy::StrategyConfig;
use crate::ports::state_port::StatePort;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

#[derive(Debug)]
pub struct ConfigStore {
    defaults: StrategyConfig,
    live: RwLock<StrategyConfig>,
}

impl ConfigStore {
    /// `defaults` is both the starting value and what [`ConfigStore::reset`] restores.
    pub fn new(defaults: StrategyConfig) -> Result<Self, TraderError> {
        validate_strategy(&defaults)?;
        Ok(ConfigStore {
            live: RwLock::new(defaults.clone()),
            defaults,
        })
    }

    /// Load the file defaults through `store`, falling back to built-in values.
    pub fn load(store: &dyn StatePort<StrategyConfig>) -> Result<Self, TraderError> {
        let defaults = match store.load() {
            Some(cfg) => cfg,
            None => {
                warn!(location = %store.location(), "strategy file unavailable, using built-in defaults");
                StrategyConfig::default()
            }
        };
        ConfigStore::new(defaults)
    }

    fn read(&self) -> RwLockReadGuard<'_, StrategyConfig> {
        self.live.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StrategyConfig> {
        self.live.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the live config.
    pub fn get(&self) -> StrategyConfig {
        self.read().clone()
    }

    pub fn defaults(&self) -> &StrategyConfig {
        &self.defaults
    }

    /// Merge the named keys of `partial` into the live config.
    ///
    /// Unknown names are ignored. If the merged config fails validation the
    /// live config is left as it was.
    pub fn update(&self, partial: &BTreeMap<String, f64>) -> Result<StrategyConfig, TraderError> {
        let mut live = self.write();
        let (merged, unknown) = live.merged(partial);
        if !unknown.is_empty() {
            warn!(keys = ?unknown, "ignoring unknown strategy keys");
        }
        validate_strategy(&merged)?;
        *live = merged.clone();
        info!(hash = %merged.content_hash(), "strategy config updated");
        Ok(merged)
    }

    /// Replace the live config wholesale (validated).
    pub fn replace(&self, cfg: StrategyConfig) -> Result<(), TraderError> {
        validate_strategy(&cfg)?;
        *self.write() = cfg;
        Ok(())
    }

    /// Restore the file defaults.
    pub fn reset(&self) -> StrategyConfig {
        let mut live = self.write();
        *live = self.defaults.clone();
        info!("strategy config reset to defaults");
        live.clone()
    }

    pub fn hash(&self) -> String {
        self.read().content_hash()
    }

    /// Write the live config through `store`.
    pub fn persist(&self, store: &dyn StatePort<StrategyConfig>) -> Result<(), TraderError> {
        let snapshot = self.get();
        store.save(&snapshot)?;
        info!(location = %store.location(), "strategy config persisted");
        Ok(())
    }
}
