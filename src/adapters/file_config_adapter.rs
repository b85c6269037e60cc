//! INI file configuration adapter, plus the strategy-file store built on it.

use super::write_atomic;
use crate::domain::error::TraderError;
use crate::domain::strategy::{CoefficientKey, STRATEGY_SECTION, StrategyConfig};
use crate::ports::config_port::ConfigPort;
use crate::ports::state_port::StatePort;
use configparser::ini::Ini;
use std::path::{Path, PathBuf};
use tracing::warn;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new();
        config.load(path).map_err(|e| std::io::Error::other(e))?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self { config })
    }

    pub fn empty() -> Self {
        Self { config: Ini::new() }
    }

    pub fn set(&mut self, section: &str, key: &str, value: impl ToString) {
        self.config.set(section, key, Some(value.to_string()));
    }

    pub fn to_ini_string(&self) -> String {
        self.config.writes()
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }
}

/// Keeps the live strategy in the `[strategy]` section of an INI file.
///
/// Saving rewrites only that section; anything else in the file is kept.
/// Keys missing from the file load as their defaults.
pub struct IniStrategyStore {
    path: PathBuf,
}

impl IniStrategyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        IniStrategyStore { path: path.into() }
    }

    fn persistence_err(&self, reason: impl ToString) -> TraderError {
        TraderError::Persistence {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

impl StatePort<StrategyConfig> for IniStrategyStore {
    fn load(&self) -> Option<StrategyConfig> {
        if !self.path.exists() {
            return None;
        }
        match FileConfigAdapter::from_file(&self.path) {
            Ok(adapter) => Some(StrategyConfig::from_config(
                &adapter,
                &StrategyConfig::default(),
            )),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable strategy file, using defaults");
                None
            }
        }
    }

    fn save(&self, value: &StrategyConfig) -> Result<(), TraderError> {
        let mut adapter = if self.path.exists() {
            FileConfigAdapter::from_file(&self.path).map_err(|e| self.persistence_err(e))?
        } else {
            FileConfigAdapter::empty()
        };
        for key in CoefficientKey::ALL {
            adapter.set(STRATEGY_SECTION, key.name(), value.get(key));
        }

        let mut tmp = self.path.as_os_str().to_os_string();
        tmp.push(".tmp");
        write_atomic(
            &self.path,
            Path::new(&tmp),
            adapter.to_ini_string().as_bytes(),
        )
        .map_err(|e| self.persistence_err(e))
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
