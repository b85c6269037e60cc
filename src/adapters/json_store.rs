//! Whole-document JSON snapshots on disk.

use super::write_atomic;
use crate::domain::error::TraderError;
use crate::ports::state_port::StatePort;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Stores one `T` as pretty JSON at `path`.
///
/// Saves go to a sibling temp file that is then renamed over the target, so
/// readers never see a partial document.
pub struct JsonFileStore<T> {
    path: PathBuf,
    _doc: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileStore {
            path: path.into(),
            _doc: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn persistence_err(&self, reason: impl ToString) -> TraderError {
        TraderError::Persistence {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

impl<T> StatePort<T> for JsonFileStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn load(&self) -> Option<T> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "snapshot not readable");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "malformed snapshot, using defaults");
                None
            }
        }
    }

    fn save(&self, value: &T) -> Result<(), TraderError> {
        let json = serde_json::to_vec_pretty(value).map_err(|e| self.persistence_err(e))?;
        let tmp = self.temp_path();
        write_atomic(&self.path, &tmp, &json).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            self.persistence_err(e)
        })
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::portfolio::Portfolio;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_none() {
        let dir = TempDir::new().unwrap();
        let store: JsonFileStore<Portfolio> = JsonFileStore::new(dir.path().join("none.json"));
        assert!(store.load().is_none());
    }

    #[test]
    fn malformed_file_loads_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        let store: JsonFileStore<Portfolio> = JsonFileStore::new(path);
        assert!(store.load().is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested/portfolio.json"));
        let mut portfolio = Portfolio::new(5000.0);
        let at = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        portfolio.buy("AAPL", 3, 100.0, at).unwrap();

        store.save(&portfolio).unwrap();
        assert_eq!(store.load().unwrap(), portfolio);
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn persisted_layout_uses_short_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("portfolio.json");
        let store = JsonFileStore::new(&path);
        let mut portfolio = Portfolio::new(5000.0);
        let at = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        portfolio.buy("AAPL", 3, 100.0, at).unwrap();
        store.save(&portfolio).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["cash"], 4700.0);
        assert_eq!(json["initial_cash"], 5000.0);
        assert_eq!(json["positions"]["AAPL"]["qty"], 3);
        assert_eq!(json["positions"]["AAPL"]["avg_price"], 100.0);
    }

    #[test]
    fn save_into_unwritable_location_fails() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let store: JsonFileStore<Portfolio> = JsonFileStore::new(blocker.join("portfolio.json"));
        assert!(matches!(
            store.save(&Portfolio::default()),
            Err(TraderError::Persistence { .. })
        ));
    }
}
