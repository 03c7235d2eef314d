//! Configuration management
//!
//! Settings live in `settings.json` inside the ledger directory:
//! ```json
//! {
//!   "database": { "file": "ledger.duckdb" },
//!   "lockTimeoutMs": 5000,
//!   "logLevel": "warn"
//! }
//! ```
//! Keys this crate does not manage are kept when saving.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_DB_FILENAME: &str = "ledger.duckdb";
const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;
const DEFAULT_LOG_LEVEL: &str = "warn";

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    database: DatabaseSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lock_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    log_level: Option<String>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatabaseSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file: Option<String>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Ledger configuration (resolved view of settings)
#[derive(Debug, Clone)]
pub struct Config {
    pub db_filename: String,
    /// Longest a transfer waits for an account row held by another transfer
    pub lock_timeout: Duration,
    pub log_level: String,
    _raw_settings: SettingsFile,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_filename: DEFAULT_DB_FILENAME.to_string(),
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            _raw_settings: SettingsFile::default(),
        }
    }
}

impl Config {
    /// Load config from the ledger directory
    ///
    /// Environment overrides (for CI/testing):
    /// - `LEDGER_LOCK_TIMEOUT_MS`
    /// - `LEDGER_LOG_LEVEL`
    pub fn load(ledger_dir: &Path) -> Result<Self> {
        let raw = read_settings(&ledger_dir.join("settings.json"))?;

        let lock_timeout_ms = match std::env::var("LEDGER_LOCK_TIMEOUT_MS") {
            Ok(value) => value
                .trim()
                .parse::<u64>()
                .with_context(|| format!("LEDGER_LOCK_TIMEOUT_MS is not a number: {:?}", value))?,
            Err(_) => raw.lock_timeout_ms.unwrap_or(DEFAULT_LOCK_TIMEOUT_MS),
        };
        if lock_timeout_ms == 0 {
            bail!("lock timeout must be greater than zero");
        }

        let log_level = std::env::var("LEDGER_LOG_LEVEL")
            .ok()
            .filter(|level| !level.trim().is_empty())
            .or_else(|| raw.log_level.clone())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        Ok(Self {
            db_filename: raw
                .database
                .file
                .clone()
                .unwrap_or_else(|| DEFAULT_DB_FILENAME.to_string()),
            lock_timeout: Duration::from_millis(lock_timeout_ms),
            log_level,
            _raw_settings: raw,
        })
    }

    /// Save config to the ledger directory
    pub fn save(&self, ledger_dir: &Path) -> Result<()> {
        let settings_path = ledger_dir.join("settings.json");

        // Re-read so keys written by someone else since load survive
        let mut settings = read_settings(&settings_path)?;
        settings.database.file = Some(self.db_filename.clone());
        settings.lock_timeout_ms = Some(self.lock_timeout.as_millis() as u64);
        settings.log_level = Some(self.log_level.clone());

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)
            .with_context(|| format!("failed to write {}", settings_path.display()))?;
        Ok(())
    }

    /// Full path of the database file
    pub fn db_path(&self, ledger_dir: &Path) -> PathBuf {
        ledger_dir.join(&self.db_filename)
    }
}

fn read_settings(path: &Path) -> Result<SettingsFile> {
    if !path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid settings in {}", path.display()))
}
