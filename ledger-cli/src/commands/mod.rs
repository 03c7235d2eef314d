//! CLI command implementations

pub mod account;
pub mod config;
pub mod doctor;
pub mod status;
pub mod transfer;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ledger_core::config::Config;
use ledger_core::LedgerContext;
use tracing_subscriber::EnvFilter;

/// Get the ledger directory from environment or default
pub fn get_ledger_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("LEDGER_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".ledger"))
        .context("Could not find home directory; set LEDGER_DIR")
}

/// Create the ledger directory if needed, load settings and start logging
pub fn load_config(ledger_dir: &Path) -> Result<Config> {
    std::fs::create_dir_all(ledger_dir)
        .with_context(|| format!("Failed to create ledger directory: {:?}", ledger_dir))?;

    let config = Config::load(ledger_dir)?;
    // Logging comes up before the database opens so retries are reported
    init_logging(&config.log_level);
    Ok(config)
}

/// Open the ledger with an already loaded config
pub fn open_context(ledger_dir: &Path, config: Config) -> Result<LedgerContext> {
    LedgerContext::with_config(ledger_dir, config).context("Failed to initialize ledger context")
}

/// Send tracing output to stderr; `RUST_LOG` wins over the configured level
fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // A second init (tests) is not an error worth reporting
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
