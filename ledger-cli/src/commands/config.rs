//! Config command - show and change settings.json

use std::path::Path;

use anyhow::{bail, Result};
use clap::Subcommand;
use colored::Colorize;
use ledger_core::config::Config;
use tracing_subscriber::EnvFilter;

use crate::output;

/// Env vars that take precedence over settings.json
const OVERRIDE_VARS: [&str; 2] = ["LEDGER_LOCK_TIMEOUT_MS", "LEDGER_LOG_LEVEL"];

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change settings and write them to settings.json
    Set {
        /// Database file name inside the ledger directory
        #[arg(long)]
        db_file: Option<String>,
        /// Longest wait for a locked account, in milliseconds
        #[arg(long)]
        lock_timeout_ms: Option<u64>,
        /// Default log filter, e.g. info or ledger_core=debug
        #[arg(long)]
        log_level: Option<String>,
    },
}

pub fn run(ledger_dir: &Path, mut config: Config, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show { json } => {
            let db_path = config.db_path(ledger_dir);
            if json {
                let view = serde_json::json!({
                    "ledgerDir": ledger_dir.display().to_string(),
                    "databasePath": db_path.display().to_string(),
                    "lockTimeoutMs": config.lock_timeout.as_millis() as u64,
                    "logLevel": config.log_level,
                });
                println!("{}", serde_json::to_string_pretty(&view)?);
                return Ok(());
            }

            println!("{}", "Ledger Configuration".bold());
            println!();
            let mut table = output::create_table();
            table.add_row(vec!["Ledger directory".to_string(), ledger_dir.display().to_string()]);
            table.add_row(vec!["Database".to_string(), db_path.display().to_string()]);
            table.add_row(vec![
                "Lock timeout".to_string(),
                format!("{} ms", config.lock_timeout.as_millis()),
            ]);
            table.add_row(vec!["Log level".to_string(), config.log_level.clone()]);
            println!("{}", table);
        }
        ConfigCommands::Set { db_file, lock_timeout_ms, log_level } => {
            // Saving now would write the override values into the file
            if let Some(var) = OVERRIDE_VARS.iter().find(|v| std::env::var_os(v).is_some()) {
                bail!("unset {} before changing settings", var);
            }
            apply_changes(&mut config, db_file, lock_timeout_ms, log_level)?;
            config.save(ledger_dir)?;
            output::success("Settings saved");
        }
    }
    Ok(())
}

/// Validate and apply `config set` arguments
fn apply_changes(
    config: &mut Config,
    db_file: Option<String>,
    lock_timeout_ms: Option<u64>,
    log_level: Option<String>,
) -> Result<()> {
    if db_file.is_none() && lock_timeout_ms.is_none() && log_level.is_none() {
        bail!("nothing to set; pass --db-file, --lock-timeout-ms or --log-level");
    }

    if let Some(file) = db_file {
        if file.trim().is_empty() || Path::new(&file).components().count() != 1 {
            bail!("database file must be a plain file name, got {:?}", file);
        }
        config.db_filename = file;
    }
    if let Some(ms) = lock_timeout_ms {
        if ms == 0 {
            bail!("lock timeout must be greater than zero");
        }
        config.lock_timeout = std::time::Duration::from_millis(ms);
    }
    if let Some(level) = log_level {
        if EnvFilter::try_new(&level).is_err() {
            bail!("not a valid log filter: {:?}", level);
        }
        config.log_level = level;
    }
    Ok(())
}
