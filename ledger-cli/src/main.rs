//! Ledger CLI - move funds between accounts from the terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ledger_core::{Error, ErrorClass};

mod commands;
mod output;

use commands::{account, config, doctor, status, transfer};
use ledger_core::config::Config;

/// Ledger - atomic transfers between accounts
#[derive(Parser)]
#[command(name = "ledger", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and inspect accounts
    Account {
        #[command(subcommand)]
        command: account::AccountCommands,
    },

    /// Move funds from one account to another
    Transfer {
        /// Account to debit
        #[arg(allow_negative_numbers = true)]
        source: i64,
        /// Account to credit
        #[arg(allow_negative_numbers = true)]
        destination: i64,
        /// Amount as a decimal string, e.g. 30.00
        #[arg(allow_negative_numbers = true)]
        amount: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show ledger summary
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run ledger integrity checks
    Doctor {
        /// Show verbose output
        #[arg(long, short)]
        verbose: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show or change settings
    Config {
        #[command(subcommand)]
        command: config::ConfigCommands,
    },
}

/// Process exit code for a failed command
fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<Error>().map(Error::class) {
        Some(ErrorClass::Client) => 2,
        Some(ErrorClass::NotFound) => 3,
        Some(ErrorClass::Internal) | None => 1,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = run(cli);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let ledger_dir = commands::get_ledger_dir()?;
    let config = commands::load_config(&ledger_dir)?;
    let open = |config: Config| commands::open_context(&ledger_dir, config);

    match cli.command {
        Commands::Account { command } => account::run(&open(config)?, command),
        Commands::Transfer { source, destination, amount, json } => {
            transfer::run(&open(config)?, source, destination, amount, json)
        }
        Commands::Status { json } => status::run(&open(config)?, json),
        Commands::Doctor { verbose, json } => doctor::run(&open(config)?, verbose, json),
        Commands::Config { command } => config::run(&ledger_dir, config, command),
    }
}
