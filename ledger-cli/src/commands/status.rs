//! Status command - show ledger summary

use anyhow::Result;
use colored::Colorize;
use ledger_core::LedgerContext;

use crate::output;

pub fn run(ctx: &LedgerContext, json: bool) -> Result<()> {
    let status = ctx.status_service.get_status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "Ledger Status".bold());
    println!();

    let mut table = output::create_table();
    table.add_row(vec!["Accounts", &status.total_accounts.to_string()]);
    table.add_row(vec!["Transfers", &status.total_transfers.to_string()]);
    table.add_row(vec!["Total funds", &status.total_funds]);

    println!("{}", table);
    Ok(())
}
