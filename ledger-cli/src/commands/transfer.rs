//! Transfer command - move funds between two accounts

use anyhow::Result;
use colored::Colorize;
use ledger_core::{LedgerContext, TransferRequest};

use crate::output;

pub fn run(
    ctx: &LedgerContext,
    source: i64,
    destination: i64,
    amount: String,
    json: bool,
) -> Result<()> {
    let request = TransferRequest::new(source, destination, amount);
    let record = ctx.transfer_service.transfer(&request)?;

    if json {
        // Success echoes the request
        println!("{}", serde_json::to_string_pretty(&request)?);
        return Ok(());
    }

    output::success(&format!(
        "Transferred {} from account {} to account {}",
        record.amount, record.source_account_id, record.destination_account_id
    ));
    println!("  Transfer ID: {}", record.id.to_string().dimmed());
    println!("  Recorded at: {}", record.recorded_at.to_rfc3339());
    Ok(())
}
