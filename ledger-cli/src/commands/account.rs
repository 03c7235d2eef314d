//! Account command - create accounts and show balances

use anyhow::Result;
use clap::Subcommand;
use ledger_core::{AccountView, CreateAccountRequest, LedgerContext};

use crate::output;

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open an account with an initial balance
    Create {
        /// Account ID
        #[arg(allow_negative_numbers = true)]
        account_id: i64,
        /// Initial balance as a decimal string
        #[arg(allow_negative_numbers = true)]
        initial_balance: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show an account's balance
    Show {
        /// Account ID
        #[arg(allow_negative_numbers = true)]
        account_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(ctx: &LedgerContext, command: AccountCommands) -> Result<()> {
    match command {
        AccountCommands::Create { account_id, initial_balance, json } => {
            let request = CreateAccountRequest { account_id, initial_balance };
            let account = ctx.account_service.create_account(&request)?;
            let view = AccountView::from(&account);
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                output::success(&format!("Account {} created", view.account_id));
                print_account(&view);
            }
        }
        AccountCommands::Show { account_id, json } => {
            let account = ctx.account_service.get_account(account_id)?;
            let view = AccountView::from(&account);
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                print_account(&view);
            }
        }
    }
    Ok(())
}

fn print_account(view: &AccountView) {
    let mut table = output::create_table();
    table.set_header(vec!["Account", "Balance"]);
    table.add_row(vec![view.account_id.to_string(), view.balance.clone()]);
    println!("{}", table);
}
