//! Status service - ledger summary

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::result::{Error, Result};

/// Status service for ledger summaries
pub struct StatusService {
    repository: Arc<DuckDbRepository>,
}

impl StatusService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Get overall status summary
    pub fn get_status(&self) -> Result<StatusSummary> {
        let accounts = self.repository.list_accounts()?;
        let total_transfers = self.repository.count_transfers()?;

        let mut total_funds = Decimal::ZERO;
        for account in &accounts {
            total_funds = total_funds
                .checked_add(account.balance)
                .ok_or_else(|| Error::storage("total funds overflow a decimal"))?;
        }

        Ok(StatusSummary {
            total_accounts: accounts.len() as i64,
            total_transfers,
            total_funds: total_funds.to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub total_accounts: i64,
    pub total_transfers: i64,
    /// Sum of all balances; transfers never change it
    pub total_funds: String,
}
