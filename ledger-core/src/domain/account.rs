//! Account domain model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Caller-assigned account identifier
pub type AccountId = i64;

/// A ledger account and its current balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub balance: Decimal,
}

impl Account {
    pub fn new(id: AccountId, balance: Decimal) -> Self {
        Self { id, balance }
    }

    /// Validate account data
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.balance < Decimal::ZERO {
            return Err("balance cannot be negative");
        }
        Ok(())
    }
}

/// Parse a decimal string exactly, without going through binary floating point.
///
/// Returns `None` for anything `rust_decimal` cannot represent, including
/// values with more digits than it holds. Such input is never rounded.
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str_exact(text).ok()
}

/// Request to open an account with a starting balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    pub account_id: AccountId,
    /// Decimal string, e.g. "100.00"
    pub initial_balance: String,
}

/// Outbound shape for account creation and lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub account_id: AccountId,
    pub balance: String,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            account_id: account.id,
            balance: account.balance.to_string(),
        }
    }
}
