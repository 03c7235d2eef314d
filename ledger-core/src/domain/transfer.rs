//! Transfer domain model

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::{parse_decimal, AccountId};
use super::result::{Error, Result};

/// Inbound transfer request. Amounts travel as decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub source_account_id: AccountId,
    pub destination_account_id: AccountId,
    pub amount: String,
}

impl TransferRequest {
    pub fn new(source: AccountId, destination: AccountId, amount: impl Into<String>) -> Self {
        Self {
            source_account_id: source,
            destination_account_id: destination,
            amount: amount.into(),
        }
    }
}

/// Append-only record of a committed transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: Uuid,
    pub source_account_id: AccountId,
    pub destination_account_id: AccountId,
    pub amount: Decimal,
    pub recorded_at: DateTime<Utc>,
}

impl TransferRecord {
    pub fn new(source: AccountId, destination: AccountId, amount: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_account_id: source,
            destination_account_id: destination,
            amount,
            recorded_at: Utc::now(),
        }
    }

    /// Validate record data
    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        if self.source_account_id == self.destination_account_id {
            return Err("source and destination accounts must differ");
        }
        if self.amount <= Decimal::ZERO {
            return Err("amount must be positive");
        }
        Ok(())
    }
}

/// Where a transfer attempt is in its lifecycle.
///
/// Every attempt ends in `Committed` or `Aborted`; only `Committing` can
/// lead to `Committed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    Validating,
    Locking,
    Checking,
    Mutating,
    Committing,
    Committed,
    Aborted,
}

impl fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferPhase::Validating => "validating",
            TransferPhase::Locking => "locking",
            TransferPhase::Checking => "checking",
            TransferPhase::Mutating => "mutating",
            TransferPhase::Committing => "committing",
            TransferPhase::Committed => "committed",
            TransferPhase::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Parse a transfer amount: must be a decimal strictly greater than zero.
pub fn parse_amount(text: &str) -> Result<Decimal> {
    let amount = parse_decimal(text)
        .ok_or_else(|| Error::InvalidAmount(format!("not a decimal: {:?}", text)))?;
    if amount <= Decimal::ZERO {
        return Err(Error::InvalidAmount(format!("must be positive, got {}", amount)));
    }
    Ok(amount)
}
