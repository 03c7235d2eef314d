//! Doctor service - ledger integrity checks

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::result::Result;

/// Doctor service for health checks
pub struct DoctorService {
    repository: Arc<DuckDbRepository>,
}

impl DoctorService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Run all health checks
    pub fn run_checks(&self) -> Result<DoctorResult> {
        let mut checks = BTreeMap::new();

        let negative: Vec<_> = self
            .repository
            .list_accounts()?
            .into_iter()
            .filter(|account| account.balance < Decimal::ZERO)
            .collect();
        checks.insert(
            "negative_balances".to_string(),
            CheckResult::from_findings(
                negative
                    .iter()
                    .map(|a| json!({"account_id": a.id, "balance": a.balance.to_string()}))
                    .collect(),
                "No account has a negative balance",
                |n| format!("{} account(s) have a negative balance", n),
            ),
        );

        let orphaned = self.repository.check_orphaned_transfers()?;
        checks.insert(
            "orphaned_transfers".to_string(),
            CheckResult::from_findings(
                orphaned.iter().map(|id| json!({"transfer_id": id})).collect(),
                "Every transfer references existing accounts",
                |n| format!("{} transfer(s) reference missing accounts", n),
            ),
        );

        let self_transfers = self.repository.check_self_transfers()?;
        checks.insert(
            "self_transfers".to_string(),
            CheckResult::from_findings(
                self_transfers.iter().map(|id| json!({"transfer_id": id})).collect(),
                "No transfer moves funds to its own source",
                |n| format!("{} transfer(s) have the same source and destination", n),
            ),
        );

        let bad_amounts = self.repository.check_transfer_amounts()?;
        checks.insert(
            "transfer_amounts".to_string(),
            CheckResult::from_findings(
                bad_amounts.iter().map(|id| json!({"transfer_id": id})).collect(),
                "All transfer amounts are positive",
                |n| format!("{} transfer(s) have a non-positive or unreadable amount", n),
            ),
        );

        let pending = self.repository.pending_migrations()?;
        checks.insert(
            "schema_migrations".to_string(),
            CheckResult::from_findings(
                pending.iter().map(|name| json!({"migration": name})).collect(),
                "All schema migrations are applied",
                |n| format!("{} migration(s) are not applied", n),
            ),
        );

        let failed = checks.values().filter(|c| c.status != "pass").count();
        Ok(DoctorResult {
            checks,
            healthy: failed == 0,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorResult {
    pub checks: BTreeMap<String, CheckResult>,
    pub healthy: bool,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<serde_json::Value>>,
}

impl CheckResult {
    fn from_findings(
        findings: Vec<serde_json::Value>,
        pass_message: &str,
        error_message: impl Fn(usize) -> String,
    ) -> Self {
        if findings.is_empty() {
            Self {
                status: "pass".to_string(),
                message: pass_message.to_string(),
                details: None,
            }
        } else {
            Self {
                status: "error".to_string(),
                message: error_message(findings.len()),
                details: Some(findings),
            }
        }
    }
}
