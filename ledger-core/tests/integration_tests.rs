//! Integration tests for ledger-core services
//!
//! These tests verify critical data integrity scenarios using a real DuckDB
//! file. Faults are injected at the store trait level.
//!
//! Run with: cargo test --test integration_tests -- --nocapture

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use ledger_core::adapters::duckdb::{DuckDbRepository, DuckDbUnitOfWork};
use ledger_core::domain::result::{Error, ErrorClass, Result};
use ledger_core::domain::{Account, AccountId, AccountView, CreateAccountRequest, TransferRecord, TransferRequest};
use ledger_core::ports::LedgerStore;
use ledger_core::services::{AccountService, DoctorService, StatusService, TransferService};
use ledger_core::config::Config;
use ledger_core::LedgerContext;

// ============================================================================
// Test Helpers
// ============================================================================

/// Create a test repository with schema initialized
fn create_test_repo(temp_dir: &TempDir) -> Arc<DuckDbRepository> {
    let db_path = temp_dir.path().join("test.duckdb");
    let repo = DuckDbRepository::new(&db_path).expect("Failed to create repository");
    repo.ensure_schema().expect("Failed to initialize schema");
    Arc::new(repo)
}

fn create_request(id: AccountId, balance: &str) -> CreateAccountRequest {
    CreateAccountRequest {
        account_id: id,
        initial_balance: balance.to_string(),
    }
}

fn balance_text(repo: &DuckDbRepository, id: AccountId) -> String {
    repo.get_account(id).unwrap().balance.to_string()
}

/// Store wrapper that fails on demand after the rows are locked
struct FaultyStore {
    inner: Arc<DuckDbRepository>,
    fail_record: AtomicBool,
    fail_commit: AtomicBool,
}

impl FaultyStore {
    fn new(inner: Arc<DuckDbRepository>) -> Self {
        Self {
            inner,
            fail_record: AtomicBool::new(false),
            fail_commit: AtomicBool::new(false),
        }
    }
}

impl LedgerStore for FaultyStore {
    type UnitOfWork = DuckDbUnitOfWork;

    fn create_account(&self, account: &Account) -> Result<()> {
        self.inner.create_account(account)
    }

    fn get_account(&self, id: AccountId) -> Result<Account> {
        self.inner.get_account(id)
    }

    fn begin_unit_of_work(&self) -> Result<DuckDbUnitOfWork> {
        self.inner.begin_unit_of_work()
    }

    fn get_account_for_update(&self, id: AccountId, uow: &mut DuckDbUnitOfWork) -> Result<Account> {
        self.inner.get_account_for_update(id, uow)
    }

    fn update_balance(&self, id: AccountId, new_balance: Decimal, uow: &mut DuckDbUnitOfWork) -> Result<()> {
        self.inner.update_balance(id, new_balance, uow)
    }

    fn record_transfer(&self, record: &TransferRecord, uow: &mut DuckDbUnitOfWork) -> Result<()> {
        if self.fail_record.load(Ordering::SeqCst) {
            return Err(Error::storage("injected failure writing transfer"));
        }
        self.inner.record_transfer(record, uow)
    }

    fn commit(&self, uow: DuckDbUnitOfWork) -> Result<()> {
        if self.fail_commit.load(Ordering::SeqCst) {
            // Dropping the unit of work discards its writes
            drop(uow);
            return Err(Error::storage("injected failure at commit"));
        }
        self.inner.commit(uow)
    }

    fn abort(&self, uow: DuckDbUnitOfWork) {
        self.inner.abort(uow)
    }
}

// ============================================================================
// End-to-end scenario
// ============================================================================

#[test]
fn test_account_and_transfer_scenario() {
    let temp_dir = TempDir::new().unwrap();
    let repo = create_test_repo(&temp_dir);
    let accounts = AccountService::new(Arc::clone(&repo));
    let transfers = TransferService::new(Arc::clone(&repo));

    // Create account 1
    let account = accounts.create_account(&create_request(1, "100.00")).unwrap();
    assert_eq!(
        AccountView::from(&account),
        AccountView { account_id: 1, balance: "100.00".to_string() }
    );

    // Duplicate create is a client error and changes nothing
    let err = accounts.create_account(&create_request(1, "5.00")).unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(1)));
    assert_eq!(err.class(), ErrorClass::Client);
    assert_eq!(balance_text(&repo, 1), "100.00");

    // Transfer to a missing account
    let err = transfers.transfer(&TransferRequest::new(1, 2, "30.00")).unwrap_err();
    assert_eq!(err.to_string(), "Account not found: 2");
    assert_eq!(err.class(), ErrorClass::NotFound);
    assert_eq!(balance_text(&repo, 1), "100.00");

    accounts.create_account(&create_request(2, "0.00")).unwrap();

    // Insufficient funds
    let err = transfers.transfer(&TransferRequest::new(1, 2, "150.00")).unwrap_err();
    assert!(matches!(err, Error::InsufficientBalance { account_id: 1, .. }));
    assert_eq!(err.class(), ErrorClass::Client);
    assert_eq!(balance_text(&repo, 1), "100.00");
    assert_eq!(balance_text(&repo, 2), "0.00");
    assert_eq!(repo.count_transfers().unwrap(), 0);

    // Successful transfer
    let record = transfers.transfer(&TransferRequest::new(1, 2, "40.00")).unwrap();
    assert_eq!(record.amount, dec!(40.00));
    assert_eq!(balance_text(&repo, 1), "60.00");
    assert_eq!(balance_text(&repo, 2), "40.00");
    assert_eq!(repo.count_transfers().unwrap(), 1);

    let status = StatusService::new(Arc::clone(&repo)).get_status().unwrap();
    assert_eq!(status.total_funds, "100.00");
    assert!(DoctorService::new(repo).run_checks().unwrap().healthy);
}

#[test]
fn test_committed_state_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();

    {
        let repo = create_test_repo(&temp_dir);
        let accounts = AccountService::new(Arc::clone(&repo));
        accounts.create_account(&create_request(10, "12.50")).unwrap();
        accounts.create_account(&create_request(20, "0")).unwrap();
        TransferService::new(repo)
            .transfer(&TransferRequest::new(10, 20, "2.25"))
            .unwrap();
    }

    let repo = create_test_repo(&temp_dir);
    assert_eq!(balance_text(&repo, 10), "10.25");
    assert_eq!(balance_text(&repo, 20), "2.25");
    assert_eq!(repo.count_transfers().unwrap(), 1);
}

#[test]
fn test_context_uses_settings_file() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join("settings.json"),
        r#"{"database": {"file": "books.duckdb"}}"#,
    )
    .unwrap();

    let ctx = LedgerContext::new(temp_dir.path()).unwrap();
    ctx.account_service
        .create_account(&create_request(1, "1.00"))
        .unwrap();

    assert!(temp_dir.path().join("books.duckdb").exists());
    assert_eq!(ctx.status_service.get_status().unwrap().total_accounts, 1);
}

#[test]
fn test_context_with_preloaded_config() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.db_filename = "preloaded.duckdb".to_string();
    config.lock_timeout = Duration::from_millis(150);

    let ctx = LedgerContext::with_config(temp_dir.path(), config).unwrap();
    assert!(temp_dir.path().join("preloaded.duckdb").exists());
    assert_eq!(ctx.config.lock_timeout, Duration::from_millis(150));

    // The configured timeout bounds lock waits
    let repo = &ctx.repository;
    repo.create_account(&Account::new(1, dec!(5))).unwrap();
    let mut held = repo.begin_unit_of_work().unwrap();
    repo.get_account_for_update(1, &mut held).unwrap();

    let start = Instant::now();
    let mut other = repo.begin_unit_of_work().unwrap();
    assert!(matches!(repo.get_account_for_update(1, &mut other), Err(Error::Storage(_))));
    assert!(start.elapsed() >= Duration::from_millis(150));
}

// ============================================================================
// Atomicity under injected faults
// ============================================================================

fn faulty_setup(temp_dir: &TempDir) -> (Arc<DuckDbRepository>, Arc<FaultyStore>) {
    let repo = create_test_repo(temp_dir);
    repo.create_account(&Account::new(1, dec!(100))).unwrap();
    repo.create_account(&Account::new(2, dec!(50))).unwrap();
    let store = Arc::new(FaultyStore::new(Arc::clone(&repo)));
    (repo, store)
}

#[test]
fn test_failure_recording_transfer_leaves_no_trace() {
    let temp_dir = TempDir::new().unwrap();
    let (repo, store) = faulty_setup(&temp_dir);
    let transfers = TransferService::new(Arc::clone(&store));

    store.fail_record.store(true, Ordering::SeqCst);
    let err = transfers.transfer(&TransferRequest::new(1, 2, "30")).unwrap_err();
    assert!(matches!(err, Error::Storage(_)));

    assert_eq!(repo.get_account(1).unwrap().balance, dec!(100));
    assert_eq!(repo.get_account(2).unwrap().balance, dec!(50));
    assert_eq!(repo.count_transfers().unwrap(), 0);

    // Locks were released, so the next transfer goes through
    store.fail_record.store(false, Ordering::SeqCst);
    transfers.transfer(&TransferRequest::new(1, 2, "30")).unwrap();
    assert_eq!(repo.get_account(1).unwrap().balance, dec!(70));
    assert_eq!(repo.get_account(2).unwrap().balance, dec!(80));
}

#[test]
fn test_failure_at_commit_leaves_no_trace() {
    let temp_dir = TempDir::new().unwrap();
    let (repo, store) = faulty_setup(&temp_dir);
    let transfers = TransferService::new(Arc::clone(&store));

    store.fail_commit.store(true, Ordering::SeqCst);
    let err = transfers.transfer(&TransferRequest::new(2, 1, "50")).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Internal);

    assert_eq!(repo.get_account(1).unwrap().balance, dec!(100));
    assert_eq!(repo.get_account(2).unwrap().balance, dec!(50));
    assert_eq!(repo.count_transfers().unwrap(), 0);

    store.fail_commit.store(false, Ordering::SeqCst);
    transfers.transfer(&TransferRequest::new(2, 1, "50")).unwrap();
    assert_eq!(repo.get_account(2).unwrap().balance, Decimal::ZERO);
}
