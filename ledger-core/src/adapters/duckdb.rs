//! DuckDB ledger store implementation
//!
//! Accounts and transfers live in two tables. Decimal values are stored as
//! their canonical text so nothing ever round-trips through a binary float.
//!
//! Row locking is done in-process by a [`RowLockTable`]: a unit of work locks
//! each account it reads for update, stages its writes in memory and applies
//! them in a single DuckDB transaction on commit. Because the row stays
//! locked from the read until after the commit, the value it read is still
//! the latest committed value when the write lands.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use chrono::Utc;
use duckdb::{params, Connection};
use rust_decimal::Decimal;

use super::row_locks::{RowLockGuard, RowLockTable};
use crate::domain::result::{Error, Result};
use crate::domain::{parse_decimal, Account, AccountId, TransferRecord};
use crate::ports::LedgerStore;
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// How long a unit of work waits for a row lock unless configured otherwise
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

/// Parse a decimal column; a value that fails here means the file was edited
/// by something other than this store.
fn parse_stored_decimal(text: &str, column: &str) -> Result<Decimal> {
    parse_decimal(text)
        .ok_or_else(|| Error::storage(format!("corrupt {} value in database: {:?}", column, text)))
}

/// DuckDB ledger store
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    row_locks: Arc<RowLockTable>,
    lock_timeout: Duration,
    next_unit_of_work: AtomicU64,
}

impl DuckDbRepository {
    /// Open (or create) a database file
    ///
    /// Includes retry logic with exponential backoff for file locking errors,
    /// which show up when another process has the file open.
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => return Ok(Self::from_connection(conn)),
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            max_retries = MAX_RETRIES,
                            error = %err_msg,
                            "database busy, retrying"
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow!("Failed to open database after {} retries", MAX_RETRIES)))
    }

    /// Open a throwaway in-memory database
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_in_memory_with_flags(config)?;
        Ok(Self::from_connection(conn))
    }

    fn try_open_connection(db_path: &Path) -> anyhow::Result<Connection> {
        // Autoloading would reach for cached extensions we never use
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            row_locks: Arc::new(RowLockTable::new()),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            next_unit_of_work: AtomicU64::new(1),
        }
    }

    /// Bound how long a unit of work waits for a contended row
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Run database migrations using the MigrationService
    pub fn run_migrations(&self) -> anyhow::Result<MigrationResult> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;
        let migration_service = MigrationService::new(&conn);
        migration_service.run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> anyhow::Result<()> {
        let result = self.run_migrations()?;
        if !result.applied.is_empty() {
            tracing::info!(applied = ?result.applied, "applied migrations");
        }
        Ok(())
    }

    /// Embedded migrations not yet recorded in `sys_migrations`
    pub fn pending_migrations(&self) -> Result<Vec<String>> {
        let conn = self.lock_conn()?;
        MigrationService::new(&conn)
            .get_pending()
            .map_err(|e| Error::storage(format!("cannot read migration state: {:#}", e)))
    }

    #[cfg(test)]
    pub(crate) fn execute_for_test(&self, sql: &str) {
        self.conn.lock().unwrap().execute_batch(sql).unwrap();
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::storage(format!("Lock poisoned: {}", e)))
    }

    fn read_account(conn: &Connection, id: AccountId) -> Result<Option<Account>> {
        let mut stmt =
            conn.prepare("SELECT account_id, balance FROM ledger_accounts WHERE account_id = ?")?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => {
                let balance: String = row.get(1)?;
                Ok(Some(Account {
                    id: row.get(0)?,
                    balance: parse_stored_decimal(&balance, "balance")?,
                }))
            }
            None => Ok(None),
        }
    }

    // === Read-only queries for status and doctor ===

    /// All accounts, ordered by id
    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.lock_conn()?;
        let mut stmt =
            conn.prepare("SELECT account_id, balance FROM ledger_accounts ORDER BY account_id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, AccountId>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut accounts = Vec::new();
        for row in rows {
            let (id, balance) = row?;
            accounts.push(Account {
                id,
                balance: parse_stored_decimal(&balance, "balance")?,
            });
        }
        Ok(accounts)
    }

    pub fn count_transfers(&self) -> Result<i64> {
        let conn = self.lock_conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM ledger_transfers", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Transfer ids whose source or destination account does not exist
    pub fn check_orphaned_transfers(&self) -> Result<Vec<String>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT t.transfer_id FROM ledger_transfers t
             LEFT JOIN ledger_accounts s ON s.account_id = t.source_account_id
             LEFT JOIN ledger_accounts d ON d.account_id = t.destination_account_id
             WHERE s.account_id IS NULL OR d.account_id IS NULL
             ORDER BY t.transfer_id",
        )?;
        let ids = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(ids.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Transfer ids that move funds from an account to itself
    pub fn check_self_transfers(&self) -> Result<Vec<String>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT transfer_id FROM ledger_transfers
             WHERE source_account_id = destination_account_id
             ORDER BY transfer_id",
        )?;
        let ids = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(ids.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Transfer ids whose stored amount is not a positive decimal
    pub fn check_transfer_amounts(&self) -> Result<Vec<String>> {
        let conn = self.lock_conn()?;
        let mut stmt =
            conn.prepare("SELECT transfer_id, amount FROM ledger_transfers ORDER BY transfer_id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut bad = Vec::new();
        for row in rows {
            let (id, amount) = row?;
            match parse_decimal(&amount) {
                Some(value) if value > Decimal::ZERO => {}
                _ => bad.push(id),
            }
        }
        Ok(bad)
    }

    fn apply_staged(conn: &Connection, uow: &DuckDbUnitOfWork) -> Result<()> {
        for (id, balance) in &uow.staged_balances {
            let updated = conn.execute(
                "UPDATE ledger_accounts SET balance = ? WHERE account_id = ?",
                params![balance.to_string(), *id],
            )?;
            if updated == 0 {
                return Err(Error::NotFound(*id));
            }
        }

        for record in &uow.staged_transfers {
            conn.execute(
                "INSERT INTO ledger_transfers (transfer_id, source_account_id, destination_account_id, amount, recorded_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    record.id.to_string(),
                    record.source_account_id,
                    record.destination_account_id,
                    record.amount.to_string(),
                    record.recorded_at.to_rfc3339(),
                ],
            )?;
        }

        Ok(())
    }
}

/// Unit of work handed out by [`DuckDbRepository`]
///
/// Holds the row locks it has taken and the writes it has staged. Dropping it
/// without a commit releases the locks and forgets the writes.
pub struct DuckDbUnitOfWork {
    id: u64,
    locks: Vec<RowLockGuard>,
    /// Locked rows as this unit of work sees them, staged balances applied
    rows: HashMap<AccountId, Account>,
    staged_balances: BTreeMap<AccountId, Decimal>,
    staged_transfers: Vec<TransferRecord>,
    finished: bool,
}

impl DuckDbUnitOfWork {
    fn new(id: u64) -> Self {
        Self {
            id,
            locks: Vec::new(),
            rows: HashMap::new(),
            staged_balances: BTreeMap::new(),
            staged_transfers: Vec::new(),
            finished: false,
        }
    }

    /// Account ids this unit of work holds, in acquisition order
    pub fn locked_accounts(&self) -> Vec<AccountId> {
        self.locks.iter().map(|guard| guard.account_id()).collect()
    }

    fn has_staged_writes(&self) -> bool {
        !self.staged_balances.is_empty() || !self.staged_transfers.is_empty()
    }
}

impl Drop for DuckDbUnitOfWork {
    fn drop(&mut self) {
        if !self.finished && (self.has_staged_writes() || !self.locks.is_empty()) {
            tracing::debug!(
                unit_of_work = self.id,
                locked = ?self.locked_accounts(),
                "unit of work dropped before commit, discarding staged writes"
            );
        }
    }
}

impl LedgerStore for DuckDbRepository {
    type UnitOfWork = DuckDbUnitOfWork;

    fn create_account(&self, account: &Account) -> Result<()> {
        account.validate().map_err(Error::invalid_input)?;

        let conn = self.lock_conn()?;
        // The connection mutex makes check-then-insert atomic
        if Self::read_account(&conn, account.id)?.is_some() {
            return Err(Error::AlreadyExists(account.id));
        }
        conn.execute(
            "INSERT INTO ledger_accounts (account_id, balance, created_at) VALUES (?, ?, ?)",
            params![account.id, account.balance.to_string(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn get_account(&self, id: AccountId) -> Result<Account> {
        let conn = self.lock_conn()?;
        Self::read_account(&conn, id)?.ok_or(Error::NotFound(id))
    }

    fn begin_unit_of_work(&self) -> Result<DuckDbUnitOfWork> {
        let id = self.next_unit_of_work.fetch_add(1, Ordering::Relaxed);
        Ok(DuckDbUnitOfWork::new(id))
    }

    fn get_account_for_update(&self, id: AccountId, uow: &mut DuckDbUnitOfWork) -> Result<Account> {
        if let Some(account) = uow.rows.get(&id) {
            return Ok(account.clone());
        }

        // Never hold the connection while waiting on a row
        let guard = self.row_locks.acquire(id, self.lock_timeout)?;
        tracing::debug!(unit_of_work = uow.id, account_id = id, "row locked");

        let account = {
            let conn = self.lock_conn()?;
            Self::read_account(&conn, id)?
        };
        // On NotFound the guard drops here and frees the row
        let account = account.ok_or(Error::NotFound(id))?;

        uow.locks.push(guard);
        uow.rows.insert(id, account.clone());
        Ok(account)
    }

    fn update_balance(
        &self,
        id: AccountId,
        new_balance: Decimal,
        uow: &mut DuckDbUnitOfWork,
    ) -> Result<()> {
        if new_balance < Decimal::ZERO {
            return Err(Error::invalid_input(format!(
                "balance for account {} cannot go negative ({})",
                id, new_balance
            )));
        }
        let row = uow.rows.get_mut(&id).ok_or_else(|| {
            Error::storage(format!(
                "account {} is not locked by unit of work {}",
                id, uow.id
            ))
        })?;
        row.balance = new_balance;
        uow.staged_balances.insert(id, new_balance);
        Ok(())
    }

    fn record_transfer(&self, record: &TransferRecord, uow: &mut DuckDbUnitOfWork) -> Result<()> {
        record.validate().map_err(Error::invalid_input)?;
        uow.staged_transfers.push(record.clone());
        Ok(())
    }

    fn commit(&self, mut uow: DuckDbUnitOfWork) -> Result<()> {
        uow.finished = true;
        if !uow.has_staged_writes() {
            return Ok(());
        }

        let mut conn = self.lock_conn()?;
        // Dropping `tx` on an early return rolls everything back
        let tx = conn.transaction()?;
        Self::apply_staged(&tx, &uow)?;
        tx.commit()?;

        tracing::debug!(
            unit_of_work = uow.id,
            balances = uow.staged_balances.len(),
            transfers = uow.staged_transfers.len(),
            "unit of work committed"
        );
        // Row locks are released when `uow` drops, after the commit is durable
        Ok(())
    }

    fn abort(&self, mut uow: DuckDbUnitOfWork) {
        uow.finished = true;
        tracing::debug!(
            unit_of_work = uow.id,
            locked = ?uow.locked_accounts(),
            "unit of work aborted"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn create_test_repo() -> DuckDbRepository {
        let repo = DuckDbRepository::open_in_memory()
            .unwrap()
            .with_lock_timeout(Duration::from_millis(100));
        repo.ensure_schema().unwrap();
        repo
    }

    #[test]
    fn test_create_and_get_account() {
        let repo = create_test_repo();
        repo.create_account(&Account::new(1, dec!(100.00))).unwrap();

        let account = repo.get_account(1).unwrap();
        assert_eq!(account.id, 1);
        assert_eq!(account.balance.to_string(), "100.00");
    }

    #[test]
    fn test_create_duplicate_account() {
        let repo = create_test_repo();
        repo.create_account(&Account::new(1, dec!(100))).unwrap();

        let result = repo.create_account(&Account::new(1, dec!(5)));
        assert!(matches!(result, Err(Error::AlreadyExists(1))));
        // Original row untouched
        assert_eq!(repo.get_account(1).unwrap().balance, dec!(100));
    }

    #[test]
    fn test_create_negative_account() {
        let repo = create_test_repo();
        let result = repo.create_account(&Account::new(1, dec!(-1)));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(matches!(repo.get_account(1), Err(Error::NotFound(1))));
    }

    #[test]
    fn test_get_missing_account() {
        let repo = create_test_repo();
        assert!(matches!(repo.get_account(9), Err(Error::NotFound(9))));
    }

    #[test]
    fn test_staged_writes_invisible_until_commit() {
        let repo = create_test_repo();
        repo.create_account(&Account::new(1, dec!(10))).unwrap();

        let mut uow = repo.begin_unit_of_work().unwrap();
        repo.get_account_for_update(1, &mut uow).unwrap();
        repo.update_balance(1, dec!(3), &mut uow).unwrap();

        // Read-your-writes inside, old value outside
        assert_eq!(repo.get_account_for_update(1, &mut uow).unwrap().balance, dec!(3));
        assert_eq!(repo.get_account(1).unwrap().balance, dec!(10));

        repo.commit(uow).unwrap();
        assert_eq!(repo.get_account(1).unwrap().balance, dec!(3));
    }

    #[test]
    fn test_abort_discards_writes_and_releases_locks() {
        let repo = create_test_repo();
        repo.create_account(&Account::new(1, dec!(10))).unwrap();
        repo.create_account(&Account::new(2, dec!(0))).unwrap();

        let mut uow = repo.begin_unit_of_work().unwrap();
        repo.get_account_for_update(1, &mut uow).unwrap();
        repo.get_account_for_update(2, &mut uow).unwrap();
        repo.update_balance(1, dec!(0), &mut uow).unwrap();
        repo.update_balance(2, dec!(10), &mut uow).unwrap();
        repo.record_transfer(&TransferRecord::new(1, 2, dec!(10)), &mut uow).unwrap();
        repo.abort(uow);

        assert_eq!(repo.get_account(1).unwrap().balance, dec!(10));
        assert_eq!(repo.get_account(2).unwrap().balance, dec!(0));
        assert_eq!(repo.count_transfers().unwrap(), 0);
        assert!(!repo.row_locks.is_locked(1));
        assert!(!repo.row_locks.is_locked(2));
    }

    #[test]
    fn test_dropped_unit_of_work_behaves_like_abort() {
        let repo = create_test_repo();
        repo.create_account(&Account::new(1, dec!(10))).unwrap();

        {
            let mut uow = repo.begin_unit_of_work().unwrap();
            repo.get_account_for_update(1, &mut uow).unwrap();
            repo.update_balance(1, dec!(1), &mut uow).unwrap();
        }

        assert_eq!(repo.get_account(1).unwrap().balance, dec!(10));
        let mut uow = repo.begin_unit_of_work().unwrap();
        assert_eq!(repo.get_account_for_update(1, &mut uow).unwrap().balance, dec!(10));
    }

    #[test]
    fn test_locked_row_blocks_second_unit_of_work() {
        let repo = create_test_repo();
        repo.create_account(&Account::new(1, dec!(10))).unwrap();

        let mut first = repo.begin_unit_of_work().unwrap();
        repo.get_account_for_update(1, &mut first).unwrap();

        let mut second = repo.begin_unit_of_work().unwrap();
        let result = repo.get_account_for_update(1, &mut second);
        assert!(matches!(result, Err(Error::Storage(_))));

        repo.abort(first);
        assert!(repo.get_account_for_update(1, &mut second).is_ok());
    }

    #[test]
    fn test_not_found_releases_row() {
        let repo = create_test_repo();

        let mut uow = repo.begin_unit_of_work().unwrap();
        let result = repo.get_account_for_update(5, &mut uow);
        assert!(matches!(result, Err(Error::NotFound(5))));
        assert!(uow.locked_accounts().is_empty());
        assert!(!repo.row_locks.is_locked(5));
    }

    #[test]
    fn test_update_requires_lock() {
        let repo = create_test_repo();
        repo.create_account(&Account::new(1, dec!(10))).unwrap();

        let mut uow = repo.begin_unit_of_work().unwrap();
        let result = repo.update_balance(1, dec!(5), &mut uow);
        assert!(matches!(result, Err(Error::Storage(_))));
    }

    #[test]
    fn test_update_rejects_negative_balance() {
        let repo = create_test_repo();
        repo.create_account(&Account::new(1, dec!(10))).unwrap();

        let mut uow = repo.begin_unit_of_work().unwrap();
        repo.get_account_for_update(1, &mut uow).unwrap();
        let result = repo.update_balance(1, dec!(-0.01), &mut uow);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_failed_commit_rolls_back_everything() {
        let repo = create_test_repo();
        repo.create_account(&Account::new(1, dec!(10))).unwrap();
        repo.create_account(&Account::new(2, dec!(0))).unwrap();

        // Commit one transfer so its id is taken
        let existing = TransferRecord::new(1, 2, dec!(1));
        let mut uow = repo.begin_unit_of_work().unwrap();
        repo.get_account_for_update(1, &mut uow).unwrap();
        repo.get_account_for_update(2, &mut uow).unwrap();
        repo.update_balance(1, dec!(9), &mut uow).unwrap();
        repo.update_balance(2, dec!(1), &mut uow).unwrap();
        repo.record_transfer(&existing, &mut uow).unwrap();
        repo.commit(uow).unwrap();

        // Reusing the id makes the INSERT fail after both UPDATEs ran
        let mut uow = repo.begin_unit_of_work().unwrap();
        repo.get_account_for_update(1, &mut uow).unwrap();
        repo.get_account_for_update(2, &mut uow).unwrap();
        repo.update_balance(1, dec!(4), &mut uow).unwrap();
        repo.update_balance(2, dec!(6), &mut uow).unwrap();
        repo.record_transfer(&existing, &mut uow).unwrap();
        assert!(matches!(repo.commit(uow), Err(Error::Storage(_))));

        assert_eq!(repo.get_account(1).unwrap().balance, dec!(9));
        assert_eq!(repo.get_account(2).unwrap().balance, dec!(1));
        assert_eq!(repo.count_transfers().unwrap(), 1);
        assert!(!repo.row_locks.is_locked(1));
    }

    #[test]
    fn test_list_accounts_and_counts() {
        let repo = create_test_repo();
        repo.create_account(&Account::new(2, dec!(5.5))).unwrap();
        repo.create_account(&Account::new(1, dec!(1))).unwrap();

        let accounts = repo.list_accounts().unwrap();
        assert_eq!(
            accounts,
            vec![Account::new(1, dec!(1)), Account::new(2, dec!(5.5))]
        );
        assert_eq!(repo.count_transfers().unwrap(), 0);
    }

    #[test]
    fn test_retryable_error_detection() {
        assert!(is_retryable_error("IO Error: database is locked"));
        assert!(is_retryable_error("The process cannot access the file because it is being used by another process"));
        assert!(!is_retryable_error("Catalog Error: Table does not exist"));
    }
}
