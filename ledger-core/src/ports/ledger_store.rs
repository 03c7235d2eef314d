//! Ledger store port - durable accounts and transfer log

use rust_decimal::Decimal;

use crate::domain::result::Result;
use crate::domain::{Account, AccountId, TransferRecord};

/// Durable storage for accounts and the append-only transfer log.
///
/// Every mutation of an existing account goes through a unit of work
/// obtained from [`LedgerStore::begin_unit_of_work`]. Reads and writes issued
/// through a unit of work are invisible to everyone else until
/// [`LedgerStore::commit`]; [`LedgerStore::abort`] discards them. Dropping a
/// unit of work without committing it must behave exactly like an abort.
pub trait LedgerStore: Send + Sync {
    type UnitOfWork: Send;

    // === Accounts ===

    /// Persist a new account. Fails with `AlreadyExists` on an id collision
    /// and `InvalidInput` on a negative balance.
    fn create_account(&self, account: &Account) -> Result<()>;

    /// Read-only point lookup outside any unit of work
    fn get_account(&self, id: AccountId) -> Result<Account>;

    // === Units of work ===

    fn begin_unit_of_work(&self) -> Result<Self::UnitOfWork>;

    /// Read an account while taking its row lock for the life of `uow`.
    ///
    /// Blocks while another unit of work holds the same row.
    fn get_account_for_update(&self, id: AccountId, uow: &mut Self::UnitOfWork) -> Result<Account>;

    /// Write a new balance for a row already locked by `uow`
    fn update_balance(
        &self,
        id: AccountId,
        new_balance: Decimal,
        uow: &mut Self::UnitOfWork,
    ) -> Result<()>;

    /// Append a transfer record within `uow`
    fn record_transfer(&self, record: &TransferRecord, uow: &mut Self::UnitOfWork) -> Result<()>;

    /// Apply every staged write atomically and release the row locks
    fn commit(&self, uow: Self::UnitOfWork) -> Result<()>;

    /// Discard every staged write and release the row locks
    fn abort(&self, uow: Self::UnitOfWork);
}
