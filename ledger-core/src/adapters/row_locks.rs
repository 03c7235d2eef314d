//! Per-account row locks
//!
//! A lock table keyed by account id. A unit of work takes a row by calling
//! [`RowLockTable::acquire`] and keeps the returned guard until it commits or
//! aborts; dropping the guard frees the row and wakes any waiters.

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::domain::result::{Error, Result};
use crate::domain::AccountId;

#[derive(Default)]
pub struct RowLockTable {
    held: Mutex<HashSet<AccountId>>,
    released: Condvar,
}

impl RowLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock on `id`, waiting at most `timeout` for the current holder.
    ///
    /// Not re-entrant: a caller that already holds `id` will wait on itself.
    pub fn acquire(self: &Arc<Self>, id: AccountId, timeout: Duration) -> Result<RowLockGuard> {
        let deadline = Instant::now() + timeout;
        let mut held = self.lock_held()?;

        while held.contains(&id) {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::storage(format!(
                    "timed out after {}ms waiting for lock on account {}",
                    timeout.as_millis(),
                    id
                )));
            }
            let (guard, _) = self
                .released
                .wait_timeout(held, deadline - now)
                .map_err(|e| Error::storage(format!("Lock poisoned: {}", e)))?;
            held = guard;
        }

        held.insert(id);
        Ok(RowLockGuard {
            table: Arc::clone(self),
            account_id: id,
        })
    }

    /// Whether some unit of work currently holds `id`
    #[cfg(test)]
    pub(crate) fn is_locked(&self, id: AccountId) -> bool {
        self.held
            .lock()
            .map(|held| held.contains(&id))
            .unwrap_or(false)
    }

    fn lock_held(&self) -> Result<MutexGuard<'_, HashSet<AccountId>>> {
        self.held
            .lock()
            .map_err(|e| Error::storage(format!("Lock poisoned: {}", e)))
    }

    fn release(&self, id: AccountId) {
        // Releasing must work even after a panic elsewhere poisoned the table
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&id);
        drop(held);
        self.released.notify_all();
    }
}

/// Exclusive hold on one account row; released on drop
pub struct RowLockGuard {
    table: Arc<RowLockTable>,
    account_id: AccountId,
}

impl RowLockGuard {
    pub fn account_id(&self) -> AccountId {
        self.account_id
    }
}

impl Drop for RowLockGuard {
    fn drop(&mut self) {
        self.table.release(self.account_id);
    }
}
