//! Transfer service - moves funds between two accounts atomically
//!
//! One call is one unit of work: both rows are locked in ascending id order,
//! the source balance is checked, both balances and the transfer record are
//! staged, and the unit of work commits. Every failure after the unit of work
//! opens aborts it, so a transfer either fully happens or leaves no trace.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::domain::result::{Error, Result};
use crate::domain::{parse_amount, AccountId, TransferPhase, TransferRecord, TransferRequest};
use crate::ports::LedgerStore;

/// Order in which a pair of rows is locked, independent of transfer direction
fn lock_order(a: AccountId, b: AccountId) -> (AccountId, AccountId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// The transfer engine. Holds no state beyond the store handle.
pub struct TransferService<S: LedgerStore> {
    store: Arc<S>,
}

impl<S: LedgerStore> TransferService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Execute one transfer and return the committed record
    pub fn transfer(&self, request: &TransferRequest) -> Result<TransferRecord> {
        let span = tracing::info_span!(
            "transfer",
            source = request.source_account_id,
            destination = request.destination_account_id,
        );
        let _entered = span.enter();

        let mut phase = TransferPhase::Validating;
        tracing::trace!(%phase);

        // Checked before parsing so a self-transfer is always reported as such
        if request.source_account_id == request.destination_account_id {
            return Err(Error::SameAccount);
        }
        let amount = parse_amount(&request.amount)?;

        let mut uow = self.store.begin_unit_of_work()?;
        let record = match self.stage(request, amount, &mut uow, &mut phase) {
            Ok(record) => record,
            Err(err) => {
                self.store.abort(uow);
                log_abort(phase, &err);
                return Err(err);
            }
        };

        phase = TransferPhase::Committing;
        tracing::trace!(%phase);
        if let Err(err) = self.store.commit(uow) {
            log_abort(phase, &err);
            return Err(err);
        }

        tracing::trace!(phase = %TransferPhase::Committed);
        tracing::info!(transfer_id = %record.id, amount = %record.amount, "transfer committed");
        Ok(record)
    }

    /// Lock, check and stage. Leaves committing or aborting to the caller.
    fn stage(
        &self,
        request: &TransferRequest,
        amount: Decimal,
        uow: &mut S::UnitOfWork,
        phase: &mut TransferPhase,
    ) -> Result<TransferRecord> {
        *phase = TransferPhase::Locking;
        tracing::trace!(%phase);
        let (first_id, second_id) =
            lock_order(request.source_account_id, request.destination_account_id);
        let first = self.store.get_account_for_update(first_id, uow)?;
        let second = self.store.get_account_for_update(second_id, uow)?;
        let (source, destination) = if first.id == request.source_account_id {
            (first, second)
        } else {
            (second, first)
        };

        *phase = TransferPhase::Checking;
        tracing::trace!(%phase);
        if source.balance < amount {
            return Err(Error::InsufficientBalance {
                account_id: source.id,
                available: source.balance,
                requested: amount,
            });
        }

        *phase = TransferPhase::Mutating;
        tracing::trace!(%phase);
        let new_source = source.balance - amount;
        let new_destination = destination.balance.checked_add(amount).ok_or_else(|| {
            Error::InvalidAmount(format!(
                "crediting {} overflows the balance of account {}",
                amount, destination.id
            ))
        })?;

        self.store.update_balance(source.id, new_source, uow)?;
        self.store.update_balance(destination.id, new_destination, uow)?;

        let record = TransferRecord::new(source.id, destination.id, amount);
        self.store.record_transfer(&record, uow)?;
        Ok(record)
    }
}

fn log_abort(phase: TransferPhase, err: &Error) {
    tracing::warn!(
        failed_in = %phase,
        phase = %TransferPhase::Aborted,
        error = %err,
        "transfer aborted"
    );
}
