//! Account service - opening accounts and reading balances

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::domain::result::{Error, Result};
use crate::domain::{parse_decimal, Account, AccountId, CreateAccountRequest};
use crate::ports::LedgerStore;

pub struct AccountService<S: LedgerStore> {
    store: Arc<S>,
}

impl<S: LedgerStore> AccountService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Open an account and return it as stored
    pub fn create_account(&self, request: &CreateAccountRequest) -> Result<Account> {
        let initial_balance = parse_decimal(&request.initial_balance).ok_or_else(|| {
            Error::invalid_input(format!(
                "initial balance is not a decimal: {:?}",
                request.initial_balance
            ))
        })?;
        if initial_balance < Decimal::ZERO {
            return Err(Error::invalid_input(format!(
                "initial balance cannot be negative: {}",
                initial_balance
            )));
        }

        self.store
            .create_account(&Account::new(request.account_id, initial_balance))?;
        tracing::info!(
            account_id = request.account_id,
            balance = %initial_balance,
            "account created"
        );

        self.store.get_account(request.account_id)
    }

    pub fn get_account(&self, id: AccountId) -> Result<Account> {
        self.store.get_account(id)
    }
}
