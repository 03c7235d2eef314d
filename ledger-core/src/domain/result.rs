//! Result and error types for the core library

use rust_decimal::Decimal;
use thiserror::Error;

use super::account::AccountId;

/// Core library error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Account already exists: {0}")]
    AlreadyExists(AccountId),

    #[error("Account not found: {0}")]
    NotFound(AccountId),

    #[error("Source and destination accounts must be different")]
    SameAccount,

    #[error("Insufficient balance in account {account_id}: available {available}, requested {requested}")]
    InsufficientBalance {
        account_id: AccountId,
        available: Decimal,
        requested: Decimal,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification a boundary layer maps onto its own status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The caller sent something wrong and can retry with corrected input
    Client,
    NotFound,
    Internal,
}

impl Error {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Error::InvalidInput(_)
            | Error::InvalidAmount(_)
            | Error::AlreadyExists(_)
            | Error::SameAccount
            | Error::InsufficientBalance { .. } => ErrorClass::Client,
            Error::NotFound(_) => ErrorClass::NotFound,
            Error::Storage(_) | Error::Io(_) | Error::Json(_) => ErrorClass::Internal,
        }
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;
