//! Core domain entities
//!
//! Plain data structures with validation logic. No I/O lives here.

mod account;
pub mod result;
mod transfer;

pub use account::{parse_decimal, Account, AccountId, AccountView, CreateAccountRequest};
pub use transfer::{parse_amount, TransferPhase, TransferRecord, TransferRequest};
