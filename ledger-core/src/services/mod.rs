//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case.

mod account;
mod doctor;
pub mod migration;
mod status;
mod transfer;

pub use account::AccountService;
pub use doctor::{CheckResult, DoctorResult, DoctorService};
pub use migration::{MigrationResult, MigrationService};
pub use status::{StatusService, StatusSummary};
pub use transfer::TransferService;
