//! Ledger Core - Business logic for a concurrent two-account transfer ledger
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core business entities (Account, TransferRecord, errors)
//! - **ports**: Trait definitions for external dependencies (LedgerStore)
//! - **services**: Business logic orchestration (accounts, transfers, status)
//! - **adapters**: Concrete implementations (DuckDB, row locks)

pub mod domain;
pub mod ports;
pub mod services;
pub mod adapters;
pub mod config;
pub mod migrations;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use adapters::duckdb::DuckDbRepository;
use config::Config;
use services::*;

// Re-export commonly used types at crate root
pub use domain::{Account, AccountView, CreateAccountRequest, TransferRecord, TransferRequest};
pub use domain::result::{Error, ErrorClass};

/// Main context for ledger operations
///
/// This is the primary entry point for all business logic. It holds
/// the store, configuration, and all services.
pub struct LedgerContext {
    pub config: Config,
    pub repository: Arc<DuckDbRepository>,
    pub account_service: AccountService<DuckDbRepository>,
    pub transfer_service: TransferService<DuckDbRepository>,
    pub status_service: StatusService,
    pub doctor_service: DoctorService,
}

impl LedgerContext {
    /// Create a new ledger context
    pub fn new(ledger_dir: &Path) -> Result<Self> {
        let config = Config::load(ledger_dir)?;
        Self::with_config(ledger_dir, config)
    }

    /// Create a context from an already loaded config
    pub fn with_config(ledger_dir: &Path, config: Config) -> Result<Self> {
        let db_path = config.db_path(ledger_dir);
        let repository = Arc::new(
            DuckDbRepository::new(&db_path)?.with_lock_timeout(config.lock_timeout),
        );

        // Initialize schema
        repository.ensure_schema()?;

        // Create services
        let account_service = AccountService::new(Arc::clone(&repository));
        let transfer_service = TransferService::new(Arc::clone(&repository));
        let status_service = StatusService::new(Arc::clone(&repository));
        let doctor_service = DoctorService::new(Arc::clone(&repository));

        Ok(Self {
            config,
            repository,
            account_service,
            transfer_service,
            status_service,
            doctor_service,
        })
    }
}
