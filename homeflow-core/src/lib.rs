//! Homeflow Core - Business logic for home finance reporting
//!
//! This crate implements the core domain logic:
//!
//! - **domain**: Core business entities (Account, Transaction)
//! - **services**: Business logic orchestration (flows, import, status)
//! - **adapters**: Concrete implementations (DuckDB ledger store)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod migrations;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use adapters::duckdb::DuckDbRepository;
use config::Config;
use services::*;

// Re-export commonly used types at crate root
pub use adapters::duckdb::QueryResult;
pub use domain::result::Error;
pub use domain::{Account, Transaction, TransactionKind};
pub use services::{TransferFlow, TransferFlowReport};

/// Main context for Homeflow operations
///
/// This is the primary entry point for all business logic. It holds
/// the database connection, configuration, and all services.
pub struct HomeflowContext {
    pub config: Config,
    pub repository: Arc<DuckDbRepository>,
    pub status_service: StatusService,
    pub flow_service: FlowService,
    pub import_service: ImportService,
    pub query_service: QueryService,
}

impl HomeflowContext {
    /// Create a new Homeflow context
    pub fn new(homeflow_dir: &Path) -> Result<Self> {
        let config = Config::load(homeflow_dir)?;

        let db_path = homeflow_dir.join("homeflow.duckdb");
        let repository = Arc::new(DuckDbRepository::new(&db_path)?);

        // Initialize schema
        repository.ensure_schema()?;

        // Create services
        let status_service = StatusService::new(Arc::clone(&repository));
        let flow_service = FlowService::new(Arc::clone(&repository));
        let import_service = ImportService::new(Arc::clone(&repository));
        let query_service = QueryService::new(Arc::clone(&repository));

        Ok(Self {
            config,
            repository,
            status_service,
            flow_service,
            import_service,
            query_service,
        })
    }
}
