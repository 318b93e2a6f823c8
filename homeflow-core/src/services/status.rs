//! Status service - account and transaction summaries

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::adapters::duckdb::DuckDbRepository;

/// Status service for ledger summaries
pub struct StatusService {
    repository: Arc<DuckDbRepository>,
}

impl StatusService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Get overall status summary
    pub fn get_status(&self) -> Result<StatusSummary> {
        let accounts = self.repository.get_accounts()?;
        let transaction_count = self.repository.get_transaction_count()?;
        let transfer_count = self.repository.get_transfer_count()?;
        let date_range = self.repository.get_transaction_date_range()?;

        Ok(StatusSummary {
            total_accounts: accounts.len() as i64,
            total_transactions: transaction_count,
            total_transfers: transfer_count,
            accounts: accounts
                .into_iter()
                .map(|a| AccountSummary {
                    id: a.id.to_string(),
                    name: a.name,
                    account_type: a.account_type,
                    owner: a.owner,
                })
                .collect(),
            date_range,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub total_accounts: i64,
    pub total_transactions: i64,
    pub total_transfers: i64,
    pub accounts: Vec<AccountSummary>,
    pub date_range: DateRange,
}

#[derive(Debug, Serialize)]
pub struct AccountSummary {
    pub id: String,
    pub name: String,
    pub account_type: Option<String>,
    pub owner: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DateRange {
    pub earliest: Option<String>,
    pub latest: Option<String>,
}
