//! Import service - ledger export CSV import
//!
//! Reads the home-finance transaction export (one row per transaction,
//! accounts denormalized onto each row) and loads it into the ledger.
//! Re-importing the same file is a no-op: rows are deduplicated by the
//! export's transaction id.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{Account, Transaction, TransactionKind};
use crate::adapters::duckdb::DuckDbRepository;

/// Import service for ledger export CSVs
pub struct ImportService {
    repository: Arc<DuckDbRepository>,
}

impl ImportService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Import transactions from a ledger export CSV
    ///
    /// Required columns: transaction_id, transaction_date, account_id,
    /// account_name, amount, transaction_type. Rows that fail to parse are
    /// counted as skipped, never fatal. Accounts are created on first
    /// sight, keyed by the export's account_id.
    pub fn import(&self, file_path: &Path, preview_only: bool) -> Result<ImportResult> {
        let mut reader = csv::Reader::from_path(file_path).context("Failed to read CSV file")?;

        let headers = reader.headers()?.clone();
        let col = |name: &str| headers.iter().position(|h| h == name);

        let tx_id_idx = col("transaction_id").context("transaction_id column not found")?;
        let date_idx = col("transaction_date").context("transaction_date column not found")?;
        let account_id_idx = col("account_id").context("account_id column not found")?;
        let account_name_idx = col("account_name").context("account_name column not found")?;
        let amount_idx = col("amount").context("amount column not found")?;
        let kind_idx = col("transaction_type").context("transaction_type column not found")?;

        // Optional columns
        let account_type_idx = col("account_type");
        let owner_idx = col("account_owner");
        let desc_idx = col("description");
        let category_idx = col("category");

        // Accounts seen in this file, keyed by the export's account id.
        // Existing accounts are reused (and their name refreshed); new ones
        // are created in memory and only written if this is not a preview.
        let mut accounts: HashMap<String, Account> = HashMap::new();
        let mut created_accounts = 0i64;

        let mut transactions = Vec::new();
        let mut skipped = 0i64;

        for result in reader.records() {
            let record = match result {
                Ok(r) => r,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            };

            let external_id = record.get(tx_id_idx).unwrap_or("").trim();
            if external_id.is_empty() {
                skipped += 1;
                continue;
            }

            let Some(date) = parse_date(record.get(date_idx).unwrap_or("")) else {
                skipped += 1;
                continue;
            };

            let Some(amount) = parse_amount(record.get(amount_idx).unwrap_or("")) else {
                skipped += 1;
                continue;
            };

            let Some(kind) = TransactionKind::parse(record.get(kind_idx).unwrap_or("")) else {
                skipped += 1;
                continue;
            };

            let export_account_id = record.get(account_id_idx).unwrap_or("").trim().to_string();
            let account_name = record.get(account_name_idx).unwrap_or("").trim().to_string();
            if export_account_id.is_empty() || account_name.is_empty() {
                skipped += 1;
                continue;
            }

            if !accounts.contains_key(&export_account_id) {
                let existing = self
                    .repository
                    .get_account_by_external_id(&export_account_id)?;
                let account = match existing {
                    Some(mut a) => {
                        a.name = account_name.clone();
                        a.updated_at = Utc::now();
                        a
                    }
                    None => {
                        created_accounts += 1;
                        let mut a = Account::new(Uuid::new_v4(), account_name.clone());
                        a.external_id = Some(export_account_id.clone());
                        a.account_type = account_type_idx
                            .and_then(|i| record.get(i))
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(str::to_string);
                        a.owner = owner_idx
                            .and_then(|i| record.get(i))
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(str::to_string);
                        a
                    }
                };
                accounts.insert(export_account_id.clone(), account);
            }
            let Some(account) = accounts.get(&export_account_id) else {
                skipped += 1;
                continue;
            };

            let mut tx = Transaction::new(Uuid::new_v4(), account.id, amount, date, kind);
            tx.external_id = Some(external_id.to_string());
            tx.description = desc_idx
                .and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            tx.category = category_idx
                .and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);

            transactions.push(tx);
        }

        // Valid rows before deduplication
        let discovered = transactions.len() as i64;

        // Generate batch ID for this import
        let batch_id = format!("import_{}", Utc::now().format("%Y%m%d_%H%M%S"));

        // Deduplicate against previously imported rows by the export's id
        let mut new_transactions = Vec::new();
        let mut duplicate_count = 0i64;

        for mut tx in transactions {
            if let Some(external_id) = tx.external_id.as_deref() {
                if self.repository.transaction_exists_by_external_id(external_id)? {
                    duplicate_count += 1;
                    continue;
                }
            }
            tx.import_batch_id = Some(batch_id.clone());
            new_transactions.push(tx);
        }

        let imported = new_transactions.len() as i64;

        if !preview_only {
            for account in accounts.values() {
                self.repository.upsert_account(account)?;
            }
            for tx in &new_transactions {
                self.repository.upsert_transaction(tx)?;
            }
        }

        Ok(ImportResult {
            batch_id,
            discovered,
            imported,
            accounts_created: created_accounts,
            duplicates: duplicate_count,
            skipped,
            preview: preview_only,
            transactions: if preview_only {
                Some(
                    new_transactions
                        .iter()
                        .map(|t| TransactionPreview {
                            date: t.transaction_date.to_string(),
                            amount: t.amount.to_string(),
                            kind: t.kind.as_str().to_string(),
                            description: t.description.clone(),
                        })
                        .collect(),
                )
            } else {
                None
            },
        })
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    // Try common formats
    let formats = [
        "%Y-%m-%d",
        "%m/%d/%Y",
        "%d/%m/%Y",
        "%m-%d-%Y",
        "%d-%m-%Y",
        "%Y/%m/%d",
    ];

    for fmt in &formats {
        if let Ok(date) = NaiveDate::parse_from_str(s.trim(), fmt) {
            return Some(date);
        }
    }
    None
}

fn parse_amount(s: &str) -> Option<Decimal> {
    let s = s.trim();

    // Handle parentheses notation for negative numbers: (100.00) -> -100.00
    let (is_negative, s) = if s.starts_with('(') && s.ends_with(')') {
        (true, &s[1..s.len() - 1])
    } else {
        (false, s)
    };

    // Remove currency symbols, commas, whitespace
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    let mut amount: Decimal = cleaned.parse().ok()?;

    // Apply parentheses negation
    if is_negative && amount > Decimal::ZERO {
        amount = -amount;
    }

    Some(amount)
}

#[derive(Debug, Serialize)]
pub struct ImportResult {
    /// Unique batch ID for this import
    pub batch_id: String,
    /// Valid transactions discovered in the CSV
    pub discovered: i64,
    /// Successfully imported transactions
    pub imported: i64,
    /// Accounts created on first sight
    pub accounts_created: i64,
    /// Rows already present from an earlier import
    pub duplicates: i64,
    /// Rows that failed to parse
    pub skipped: i64,
    /// Whether this was a preview (no changes applied)
    pub preview: bool,
    /// Transaction previews (only in preview mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transactions: Option<Vec<TransactionPreview>>,
}

#[derive(Debug, Serialize)]
pub struct TransactionPreview {
    pub date: String,
    pub amount: String,
    pub kind: String,
    pub description: Option<String>,
}
