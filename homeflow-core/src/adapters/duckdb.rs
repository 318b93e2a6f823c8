//! DuckDB repository implementation

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use duckdb::{params, params_from_iter, Connection};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use sqlparser::dialect::DuckDbDialect;
use sqlparser::parser::Parser;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{Account, Transaction, TransactionKind};
use crate::services::MigrationService;

impl From<duckdb::Error> for Error {
    fn from(e: duckdb::Error) -> Self {
        Error::Database(e.to_string())
    }
}

/// Validate SQL syntax before execution to catch malformed queries early.
/// This prevents crashes from malformed SQL reaching the database engine.
fn validate_sql_syntax(sql: &str) -> Result<()> {
    let dialect = DuckDbDialect {};
    Parser::parse_sql(&dialect, sql).map_err(|e| {
        // Clean up the error message - remove redundant prefix
        let msg = e.to_string();
        let cleaned = msg.trim_start_matches("sql parser error: ").to_string();
        Error::Validation(cleaned)
    })?;
    Ok(())
}

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// DuckDB repository implementation
///
/// Owns the ledger database: accounts and transactions, queryable by date
/// range for the flow engine.
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl DuckDbRepository {
    /// Create a new DuckDB repository
    ///
    /// Includes retry logic with exponential backoff for file locking errors,
    /// which can occur when multiple CLI invocations try to access the
    /// database simultaneously.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: db_path.to_path_buf(),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        // Exponential backoff: 50ms, 100ms, 200ms, 400ms
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        eprintln!(
                            "[homeflow] Database busy, retrying in {}ms (attempt {}/{}): {}",
                            delay.as_millis(),
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    // Non-retryable error or max retries reached
                    return Err(e);
                }
            }
        }

        // Should only reach here if all retries failed
        Err(last_error.unwrap_or_else(|| {
            Error::database(format!("Failed to open database after {} retries", MAX_RETRIES))
        }))
    }

    /// Attempt to open a database connection (called by new() with retry logic)
    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // IMPORTANT: Disable extension autoloading to avoid macOS code signing issues
        // (cached extensions in ~/.duckdb/extensions may have different Team IDs)
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_with_flags(db_path, config)?;
        Ok(conn)
    }

    /// Run database migrations using the MigrationService
    ///
    /// Returns the migration result showing what was applied.
    pub fn ensure_schema(&self) -> Result<crate::services::MigrationResult> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))?;
        MigrationService::new(&conn)
            .run_pending()
            .map_err(|e| Error::database(e.to_string()))
    }

    /// Get the path to the database file
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // === Account operations ===

    pub fn upsert_account(&self, account: &Account) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| Error::database(e.to_string()))?;
        conn.execute(
            "INSERT INTO sys_accounts (account_id, name, account_type, owner, currency,
                                       external_id, is_manual, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (account_id) DO UPDATE SET
                name = EXCLUDED.name,
                account_type = COALESCE(EXCLUDED.account_type, sys_accounts.account_type),
                owner = COALESCE(EXCLUDED.owner, sys_accounts.owner),
                currency = EXCLUDED.currency,
                external_id = COALESCE(EXCLUDED.external_id, sys_accounts.external_id),
                is_manual = sys_accounts.is_manual,
                updated_at = EXCLUDED.updated_at",
            params![
                account.id.to_string(),
                account.name,
                account.account_type,
                account.owner,
                account.currency,
                account.external_id,
                account.is_manual,
                account.created_at.to_rfc3339(),
                account.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.conn.lock().map_err(|e| Error::database(e.to_string()))?;
        let mut stmt = conn.prepare(
            "SELECT account_id, name, account_type, owner, currency, external_id,
                    is_manual, created_at, updated_at
             FROM sys_accounts
             ORDER BY name, account_id",
        )?;

        let accounts = stmt
            .query_map([], |row| Ok(row_to_account(row)))?
            .filter_map(|r| r.ok().flatten())
            .collect();

        Ok(accounts)
    }

    pub fn get_account_by_id(&self, id: &str) -> Result<Option<Account>> {
        let conn = self.conn.lock().map_err(|e| Error::database(e.to_string()))?;
        let mut stmt = conn.prepare(
            "SELECT account_id, name, account_type, owner, currency, external_id,
                    is_manual, created_at, updated_at
             FROM sys_accounts WHERE account_id = ?",
        )?;

        let account = stmt
            .query_row([id], |row| Ok(row_to_account(row)))
            .ok()
            .flatten();

        Ok(account)
    }

    /// Get an account by the identifier the ledger export carries
    /// (used to match incoming rows to existing accounts on re-import)
    pub fn get_account_by_external_id(&self, external_id: &str) -> Result<Option<Account>> {
        let conn = self.conn.lock().map_err(|e| Error::database(e.to_string()))?;
        let mut stmt = conn.prepare(
            "SELECT account_id, name, account_type, owner, currency, external_id,
                    is_manual, created_at, updated_at
             FROM sys_accounts WHERE external_id = ?",
        )?;

        let account = stmt
            .query_row([external_id], |row| Ok(row_to_account(row)))
            .ok()
            .flatten();

        Ok(account)
    }

    pub fn get_account_count(&self) -> Result<i64> {
        let conn = self.conn.lock().map_err(|e| Error::database(e.to_string()))?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sys_accounts", [], |row| row.get(0))?;
        Ok(count)
    }

    // === Transaction operations ===

    pub fn upsert_transaction(&self, tx: &Transaction) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| Error::database(e.to_string()))?;
        conn.execute(
            "INSERT INTO sys_transactions (transaction_id, account_id, amount, description,
                                           category, transaction_date, kind, external_id,
                                           import_batch_id, is_manual, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (transaction_id) DO UPDATE SET
                account_id = EXCLUDED.account_id,
                amount = EXCLUDED.amount,
                description = EXCLUDED.description,
                category = EXCLUDED.category,
                transaction_date = EXCLUDED.transaction_date,
                kind = EXCLUDED.kind,
                external_id = COALESCE(EXCLUDED.external_id, sys_transactions.external_id),
                import_batch_id = COALESCE(EXCLUDED.import_batch_id, sys_transactions.import_batch_id),
                is_manual = sys_transactions.is_manual,
                updated_at = EXCLUDED.updated_at",
            params![
                tx.id.to_string(),
                tx.account_id.to_string(),
                tx.amount.to_string().parse::<f64>().unwrap_or(0.0),
                tx.description,
                tx.category,
                tx.transaction_date.to_string(),
                tx.kind.as_str(),
                tx.external_id,
                tx.import_batch_id,
                tx.is_manual,
                tx.created_at.to_rfc3339(),
                tx.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_transactions(&self) -> Result<Vec<Transaction>> {
        let conn = self.conn.lock().map_err(|e| Error::database(e.to_string()))?;
        // amount::VARCHAR keeps the DECIMAL exact - reading it as f64 would
        // reintroduce float drift into Decimal math downstream
        let mut stmt = conn.prepare(
            "SELECT transaction_id, account_id, amount::VARCHAR, description, category,
                    transaction_date::VARCHAR, kind, external_id, import_batch_id,
                    is_manual, created_at, updated_at
             FROM sys_transactions
             ORDER BY transaction_date, created_at, transaction_id",
        )?;

        let transactions = stmt
            .query_map([], |row| Ok(row_to_transaction(row)))?
            .filter_map(|r| r.ok().flatten())
            .collect();

        Ok(transactions)
    }

    /// Get transfer-kind transactions within an inclusive date range.
    ///
    /// Either bound may be absent. Rows come back in a stable order
    /// (date, then insertion time, then id) so the flow engine's FIFO
    /// matching is reproducible across runs.
    pub fn get_transfer_transactions(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn.lock().map_err(|e| Error::database(e.to_string()))?;

        let mut sql = String::from(
            "SELECT transaction_id, account_id, amount::VARCHAR, description, category,
                    transaction_date::VARCHAR, kind, external_id, import_batch_id,
                    is_manual, created_at, updated_at
             FROM sys_transactions
             WHERE kind = 'transfer'",
        );
        let mut bounds: Vec<String> = Vec::new();
        if let Some(start) = start_date {
            sql.push_str(" AND transaction_date >= ?");
            bounds.push(start.to_string());
        }
        if let Some(end) = end_date {
            sql.push_str(" AND transaction_date <= ?");
            bounds.push(end.to_string());
        }
        sql.push_str(" ORDER BY transaction_date, created_at, transaction_id");

        let mut stmt = conn.prepare(&sql)?;
        let transactions = stmt
            .query_map(params_from_iter(bounds.iter()), |row| {
                Ok(row_to_transaction(row))
            })?
            .filter_map(|r| r.ok().flatten())
            .collect();

        Ok(transactions)
    }

    /// Check if a transaction exists by the export's transaction id (indexed, fast)
    pub fn transaction_exists_by_external_id(&self, external_id: &str) -> Result<bool> {
        let conn = self.conn.lock().map_err(|e| Error::database(e.to_string()))?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sys_transactions WHERE external_id = ?",
            params![external_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_transaction_count(&self) -> Result<i64> {
        let conn = self.conn.lock().map_err(|e| Error::database(e.to_string()))?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM sys_transactions", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn get_transfer_count(&self) -> Result<i64> {
        let conn = self.conn.lock().map_err(|e| Error::database(e.to_string()))?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sys_transactions WHERE kind = 'transfer'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn get_transaction_date_range(&self) -> Result<crate::services::DateRange> {
        let conn = self.conn.lock().map_err(|e| Error::database(e.to_string()))?;
        let result: (Option<String>, Option<String>) = conn.query_row(
            "SELECT
                MIN(transaction_date)::VARCHAR,
                MAX(transaction_date)::VARCHAR
             FROM sys_transactions",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(crate::services::DateRange {
            earliest: result.0,
            latest: result.1,
        })
    }

    // === Query operations ===

    pub fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        // Validate it's a read-only query by checking SQL statement type
        let sql_trimmed = sql.trim();
        let first_word = sql_trimmed
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_uppercase();
        if first_word != "SELECT" && first_word != "WITH" {
            return Err(Error::validation("Only SELECT queries are allowed"));
        }

        // Also block dangerous operations even in subqueries
        let sql_upper = sql.to_uppercase();
        // Use word boundaries to avoid false positives (deleted_at vs DELETE)
        let dangerous_patterns = [
            " INSERT ", " UPDATE ", " DROP ", " CREATE ", " ALTER ", " TRUNCATE ",
            "\nINSERT ", "\nUPDATE ", "\nDROP ", "\nCREATE ", "\nALTER ", "\nTRUNCATE ",
            "(INSERT ", "(UPDATE ", "(DROP ", "(CREATE ", "(ALTER ", "(TRUNCATE ",
        ];
        for pattern in dangerous_patterns {
            if sql_upper.contains(pattern) {
                return Err(Error::validation("Only SELECT queries are allowed"));
            }
        }

        validate_sql_syntax(sql)?;

        let conn = self.conn.lock().map_err(|e| Error::database(e.to_string()))?;
        let mut stmt = conn.prepare(sql)?;

        let mut result_rows = stmt.query([])?;

        // Collect all rows first
        let mut rows: Vec<Vec<serde_json::Value>> = Vec::new();
        let mut column_count = 0;

        while let Some(row) = result_rows.next()? {
            // Get column count from the first row
            if rows.is_empty() {
                column_count = row.as_ref().column_count();
            }

            let mut row_values: Vec<serde_json::Value> = Vec::new();
            for i in 0..column_count {
                row_values.push(column_value(row, i));
            }
            rows.push(row_values);
        }

        // Drop result_rows to release borrow on stmt
        drop(result_rows);

        let columns: Vec<String> = {
            let count = if column_count > 0 {
                column_count
            } else {
                stmt.column_count()
            };
            (0..count)
                .map(|i| {
                    stmt.column_name(i)
                        .map(|s| s.to_string())
                        .unwrap_or_else(|_| format!("col{}", i))
                })
                .collect()
        };

        let row_count = rows.len();

        Ok(QueryResult {
            columns,
            rows,
            row_count,
        })
    }
}

/// Result of a SQL query
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
}

/// Map a single column value to JSON for query output
fn column_value(row: &duckdb::Row, idx: usize) -> serde_json::Value {
    use duckdb::types::ValueRef;

    // Use get_ref to get the raw ValueRef, which handles all types
    match row.get_ref(idx) {
        Ok(ValueRef::Null) => serde_json::Value::Null,
        Ok(ValueRef::Boolean(b)) => serde_json::Value::Bool(b),
        Ok(ValueRef::TinyInt(i)) => serde_json::json!(i),
        Ok(ValueRef::SmallInt(i)) => serde_json::json!(i),
        Ok(ValueRef::Int(i)) => serde_json::json!(i),
        Ok(ValueRef::BigInt(i)) => serde_json::json!(i),
        Ok(ValueRef::HugeInt(i)) => serde_json::json!(i.to_string()),
        Ok(ValueRef::UTinyInt(i)) => serde_json::json!(i),
        Ok(ValueRef::USmallInt(i)) => serde_json::json!(i),
        Ok(ValueRef::UInt(i)) => serde_json::json!(i),
        Ok(ValueRef::UBigInt(i)) => serde_json::json!(i),
        Ok(ValueRef::Float(f)) => serde_json::json!(f),
        Ok(ValueRef::Double(f)) => serde_json::json!(f),
        Ok(ValueRef::Decimal(d)) => {
            // Convert Decimal to f64 for JSON compatibility
            match d.to_f64() {
                Some(f) => serde_json::json!(f),
                None => serde_json::Value::String(d.to_string()), // Fallback for very large decimals
            }
        }
        Ok(ValueRef::Text(bytes)) => {
            serde_json::Value::String(String::from_utf8_lossy(bytes).to_string())
        }
        Ok(ValueRef::Blob(bytes)) => {
            serde_json::Value::String(format!("<blob {} bytes>", bytes.len()))
        }
        Ok(ValueRef::Date32(d)) => {
            // Days since epoch
            let date = NaiveDate::from_ymd_opt(1970, 1, 1)
                .map(|epoch| epoch + chrono::Duration::days(d as i64));
            match date {
                Some(date) => serde_json::Value::String(date.to_string()),
                None => serde_json::Value::Null,
            }
        }
        Ok(ValueRef::Timestamp(_, ts)) => {
            // Microseconds since epoch
            let dt = DateTime::from_timestamp_micros(ts)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_else(|| ts.to_string());
            serde_json::Value::String(dt)
        }
        _ => serde_json::Value::Null,
    }
}

// Row mapping helpers
//
// A row that fails to produce a well-formed record is skipped rather than
// failing the whole read; one bad row must not deny the report.

fn row_to_account(row: &duckdb::Row) -> Option<Account> {
    // Column indices from SELECT:
    // 0: account_id, 1: name, 2: account_type, 3: owner, 4: currency,
    // 5: external_id, 6: is_manual, 7: created_at, 8: updated_at
    let id_str: String = row.get(0).ok()?;
    let created_str: String = row.get(7).unwrap_or_default();
    let updated_str: String = row.get(8).unwrap_or_default();

    Some(Account {
        id: Uuid::parse_str(&id_str).ok()?,
        name: row.get(1).ok()?,
        account_type: row.get::<_, Option<String>>(2).ok().flatten(),
        owner: row.get::<_, Option<String>>(3).ok().flatten(),
        currency: row.get(4).unwrap_or_else(|_| "USD".to_string()),
        external_id: row.get::<_, Option<String>>(5).ok().flatten(),
        is_manual: row.get(6).unwrap_or(false),
        created_at: parse_timestamp(&created_str),
        updated_at: parse_timestamp(&updated_str),
    })
}

fn row_to_transaction(row: &duckdb::Row) -> Option<Transaction> {
    // Column indices from SELECT:
    // 0: transaction_id, 1: account_id, 2: amount, 3: description, 4: category,
    // 5: transaction_date, 6: kind, 7: external_id, 8: import_batch_id,
    // 9: is_manual, 10: created_at, 11: updated_at
    let id_str: String = row.get(0).ok()?;
    let account_id_str: String = row.get(1).ok()?;
    let amount_str: String = row.get(2).ok()?;
    let date_str: String = row.get(5).ok()?;
    let kind_str: String = row.get(6).ok()?;
    let created_str: String = row.get(10).unwrap_or_default();
    let updated_str: String = row.get(11).unwrap_or_default();

    Some(Transaction {
        id: Uuid::parse_str(&id_str).ok()?,
        account_id: Uuid::parse_str(&account_id_str).ok()?,
        amount: Decimal::from_str_exact(&amount_str).ok()?,
        description: row.get::<_, Option<String>>(3).ok().flatten(),
        category: row.get::<_, Option<String>>(4).ok().flatten(),
        transaction_date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").ok()?,
        kind: TransactionKind::parse(&kind_str)?,
        external_id: row.get::<_, Option<String>>(7).ok().flatten(),
        import_batch_id: row.get::<_, Option<String>>(8).ok().flatten(),
        is_manual: row.get(9).unwrap_or(false),
        created_at: parse_timestamp(&created_str),
        updated_at: parse_timestamp(&updated_str),
    })
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_error_detection() {
        assert!(is_retryable_error("IO Error: database is locked"));
        assert!(is_retryable_error("The file is being used by another process"));
        assert!(!is_retryable_error("Catalog Error: table does not exist"));
    }

    #[test]
    fn test_sql_syntax_validation() {
        assert!(validate_sql_syntax("SELECT 1").is_ok());
        assert!(validate_sql_syntax("SELECT * FROM sys_transactions WHERE kind = 'transfer'").is_ok());
        assert!(validate_sql_syntax("SELEC * FORM nope").is_err());
    }
}
