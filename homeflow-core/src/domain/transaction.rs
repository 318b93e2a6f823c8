//! Transaction domain model

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category tag of a transaction, from the `transaction_type` column of the
/// ledger export. Only `Transfer` records participate in flow matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
    Transfer,
}

impl TransactionKind {
    /// Parse a kind from the export's `transaction_type` value.
    /// Matching is case-insensitive; unknown values yield None so the
    /// caller can skip the row instead of failing the whole import.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "income" => Some(Self::Income),
            "expense" => Some(Self::Expense),
            "transfer" => Some(Self::Transfer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Transfer => "transfer",
        }
    }
}

/// A single financial transaction belonging to an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: Uuid,
    /// Signed amount: negative = money leaving the account,
    /// positive = money entering it
    pub amount: Decimal,
    pub description: Option<String>,
    pub category: Option<String>,
    pub transaction_date: NaiveDate,
    pub kind: TransactionKind,
    /// Transaction identifier carried by the ledger export (e.g. "TXN00042").
    /// Used for re-import protection.
    pub external_id: Option<String>,
    /// Which import batch this transaction belongs to
    pub import_batch_id: Option<String>,
    /// True if this transaction was manually created by the user
    pub is_manual: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new transaction with required fields
    pub fn new(
        id: Uuid,
        account_id: Uuid,
        amount: Decimal,
        transaction_date: NaiveDate,
        kind: TransactionKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            account_id,
            amount,
            description: None,
            category: None,
            transaction_date,
            kind,
            external_id: None,
            import_batch_id: None,
            is_manual: false,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!(TransactionKind::parse("Transfer"), Some(TransactionKind::Transfer));
        assert_eq!(TransactionKind::parse("  INCOME "), Some(TransactionKind::Income));
        assert_eq!(TransactionKind::parse("expense"), Some(TransactionKind::Expense));
        assert_eq!(TransactionKind::parse("refund"), None);
        assert_eq!(TransactionKind::parse(""), None);
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            TransactionKind::Income,
            TransactionKind::Expense,
            TransactionKind::Transfer,
        ] {
            assert_eq!(TransactionKind::parse(kind.as_str()), Some(kind));
        }
    }
}
