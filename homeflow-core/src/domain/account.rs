//! Account domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A financial account owned by the household
/// Note: account_type is a freeform string taken from the ledger export.
/// Common values include "checking", "savings", "credit_card", "investment"
/// but any string is accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub account_type: Option<String>,
    /// Household member the account belongs to
    pub owner: Option<String>,
    /// ISO 4217 currency code, normalized to uppercase
    pub currency: String,
    /// Account identifier carried by the ledger export (e.g. "ACC001").
    /// Used to match incoming rows to an existing account on re-import.
    pub external_id: Option<String>,
    /// True if this account was manually created by the user
    pub is_manual: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with required fields
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            account_type: None,
            owner: None,
            currency: "USD".to_string(),
            external_id: None,
            is_manual: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Normalize currency code to uppercase
    pub fn normalize_currency(currency: &str) -> String {
        currency.trim().to_uppercase()
    }

    /// Validate account data
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.name.trim().is_empty() {
            return Err("account name cannot be empty");
        }
        if self.currency.trim().is_empty() {
            return Err("currency cannot be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_normalization() {
        assert_eq!(Account::normalize_currency("usd"), "USD");
        assert_eq!(Account::normalize_currency(" eur "), "EUR");
    }

    #[test]
    fn test_account_validation() {
        let mut account = Account::new(Uuid::new_v4(), "Test Account");
        assert!(account.validate().is_ok());

        account.name = "".to_string();
        assert!(account.validate().is_err());
    }
}
