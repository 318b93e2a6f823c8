//! New command - create new records

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::Subcommand;
use dialoguer::Input;
use rust_decimal::Decimal;
use uuid::Uuid;

use homeflow_core::domain::{Account, Transaction, TransactionKind};

use super::get_context;
use crate::output;

#[derive(Subcommand)]
pub enum NewCommands {
    /// Add a manual account
    Account {
        /// Account name
        #[arg(long)]
        name: Option<String>,
        /// Account type (checking, savings, credit_card, ...)
        #[arg(long)]
        account_type: Option<String>,
        /// Household member the account belongs to
        #[arg(long)]
        owner: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add a manual transaction
    Transaction {
        /// Account ID
        #[arg(long)]
        account_id: Option<String>,
        /// Signed amount (negative = money leaving the account)
        #[arg(long)]
        amount: Option<String>,
        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
        /// Kind: income, expense or transfer
        #[arg(long, default_value = "transfer")]
        kind: String,
        /// Description
        #[arg(long)]
        description: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: NewCommands) -> Result<()> {
    match command {
        NewCommands::Account {
            name,
            account_type,
            owner,
            json,
        } => run_account(name, account_type, owner, json),
        NewCommands::Transaction {
            account_id,
            amount,
            date,
            kind,
            description,
            json,
        } => run_transaction(account_id, amount, date, &kind, description, json),
    }
}

fn run_account(
    name: Option<String>,
    account_type: Option<String>,
    owner: Option<String>,
    json: bool,
) -> Result<()> {
    let ctx = get_context()?;

    let name = match name {
        Some(n) => n,
        None => Input::new().with_prompt("Account name").interact_text()?,
    };

    let mut account = Account::new(Uuid::new_v4(), name);
    account.account_type = account_type;
    account.owner = owner;
    account.currency = ctx.config.currency.clone();
    account.is_manual = true;
    account
        .validate()
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    ctx.repository.upsert_account(&account)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "account_id": account.id.to_string(),
                "name": account.name,
            }))?
        );
    } else {
        output::success("Account created");
        println!("  ID: {}", account.id);
        println!("  Name: {}", account.name);
    }

    Ok(())
}

fn run_transaction(
    account_id: Option<String>,
    amount: Option<String>,
    date: Option<String>,
    kind: &str,
    description: Option<String>,
    json: bool,
) -> Result<()> {
    let ctx = get_context()?;

    let account_id = match account_id {
        Some(id) => id,
        None => Input::new().with_prompt("Account ID").interact_text()?,
    };

    let account = ctx
        .repository
        .get_account_by_id(&account_id)?
        .ok_or_else(|| anyhow::anyhow!("Account not found: {}", account_id))?;

    let amount_str = match amount {
        Some(a) => a,
        None => Input::new().with_prompt("Amount").interact_text()?,
    };
    let amount: Decimal = amount_str
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid amount"))?;

    let date = match date {
        Some(d) => NaiveDate::parse_from_str(&d, "%Y-%m-%d")
            .map_err(|_| anyhow::anyhow!("Invalid date format. Use YYYY-MM-DD"))?,
        None => Utc::now().date_naive(),
    };

    let kind = TransactionKind::parse(kind)
        .ok_or_else(|| anyhow::anyhow!("Invalid kind. Use income, expense or transfer"))?;

    let mut tx = Transaction::new(Uuid::new_v4(), account.id, amount, date, kind);
    tx.description = description;
    tx.is_manual = true;

    ctx.repository.upsert_transaction(&tx)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "transaction_id": tx.id.to_string(),
                "account_id": account.id.to_string(),
                "amount": tx.amount.to_string(),
                "date": tx.transaction_date.to_string(),
                "kind": tx.kind.as_str(),
            }))?
        );
    } else {
        output::success("Transaction created");
        println!("  ID: {}", tx.id);
        println!("  Account: {}", account.name);
        println!("  Amount: {}", tx.amount);
        println!("  Date: {}", tx.transaction_date);
        println!("  Kind: {}", tx.kind.as_str());
    }

    Ok(())
}
