//! Status command - show ledger status and summary

use anyhow::Result;
use colored::Colorize;

use super::get_context;
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let status = ctx.status_service.get_status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "Ledger Status".bold());
    println!();

    let mut table = output::create_table();
    table.add_row(vec!["Accounts", &status.total_accounts.to_string()]);
    table.add_row(vec!["Transactions", &status.total_transactions.to_string()]);
    table.add_row(vec!["Transfers", &status.total_transfers.to_string()]);

    println!("{}", table);
    println!();

    if let (Some(earliest), Some(latest)) = (&status.date_range.earliest, &status.date_range.latest)
    {
        println!("Date range: {} to {}", earliest, latest);
        println!();
    }

    if !status.accounts.is_empty() {
        println!("{}", "Accounts".bold());
        for account in &status.accounts {
            match &account.owner {
                Some(owner) => println!("  • {} ({})", account.name, owner),
                None => println!("  • {}", account.name),
            }
        }
    }

    Ok(())
}
