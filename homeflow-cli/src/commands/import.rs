//! Import command - import transactions from a ledger export CSV

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use dialoguer::Confirm;

use super::get_context;
use crate::output;

pub fn run(file: &Path, preview: bool, yes: bool, json: bool) -> Result<()> {
    let ctx = get_context()?;

    // Appending to a ledger that already has data deserves a second look;
    // dedup makes a re-import safe, but a different file will mix in
    if !preview && !yes && !json {
        let existing = ctx.repository.get_transaction_count()?;
        if existing > 0 {
            output::warning(&format!("Ledger already contains {} transactions.", existing));
            let proceed = Confirm::new()
                .with_prompt("Append this file (already-imported rows are skipped)?")
                .default(true)
                .interact()?;
            if !proceed {
                println!("Import cancelled");
                return Ok(());
            }
        }
    }

    let result = ctx.import_service.import(file, preview)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if preview {
        println!("{}", "Import preview (no changes applied)".bold());
        println!();
        if let Some(transactions) = &result.transactions {
            let mut table = output::create_table();
            table.set_header(vec!["Date", "Amount", "Kind", "Description"]);
            for tx in transactions {
                table.add_row(vec![
                    tx.date.clone(),
                    tx.amount.clone(),
                    tx.kind.clone(),
                    tx.description.clone().unwrap_or_default(),
                ]);
            }
            println!("{}", table);
            println!();
        }
    } else {
        output::success(&format!("Imported {} transactions", result.imported));
    }

    println!("  Batch: {}", result.batch_id);
    println!("  Discovered: {}", result.discovered);
    println!("  New accounts: {}", result.accounts_created);
    if result.duplicates > 0 {
        println!("  Already imported: {}", result.duplicates);
    }
    if result.skipped > 0 {
        output::warning(&format!("  Skipped (unparseable): {}", result.skipped));
    }

    Ok(())
}
