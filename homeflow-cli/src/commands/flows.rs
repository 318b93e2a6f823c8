//! Flows command - directed transfer flows between accounts

use anyhow::Result;
use chrono::NaiveDate;
use colored::Colorize;

use super::get_context;
use crate::output;

pub fn run(start_date: Option<&str>, end_date: Option<&str>, json: bool) -> Result<()> {
    let start = parse_date_arg(start_date, "start_date")?;
    let end = parse_date_arg(end_date, "end_date")?;

    let ctx = get_context()?;
    let report = ctx.flow_service.transfer_flows(start, end)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "data": report }))?
        );
        return Ok(());
    }

    if report.transfers.is_empty() {
        println!("No transfer flows in the selected range.");
        return Ok(());
    }

    println!("{}", "Transfer Flows".bold());
    println!();

    let currency = &ctx.config.currency;
    let mut table = output::create_table();
    table.set_header(vec!["From", "To", "Total", "Transfers"]);
    for flow in &report.transfers {
        table.add_row(vec![
            flow.source_account_name.clone(),
            flow.destination_account_name.clone(),
            output::format_amount(flow.total_amount, currency),
            flow.transfer_count.to_string(),
        ]);
    }

    println!("{}", table);

    Ok(())
}

fn parse_date_arg(value: Option<&str>, name: &str) -> Result<Option<NaiveDate>> {
    match value {
        Some(s) => {
            let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|_| anyhow::anyhow!("Invalid {} format. Use YYYY-MM-DD", name))?;
            Ok(Some(date))
        }
        None => Ok(None),
    }
}
