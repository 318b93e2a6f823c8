//! Query command - execute SQL queries against the database

use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result};

use super::get_context;
use crate::output;

pub fn run(sql: Option<&str>, file: Option<&Path>, format: &str) -> Result<()> {
    // Get SQL from: argument, file, or stdin
    let sql_content = if let Some(sql) = sql {
        sql.to_string()
    } else if let Some(file_path) = file {
        std::fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read SQL file: {:?}", file_path))?
    } else if atty::isnt(atty::Stream::Stdin) {
        // Read from stdin if not a TTY
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read SQL from stdin")?;
        buffer
    } else {
        anyhow::bail!("No SQL query provided. Use positional argument, --file, or pipe from stdin.");
    };

    let ctx = get_context()?;
    let result = ctx.query_service.execute(&sql_content)?;

    match format {
        "json" => {
            let rows: Vec<serde_json::Value> = result
                .rows
                .iter()
                .map(|row| {
                    let obj: serde_json::Map<String, serde_json::Value> = result
                        .columns
                        .iter()
                        .cloned()
                        .zip(row.iter().cloned())
                        .collect();
                    serde_json::Value::Object(obj)
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        "csv" => {
            println!("{}", result.columns.join(","));
            for row in &result.rows {
                let values: Vec<String> = row.iter().map(value_to_csv).collect();
                println!("{}", values.join(","));
            }
        }
        _ => {
            let mut table = output::create_table();
            table.set_header(&result.columns);

            for row in &result.rows {
                let values: Vec<String> = row.iter().map(value_to_string).collect();
                table.add_row(values);
            }

            println!("{}", table);
            println!();
            println!("{} row(s) returned", result.row_count);
        }
    }

    Ok(())
}

fn value_to_string(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => v.to_string(),
    }
}

fn value_to_csv(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => "".to_string(),
        serde_json::Value::String(s) => {
            if s.contains(',') || s.contains('"') || s.contains('\n') {
                format!("\"{}\"", s.replace('"', "\"\""))
            } else {
                s.clone()
            }
        }
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => v.to_string(),
    }
}
