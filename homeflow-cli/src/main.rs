//! Homeflow CLI - Home finance reporting in your terminal

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{flows, import, new, query, status};

/// Homeflow - home finance reporting in your terminal
#[derive(Parser)]
#[command(name = "hf", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show ledger status and summary
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show directed transfer flows between accounts
    Flows {
        /// Lower bound, inclusive (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<String>,
        /// Upper bound, inclusive (YYYY-MM-DD)
        #[arg(long)]
        end_date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Import transactions from a ledger export CSV
    Import {
        /// Path to CSV file
        file: PathBuf,
        /// Preview without importing
        #[arg(long)]
        preview: bool,
        /// Skip confirmation prompt
        #[arg(long, short)]
        yes: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Execute SQL query against the database
    Query {
        /// SQL query to execute
        sql: Option<String>,
        /// Read SQL from file
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Output format
        #[arg(long, default_value = "table")]
        format: String,
        /// Output as JSON (shorthand for --format json)
        #[arg(long)]
        json: bool,
    },

    /// Create new records
    New {
        #[command(subcommand)]
        command: new::NewCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = run(cli);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Status { json } => status::run(json),
        Commands::Flows {
            start_date,
            end_date,
            json,
        } => flows::run(start_date.as_deref(), end_date.as_deref(), json),
        Commands::Import {
            file,
            preview,
            yes,
            json,
        } => import::run(&file, preview, yes, json),
        Commands::Query {
            sql,
            file,
            format,
            json,
        } => {
            let fmt = if json { "json".to_string() } else { format };
            query::run(sql.as_deref(), file.as_deref(), &fmt)
        }
        Commands::New { command } => new::run(command),
    }
}
