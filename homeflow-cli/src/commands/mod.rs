//! CLI command implementations

pub mod flows;
pub mod import;
pub mod new;
pub mod query;
pub mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};
use homeflow_core::HomeflowContext;

/// Get the homeflow directory from environment or default
pub fn get_homeflow_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("HOMEFLOW_DIR") {
        PathBuf::from(dir)
    } else {
        dirs::home_dir()
            .expect("Could not find home directory")
            .join(".homeflow")
    }
}

/// Get or create homeflow context
pub fn get_context() -> Result<HomeflowContext> {
    let homeflow_dir = get_homeflow_dir();

    // Create directory if it doesn't exist
    std::fs::create_dir_all(&homeflow_dir)
        .with_context(|| format!("Failed to create homeflow directory: {:?}", homeflow_dir))?;

    HomeflowContext::new(&homeflow_dir).context("Failed to initialize homeflow context")
}
