//! Configuration management
//!
//! Settings live in settings.json inside the homeflow directory:
//! ```json
//! {
//!   "app": { "currency": "USD", ... }
//! }
//! ```
//! Fields the CLI doesn't manage are preserved on save.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    app: AppSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppSettings {
    #[serde(default)]
    currency: Option<String>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Homeflow configuration (simplified view of settings)
#[derive(Debug, Clone)]
pub struct Config {
    /// Display currency code for CLI output
    pub currency: String,
    // Keep the raw settings for preservation when saving
    _raw_settings: SettingsFile,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            _raw_settings: SettingsFile::default(),
        }
    }
}

impl Config {
    /// Load config from the homeflow directory
    ///
    /// The display currency can be set via:
    /// 1. Settings file
    /// 2. Environment variable HOMEFLOW_CURRENCY (for CI/testing)
    pub fn load(homeflow_dir: &Path) -> Result<Self> {
        let settings_path = homeflow_dir.join("settings.json");

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str(&content).unwrap_or_default()
        } else {
            SettingsFile::default()
        };

        let currency = std::env::var("HOMEFLOW_CURRENCY")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| raw.app.currency.clone())
            .unwrap_or_else(|| "USD".to_string());

        Ok(Self {
            currency: currency.trim().to_uppercase(),
            _raw_settings: raw,
        })
    }

    /// Save config to the homeflow directory
    /// Preserves other settings that the CLI doesn't manage
    pub fn save(&self, homeflow_dir: &Path) -> Result<()> {
        let settings_path = homeflow_dir.join("settings.json");

        // Load existing settings to preserve fields we don't manage
        let mut settings = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str::<SettingsFile>(&content).unwrap_or_default()
        } else {
            SettingsFile::default()
        };

        // Update only the fields we manage
        settings.app.currency = Some(self.currency.clone());

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)?;
        Ok(())
    }
}
