use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::generation::OrchestratorSettings;

/// Application configuration loaded from environment variables.
/// Every variable has a default except the optional data service settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub template_dir: PathBuf,
    pub mapping_dir: PathBuf,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub default_provider: String,
    /// Registers the HTTP data provider when set.
    pub data_service_url: Option<String>,
    pub data_service_token: Option<String>,
    pub fetch_timeout_secs: Option<u64>,
    pub render_timeout_secs: Option<u64>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or_default = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        Ok(Config {
            port: or_default("PORT", "8080")
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: or_default("RUST_LOG", "info"),
            template_dir: or_default("TEMPLATE_DIR", "templates").into(),
            mapping_dir: or_default("MAPPING_DIR", "mappings").into(),
            data_dir: or_default("DATA_DIR", "data").into(),
            output_dir: or_default("OUTPUT_DIR", "output").into(),
            default_provider: or_default("DEFAULT_PROVIDER", "file"),
            data_service_url: var("DATA_SERVICE_URL"),
            data_service_token: var("DATA_SERVICE_TOKEN"),
            fetch_timeout_secs: parse_secs(var("FETCH_TIMEOUT_SECS"), "FETCH_TIMEOUT_SECS")?,
            render_timeout_secs: parse_secs(var("RENDER_TIMEOUT_SECS"), "RENDER_TIMEOUT_SECS")?,
        })
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            default_provider: self.default_provider.clone(),
            fetch_timeout: self.fetch_timeout_secs.map(Duration::from_secs),
            render_timeout: self.render_timeout_secs.map(Duration::from_secs),
        }
    }
}

fn parse_secs(raw: Option<String>, key: &str) -> Result<Option<u64>> {
    raw.map(|v| {
        v.trim()
            .parse::<u64>()
            .with_context(|| format!("{key} must be a whole number of seconds"))
    })
    .transpose()
}
