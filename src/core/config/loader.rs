#![allow(clippy::result_large_err)]

use super::AutoshiftConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const CONFIG_FILE_NAME: &str = "autoshift.toml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config from workspace root (workspace/autoshift.toml)
    /// Environment variables override config file values
    pub fn load_from_workspace(workspace_path: &Path) -> Result<AutoshiftConfig, AppError> {
        let config_path = workspace_path.join(CONFIG_FILE_NAME);
        let mut config = Self::load_from_file(&config_path)?.unwrap_or_default();
        Self::apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Load config from specific file path
    /// Returns Ok(None) if file doesn't exist
    pub fn load_from_file(path: &Path) -> Result<Option<AutoshiftConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
        })?;

        let config: AutoshiftConfig = toml::from_str(&content).map_err(|e| {
            AppError::new(
                ErrorCategory::ConfigError,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
        })?;

        Ok(Some(config))
    }

    /// Ledger directory resolved against the workspace
    pub fn ledger_dir(workspace_path: &Path, config: &AutoshiftConfig) -> PathBuf {
        if config.ledger.dir.is_absolute() {
            config.ledger.dir.clone()
        } else {
            workspace_path.join(&config.ledger.dir)
        }
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(config: &mut AutoshiftConfig) {
        if let Ok(dir) = env::var("AUTOSHIFT_LEDGER_DIR") {
            config.ledger.dir = PathBuf::from(dir);
        }
        if let Some(keep) = parse_env::<bool>("AUTOSHIFT_LEDGER_KEEP_HISTORY") {
            config.ledger.keep_history = keep;
        }
        if let Some(concurrency) = parse_env::<usize>("AUTOSHIFT_CONCURRENCY") {
            config.run.concurrency = Some(concurrency);
        }
        if let Some(max_retries) = parse_env::<u32>("AUTOSHIFT_MAX_RETRIES") {
            config.run.max_retries = Some(max_retries);
        }
        if let Some(dry_run) = parse_env::<bool>("AUTOSHIFT_DRY_RUN") {
            config.run.dry_run = Some(dry_run);
        }
    }

    /// Get documentation for supported environment variables
    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "AUTOSHIFT_LEDGER_DIR - Override ledger directory (default: .autoshift/ledger)",
            "AUTOSHIFT_LEDGER_KEEP_HISTORY - Keep per-write ledger history (true/false)",
            "AUTOSHIFT_CONCURRENCY - Override batch concurrency",
            "AUTOSHIFT_MAX_RETRIES - Override retries per batch",
            "AUTOSHIFT_DRY_RUN - Transform and validate without submitting (true/false)",
        ]
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}
