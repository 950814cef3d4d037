use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Workspace configuration loaded from autoshift.toml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AutoshiftConfig {
    /// Ledger storage
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Run option overrides layered over schema options
    #[serde(default)]
    pub run: RunConfig,
}

/// Ledger configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Ledger directory, relative to the workspace unless absolute
    #[serde(default = "default_ledger_dir")]
    pub dir: PathBuf,

    /// Keep every written record under history/
    #[serde(default)]
    pub keep_history: bool,
}

/// Run configuration; unset fields fall back to the schema's options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RunConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
}

fn default_ledger_dir() -> PathBuf {
    PathBuf::from(".autoshift/ledger")
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            dir: default_ledger_dir(),
            keep_history: false,
        }
    }
}


pub mod loader;
pub mod validation;

pub use loader::ConfigLoader;
pub use validation::ConfigValidator;
