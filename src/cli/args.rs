use clap::Args;
use std::path::PathBuf;

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Schema document (YAML or JSON) describing the pipeline
    #[arg(value_name = "SCHEMA")]
    pub schema: PathBuf,

    /// Workspace root holding autoshift.toml and the ledger (default: current directory)
    #[arg(long, value_name = "PATH")]
    pub workspace: Option<PathBuf>,

    /// Ledger directory override (default: <workspace>/.autoshift/ledger)
    #[arg(long, value_name = "DIR")]
    pub ledger: Option<PathBuf>,

    /// Transform and validate every batch without submitting
    #[arg(long)]
    pub dry_run: bool,

    /// Maximum number of batches processed at once
    #[arg(long, value_name = "N", help_heading = "Run Overrides")]
    pub concurrency: Option<usize>,

    /// Retries per batch after the first attempt
    #[arg(long, value_name = "N", help_heading = "Run Overrides")]
    pub max_retries: Option<u32>,

    /// Emit either terminal-friendly text or machine-readable JSON
    #[arg(long, default_value = "text", value_name = "FORMAT", help_heading = "Output Options")]
    pub format: OutputFormat,

    /// Keep the console free of log output; only the report is printed
    #[arg(long, short, help_heading = "Output Options")]
    pub quiet: bool,
}

#[derive(Args, Clone, Debug)]
pub struct ValidateArgs {
    /// Schema document to load, validate and resolve
    #[arg(value_name = "SCHEMA")]
    pub schema: PathBuf,

    /// Workspace root used to resolve file-backed components
    #[arg(long, value_name = "PATH")]
    pub workspace: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
pub struct StatusArgs {
    /// Workspace root holding autoshift.toml and the ledger
    #[arg(long, value_name = "PATH")]
    pub workspace: Option<PathBuf>,

    /// Ledger directory override
    #[arg(long, value_name = "DIR")]
    pub ledger: Option<PathBuf>,

    #[arg(long, default_value = "text", value_name = "FORMAT")]
    pub format: OutputFormat,
}

#[derive(Args, Clone, Debug)]
pub struct ComponentsArgs {
    #[arg(long, default_value = "text", value_name = "FORMAT")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, clap::ValueEnum, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// JSON payload suitable for downstream tooling
    Json,
}
