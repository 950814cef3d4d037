pub mod args;
pub mod commands;

pub use args::{ComponentsArgs, OutputFormat, RunArgs, StatusArgs, ValidateArgs};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
COMMANDS:\n{subcommands}\n";

#[derive(Parser)]
#[command(name = "autoshift")]
#[command(version = crate::VERSION)]
#[command(about = "Run large-scale automated code changes as resumable batches")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Typical flow: validate a schema, run it (optionally with --dry-run), then inspect the ledger with status."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(
        about = "Execute a schema against the workspace",
        long_about = "Run enumerates items, batches them, and transforms, validates and submits each batch. Batches already submitted according to the ledger are skipped.",
        after_help = "Example:\n    autoshift run schema.yaml --concurrency 8 --dry-run"
    )]
    Run(RunArgs),
    #[command(
        about = "Check that a schema loads and resolves",
        after_help = "Example:\n    autoshift validate schema.yaml"
    )]
    Validate(ValidateArgs),
    #[command(
        about = "List ledger records",
        long_about = "Status prints every batch outcome persisted in the ledger.",
        after_help = "Example:\n    autoshift status --ledger .autoshift/ledger --format json"
    )]
    Status(StatusArgs),
    #[command(about = "List registered component names per role")]
    Components(ComponentsArgs),
}

impl Command {
    /// Workspace root named on the command line, if any.
    pub fn workspace(&self) -> Option<PathBuf> {
        match self {
            Command::Run(args) => args.workspace.clone(),
            Command::Validate(args) => args.workspace.clone(),
            Command::Status(args) => args.workspace.clone(),
            Command::Components(_) => None,
        }
    }
}

/// Dispatch a parsed command; `Ok(false)` means the run finished with failed batches.
pub async fn run(args: Args, cancel: CancellationToken) -> crate::Result<bool> {
    match args.command {
        Command::Run(run_args) => commands::run(run_args, cancel).await,
        Command::Validate(validate_args) => commands::validate(validate_args).await,
        Command::Status(status_args) => commands::status(status_args).await,
        Command::Components(components_args) => commands::components(components_args).await,
    }
}
