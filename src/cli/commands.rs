use crate::{
    cli::args::{ComponentsArgs, OutputFormat, RunArgs, StatusArgs, ValidateArgs},
    core::{
        config::{AutoshiftConfig, ConfigLoader, ConfigValidator},
        pipeline::{
            builtins::builtin_registry, ExecutionOptions, FileLedger, Ledger, LedgerRecord,
            Orchestrator, SchemaDocument,
        },
    },
    Result,
};
use anyhow::Context;
use serde_json::json;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Execute a schema; returns whether every batch ended without failure.
pub async fn run(args: RunArgs, cancel: CancellationToken) -> Result<bool> {
    let workspace = resolve_workspace(args.workspace.as_deref())?;
    tracing::info!(workspace = %workspace.display(), schema = %args.schema.display(), "starting run");

    let mut config = ConfigLoader::load_from_workspace(&workspace)?;
    apply_cli_overrides(&mut config, &args);
    ConfigValidator::validate(&config)?;

    let schema = SchemaDocument::load_from_file(&args.schema)?;
    let ledger_dir = ConfigLoader::ledger_dir(&workspace, &config);
    let ledger = FileLedger::open(&ledger_dir)?.with_history(config.ledger.keep_history);

    let orchestrator = Orchestrator::new(builtin_registry(&workspace));
    let options = execution_options(&config).with_cancel(cancel);

    let report = orchestrator
        .execute(&schema, Arc::new(ledger), options)
        .await?;

    match args.format {
        OutputFormat::Text => print!("{}", report.render_text()),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }

    if report.cancelled {
        tracing::warn!("run cancelled before every batch finished");
    }
    Ok(report.is_success())
}

/// Load, validate and resolve a schema without executing it.
pub async fn validate(args: ValidateArgs) -> Result<bool> {
    let workspace = resolve_workspace(args.workspace.as_deref())?;
    let schema = SchemaDocument::load_from_file(&args.schema)?;
    let resolved = schema.resolve(&builtin_registry(&workspace))?;

    println!(
        "Schema '{}' is valid (hash {})",
        resolved.name,
        &resolved.content_hash[..12.min(resolved.content_hash.len())]
    );
    println!("  input:       {}", resolved.input.name());
    println!("  filters:     {}", resolved.filters.len());
    println!("  batcher:     {}", resolved.batcher.name());
    println!("  transformer: {}", resolved.transformer.name());
    println!("  validator:   {}", resolved.validator.name());
    println!("  submitter:   {}", resolved.submitter.name());
    Ok(true)
}

/// Print every ledger record.
pub async fn status(args: StatusArgs) -> Result<bool> {
    let workspace = resolve_workspace(args.workspace.as_deref())?;
    let mut config = ConfigLoader::load_from_workspace(&workspace)?;
    if let Some(dir) = &args.ledger {
        config.ledger.dir = dir.clone();
    }
    let ledger_dir = ConfigLoader::ledger_dir(&workspace, &config);
    let ledger = FileLedger::open(&ledger_dir)?;
    let records = ledger.records()?;

    match args.format {
        OutputFormat::Json => {
            let payload = json!({
                "ledger": ledger_dir.display().to_string(),
                "manifest": ledger.manifest()?,
                "records": records,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to render status")?
            );
        }
        OutputFormat::Text => {
            if records.is_empty() {
                println!("No ledger records in {}", ledger_dir.display());
            } else {
                println!("Ledger {} ({} records)", ledger_dir.display(), records.len());
                for record in &records {
                    print_record(record);
                }
            }
        }
    }
    Ok(true)
}

/// List registered component names per role.
pub async fn components(args: ComponentsArgs) -> Result<bool> {
    let workspace = resolve_workspace(None)?;
    let catalog = builtin_registry(&workspace).catalog();

    match args.format {
        OutputFormat::Json => {
            let payload: serde_json::Map<String, serde_json::Value> = catalog
                .into_iter()
                .map(|(role, names)| (role.to_string(), json!(names)))
                .collect();
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        OutputFormat::Text => {
            for (role, names) in catalog {
                println!("{:<12} {}", role, names.join(", "));
            }
        }
    }
    Ok(true)
}

fn print_record(record: &LedgerRecord) {
    println!(
        "  {} {:<18} attempts={} {} ({})",
        record.identity.short(),
        record.outcome.as_str(),
        record.attempts,
        record.title,
        record.recorded_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(change) = &record.change {
        println!(
            "      change: {}",
            change.url.as_deref().unwrap_or(&change.reference)
        );
    }
    if let Some(diagnostic) = &record.diagnostic {
        println!("      {}", diagnostic);
    }
}

fn apply_cli_overrides(config: &mut AutoshiftConfig, args: &RunArgs) {
    if let Some(dir) = &args.ledger {
        config.ledger.dir = dir.clone();
    }
    if let Some(concurrency) = args.concurrency {
        config.run.concurrency = Some(concurrency);
    }
    if let Some(max_retries) = args.max_retries {
        config.run.max_retries = Some(max_retries);
    }
    if args.dry_run {
        config.run.dry_run = Some(true);
    }
}

/// Options left unset fall back to the schema's run options.
fn execution_options(config: &AutoshiftConfig) -> ExecutionOptions {
    let mut options = ExecutionOptions::new();
    if let Some(concurrency) = config.run.concurrency {
        options = options.with_concurrency(concurrency);
    }
    if let Some(max_retries) = config.run.max_retries {
        options = options.with_max_retries(max_retries);
    }
    if let Some(dry_run) = config.run.dry_run {
        options = options.with_dry_run(dry_run);
    }
    options
}

fn resolve_workspace(workspace: Option<&Path>) -> Result<PathBuf> {
    match workspace {
        Some(path) => Ok(path.to_path_buf()),
        None => env::current_dir().context("failed to determine current directory"),
    }
}
