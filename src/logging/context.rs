use crate::cli::Command;
use std::env;

/// Execution contexts that influence how logging is routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionContext {
    /// Interactive commands driven from a developer terminal.
    LocalDev,
    /// Quiet or CI runs that keep the console for the final report only.
    Batch,
}

impl ExecutionContext {
    /// Returns `true` when console sinks should be disabled.
    pub fn disables_console(self) -> bool {
        matches!(self, ExecutionContext::Batch)
    }
}

/// Derive the active execution context from a parsed CLI command plus overrides.
pub fn detect_context(command: &Command) -> ExecutionContext {
    if ci_override_enabled() {
        return ExecutionContext::Batch;
    }

    match command {
        Command::Run(args) if args.quiet => ExecutionContext::Batch,
        Command::Run(_) | Command::Validate(_) | Command::Status(_) | Command::Components(_) => {
            ExecutionContext::LocalDev
        }
    }
}

fn ci_override_enabled() -> bool {
    env::var("CI")
        .map(|value| matches!(value.trim(), "1" | "true"))
        .unwrap_or(false)
}
