#![allow(clippy::result_large_err)] // Command components return AppError to surface shell execution diagnostics without boxing.

use super::params::{bool_param, object_param, string_list_param, string_param};
use crate::core::error::AppError;
use crate::core::pipeline::batch::Batch;
use crate::core::pipeline::component::{
    StageContext, Transformer, ValidationLevel, ValidationResult, Validator,
};
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Command;

const OUTPUT_CAPTURE_LIMIT_BYTES: usize = 1_048_576;
const DIAGNOSTIC_TAIL_BYTES: usize = 2_048;

/// Placeholder replaced by batch member keys.
pub const KEY_PLACEHOLDER: &str = "<<KEY>>";
/// Placeholder replaced by the batch title.
pub const TITLE_PLACEHOLDER: &str = "<<TITLE>>";

#[derive(Clone, Debug)]
pub struct CommandExecutionRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct CommandExecutionOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

#[async_trait]
pub trait CommandRunner: Send + Sync + 'static {
    async fn run(
        &self,
        request: &CommandExecutionRequest,
    ) -> Result<CommandExecutionOutput, AppError>;
}

pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(
        &self,
        request: &CommandExecutionRequest,
    ) -> Result<CommandExecutionOutput, AppError> {
        let output = Command::new(&request.program)
            .args(&request.args)
            .current_dir(&request.cwd)
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| {
                AppError::new(
                    ErrorCategory::ToolExecutionError,
                    format!("failed to execute {}: {}", request.program, err),
                )
                .with_code("AS-CMD-002")
            })?;

        Ok(CommandExecutionOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

/// Parsed `command` component parameters shared by transformer and validator.
#[derive(Clone, Debug)]
pub struct CommandSpec {
    pub command: String,
    pub args: Vec<String>,
    pub shell: bool,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    /// Run once per item instead of once per batch.
    pub per_item: bool,
}

impl CommandSpec {
    pub fn from_params(params: &Value, workspace_root: &Path) -> Result<Self, AppError> {
        let command = string_param(params, "command")?
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AppError::new(ErrorCategory::ConfigError, "command is required")
                    .with_code("AS-CMD-003")
            })?;
        let cwd = match string_param(params, "cwd")? {
            Some(rel) if Path::new(&rel).is_absolute() => {
                return Err(
                    AppError::new(ErrorCategory::ConfigError, "cwd must be relative")
                        .with_code("AS-CMD-003"),
                )
            }
            Some(rel) => workspace_root.join(rel),
            None => workspace_root.to_path_buf(),
        };
        let env = object_param(params, "env")?
            .map(|map| {
                map.iter()
                    .filter_map(|(key, value)| {
                        value.as_str().map(|v| (key.clone(), v.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            command,
            args: string_list_param(params, "args")?.unwrap_or_default(),
            shell: bool_param(params, "shell")?.unwrap_or(false),
            cwd,
            env,
            per_item: bool_param(params, "per_item")?.unwrap_or(false),
        })
    }

    /// Requests for one batch, with placeholders substituted.
    pub fn requests(&self, batch: &Batch) -> Vec<CommandExecutionRequest> {
        let keys = batch.item_keys();
        if self.per_item {
            keys.iter()
                .map(|key| self.request(std::slice::from_ref(key), &batch.title))
                .collect()
        } else {
            vec![self.request(&keys, &batch.title)]
        }
    }

    fn request(&self, keys: &[String], title: &str) -> CommandExecutionRequest {
        let (program, args) = if self.shell {
            let joined = keys
                .iter()
                .map(|key| shell_quote(key))
                .collect::<Vec<_>>()
                .join(" ");
            let mut line = self
                .command
                .replace(KEY_PLACEHOLDER, &joined)
                .replace(TITLE_PLACEHOLDER, &shell_quote(title));
            for arg in &self.args {
                line.push(' ');
                line.push_str(
                    &arg.replace(KEY_PLACEHOLDER, &joined)
                        .replace(TITLE_PLACEHOLDER, &shell_quote(title)),
                );
            }
            ("sh".to_string(), vec!["-c".to_string(), line])
        } else {
            let mut parts = self.command.split_whitespace().map(str::to_string);
            let program = parts.next().unwrap_or_default();
            let mut args = Vec::new();
            // an argument embedding <<KEY>> is repeated once per key
            for arg in parts.chain(self.args.iter().cloned()) {
                if arg.contains(KEY_PLACEHOLDER) {
                    let arg = arg.replace(TITLE_PLACEHOLDER, title);
                    args.extend(keys.iter().map(|key| arg.replace(KEY_PLACEHOLDER, key)));
                } else {
                    args.push(arg.replace(TITLE_PLACEHOLDER, title));
                }
            }
            (program, args)
        };
        CommandExecutionRequest {
            program,
            args,
            cwd: self.cwd.clone(),
            env: self.env.clone(),
        }
    }
}

fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}

fn limit_bytes(bytes: &[u8], limit: usize) -> String {
    let limit = limit.min(bytes.len());
    String::from_utf8_lossy(&bytes[..limit]).into_owned()
}

fn tail(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.len() <= DIAGNOSTIC_TAIL_BYTES {
        return trimmed;
    }
    let mut start = trimmed.len() - DIAGNOSTIC_TAIL_BYTES;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    &trimmed[start..]
}

struct RunSummary {
    outputs: Vec<Value>,
    first_failure: Option<(i32, String)>,
}

async fn run_all(
    runner: &dyn CommandRunner,
    spec: &CommandSpec,
    batch: &Batch,
) -> Result<RunSummary, AppError> {
    let mut summary = RunSummary {
        outputs: Vec::new(),
        first_failure: None,
    };
    for request in spec.requests(batch) {
        tracing::debug!(
            program = %request.program,
            args = ?request.args,
            cwd = %request.cwd.display(),
            "executing command"
        );
        let start = Instant::now();
        let output = runner.run(&request).await?;
        let stdout = limit_bytes(&output.stdout, OUTPUT_CAPTURE_LIMIT_BYTES);
        let stderr = limit_bytes(&output.stderr, OUTPUT_CAPTURE_LIMIT_BYTES);
        if output.exit_code != 0 && summary.first_failure.is_none() {
            let detail = if stderr.trim().is_empty() { &stdout } else { &stderr };
            summary.first_failure = Some((output.exit_code, tail(detail).to_string()));
        }
        summary.outputs.push(json!({
            "exit_code": output.exit_code,
            "stdout": stdout,
            "stderr": stderr,
            "duration_ms": start.elapsed().as_millis() as u64,
        }));
    }
    Ok(summary)
}

/// Runs an external command against the batch's member keys.
pub struct CommandTransformer {
    spec: CommandSpec,
    runner: Arc<dyn CommandRunner>,
}

impl CommandTransformer {
    pub fn new(spec: CommandSpec) -> Self {
        Self::with_runner(spec, Arc::new(TokioCommandRunner))
    }

    pub fn with_runner(spec: CommandSpec, runner: Arc<dyn CommandRunner>) -> Self {
        Self { spec, runner }
    }
}

#[async_trait]
impl Transformer for CommandTransformer {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn transform(&self, batch: &Batch, _ctx: &StageContext) -> Result<Value, AppError> {
        let summary = run_all(self.runner.as_ref(), &self.spec, batch).await?;
        if let Some((code, detail)) = summary.first_failure {
            let mut err = AppError::new(
                ErrorCategory::TransformError,
                format!("command failed with exit code {}: {}", code, detail),
            )
            .with_code("AS-CMD-001");
            err.add_context("command", &self.spec.command);
            return Err(err);
        }
        Ok(json!({ "runs": summary.outputs }))
    }
}

/// Maps a command's exit status to a validation level.
pub struct CommandValidator {
    spec: CommandSpec,
    failure_level: ValidationLevel,
    runner: Arc<dyn CommandRunner>,
}

impl CommandValidator {
    pub fn new(spec: CommandSpec, failure_level: ValidationLevel) -> Self {
        Self::with_runner(spec, failure_level, Arc::new(TokioCommandRunner))
    }

    pub fn with_runner(
        spec: CommandSpec,
        failure_level: ValidationLevel,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            spec,
            failure_level,
            runner,
        }
    }

    pub fn from_params(params: &Value, workspace_root: &Path) -> Result<Self, AppError> {
        let spec = CommandSpec::from_params(params, workspace_root)?;
        let failure_level = match string_param(params, "failure_level")?.as_deref() {
            None | Some("error") => ValidationLevel::Error,
            Some("warning") => ValidationLevel::Warning,
            Some(other) => {
                return Err(AppError::new(
                    ErrorCategory::ConfigError,
                    format!("failure_level must be warning or error, got {}", other),
                )
                .with_code("AS-CMD-003"))
            }
        };
        Ok(Self::new(spec, failure_level))
    }
}

#[async_trait]
impl Validator for CommandValidator {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn validate(
        &self,
        batch: &Batch,
        _transform_output: &Value,
        _ctx: &StageContext,
    ) -> Result<ValidationResult, AppError> {
        let summary = run_all(self.runner.as_ref(), &self.spec, batch).await?;
        Ok(match summary.first_failure {
            None => ValidationResult::pass(),
            Some((code, detail)) => ValidationResult::new(
                self.failure_level,
                format!("{} exited with {}: {}", self.spec.command, code, detail),
            ),
        })
    }
}
