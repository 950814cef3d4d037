use crate::logging::config::LoggingConfig;
use crate::Result;
use anyhow::{anyhow, Context};
use dirs_next::home_dir;
use std::io;
use std::path::{Path, PathBuf};
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{self as tracing_fmt, format, writer::BoxMakeWriter};
use tracing_subscriber::registry::LookupSpan;

pub const LOG_FILE_PREFIX: &str = "autoshift";
pub const LOG_FILE_SUFFIX: &str = "jsonl";
/// Daily files kept before the oldest is deleted.
pub const RETAINED_LOG_FILES: usize = 14;

/// JSON-lines layer. Every record carries the span list, so a batch's history
/// can be pulled out of a run log by `run_id` or `identity`.
pub type FileFmtLayer<S> =
    tracing_fmt::Layer<S, format::JsonFields, format::Format<format::Json>, BoxMakeWriter>;

pub type FileLayerStack<S> = tracing_subscriber::layer::Layered<FileFmtLayer<S>, S>;

/// Directory holding the daily run logs.
///
/// Defaults to `<workspace>/.autoshift/logs`. A relative `log_dir` may not
/// escape the workspace (or the home directory when there is no workspace).
pub fn log_dir(config: &LoggingConfig, workspace_root: Option<&Path>) -> Result<PathBuf> {
    let anchor = match workspace_root {
        Some(workspace) => workspace.to_path_buf(),
        None => home_dir().ok_or_else(|| anyhow!("$HOME directory unavailable"))?,
    };
    let dir = match &config.log_dir {
        Some(custom) if custom.is_absolute() => return Ok(custom.clone()),
        Some(custom) => anchor.join(custom),
        None => return Ok(anchor.join(".autoshift").join("logs")),
    };

    let resolved = normalize(&dir);
    let anchor = normalize(&anchor);
    if !resolved.starts_with(&anchor) {
        return Err(anyhow!(
            "logging.log_dir {} resolves outside {}",
            dir.display(),
            anchor.display()
        ));
    }
    Ok(resolved)
}

/// Build the run-log layer. When disabled the layer writes to a sink so the
/// subscriber type stays the same.
pub fn file_layer<S>(dir: &Path, enabled: bool) -> Result<(FileFmtLayer<S>, Option<WorkerGuard>)>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    if !enabled {
        return Ok((json_layer(BoxMakeWriter::new(io::sink)), None));
    }
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(RETAINED_LOG_FILES)
        .build(dir)
        .with_context(|| format!("failed to open run log directory {}", dir.display()))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    let writer = BoxMakeWriter::new(move || non_blocking.clone());
    Ok((json_layer(writer), Some(guard)))
}

fn json_layer<S>(writer: BoxMakeWriter) -> FileFmtLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_fmt::layer()
        .json()
        .with_current_span(false)
        .with_span_list(true)
        .with_writer(writer)
}

/// Lexically resolve `.` and `..` so escape checks work for paths that do
/// not exist yet.
fn normalize(path: &Path) -> PathBuf {
    let base = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let mut out = PathBuf::new();
    for component in base.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
