#![allow(clippy::result_large_err)] // Git branch operations bubble AppError for command failures so extra boxing is unnecessary.

use super::run_tool;
use crate::core::error::AppError;
use crate::core::pipeline::batch::BatchIdentity;
use std::path::{Path, PathBuf};
use tokio::process::Command;

pub const BRANCH_PREFIX: &str = "AUTOSHIFT";

/// Deterministic branch for a batch: `AUTOSHIFT/<schema>/<identity-short>`.
///
/// The identity keeps the name stable across retries and resumed runs, which
/// lets submitters find work pushed by an earlier unconfirmed attempt.
pub fn branch_name(schema_name: &str, identity: &BatchIdentity) -> String {
    format!(
        "{}/{}/{}",
        BRANCH_PREFIX,
        sanitize_component(schema_name),
        identity.short()
    )
}

fn sanitize_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_dash = false;
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' {
            out.push(ch);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    let trimmed = out.trim_matches(|c| c == '-' || c == '.').to_string();
    if trimmed.is_empty() {
        "schema".to_string()
    } else {
        trimmed
    }
}

pub struct BranchManager {
    workspace_path: PathBuf,
}

impl BranchManager {
    pub fn new(workspace_path: &Path) -> Self {
        Self {
            workspace_path: workspace_path.to_path_buf(),
        }
    }

    /// Create `name` at HEAD, or reset it there when it already exists.
    /// Uncommitted changes are carried onto the branch.
    pub async fn checkout_fresh(&self, name: &str) -> Result<(), AppError> {
        run_tool(
            "git",
            &["checkout", "-B", name],
            &self.workspace_path,
            &format!("create branch '{}'", name),
        )
        .await
        .map(|_| ())
    }

    pub async fn checkout_branch(&self, name: &str) -> Result<(), AppError> {
        run_tool(
            "git",
            &["checkout", name],
            &self.workspace_path,
            &format!("checkout branch '{}'", name),
        )
        .await
        .map(|_| ())
    }

    pub async fn branch_exists(&self, name: &str) -> Result<bool, AppError> {
        let status = Command::new("git")
            .args(["show-ref", "--verify", "--quiet", &format!("refs/heads/{}", name)])
            .current_dir(&self.workspace_path)
            .status()
            .await
            .map_err(|e| {
                AppError::new(
                    crate::core::types::ErrorCategory::ToolExecutionError,
                    format!("Failed to execute git command: {}", e),
                )
                .with_code("AS-GIT-001")
            })?;
        Ok(status.success())
    }

    /// Number of commits on `branch` that are not on `base`.
    pub async fn commits_ahead(&self, base: &str, branch: &str) -> Result<u32, AppError> {
        let range = format!("{}..{}", base, branch);
        let count = run_tool(
            "git",
            &["rev-list", "--count", &range],
            &self.workspace_path,
            "count commits",
        )
        .await?;
        Ok(count.parse().unwrap_or(0))
    }
}
