#![allow(clippy::result_large_err)]

mod branch;
mod commit;
mod pr;

pub use branch::{branch_name, BranchManager};
pub use commit::CommitManager;
pub use pr::{PullRequestManager, PullRequestSpec};

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Run `program args..` in `cwd` and return trimmed stdout.
pub(crate) async fn run_tool(
    program: &str,
    args: &[&str],
    cwd: &Path,
    action: &str,
) -> Result<String, AppError> {
    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(std::process::Stdio::null())
        .output()
        .await
        .map_err(|e| {
            AppError::new(
                ErrorCategory::ToolExecutionError,
                format!("Failed to execute {} command: {}", program, e),
            )
            .with_code("AS-GIT-001")
        })?;

    if !output.status.success() {
        let mut err = AppError::new(
            ErrorCategory::ToolExecutionError,
            format!(
                "Failed to {}: {}",
                action,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        )
        .with_code("AS-GIT-002");
        err.add_context("command", &format!("{} {}", program, args.join(" ")));
        return Err(err);
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Git operations manager - facade for git operations
#[derive(Debug, Clone)]
pub struct GitManager {
    workspace_path: PathBuf,
}

impl GitManager {
    pub fn new(workspace_path: &Path) -> Self {
        Self {
            workspace_path: workspace_path.to_path_buf(),
        }
    }

    pub fn workspace_path(&self) -> &Path {
        &self.workspace_path
    }

    pub fn is_git_repo(&self) -> bool {
        self.workspace_path.join(".git").exists()
    }

    pub async fn current_branch(&self) -> Result<String, AppError> {
        run_tool(
            "git",
            &["rev-parse", "--abbrev-ref", "HEAD"],
            &self.workspace_path,
            "get current branch",
        )
        .await
    }

    pub async fn head_commit(&self) -> Result<String, AppError> {
        run_tool(
            "git",
            &["rev-parse", "HEAD"],
            &self.workspace_path,
            "resolve HEAD",
        )
        .await
    }

    /// Paths of files whose content matches `pattern`, relative to the
    /// workspace and in git's order. No match is an empty list.
    pub async fn grep_files(
        &self,
        pattern: &str,
        paths: &[String],
        untracked: bool,
    ) -> Result<Vec<String>, AppError> {
        let mut args = vec!["grep", "-z", "-l", "-E"];
        if untracked {
            args.push("--untracked");
        }
        args.extend(["-e", pattern, "--"]);
        args.extend(paths.iter().map(String::as_str));

        let output = Command::new("git")
            .args(&args)
            .current_dir(&self.workspace_path)
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| {
                AppError::new(
                    ErrorCategory::ToolExecutionError,
                    format!("Failed to execute git command: {}", e),
                )
                .with_code("AS-GIT-001")
            })?;
        // git grep exits 1 when nothing matched
        match output.status.code() {
            Some(0) => {}
            Some(1) if output.stderr.is_empty() => return Ok(Vec::new()),
            _ => {
                let mut err = AppError::new(
                    ErrorCategory::ToolExecutionError,
                    format!(
                        "Failed to grep for '{}': {}",
                        pattern,
                        String::from_utf8_lossy(&output.stderr).trim()
                    ),
                )
                .with_code("AS-GIT-002");
                err.add_context("command", &format!("git {}", args.join(" ")));
                return Err(err);
            }
        }
        Ok(output
            .stdout
            .split(|byte| *byte == 0)
            .filter(|path| !path.is_empty())
            .map(|path| String::from_utf8_lossy(path).into_owned())
            .collect())
    }

    pub fn branch_manager(&self) -> BranchManager {
        BranchManager::new(&self.workspace_path)
    }

    pub fn commit_manager(&self) -> CommitManager {
        CommitManager::new(&self.workspace_path)
    }

    pub fn pr_manager(&self) -> PullRequestManager {
        PullRequestManager::new(&self.workspace_path)
    }
}
