#![allow(clippy::result_large_err)] // Git commit helpers return AppError directly to preserve CLI diagnostics without boxing.

use super::run_tool;
use crate::core::error::AppError;
use std::path::{Path, PathBuf};

/// Engine state (ledger, logs) lives in the working tree but is never committed or cleaned.
const STATE_DIR: &str = ".autoshift";
const EXCLUDE_STATE: &str = ":(exclude).autoshift";

pub struct CommitManager {
    workspace_path: PathBuf,
}

impl CommitManager {
    pub fn new(workspace_path: &Path) -> Self {
        Self {
            workspace_path: workspace_path.to_path_buf(),
        }
    }

    pub async fn has_changes(&self) -> Result<bool, AppError> {
        let status = run_tool(
            "git",
            &["status", "--porcelain", "--", ".", EXCLUDE_STATE],
            &self.workspace_path,
            "check git status",
        )
        .await?;
        Ok(!status.is_empty())
    }

    /// Stage everything and commit. Returns false when there was nothing to commit.
    pub async fn commit_all(&self, message: &str) -> Result<bool, AppError> {
        if !self.has_changes().await? {
            return Ok(false);
        }
        run_tool(
            "git",
            &["add", "-A", "--", ".", EXCLUDE_STATE],
            &self.workspace_path,
            "stage changes",
        )
        .await?;
        run_tool(
            "git",
            &["commit", "-m", message],
            &self.workspace_path,
            "commit changes",
        )
        .await?;
        Ok(true)
    }

    /// Drop uncommitted and untracked changes.
    pub async fn discard_changes(&self) -> Result<(), AppError> {
        run_tool(
            "git",
            &["reset", "--hard"],
            &self.workspace_path,
            "reset working tree",
        )
        .await?;
        run_tool(
            "git",
            &["clean", "-fd", "-e", STATE_DIR],
            &self.workspace_path,
            "remove untracked files",
        )
        .await?;
        Ok(())
    }

    /// Force-push so a re-submitted batch replaces its earlier branch state.
    pub async fn push(&self, remote: &str, branch_name: &str) -> Result<(), AppError> {
        run_tool(
            "git",
            &["push", "--force", "-u", remote, branch_name],
            &self.workspace_path,
            &format!("push branch '{}'", branch_name),
        )
        .await
        .map(|_| ())
    }
}
