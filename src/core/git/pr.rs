#![allow(clippy::result_large_err)] // Pull request helpers keep AppError for detailed CLI failure reporting instead of boxing.

use super::run_tool;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Manages GitHub pull request operations via gh CLI
pub struct PullRequestManager {
    workspace_path: PathBuf,
}

/// Fields for `gh pr create`.
#[derive(Debug, Clone)]
pub struct PullRequestSpec<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub base: &'a str,
    pub head: &'a str,
    pub labels: &'a [String],
    pub draft: bool,
}

impl PullRequestManager {
    pub fn new(workspace_path: &Path) -> Self {
        Self {
            workspace_path: workspace_path.to_path_buf(),
        }
    }

    pub async fn is_gh_available(&self) -> bool {
        Command::new("gh")
            .arg("--version")
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    async fn require_gh(&self) -> Result<(), AppError> {
        if self.is_gh_available().await {
            Ok(())
        } else {
            Err(AppError::new(
                ErrorCategory::ToolExecutionError,
                "gh CLI is not installed or not available",
            )
            .with_code("AS-GIT-003")
            .with_suggestion("Install the GitHub CLI and run `gh auth login`"))
        }
    }

    /// URL of the open PR whose head is `branch_name`, if any.
    pub async fn find_open_pr(&self, branch_name: &str) -> Result<Option<String>, AppError> {
        self.require_gh().await?;
        let url = run_tool(
            "gh",
            &[
                "pr",
                "list",
                "--head",
                branch_name,
                "--state",
                "open",
                "--json",
                "url",
                "--jq",
                ".[0].url // empty",
            ],
            &self.workspace_path,
            "check for existing PR",
        )
        .await?;
        Ok(if url.is_empty() { None } else { Some(url) })
    }

    /// Create a pull request and return its URL.
    pub async fn create_pr(&self, spec: &PullRequestSpec<'_>) -> Result<String, AppError> {
        self.require_gh().await?;
        let mut args: Vec<&str> = vec![
            "pr", "create", "--title", spec.title, "--body", spec.body, "--base", spec.base,
            "--head", spec.head,
        ];
        for label in spec.labels {
            args.push("--label");
            args.push(label);
        }
        if spec.draft {
            args.push("--draft");
        }
        run_tool("gh", &args, &self.workspace_path, "create PR").await
    }
}
