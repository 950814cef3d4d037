#![allow(clippy::result_large_err)]

use super::params::{bool_param, string_list_param, string_param};
use crate::core::error::AppError;
use crate::core::git::{branch_name, GitManager, PullRequestSpec};
use crate::core::pipeline::batch::Batch;
use crate::core::pipeline::component::{Change, StageContext, Submitter};
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Write as _;
use std::path::Path;
use tokio::sync::OnceCell;

pub const COMMIT_PREFIX: &str = "AutoShift";

/// Commit subject: `[AutoShift][<schema>] <title>`.
pub fn commit_message(schema_name: &str, batch: &Batch) -> String {
    format!("[{}][{}] {}", COMMIT_PREFIX, schema_name, batch.title)
}

/// Accepts every batch without touching anything.
pub struct NoopSubmitter;

#[async_trait]
impl Submitter for NoopSubmitter {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn submit(&self, batch: &Batch, ctx: &StageContext) -> Result<Change, AppError> {
        Ok(Change::new(format!("noop:{}", batch.identity.short()))
            .with_branch(branch_name(&ctx.schema_name, &batch.identity)))
    }
}

/// Commits the transformed working tree to a per-batch branch.
///
/// All batches share one checkout, so the orchestrator runs them one at a time.
pub struct GitSubmitter {
    git: GitManager,
    base_branch: OnceCell<String>,
}

impl GitSubmitter {
    pub fn new(workspace_root: &Path, base_branch: Option<String>) -> Self {
        let cell = match base_branch {
            Some(branch) => OnceCell::new_with(Some(branch)),
            None => OnceCell::new(),
        };
        Self {
            git: GitManager::new(workspace_root),
            base_branch: cell,
        }
    }

    pub fn from_params(params: &Value, workspace_root: &Path) -> Result<Self, AppError> {
        Ok(Self::new(workspace_root, string_param(params, "base_branch")?))
    }

    /// Base branch, defaulting to whatever was checked out at first use.
    pub async fn base_branch(&self) -> Result<&str, AppError> {
        self.base_branch
            .get_or_try_init(|| self.git.current_branch())
            .await
            .map(String::as_str)
    }

    /// Commit the batch on its branch and return the branch and commit.
    async fn commit_batch(
        &self,
        batch: &Batch,
        ctx: &StageContext,
    ) -> Result<(String, String), AppError> {
        let base = self.base_branch().await?.to_string();
        let branch = branch_name(&ctx.schema_name, &batch.identity);
        let branches = self.git.branch_manager();
        let commits = self.git.commit_manager();

        let has_changes = commits.has_changes().await?;
        if !has_changes && branches.branch_exists(&branch).await? {
            // Retried after an unconfirmed attempt: reuse the existing commit.
            if branches.commits_ahead(&base, &branch).await? > 0 {
                let head = crate::core::git::run_tool(
                    "git",
                    &["rev-parse", &branch],
                    self.git.workspace_path(),
                    "resolve branch head",
                )
                .await?;
                return Ok((branch, head));
            }
        }
        if !has_changes {
            return Err(AppError::new(
                ErrorCategory::SubmissionError,
                format!("batch '{}' produced no changes to commit", batch.title),
            )
            .with_code("AS-GIT-004"));
        }

        branches.checkout_fresh(&branch).await?;
        commits
            .commit_all(&commit_message(&ctx.schema_name, batch))
            .await?;
        let head = self.git.head_commit().await?;
        Ok((branch, head))
    }
}

#[async_trait]
impl Submitter for GitSubmitter {
    fn name(&self) -> &'static str {
        "git"
    }

    async fn submit(&self, batch: &Batch, ctx: &StageContext) -> Result<Change, AppError> {
        let (branch, head) = self.commit_batch(batch, ctx).await.map_err(into_submission)?;
        tracing::info!(branch = %branch, commit = %head, "batch committed");
        Ok(Change::new(head).with_branch(branch))
    }

    async fn clean(&self, _batch: &Batch, _ctx: &StageContext) -> Result<(), AppError> {
        self.git.commit_manager().discard_changes().await
    }

    async fn rewind(&self, _batch: &Batch, _ctx: &StageContext) -> Result<(), AppError> {
        let base = self.base_branch().await?.to_string();
        self.git.commit_manager().discard_changes().await?;
        self.git.branch_manager().checkout_branch(&base).await
    }

    fn shares_working_tree(&self) -> bool {
        true
    }
}

/// Git submitter that also pushes and opens (or reuses) a pull request.
pub struct GithubSubmitter {
    git: GitSubmitter,
    remote: String,
    labels: Vec<String>,
    draft: bool,
}

impl GithubSubmitter {
    pub fn from_params(params: &Value, workspace_root: &Path) -> Result<Self, AppError> {
        Ok(Self {
            git: GitSubmitter::from_params(params, workspace_root)?,
            remote: string_param(params, "remote")?.unwrap_or_else(|| "origin".to_string()),
            labels: string_list_param(params, "labels")?.unwrap_or_default(),
            draft: bool_param(params, "draft")?.unwrap_or(false),
        })
    }

    fn body(batch: &Batch, ctx: &StageContext) -> String {
        let mut body = format!(
            "Automated change generated by schema `{}`.\n\nItems:\n",
            ctx.schema_name
        );
        for key in batch.item_keys() {
            let _ = writeln!(body, "- `{}`", key);
        }
        let _ = write!(body, "\nautoshift-batch: {}", batch.identity);
        body
    }
}

#[async_trait]
impl Submitter for GithubSubmitter {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn submit(&self, batch: &Batch, ctx: &StageContext) -> Result<Change, AppError> {
        let (branch, head) = self
            .git
            .commit_batch(batch, ctx)
            .await
            .map_err(into_submission)?;
        let git = &self.git.git;
        git.commit_manager()
            .push(&self.remote, &branch)
            .await
            .map_err(into_submission)?;

        let prs = git.pr_manager();
        let url = match prs.find_open_pr(&branch).await.map_err(into_submission)? {
            Some(url) => {
                tracing::info!(url = %url, "reusing open pull request");
                url
            }
            None => {
                let title = commit_message(&ctx.schema_name, batch);
                let body = Self::body(batch, ctx);
                let base = self.git.base_branch().await?.to_string();
                prs.create_pr(&PullRequestSpec {
                    title: &title,
                    body: &body,
                    base: &base,
                    head: &branch,
                    labels: &self.labels,
                    draft: self.draft,
                })
                .await
                .map_err(into_submission)?
            }
        };
        Ok(Change::new(head).with_branch(branch).with_url(url))
    }

    async fn clean(&self, batch: &Batch, ctx: &StageContext) -> Result<(), AppError> {
        self.git.clean(batch, ctx).await
    }

    async fn rewind(&self, batch: &Batch, ctx: &StageContext) -> Result<(), AppError> {
        self.git.rewind(batch, ctx).await
    }

    fn shares_working_tree(&self) -> bool {
        true
    }
}

fn into_submission(mut err: AppError) -> AppError {
    if err.category == ErrorCategory::ToolExecutionError {
        err.category = ErrorCategory::SubmissionError;
    }
    err
}
