#![allow(clippy::result_large_err)] // Component traits return AppError directly for structured diagnostics without boxing.

use crate::core::error::{AppError, InputError};
use crate::core::pipeline::batch::Batch;
use crate::core::pipeline::item::Item;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Lazy, possibly unbounded sequence of items.
pub type ItemStream = BoxStream<'static, Result<Item, InputError>>;

/// Per-invocation context handed to transform, validate and submit stages.
#[derive(Clone, Debug)]
pub struct StageContext {
    pub run_id: String,
    pub schema_name: String,
    /// One-based attempt number within the batch lifecycle.
    pub attempt: u32,
    pub dry_run: bool,
}

/// Produces the candidate items for a run.
pub trait Input: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn items(&self) -> ItemStream;
}

/// Pure predicate deciding whether an item proceeds.
pub trait Filter: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn is_valid(&self, item: &Item) -> bool;
}

/// Negates the wrapped filter; built when a schema marks a filter `inverted`.
pub struct InvertedFilter {
    inner: std::sync::Arc<dyn Filter>,
}

impl InvertedFilter {
    pub fn new(inner: std::sync::Arc<dyn Filter>) -> Self {
        Self { inner }
    }
}

impl Filter for InvertedFilter {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn is_valid(&self, item: &Item) -> bool {
        !self.inner.is_valid(item)
    }
}

/// Mutates the working state associated with a batch.
#[async_trait]
pub trait Transformer: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Returns stage output that is passed on to the validator.
    async fn transform(&self, batch: &Batch, ctx: &StageContext) -> Result<Value, AppError>;
}

/// Severity reported by a validator, ordered `None < Warning < Error`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    #[default]
    None,
    Warning,
    Error,
}

impl fmt::Display for ValidationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationLevel::None => f.write_str("none"),
            ValidationLevel::Warning => f.write_str("warning"),
            ValidationLevel::Error => f.write_str("error"),
        }
    }
}

/// Verdict produced by a validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub level: ValidationLevel,
    pub message: Option<String>,
}

impl ValidationResult {
    pub fn pass() -> Self {
        Self {
            level: ValidationLevel::None,
            message: None,
        }
    }

    pub fn new<T: Into<String>>(level: ValidationLevel, message: T) -> Self {
        Self {
            level,
            message: Some(message.into()),
        }
    }

    /// A verdict passes when its level does not exceed the allowed level.
    pub fn passes(&self, allowed: ValidationLevel) -> bool {
        self.level <= allowed
    }
}

/// Inspects post-transform state.
#[async_trait]
pub trait Validator: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn validate(
        &self,
        batch: &Batch,
        transform_output: &Value,
        ctx: &StageContext,
    ) -> Result<ValidationResult, AppError>;
}

/// Review request or commit produced by a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Change {
    pub fn new<T: Into<String>>(reference: T) -> Self {
        Self {
            reference: reference.into(),
            url: None,
            branch: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_url<T: Into<String>>(mut self, url: T) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_branch<T: Into<String>>(mut self, branch: T) -> Self {
        self.branch = Some(branch.into());
        self
    }
}

/// Commits, pushes and opens review requests.
///
/// `submit` must be idempotent for a given batch identity: a retried call
/// after an unconfirmed attempt returns the existing change instead of
/// creating a second one.
#[async_trait]
pub trait Submitter: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn submit(&self, batch: &Batch, ctx: &StageContext) -> Result<Change, AppError>;

    /// Discard uncommitted working state after a failed attempt.
    async fn clean(&self, _batch: &Batch, _ctx: &StageContext) -> Result<(), AppError> {
        Ok(())
    }

    /// Return the working state to its base once a batch is finished.
    async fn rewind(&self, _batch: &Batch, _ctx: &StageContext) -> Result<(), AppError> {
        Ok(())
    }

    /// True when every batch mutates one shared working tree, which forces
    /// sequential batch execution.
    fn shares_working_tree(&self) -> bool {
        false
    }
}
