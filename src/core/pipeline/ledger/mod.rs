#![allow(clippy::result_large_err)] // Ledger APIs return AppError so I/O failures keep their structured context.

pub mod file;
pub mod memory;

pub use file::FileLedger;
pub use memory::MemoryLedger;

use crate::core::error::AppError;
use crate::core::pipeline::batch::BatchIdentity;
use crate::core::pipeline::component::Change;
use crate::core::types::{ErrorCategory, OutcomeKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const LEDGER_FORMAT_VERSION: u32 = 1;

/// Latest known outcome for one batch identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub format_version: u32,
    pub identity: BatchIdentity,
    #[serde(default)]
    pub title: String,
    pub outcome: OutcomeKind,
    #[serde(default)]
    pub attempts: u32,
    pub recorded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<Change>,
    #[serde(default)]
    pub schema_name: String,
}

impl LedgerRecord {
    pub fn new(identity: BatchIdentity, outcome: OutcomeKind) -> Self {
        Self {
            format_version: LEDGER_FORMAT_VERSION,
            identity,
            title: String::new(),
            outcome,
            attempts: 0,
            recorded_at: Utc::now(),
            diagnostic: None,
            change: None,
            schema_name: String::new(),
        }
    }

    pub fn with_title<T: Into<String>>(mut self, title: T) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_schema<T: Into<String>>(mut self, schema_name: T) -> Self {
        self.schema_name = schema_name.into();
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_diagnostic<T: Into<String>>(mut self, diagnostic: T) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }

    pub fn with_change(mut self, change: Change) -> Self {
        self.change = Some(change);
        self
    }

    pub fn is_submitted(&self) -> bool {
        self.outcome == OutcomeKind::Submitted
    }
}

/// Result of a [`Ledger::record`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Written,
    /// The identity was already Submitted; the write was dropped.
    AlreadySubmitted,
}

/// Durable mapping from batch identity to its latest outcome.
///
/// Writes are serialized per identity and never observed half-applied. Once a
/// record is `Submitted` every later `record` for that identity is a no-op.
pub trait Ledger: Send + Sync + 'static {
    fn get(&self, identity: &BatchIdentity) -> Result<Option<LedgerRecord>, AppError>;

    fn record(&self, record: LedgerRecord) -> Result<RecordStatus, AppError>;

    fn submitted(&self, identity: &BatchIdentity) -> Result<bool, AppError> {
        Ok(self
            .get(identity)?
            .map(|record| record.is_submitted())
            .unwrap_or(false))
    }

    /// Every record, ordered by identity.
    fn records(&self) -> Result<Vec<LedgerRecord>, AppError>;

    /// Associate the ledger with a schema before a run starts.
    fn bind(&self, _schema_name: &str, _schema_hash: &str) -> Result<(), AppError> {
        Ok(())
    }
}

pub(crate) fn ledger_error<T: Into<String>>(code: &str, message: T) -> AppError {
    AppError::new(ErrorCategory::LedgerError, message).with_code(code)
}
