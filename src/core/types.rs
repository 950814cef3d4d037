use serde::{Deserialize, Serialize};

/// Error category enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    LoadError,
    InputError,
    BatchError,
    TransformError,
    ValidationFailure,
    SubmissionError,
    LedgerError,
    TimeoutError,
    ConfigError,
    ToolExecutionError,
    SerializationError,
    IoError,
    InternalError,
}

impl ErrorCategory {
    /// Categories that abort a run instead of being contained within one batch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ErrorCategory::LoadError
                | ErrorCategory::InputError
                | ErrorCategory::BatchError
                | ErrorCategory::LedgerError
                | ErrorCategory::ConfigError
        )
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Error severity enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Fatal,
    Error,
    Warning,
    Info,
}

/// Final outcome attached to a batch identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Pending,
    TransformFailed,
    ValidationFailed,
    Submitted,
    SubmissionFailed,
    Skipped,
}

impl OutcomeKind {
    pub const ALL: [OutcomeKind; 6] = [
        OutcomeKind::Pending,
        OutcomeKind::TransformFailed,
        OutcomeKind::ValidationFailed,
        OutcomeKind::Submitted,
        OutcomeKind::SubmissionFailed,
        OutcomeKind::Skipped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Pending => "pending",
            OutcomeKind::TransformFailed => "transform_failed",
            OutcomeKind::ValidationFailed => "validation_failed",
            OutcomeKind::Submitted => "submitted",
            OutcomeKind::SubmissionFailed => "submission_failed",
            OutcomeKind::Skipped => "skipped",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            OutcomeKind::TransformFailed
                | OutcomeKind::ValidationFailed
                | OutcomeKind::SubmissionFailed
        )
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
