pub mod config;
pub mod error;
pub mod git;
pub mod pipeline;
pub mod types;

pub use config::{AutoshiftConfig, ConfigLoader, ConfigValidator};
pub use error::{AppError, DefaultErrorReporter, ErrorReporter, InputError};
pub use pipeline::{
    ComponentRegistry, ExecutionOptions, FileLedger, Ledger, MemoryLedger, Orchestrator,
    RunReport, SchemaDocument,
};
pub use types::*;
