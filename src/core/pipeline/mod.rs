//! Batch pipeline engine: Input -> Filter -> Batch -> Transform -> Validate -> Submit.

pub mod batch;
pub mod builtins;
pub mod component;
pub mod item;
pub mod ledger;
pub mod lifecycle;
pub mod orchestrator;
pub mod registry;
pub mod report;
pub mod retry;
pub mod schema;

pub use batch::{partition, verify_partition, Batch, BatchIdentity, BatchPolicy};
pub use component::{
    Change, Filter, Input, InvertedFilter, ItemStream, StageContext, Submitter, Transformer,
    ValidationLevel, ValidationResult, Validator,
};
pub use item::Item;
pub use ledger::{FileLedger, Ledger, LedgerRecord, MemoryLedger, RecordStatus};
pub use lifecycle::{BatchState, BatchStateMachine};
pub use orchestrator::{ExecutionOptions, Orchestrator};
pub use registry::{ComponentRegistry, ComponentRegistryBuilder};
pub use report::{BatchReport, RunReport};
pub use retry::{RetryPolicy, StageTimeouts};
pub use schema::{ComponentRef, FilterRef, ResolvedSchema, RunOptions, SchemaDocument};
