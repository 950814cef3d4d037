#![allow(clippy::result_large_err)] // Orchestrator returns AppError so fatal run errors keep structured context.

use crate::core::error::{AppError, InputError};
use crate::core::pipeline::batch::{partition, Batch};
use crate::core::pipeline::item::Item;
use crate::core::pipeline::ledger::Ledger;
use crate::core::pipeline::lifecycle::BatchRunner;
use crate::core::pipeline::registry::ComponentRegistry;
use crate::core::pipeline::report::{BatchReport, RunReport};
use crate::core::pipeline::schema::{ResolvedSchema, SchemaDocument};
use crate::core::types::{ErrorCategory, OutcomeKind};
use futures::{FutureExt, StreamExt};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Per-invocation overrides layered over the schema's run options.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    pub concurrency: Option<usize>,
    pub max_retries: Option<u32>,
    pub dry_run: Option<bool>,
    pub cancel: CancellationToken,
}

impl ExecutionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = Some(dry_run);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Drives schemas through Input -> Filter -> Batch -> Transform -> Validate -> Submit.
#[derive(Clone)]
pub struct Orchestrator {
    registry: ComponentRegistry,
}

struct Enumeration {
    accepted: Vec<Item>,
    seen: usize,
    input_diagnostic: Option<String>,
    cancelled: bool,
}

impl Orchestrator {
    pub fn new(registry: ComponentRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Resolve the schema through the registry and run it.
    ///
    /// Individual batch failures never fail the call; only load errors, fatal
    /// input errors and ledger errors do.
    pub async fn execute(
        &self,
        schema: &SchemaDocument,
        ledger: Arc<dyn Ledger>,
        options: ExecutionOptions,
    ) -> Result<RunReport, AppError> {
        let resolved = schema.resolve(&self.registry)?;
        self.execute_resolved(resolved, ledger, options).await
    }

    pub async fn execute_resolved(
        &self,
        schema: ResolvedSchema,
        ledger: Arc<dyn Ledger>,
        options: ExecutionOptions,
    ) -> Result<RunReport, AppError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("run", run_id = %run_id, schema = %schema.name);
        self.run(run_id, schema, ledger, options)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        run_id: String,
        schema: ResolvedSchema,
        ledger: Arc<dyn Ledger>,
        options: ExecutionOptions,
    ) -> Result<RunReport, AppError> {
        let dry_run = options.dry_run.unwrap_or(schema.options.dry_run);
        let max_retries = options.max_retries.unwrap_or(schema.options.max_retries);
        let mut concurrency = options
            .concurrency
            .unwrap_or(schema.options.concurrency)
            .max(1);
        if concurrency > 1 && schema.submitter.shares_working_tree() {
            tracing::info!(
                submitter = schema.submitter.name(),
                requested = concurrency,
                "submitter shares one working tree; running batches sequentially"
            );
            concurrency = 1;
        }

        ledger.bind(&schema.name, &schema.content_hash)?;
        let mut report = RunReport::new(run_id.clone(), schema.name.clone(), dry_run);
        tracing::info!(concurrency, max_retries, dry_run, "run started");

        let enumeration = enumerate(&schema, &options.cancel).await?;
        report.items_seen = enumeration.seen;
        report.items_accepted = enumeration.accepted.len();
        report.input_diagnostic = enumeration.input_diagnostic;
        report.cancelled = enumeration.cancelled;

        let batches = partition(schema.batcher.as_ref(), enumeration.accepted)?;
        tracing::info!(
            items = report.items_accepted,
            batches = batches.len(),
            "items partitioned"
        );

        // cancelled by the caller, or by a batch that hit a fatal error
        let halt = options.cancel.child_token();
        let runner = Arc::new(BatchRunner {
            run_id,
            schema,
            ledger,
            max_retries,
            dry_run,
            cancel: halt.clone(),
        });
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut join_set: JoinSet<Result<BatchReport, AppError>> = JoinSet::new();
        let mut pending = batches.into_iter();

        for batch in pending.by_ref() {
            while let Some(joined) = join_set.try_join_next() {
                absorb(&mut report, joined, &mut join_set)?;
            }
            let permit = tokio::select! {
                biased;
                _ = halt.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                report.cancelled = true;
                report.insert(not_dispatched(&batch));
                break;
            };

            let runner = runner.clone();
            let halt = halt.clone();
            let span = tracing::info_span!(
                "batch",
                identity = %batch.identity.short(),
                title = %batch.title,
                attempt = tracing::field::Empty,
                state = tracing::field::Empty,
            );
            join_set.spawn(
                async move {
                    let _permit = permit;
                    let result = match AssertUnwindSafe(runner.run(&batch)).catch_unwind().await {
                        Ok(result) => result,
                        Err(_) => Ok(BatchReport::from_batch(&batch, OutcomeKind::Pending, 0)
                            .with_diagnostic(Some("batch worker panicked".to_string()))),
                    };
                    // stop dispatch before the permit is released
                    if result.is_err() {
                        halt.cancel();
                    }
                    result
                }
                .instrument(span),
            );
        }
        for batch in pending {
            report.insert(not_dispatched(&batch));
        }

        while let Some(joined) = join_set.join_next().await {
            absorb(&mut report, joined, &mut join_set)?;
        }
        if options.cancel.is_cancelled() {
            report.cancelled = true;
        }
        report.finish();

        tracing::info!(
            submitted = report.count(OutcomeKind::Submitted),
            skipped = report.count(OutcomeKind::Skipped),
            failed = report.failures().len(),
            cancelled = report.cancelled,
            "run finished"
        );
        Ok(report)
    }
}

/// Pull items lazily through the filter chain.
async fn enumerate(
    schema: &ResolvedSchema,
    cancel: &CancellationToken,
) -> Result<Enumeration, AppError> {
    let mut stream = schema.input.items();
    let limit = schema.options.item_limit;
    let mut enumeration = Enumeration {
        accepted: Vec::new(),
        seen: 0,
        input_diagnostic: None,
        cancelled: false,
    };

    loop {
        if limit.is_some_and(|limit| enumeration.seen >= limit) {
            tracing::info!(limit = ?limit, "item limit reached");
            break;
        }
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                enumeration.cancelled = true;
                break;
            }
            next = stream.next() => next,
        };
        match next {
            None => break,
            Some(Ok(item)) => {
                enumeration.seen += 1;
                if let Some(filter) = schema.filters.iter().find(|filter| !filter.is_valid(&item)) {
                    tracing::debug!(item = %item.key, filter = filter.name(), "item rejected");
                    continue;
                }
                enumeration.accepted.push(item);
            }
            Some(Err(InputError::Recoverable(err))) => {
                tracing::warn!(error = %err, "input stopped early; continuing with items seen");
                enumeration.input_diagnostic = Some(err.diagnostic());
                break;
            }
            Some(Err(InputError::Fatal(mut err))) => {
                err.add_context("input", schema.input.name());
                return Err(err);
            }
        }
    }
    Ok(enumeration)
}

fn not_dispatched(batch: &Batch) -> BatchReport {
    BatchReport::from_batch(batch, OutcomeKind::Pending, 0)
        .with_diagnostic(Some("cancelled before dispatch".to_string()))
}

fn absorb(
    report: &mut RunReport,
    joined: Result<Result<BatchReport, AppError>, JoinError>,
    join_set: &mut JoinSet<Result<BatchReport, AppError>>,
) -> Result<(), AppError> {
    match joined {
        Ok(Ok(batch_report)) => {
            report.insert(batch_report);
            Ok(())
        }
        Ok(Err(err)) => {
            tracing::error!(error = %err, "fatal error in batch lifecycle; aborting run");
            join_set.abort_all();
            Err(err)
        }
        Err(join_err) => {
            join_set.abort_all();
            Err(AppError::new(
                ErrorCategory::InternalError,
                format!("batch task failed: {}", join_err),
            )
            .with_code("AS-STAGE-005"))
        }
    }
}
