#![allow(clippy::result_large_err)] // Lifecycle returns AppError so fatal ledger failures keep their context.

use crate::core::error::AppError;
use crate::core::pipeline::batch::Batch;
use crate::core::pipeline::component::{Change, StageContext};
use crate::core::pipeline::ledger::{Ledger, LedgerRecord, RecordStatus};
use crate::core::pipeline::report::BatchReport;
use crate::core::pipeline::schema::ResolvedSchema;
use crate::core::types::{ErrorCategory, OutcomeKind};
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DRY_RUN_DIAGNOSTIC: &str = "dry run: validated, submission skipped";
pub const SUBMIT_IN_PROGRESS_DIAGNOSTIC: &str = "submission in progress";

/// Per-batch lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchState {
    Pending,
    Transforming,
    Validating,
    Submitting,
    Submitted,
    TransformFailed,
    ValidationFailed,
    SubmissionFailed,
    Skipped,
}

impl BatchState {
    /// Legal edges of the lifecycle graph.
    ///
    /// `Validating -> Pending` is the dry-run exit; failure states re-enter
    /// `Transforming` on retry.
    pub fn can_transition_to(self, next: BatchState) -> bool {
        use BatchState::*;
        matches!(
            (self, next),
            (Pending, Transforming)
                | (Pending, Skipped)
                | (Transforming, Validating)
                | (Transforming, TransformFailed)
                | (Validating, Submitting)
                | (Validating, ValidationFailed)
                | (Validating, Pending)
                | (Submitting, Submitted)
                | (Submitting, SubmissionFailed)
                | (TransformFailed, Transforming)
                | (ValidationFailed, Transforming)
                | (SubmissionFailed, Transforming)
        )
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            BatchState::TransformFailed | BatchState::ValidationFailed | BatchState::SubmissionFailed
        )
    }

    /// Outcome recorded when the lifecycle stops in this state.
    pub fn outcome(self) -> OutcomeKind {
        match self {
            BatchState::Submitted => OutcomeKind::Submitted,
            BatchState::Skipped => OutcomeKind::Skipped,
            BatchState::TransformFailed => OutcomeKind::TransformFailed,
            BatchState::ValidationFailed => OutcomeKind::ValidationFailed,
            BatchState::SubmissionFailed => OutcomeKind::SubmissionFailed,
            BatchState::Pending
            | BatchState::Transforming
            | BatchState::Validating
            | BatchState::Submitting => OutcomeKind::Pending,
        }
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Strictly sequential state tracker with an attempt counter.
#[derive(Debug, Clone)]
pub struct BatchStateMachine {
    state: BatchState,
    attempts: u32,
    trail: Vec<BatchState>,
}

impl Default for BatchStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchStateMachine {
    pub fn new() -> Self {
        Self {
            state: BatchState::Pending,
            attempts: 0,
            trail: vec![BatchState::Pending],
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Every state visited, in order.
    pub fn trail(&self) -> &[BatchState] {
        &self.trail
    }

    pub fn advance(&mut self, next: BatchState) -> Result<(), AppError> {
        if !self.state.can_transition_to(next) {
            return Err(AppError::new(
                ErrorCategory::InternalError,
                format!("illegal batch transition {} -> {}", self.state, next),
            )
            .with_code("AS-STAGE-004"));
        }
        if next == BatchState::Transforming {
            self.attempts += 1;
        }
        self.state = next;
        self.trail.push(next);
        tracing::Span::current().record("state", tracing::field::display(next));
        Ok(())
    }
}

/// Shared, read-only environment for every batch lifecycle of one run.
pub(crate) struct BatchRunner {
    pub run_id: String,
    pub schema: ResolvedSchema,
    pub ledger: Arc<dyn Ledger>,
    pub max_retries: u32,
    pub dry_run: bool,
    pub cancel: CancellationToken,
}

/// Where a lifecycle stopped and why.
struct Finish {
    outcome: OutcomeKind,
    diagnostic: Option<String>,
    change: Option<Change>,
}

impl BatchRunner {
    /// Drive one batch to a terminal or safely interrupted state.
    ///
    /// Batch-scoped failures end up in the report. Ledger failures, broken
    /// lifecycle invariants and a shared working tree that could not be
    /// rewound are returned as errors.
    pub async fn run(&self, batch: &Batch) -> Result<BatchReport, AppError> {
        let mut machine = BatchStateMachine::new();

        if let Some(existing) = self.ledger.get(&batch.identity)? {
            if existing.is_submitted() {
                machine.advance(BatchState::Skipped)?;
                tracing::info!("already submitted in ledger; skipping");
                return Ok(BatchReport::from_batch(batch, OutcomeKind::Skipped, 0)
                    .with_diagnostic(existing.diagnostic)
                    .with_change(existing.change));
            }
        }
        if self.record(batch, OutcomeKind::Pending, 0, None, None)?
            == RecordStatus::AlreadySubmitted
        {
            machine.advance(BatchState::Skipped)?;
            return Ok(BatchReport::from_batch(batch, OutcomeKind::Skipped, 0));
        }

        let finish = self.attempt_loop(batch, &mut machine).await?;

        let ctx = self.context(machine.attempts().max(1));
        if let Err(err) = self.schema.submitter.rewind(batch, &ctx).await {
            if self.schema.submitter.shares_working_tree() {
                // the next batch would start from this batch's leftovers
                tracing::error!(error = %err, "submitter rewind failed; halting run");
                let message = format!(
                    "{} could not restore the shared working tree after '{}': {}",
                    self.schema.submitter.name(),
                    batch.title,
                    err.diagnostic()
                );
                let mut fatal =
                    AppError::with_source(ErrorCategory::SubmissionError, message, Box::new(err))
                        .with_code("AS-STAGE-006")
                        .with_suggestion("Restore the working tree by hand, then rerun to resume");
                fatal.add_context("identity", batch.identity.as_str());
                return Err(fatal);
            }
            tracing::warn!(error = %err, "submitter rewind failed");
        }

        tracing::info!(
            outcome = %finish.outcome,
            attempts = machine.attempts(),
            "batch finished"
        );
        Ok(
            BatchReport::from_batch(batch, finish.outcome, machine.attempts())
                .with_diagnostic(finish.diagnostic)
                .with_change(finish.change),
        )
    }

    async fn attempt_loop(
        &self,
        batch: &Batch,
        machine: &mut BatchStateMachine,
    ) -> Result<Finish, AppError> {
        let options = &self.schema.options;
        let mut last_failure: Option<Finish> = None;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(interrupted(last_failure));
            }
            machine.advance(BatchState::Transforming)?;
            let attempt = machine.attempts();
            tracing::Span::current().record("attempt", attempt);
            let ctx = self.context(attempt);

            let failure = match self.run_stages(batch, machine, &ctx).await? {
                StageResult::Finished(finish) => return Ok(finish),
                StageResult::Interrupted => return Ok(interrupted(last_failure)),
                StageResult::Failed(state, diagnostic) => (state, diagnostic),
            };

            let (state, diagnostic) = failure;
            let outcome = state.outcome();
            tracing::warn!(attempt, outcome = %outcome, diagnostic = %diagnostic, "attempt failed");
            self.record(batch, outcome, attempt, Some(diagnostic.clone()), None)?;
            if let Err(err) = self.schema.submitter.clean(batch, &ctx).await {
                tracing::warn!(error = %err, "submitter clean failed");
            }
            let finish = Finish {
                outcome,
                diagnostic: Some(diagnostic),
                change: None,
            };

            if !options.retry.should_retry(outcome, attempt, self.max_retries) {
                return Ok(finish);
            }
            last_failure = Some(finish);
            let delay = options.retry.delay_for(attempt);
            if !self.sleep_or_cancel(delay).await {
                return Ok(interrupted(last_failure));
            }
        }
    }

    /// One pass of Transform -> Validate -> Submit.
    async fn run_stages(
        &self,
        batch: &Batch,
        machine: &mut BatchStateMachine,
        ctx: &StageContext,
    ) -> Result<StageResult, AppError> {
        let options = &self.schema.options;
        let schema = &self.schema;

        let output = match invoke(
            "transform",
            options.timeouts.transform(),
            schema.transformer.transform(batch, ctx),
        )
        .await
        {
            Ok(output) => output,
            Err(err) => {
                machine.advance(BatchState::TransformFailed)?;
                return Ok(StageResult::Failed(BatchState::TransformFailed, err.diagnostic()));
            }
        };

        if self.cancel.is_cancelled() {
            return Ok(StageResult::Interrupted);
        }
        machine.advance(BatchState::Validating)?;
        let verdict = invoke(
            "validate",
            options.timeouts.validate(),
            schema.validator.validate(batch, &output, ctx),
        )
        .await;
        let verdict = match verdict {
            Ok(verdict) => verdict,
            Err(err) => {
                machine.advance(BatchState::ValidationFailed)?;
                return Ok(StageResult::Failed(BatchState::ValidationFailed, err.diagnostic()));
            }
        };
        if !verdict.passes(options.allowed_validation_level) {
            machine.advance(BatchState::ValidationFailed)?;
            let detail = verdict.message.unwrap_or_else(|| "no details".to_string());
            return Ok(StageResult::Failed(
                BatchState::ValidationFailed,
                format!(
                    "validation level {} exceeds allowed {}: {}",
                    verdict.level, options.allowed_validation_level, detail
                ),
            ));
        }

        if self.dry_run {
            machine.advance(BatchState::Pending)?;
            self.record(
                batch,
                OutcomeKind::Pending,
                ctx.attempt,
                Some(DRY_RUN_DIAGNOSTIC.to_string()),
                None,
            )?;
            return Ok(StageResult::Finished(Finish {
                outcome: OutcomeKind::Pending,
                diagnostic: Some(DRY_RUN_DIAGNOSTIC.to_string()),
                change: None,
            }));
        }
        if self.cancel.is_cancelled() {
            return Ok(StageResult::Interrupted);
        }

        machine.advance(BatchState::Submitting)?;
        self.record(
            batch,
            OutcomeKind::Pending,
            ctx.attempt,
            Some(SUBMIT_IN_PROGRESS_DIAGNOSTIC.to_string()),
            None,
        )?;
        match invoke(
            "submit",
            options.timeouts.submit(),
            schema.submitter.submit(batch, ctx),
        )
        .await
        {
            Ok(change) => {
                machine.advance(BatchState::Submitted)?;
                self.record(
                    batch,
                    OutcomeKind::Submitted,
                    ctx.attempt,
                    None,
                    Some(change.clone()),
                )?;
                Ok(StageResult::Finished(Finish {
                    outcome: OutcomeKind::Submitted,
                    diagnostic: None,
                    change: Some(change),
                }))
            }
            Err(err) => {
                machine.advance(BatchState::SubmissionFailed)?;
                Ok(StageResult::Failed(BatchState::SubmissionFailed, err.diagnostic()))
            }
        }
    }

    fn context(&self, attempt: u32) -> StageContext {
        StageContext {
            run_id: self.run_id.clone(),
            schema_name: self.schema.name.clone(),
            attempt,
            dry_run: self.dry_run,
        }
    }

    fn record(
        &self,
        batch: &Batch,
        outcome: OutcomeKind,
        attempts: u32,
        diagnostic: Option<String>,
        change: Option<Change>,
    ) -> Result<RecordStatus, AppError> {
        let mut record = LedgerRecord::new(batch.identity.clone(), outcome)
            .with_title(batch.title.clone())
            .with_schema(self.schema.name.clone())
            .with_attempts(attempts);
        record.diagnostic = diagnostic;
        record.change = change;
        self.ledger.record(record).map_err(|mut err| {
            err.add_context("identity", batch.identity.as_str());
            err
        })
    }

    /// Returns false when the run was cancelled during the delay.
    async fn sleep_or_cancel(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

enum StageResult {
    Finished(Finish),
    Failed(BatchState, String),
    Interrupted,
}

/// Outcome for a lifecycle stopped by cancellation.
///
/// A batch that never failed stays Pending; otherwise the last recorded
/// failure stands.
fn interrupted(last_failure: Option<Finish>) -> Finish {
    tracing::info!("batch interrupted by cancellation");
    match last_failure {
        Some(mut finish) => {
            let detail = finish.diagnostic.take().unwrap_or_default();
            finish.diagnostic = Some(format!("{} (cancelled before retry)", detail));
            finish
        }
        None => Finish {
            outcome: OutcomeKind::Pending,
            diagnostic: Some("cancelled".to_string()),
            change: None,
        },
    }
}

/// Run one stage future with an optional timeout, converting panics to errors.
async fn invoke<T, F>(stage: &'static str, timeout: Option<Duration>, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    let guarded = AssertUnwindSafe(fut).catch_unwind();
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, guarded).await {
            Ok(outcome) => outcome,
            Err(_) => {
                return Err(AppError::new(
                    ErrorCategory::TimeoutError,
                    format!("{} timed out after {}", stage, humantime::format_duration(limit)),
                )
                .with_code("AS-STAGE-002"))
            }
        },
        None => guarded.await,
    };
    match outcome {
        Ok(result) => result,
        Err(payload) => Err(AppError::new(
            ErrorCategory::InternalError,
            format!("{} panicked: {}", stage, panic_message(payload.as_ref())),
        )
        .with_code("AS-STAGE-003")),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
