#[path = "../common/mod.rs"]
mod common;

use autoshift::core::pipeline::lifecycle::SUBMIT_IN_PROGRESS_DIAGNOSTIC;
use autoshift::core::pipeline::{
    BatchIdentity, ExecutionOptions, FileLedger, Ledger, LedgerRecord, Orchestrator, RunReport,
    SchemaDocument,
};
use autoshift::core::types::{ErrorCategory, OutcomeKind};
use common::{scripted_schema, CountingSubmitter, Harness, ScriptedTransformer, ALWAYS};
use std::sync::Arc;
use tempfile::TempDir;

async fn run_once(harness: &Harness, schema: &SchemaDocument, ledger_dir: &TempDir) -> RunReport {
    let ledger = FileLedger::open(ledger_dir.path()).unwrap();
    Orchestrator::new(harness.registry())
        .execute(schema, Arc::new(ledger), ExecutionOptions::new())
        .await
        .unwrap()
}

fn identity_of(report: &RunReport, title: &str) -> BatchIdentity {
    report
        .batches
        .values()
        .find(|batch| batch.title == title)
        .map(|batch| batch.identity.clone())
        .unwrap()
}

#[tokio::test]
async fn test_rerun_skips_submitted_and_retries_failed() {
    let ledger_dir = TempDir::new().unwrap();
    let schema = scripted_schema("resume", &["b1", "b2"]);

    let first = Harness::new(
        ScriptedTransformer::new().fail_times("b2", ALWAYS),
        CountingSubmitter::new(),
    );
    let report = run_once(&first, &schema, &ledger_dir).await;
    assert_eq!(report.count(OutcomeKind::Submitted), 1);
    assert_eq!(report.count(OutcomeKind::TransformFailed), 1);

    let second = Harness::new(ScriptedTransformer::new(), CountingSubmitter::new());
    let report = run_once(&second, &schema, &ledger_dir).await;

    let b1 = report.batch(&identity_of(&report, "b1")).unwrap();
    assert_eq!(b1.outcome, OutcomeKind::Skipped);
    assert_eq!(b1.attempts, 0);
    assert!(b1.change.is_some(), "skipped batch reports the recorded change");

    let b2 = report.batch(&identity_of(&report, "b2")).unwrap();
    assert_eq!(b2.outcome, OutcomeKind::Submitted);

    assert_eq!(second.transformer.calls("b1"), 0);
    assert_eq!(second.submitter.submissions_of("b1"), 0);
    assert_eq!(first.submitter.submissions_of("b1"), 1);
    assert!(report.is_success());
}

#[tokio::test]
async fn test_fully_submitted_run_is_a_noop_on_rerun() {
    let ledger_dir = TempDir::new().unwrap();
    let schema = scripted_schema("idempotent", &["x", "y", "z"]);

    let first = Harness::new(ScriptedTransformer::new(), CountingSubmitter::new());
    run_once(&first, &schema, &ledger_dir).await;

    let second = Harness::new(ScriptedTransformer::new(), CountingSubmitter::new());
    let report = run_once(&second, &schema, &ledger_dir).await;

    assert_eq!(report.count(OutcomeKind::Skipped), 3);
    assert_eq!(second.transformer.total_calls(), 0);
    assert!(second.submitter.submitted().is_empty());
    assert_eq!(second.submitter.rewound(), 0);
}

#[tokio::test]
async fn test_interrupted_submission_is_resubmitted() {
    let ledger_dir = TempDir::new().unwrap();
    let schema = scripted_schema("crash", &["only"]);

    // learn the identity with a dry run, then simulate a crash mid-submit
    let dry = Harness::new(ScriptedTransformer::new(), CountingSubmitter::new());
    let ledger = FileLedger::open(ledger_dir.path()).unwrap();
    let report = Orchestrator::new(dry.registry())
        .execute(
            &schema,
            Arc::new(ledger),
            ExecutionOptions::new().with_dry_run(true),
        )
        .await
        .unwrap();
    let identity = identity_of(&report, "only");

    let ledger = FileLedger::open(ledger_dir.path()).unwrap();
    ledger
        .record(
            LedgerRecord::new(identity.clone(), OutcomeKind::Pending)
                .with_title("only")
                .with_schema("crash")
                .with_attempts(1)
                .with_diagnostic(SUBMIT_IN_PROGRESS_DIAGNOSTIC),
        )
        .unwrap();

    let harness = Harness::new(ScriptedTransformer::new(), CountingSubmitter::new());
    let report = run_once(&harness, &schema, &ledger_dir).await;

    assert_eq!(report.batch(&identity).unwrap().outcome, OutcomeKind::Submitted);
    assert_eq!(harness.submitter.submissions_of("only"), 1);

    let record = FileLedger::open(ledger_dir.path())
        .unwrap()
        .get(&identity)
        .unwrap()
        .unwrap();
    assert!(record.is_submitted());
    assert!(record.change.is_some());
}

#[tokio::test]
async fn test_ledger_bound_to_another_schema_is_rejected() {
    let ledger_dir = TempDir::new().unwrap();

    let harness = Harness::new(ScriptedTransformer::new(), CountingSubmitter::new());
    run_once(&harness, &scripted_schema("first-schema", &["a"]), &ledger_dir).await;

    let ledger = FileLedger::open(ledger_dir.path()).unwrap();
    let err = Orchestrator::new(harness.registry())
        .execute(
            &scripted_schema("second-schema", &["a"]),
            Arc::new(ledger),
            ExecutionOptions::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.category, ErrorCategory::LedgerError);
    assert_eq!(err.code, "AS-LEDGER-003");
}

#[tokio::test]
async fn test_changed_item_set_produces_new_identities() {
    let ledger_dir = TempDir::new().unwrap();
    let harness = Harness::new(ScriptedTransformer::new(), CountingSubmitter::new());
    let schema = SchemaDocument::from_str(
        r#"
name: chunked
input: { name: inline, params: { keys: [a, b, c] } }
batcher: { name: chunk, params: { title: all files } }
transformer: { name: scripted }
validator: { name: scripted }
submitter: { name: counting }
"#,
    )
    .unwrap();
    let first = run_once(&harness, &schema, &ledger_dir).await;

    let mut grown = schema.clone();
    grown.input = Some(
        autoshift::core::pipeline::ComponentRef::new("inline")
            .with_params(serde_json::json!({ "keys": ["a", "b", "c", "d"] })),
    );
    let second = run_once(&harness, &grown, &ledger_dir).await;

    let first_ids: Vec<_> = first.batches.keys().collect();
    let second_ids: Vec<_> = second.batches.keys().collect();
    assert_ne!(first_ids, second_ids);
    assert_eq!(second.count(OutcomeKind::Submitted), 1);
    assert_eq!(harness.submitter.submissions_of("all files"), 2);
}
