#[path = "../common/mod.rs"]
mod common;

use autoshift::core::error::{AppError, InputError};
use autoshift::core::pipeline::lifecycle::DRY_RUN_DIAGNOSTIC;
use autoshift::core::pipeline::{
    ComponentRegistry, ExecutionOptions, Input, Item, ItemStream, Ledger, MemoryLedger,
    Orchestrator, RunReport, SchemaDocument, Submitter, Transformer, Validator,
};
use autoshift::core::types::{ErrorCategory, OutcomeKind};
use common::{
    keys, scripted_schema, scripted_schema_with, CountingSubmitter, Harness, ScriptedTransformer,
    ScriptedValidator, ALWAYS,
};
use futures::StreamExt;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

async fn execute(
    harness: &Harness,
    schema: &SchemaDocument,
    ledger: Arc<dyn Ledger>,
    options: ExecutionOptions,
) -> RunReport {
    Orchestrator::new(harness.registry())
        .execute(schema, ledger, options)
        .await
        .expect("run should not fail fatally")
}

fn outcome_of(report: &RunReport, title: &str) -> OutcomeKind {
    report
        .batches
        .values()
        .find(|batch| batch.title == title)
        .map(|batch| batch.outcome)
        .unwrap_or_else(|| panic!("no batch titled {}", title))
}

fn attempts_of(report: &RunReport, title: &str) -> u32 {
    report
        .batches
        .values()
        .find(|batch| batch.title == title)
        .map(|batch| batch.attempts)
        .unwrap_or_else(|| panic!("no batch titled {}", title))
}

#[tokio::test]
async fn test_ten_items_with_one_flaky_transform() {
    let harness = Harness::new(
        ScriptedTransformer::new().fail_times("item-03", 1),
        CountingSubmitter::new(),
    );
    let keys = keys(10);
    let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
    let schema = scripted_schema("ten-items", &keys);

    let report = execute(
        &harness,
        &schema,
        Arc::new(MemoryLedger::new()),
        ExecutionOptions::new(),
    )
    .await;

    assert_eq!(report.batches.len(), 10);
    assert_eq!(report.count(OutcomeKind::Submitted), 10);
    assert!(report.failures().is_empty());
    assert!(report.is_success());

    let first_try = report.batches.values().filter(|b| b.attempts == 1).count();
    assert_eq!(first_try, 9);
    assert_eq!(attempts_of(&report, "item-03"), 2);
    assert_eq!(harness.transformer.total_calls(), 11);
    assert_eq!(harness.submitter.submitted().len(), 10);
}

#[tokio::test]
async fn test_retry_exhaustion_keeps_other_batches_isolated() {
    let harness = Harness::new(
        ScriptedTransformer::new().fail_times("b", ALWAYS),
        CountingSubmitter::new(),
    );
    let schema = scripted_schema("isolation", &["a", "b", "c"]);
    let ledger = Arc::new(MemoryLedger::new());

    let report = execute(&harness, &schema, ledger.clone(), ExecutionOptions::new()).await;

    assert_eq!(outcome_of(&report, "a"), OutcomeKind::Submitted);
    assert_eq!(outcome_of(&report, "c"), OutcomeKind::Submitted);
    assert_eq!(outcome_of(&report, "b"), OutcomeKind::TransformFailed);
    assert_eq!(attempts_of(&report, "b"), 3);
    assert_eq!(harness.transformer.calls("b"), 3);
    assert!(!report.is_success());

    let failed = report.failures();
    assert_eq!(failed.len(), 1);
    let diagnostic = failed[0].diagnostic.as_deref().unwrap();
    assert!(diagnostic.contains("TEST-TRANSFORM"), "{}", diagnostic);

    // clean after each failed attempt, rewind once per finished batch
    assert_eq!(harness.submitter.cleaned(), 3);
    assert_eq!(harness.submitter.rewound(), 3);

    let record = ledger.get(&failed[0].identity).unwrap().unwrap();
    assert_eq!(record.outcome, OutcomeKind::TransformFailed);
    assert_eq!(record.attempts, 3);
}

#[tokio::test]
async fn test_max_retries_override_limits_attempts() {
    let harness = Harness::new(
        ScriptedTransformer::new().fail_times("only", ALWAYS),
        CountingSubmitter::new(),
    );
    let schema = scripted_schema("override", &["only"]);

    let report = execute(
        &harness,
        &schema,
        Arc::new(MemoryLedger::new()),
        ExecutionOptions::new().with_max_retries(0),
    )
    .await;

    assert_eq!(attempts_of(&report, "only"), 1);
    assert_eq!(harness.transformer.calls("only"), 1);
}

#[tokio::test]
async fn test_validation_failure_is_not_retried_by_default() {
    let harness = Harness::new(ScriptedTransformer::new(), CountingSubmitter::new())
        .with_validator(ScriptedValidator::new().reject("bad"));
    let schema = scripted_schema("validation", &["good", "bad"]);

    let report = execute(
        &harness,
        &schema,
        Arc::new(MemoryLedger::new()),
        ExecutionOptions::new(),
    )
    .await;

    assert_eq!(outcome_of(&report, "bad"), OutcomeKind::ValidationFailed);
    assert_eq!(attempts_of(&report, "bad"), 1);
    assert_eq!(outcome_of(&report, "good"), OutcomeKind::Submitted);
    assert_eq!(harness.submitter.submissions_of("bad"), 0);
}

#[tokio::test]
async fn test_error_verdict_exceeds_allowed_warning_level() {
    let harness = Harness::new(ScriptedTransformer::new(), CountingSubmitter::new())
        .with_validator(ScriptedValidator::new().reject("bad"));
    let schema = scripted_schema_with(
        "validation-level",
        &["bad"],
        "  allowed_validation_level: warning",
    );

    let report = execute(
        &harness,
        &schema,
        Arc::new(MemoryLedger::new()),
        ExecutionOptions::new(),
    )
    .await;

    // the scripted validator reports `error`, which still exceeds `warning`
    assert_eq!(outcome_of(&report, "bad"), OutcomeKind::ValidationFailed);
}

#[tokio::test]
async fn test_submission_failure_is_retried() {
    let harness = Harness::new(
        ScriptedTransformer::new(),
        CountingSubmitter::new().fail_times("flaky", 1),
    );
    let schema = scripted_schema("submit-retry", &["flaky"]);

    let report = execute(
        &harness,
        &schema,
        Arc::new(MemoryLedger::new()),
        ExecutionOptions::new(),
    )
    .await;

    assert_eq!(outcome_of(&report, "flaky"), OutcomeKind::Submitted);
    assert_eq!(attempts_of(&report, "flaky"), 2);
    assert_eq!(harness.submitter.submissions_of("flaky"), 1);
    let change = report.batches.values().next().unwrap().change.clone();
    assert!(change.unwrap().url.unwrap().starts_with("https://review.test/"));
}

#[tokio::test]
async fn test_ten_items_with_one_flaky_submission() {
    let harness = Harness::new(
        ScriptedTransformer::new(),
        CountingSubmitter::new().fail_times("item-06", 1),
    );
    let keys = keys(10);
    let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
    let schema = scripted_schema("ten-submissions", &keys);
    let ledger = Arc::new(MemoryLedger::new());

    let report = execute(&harness, &schema, ledger.clone(), ExecutionOptions::new()).await;

    assert_eq!(report.batches.len(), 10);
    assert_eq!(report.count(OutcomeKind::Submitted), 10);
    assert!(report.is_success());
    assert_eq!(report.batches.values().filter(|b| b.attempts == 1).count(), 9);
    assert_eq!(attempts_of(&report, "item-06"), 2);

    // the failed attempt was cleaned and the retry re-ran the transform
    assert_eq!(harness.submitter.cleaned(), 1);
    assert_eq!(harness.transformer.calls("item-06"), 2);
    assert_eq!(harness.transformer.total_calls(), 11);
    assert_eq!(harness.submitter.submitted().len(), 10);
    assert_eq!(harness.submitter.submissions_of("item-06"), 1);
    for batch in report.batches.values() {
        assert!(ledger.submitted(&batch.identity).unwrap());
    }
}

#[tokio::test]
async fn test_dry_run_never_submits() {
    let harness = Harness::new(ScriptedTransformer::new(), CountingSubmitter::new());
    let schema = scripted_schema("dry", &["a", "b"]);
    let ledger = Arc::new(MemoryLedger::new());

    let report = execute(
        &harness,
        &schema,
        ledger.clone(),
        ExecutionOptions::new().with_dry_run(true),
    )
    .await;

    assert!(report.dry_run);
    assert!(report.is_success());
    assert_eq!(report.count(OutcomeKind::Pending), 2);
    assert!(harness.submitter.submitted().is_empty());
    assert_eq!(harness.validator.calls(), 2);

    for record in ledger.records().unwrap() {
        assert_eq!(record.outcome, OutcomeKind::Pending);
        assert_eq!(record.diagnostic.as_deref(), Some(DRY_RUN_DIAGNOSTIC));
    }
}

#[tokio::test]
async fn test_filters_that_reject_everything_produce_no_batches() {
    let harness = Harness::new(ScriptedTransformer::new(), CountingSubmitter::new());
    let schema = SchemaDocument::from_str(
        r#"
name: reject-all
input: { name: inline, params: { keys: [a.py, b.py, c.rs] } }
filters:
  - { name: regex, params: { pattern: "^nothing$" } }
batcher: { name: single }
transformer: { name: scripted }
validator: { name: scripted }
submitter: { name: counting }
"#,
    )
    .unwrap();

    let report = execute(
        &harness,
        &schema,
        Arc::new(MemoryLedger::new()),
        ExecutionOptions::new(),
    )
    .await;

    assert_eq!(report.items_seen, 3);
    assert_eq!(report.items_accepted, 0);
    assert!(report.batches.is_empty());
    assert!(report.is_success());
    assert_eq!(harness.transformer.total_calls(), 0);
}

#[tokio::test]
async fn test_filter_chain_and_inverted_filters() {
    let harness = Harness::new(ScriptedTransformer::new(), CountingSubmitter::new());
    let schema = SchemaDocument::from_str(
        r#"
name: filter-chain
input: { name: inline, params: { keys: [src/a.py, src/b.py, src/test_c.py, lib/d.rs] } }
filters:
  - { name: extension, params: { extensions: [py] } }
  - { name: regex, params: { pattern: "test_" }, inverted: true }
batcher: { name: single }
transformer: { name: scripted }
validator: { name: scripted }
submitter: { name: counting }
options: { retry: { backoff_ms: 0 } }
"#,
    )
    .unwrap();

    let report = execute(
        &harness,
        &schema,
        Arc::new(MemoryLedger::new()),
        ExecutionOptions::new(),
    )
    .await;

    let titles: BTreeSet<String> = report.batches.values().map(|b| b.title.clone()).collect();
    assert_eq!(
        titles,
        BTreeSet::from(["src/a.py".to_string(), "src/b.py".to_string()])
    );
}

#[tokio::test]
async fn test_concurrency_bounds_in_flight_batches() {
    let harness = Harness::new(
        ScriptedTransformer::new(),
        CountingSubmitter::new().with_delay(Duration::from_millis(20)),
    );
    let keys = keys(8);
    let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
    let schema = scripted_schema("bounded", &keys);

    let report = execute(
        &harness,
        &schema,
        Arc::new(MemoryLedger::new()),
        ExecutionOptions::new().with_concurrency(2),
    )
    .await;

    assert_eq!(report.count(OutcomeKind::Submitted), 8);
    assert!(harness.submitter.max_in_flight() <= 2);
    assert!(harness.submitter.max_in_flight() >= 1);
}

#[tokio::test]
async fn test_failed_rewind_of_shared_tree_halts_the_run() {
    let harness = Harness::new(
        ScriptedTransformer::new(),
        CountingSubmitter::new()
            .sharing_working_tree()
            .fail_rewind_on("a"),
    );
    let schema = scripted_schema("broken-rewind", &["a", "b", "c"]);
    let ledger = Arc::new(MemoryLedger::new());

    let err = Orchestrator::new(harness.registry())
        .execute(&schema, ledger.clone(), ExecutionOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.code, "AS-STAGE-006");
    assert!(err.message.contains("scripted rewind failure for a"), "{}", err.message);
    assert!(err.context.contains_key("identity"));

    // nothing else ran on top of the unrestored tree
    assert_eq!(harness.submitter.submitted(), vec!["a".to_string()]);
    assert_eq!(harness.transformer.total_calls(), 1);
    assert_eq!(ledger.records().unwrap().len(), 1);
    assert!(ledger.records().unwrap()[0].is_submitted());
}

#[tokio::test]
async fn test_failed_rewind_of_private_tree_is_only_logged() {
    let harness = Harness::new(
        ScriptedTransformer::new(),
        CountingSubmitter::new().fail_rewind_on("a"),
    );
    let schema = scripted_schema("private-rewind", &["a", "b", "c"]);

    let report = execute(
        &harness,
        &schema,
        Arc::new(MemoryLedger::new()),
        ExecutionOptions::new(),
    )
    .await;

    assert_eq!(report.count(OutcomeKind::Submitted), 3);
    assert_eq!(harness.submitter.rewound(), 3);
}

#[tokio::test]
async fn test_shared_working_tree_forces_sequential_batches() {
    let harness = Harness::new(
        ScriptedTransformer::new(),
        CountingSubmitter::new()
            .with_delay(Duration::from_millis(10))
            .sharing_working_tree(),
    );
    let schema = scripted_schema("sequential", &["a", "b", "c", "d"]);

    let report = execute(
        &harness,
        &schema,
        Arc::new(MemoryLedger::new()),
        ExecutionOptions::new().with_concurrency(4),
    )
    .await;

    assert_eq!(report.count(OutcomeKind::Submitted), 4);
    assert_eq!(harness.submitter.max_in_flight(), 1);
}

#[tokio::test]
async fn test_stage_panic_is_contained_to_its_batch() {
    let harness = Harness::new(
        ScriptedTransformer::new().panic_on("boom"),
        CountingSubmitter::new(),
    );
    let schema = scripted_schema_with("panics", &["boom", "fine"], "  max_retries: 0");

    let report = execute(
        &harness,
        &schema,
        Arc::new(MemoryLedger::new()),
        ExecutionOptions::new(),
    )
    .await;

    assert_eq!(outcome_of(&report, "boom"), OutcomeKind::TransformFailed);
    assert_eq!(outcome_of(&report, "fine"), OutcomeKind::Submitted);
    let diagnostic = report
        .failures()
        .first()
        .and_then(|b| b.diagnostic.clone())
        .unwrap();
    assert!(diagnostic.contains("AS-STAGE-003"), "{}", diagnostic);
}

#[tokio::test]
async fn test_stage_timeout_fails_the_attempt() {
    let harness = Harness::new(
        ScriptedTransformer::new().with_delay(Duration::from_millis(500)),
        CountingSubmitter::new(),
    );
    let schema = scripted_schema_with(
        "timeouts",
        &["slow"],
        "  max_retries: 0\n  timeouts:\n    transform_ms: 20",
    );

    let report = execute(
        &harness,
        &schema,
        Arc::new(MemoryLedger::new()),
        ExecutionOptions::new(),
    )
    .await;

    assert_eq!(outcome_of(&report, "slow"), OutcomeKind::TransformFailed);
    let diagnostic = report.failures()[0].diagnostic.clone().unwrap();
    assert!(diagnostic.contains("AS-STAGE-002"), "{}", diagnostic);
}

#[tokio::test]
async fn test_item_limit_caps_enumeration() {
    let harness = Harness::new(ScriptedTransformer::new(), CountingSubmitter::new());
    let keys = keys(10);
    let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
    let schema = scripted_schema_with("limited", &keys, "  item_limit: 3");

    let report = execute(
        &harness,
        &schema,
        Arc::new(MemoryLedger::new()),
        ExecutionOptions::new(),
    )
    .await;

    assert_eq!(report.items_seen, 3);
    assert_eq!(report.batches.len(), 3);
}

#[tokio::test]
async fn test_partitioning_is_deterministic_across_runs() {
    let schema = scripted_schema("deterministic", &["x", "y", "z"]);

    let first = Harness::new(ScriptedTransformer::new(), CountingSubmitter::new());
    let a = execute(
        &first,
        &schema,
        Arc::new(MemoryLedger::new()),
        ExecutionOptions::new(),
    )
    .await;
    let second = Harness::new(ScriptedTransformer::new(), CountingSubmitter::new());
    let b = execute(
        &second,
        &schema,
        Arc::new(MemoryLedger::new()),
        ExecutionOptions::new(),
    )
    .await;

    let ids_a: Vec<_> = a.batches.keys().cloned().collect();
    let ids_b: Vec<_> = b.batches.keys().cloned().collect();
    assert_eq!(ids_a, ids_b);
    assert_ne!(a.run_id, b.run_id);
}

#[tokio::test]
async fn test_cancel_before_start_dispatches_nothing() {
    let harness = Harness::new(ScriptedTransformer::new(), CountingSubmitter::new());
    let schema = scripted_schema("cancelled", &["a", "b"]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = execute(
        &harness,
        &schema,
        Arc::new(MemoryLedger::new()),
        ExecutionOptions::new().with_cancel(cancel),
    )
    .await;

    assert!(report.cancelled);
    assert!(report.failures().is_empty());
    assert!(harness.submitter.submitted().is_empty());
    assert_eq!(harness.transformer.total_calls(), 0);
}

#[tokio::test]
async fn test_cancel_mid_run_leaves_remaining_batches_pending() {
    let harness = Harness::new(
        ScriptedTransformer::new(),
        CountingSubmitter::new().with_delay(Duration::from_millis(60)),
    );
    let schema = scripted_schema("interrupted", &["a", "b", "c", "d", "e"]);
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cancel.cancel();
        });
    }

    let report = execute(
        &harness,
        &schema,
        Arc::new(MemoryLedger::new()),
        ExecutionOptions::new().with_concurrency(1).with_cancel(cancel),
    )
    .await;

    assert!(report.cancelled);
    assert!(report.failures().is_empty());
    assert!(report.count(OutcomeKind::Submitted) < 5);
    for batch in report.batches.values() {
        assert!(
            matches!(batch.outcome, OutcomeKind::Submitted | OutcomeKind::Pending),
            "unexpected outcome {:?}",
            batch.outcome
        );
    }
}

struct FlakyInput;

impl Input for FlakyInput {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn items(&self) -> ItemStream {
        futures::stream::iter(vec![
            Ok(Item::new("first")),
            Ok(Item::new("second")),
            Err(InputError::recoverable("listing rate limited")),
            Ok(Item::new("never-seen")),
        ])
        .boxed()
    }
}

fn flaky_registry(harness: &Harness) -> ComponentRegistry {
    let mut builder = ComponentRegistry::builder();
    builder.register_input("flaky", |_| Ok(Arc::new(FlakyInput) as Arc<dyn Input>));
    builder.register_batcher("single", |params| {
        Ok(Arc::new(
            autoshift::core::pipeline::builtins::batchers::SingleBatcher::from_params(params)?,
        ) as Arc<dyn autoshift::core::pipeline::BatchPolicy>)
    });
    let transformer = harness.transformer.clone();
    builder.register_transformer("scripted", move |_| {
        Ok(transformer.clone() as Arc<dyn Transformer>)
    });
    let validator = harness.validator.clone();
    builder.register_validator("scripted", move |_| {
        Ok(validator.clone() as Arc<dyn Validator>)
    });
    let submitter = harness.submitter.clone();
    builder.register_submitter("counting", move |_| {
        Ok(submitter.clone() as Arc<dyn Submitter>)
    });
    builder.build()
}

#[tokio::test]
async fn test_recoverable_input_error_keeps_items_already_seen() {
    let harness = Harness::new(ScriptedTransformer::new(), CountingSubmitter::new());
    let schema = SchemaDocument::from_str(
        r#"
name: flaky-input
input: { name: flaky }
batcher: { name: single }
transformer: { name: scripted }
validator: { name: scripted }
submitter: { name: counting }
"#,
    )
    .unwrap();

    let report = Orchestrator::new(flaky_registry(&harness))
        .execute(&schema, Arc::new(MemoryLedger::new()), ExecutionOptions::new())
        .await
        .unwrap();

    assert_eq!(report.items_seen, 2);
    assert_eq!(report.count(OutcomeKind::Submitted), 2);
    let diagnostic = report.input_diagnostic.unwrap();
    assert!(diagnostic.contains("AS-INPUT-002"), "{}", diagnostic);
}

#[tokio::test]
async fn test_fatal_input_error_aborts_the_run() {
    let harness = Harness::new(ScriptedTransformer::new(), CountingSubmitter::new());
    let schema = SchemaDocument::from_str(
        r#"
name: missing-root
input: { name: directory, params: { paths: [definitely/missing/root] } }
batcher: { name: single }
transformer: { name: scripted }
validator: { name: scripted }
submitter: { name: counting }
"#,
    )
    .unwrap();

    let result: Result<RunReport, AppError> = Orchestrator::new(harness.registry())
        .execute(&schema, Arc::new(MemoryLedger::new()), ExecutionOptions::new())
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.category, ErrorCategory::InputError);
    assert!(err.is_fatal());
    assert_eq!(harness.transformer.total_calls(), 0);
}

#[tokio::test]
async fn test_unknown_component_fails_before_any_work() {
    let harness = Harness::new(ScriptedTransformer::new(), CountingSubmitter::new());
    let schema = SchemaDocument::from_str(
        r#"
name: unknown
input: { name: inline, params: { keys: [a] } }
batcher: { name: single }
transformer: { name: does-not-exist }
validator: { name: scripted }
submitter: { name: counting }
"#,
    )
    .unwrap();

    let err = Orchestrator::new(harness.registry())
        .execute(&schema, Arc::new(MemoryLedger::new()), ExecutionOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.category, ErrorCategory::LoadError);
    assert_eq!(err.code, "AS-LOAD-003");
}
