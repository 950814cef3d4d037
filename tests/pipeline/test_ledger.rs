use autoshift::core::pipeline::{
    BatchIdentity, Change, FileLedger, Ledger, LedgerRecord, MemoryLedger, RecordStatus,
};
use autoshift::core::types::{ErrorCategory, OutcomeKind};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn identity(name: &str) -> BatchIdentity {
    BatchIdentity::compute(name, [name])
}

fn submitted_never_overwritten(ledger: &dyn Ledger) {
    let id = identity("batch");
    ledger
        .record(LedgerRecord::new(id.clone(), OutcomeKind::Pending))
        .unwrap();
    ledger
        .record(
            LedgerRecord::new(id.clone(), OutcomeKind::Submitted)
                .with_attempts(1)
                .with_change(Change::new("change-1")),
        )
        .unwrap();

    let status = ledger
        .record(LedgerRecord::new(id.clone(), OutcomeKind::TransformFailed).with_attempts(2))
        .unwrap();
    assert_eq!(status, RecordStatus::AlreadySubmitted);

    let stored = ledger.get(&id).unwrap().unwrap();
    assert_eq!(stored.outcome, OutcomeKind::Submitted);
    assert_eq!(stored.change.unwrap().reference, "change-1");
    assert!(ledger.submitted(&id).unwrap());
}

fn failures_are_overwritten(ledger: &dyn Ledger) {
    let id = identity("retry");
    ledger
        .record(
            LedgerRecord::new(id.clone(), OutcomeKind::TransformFailed)
                .with_attempts(1)
                .with_diagnostic("first"),
        )
        .unwrap();
    ledger
        .record(
            LedgerRecord::new(id.clone(), OutcomeKind::ValidationFailed)
                .with_attempts(2)
                .with_diagnostic("second"),
        )
        .unwrap();

    let stored = ledger.get(&id).unwrap().unwrap();
    assert_eq!(stored.outcome, OutcomeKind::ValidationFailed);
    assert_eq!(stored.diagnostic.as_deref(), Some("second"));
    assert!(!ledger.submitted(&id).unwrap());
}

#[test]
fn test_memory_ledger_semantics() {
    let ledger = MemoryLedger::new();
    submitted_never_overwritten(&ledger);
    failures_are_overwritten(&ledger);
    assert_eq!(ledger.records().unwrap().len(), 2);
    assert!(ledger.get(&identity("unknown")).unwrap().is_none());
}

#[test]
fn test_file_ledger_semantics() {
    let dir = TempDir::new().unwrap();
    let ledger = FileLedger::open(dir.path()).unwrap();
    submitted_never_overwritten(&ledger);
    failures_are_overwritten(&ledger);
    assert_eq!(ledger.records().unwrap().len(), 2);
}

#[test]
fn test_file_ledger_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let id = identity("durable");
    {
        let ledger = FileLedger::open(dir.path()).unwrap();
        ledger
            .record(
                LedgerRecord::new(id.clone(), OutcomeKind::Submitted)
                    .with_title("durable batch")
                    .with_schema("schema-a"),
            )
            .unwrap();
    }

    let reopened = FileLedger::open(dir.path()).unwrap();
    let record = reopened.get(&id).unwrap().unwrap();
    assert_eq!(record.title, "durable batch");
    assert_eq!(record.schema_name, "schema-a");
    assert!(record.is_submitted());

    let records_dir = dir.path().join("records");
    let files: Vec<_> = std::fs::read_dir(records_dir).unwrap().collect();
    assert_eq!(files.len(), 1, "no temp files left behind");
}

#[test]
fn test_file_ledger_history_is_opt_in() {
    let dir = TempDir::new().unwrap();
    let id = identity("history");

    let plain = FileLedger::open(dir.path()).unwrap();
    plain
        .record(LedgerRecord::new(id.clone(), OutcomeKind::Pending))
        .unwrap();
    assert!(plain.history(&id).unwrap().is_empty());

    let tracked = FileLedger::open(dir.path()).unwrap().with_history(true);
    tracked
        .record(LedgerRecord::new(id.clone(), OutcomeKind::TransformFailed).with_attempts(1))
        .unwrap();
    tracked
        .record(LedgerRecord::new(id.clone(), OutcomeKind::Submitted).with_attempts(2))
        .unwrap();

    let history = tracked.history(&id).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].outcome, OutcomeKind::TransformFailed);
    assert_eq!(history[1].outcome, OutcomeKind::Submitted);
}

#[test]
fn test_file_ledger_binds_to_one_schema() {
    let dir = TempDir::new().unwrap();
    let ledger = FileLedger::open(dir.path()).unwrap();

    ledger.bind("schema-a", "hash-1").unwrap();
    // a content change under the same name is allowed
    ledger.bind("schema-a", "hash-2").unwrap();
    let manifest = ledger.manifest().unwrap().unwrap();
    assert_eq!(manifest.schema_hash, "hash-2");

    let err = ledger.bind("schema-b", "hash-1").unwrap_err();
    assert_eq!(err.category, ErrorCategory::LedgerError);
    assert_eq!(err.code, "AS-LEDGER-003");
}

#[test]
fn test_file_ledger_rejects_unsafe_identities() {
    let dir = TempDir::new().unwrap();
    let ledger = FileLedger::open(dir.path()).unwrap();

    let err = ledger
        .record(LedgerRecord::new(
            BatchIdentity::from_raw("../escape"),
            OutcomeKind::Pending,
        ))
        .unwrap_err();
    assert_eq!(err.code, "AS-LEDGER-004");
}

#[test]
fn test_concurrent_writers_never_demote_submitted() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(FileLedger::open(dir.path()).unwrap());
    let id = identity("contended");

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let ledger = ledger.clone();
            let id = id.clone();
            thread::spawn(move || {
                for attempt in 0..20u32 {
                    let outcome = if worker == 0 && attempt == 5 {
                        OutcomeKind::Submitted
                    } else {
                        OutcomeKind::TransformFailed
                    };
                    ledger
                        .record(LedgerRecord::new(id.clone(), outcome).with_attempts(attempt))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stored = ledger.get(&id).unwrap().unwrap();
    assert_eq!(stored.outcome, OutcomeKind::Submitted);
}
