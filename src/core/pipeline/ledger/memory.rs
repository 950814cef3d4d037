#![allow(clippy::result_large_err)]

use super::{Ledger, LedgerRecord, RecordStatus};
use crate::core::error::AppError;
use crate::core::pipeline::batch::BatchIdentity;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Process-local ledger; used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: DashMap<BatchIdentity, LedgerRecord>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the ledger with records from an earlier run.
    pub fn with_records<I: IntoIterator<Item = LedgerRecord>>(records: I) -> Self {
        let ledger = Self::new();
        for record in records {
            ledger.records.insert(record.identity.clone(), record);
        }
        ledger
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Ledger for MemoryLedger {
    fn get(&self, identity: &BatchIdentity) -> Result<Option<LedgerRecord>, AppError> {
        Ok(self.records.get(identity).map(|entry| entry.value().clone()))
    }

    fn record(&self, record: LedgerRecord) -> Result<RecordStatus, AppError> {
        match self.records.entry(record.identity.clone()) {
            Entry::Occupied(existing) if existing.get().is_submitted() => {
                Ok(RecordStatus::AlreadySubmitted)
            }
            Entry::Occupied(mut existing) => {
                existing.insert(record);
                Ok(RecordStatus::Written)
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(RecordStatus::Written)
            }
        }
    }

    fn records(&self) -> Result<Vec<LedgerRecord>, AppError> {
        let mut records: Vec<LedgerRecord> =
            self.records.iter().map(|entry| entry.value().clone()).collect();
        records.sort_by(|a, b| a.identity.cmp(&b.identity));
        Ok(records)
    }
}
