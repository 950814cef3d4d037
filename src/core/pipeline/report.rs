#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::pipeline::batch::{Batch, BatchIdentity};
use crate::core::pipeline::component::Change;
use crate::core::types::{ErrorCategory, OutcomeKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Final state of one batch within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub identity: BatchIdentity,
    pub title: String,
    pub outcome: OutcomeKind,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<Change>,
    pub item_keys: Vec<String>,
}

impl BatchReport {
    pub fn from_batch(batch: &Batch, outcome: OutcomeKind, attempts: u32) -> Self {
        Self {
            identity: batch.identity.clone(),
            title: batch.title.clone(),
            outcome,
            attempts,
            diagnostic: None,
            change: None,
            item_keys: batch.item_keys(),
        }
    }

    pub fn with_diagnostic(mut self, diagnostic: Option<String>) -> Self {
        self.diagnostic = diagnostic;
        self
    }

    pub fn with_change(mut self, change: Option<Change>) -> Self {
        self.change = change;
        self
    }
}

/// Summary of a run, keyed by batch identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub schema_name: String,
    pub dry_run: bool,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub items_seen: usize,
    pub items_accepted: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_diagnostic: Option<String>,
    pub batches: BTreeMap<BatchIdentity, BatchReport>,
    pub counts: BTreeMap<OutcomeKind, usize>,
}

impl RunReport {
    pub fn new<R: Into<String>, S: Into<String>>(run_id: R, schema_name: S, dry_run: bool) -> Self {
        Self {
            run_id: run_id.into(),
            schema_name: schema_name.into(),
            dry_run,
            cancelled: false,
            started_at: Utc::now(),
            completed_at: None,
            items_seen: 0,
            items_accepted: 0,
            input_diagnostic: None,
            batches: BTreeMap::new(),
            counts: OutcomeKind::ALL.iter().map(|kind| (*kind, 0)).collect(),
        }
    }

    pub fn insert(&mut self, report: BatchReport) {
        if let Some(previous) = self.batches.insert(report.identity.clone(), report.clone()) {
            if let Some(count) = self.counts.get_mut(&previous.outcome) {
                *count = count.saturating_sub(1);
            }
        }
        *self.counts.entry(report.outcome).or_insert(0) += 1;
    }

    pub fn finish(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    pub fn count(&self, kind: OutcomeKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn batch(&self, identity: &BatchIdentity) -> Option<&BatchReport> {
        self.batches.get(identity)
    }

    /// Batches that ended in a failed outcome.
    pub fn failures(&self) -> Vec<&BatchReport> {
        self.batches
            .values()
            .filter(|report| report.outcome.is_failure())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.failures().is_empty()
    }

    pub fn elapsed(&self) -> std::time::Duration {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - self.started_at).to_std().unwrap_or_default()
    }

    pub fn to_json(&self) -> Result<String, AppError> {
        serde_json::to_string_pretty(self).map_err(|err| {
            AppError::new(
                ErrorCategory::SerializationError,
                format!("failed to serialize run report: {}", err),
            )
        })
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Run {} for schema '{}'{}{}",
            self.run_id,
            self.schema_name,
            if self.dry_run { " (dry run)" } else { "" },
            if self.cancelled { " [cancelled]" } else { "" }
        );
        let elapsed = std::time::Duration::from_secs(self.elapsed().as_secs());
        let _ = writeln!(
            out,
            "Items: {} seen, {} accepted; {} batches in {}",
            self.items_seen,
            self.items_accepted,
            self.batches.len(),
            humantime::format_duration(elapsed)
        );
        if let Some(diagnostic) = &self.input_diagnostic {
            let _ = writeln!(out, "Input stopped early: {}", diagnostic);
        }
        let counts: Vec<String> = self
            .counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(kind, count)| format!("{}={}", kind, count))
            .collect();
        if !counts.is_empty() {
            let _ = writeln!(out, "Outcomes: {}", counts.join(" "));
        }
        for report in self.batches.values() {
            let _ = write!(
                out,
                "  {} {:<18} attempts={} {}",
                report.identity.short(),
                report.outcome.as_str(),
                report.attempts,
                report.title
            );
            if let Some(change) = &report.change {
                let _ = write!(out, " -> {}", change.url.as_deref().unwrap_or(&change.reference));
            }
            let _ = writeln!(out);
            if let Some(diagnostic) = &report.diagnostic {
                let _ = writeln!(out, "      {}", diagnostic);
            }
        }
        out
    }
}
