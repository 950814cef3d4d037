#![allow(clippy::result_large_err)] // File ledger returns AppError to preserve structured I/O context.

use super::{ledger_error, Ledger, LedgerRecord, RecordStatus, LEDGER_FORMAT_VERSION};
use crate::core::error::AppError;
use crate::core::pipeline::batch::BatchIdentity;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Paths under a ledger directory.
pub struct LedgerPaths {
    pub root: PathBuf,
    pub manifest_file: PathBuf,
    pub records_dir: PathBuf,
    pub history_dir: PathBuf,
}

impl LedgerPaths {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            manifest_file: root.join("ledger.json"),
            records_dir: root.join("records"),
            history_dir: root.join("history"),
        }
    }

    pub fn record_file(&self, identity: &BatchIdentity) -> PathBuf {
        self.records_dir.join(format!("{}.json", identity.as_str()))
    }
}

/// Binds a ledger directory to the schema that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerManifest {
    pub format_version: u32,
    pub schema_name: String,
    pub schema_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Ledger persisted as one JSON document per batch identity.
///
/// Each record is written to a unique temp file and renamed into place, so a
/// concurrent reader sees either the previous or the next record.
pub struct FileLedger {
    paths: LedgerPaths,
    keep_history: bool,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FileLedger {
    /// Open (creating if needed) a ledger rooted at `root`.
    pub fn open(root: &Path) -> Result<Self, AppError> {
        let paths = LedgerPaths::new(root);
        fs::create_dir_all(&paths.records_dir).map_err(|err| {
            ledger_error(
                "AS-LEDGER-001",
                format!(
                    "failed to create ledger directory {}: {}",
                    paths.records_dir.display(),
                    err
                ),
            )
        })?;
        Ok(Self {
            paths,
            keep_history: false,
            locks: DashMap::new(),
        })
    }

    /// Also append every written record under `history/<identity>/`.
    pub fn with_history(mut self, keep_history: bool) -> Self {
        self.keep_history = keep_history;
        self
    }

    pub fn root(&self) -> &Path {
        &self.paths.root
    }

    pub fn manifest(&self) -> Result<Option<LedgerManifest>, AppError> {
        read_json(&self.paths.manifest_file)
    }

    /// Every historical write for one identity, oldest first.
    pub fn history(&self, identity: &BatchIdentity) -> Result<Vec<LedgerRecord>, AppError> {
        check_identity(identity)?;
        let dir = self.paths.history_dir.join(identity.as_str());
        let mut files = list_json_files(&dir)?;
        files.sort();
        let mut records = Vec::with_capacity(files.len());
        for file in files {
            if let Some(record) = read_json::<LedgerRecord>(&file)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn key_lock(&self, identity: &BatchIdentity) -> Arc<Mutex<()>> {
        self.locks
            .entry(identity.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn append_history(&self, record: &LedgerRecord) -> Result<(), AppError> {
        let dir = self.paths.history_dir.join(record.identity.as_str());
        let name = format!(
            "{}-{:03}-{}.json",
            record.recorded_at.format("%Y%m%dT%H%M%S%.6f"),
            record.attempts,
            record.outcome
        );
        write_json(&dir.join(name), record)
    }
}

impl Ledger for FileLedger {
    fn get(&self, identity: &BatchIdentity) -> Result<Option<LedgerRecord>, AppError> {
        check_identity(identity)?;
        read_json(&self.paths.record_file(identity))
    }

    fn record(&self, record: LedgerRecord) -> Result<RecordStatus, AppError> {
        check_identity(&record.identity)?;
        let lock = self.key_lock(&record.identity);
        let _guard = lock.lock().map_err(|_| {
            ledger_error(
                "AS-LEDGER-001",
                format!("ledger lock poisoned for {}", record.identity.short()),
            )
        })?;

        let path = self.paths.record_file(&record.identity);
        if let Some(existing) = read_json::<LedgerRecord>(&path)? {
            if existing.is_submitted() {
                tracing::debug!(
                    identity = %record.identity.short(),
                    "ledger already holds Submitted; write dropped"
                );
                return Ok(RecordStatus::AlreadySubmitted);
            }
        }
        write_json(&path, &record)?;
        if self.keep_history {
            self.append_history(&record)?;
        }
        Ok(RecordStatus::Written)
    }

    fn records(&self) -> Result<Vec<LedgerRecord>, AppError> {
        let mut records = Vec::new();
        for file in list_json_files(&self.paths.records_dir)? {
            if let Some(record) = read_json::<LedgerRecord>(&file)? {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.identity.cmp(&b.identity));
        Ok(records)
    }

    fn bind(&self, schema_name: &str, schema_hash: &str) -> Result<(), AppError> {
        let now = Utc::now();
        let manifest = match self.manifest()? {
            Some(existing) if existing.schema_name != schema_name => {
                return Err(ledger_error(
                    "AS-LEDGER-003",
                    format!(
                        "ledger {} belongs to schema '{}', not '{}'",
                        self.paths.root.display(),
                        existing.schema_name,
                        schema_name
                    ),
                )
                .with_suggestion("Use a separate --ledger directory per schema"));
            }
            Some(existing) => {
                if existing.schema_hash != schema_hash {
                    tracing::warn!(
                        schema = schema_name,
                        "schema content changed since the ledger was created"
                    );
                }
                LedgerManifest {
                    schema_hash: schema_hash.to_string(),
                    updated_at: now,
                    ..existing
                }
            }
            None => LedgerManifest {
                format_version: LEDGER_FORMAT_VERSION,
                schema_name: schema_name.to_string(),
                schema_hash: schema_hash.to_string(),
                created_at: now,
                updated_at: now,
            },
        };
        write_json(&self.paths.manifest_file, &manifest)
    }
}

fn check_identity(identity: &BatchIdentity) -> Result<(), AppError> {
    let raw = identity.as_str();
    let valid = !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ledger_error(
            "AS-LEDGER-004",
            format!("identity '{}' cannot be used as a ledger key", raw),
        ))
    }
}

fn list_json_files(dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(ledger_error(
                "AS-LEDGER-001",
                format!("failed to list {}: {}", dir.display(), err),
            ))
        }
    };
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| {
            ledger_error(
                "AS-LEDGER-001",
                format!("failed to list {}: {}", dir.display(), err),
            )
        })?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
            files.push(path);
        }
    }
    Ok(files)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, AppError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(ledger_error(
                "AS-LEDGER-001",
                format!("failed to read {}: {}", path.display(), err),
            ))
        }
    };
    serde_json::from_slice(&bytes).map(Some).map_err(|err| {
        ledger_error(
            "AS-LEDGER-002",
            format!("corrupt ledger entry {}: {}", path.display(), err),
        )
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    let content = serde_json::to_vec_pretty(value).map_err(|err| {
        ledger_error(
            "AS-LEDGER-002",
            format!("failed to serialize {}: {}", path.display(), err),
        )
    })?;
    atomic_write(path, &content)
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            ledger_error(
                "AS-LEDGER-001",
                format!("failed to create directory {}: {}", parent.display(), err),
            )
        })?;
    }
    let tmp_path = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
    fs::write(&tmp_path, data).map_err(|err| {
        ledger_error(
            "AS-LEDGER-001",
            format!("failed to write {}: {}", tmp_path.display(), err),
        )
    })?;
    fs::rename(&tmp_path, path).map_err(|err| {
        let _ = fs::remove_file(&tmp_path);
        ledger_error(
            "AS-LEDGER-001",
            format!(
                "failed to rename {} -> {}: {}",
                tmp_path.display(),
                path.display(),
                err
            ),
        )
    })?;
    Ok(())
}
