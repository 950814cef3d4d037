#![allow(clippy::result_large_err)] // Batch partitioning returns AppError so policy failures keep their diagnostic context.

use crate::core::error::AppError;
use crate::core::pipeline::item::Item;
use crate::core::types::ErrorCategory;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

const SHORT_IDENTITY_LEN: usize = 12;

/// Stable, content-derived batch identifier used as the ledger key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchIdentity(String);

impl BatchIdentity {
    /// Hash the grouping key together with the sorted member keys.
    ///
    /// Every field is length-prefixed, so keys containing separators cannot
    /// alias a different membership.
    pub fn compute<'a, I>(group_key: &str, member_keys: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut keys: Vec<&str> = member_keys.into_iter().collect();
        keys.sort_unstable();
        let mut hasher = Sha256::new();
        update_framed(&mut hasher, group_key);
        hasher.update((keys.len() as u64).to_be_bytes());
        for key in keys {
            update_framed(&mut hasher, key);
        }
        BatchIdentity(hex::encode(hasher.finalize()))
    }

    /// Wrap an identity read back from storage or supplied by a caller.
    pub fn from_raw<T: Into<String>>(raw: T) -> Self {
        BatchIdentity(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        let end = self.0.len().min(SHORT_IDENTITY_LEN);
        &self.0[..end]
    }
}

fn update_framed(hasher: &mut Sha256, field: &str) {
    hasher.update((field.len() as u64).to_be_bytes());
    hasher.update(field.as_bytes());
}

impl fmt::Display for BatchIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Disjoint group of items processed as one transform/validate/submit unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub identity: BatchIdentity,
    pub group_key: String,
    pub title: String,
    pub items: Vec<Item>,
    #[serde(default)]
    pub metadata: Value,
}

impl Batch {
    pub fn item_keys(&self) -> Vec<String> {
        self.items.iter().map(|item| item.key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Grouping rule supplied by a batcher component.
///
/// The policy only decides which group an item belongs to and how a group is
/// presented; [`partition`] owns ordering, chunking and identity.
pub trait BatchPolicy: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Grouping key for one item. Items sharing a key end up in the same batch
    /// unless the group exceeds [`BatchPolicy::max_batch_size`].
    fn group_key(&self, item: &Item) -> Result<String, AppError>;

    fn max_batch_size(&self) -> Option<usize> {
        None
    }

    fn title(&self, group_key: &str) -> String {
        group_key.to_string()
    }

    fn metadata(&self, _group_key: &str, _items: &[Item]) -> Value {
        Value::Object(Map::new())
    }
}

/// Partition items into disjoint, deterministically ordered batches.
///
/// Duplicate item keys keep their first occurrence. Groups are visited in key
/// order and members are sorted by key, so the result does not depend on the
/// order in which the input provider produced the items.
pub fn partition(policy: &dyn BatchPolicy, items: Vec<Item>) -> Result<Vec<Batch>, AppError> {
    let mut seen = HashSet::new();
    let mut groups: BTreeMap<String, Vec<Item>> = BTreeMap::new();
    for item in items {
        if !seen.insert(item.key.clone()) {
            tracing::warn!(item = %item.key, "dropping duplicate item key");
            continue;
        }
        let key = policy.group_key(&item).map_err(|mut err| {
            err.add_context("item", &item.key);
            err.add_context("batcher", policy.name());
            err
        })?;
        groups.entry(key).or_default().push(item);
    }

    let max_size = policy.max_batch_size();
    if max_size == Some(0) {
        return Err(AppError::new(
            ErrorCategory::BatchError,
            format!("batcher {} declared max_batch_size 0", policy.name()),
        )
        .with_code("AS-BATCH-002"));
    }

    let mut batches = Vec::new();
    for (group_key, mut members) in groups {
        members.sort_by(|a, b| a.key.cmp(&b.key));
        let base_title = policy.title(&group_key);
        let chunks = split_even(members, max_size);
        let total = chunks.len();
        for (index, chunk) in chunks.into_iter().enumerate() {
            let identity =
                BatchIdentity::compute(&group_key, chunk.iter().map(|item| item.key.as_str()));
            let title = if total > 1 {
                format!("[{}/{}] {}", index + 1, total, base_title)
            } else {
                base_title.clone()
            };
            let metadata = policy.metadata(&group_key, &chunk);
            batches.push(Batch {
                identity,
                group_key: group_key.clone(),
                title,
                items: chunk,
                metadata,
            });
        }
    }

    verify_partition(&batches)?;
    Ok(batches)
}

/// Split a group into `ceil(n / max)` chunks of near-equal size.
fn split_even(members: Vec<Item>, max_size: Option<usize>) -> Vec<Vec<Item>> {
    let len = members.len();
    let max = match max_size {
        Some(max) if len > max => max,
        _ => return vec![members],
    };
    let num_chunks = len.div_ceil(max);
    let chunk_size = len.div_ceil(num_chunks);
    let mut chunks = Vec::with_capacity(num_chunks);
    let mut iter = members.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(chunk_size).collect());
    }
    chunks
}

/// Check that no item key and no identity appears in two batches.
pub fn verify_partition(batches: &[Batch]) -> Result<(), AppError> {
    let mut keys = HashSet::new();
    let mut identities = HashSet::new();
    for batch in batches {
        if !identities.insert(batch.identity.as_str()) {
            return Err(AppError::new(
                ErrorCategory::BatchError,
                format!("batch identity {} produced twice", batch.identity.short()),
            )
            .with_code("AS-BATCH-001"));
        }
        for item in &batch.items {
            if !keys.insert(item.key.as_str()) {
                return Err(AppError::new(
                    ErrorCategory::BatchError,
                    format!("item {} assigned to more than one batch", item.key),
                )
                .with_code("AS-BATCH-001"));
            }
        }
    }
    Ok(())
}
