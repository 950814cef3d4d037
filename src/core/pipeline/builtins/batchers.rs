#![allow(clippy::result_large_err)]

use super::codeowners::{CodeOwners, Owner, DEFAULT_LOCATIONS};
use super::params::{
    compile_regex, object_param, required, string_list_param, string_param, usize_param,
};
use crate::core::error::AppError;
use crate::core::pipeline::batch::BatchPolicy;
use crate::core::pipeline::item::Item;
use crate::core::types::ErrorCategory;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// One batch per item, titled with the item key.
pub struct SingleBatcher {
    prefix: Option<String>,
}

impl SingleBatcher {
    pub fn from_params(params: &Value) -> Result<Self, AppError> {
        Ok(Self {
            prefix: string_param(params, "title_prefix")?,
        })
    }
}

impl BatchPolicy for SingleBatcher {
    fn name(&self) -> &'static str {
        "single"
    }

    fn group_key(&self, item: &Item) -> Result<String, AppError> {
        Ok(item.key.clone())
    }

    fn title(&self, group_key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{} {}", prefix, group_key),
            None => group_key.to_string(),
        }
    }
}

/// Every item in one group under a fixed title, split by `max_batch_size`.
pub struct ChunkBatcher {
    title: String,
    max_batch_size: Option<usize>,
}

impl ChunkBatcher {
    pub fn from_params(params: &Value) -> Result<Self, AppError> {
        Ok(Self {
            title: required(string_param(params, "title")?, "title")?,
            max_batch_size: usize_param(params, "max_batch_size")?,
        })
    }
}

impl BatchPolicy for ChunkBatcher {
    fn name(&self) -> &'static str {
        "chunk"
    }

    fn group_key(&self, _item: &Item) -> Result<String, AppError> {
        Ok(self.title.clone())
    }

    fn max_batch_size(&self) -> Option<usize> {
        self.max_batch_size
    }
}

/// Groups file items by parent directory.
pub struct DirectoryBatcher {
    prefix: Option<String>,
    max_batch_size: Option<usize>,
}

impl DirectoryBatcher {
    pub fn from_params(params: &Value) -> Result<Self, AppError> {
        Ok(Self {
            prefix: string_param(params, "title_prefix")?,
            max_batch_size: usize_param(params, "max_batch_size")?,
        })
    }
}

impl BatchPolicy for DirectoryBatcher {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn group_key(&self, item: &Item) -> Result<String, AppError> {
        let parent = Path::new(&item.key)
            .parent()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();
        Ok(if parent.is_empty() {
            ".".to_string()
        } else {
            parent
        })
    }

    fn max_batch_size(&self) -> Option<usize> {
        self.max_batch_size
    }

    fn title(&self, group_key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{} {}", prefix, group_key),
            None => group_key.to_string(),
        }
    }
}

/// Groups by a string `extra_data` value and folds `metadata_keys` into
/// deduplicated batch metadata.
pub struct ExtraDataBatcher {
    group_by: String,
    metadata_keys: Vec<String>,
    max_batch_size: Option<usize>,
}

impl ExtraDataBatcher {
    pub fn from_params(params: &Value) -> Result<Self, AppError> {
        Ok(Self {
            group_by: required(string_param(params, "group_by")?, "group_by")?,
            metadata_keys: string_list_param(params, "metadata_keys")?.unwrap_or_default(),
            max_batch_size: usize_param(params, "max_batch_size")?,
        })
    }
}

impl BatchPolicy for ExtraDataBatcher {
    fn name(&self) -> &'static str {
        "extra_data"
    }

    fn group_key(&self, item: &Item) -> Result<String, AppError> {
        match item.data(&self.group_by) {
            Some(Value::String(value)) => Ok(value.clone()),
            Some(_) => Err(AppError::new(
                ErrorCategory::BatchError,
                format!("extra_data '{}' must be a string", self.group_by),
            )
            .with_code("AS-BATCH-003")),
            None => Err(AppError::new(
                ErrorCategory::BatchError,
                format!("item has no extra_data '{}' to group by", self.group_by),
            )
            .with_code("AS-BATCH-003")),
        }
    }

    fn max_batch_size(&self) -> Option<usize> {
        self.max_batch_size
    }

    fn metadata(&self, _group_key: &str, items: &[Item]) -> Value {
        let mut metadata = Map::new();
        for key in &self.metadata_keys {
            // Keyed by canonical JSON text to dedupe and order values.
            let mut values: BTreeMap<String, Value> = BTreeMap::new();
            for item in items {
                match item.data(key) {
                    Some(Value::Array(list)) => {
                        for value in list {
                            values.insert(value.to_string(), value.clone());
                        }
                    }
                    Some(Value::Null) | None => {}
                    Some(value) => {
                        values.insert(value.to_string(), value.clone());
                    }
                }
            }
            metadata.insert(key.clone(), Value::Array(values.into_values().collect()));
        }
        Value::Object(metadata)
    }
}

const UNOWNED_GROUP: &str = "unowned";
const TEAM_PREFIX: &str = "team:";
const USER_PREFIX: &str = "user:";

/// Groups file items by their first CODEOWNERS owner.
///
/// Team owners add themselves to `team_reviewers` metadata, individual owners
/// to `reviewers`. Files without an owner share one `unowned` group.
#[derive(Debug)]
pub struct CodeownersBatcher {
    owners: CodeOwners,
    prefix: Option<String>,
    max_batch_size: Option<usize>,
    metadata: Map<String, Value>,
}

impl CodeownersBatcher {
    pub fn new(owners: CodeOwners) -> Self {
        Self {
            owners,
            prefix: None,
            max_batch_size: None,
            metadata: Map::new(),
        }
    }

    pub fn from_params(params: &Value, workspace_root: &Path) -> Result<Self, AppError> {
        let location = match string_param(params, "codeowners_location")? {
            Some(rel) => workspace_root.join(rel),
            None => DEFAULT_LOCATIONS
                .iter()
                .map(|rel| workspace_root.join(rel))
                .find(|path| path.is_file())
                .ok_or_else(|| {
                    AppError::new(
                        ErrorCategory::ConfigError,
                        format!(
                            "no CODEOWNERS file found under {}",
                            workspace_root.display()
                        ),
                    )
                    .with_code("AS-LOAD-004")
                    .with_suggestion("Set param 'codeowners_location'")
                })?,
        };
        Ok(Self {
            owners: CodeOwners::load(&location)?,
            prefix: string_param(params, "prefix")?,
            max_batch_size: usize_param(params, "max_batch_size")?,
            metadata: object_param(params, "metadata")?.cloned().unwrap_or_default(),
        })
    }
}

impl BatchPolicy for CodeownersBatcher {
    fn name(&self) -> &'static str {
        "codeowners"
    }

    fn group_key(&self, item: &Item) -> Result<String, AppError> {
        Ok(match self.owners.of(&item.key).first() {
            Some(Owner::Team(name)) => format!("{}{}", TEAM_PREFIX, name),
            Some(Owner::User(name)) => format!("{}{}", USER_PREFIX, name),
            None => UNOWNED_GROUP.to_string(),
        })
    }

    fn max_batch_size(&self) -> Option<usize> {
        self.max_batch_size
    }

    fn title(&self, group_key: &str) -> String {
        let owner = group_key
            .strip_prefix(TEAM_PREFIX)
            .or_else(|| group_key.strip_prefix(USER_PREFIX))
            .unwrap_or(group_key);
        match &self.prefix {
            Some(prefix) => format!("{} {}", prefix, owner),
            None => owner.to_string(),
        }
    }

    fn metadata(&self, group_key: &str, _items: &[Item]) -> Value {
        let mut metadata = self.metadata.clone();
        let reviewer = if let Some(team) = group_key.strip_prefix(TEAM_PREFIX) {
            Some(("team_reviewers", team))
        } else {
            group_key
                .strip_prefix(USER_PREFIX)
                .map(|user| ("reviewers", user))
        };
        if let Some((field, owner)) = reviewer {
            let owner = Value::String(owner.to_string());
            let list = metadata
                .entry(field)
                .or_insert_with(|| Value::Array(Vec::new()));
            match list {
                Value::Array(values) if values.contains(&owner) => {}
                Value::Array(values) => values.push(owner),
                other => *other = Value::Array(vec![owner]),
            }
        }
        Value::Object(metadata)
    }
}

/// Groups file items by the first capture of `group_by` in their content.
///
/// `metadata_keys` maps a metadata field to a regex; every file's first
/// capture is collected into that field, deduplicated.
pub struct FileRegexBatcher {
    root: PathBuf,
    group_by: Regex,
    metadata_keys: BTreeMap<String, Regex>,
    max_batch_size: Option<usize>,
}

impl FileRegexBatcher {
    pub fn from_params(params: &Value, workspace_root: &Path) -> Result<Self, AppError> {
        let group_by = compile_regex(&required(string_param(params, "group_by")?, "group_by")?)?;
        let mut metadata_keys = BTreeMap::new();
        if let Some(map) = object_param(params, "metadata_keys")? {
            for (key, raw) in map {
                let raw = raw.as_str().ok_or_else(|| {
                    AppError::new(
                        ErrorCategory::ConfigError,
                        format!("metadata_keys.{} must be a regex string", key),
                    )
                    .with_code("AS-LOAD-004")
                })?;
                metadata_keys.insert(key.clone(), compile_regex(raw)?);
            }
        }
        Ok(Self {
            root: workspace_root.to_path_buf(),
            group_by,
            metadata_keys,
            max_batch_size: usize_param(params, "max_batch_size")?,
        })
    }

    fn content(&self, item: &Item) -> std::io::Result<String> {
        std::fs::read_to_string(self.root.join(&item.key))
    }
}

/// Group 1 when the regex has one, otherwise the whole match.
fn first_capture(regex: &Regex, text: &str) -> Option<String> {
    let captures = regex.captures(text)?;
    captures
        .get(1)
        .or_else(|| captures.get(0))
        .map(|m| m.as_str().to_string())
}

impl BatchPolicy for FileRegexBatcher {
    fn name(&self) -> &'static str {
        "file_regex"
    }

    fn group_key(&self, item: &Item) -> Result<String, AppError> {
        let content = self.content(item).map_err(|err| {
            AppError::new(
                ErrorCategory::BatchError,
                format!("failed to read {} for grouping: {}", item.key, err),
            )
            .with_code("AS-BATCH-003")
        })?;
        first_capture(&self.group_by, &content).ok_or_else(|| {
            AppError::new(
                ErrorCategory::BatchError,
                format!("content does not match group_by '{}'", self.group_by.as_str()),
            )
            .with_code("AS-BATCH-003")
        })
    }

    fn max_batch_size(&self) -> Option<usize> {
        self.max_batch_size
    }

    fn metadata(&self, _group_key: &str, items: &[Item]) -> Value {
        let mut found: BTreeMap<&str, BTreeSet<String>> = self
            .metadata_keys
            .keys()
            .map(|key| (key.as_str(), BTreeSet::new()))
            .collect();
        for item in items {
            let Ok(content) = self.content(item) else {
                continue;
            };
            for (key, regex) in &self.metadata_keys {
                if let Some(value) = first_capture(regex, &content) {
                    found.entry(key.as_str()).or_default().insert(value);
                }
            }
        }
        Value::Object(
            found
                .into_iter()
                .map(|(key, values)| {
                    let values = values.into_iter().map(Value::String).collect();
                    (key.to_string(), Value::Array(values))
                })
                .collect(),
        )
    }
}
