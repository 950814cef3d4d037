#![allow(clippy::result_large_err)]

use super::params::{compile_regex, required, string_list_param, string_param, usize_param};
use crate::core::error::AppError;
use crate::core::pipeline::component::Filter;
use crate::core::pipeline::item::Item;
use crate::core::types::ErrorCategory;
use regex::Regex;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Accepts items whose key ends with one of the configured extensions.
pub struct ExtensionFilter {
    extensions: Vec<String>,
}

impl ExtensionFilter {
    pub fn new<I: IntoIterator<Item = String>>(extensions: I) -> Self {
        let extensions = extensions
            .into_iter()
            .map(|ext| {
                let ext = ext.trim().to_string();
                if ext.starts_with('.') {
                    ext
                } else {
                    format!(".{}", ext)
                }
            })
            .collect();
        Self { extensions }
    }

    pub fn from_params(params: &Value) -> Result<Self, AppError> {
        let extensions = required(string_list_param(params, "extensions")?, "extensions")?;
        Ok(Self::new(extensions))
    }
}

impl Filter for ExtensionFilter {
    fn name(&self) -> &'static str {
        "extension"
    }

    fn is_valid(&self, item: &Item) -> bool {
        self.extensions.iter().any(|ext| item.key.ends_with(ext.as_str()))
    }
}

/// Accepts items whose key matches a regular expression.
pub struct RegexFilter {
    pattern: Regex,
}

impl RegexFilter {
    pub fn from_params(params: &Value) -> Result<Self, AppError> {
        let raw = required(string_param(params, "pattern")?, "pattern")?;
        Ok(Self {
            pattern: compile_regex(&raw)?,
        })
    }
}

impl Filter for RegexFilter {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn is_valid(&self, item: &Item) -> bool {
        self.pattern.is_match(&item.key)
    }
}

/// Keeps the items whose key hashes into `valid_shard` of `num_shards`.
///
/// Running the same schema with every shard value partitions the work.
pub struct KeyHashShardFilter {
    num_shards: u64,
    valid_shard: u64,
}

impl KeyHashShardFilter {
    pub fn new(num_shards: usize, valid_shard: usize) -> Result<Self, AppError> {
        if num_shards == 0 || valid_shard >= num_shards {
            return Err(AppError::new(
                ErrorCategory::ConfigError,
                format!(
                    "valid_shard {} must be below num_shards {}",
                    valid_shard, num_shards
                ),
            )
            .with_code("AS-LOAD-004"));
        }
        Ok(Self {
            num_shards: num_shards as u64,
            valid_shard: valid_shard as u64,
        })
    }

    pub fn from_params(params: &Value) -> Result<Self, AppError> {
        Self::new(
            required(usize_param(params, "num_shards")?, "num_shards")?,
            required(usize_param(params, "valid_shard")?, "valid_shard")?,
        )
    }

    pub fn shard_of(&self, key: &str) -> u64 {
        let digest = Sha256::digest(key.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(prefix) % self.num_shards
    }
}

impl Filter for KeyHashShardFilter {
    fn name(&self) -> &'static str {
        "key_hash_shard"
    }

    fn is_valid(&self, item: &Item) -> bool {
        self.shard_of(&item.key) == self.valid_shard
    }
}
