#![allow(clippy::result_large_err)]

use super::params::{bool_param, required, string_list_param, string_param};
use crate::core::error::{AppError, InputError};
use crate::core::git::GitManager;
use crate::core::pipeline::component::{Input, ItemStream};
use crate::core::pipeline::item::Item;
use crate::core::types::ErrorCategory;
use futures::stream;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// Directory names never descended into.
const SKIPPED_DIRS: &[&str] = &[".git", ".autoshift"];

/// Items listed directly in the schema.
pub struct InlineInput {
    items: Vec<Item>,
}

impl InlineInput {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }

    /// Accepts `keys: [..]` and/or `items: [{key, extra_data}]`.
    pub fn from_params(params: &Value) -> Result<Self, AppError> {
        let mut items: Vec<Item> = string_list_param(params, "keys")?
            .unwrap_or_default()
            .into_iter()
            .map(Item::new)
            .collect();
        if let Some(raw) = params.get("items").filter(|v| !v.is_null()) {
            let parsed: Vec<Item> = serde_json::from_value(raw.clone()).map_err(|err| {
                AppError::new(
                    ErrorCategory::ConfigError,
                    format!("param 'items' must be a list of {{key, extra_data}}: {}", err),
                )
                .with_code("AS-LOAD-004")
            })?;
            items.extend(parsed);
        }
        Ok(Self::new(items))
    }
}

impl Input for InlineInput {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn items(&self) -> ItemStream {
        Box::pin(stream::iter(self.items.clone().into_iter().map(Ok)))
    }
}

/// Produces nothing.
pub struct EmptyInput;

impl Input for EmptyInput {
    fn name(&self) -> &'static str {
        "empty"
    }

    fn items(&self) -> ItemStream {
        Box::pin(stream::empty())
    }
}

/// Lazily walks directories under the workspace, yielding one item per file.
///
/// Keys are workspace-relative paths with `/` separators. Children are visited
/// in sorted order so that enumeration is reproducible.
pub struct DirectoryInput {
    root: PathBuf,
    paths: Vec<String>,
    recursive: bool,
}

impl DirectoryInput {
    pub fn new(root: &Path, paths: Vec<String>, recursive: bool) -> Self {
        Self {
            root: root.to_path_buf(),
            paths,
            recursive,
        }
    }

    pub fn from_params(params: &Value, workspace_root: &Path) -> Result<Self, AppError> {
        let paths = string_list_param(params, "paths")?.unwrap_or_else(|| vec![".".to_string()]);
        for path in &paths {
            if Path::new(path).is_absolute() {
                return Err(AppError::new(
                    ErrorCategory::ConfigError,
                    format!("directory input path '{}' must be relative", path),
                )
                .with_code("AS-LOAD-004"));
            }
        }
        let recursive = bool_param(params, "recursive")?.unwrap_or(true);
        Ok(Self::new(workspace_root, paths, recursive))
    }
}

fn relative_key(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let key = rel.to_string_lossy().replace('\\', "/");
    key.trim_start_matches("./").to_string()
}

impl Input for DirectoryInput {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn items(&self) -> ItemStream {
        let root = self.root.clone();
        let paths = self.paths.clone();
        let recursive = self.recursive;
        Box::pin(async_stream::stream! {
            let mut pending: VecDeque<PathBuf> = VecDeque::new();
            for path in paths {
                let start = root.join(&path);
                match tokio::fs::metadata(&start).await {
                    Ok(meta) if meta.is_file() => {
                        yield Ok(Item::new(relative_key(&root, &start)));
                    }
                    Ok(_) => pending.push_back(start),
                    Err(err) => {
                        yield Err(InputError::fatal(format!(
                            "input path {} is not readable: {}",
                            start.display(),
                            err
                        )));
                        return;
                    }
                }
            }

            while let Some(dir) = pending.pop_front() {
                let mut entries = match tokio::fs::read_dir(&dir).await {
                    Ok(entries) => entries,
                    Err(err) => {
                        yield Err(InputError::recoverable(format!(
                            "failed to list {}: {}",
                            dir.display(),
                            err
                        )));
                        return;
                    }
                };
                let mut children = Vec::new();
                loop {
                    match entries.next_entry().await {
                        Ok(Some(entry)) => children.push(entry),
                        Ok(None) => break,
                        Err(err) => {
                            yield Err(InputError::recoverable(format!(
                                "failed to list {}: {}",
                                dir.display(),
                                err
                            )));
                            return;
                        }
                    }
                }
                children.sort_by_key(|entry| entry.file_name());
                for entry in children {
                    let path = entry.path();
                    let file_type = match entry.file_type().await {
                        Ok(file_type) => file_type,
                        Err(_) => continue,
                    };
                    if file_type.is_dir() {
                        let name = entry.file_name();
                        let skipped = SKIPPED_DIRS.iter().any(|skip| name == *skip);
                        if recursive && !skipped {
                            pending.push_back(path);
                        }
                    } else if file_type.is_file() {
                        yield Ok(Item::new(relative_key(&root, &path)));
                    }
                }
            }
        })
    }
}

/// Files whose content matches an extended regex, listed by `git grep`.
pub struct GitGrepInput {
    git: GitManager,
    pattern: String,
    paths: Vec<String>,
    untracked: bool,
}

impl GitGrepInput {
    pub fn from_params(params: &Value, workspace_root: &Path) -> Result<Self, AppError> {
        let pattern = required(string_param(params, "pattern")?, "pattern")?;
        if pattern.is_empty() {
            return Err(AppError::new(
                ErrorCategory::ConfigError,
                "git_grep pattern must not be empty",
            )
            .with_code("AS-LOAD-004"));
        }
        Ok(Self {
            git: GitManager::new(workspace_root),
            pattern,
            paths: string_list_param(params, "paths")?.unwrap_or_default(),
            untracked: bool_param(params, "untracked")?.unwrap_or(false),
        })
    }
}

impl Input for GitGrepInput {
    fn name(&self) -> &'static str {
        "git_grep"
    }

    fn items(&self) -> ItemStream {
        let git = self.git.clone();
        let pattern = self.pattern.clone();
        let paths = self.paths.clone();
        let untracked = self.untracked;
        Box::pin(async_stream::stream! {
            match git.grep_files(&pattern, &paths, untracked).await {
                Ok(files) => {
                    for file in files {
                        yield Ok(Item::new(file));
                    }
                }
                Err(err) => {
                    yield Err(InputError::fatal(format!(
                        "git grep in {} failed: {}",
                        git.workspace_path().display(),
                        err.diagnostic()
                    )));
                }
            }
        })
    }
}
