#![allow(clippy::result_large_err)]

//! Minimal CODEOWNERS reader: gitignore-style patterns, last matching rule wins.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use glob::{MatchOptions, Pattern};
use std::path::Path;

/// Locations searched when no explicit file is configured, in order.
pub const DEFAULT_LOCATIONS: &[&str] = &["CODEOWNERS", ".github/CODEOWNERS", "docs/CODEOWNERS"];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Owner {
    /// `@org/team`, stored without the `@`.
    Team(String),
    /// `@user` or an email address.
    User(String),
}

impl Owner {
    fn parse(raw: &str) -> Self {
        match raw.strip_prefix('@') {
            Some(name) if name.contains('/') => Owner::Team(name.to_string()),
            Some(name) => Owner::User(name.to_string()),
            None => Owner::User(raw.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Owner::Team(name) | Owner::User(name) => name,
        }
    }
}

#[derive(Debug)]
struct Rule {
    raw: String,
    patterns: Vec<Pattern>,
    owners: Vec<Owner>,
}

impl Rule {
    fn matches(&self, path: &str) -> bool {
        self.patterns
            .iter()
            .any(|pattern| pattern.matches_with(path, MATCH_OPTIONS))
    }
}

#[derive(Debug)]
pub struct CodeOwners {
    rules: Vec<Rule>,
}

impl CodeOwners {
    pub fn parse(text: &str) -> Result<Self, AppError> {
        let mut rules = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let Some(raw) = fields.next() else { continue };
            let owners = fields
                .take_while(|field| !field.starts_with('#'))
                .map(Owner::parse)
                .collect();
            let patterns = expand(raw)
                .iter()
                .map(|glob| Pattern::new(glob))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| {
                    AppError::new(
                        ErrorCategory::ConfigError,
                        format!(
                            "CODEOWNERS line {}: invalid pattern '{}': {}",
                            index + 1,
                            raw,
                            err
                        ),
                    )
                    .with_code("AS-LOAD-004")
                })?;
            rules.push(Rule {
                raw: raw.to_string(),
                patterns,
                owners,
            });
        }
        Ok(Self { rules })
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            AppError::new(
                ErrorCategory::ConfigError,
                format!("failed to read CODEOWNERS {}: {}", path.display(), err),
            )
            .with_code("AS-LOAD-004")
        })?;
        Self::parse(&text)
    }

    /// Owners of the last rule matching `path`; empty when nothing matches.
    pub fn of(&self, path: &str) -> &[Owner] {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.matches(path))
            .map(|rule| {
                tracing::trace!(path, rule = %rule.raw, "codeowners rule matched");
                rule.owners.as_slice()
            })
            .unwrap_or(&[])
    }
}

/// Globs equivalent to one CODEOWNERS pattern.
///
/// A leading `/` or an inner `/` anchors the pattern to the repository root,
/// a trailing `/` restricts it to directories, and a pattern naming a
/// directory also owns everything below it.
fn expand(raw: &str) -> Vec<String> {
    let dir_only = raw.ends_with('/');
    let trimmed = raw.trim_end_matches('/');
    let anchored = raw.starts_with('/') || trimmed.contains('/');
    let base = trimmed.trim_start_matches('/');
    if base.is_empty() {
        return vec!["**".to_string()];
    }

    let mut roots = vec![base.to_string()];
    if !anchored && !base.starts_with("**") {
        roots.push(format!("**/{}", base));
    }
    let mut globs = Vec::new();
    for root in roots {
        if !dir_only {
            globs.push(root.clone());
        }
        if !root.ends_with("**") {
            globs.push(format!("{}/**", root));
        }
    }
    globs
}
