#![allow(clippy::result_large_err)] // Schema APIs return AppError to preserve structured load context without boxing.

use crate::core::error::AppError;
use crate::core::pipeline::batch::BatchPolicy;
use crate::core::pipeline::component::{
    Filter, Input, InvertedFilter, Submitter, Transformer, ValidationLevel, Validator,
};
use crate::core::pipeline::registry::ComponentRegistry;
use crate::core::pipeline::retry::{RetryPolicy, StageTimeouts};
use crate::core::types::ErrorCategory;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn default_params_value() -> Value {
    Value::Object(Map::new())
}

fn default_concurrency() -> usize {
    4
}

fn default_max_retries() -> u32 {
    2
}

/// Reference to a registered component plus its parameters.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ComponentRef {
    pub name: String,
    #[serde(default = "default_params_value")]
    pub params: Value,
}

impl ComponentRef {
    pub fn new<T: Into<String>>(name: T) -> Self {
        Self {
            name: name.into(),
            params: default_params_value(),
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }
}

/// Filter reference; `inverted` negates the predicate.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FilterRef {
    pub name: String,
    #[serde(default = "default_params_value")]
    pub params: Value,
    #[serde(default)]
    pub inverted: bool,
}

impl FilterRef {
    pub fn new<T: Into<String>>(name: T) -> Self {
        Self {
            name: name.into(),
            params: default_params_value(),
            inverted: false,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn inverted(mut self) -> Self {
        self.inverted = true;
        self
    }
}

/// Run-level options carried by the schema.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RunOptions {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub timeouts: StageTimeouts,
    /// Stop enumerating after this many items; required for unbounded inputs.
    #[serde(default)]
    pub item_limit: Option<usize>,
    #[serde(default)]
    pub allowed_validation_level: ValidationLevel,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            dry_run: false,
            retry: RetryPolicy::default(),
            timeouts: StageTimeouts::default(),
            item_limit: None,
            allowed_validation_level: ValidationLevel::None,
        }
    }
}

/// Declarative pipeline description.
///
/// Stage bindings are optional at the serde level so that a missing binding is
/// reported by [`SchemaDocument::validate`] as a load error naming the stage.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SchemaDocument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub input: Option<ComponentRef>,
    #[serde(default)]
    pub filters: Vec<FilterRef>,
    #[serde(default)]
    pub batcher: Option<ComponentRef>,
    #[serde(default)]
    pub transformer: Option<ComponentRef>,
    #[serde(default)]
    pub validator: Option<ComponentRef>,
    #[serde(default)]
    pub submitter: Option<ComponentRef>,
    #[serde(default)]
    pub options: RunOptions,
}

impl SchemaDocument {
    /// Load a schema from a YAML or JSON file and validate its structure.
    pub fn load_from_file(path: &Path) -> Result<Self, AppError> {
        let text = fs::read_to_string(path).map_err(|err| {
            AppError::new(
                ErrorCategory::LoadError,
                format!("failed to read {}: {}", path.display(), err),
            )
            .with_code("AS-LOAD-001")
        })?;
        let doc = Self::from_str(&text).map_err(|mut err| {
            err.add_context("path", &path.display().to_string());
            err
        })?;
        Ok(doc)
    }

    /// Parse and validate schema text. JSON is accepted since it is valid YAML.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(text: &str) -> Result<Self, AppError> {
        let doc: SchemaDocument = serde_yaml::from_str(text).map_err(|err| {
            AppError::new(
                ErrorCategory::LoadError,
                format!("failed to parse schema: {}", err),
            )
            .with_code("AS-LOAD-001")
        })?;
        doc.validate()?;
        Ok(doc)
    }

    /// Structural validation: every stage bound and options in range.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(load_error("schema name must not be empty"));
        }
        let bindings = [
            ("input", &self.input),
            ("batcher", &self.batcher),
            ("transformer", &self.transformer),
            ("validator", &self.validator),
            ("submitter", &self.submitter),
        ];
        for (stage, binding) in bindings {
            match binding {
                None => {
                    return Err(load_error(format!(
                        "schema {} is missing required stage binding: {}",
                        self.name, stage
                    )))
                }
                Some(reference) if reference.name.trim().is_empty() => {
                    return Err(load_error(format!(
                        "schema {} binds {} with an empty component name",
                        self.name, stage
                    )))
                }
                Some(_) => {}
            }
        }
        for (index, filter) in self.filters.iter().enumerate() {
            if filter.name.trim().is_empty() {
                return Err(load_error(format!(
                    "filters[{}] has an empty component name",
                    index
                )));
            }
        }
        if self.options.concurrency == 0 {
            return Err(load_error("options.concurrency must be >= 1"));
        }
        if self.options.item_limit == Some(0) {
            return Err(load_error("options.item_limit must be >= 1 when set"));
        }
        self.options.retry.validate()?;
        Ok(())
    }

    /// Hex SHA-256 over the canonical JSON form; recorded in ledger manifests.
    pub fn content_hash(&self) -> String {
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&encoded))
    }

    /// Instantiate every referenced component through the registry.
    pub fn resolve(&self, registry: &ComponentRegistry) -> Result<ResolvedSchema, AppError> {
        self.validate()?;
        let input = bound(&self.input, "input")?;
        let batcher = bound(&self.batcher, "batcher")?;
        let transformer = bound(&self.transformer, "transformer")?;
        let validator = bound(&self.validator, "validator")?;
        let submitter = bound(&self.submitter, "submitter")?;

        let mut filters: Vec<Arc<dyn Filter>> = Vec::with_capacity(self.filters.len());
        for reference in &self.filters {
            let filter = registry.filter(&reference.name, &reference.params)?;
            if reference.inverted {
                filters.push(Arc::new(InvertedFilter::new(filter)));
            } else {
                filters.push(filter);
            }
        }

        Ok(ResolvedSchema {
            name: self.name.clone(),
            content_hash: self.content_hash(),
            input: registry.input(&input.name, &input.params)?,
            filters,
            batcher: registry.batcher(&batcher.name, &batcher.params)?,
            transformer: registry.transformer(&transformer.name, &transformer.params)?,
            validator: registry.validator(&validator.name, &validator.params)?,
            submitter: registry.submitter(&submitter.name, &submitter.params)?,
            options: self.options.clone(),
        })
    }
}

fn bound<'a>(binding: &'a Option<ComponentRef>, stage: &str) -> Result<&'a ComponentRef, AppError> {
    binding
        .as_ref()
        .ok_or_else(|| load_error(format!("missing required stage binding: {}", stage)))
}

fn load_error<T: Into<String>>(message: T) -> AppError {
    AppError::new(ErrorCategory::LoadError, message).with_code("AS-LOAD-002")
}

/// Schema with every component instantiated; immutable for the run.
#[derive(Clone)]
pub struct ResolvedSchema {
    pub name: String,
    pub content_hash: String,
    pub input: Arc<dyn Input>,
    pub filters: Vec<Arc<dyn Filter>>,
    pub batcher: Arc<dyn BatchPolicy>,
    pub transformer: Arc<dyn Transformer>,
    pub validator: Arc<dyn Validator>,
    pub submitter: Arc<dyn Submitter>,
    pub options: RunOptions,
}

impl std::fmt::Debug for ResolvedSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSchema")
            .field("name", &self.name)
            .field("input", &self.input.name())
            .field(
                "filters",
                &self.filters.iter().map(|f| f.name()).collect::<Vec<_>>(),
            )
            .field("batcher", &self.batcher.name())
            .field("transformer", &self.transformer.name())
            .field("validator", &self.validator.name())
            .field("submitter", &self.submitter.name())
            .finish()
    }
}
