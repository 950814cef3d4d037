#![allow(clippy::result_large_err)] // Registry resolution returns AppError directly for structured load diagnostics.

use crate::core::error::AppError;
use crate::core::pipeline::batch::BatchPolicy;
use crate::core::pipeline::component::{Filter, Input, Submitter, Transformer, Validator};
use crate::core::types::ErrorCategory;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

type Factory<T> = Arc<dyn Fn(&Value) -> Result<Arc<T>, AppError> + Send + Sync>;

/// Name-to-factory table for one component role.
struct RoleTable<T: ?Sized> {
    role: &'static str,
    factories: HashMap<String, Factory<T>>,
}

impl<T: ?Sized> Clone for RoleTable<T> {
    fn clone(&self) -> Self {
        Self {
            role: self.role,
            factories: self.factories.clone(),
        }
    }
}

impl<T: ?Sized> RoleTable<T> {
    fn new(role: &'static str) -> Self {
        Self {
            role,
            factories: HashMap::new(),
        }
    }

    fn insert(&mut self, name: &str, factory: Factory<T>) {
        if self.factories.contains_key(name) {
            panic!("duplicate {} registered: {}", self.role, name);
        }
        self.factories.insert(name.to_string(), factory);
    }

    fn build(&self, name: &str, params: &Value) -> Result<Arc<T>, AppError> {
        let factory = self.factories.get(name).ok_or_else(|| {
            AppError::new(
                ErrorCategory::LoadError,
                format!("{} '{}' is not registered", self.role, name),
            )
            .with_code("AS-LOAD-003")
        })?;
        factory(params).map_err(|err| {
            let mut wrapped = AppError::new(
                ErrorCategory::LoadError,
                format!("invalid params for {} '{}': {}", self.role, name, err.message),
            )
            .with_code("AS-LOAD-004");
            wrapped.source = Some(anyhow::anyhow!(err));
            wrapped
        })
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Builder used to register component factories before a run.
pub struct ComponentRegistryBuilder {
    inputs: RoleTable<dyn Input>,
    filters: RoleTable<dyn Filter>,
    batchers: RoleTable<dyn BatchPolicy>,
    transformers: RoleTable<dyn Transformer>,
    validators: RoleTable<dyn Validator>,
    submitters: RoleTable<dyn Submitter>,
}

impl Default for ComponentRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentRegistryBuilder {
    pub fn new() -> Self {
        Self {
            inputs: RoleTable::new("input"),
            filters: RoleTable::new("filter"),
            batchers: RoleTable::new("batcher"),
            transformers: RoleTable::new("transformer"),
            validators: RoleTable::new("validator"),
            submitters: RoleTable::new("submitter"),
        }
    }

    pub fn register_input<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&Value) -> Result<Arc<dyn Input>, AppError> + Send + Sync + 'static,
    {
        self.inputs.insert(name, Arc::new(factory));
        self
    }

    pub fn register_filter<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&Value) -> Result<Arc<dyn Filter>, AppError> + Send + Sync + 'static,
    {
        self.filters.insert(name, Arc::new(factory));
        self
    }

    pub fn register_batcher<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&Value) -> Result<Arc<dyn BatchPolicy>, AppError> + Send + Sync + 'static,
    {
        self.batchers.insert(name, Arc::new(factory));
        self
    }

    pub fn register_transformer<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&Value) -> Result<Arc<dyn Transformer>, AppError> + Send + Sync + 'static,
    {
        self.transformers.insert(name, Arc::new(factory));
        self
    }

    pub fn register_validator<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&Value) -> Result<Arc<dyn Validator>, AppError> + Send + Sync + 'static,
    {
        self.validators.insert(name, Arc::new(factory));
        self
    }

    pub fn register_submitter<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&Value) -> Result<Arc<dyn Submitter>, AppError> + Send + Sync + 'static,
    {
        self.submitters.insert(name, Arc::new(factory));
        self
    }

    pub fn build(self) -> ComponentRegistry {
        ComponentRegistry {
            inner: Arc::new(self),
        }
    }
}

/// Immutable registry passed into the orchestrator.
#[derive(Clone)]
pub struct ComponentRegistry {
    inner: Arc<ComponentRegistryBuilder>,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentRegistry {
    pub fn new() -> Self {
        ComponentRegistryBuilder::new().build()
    }

    pub fn builder() -> ComponentRegistryBuilder {
        ComponentRegistryBuilder::new()
    }

    pub fn input(&self, name: &str, params: &Value) -> Result<Arc<dyn Input>, AppError> {
        self.inner.inputs.build(name, params)
    }

    pub fn filter(&self, name: &str, params: &Value) -> Result<Arc<dyn Filter>, AppError> {
        self.inner.filters.build(name, params)
    }

    pub fn batcher(&self, name: &str, params: &Value) -> Result<Arc<dyn BatchPolicy>, AppError> {
        self.inner.batchers.build(name, params)
    }

    pub fn transformer(
        &self,
        name: &str,
        params: &Value,
    ) -> Result<Arc<dyn Transformer>, AppError> {
        self.inner.transformers.build(name, params)
    }

    pub fn validator(&self, name: &str, params: &Value) -> Result<Arc<dyn Validator>, AppError> {
        self.inner.validators.build(name, params)
    }

    pub fn submitter(&self, name: &str, params: &Value) -> Result<Arc<dyn Submitter>, AppError> {
        self.inner.submitters.build(name, params)
    }

    /// Registered names per role, sorted, for listing.
    pub fn catalog(&self) -> Vec<(&'static str, Vec<String>)> {
        vec![
            (self.inner.inputs.role, self.inner.inputs.names()),
            (self.inner.filters.role, self.inner.filters.names()),
            (self.inner.batchers.role, self.inner.batchers.names()),
            (self.inner.transformers.role, self.inner.transformers.names()),
            (self.inner.validators.role, self.inner.validators.names()),
            (self.inner.submitters.role, self.inner.submitters.names()),
        ]
    }
}
