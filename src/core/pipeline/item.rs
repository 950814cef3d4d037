use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Atomic candidate unit of change produced by an input provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Identifier, unique within one run. For file items this is the path.
    pub key: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra_data: Map<String, Value>,
}

impl Item {
    pub fn new<T: Into<String>>(key: T) -> Self {
        Self {
            key: key.into(),
            extra_data: Map::new(),
        }
    }

    pub fn with_data<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.extra_data.insert(key.into(), value);
        self
    }

    pub fn data(&self, key: &str) -> Option<&Value> {
        self.extra_data.get(key)
    }

    pub fn path(&self) -> &Path {
        Path::new(&self.key)
    }
}
