//! Ownership label
//!
//! Resources created by the controller carry
//! `app.kubernetes.io/managed-by=<value>`. An existing resource without the
//! label (or with another value) is never mutated.

use crate::constants::{DEFAULT_OWNERSHIP_LABEL_VALUE, OWNERSHIP_LABEL_KEY};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipLabel {
    value: String,
}

impl Default for OwnershipLabel {
    fn default() -> Self {
        Self::new(DEFAULT_OWNERSHIP_LABEL_VALUE)
    }
}

impl OwnershipLabel {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn key(&self) -> &'static str {
        OWNERSHIP_LABEL_KEY
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Label set for resources built as typed objects
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(OWNERSHIP_LABEL_KEY.to_string(), self.value.clone())])
    }

    /// Current label value on `resource`, if any
    pub fn get<'a>(&self, resource: &'a Value) -> Option<&'a str> {
        resource
            .get("metadata")
            .and_then(|m| m.get("labels"))
            .and_then(|l| l.get(OWNERSHIP_LABEL_KEY))
            .and_then(Value::as_str)
    }

    pub fn is_owned(&self, resource: &Value) -> bool {
        self.get(resource) == Some(self.value.as_str())
    }

    /// Set the label on `resource`, creating `metadata.labels` as needed
    pub fn stamp(&self, resource: &mut Value) {
        let Some(object) = resource.as_object_mut() else {
            return;
        };
        let metadata = object
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if !metadata.is_object() {
            *metadata = Value::Object(Map::new());
        }
        let Some(metadata) = metadata.as_object_mut() else {
            return;
        };
        let labels = metadata
            .entry("labels")
            .or_insert_with(|| Value::Object(Map::new()));
        if !labels.is_object() {
            *labels = Value::Object(Map::new());
        }
        if let Some(labels) = labels.as_object_mut() {
            labels.insert(
                OWNERSHIP_LABEL_KEY.to_string(),
                Value::String(self.value.clone()),
            );
        }
    }
}
