//! # Parameter Sources
//!
//! The upstream parameter store, seen through the [`ParameterSource`] trait.
//!
//! A source lists project names and returns the parameters of one project,
//! scoped by organization, environment and tag. Errors are returned as
//! `anyhow::Error` and abort the current reconciliation pass.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod parameter_store;

pub use parameter_store::ParameterStoreClient;

/// One key/value entry of a project
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub secret: bool,
}

impl ParameterRecord {
    pub fn new(key: impl Into<String>, value: impl Into<String>, secret: bool) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            secret,
        }
    }
}

/// Per-request scope of a parameter query
///
/// `None` fields fall back to the defaults the source was configured with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterQuery {
    /// Server-side key search term; results may still be a superset
    pub search_term: Option<String>,
    pub environment: Option<String>,
    pub tag: Option<String>,
}

/// Provider trait for parameter stores
#[async_trait]
pub trait ParameterSource: Send + Sync + std::fmt::Debug {
    /// Names of every project visible to the configured organization
    async fn project_names(&self) -> Result<Vec<String>>;

    /// Parameters of `project`, narrowed by `query`
    async fn parameters(&self, project: &str, query: &ParameterQuery)
        -> Result<Vec<ParameterRecord>>;
}
