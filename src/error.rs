//! # Errors
//!
//! Error types for a reconciliation pass.
//!
//! Every failure below is pass-scoped: it aborts the current pass and is
//! caught once, at the polling loop boundary. `Error::is_expected` separates
//! recoverable misconfiguration (logged at WARN) from everything else.

use crate::template::TemplateError;
use thiserror::Error;

/// Result alias used by the reconciliation stages
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while loading `ParameterMapping` records into a `Config`
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("namespace '{namespace}' has more than one root mapping: {resources:?}")]
    MultipleRoots {
        namespace: String,
        resources: Vec<String>,
    },

    #[error("namespace '{namespace}' has no root mapping; a default root mapping is required")]
    MissingRoot { namespace: String },

    #[error("mapping '{resource}' does not declare a scope (expected 'root' or 'override')")]
    MissingScope { resource: String },

    #[error("mapping '{resource}' contains unknown field '{field}'")]
    UnknownField { resource: String, field: String },

    #[error("mapping '{resource}' field '{field}' is invalid: expected {expected}")]
    InvalidField {
        resource: String,
        field: String,
        expected: &'static str,
    },

    #[error("mapping '{resource}' field '{field}' is not a valid pattern: {source}")]
    InvalidSelector {
        resource: String,
        field: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("mapping '{resource}' template '{template}' failed to compile: {source}")]
    InvalidTemplate {
        resource: String,
        template: String,
        #[source]
        source: TemplateError,
    },
}

/// Errors raised while turning a rendered document into an apply target
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("template '{template}' for project '{project}' produced invalid YAML: {source}")]
    Yaml {
        project: String,
        template: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("template '{template}' for project '{project}' did not produce a mapping")]
    NotAMapping { project: String, template: String },

    #[error("template '{template}' for project '{project}' is missing required path '{path}'")]
    MissingPath {
        project: String,
        template: String,
        path: &'static str,
    },
}

/// Pass-scoped reconciliation error
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("cluster API error: {0}")]
    Cluster(#[from] kube::Error),

    #[error("parameter source error: {0:#}")]
    ParameterSource(#[source] anyhow::Error),
}

impl Error {
    /// Recoverable misconfiguration that an operator fixes by editing mappings
    /// or templates.
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Manifest(_))
    }

    /// Metric label for this error's severity
    pub fn severity(&self) -> &'static str {
        if self.is_expected() {
            "expected"
        } else {
            "unexpected"
        }
    }
}
