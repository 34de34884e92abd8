//! Render context
//!
//! Variables exposed to resource templates:
//! - `namespace`, `project` - where and for whom the template renders
//! - `params`, `param_origins` - non-secret parameters and their provenance
//! - `secrets`, `secret_origins` - secret parameters and their provenance
//! - `hierarchy` - nested mapping of included projects
//! - `context` - free-form values from the governing mapping
//! - `environment`, `tag` - parameter store scope of the governing mapping
//! - `debug` - controller debug flag

use minijinja::Value;
use serde::Serialize;
use std::collections::BTreeMap;

/// Template context for one project
#[derive(Debug, Clone, Serialize)]
pub struct RenderContext {
    pub namespace: String,
    pub project: String,
    pub params: BTreeMap<String, String>,
    pub param_origins: BTreeMap<String, String>,
    pub secrets: BTreeMap<String, String>,
    pub secret_origins: BTreeMap<String, String>,
    pub hierarchy: Value,
    pub context: BTreeMap<String, serde_json::Value>,
    pub environment: Option<String>,
    pub tag: Option<String>,
    pub debug: bool,
}

impl RenderContext {
    /// Empty context for `project` in `namespace`
    pub fn new(namespace: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            project: project.into(),
            params: BTreeMap::new(),
            param_origins: BTreeMap::new(),
            secrets: BTreeMap::new(),
            secret_origins: BTreeMap::new(),
            hierarchy: Value::from_serialize(BTreeMap::<String, String>::new()),
            context: BTreeMap::new(),
            environment: None,
            tag: None,
            debug: false,
        }
    }

    /// Replace every secret value occurring in `message` with `***`
    pub(crate) fn mask(&self, message: &str) -> String {
        let mut values: Vec<&str> = self
            .secrets
            .values()
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .collect();
        // Longest first so a secret containing another secret is masked whole
        values.sort_by_key(|v| std::cmp::Reverse(v.len()));

        values
            .into_iter()
            .fold(message.to_string(), |acc, secret| acc.replace(secret, "***"))
    }

    /// One-line dump of the supplied variables with secret values masked
    pub(crate) fn diagnostic(&self) -> String {
        let secrets: BTreeMap<&str, &str> =
            self.secrets.keys().map(|k| (k.as_str(), "***")).collect();
        let context_keys: Vec<&str> = self.context.keys().map(String::as_str).collect();
        self.mask(&format!(
            "namespace={}, project={}, params={:?}, secrets={:?}, context keys={:?}, debug={}",
            self.namespace, self.project, self.params, secrets, context_keys, self.debug
        ))
    }

    /// Whether a dotted variable path resolves against this context
    pub(crate) fn resolves(&self, path: &str) -> bool {
        let Ok(root) = serde_json::to_value(self) else {
            return false;
        };
        path.split('.')
            .try_fold(&root, |node, segment| node.get(segment))
            .is_some()
    }
}
