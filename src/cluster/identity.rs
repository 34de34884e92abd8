//! Target identity of a rendered document

use serde_json::Value;
use std::fmt;

/// Where a rendered document lives in the cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceIdentity {
    /// Resource kind as written in the document, kept for logs
    pub kind: String,
    /// Lowercase plural used in API paths
    pub plural: String,
    pub name: String,
    pub namespace: String,
    pub api_version: String,
}

impl ResourceIdentity {
    /// Derive the identity of `manifest`.
    ///
    /// `kind`, `apiVersion` and `metadata.name` are mandatory; the error
    /// names the first missing path. `metadata.namespace` falls back to
    /// `default_namespace`.
    pub fn from_manifest(manifest: &Value, default_namespace: &str) -> Result<Self, &'static str> {
        let kind = required_str(manifest, &["kind"]).ok_or("kind")?;
        let api_version = required_str(manifest, &["apiVersion"]).ok_or("apiVersion")?;
        let name = required_str(manifest, &["metadata", "name"]).ok_or("metadata.name")?;
        let namespace =
            required_str(manifest, &["metadata", "namespace"]).unwrap_or(default_namespace);

        Ok(Self {
            plural: pluralize(kind),
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            api_version: api_version.to_string(),
        })
    }

    /// `(group, version)` of `api_version`; the core group is empty
    pub fn group_version(&self) -> (&str, &str) {
        self.api_version
            .split_once('/')
            .unwrap_or(("", self.api_version.as_str()))
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}/{} ({})",
            self.kind, self.namespace, self.name, self.api_version
        )
    }
}

fn required_str<'a>(manifest: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(manifest, |node, segment| node.get(segment))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Lowercase English plural of a resource kind, as used in API paths
pub fn pluralize(kind: &str) -> String {
    let lower = kind.to_lowercase();
    if let Some(stem) = lower.strip_suffix('y') {
        if !stem.is_empty() && !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{stem}ies");
        }
    }
    if lower.ends_with(['s', 'x', 'z']) || lower.ends_with("ch") || lower.ends_with("sh") {
        return format!("{lower}es");
    }
    format!("{lower}s")
}
