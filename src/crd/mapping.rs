//! # ParameterMapping
//!
//! The `ParameterMapping` custom resource and the typed field set of one
//! mapping record.
//!
//! Records are read from the cluster as raw JSON and validated field by field
//! in [`MappingRecord::from_spec`]. Unknown keys are rejected before any
//! conversion takes place, so a typo in a mapping never silently falls back
//! to an inherited value.

use crate::error::ConfigError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// ParameterMapping Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: parameter-sync.octopilot.io/v1
/// kind: ParameterMapping
/// metadata:
///   name: default
///   namespace: team-a
/// spec:
///   scope: root
///   keySelector: "^APP_"
///   resourceTemplates:
///     configmap: |
///       apiVersion: v1
///       kind: ConfigMap
///       metadata:
///         name: {{ project | dns_safe }}
///       data:
///       {%- for key, value in params|items %}
///         {{ key | env_safe }}: {{ value | tojson }}
///       {%- endfor %}
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "ParameterMapping",
    group = "parameter-sync.octopilot.io",
    version = "v1",
    namespaced,
    shortname = "pmap",
    printcolumn = r#"{"name":"Scope", "type":"string", "jsonPath":".spec.scope"}, {"name":"Selector", "type":"string", "jsonPath":".spec.projectSelector"}, {"name":"Skip", "type":"boolean", "jsonPath":".spec.skip"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MappingRecord {
    /// `root` (namespace default) or `override` (applies to matching projects)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
    /// Display name used in logs; defaults to the resource name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Pattern selecting the project names this mapping governs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_selector: Option<String>,
    /// Pattern selecting which parameter keys are synchronized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_selector: Option<String>,
    /// Exclude governed projects from rendering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<bool>,
    /// Projects whose parameters are merged underneath this project's own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub included_projects: Option<Vec<String>>,
    /// Named templates rendered once per governed project
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_templates: Option<BTreeMap<String, String>>,
    /// Free-form values exposed to templates as `context`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<BTreeMap<String, Value>>,
    /// Parameter store environment override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Parameter store tag override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// Mapping scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Root,
    Override,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Root => f.write_str("root"),
            Self::Override => f.write_str("override"),
        }
    }
}

/// Every accepted field name. Both the camelCase wire names and the
/// snake_case names are accepted.
pub const MAPPING_FIELDS: &[&str] = &[
    "scope",
    "name",
    "projectSelector",
    "project_selector",
    "keySelector",
    "key_selector",
    "skip",
    "includedProjects",
    "included_projects",
    "resourceTemplates",
    "resource_templates",
    "context",
    "environment",
    "tag",
];

/// A mapping record as read from the cluster, before validation
#[derive(Debug, Clone, PartialEq)]
pub struct RawMapping {
    /// `metadata.name` of the custom resource
    pub resource: String,
    /// The untouched `spec` object
    pub spec: Value,
}

impl RawMapping {
    pub fn new(resource: impl Into<String>, spec: Value) -> Self {
        Self {
            resource: resource.into(),
            spec,
        }
    }
}

impl MappingRecord {
    /// Validate a raw `spec` object field by field.
    ///
    /// Unknown keys fail with `ConfigError::UnknownField`; a known key holding
    /// the wrong JSON type fails with `ConfigError::InvalidField`. A missing
    /// `name` is filled from the resource name.
    pub fn from_spec(raw: &RawMapping) -> Result<Self, ConfigError> {
        let resource = raw.resource.as_str();
        let Some(fields) = raw.spec.as_object() else {
            return Err(invalid(resource, "spec", "an object"));
        };

        if let Some(unknown) = fields.keys().find(|k| !MAPPING_FIELDS.contains(&k.as_str())) {
            return Err(ConfigError::UnknownField {
                resource: resource.to_string(),
                field: unknown.clone(),
            });
        }

        let scope = match lookup(resource, fields, "scope", "scope")? {
            None => None,
            Some((_, Value::String(s))) if s == "root" => Some(Scope::Root),
            Some((_, Value::String(s))) if s == "override" => Some(Scope::Override),
            Some(_) => return Err(invalid(resource, "scope", "'root' or 'override'")),
        };

        Ok(Self {
            scope,
            name: string_field(resource, fields, "name", "name")?
                .or_else(|| Some(resource.to_string())),
            project_selector: string_field(resource, fields, "projectSelector", "project_selector")?,
            key_selector: string_field(resource, fields, "keySelector", "key_selector")?,
            skip: match lookup(resource, fields, "skip", "skip")? {
                None => None,
                Some((_, Value::Bool(b))) => Some(*b),
                Some((name, _)) => return Err(invalid(resource, name, "a boolean")),
            },
            included_projects: string_list_field(
                resource,
                fields,
                "includedProjects",
                "included_projects",
            )?,
            resource_templates: string_map_field(
                resource,
                fields,
                "resourceTemplates",
                "resource_templates",
            )?,
            context: match lookup(resource, fields, "context", "context")? {
                None => None,
                Some((_, Value::Object(map))) => Some(
                    map.iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                ),
                Some((name, _)) => return Err(invalid(resource, name, "an object")),
            },
            environment: string_field(resource, fields, "environment", "environment")?,
            tag: string_field(resource, fields, "tag", "tag")?,
        })
    }

    /// Field-wise overlay: every field present in `over` replaces the
    /// corresponding field of `self` wholesale.
    #[must_use]
    pub fn overlay(&self, over: &Self) -> Self {
        Self {
            scope: over.scope.or(self.scope),
            name: over.name.clone().or_else(|| self.name.clone()),
            project_selector: over
                .project_selector
                .clone()
                .or_else(|| self.project_selector.clone()),
            key_selector: over
                .key_selector
                .clone()
                .or_else(|| self.key_selector.clone()),
            skip: over.skip.or(self.skip),
            included_projects: over
                .included_projects
                .clone()
                .or_else(|| self.included_projects.clone()),
            resource_templates: over
                .resource_templates
                .clone()
                .or_else(|| self.resource_templates.clone()),
            context: over.context.clone().or_else(|| self.context.clone()),
            environment: over
                .environment
                .clone()
                .or_else(|| self.environment.clone()),
            tag: over.tag.clone().or_else(|| self.tag.clone()),
        }
    }

    /// Built-in defaults every root mapping is merged onto
    pub fn defaults() -> Self {
        Self {
            scope: Some(Scope::Root),
            name: Some(crate::constants::DEFAULT_MAPPING_NAME.to_string()),
            project_selector: Some(String::new()),
            key_selector: Some(String::new()),
            skip: Some(false),
            included_projects: Some(Vec::new()),
            resource_templates: Some(BTreeMap::new()),
            context: Some(BTreeMap::new()),
            environment: None,
            tag: None,
        }
    }
}

fn invalid(resource: &str, field: &str, expected: &'static str) -> ConfigError {
    ConfigError::InvalidField {
        resource: resource.to_string(),
        field: field.to_string(),
        expected,
    }
}

/// Look a field up by its camelCase or its snake_case name; setting both is
/// an error
fn lookup<'a>(
    resource: &str,
    fields: &'a Map<String, Value>,
    camel: &'static str,
    snake: &'static str,
) -> Result<Option<(&'static str, &'a Value)>, ConfigError> {
    let found = match (fields.get(camel), fields.get(snake)) {
        (Some(_), Some(_)) if camel != snake => {
            return Err(ConfigError::InvalidField {
                resource: resource.to_string(),
                field: format!("{camel}/{snake}"),
                expected: "one spelling, not both",
            });
        }
        (Some(value), _) => Some((camel, value)),
        (None, Some(value)) => Some((snake, value)),
        (None, None) => None,
    };
    Ok(found.filter(|(_, v)| !v.is_null()))
}

fn string_field(
    resource: &str,
    fields: &Map<String, Value>,
    camel: &'static str,
    snake: &'static str,
) -> Result<Option<String>, ConfigError> {
    match lookup(resource, fields, camel, snake)? {
        None => Ok(None),
        Some((_, Value::String(s))) => Ok(Some(s.clone())),
        Some((name, _)) => Err(invalid(resource, name, "a string")),
    }
}

fn string_list_field(
    resource: &str,
    fields: &Map<String, Value>,
    camel: &'static str,
    snake: &'static str,
) -> Result<Option<Vec<String>>, ConfigError> {
    match lookup(resource, fields, camel, snake)? {
        None => Ok(None),
        Some((name, Value::Array(items))) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid(resource, name, "a list of strings"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some((name, _)) => Err(invalid(resource, name, "a list of strings")),
    }
}

fn string_map_field(
    resource: &str,
    fields: &Map<String, Value>,
    camel: &'static str,
    snake: &'static str,
) -> Result<Option<BTreeMap<String, String>>, ConfigError> {
    match lookup(resource, fields, camel, snake)? {
        None => Ok(None),
        Some((name, Value::Object(map))) => map
            .iter()
            .map(|(k, v)| {
                v.as_str()
                    .map(|s| (k.clone(), s.to_string()))
                    .ok_or_else(|| invalid(resource, name, "a map of template strings"))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Some),
        Some((name, _)) => Err(invalid(resource, name, "a map of template strings")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_spec_accepts_camel_and_snake_case() {
        let raw = RawMapping::new(
            "team-defaults",
            json!({
                "scope": "override",
                "projectSelector": "^web-",
                "key_selector": "^APP_",
                "includedProjects": ["shared"],
                "skip": true,
            }),
        );
        let record = MappingRecord::from_spec(&raw).expect("valid mapping");
        assert_eq!(record.scope, Some(Scope::Override));
        assert_eq!(record.name.as_deref(), Some("team-defaults"));
        assert_eq!(record.project_selector.as_deref(), Some("^web-"));
        assert_eq!(record.key_selector.as_deref(), Some("^APP_"));
        assert_eq!(record.included_projects, Some(vec!["shared".to_string()]));
        assert_eq!(record.skip, Some(true));
    }

    #[test]
    fn test_from_spec_rejects_both_spellings_of_a_field() {
        let raw = RawMapping::new(
            "web",
            json!({
                "scope": "override",
                "projectSelector": "^web$",
                "project_selector": "^api$",
            }),
        );
        let err = MappingRecord::from_spec(&raw).unwrap_err();
        match &err {
            ConfigError::InvalidField {
                resource, field, ..
            } => {
                assert_eq!(resource, "web");
                assert_eq!(field, "projectSelector/project_selector");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("one spelling, not both"));

        // Same value under both names is still ambiguous input
        let raw = RawMapping::new(
            "web",
            json!({"scope": "override", "includedProjects": [], "included_projects": []}),
        );
        assert!(matches!(
            MappingRecord::from_spec(&raw),
            Err(ConfigError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_from_spec_rejects_unknown_field() {
        let raw = RawMapping::new("typo", json!({"scope": "root", "projectSelecter": "x"}));
        let err = MappingRecord::from_spec(&raw).unwrap_err();
        match err {
            ConfigError::UnknownField { resource, field } => {
                assert_eq!(resource, "typo");
                assert_eq!(field, "projectSelecter");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_from_spec_rejects_wrong_types() {
        let raw = RawMapping::new("bad", json!({"scope": "root", "skip": "yes"}));
        assert!(matches!(
            MappingRecord::from_spec(&raw),
            Err(ConfigError::InvalidField { .. })
        ));

        let raw = RawMapping::new("bad", json!({"scope": "global"}));
        assert!(matches!(
            MappingRecord::from_spec(&raw),
            Err(ConfigError::InvalidField { .. })
        ));

        let raw = RawMapping::new("bad", json!({"resourceTemplates": {"cm": 3}}));
        assert!(matches!(
            MappingRecord::from_spec(&raw),
            Err(ConfigError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_overlay_replaces_present_fields_only() {
        let base = MappingRecord::defaults();
        let over = MappingRecord {
            key_selector: Some("^DB_".to_string()),
            context: Some(BTreeMap::from([("tier".to_string(), json!("backend"))])),
            ..MappingRecord::default()
        };
        let merged = base.overlay(&over);
        assert_eq!(merged.key_selector.as_deref(), Some("^DB_"));
        assert_eq!(merged.project_selector.as_deref(), Some(""));
        assert_eq!(merged.skip, Some(false));
        assert_eq!(merged.context.unwrap()["tier"], json!("backend"));
    }
}
