//! Typed project spec
//!
//! A `ProjectSpec` is an effective mapping record with every field converted:
//! selectors compiled to patterns and resource templates compiled (and so
//! syntax-checked) up front.

use crate::crd::{MappingRecord, Scope};
use crate::error::ConfigError;
use crate::template::Template;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// A key selector of this shape is a plain word prefix the parameter store
/// can search for server-side.
static LITERAL_SELECTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\^?([A-Za-z0-9_-]+)$").expect("LITERAL_SELECTOR pattern is a valid regex")
});

/// Fully resolved, validated mapping governing a set of projects
#[derive(Debug)]
pub struct ProjectSpec {
    pub scope: Scope,
    /// Display name, used in logs
    pub name: String,
    /// `metadata.name` of the record this spec was built from
    pub resource: String,
    pub project_selector: Regex,
    pub key_selector: Regex,
    pub skip: bool,
    pub included_projects: Vec<String>,
    pub resource_templates: BTreeMap<String, Template>,
    pub context: BTreeMap<String, Value>,
    pub environment: Option<String>,
    pub tag: Option<String>,
}

impl ProjectSpec {
    /// Build a spec from an effective (already merged) record.
    ///
    /// Each field is converted explicitly. Fields absent from `record` take
    /// their built-in default.
    pub fn from_record(resource: &str, record: &MappingRecord) -> Result<Self, ConfigError> {
        let Some(scope) = record.scope else {
            return Err(ConfigError::MissingScope {
                resource: resource.to_string(),
            });
        };

        let resource_templates = record
            .resource_templates
            .iter()
            .flatten()
            .map(|(name, source)| {
                Template::compile(name, source)
                    .map(|template| (name.clone(), template))
                    .map_err(|source| ConfigError::InvalidTemplate {
                        resource: resource.to_string(),
                        template: name.clone(),
                        source,
                    })
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(Self {
            scope,
            name: record
                .name
                .clone()
                .unwrap_or_else(|| resource.to_string()),
            resource: resource.to_string(),
            project_selector: compile_selector(
                resource,
                "projectSelector",
                record.project_selector.as_deref(),
            )?,
            key_selector: compile_selector(resource, "keySelector", record.key_selector.as_deref())?,
            skip: record.skip.unwrap_or(false),
            included_projects: record.included_projects.clone().unwrap_or_default(),
            resource_templates,
            context: record.context.clone().unwrap_or_default(),
            environment: record.environment.clone(),
            tag: record.tag.clone(),
        })
    }

    /// Whether this spec's project selector matches `project`
    pub fn matches_project(&self, project: &str) -> bool {
        self.project_selector.is_match(project)
    }

    /// Whether this spec's key selector matches `key`
    pub fn matches_key(&self, key: &str) -> bool {
        self.key_selector.is_match(key)
    }

    /// Literal the parameter store can pre-filter on, if the key selector
    /// reduces to one
    pub fn search_term(&self) -> Option<&str> {
        LITERAL_SELECTOR
            .captures(self.key_selector.as_str())
            .and_then(|captures| captures.get(1))
            .map(|literal| literal.as_str())
    }
}

fn compile_selector(
    resource: &str,
    field: &'static str,
    pattern: Option<&str>,
) -> Result<Regex, ConfigError> {
    Regex::new(pattern.unwrap_or_default()).map_err(|source| ConfigError::InvalidSelector {
        resource: resource.to_string(),
        field,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key_selector: &str) -> MappingRecord {
        MappingRecord {
            key_selector: Some(key_selector.to_string()),
            ..MappingRecord::defaults()
        }
    }

    #[test]
    fn test_empty_selector_matches_everything() {
        let spec = ProjectSpec::from_record("default", &MappingRecord::defaults())
            .expect("defaults are valid");
        assert!(spec.matches_project("anything"));
        assert!(spec.matches_project(""));
        assert!(spec.matches_key("ANY_KEY"));
        assert_eq!(spec.search_term(), None);
    }

    #[test]
    fn test_search_term_literal_reduction() {
        let cases = [
            ("^APP_", Some("APP_")),
            ("DB", Some("DB")),
            ("my-prefix", Some("my-prefix")),
            ("^APP_.*", None),
            ("^(DB|CACHE)_", None),
            ("HOST$", None),
        ];
        for (selector, expected) in cases {
            let spec = ProjectSpec::from_record("default", &record(selector)).expect("valid");
            assert_eq!(spec.search_term(), expected, "selector {selector}");
        }
    }

    #[test]
    fn test_invalid_selector_is_config_error() {
        let err = ProjectSpec::from_record("broken", &record("(unclosed")).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidSelector {
                field: "keySelector",
                ..
            }
        ));
    }

    #[test]
    fn test_template_syntax_error_fails_at_construction() {
        let record = MappingRecord {
            resource_templates: Some(BTreeMap::from([(
                "configmap".to_string(),
                "{% for %}".to_string(),
            )])),
            ..MappingRecord::defaults()
        };
        match ProjectSpec::from_record("broken", &record).unwrap_err() {
            ConfigError::InvalidTemplate { template, .. } => assert_eq!(template, "configmap"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_scope_is_rejected() {
        let record = MappingRecord {
            scope: None,
            ..MappingRecord::defaults()
        };
        assert!(matches!(
            ProjectSpec::from_record("unscoped", &record),
            Err(ConfigError::MissingScope { .. })
        ));
    }
}
