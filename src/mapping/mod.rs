//! # Mapping Resolution
//!
//! Turns the `ParameterMapping` records of one namespace into a [`Config`]:
//! a single root spec plus ordered override specs.
//!
//! ## Merge order
//!
//! ```text
//! defaults  <-  root record            = effective root
//! effective root  <-  override record  = effective override (one per record)
//! ```
//!
//! A field present on the right replaces the left one wholesale.
//!
//! ## Resolution
//!
//! [`Config::spec_for_project`] evaluates every override's project selector.
//! No match resolves to the root spec, one match to that override. Several
//! matches log a warning listing every matching selector and resolve to the
//! first declared match, so a project name always has exactly one governing
//! spec.

mod spec;

pub use spec::ProjectSpec;

use crate::crd::{MappingRecord, RawMapping, Scope};
use crate::error::ConfigError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Resolved mappings of one namespace
#[derive(Debug)]
pub struct Config {
    namespace: String,
    root: Arc<ProjectSpec>,
    overrides: Vec<Arc<ProjectSpec>>,
    resolved: Mutex<HashMap<String, Arc<ProjectSpec>>>,
}

impl Config {
    /// Load the records found in `namespace`.
    ///
    /// Fails on an unknown or mistyped field, a record without a scope, more
    /// than one root record, or no root record at all. Override order follows
    /// `records`.
    pub fn load(namespace: &str, records: &[RawMapping]) -> Result<Self, ConfigError> {
        let mut roots: Vec<(&str, MappingRecord)> = Vec::new();
        let mut overrides: Vec<(&str, MappingRecord)> = Vec::new();

        for raw in records {
            let record = MappingRecord::from_spec(raw)?;
            match record.scope {
                Some(Scope::Root) => roots.push((raw.resource.as_str(), record)),
                Some(Scope::Override) => overrides.push((raw.resource.as_str(), record)),
                None => {
                    return Err(ConfigError::MissingScope {
                        resource: raw.resource.clone(),
                    })
                }
            }
        }

        if roots.len() > 1 {
            return Err(ConfigError::MultipleRoots {
                namespace: namespace.to_string(),
                resources: roots.iter().map(|(r, _)| (*r).to_string()).collect(),
            });
        }
        let Some((root_resource, root_record)) = roots.pop() else {
            return Err(ConfigError::MissingRoot {
                namespace: namespace.to_string(),
            });
        };

        let effective_root = MappingRecord::defaults().overlay(&root_record);
        let root = Arc::new(ProjectSpec::from_record(root_resource, &effective_root)?);

        let overrides = overrides
            .iter()
            .map(|(resource, record)| {
                ProjectSpec::from_record(resource, &effective_root.overlay(record)).map(Arc::new)
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            namespace,
            root = %root.name,
            overrides = overrides.len(),
            "Loaded mapping configuration"
        );

        Ok(Self {
            namespace: namespace.to_string(),
            root,
            overrides,
            resolved: Mutex::new(HashMap::new()),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn root(&self) -> &Arc<ProjectSpec> {
        &self.root
    }

    pub fn overrides(&self) -> &[Arc<ProjectSpec>] {
        &self.overrides
    }

    /// Spec governing `project`, memoized for the lifetime of this `Config`
    pub fn spec_for_project(&self, project: &str) -> Arc<ProjectSpec> {
        let mut resolved = self
            .resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(spec) = resolved.get(project) {
            return Arc::clone(spec);
        }

        let spec = self.resolve(project);
        resolved.insert(project.to_string(), Arc::clone(&spec));
        spec
    }

    fn resolve(&self, project: &str) -> Arc<ProjectSpec> {
        let matching: Vec<&Arc<ProjectSpec>> = self
            .overrides
            .iter()
            .filter(|spec| spec.matches_project(project))
            .collect();

        match matching.as_slice() {
            [] => Arc::clone(&self.root),
            [only] => Arc::clone(only),
            [first, ..] => {
                let selectors: Vec<String> = matching
                    .iter()
                    .map(|spec| format!("{} ({})", spec.name, spec.project_selector.as_str()))
                    .collect();
                warn!(
                    namespace = %self.namespace,
                    project,
                    matching = ?selectors,
                    selected = %first.name,
                    "Multiple override mappings match project; using the first declared"
                );
                Arc::clone(first)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::log_capture::capture;
    use serde_json::json;

    fn root(resource: &str) -> RawMapping {
        RawMapping::new(
            resource,
            json!({"scope": "root", "keySelector": "^APP_", "context": {"tier": "default"}}),
        )
    }

    fn override_for(resource: &str, selector: &str) -> RawMapping {
        RawMapping::new(
            resource,
            json!({"scope": "override", "projectSelector": selector}),
        )
    }

    #[test]
    fn test_load_requires_exactly_one_root() {
        let err = Config::load("team-a", &[root("a"), root("b")]).unwrap_err();
        match err {
            ConfigError::MultipleRoots { resources, .. } => {
                assert_eq!(resources, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = Config::load("team-a", &[override_for("web", "^web")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRoot { .. }));
    }

    #[test]
    fn test_load_rejects_unknown_fields_and_missing_scope() {
        let typo = RawMapping::new("typo", json!({"scope": "override", "skipp": true}));
        assert!(matches!(
            Config::load("team-a", &[root("default"), typo]),
            Err(ConfigError::UnknownField { .. })
        ));

        let unscoped = RawMapping::new("unscoped", json!({"projectSelector": "x"}));
        assert!(matches!(
            Config::load("team-a", &[root("default"), unscoped]),
            Err(ConfigError::MissingScope { .. })
        ));
    }

    #[test]
    fn test_overrides_inherit_effective_root_fields() {
        let config = Config::load("team-a", &[root("default"), override_for("web", "^web-")])
            .expect("valid config");
        let spec = config.spec_for_project("web-frontend");
        assert_eq!(spec.scope, Scope::Override);
        assert_eq!(spec.name, "web");
        assert_eq!(spec.key_selector.as_str(), "^APP_");
        assert_eq!(spec.context["tier"], json!("default"));
    }

    #[test]
    fn test_unmatched_project_resolves_to_root() {
        let config = Config::load("team-a", &[root("default"), override_for("web", "^web-")])
            .expect("valid config");
        let spec = config.spec_for_project("billing");
        assert!(Arc::ptr_eq(&spec, config.root()));
    }

    #[test]
    fn test_spec_for_project_is_memoized() {
        let config = Config::load("team-a", &[root("default"), override_for("web", "^web-")])
            .expect("valid config");
        let first = config.spec_for_project("web-api");
        let second = config.spec_for_project("web-api");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_ambiguous_match_selects_first_declared() {
        let config = Config::load(
            "team-a",
            &[
                root("default"),
                override_for("web", "^web"),
                override_for("frontend", "front"),
            ],
        )
        .expect("valid config");
        let (spec, logs) = capture(|| {
            let spec = config.spec_for_project("web-frontend");
            config.spec_for_project("web-frontend");
            spec
        });
        assert_eq!(spec.name, "web");
        assert!(Arc::ptr_eq(&spec, &config.overrides()[0]));

        assert!(logs.contains("WARN"));
        assert!(logs.contains(r#"matching=["web (^web)", "frontend (front)"]"#));
        assert!(logs.contains("selected=web"));
        // Resolved once, so warned once
        assert_eq!(
            logs.matches("Multiple override mappings match project").count(),
            1
        );
    }
}
