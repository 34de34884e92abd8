//! Project registry for one reconciliation pass

use super::hierarchy::Hierarchy;
use super::parameters::{origins, ParameterSet, SourcedParameter};
use crate::error::{Error, Result};
use crate::mapping::{Config, ProjectSpec};
use crate::provider::{ParameterQuery, ParameterRecord, ParameterSource};
use crate::template::RenderContext;
use minijinja::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Every project of one namespace, for the duration of one pass
///
/// Owns its projects. Parameters are fetched at most once per project and
/// cached here, so a project included by many others costs one request.
#[derive(Debug)]
pub struct ProjectCollection {
    source: Arc<dyn ParameterSource>,
    config: Arc<Config>,
    names: Vec<String>,
    entries: HashMap<String, ProjectEntry>,
}

#[derive(Debug)]
struct ProjectEntry {
    name: String,
    spec: Arc<ProjectSpec>,
    parameters: OnceCell<Vec<ParameterRecord>>,
}

impl ProjectCollection {
    /// List project names from `source` and register each under the `ProjectSpec`
    /// `config` resolves for it
    pub async fn load(source: Arc<dyn ParameterSource>, config: Arc<Config>) -> Result<Self> {
        let names = source
            .project_names()
            .await
            .map_err(Error::ParameterSource)?;
        debug!(
            namespace = config.namespace(),
            count = names.len(),
            "Loaded project names"
        );
        Ok(Self::new(source, config, names))
    }

    /// Register `names`, in order; duplicates are registered once
    pub fn new(source: Arc<dyn ParameterSource>, config: Arc<Config>, names: Vec<String>) -> Self {
        let mut entries = HashMap::with_capacity(names.len());
        let mut ordered = Vec::with_capacity(names.len());
        for name in names {
            if entries.contains_key(&name) {
                continue;
            }
            let entry = ProjectEntry {
                name: name.clone(),
                spec: config.spec_for_project(&name),
                parameters: OnceCell::new(),
            };
            entries.insert(name.clone(), entry);
            ordered.push(name);
        }

        Self {
            source,
            config,
            names: ordered,
            entries,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn namespace(&self) -> &str {
        self.config.namespace()
    }

    /// Project names, in source order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Project<'_>> {
        self.entries.get(name).map(|entry| Project {
            collection: self,
            entry,
        })
    }

    /// Every project, in source order
    pub fn projects(&self) -> impl Iterator<Item = Project<'_>> {
        self.names.iter().filter_map(|name| self.get(name))
    }
}

/// A project registered in a [`ProjectCollection`]
#[derive(Debug, Clone, Copy)]
pub struct Project<'c> {
    collection: &'c ProjectCollection,
    entry: &'c ProjectEntry,
}

/// One level of the inclusion walk
struct Frame<'c> {
    project: Project<'c>,
    next_child: usize,
    subtree: Hierarchy,
}

impl<'c> Project<'c> {
    pub fn name(&self) -> &'c str {
        &self.entry.name
    }

    /// Governing spec
    pub fn spec(&self) -> &'c Arc<ProjectSpec> {
        &self.entry.spec
    }

    /// This project's own parameters, filtered by its key selector.
    ///
    /// Fetched on first use and cached for the collection's lifetime. A key
    /// selector that reduces to a literal is also sent to the source as a
    /// search term.
    pub async fn parameters(&self) -> Result<&'c [ParameterRecord]> {
        let entry = self.entry;
        let collection = self.collection;
        let source = &collection.source;
        let records = entry
            .parameters
            .get_or_try_init(|| async move {
                let spec = &entry.spec;
                let query = ParameterQuery {
                    search_term: spec.search_term().map(str::to_string),
                    environment: spec.environment.clone(),
                    tag: spec.tag.clone(),
                };
                let records = source
                    .parameters(&entry.name, &query)
                    .await
                    .map_err(Error::ParameterSource)?;
                let fetched = records.len();
                let kept: Vec<ParameterRecord> = records
                    .into_iter()
                    .filter(|record| spec.matches_key(&record.key))
                    .collect();
                debug!(
                    project = %entry.name,
                    fetched,
                    kept = kept.len(),
                    "Fetched project parameters"
                );
                Ok::<_, Error>(kept)
            })
            .await?;
        Ok(records.as_slice())
    }

    /// Inclusion hierarchy below this project
    pub fn included_projects(&self) -> Hierarchy {
        self.walk().0
    }

    /// Depth-first walk of the inclusion graph.
    ///
    /// The frame stack is the current ancestor path: a child already on it
    /// closes a cycle and that edge is dropped. Returns the hierarchy and
    /// every reachable project in post-order (children before the project
    /// that includes them, this project last).
    fn walk(&self) -> (Hierarchy, Vec<Project<'c>>) {
        let mut stack = vec![Frame {
            project: *self,
            next_child: 0,
            subtree: Hierarchy::default(),
        }];
        let mut post_order = Vec::new();

        while let Some(top) = stack.last_mut() {
            let parent = top.project;
            let Some(child) = parent.spec().included_projects.get(top.next_child) else {
                let Some(done) = stack.pop() else { break };
                post_order.push(done.project);
                match stack.last_mut() {
                    Some(frame) => frame.subtree.push(done.project.name(), done.subtree),
                    None => return (done.subtree, post_order),
                }
                continue;
            };
            top.next_child += 1;

            if stack.iter().any(|frame| frame.project.name() == child.as_str()) {
                warn!(
                    project = parent.name(),
                    included = %child,
                    "Breaking circular dependency: {} -> {}",
                    parent.name(),
                    child
                );
                continue;
            }

            match self.collection.get(child) {
                Some(project) => stack.push(Frame {
                    project,
                    next_child: 0,
                    subtree: Hierarchy::default(),
                }),
                None => warn!(
                    project = parent.name(),
                    included = %child,
                    "Skipping unknown project '{}' included by '{}'",
                    child,
                    parent.name()
                ),
            }
        }

        (Hierarchy::default(), post_order)
    }

    /// Parameters of every transitively included project, children first,
    /// this project's own last. Not deduplicated.
    pub async fn all_parameters(&self) -> Result<Vec<SourcedParameter>> {
        let (_, post_order) = self.walk();
        Self::collect_parameters(post_order).await
    }

    async fn collect_parameters(post_order: Vec<Project<'c>>) -> Result<Vec<SourcedParameter>> {
        let mut sequence = Vec::new();
        for project in post_order {
            let name = project.name();
            sequence.extend(project.parameters().await?.iter().map(|record| {
                SourcedParameter {
                    project: name.to_string(),
                    record: record.clone(),
                }
            }));
        }
        Ok(sequence)
    }

    /// Provenance string of every aggregated key
    pub async fn parameter_origins(&self) -> Result<BTreeMap<String, String>> {
        Ok(origins(&self.all_parameters().await?))
    }

    /// Aggregated parameters folded by precedence
    pub async fn parameter_set(&self) -> Result<ParameterSet> {
        Ok(ParameterSet::fold(&self.all_parameters().await?))
    }

    /// Template context for this project
    pub async fn render_context(&self, debug: bool) -> Result<RenderContext> {
        let (hierarchy, post_order) = self.walk();
        let set = ParameterSet::fold(&Self::collect_parameters(post_order).await?);
        let spec = self.spec();

        let mut ctx = RenderContext::new(self.collection.namespace(), self.name());
        ctx.params = set.params;
        ctx.param_origins = set.param_origins;
        ctx.secrets = set.secrets;
        ctx.secret_origins = set.secret_origins;
        ctx.hierarchy = Value::from_serialize(&hierarchy);
        ctx.context = spec.context.clone();
        ctx.environment = spec.environment.clone();
        ctx.tag = spec.tag.clone();
        ctx.debug = debug;
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::RawMapping;
    use async_trait::async_trait;
    use serde_json::json;
    use crate::observability::log_capture::capture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct StaticSource {
        projects: BTreeMap<String, Vec<ParameterRecord>>,
        requests: AtomicUsize,
        queries: Mutex<Vec<ParameterQuery>>,
    }

    impl StaticSource {
        fn with(mut self, project: &str, params: &[(&str, &str, bool)]) -> Self {
            self.projects.insert(
                project.to_string(),
                params
                    .iter()
                    .map(|(k, v, s)| ParameterRecord::new(*k, *v, *s))
                    .collect(),
            );
            self
        }
    }

    #[async_trait]
    impl ParameterSource for StaticSource {
        async fn project_names(&self) -> anyhow::Result<Vec<String>> {
            Ok(self.projects.keys().cloned().collect())
        }

        async fn parameters(
            &self,
            project: &str,
            query: &ParameterQuery,
        ) -> anyhow::Result<Vec<ParameterRecord>> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            self.queries
                .lock()
                .expect("queries lock")
                .push(query.clone());
            Ok(self.projects.get(project).cloned().unwrap_or_default())
        }
    }

    /// Root mapping plus one override per `(project, includes)` pair
    fn config(includes: &[(&str, Vec<&str>)]) -> Arc<Config> {
        let mut records = vec![RawMapping::new("default", json!({"scope": "root"}))];
        for (project, included) in includes {
            records.push(RawMapping::new(
                format!("{project}-mapping"),
                json!({
                    "scope": "override",
                    "projectSelector": format!("^{project}$"),
                    "includedProjects": included,
                }),
            ));
        }
        Arc::new(Config::load("team-a", &records).expect("valid config"))
    }

    fn collection(source: StaticSource, config: Arc<Config>) -> ProjectCollection {
        let names = source.projects.keys().cloned().collect();
        ProjectCollection::new(Arc::new(source), config, names)
    }

    #[test]
    fn test_cycle_is_broken_with_warning() {
        let source = StaticSource::default().with("A", &[]).with("B", &[]);
        let projects = collection(source, config(&[("A", vec!["B"]), ("B", vec!["A"])]));
        let a = projects.get("A").expect("A registered");

        let (hierarchy, logs) = capture(|| a.included_projects());

        assert_eq!(hierarchy.names().collect::<Vec<_>>(), vec!["B"]);
        assert!(hierarchy.get("B").is_some_and(Hierarchy::is_empty));
        assert!(logs.contains("Breaking circular dependency"));
    }

    #[test]
    fn test_unknown_include_is_skipped_with_warning() {
        let source = StaticSource::default().with("A", &[]).with("B", &[]);
        let projects = collection(source, config(&[("A", vec!["Z", "B"])]));
        let a = projects.get("A").expect("A registered");

        let (hierarchy, logs) = capture(|| a.included_projects());

        assert_eq!(hierarchy.names().collect::<Vec<_>>(), vec!["B"]);
        assert!(logs.contains("Skipping unknown project"));
    }

    #[test]
    fn test_self_include_is_a_cycle() {
        let source = StaticSource::default().with("A", &[]);
        let projects = collection(source, config(&[("A", vec!["A"])]));
        let (hierarchy, logs) = capture(|| projects.get("A").expect("A").included_projects());
        assert!(hierarchy.is_empty());
        assert!(logs.contains("Breaking circular dependency"));
    }

    #[tokio::test]
    async fn test_all_parameters_children_first() {
        let source = StaticSource::default()
            .with("A", &[("a1", "1", false)])
            .with("B", &[("b1", "1", false), ("b2", "2", false)])
            .with("C", &[("c1", "1", false)]);
        let projects = collection(source, config(&[("A", vec!["B"]), ("B", vec!["C"])]));
        let a = projects.get("A").expect("A registered");

        let keys: Vec<String> = a
            .all_parameters()
            .await
            .expect("parameters")
            .into_iter()
            .map(|p| p.record.key)
            .collect();
        assert_eq!(keys, vec!["c1", "b1", "b2", "a1"]);
    }

    #[tokio::test]
    async fn test_parameter_origins_follow_include_chain() {
        let source = StaticSource::default()
            .with("A", &[("param3", "a", false), ("param0", "a", false)])
            .with("B", &[("param3", "b", false), ("param4", "b", false)])
            .with("C", &[("param3", "c", false), ("param5", "c", false)]);
        let projects = collection(source, config(&[("A", vec!["B"]), ("B", vec!["C"])]));
        let origins = projects
            .get("A")
            .expect("A registered")
            .parameter_origins()
            .await
            .expect("origins");

        let expected: BTreeMap<String, String> = [
            ("param0", "A"),
            ("param3", "A (B -> C)"),
            ("param4", "B"),
            ("param5", "C"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(origins, expected);
    }

    #[tokio::test]
    async fn test_parameters_are_fetched_once_and_key_filtered() {
        let mut records = vec![RawMapping::new(
            "default",
            json!({"scope": "root", "keySelector": "^APP_"}),
        )];
        records.push(RawMapping::new(
            "web",
            json!({"scope": "override", "projectSelector": "^web$", "includedProjects": ["shared"]}),
        ));
        let config = Arc::new(Config::load("team-a", &records).expect("valid config"));
        let source = Arc::new(
            StaticSource::default()
                .with("web", &[("APP_NAME", "web", false), ("OTHER", "x", false)])
                .with("shared", &[("APP_REGION", "eu", false)]),
        );
        let projects = ProjectCollection::new(
            Arc::clone(&source) as Arc<dyn ParameterSource>,
            config,
            vec!["web".to_string(), "shared".to_string()],
        );

        let web = projects.get("web").expect("web registered");
        let own = web.parameters().await.expect("parameters");
        assert_eq!(own, &[ParameterRecord::new("APP_NAME", "web", false)]);

        web.all_parameters().await.expect("all parameters");
        projects
            .get("shared")
            .expect("shared registered")
            .parameters()
            .await
            .expect("parameters");
        assert_eq!(source.requests.load(Ordering::SeqCst), 2);

        let queries = source.queries.lock().expect("queries lock");
        assert!(queries
            .iter()
            .all(|q| q.search_term.as_deref() == Some("APP_")));
    }

    #[tokio::test]
    async fn test_render_context_partitions_secrets() {
        let source = StaticSource::default()
            .with("A", &[("HOST", "a-host", false), ("TOKEN", "t0k3n", true)])
            .with("B", &[("HOST", "b-host", false)]);
        let projects = collection(source, config(&[("A", vec!["B"])]));
        let ctx = projects
            .get("A")
            .expect("A registered")
            .render_context(true)
            .await
            .expect("context");

        assert_eq!(ctx.namespace, "team-a");
        assert_eq!(ctx.params["HOST"], "a-host");
        assert_eq!(ctx.param_origins["HOST"], "A (B)");
        assert_eq!(ctx.secrets["TOKEN"], "t0k3n");
        assert!(ctx.debug);
        assert_eq!(
            serde_json::to_string(&ctx.hierarchy).expect("serializable"),
            r#"{"B":{}}"#
        );
    }
}
