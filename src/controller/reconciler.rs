//! # Reconciler
//!
//! One reconciliation pass, as a fixed sequence of stages:
//!
//! 1. **load_config**: list `ParameterMapping` records by namespace and
//!    resolve one [`Config`] per namespace
//! 2. **select**: list project names into a fresh [`ProjectCollection`] and
//!    keep the ones to synchronize
//! 3. **render**: render every template of each selected project's spec
//! 4. **apply**: [`kube_apply`] each non-empty document
//!
//! Dry-run stops after stage 3 and logs what would be applied.
//!
//! Nothing survives a pass: configs, collections and cached parameters are
//! rebuilt every time.

use super::apply::{kube_apply, ApplyOptions, ApplyOutcome};
use crate::cluster::{ClusterClient, OwnershipLabel, ResourceIdentity};
use crate::config::ControllerConfig;
use crate::error::{ManifestError, Result};
use crate::mapping::Config;
use crate::observability::metrics;
use crate::project::ProjectCollection;
use crate::provider::ParameterSource;
use crate::template::split_documents;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, Instrument};

/// Behaviour switches of a [`Reconciler`]
#[derive(Debug, Clone, Default)]
pub struct ReconcilerOptions {
    pub create_namespaces: bool,
    pub dry_run: bool,
    /// Exposed to templates as `debug`
    pub debug: bool,
    pub ownership: OwnershipLabel,
}

impl From<&ControllerConfig> for ReconcilerOptions {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            create_namespaces: config.create_namespaces,
            dry_run: config.dry_run,
            debug: config.debug,
            ownership: OwnershipLabel::new(config.ownership_label_value.as_str()),
        }
    }
}

/// Projects of one namespace chosen for synchronization
#[derive(Debug)]
pub struct Selection {
    pub collection: ProjectCollection,
    /// Names to render, in source order
    pub selected: Vec<String>,
}

/// One document produced by a template, ready to apply
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDocument {
    pub project: String,
    pub template: String,
    pub identity: ResourceIdentity,
    pub manifest: Value,
}

/// Counts for one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub namespaces: usize,
    pub projects: usize,
    pub documents: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl PassSummary {
    fn record(&mut self, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Created => self.created += 1,
            ApplyOutcome::Updated => self.updated += 1,
            ApplyOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Drives reconciliation passes against one cluster and one parameter source
#[derive(Debug)]
pub struct Reconciler {
    cluster: Arc<dyn ClusterClient>,
    source: Arc<dyn ParameterSource>,
    options: ReconcilerOptions,
    passes: AtomicU64,
}

impl Reconciler {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        source: Arc<dyn ParameterSource>,
        options: ReconcilerOptions,
    ) -> Self {
        Self {
            cluster,
            source,
            options,
            passes: AtomicU64::new(0),
        }
    }

    pub fn options(&self) -> &ReconcilerOptions {
        &self.options
    }

    /// Stage 1: one `Config` per namespace holding mappings
    pub async fn load_config(&self) -> Result<Vec<Arc<Config>>> {
        let mappings = self.cluster.list_mappings().await?;
        let mut configs = Vec::with_capacity(mappings.len());
        for (namespace, records) in &mappings {
            configs.push(Arc::new(Config::load(namespace, records)?));
        }
        Ok(configs)
    }

    /// Stage 2: projects of `config`'s namespace to synchronize.
    ///
    /// A project is dropped when its spec says `skip` or its spec's project
    /// selector does not match. Dropped projects stay in the collection, so
    /// projects including them still see their parameters.
    pub async fn select(&self, config: Arc<Config>) -> Result<Selection> {
        let collection = ProjectCollection::load(Arc::clone(&self.source), config).await?;

        let mut selected = Vec::new();
        for project in collection.projects() {
            let spec = project.spec();
            if spec.skip {
                debug!(project = project.name(), mapping = %spec.name, "Skipping project");
            } else if !spec.matches_project(project.name()) {
                debug!(
                    project = project.name(),
                    mapping = %spec.name,
                    "Project does not match selector"
                );
            } else {
                selected.push(project.name().to_string());
            }
        }

        debug!(
            namespace = collection.namespace(),
            total = collection.names().len(),
            selected = selected.len(),
            "Selected projects"
        );
        Ok(Selection {
            collection,
            selected,
        })
    }

    /// Stage 3: render every template of every selected project
    pub async fn render(&self, selection: &Selection) -> Result<Vec<RenderedDocument>> {
        let namespace = selection.collection.namespace();
        let mut documents = Vec::new();

        for name in &selection.selected {
            let Some(project) = selection.collection.get(name) else {
                continue;
            };
            let ctx = project.render_context(self.options.debug).await?;

            for (template_name, template) in &project.spec().resource_templates {
                let rendered = template.render(&ctx)?;
                for document in split_documents(&rendered) {
                    documents.extend(parse_document(namespace, name, template_name, &document)?);
                }
            }
            metrics::increment_projects_rendered();
        }

        Ok(documents)
    }

    /// Stage 4: apply one document
    pub async fn apply(&self, document: &RenderedDocument) -> Result<ApplyOutcome> {
        let options = ApplyOptions {
            create_namespaces: self.options.create_namespaces,
            ownership: self.options.ownership.clone(),
        };
        kube_apply(
            self.cluster.as_ref(),
            &document.identity,
            &document.manifest,
            &options,
        )
        .await
    }

    /// Run all stages once
    pub async fn run_pass(&self) -> Result<PassSummary> {
        let pass = self.passes.fetch_add(1, Ordering::Relaxed) + 1;
        let span = info_span!("reconcile.pass", pass);

        async move {
            let start = Instant::now();
            metrics::increment_passes();
            let result = self.stages().await;
            metrics::observe_pass_duration(start.elapsed().as_secs_f64());

            if let Ok(summary) = &result {
                info!(
                    namespaces = summary.namespaces,
                    projects = summary.projects,
                    documents = summary.documents,
                    created = summary.created,
                    updated = summary.updated,
                    skipped = summary.skipped,
                    dry_run = self.options.dry_run,
                    "Reconciliation pass complete"
                );
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn stages(&self) -> Result<PassSummary> {
        let mut summary = PassSummary::default();

        for config in self.load_config().await? {
            summary.namespaces += 1;
            let selection = self.select(config).await?;
            summary.projects += selection.selected.len();

            for document in self.render(&selection).await? {
                summary.documents += 1;
                if self.options.dry_run {
                    info!(
                        project = %document.project,
                        template = %document.template,
                        resource.kind = %document.identity.kind,
                        resource.name = %document.identity.name,
                        namespace = %document.identity.namespace,
                        "Dry run: would apply resource"
                    );
                    metrics::increment_documents("dry_run");
                    continue;
                }

                let outcome = self.apply(&document).await?;
                metrics::increment_documents(outcome.as_str());
                summary.record(outcome);
            }
        }

        Ok(summary)
    }
}

/// Parse one rendered document; `Ok(None)` for a document with no content
fn parse_document(
    namespace: &str,
    project: &str,
    template: &str,
    document: &str,
) -> Result<Option<RenderedDocument>> {
    let manifest: Value =
        serde_yaml::from_str(document).map_err(|source| ManifestError::Yaml {
            project: project.to_string(),
            template: template.to_string(),
            source,
        })?;

    if manifest.is_null() {
        return Ok(None);
    }
    if !manifest.is_object() {
        return Err(ManifestError::NotAMapping {
            project: project.to_string(),
            template: template.to_string(),
        }
        .into());
    }

    let identity = ResourceIdentity::from_manifest(&manifest, namespace).map_err(|path| {
        ManifestError::MissingPath {
            project: project.to_string(),
            template: template.to_string(),
            path,
        }
    })?;

    Ok(Some(RenderedDocument {
        project: project.to_string(),
        template: template.to_string(),
        identity,
        manifest,
    }))
}
