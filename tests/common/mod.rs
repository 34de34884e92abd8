//! Common test utilities for integration tests
//!
//! In-memory stand-ins for the cluster and parameter store, plus a log
//! capture for asserting on `tracing` output.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use parameter_sync_controller::cluster::{
    ClusterClient, MappingChange, MappingWatch, MappingsByNamespace, OwnershipLabel,
    ResourceIdentity,
};
use parameter_sync_controller::controller::{Reconciler, ReconcilerOptions};
use parameter_sync_controller::crd::RawMapping;
use parameter_sync_controller::provider::{ParameterQuery, ParameterRecord, ParameterSource};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing_subscriber::fmt::MakeWriter;

/// A call made against [`MemoryCluster`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListMappings,
    Get(String),
    Create(String),
    Update(String),
    EnsureNamespace(String),
    Watch,
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::Create(_) | Self::Update(_))
    }
}

type ChangeReceiver = mpsc::UnboundedReceiver<MappingChange>;

/// Cluster held in memory; records every call
#[derive(Debug, Default)]
pub struct MemoryCluster {
    mappings: Mutex<MappingsByNamespace>,
    objects: Mutex<BTreeMap<ResourceIdentity, Value>>,
    namespaces: Mutex<BTreeMap<String, Option<String>>>,
    calls: Mutex<Vec<Call>>,
    changes: Arc<Mutex<Option<ChangeReceiver>>>,
    versions: AtomicU64,
    fail_writes: AtomicBool,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mapping(self, namespace: &str, mapping: RawMapping) -> Self {
        self.add_mapping(namespace, mapping);
        self
    }

    pub fn add_mapping(&self, namespace: &str, mapping: RawMapping) {
        self.mappings
            .lock()
            .expect("mappings")
            .entry(namespace.to_string())
            .or_default()
            .push(mapping);
    }

    /// Seed an existing object, as if created by someone else
    pub fn insert(&self, identity: &ResourceIdentity, object: Value) {
        self.objects
            .lock()
            .expect("objects")
            .insert(identity.clone(), object);
    }

    pub fn object(&self, identity: &ResourceIdentity) -> Option<Value> {
        self.objects.lock().expect("objects").get(identity).cloned()
    }

    pub fn objects(&self) -> BTreeMap<ResourceIdentity, Value> {
        self.objects.lock().expect("objects").clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls").clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    /// Ownership label value of each namespace the controller created
    pub fn created_namespaces(&self) -> BTreeMap<String, Option<String>> {
        self.namespaces.lock().expect("namespaces").clone()
    }

    pub fn add_namespace(&self, namespace: &str) {
        self.namespaces
            .lock()
            .expect("namespaces")
            .insert(namespace.to_string(), None);
    }

    /// Make create and update fail with a cluster error
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Sender feeding the watch open on this cluster. Events sent while no
    /// watch is open, or left unread when a watch finishes, are lost.
    pub fn mapping_events(&self) -> mpsc::UnboundedSender<MappingChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.changes.lock().expect("changes") = Some(rx);
        tx
    }

    fn record(&self, call: Call) {
        self.calls.lock().expect("calls").push(call);
    }

    fn write_error(&self) -> parameter_sync_controller::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            let serde_error = serde_json::from_str::<Value>("{").unwrap_err();
            return Err(kube::Error::SerdeError(serde_error).into());
        }
        Ok(())
    }

    fn next_version(&self) -> String {
        (self.versions.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    async fn list_mappings(&self) -> parameter_sync_controller::Result<MappingsByNamespace> {
        self.record(Call::ListMappings);
        Ok(self.mappings.lock().expect("mappings").clone())
    }

    async fn get(&self, id: &ResourceIdentity) -> parameter_sync_controller::Result<Option<Value>> {
        self.record(Call::Get(id.to_string()));
        Ok(self.object(id))
    }

    async fn create(
        &self,
        id: &ResourceIdentity,
        manifest: &Value,
    ) -> parameter_sync_controller::Result<()> {
        self.record(Call::Create(id.to_string()));
        self.write_error()?;
        let mut object = manifest.clone();
        object["metadata"]["resourceVersion"] = json!(self.next_version());
        self.insert(id, object);
        Ok(())
    }

    async fn update(
        &self,
        id: &ResourceIdentity,
        manifest: &Value,
    ) -> parameter_sync_controller::Result<()> {
        self.record(Call::Update(id.to_string()));
        self.write_error()?;
        self.insert(id, manifest.clone());
        Ok(())
    }

    async fn ensure_namespace(
        &self,
        namespace: &str,
        label: &OwnershipLabel,
    ) -> parameter_sync_controller::Result<bool> {
        self.record(Call::EnsureNamespace(namespace.to_string()));
        let mut namespaces = self.namespaces.lock().expect("namespaces");
        if namespaces.contains_key(namespace) {
            return Ok(false);
        }
        namespaces.insert(namespace.to_string(), Some(label.value().to_string()));
        Ok(true)
    }

    async fn watch_mappings(&self) -> parameter_sync_controller::Result<Box<dyn MappingWatch>> {
        self.record(Call::Watch);
        let mut receiver = self.changes.lock().expect("changes").take();
        if let Some(receiver) = receiver.as_mut() {
            discard_pending(receiver);
        }
        Ok(Box::new(MemoryWatch {
            receiver,
            slot: Arc::clone(&self.changes),
        }))
    }
}

/// Watch over the channel from [`MemoryCluster::mapping_events`]. Like a
/// reopened Kubernetes watch, it only reports events sent while it is open.
struct MemoryWatch {
    receiver: Option<ChangeReceiver>,
    slot: Arc<Mutex<Option<ChangeReceiver>>>,
}

#[async_trait]
impl MappingWatch for MemoryWatch {
    async fn next_change(&mut self) -> Option<MappingChange> {
        match self.receiver.as_mut() {
            Some(receiver) => receiver.recv().await,
            None => std::future::pending().await,
        }
    }

    fn finish(self: Box<Self>) {
        if let Some(mut receiver) = self.receiver {
            discard_pending(&mut receiver);
            *self.slot.lock().expect("changes") = Some(receiver);
        }
    }
}

fn discard_pending(receiver: &mut ChangeReceiver) {
    while receiver.try_recv().is_ok() {}
}

/// Parameter store held in memory; records every query
#[derive(Debug, Default)]
pub struct MemoryParameterSource {
    projects: BTreeMap<String, Vec<ParameterRecord>>,
    queries: Mutex<Vec<(String, ParameterQuery)>>,
    unavailable: bool,
}

impl MemoryParameterSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `project` with `(key, value, secret)` parameters
    pub fn with_project(mut self, project: &str, params: &[(&str, &str, bool)]) -> Self {
        self.projects.insert(
            project.to_string(),
            params
                .iter()
                .map(|(key, value, secret)| ParameterRecord::new(*key, *value, *secret))
                .collect(),
        );
        self
    }

    /// Every call fails
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn queries(&self) -> Vec<(String, ParameterQuery)> {
        self.queries.lock().expect("queries").clone()
    }

    pub fn queried_projects(&self) -> BTreeSet<String> {
        self.queries().into_iter().map(|(project, _)| project).collect()
    }
}

#[async_trait]
impl ParameterSource for MemoryParameterSource {
    async fn project_names(&self) -> anyhow::Result<Vec<String>> {
        if self.unavailable {
            anyhow::bail!("parameter store unavailable");
        }
        Ok(self.projects.keys().cloned().collect())
    }

    async fn parameters(
        &self,
        project: &str,
        query: &ParameterQuery,
    ) -> anyhow::Result<Vec<ParameterRecord>> {
        if self.unavailable {
            anyhow::bail!("parameter store unavailable");
        }
        self.queries
            .lock()
            .expect("queries")
            .push((project.to_string(), query.clone()));
        Ok(self.projects.get(project).cloned().unwrap_or_default())
    }
}

/// Reconciler over the given in-memory collaborators
pub fn reconciler(
    cluster: &Arc<MemoryCluster>,
    source: &Arc<MemoryParameterSource>,
    options: ReconcilerOptions,
) -> Reconciler {
    Reconciler::new(
        Arc::clone(cluster) as Arc<dyn ClusterClient>,
        Arc::clone(source) as Arc<dyn ParameterSource>,
        options,
    )
}

/// ConfigMap template carrying every non-secret parameter
pub const CONFIGMAP_TEMPLATE: &str = "\
apiVersion: v1
kind: ConfigMap
metadata:
  name: {{ project | dns_safe }}
data:
{%- for key, value in params|items %}
  {{ key }}: {{ value | tojson }}
{%- endfor %}
";

/// Root mapping rendering [`CONFIGMAP_TEMPLATE`] for every project
pub fn configmap_root() -> RawMapping {
    RawMapping::new(
        "default",
        json!({
            "scope": "root",
            "resourceTemplates": {"configmap": CONFIGMAP_TEMPLATE},
        }),
    )
}

pub fn configmap_identity(name: &str, namespace: &str) -> ResourceIdentity {
    ResourceIdentity::from_manifest(
        &json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": name},
        }),
        namespace,
    )
    .expect("valid identity")
}

/// In-memory log sink for a `tracing_subscriber::fmt` subscriber
#[derive(Debug, Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("log buffer")).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Capture all log output on this thread until the guard drops
pub fn capture_logs() -> (tracing::subscriber::DefaultGuard, LogBuffer) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .finish();
    (tracing::subscriber::set_default(subscriber), buffer)
}
