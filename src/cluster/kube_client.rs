//! kube-rs implementation of [`ClusterClient`]
//!
//! Rendered documents are untyped, so every resource goes through
//! `DynamicObject` with an `ApiResource` built from the document's own
//! apiVersion, kind and pluralized kind.

use super::{
    ClusterClient, MappingChange, MappingWatch, MappingsByNamespace, OwnershipLabel,
    ResourceIdentity,
};
use crate::crd::{ParameterMapping, RawMapping};
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{
    api::{Api, ApiResource, ListParams, PostParams},
    core::{DynamicObject, GroupVersionKind},
    Client,
};
use kube_runtime::watcher;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

/// Cluster client backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient").finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn mappings_api(&self) -> Api<DynamicObject> {
        let ar = ApiResource::erase::<ParameterMapping>(&());
        Api::all_with(self.client.clone(), &ar)
    }

    fn api_for(&self, id: &ResourceIdentity) -> Api<DynamicObject> {
        let (group, version) = id.group_version();
        let gvk = GroupVersionKind::gvk(group, version, &id.kind);
        let ar = ApiResource::from_gvk_with_plural(&gvk, &id.plural);
        Api::namespaced_with(self.client.clone(), &id.namespace, &ar)
    }
}

fn to_object(manifest: &Value) -> Result<DynamicObject> {
    Ok(serde_json::from_value(manifest.clone()).map_err(kube::Error::SerdeError)?)
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn list_mappings(&self) -> Result<MappingsByNamespace> {
        let list = self.mappings_api().list(&ListParams::default()).await?;

        let mut grouped = MappingsByNamespace::new();
        for object in list.items {
            let Some(namespace) = object.metadata.namespace.clone() else {
                continue;
            };
            let name = object.metadata.name.clone().unwrap_or_default();
            let spec = object
                .data
                .get("spec")
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new()));
            grouped
                .entry(namespace)
                .or_default()
                .push(RawMapping::new(name, spec));
        }

        debug!(namespaces = grouped.len(), "Listed ParameterMapping resources");
        Ok(grouped)
    }

    async fn get(&self, id: &ResourceIdentity) -> Result<Option<Value>> {
        match self.api_for(id).get(&id.name).await {
            Ok(object) => Ok(Some(
                serde_json::to_value(object).map_err(kube::Error::SerdeError)?,
            )),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create(&self, id: &ResourceIdentity, manifest: &Value) -> Result<()> {
        self.api_for(id)
            .create(&PostParams::default(), &to_object(manifest)?)
            .await?;
        Ok(())
    }

    async fn update(&self, id: &ResourceIdentity, manifest: &Value) -> Result<()> {
        self.api_for(id)
            .replace(&id.name, &PostParams::default(), &to_object(manifest)?)
            .await?;
        Ok(())
    }

    async fn ensure_namespace(&self, namespace: &str, label: &OwnershipLabel) -> Result<bool> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        match api.get(namespace).await {
            Ok(_) => return Ok(false),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {}
            Err(e) => return Err(e.into()),
        }

        let object = Namespace {
            metadata: ObjectMeta {
                name: Some(namespace.to_string()),
                labels: Some(label.labels()),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        };
        match api.create(&PostParams::default(), &object).await {
            Ok(_) => {
                info!(namespace, "Created namespace");
                Ok(true)
            }
            // Created concurrently by someone else
            Err(kube::Error::Api(api_err)) if api_err.code == 409 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn watch_mappings(&self) -> Result<Box<dyn MappingWatch>> {
        let stream = watcher(self.mappings_api(), watcher::Config::default()).boxed();
        debug!("Opened ParameterMapping watch");
        Ok(Box::new(KubeMappingWatch { stream }))
    }
}

struct KubeMappingWatch {
    stream: BoxStream<'static, std::result::Result<watcher::Event<DynamicObject>, watcher::Error>>,
}

fn object_ref(object: &DynamicObject) -> (String, String) {
    (
        object.metadata.namespace.clone().unwrap_or_default(),
        object.metadata.name.clone().unwrap_or_default(),
    )
}

#[async_trait]
impl MappingWatch for KubeMappingWatch {
    async fn next_change(&mut self) -> Option<MappingChange> {
        while let Some(event) = self.stream.next().await {
            match event {
                Ok(watcher::Event::Apply(object)) => {
                    let (namespace, name) = object_ref(&object);
                    return Some(MappingChange::Applied { namespace, name });
                }
                Ok(watcher::Event::Delete(object)) => {
                    let (namespace, name) = object_ref(&object);
                    return Some(MappingChange::Deleted { namespace, name });
                }
                // Initial listing; the pass that follows reads it anyway
                Ok(watcher::Event::Init | watcher::Event::InitApply(_) | watcher::Event::InitDone) => {}
                Err(e) => {
                    warn!(error = %e, "ParameterMapping watch failed");
                    return None;
                }
            }
        }
        debug!("ParameterMapping watch stream ended");
        None
    }

    fn finish(self: Box<Self>) {
        debug!("Closed ParameterMapping watch");
    }
}
