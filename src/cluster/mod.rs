//! # Cluster Access
//!
//! The cluster API as seen by a reconciliation pass, behind the
//! [`ClusterClient`] trait:
//! - generic get/create/update of namespaced resources keyed by
//!   [`ResourceIdentity`]
//! - namespace creation carrying the ownership label
//! - listing of `ParameterMapping` records grouped by namespace
//! - a watch over `ParameterMapping` changes
//!
//! [`KubeClusterClient`] implements it with kube-rs.

mod identity;
mod kube_client;
mod ownership;

pub use identity::{pluralize, ResourceIdentity};
pub use kube_client::KubeClusterClient;
pub use ownership::OwnershipLabel;

use crate::crd::RawMapping;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

/// Mapping records, keyed by the namespace they were found in
pub type MappingsByNamespace = BTreeMap<String, Vec<RawMapping>>;

/// A change to a `ParameterMapping` resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingChange {
    Applied { namespace: String, name: String },
    Deleted { namespace: String, name: String },
}

#[async_trait]
pub trait ClusterClient: Send + Sync + std::fmt::Debug {
    /// Every `ParameterMapping` in the cluster, grouped by namespace
    async fn list_mappings(&self) -> Result<MappingsByNamespace>;

    /// Current state of the resource, `None` when it does not exist
    async fn get(&self, id: &ResourceIdentity) -> Result<Option<Value>>;

    async fn create(&self, id: &ResourceIdentity, manifest: &Value) -> Result<()>;

    /// Replace the resource with `manifest`
    async fn update(&self, id: &ResourceIdentity, manifest: &Value) -> Result<()>;

    /// Create `namespace` with `label` unless it exists; true when created
    async fn ensure_namespace(&self, namespace: &str, label: &OwnershipLabel) -> Result<bool>;

    /// Open a fresh watch over `ParameterMapping` resources
    async fn watch_mappings(&self) -> Result<Box<dyn MappingWatch>>;
}

/// An open mapping watch
#[async_trait]
pub trait MappingWatch: Send {
    /// Next change after the initial listing; `None` once the stream has
    /// ended or failed
    async fn next_change(&mut self) -> Option<MappingChange>;

    /// Close the watch
    fn finish(self: Box<Self>);
}
