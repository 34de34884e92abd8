//! Apply decision for one rendered document
//!
//! | Cluster state                 | Action                               |
//! |-------------------------------|--------------------------------------|
//! | absent                        | create, stamped with ownership label |
//! | present, label absent/foreign | skip, never mutated                  |
//! | present, owned                | stamp and update, unconditionally    |
//!
//! No client-side diff is computed; a no-op update is left to the API
//! server.

use crate::cluster::{ClusterClient, OwnershipLabel, ResourceIdentity};
use crate::error::Result;
use serde_json::Value;
use tracing::{debug, info};

/// Result of applying one document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    /// Exists without our ownership label
    Skipped,
}

impl ApplyOutcome {
    /// Metric label
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Create the target namespace (labelled as managed) when missing
    pub create_namespaces: bool,
    pub ownership: OwnershipLabel,
}

/// Create, update or skip `manifest` at `identity`
pub async fn kube_apply(
    cluster: &dyn ClusterClient,
    identity: &ResourceIdentity,
    manifest: &Value,
    options: &ApplyOptions,
) -> Result<ApplyOutcome> {
    if options.create_namespaces
        && cluster
            .ensure_namespace(&identity.namespace, &options.ownership)
            .await?
    {
        info!(namespace = %identity.namespace, "Created target namespace");
    }

    let mut desired = manifest.clone();
    set_metadata(&mut desired, "namespace", Value::String(identity.namespace.clone()));

    match cluster.get(identity).await? {
        None => {
            options.ownership.stamp(&mut desired);
            cluster.create(identity, &desired).await?;
            info!(
                resource.kind = %identity.kind,
                resource.name = %identity.name,
                namespace = %identity.namespace,
                "Created resource"
            );
            Ok(ApplyOutcome::Created)
        }
        Some(existing) if !options.ownership.is_owned(&existing) => {
            info!(
                resource.kind = %identity.kind,
                resource.name = %identity.name,
                namespace = %identity.namespace,
                label = options.ownership.key(),
                "Resource exists but is not under management; skipping"
            );
            Ok(ApplyOutcome::Skipped)
        }
        Some(existing) => {
            options.ownership.stamp(&mut desired);
            if let Some(version) = existing
                .get("metadata")
                .and_then(|m| m.get("resourceVersion"))
            {
                set_metadata(&mut desired, "resourceVersion", version.clone());
            }
            cluster.update(identity, &desired).await?;
            debug!(
                resource.kind = %identity.kind,
                resource.name = %identity.name,
                namespace = %identity.namespace,
                "Updated resource"
            );
            Ok(ApplyOutcome::Updated)
        }
    }
}

fn set_metadata(manifest: &mut Value, field: &str, value: Value) {
    if let Some(metadata) = manifest
        .get_mut("metadata")
        .and_then(Value::as_object_mut)
    {
        metadata.insert(field.to_string(), value);
    }
}
