//! # Prelude
//!
//! Re-exports commonly used types and traits.
//!
//! ```rust
//! use parameter_sync_controller::prelude::*;
//! ```

pub use crate::crd::{MappingRecord, ParameterMapping, RawMapping, Scope};

// Collaborator traits
pub use crate::cluster::{ClusterClient, MappingChange, MappingWatch, ResourceIdentity};
pub use crate::provider::{ParameterQuery, ParameterRecord, ParameterSource};

pub use crate::config::ControllerConfig;
pub use crate::controller::{
    kube_apply, with_polling, ApplyOutcome, Polling, Reconciler, ReconcilerOptions, Wakeup,
};
pub use crate::mapping::{Config, ProjectSpec};
pub use crate::project::{Project, ProjectCollection};
pub use crate::template::{RenderContext, Template};

pub use crate::error::{ConfigError, Error, ManifestError, Result};
pub use crate::template::TemplateError;
