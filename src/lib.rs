//! Parameter Sync Controller Library
//!
//! Renders projects from an upstream parameter store into Kubernetes
//! resources, governed by `ParameterMapping` custom resources.
//!
//! - [`mapping`] resolves mapping records into per-project specs
//! - [`project`] walks project inclusion and folds parameters with provenance
//! - [`template`] renders a spec's templates strictly
//! - [`controller`] runs and schedules reconciliation passes
//!
//! ## Quick Start
//!
//! ```rust
//! use parameter_sync_controller::prelude::*;
//! ```

pub mod cluster;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod error;
pub mod mapping;
pub mod observability;
pub mod prelude;
pub mod project;
pub mod provider;
pub mod server;
pub mod template;

pub use error::{Error, Result};
