//! # Project Graph
//!
//! Upstream projects, their inclusion graph and their aggregated parameters.
//!
//! ## Inclusion
//!
//! A spec's `included_projects` pulls other projects' parameters underneath
//! the project's own. The graph is walked depth-first:
//! - an edge back onto the current ancestor path is a cycle and is dropped
//!   with a "Breaking circular dependency" warning
//! - a name missing from the collection is dropped with a "Skipping unknown
//!   project" warning
//!
//! Neither aborts the pass.
//!
//! ## Precedence
//!
//! ```text
//! A includes B, B includes C
//! all_parameters(A) = C's, B's, A's
//! fold: later entries win, so A overrides B overrides C
//! ```

mod collection;
mod hierarchy;
mod parameters;

pub use crate::provider::ParameterRecord;
pub use collection::{Project, ProjectCollection};
pub use hierarchy::Hierarchy;
pub use parameters::{origins, ParameterSet, SourcedParameter};
