//! # Custom Resource Definitions
//!
//! CRD types for the Parameter Sync Controller.
//!
//! - `mapping.rs` - `ParameterMapping` resource, typed record fields and scope

mod mapping;

pub use mapping::{MappingRecord, ParameterMapping, RawMapping, Scope, MAPPING_FIELDS};
