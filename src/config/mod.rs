//! # Configuration
//!
//! Controller settings, layered as built-in defaults, then environment
//! variables, then command line flags (applied by the binary).

mod controller;

pub use controller::{ControllerConfig, ParameterStoreConfig};
