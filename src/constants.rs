//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// API group of the `ParameterMapping` custom resource
pub const MAPPING_GROUP: &str = "parameter-sync.octopilot.io";

/// API version of the `ParameterMapping` custom resource
pub const MAPPING_VERSION: &str = "v1";

/// Default HTTP server port for metrics and health checks
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default interval between reconciliation passes (seconds)
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;

/// Label stamped on every resource (and namespace) this controller creates
pub const OWNERSHIP_LABEL_KEY: &str = "app.kubernetes.io/managed-by";

/// Default value of the ownership label
pub const DEFAULT_OWNERSHIP_LABEL_VALUE: &str = "parameter-sync-controller";

/// Default parameter store endpoint
pub const DEFAULT_PARAMETER_STORE_URL: &str = "http://parameter-store.parameter-store.svc:8080";

/// Default parameter store request timeout (seconds)
pub const DEFAULT_PARAMETER_STORE_TIMEOUT_SECS: u64 = 30;

/// Name given to a mapping record that carries neither `name` nor `metadata.name`
pub const DEFAULT_MAPPING_NAME: &str = "default";
