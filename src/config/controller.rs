//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment
/// variables, then by command line flags.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Interval between scheduled reconciliation passes (seconds)
    pub sync_interval_secs: u64,
    /// Create missing target namespaces (labelled as managed)
    pub create_namespaces: bool,
    /// Wake the scheduler when `ParameterMapping` resources change
    pub watch_mappings: bool,
    /// Port of the metrics and health server
    pub metrics_port: u16,
    /// Value of the ownership label stamped on managed resources
    pub ownership_label_value: String,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Exposed to templates as `debug`
    pub debug: bool,
    /// Render only, log what would be applied, run a single pass
    pub dry_run: bool,
    /// Run a single pass and exit
    pub once: bool,
    /// Upstream parameter store
    pub parameter_store: ParameterStoreConfig,
}

/// Parameter store connection settings
#[derive(Clone)]
pub struct ParameterStoreConfig {
    pub url: String,
    pub organization: String,
    /// Default environment scope; mappings may override it
    pub environment: Option<String>,
    /// Default tag scope; mappings may override it
    pub tag: Option<String>,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ParameterStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterStoreConfig")
            .field("url", &self.url)
            .field("organization", &self.organization)
            .field("environment", &self.environment)
            .field("tag", &self.tag)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            create_namespaces: true,
            watch_mappings: true,
            metrics_port: DEFAULT_METRICS_PORT,
            ownership_label_value: DEFAULT_OWNERSHIP_LABEL_VALUE.to_string(),
            log_level: "INFO".to_string(),
            log_format: "text".to_string(),
            debug: false,
            dry_run: false,
            once: false,
            parameter_store: ParameterStoreConfig::default(),
        }
    }
}

impl Default for ParameterStoreConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            url: DEFAULT_PARAMETER_STORE_URL.to_string(),
            organization: String::new(),
            environment: None,
            tag: None,
            token: None,
            timeout_secs: DEFAULT_PARAMETER_STORE_TIMEOUT_SECS,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        use crate::constants::*;
        let vars = Vars(&lookup);
        let log_level = vars.string("LOG_LEVEL", "INFO");
        Self {
            sync_interval_secs: vars.parsed("SYNC_INTERVAL_SECS", DEFAULT_SYNC_INTERVAL_SECS),
            create_namespaces: vars.bool("CREATE_NAMESPACES", true),
            watch_mappings: vars.bool("WATCH_MAPPINGS", true),
            metrics_port: vars.parsed("METRICS_PORT", DEFAULT_METRICS_PORT),
            ownership_label_value: vars
                .string("OWNERSHIP_LABEL_VALUE", DEFAULT_OWNERSHIP_LABEL_VALUE),
            debug: log_level.eq_ignore_ascii_case("DEBUG"),
            log_level,
            log_format: vars.string("LOG_FORMAT", "text"),
            dry_run: false,
            once: false,
            parameter_store: ParameterStoreConfig {
                url: vars.string("PARAMETER_STORE_URL", DEFAULT_PARAMETER_STORE_URL),
                organization: vars.string("PARAMETER_STORE_ORGANIZATION", ""),
                environment: vars.optional("PARAMETER_STORE_ENVIRONMENT"),
                tag: vars.optional("PARAMETER_STORE_TAG"),
                token: vars.optional("PARAMETER_STORE_TOKEN"),
                timeout_secs: vars.parsed(
                    "PARAMETER_STORE_TIMEOUT_SECS",
                    DEFAULT_PARAMETER_STORE_TIMEOUT_SECS,
                ),
            },
        }
    }

    /// Get the sync interval duration
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    /// Whether the controller stops after a single pass
    pub fn single_pass(&self) -> bool {
        self.once || self.dry_run
    }
}

struct Vars<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    /// Read variable or return default value
    fn parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        (self.0)(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Read variable as boolean or return default
    fn bool(&self, key: &str, default: bool) -> bool {
        (self.0)(key)
            .map(|v| {
                let v_lower = v.to_lowercase();
                v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
            })
            .unwrap_or(default)
    }

    /// Read variable as string or return default
    fn string(&self, key: &str, default: &str) -> String {
        (self.0)(key).unwrap_or_else(|| default.to_string())
    }

    /// Read variable, treating empty as unset
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.is_empty())
    }
}
