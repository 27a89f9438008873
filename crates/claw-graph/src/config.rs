//! Engine configuration.
//!
//! Loaded from TOML; every field has a default so an empty document is a
//! valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

/// Names of the workload labels that carry app and version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelNames {
    /// App label name.
    #[serde(default = "default_app_label")]
    pub app: String,
    /// Version label name.
    #[serde(default = "default_version_label")]
    pub version: String,
}

fn default_app_label() -> String {
    "app".to_string()
}

fn default_version_label() -> String {
    "version".to_string()
}

impl Default for LabelNames {
    fn default() -> Self {
        Self {
            app: default_app_label(),
            version: default_version_label(),
        }
    }
}

/// What happens to a namespace's map when an appender fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AppenderFailurePolicy {
    /// Keep the map as left by the last completed appender.
    #[default]
    Keep,
    /// Drop the namespace from the result.
    Discard,
}

/// Graph engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Workload label names.
    #[serde(default)]
    pub labels: LabelNames,
    /// Namespaces hosting mesh control-plane components.
    #[serde(default = "default_mesh_namespaces")]
    pub mesh_namespaces: Vec<String>,
    /// Bound on every single telemetry or inventory call, in seconds.
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    /// Appender failure policy.
    #[serde(default)]
    pub on_appender_error: AppenderFailurePolicy,
    /// Response-time quantile when the request names none.
    #[serde(default = "default_quantile")]
    pub default_quantile: f64,
    /// Host suffix of multi-cluster service entries.
    #[serde(default = "default_federation_suffix")]
    pub federation_suffix: String,
}

fn default_mesh_namespaces() -> Vec<String> {
    vec!["istio-system".to_string()]
}

const fn default_query_timeout_secs() -> u64 {
    30
}

const fn default_quantile() -> f64 {
    0.95
}

fn default_federation_suffix() -> String {
    "global".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            labels: LabelNames::default(),
            mesh_namespaces: default_mesh_namespaces(),
            query_timeout_secs: default_query_timeout_secs(),
            on_appender_error: AppenderFailurePolicy::default(),
            default_quantile: default_quantile(),
            federation_suffix: default_federation_suffix(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            GraphError::Config(format!(
                "failed to read config file '{}': {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or fails validation.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| GraphError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.labels.app.is_empty() || self.labels.version.is_empty() {
            return Err(GraphError::Config(
                "labels.app and labels.version cannot be empty".to_string(),
            ));
        }

        if self.query_timeout_secs == 0 {
            return Err(GraphError::Config(
                "query_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if !(self.default_quantile > 0.0 && self.default_quantile < 1.0) {
            return Err(GraphError::Config(format!(
                "default_quantile must lie in (0, 1), got {}",
                self.default_quantile
            )));
        }

        if self.federation_suffix.is_empty() || self.federation_suffix.contains('.') {
            return Err(GraphError::Config(
                "federation_suffix must be a single DNS label".to_string(),
            ));
        }

        Ok(())
    }

    /// Bound applied to each external call.
    #[must_use]
    pub const fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    /// Returns true when `namespace` hosts mesh infrastructure.
    #[must_use]
    pub fn is_mesh_namespace(&self, namespace: &str) -> bool {
        self.mesh_namespaces.iter().any(|ns| ns == namespace)
    }

    /// Returns true when a host is a three-label federation host such as
    /// `reviews.bookinfo.global`.
    #[must_use]
    pub fn is_federation_host(&self, host: &str) -> bool {
        let parts: Vec<&str> = host.split('.').collect();
        parts.len() == 3 && parts[2] == self.federation_suffix
    }
}
