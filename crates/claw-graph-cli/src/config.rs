//! CLI configuration loaded from TOML.
//!
//! ```toml
//! [engine]
//! query_timeout_secs = 10
//!
//! [request]
//! namespaces = "bookinfo"
//! graph_type = "versionedApp"
//!
//! [[clusters]]
//! name = "east"
//! address = "10.1.0.1"
//! fixture = "fixtures/east.json"
//! ```
//!
//! Relative fixture paths are resolved against the config file's
//! directory.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use claw_graph::{EngineConfig, GraphRequest};
use serde::{Deserialize, Serialize};

use crate::error::CliError;

/// One cluster and the fixture backing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Cluster name.
    pub name: String,
    /// Gateway address other clusters' service entries point at.
    pub address: String,
    /// JSON fixture with the cluster's inventory and telemetry.
    pub fixture: PathBuf,
}

/// Full CLI configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Engine settings shared by every cluster.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Default request, overridden by command-line flags.
    #[serde(default)]
    pub request: GraphRequest,
    /// Clusters to graph.
    #[serde(default)]
    pub clusters: Vec<ClusterConfig>,
}

impl CliConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails
    /// validation.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CliError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("failed to read config file '{}': {e}", path.display()))
        })?;
        let mut config = Self::from_toml(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_fixtures(base);
        }
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, CliError> {
        let config: Self =
            toml::from_str(content).map_err(|e| CliError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid field.
    pub fn validate(&self) -> Result<(), CliError> {
        self.engine
            .validate()
            .map_err(|e| CliError::Config(e.to_string()))?;

        if self.clusters.is_empty() {
            return Err(CliError::Config("at least one cluster is required".to_string()));
        }

        let mut names = HashSet::new();
        for cluster in &self.clusters {
            if cluster.name.trim().is_empty() {
                return Err(CliError::Config("cluster name cannot be empty".to_string()));
            }
            if cluster.address.trim().is_empty() {
                return Err(CliError::Config(format!(
                    "cluster '{}' has no address",
                    cluster.name
                )));
            }
            if !names.insert(cluster.name.as_str()) {
                return Err(CliError::Config(format!(
                    "cluster '{}' is declared twice",
                    cluster.name
                )));
            }
        }
        Ok(())
    }

    /// Makes relative fixture paths relative to `base`.
    pub fn resolve_fixtures(&mut self, base: &Path) {
        for cluster in &mut self.clusters {
            if cluster.fixture.is_relative() {
                cluster.fixture = base.join(&cluster.fixture);
            }
        }
    }

    /// Gateway address per cluster name.
    #[must_use]
    pub fn addresses(&self) -> BTreeMap<String, String> {
        self.clusters
            .iter()
            .map(|c| (c.name.clone(), c.address.clone()))
            .collect()
    }
}
