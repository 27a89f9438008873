//! Graph command implementation.
//!
//! Loads every cluster fixture from the config, fans the request out to
//! all clusters and writes the merged result.

use std::io::Write;
use std::sync::Arc;

use chrono::Utc;
use claw_graph::{
    ClusterFanout, ClusterFixture, GraphEngine, GraphRequest, InMemoryInventory, InMemoryTelemetry,
    MeshGraph,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::CliConfig;
use crate::error::CliError;
use crate::output::OutputFormat;

/// Fixture-backed fan-out.
pub type FixtureFanout = ClusterFanout<InMemoryTelemetry, InMemoryInventory>;

/// Graph command executor.
#[derive(Debug)]
pub struct GraphCommand {
    config: CliConfig,
}

impl GraphCommand {
    /// Create a new graph command.
    #[must_use]
    pub const fn new(config: CliConfig) -> Self {
        Self { config }
    }

    /// The request from the config file, before command-line overrides.
    #[must_use]
    pub const fn base_request(&self) -> &GraphRequest {
        &self.config.request
    }

    /// Loads each cluster's fixture into an engine.
    ///
    /// # Errors
    ///
    /// Returns an error if a fixture cannot be read or parsed.
    pub fn fanout(&self) -> Result<FixtureFanout, CliError> {
        let mut fanout = ClusterFanout::new();
        for cluster in &self.config.clusters {
            let fixture = ClusterFixture::from_file(&cluster.fixture)?;
            let (telemetry, inventory) = fixture.into_backends();
            let engine = GraphEngine::new(
                cluster.name.clone(),
                self.config.engine.clone(),
                Arc::new(telemetry),
                Arc::new(inventory),
            );
            fanout = fanout.with_cluster(engine, cluster.address.clone());
        }
        info!(clusters = fanout.len(), "Loaded cluster fixtures");
        Ok(fanout)
    }

    /// Builds the graph of every cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if fixtures cannot be loaded or no cluster
    /// produced a graph.
    pub async fn build(
        &self,
        request: &GraphRequest,
        cancel: &CancellationToken,
    ) -> Result<MeshGraph, CliError> {
        if request.namespaces.trim().is_empty() && request.node.is_none() {
            return Err(CliError::InvalidArgument(
                "no namespaces requested; pass --namespaces or set request.namespaces".to_string(),
            ));
        }
        let fanout = self.fanout()?;
        let mesh = fanout.graph(request, Utc::now(), cancel).await;
        if mesh.clusters.is_empty() && !mesh.failed.is_empty() {
            return Err(CliError::AllClustersFailed(mesh.failed));
        }
        Ok(mesh)
    }

    /// Execute the command.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph cannot be built or output fails.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        request: &GraphRequest,
        cancel: &CancellationToken,
    ) -> Result<(), CliError> {
        let mesh = self.build(request, cancel).await?;
        format.write(writer, &mesh)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Format;
    use crate::config::ClusterConfig;
    use std::path::PathBuf;

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures").join(name)
    }

    fn config(clusters: &[(&str, &str, &str)]) -> CliConfig {
        CliConfig {
            request: GraphRequest {
                namespaces: "bookinfo".to_string(),
                graph_type: Some("workload".to_string()),
                ..GraphRequest::default()
            },
            clusters: clusters
                .iter()
                .map(|(name, address, file)| ClusterConfig {
                    name: (*name).to_string(),
                    address: (*address).to_string(),
                    fixture: fixture(file),
                })
                .collect(),
            ..CliConfig::default()
        }
    }

    #[tokio::test]
    async fn build_graphs_every_cluster() {
        let command = GraphCommand::new(config(&[
            ("east", "10.1.0.1", "east.json"),
            ("west", "10.2.0.1", "west.json"),
        ]));

        let mesh = command
            .build(command.base_request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(mesh.clusters.len(), 2);
        assert!(mesh.failed.is_empty());
        let east = &mesh.clusters["east"];
        assert!(east.contains("wl_bookinfo_productpage-v1"));
        assert!(east.contains("wl_bookinfo_reviews-v1"));
        assert_eq!(mesh.passthrough.len(), 1);
        assert_eq!(mesh.passthrough[0].to_cluster, "west");
    }

    #[tokio::test]
    async fn missing_fixture_fails_to_load() {
        let command = GraphCommand::new(config(&[("east", "10.1.0.1", "missing.json")]));
        let result = command
            .build(command.base_request(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(CliError::Graph(_))));
    }

    #[tokio::test]
    async fn unknown_namespace_fails_every_cluster() {
        let command = GraphCommand::new(config(&[("east", "10.1.0.1", "east.json")]));
        let request = GraphRequest {
            namespaces: "payments".to_string(),
            ..GraphRequest::default()
        };
        let result = command.build(&request, &CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(CliError::AllClustersFailed(names)) if names == vec!["east".to_string()]
        ));
    }

    #[tokio::test]
    async fn empty_request_is_rejected() {
        let command = GraphCommand::new(config(&[("east", "10.1.0.1", "east.json")]));
        let result = command
            .build(&GraphRequest::default(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(CliError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn execute_writes_summary() {
        let command = GraphCommand::new(config(&[("east", "10.1.0.1", "east.json")]));
        let mut out = Vec::new();
        command
            .execute(
                &mut out,
                &OutputFormat::new(Format::Summary),
                command.base_request(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Cluster east"));
    }
}
