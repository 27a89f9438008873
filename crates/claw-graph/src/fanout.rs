//! Running one request against every cluster.
//!
//! Each cluster gets its own spawned task running the full pipeline
//! against its own backends. Tasks report over a channel to a single
//! collector, so no result structure is shared between workers. A cluster
//! that fails (or panics) is logged and left out of the result.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::GraphEngine;
use crate::error::Result;
use crate::inventory::InventorySource;
use crate::multicluster::MultiClusterEdge;
use crate::options::GraphRequest;
use crate::telemetry::TelemetrySource;
use crate::traffic::TrafficMap;

/// The graphs of every cluster that answered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshGraph {
    /// Graph per cluster name.
    pub clusters: BTreeMap<String, TrafficMap>,
    /// Edges crossing clusters, in completion order.
    pub passthrough: Vec<MultiClusterEdge>,
    /// Clusters whose pipeline failed.
    pub failed: Vec<String>,
}

type ClusterOutcome = Result<(TrafficMap, Vec<MultiClusterEdge>)>;

/// Fans a request out to every registered cluster.
pub struct ClusterFanout<T, I> {
    engines: Vec<GraphEngine<T, I>>,
    addresses: Arc<BTreeMap<String, String>>,
}

impl<T, I> std::fmt::Debug for ClusterFanout<T, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterFanout")
            .field("clusters", &self.addresses)
            .finish_non_exhaustive()
    }
}

impl<T: TelemetrySource, I: InventorySource> Default for ClusterFanout<T, I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TelemetrySource, I: InventorySource> ClusterFanout<T, I> {
    /// Creates a fan-out with no clusters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            engines: Vec::new(),
            addresses: Arc::new(BTreeMap::new()),
        }
    }

    /// Registers a cluster's engine and its gateway address.
    #[must_use]
    pub fn with_cluster(mut self, engine: GraphEngine<T, I>, address: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.addresses).insert(engine.cluster().to_string(), address.into());
        self.engines.push(engine);
        self
    }

    /// Number of registered clusters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.engines.len()
    }

    /// Returns true when no cluster is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Runs `request` on every cluster concurrently.
    ///
    /// Node-detail requests build node graphs; all others build namespace
    /// graphs. Cross-cluster edges that cannot be resolved are dropped
    /// without failing the cluster.
    pub async fn graph(
        &self,
        request: &GraphRequest,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> MeshGraph {
        let (tx, mut rx) = mpsc::channel::<(String, ClusterOutcome)>(self.engines.len().max(1));
        let mut handles = Vec::with_capacity(self.engines.len());

        for engine in &self.engines {
            let engine = engine.clone();
            let request = request.clone();
            let addresses = Arc::clone(&self.addresses);
            let cancel = cancel.child_token();
            let tx = tx.clone();
            let name = engine.cluster().to_string();

            let handle = tokio::spawn(async move {
                let outcome = run_cluster(&engine, &request, now, &addresses, &cancel).await;
                if tx.send((engine.cluster().to_string(), outcome)).await.is_err() {
                    warn!(cluster = %engine.cluster(), "Collector gone, dropping cluster result");
                }
            });
            handles.push((name, handle));
        }
        drop(tx);

        let mut mesh = MeshGraph::default();
        while let Some((cluster, outcome)) = rx.recv().await {
            match outcome {
                Ok((graph, edges)) => {
                    info!(
                        cluster = %cluster,
                        nodes = graph.len(),
                        passthrough = edges.len(),
                        "Cluster graph ready"
                    );
                    mesh.clusters.insert(cluster, graph);
                    mesh.passthrough.extend(edges);
                }
                Err(e) => {
                    warn!(cluster = %cluster, error = %e, "Cluster graph failed, omitting it");
                    mesh.failed.push(cluster);
                }
            }
        }

        for (cluster, handle) in handles {
            if let Err(e) = handle.await {
                warn!(cluster = %cluster, error = %e, "Cluster worker aborted");
                mesh.failed.push(cluster);
            }
        }
        mesh
    }
}

async fn run_cluster<T: TelemetrySource, I: InventorySource>(
    engine: &GraphEngine<T, I>,
    request: &GraphRequest,
    now: DateTime<Utc>,
    addresses: &BTreeMap<String, String>,
    cancel: &CancellationToken,
) -> ClusterOutcome {
    let options = engine.options(request, now, cancel).await?;
    let graph = if options.is_node_graph() {
        engine.node_graph(&options, cancel).await?
    } else {
        engine.namespaces_graph(&options, cancel).await?
    };
    let edges = match engine.multi_cluster_edges(&options, addresses, cancel).await {
        Ok(edges) => edges,
        Err(e) => {
            warn!(cluster = %engine.cluster(), error = %e, "Skipping multi-cluster edges");
            Vec::new()
        }
    };
    Ok((graph, edges))
}
