//! The graph engine: one cluster's backends and configuration.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::appender::{Appender, AppenderContext, GlobalCache, NamespaceCache};
use crate::builder::TrafficMapBuilder;
use crate::config::{AppenderFailurePolicy, EngineConfig};
use crate::context::QueryContext;
use crate::error::{GraphError, Result};
use crate::inventory::InventorySource;
use crate::multicluster::{MultiClusterEdge, MultiClusterResolver};
use crate::options::{GraphOptions, GraphRequest};
use crate::postprocess;
use crate::telemetry::TelemetrySource;
use crate::traffic::TrafficMap;
use crate::types::NamespaceInfo;

/// Builds graphs for one cluster.
///
/// The engine owns nothing mutable: every request gets fresh appender
/// caches, so one engine can serve concurrent requests.
pub struct GraphEngine<T, I> {
    cluster: String,
    config: EngineConfig,
    telemetry: Arc<T>,
    inventory: Arc<I>,
}

impl<T, I> Clone for GraphEngine<T, I> {
    fn clone(&self) -> Self {
        Self {
            cluster: self.cluster.clone(),
            config: self.config.clone(),
            telemetry: Arc::clone(&self.telemetry),
            inventory: Arc::clone(&self.inventory),
        }
    }
}

impl<T, I> std::fmt::Debug for GraphEngine<T, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphEngine")
            .field("cluster", &self.cluster)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T: TelemetrySource, I: InventorySource> GraphEngine<T, I> {
    /// Creates an engine for the cluster named `cluster`.
    #[must_use]
    pub fn new(
        cluster: impl Into<String>,
        config: EngineConfig,
        telemetry: Arc<T>,
        inventory: Arc<I>,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            config,
            telemetry,
            inventory,
        }
    }

    /// Cluster name.
    #[must_use]
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validates a raw request against the namespaces visible in this
    /// cluster.
    ///
    /// # Errors
    ///
    /// Returns the validation error, or the inventory failure listing
    /// namespaces.
    pub async fn options(
        &self,
        request: &GraphRequest,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<GraphOptions> {
        let query = QueryContext::new(cancel.clone(), self.config.query_timeout());
        let accessible = query
            .bounded("namespace list", self.inventory.namespaces())
            .await?;
        GraphOptions::parse(request, &accessible, &self.config, now)
    }

    /// Builds the graph of the requested namespaces.
    ///
    /// Namespaces are built one at a time in name order, each followed by
    /// the appender pipeline, and merged. Post-processing runs once over
    /// the merged map.
    ///
    /// # Errors
    ///
    /// Returns the first telemetry failure, or [`GraphError::Cancelled`]
    /// when `cancel` fires.
    pub async fn namespaces_graph(
        &self,
        options: &GraphOptions,
        cancel: &CancellationToken,
    ) -> Result<TrafficMap> {
        let span = info_span!(
            "namespaces_graph",
            request = %Uuid::new_v4(),
            cluster = %self.cluster,
            graph_type = %options.graph_type,
        );
        async {
            let query = QueryContext::new(cancel.clone(), self.config.query_timeout());
            let builder = TrafficMapBuilder::new(&*self.telemetry, options, &self.config, &query);
            let appenders = Appender::pipeline(options);
            let mut global = GlobalCache::new();
            let mut merged = TrafficMap::new();

            for info in options.namespaces.values() {
                let mut map = builder.namespace_map(info).await?;
                if self
                    .append(&appenders, &mut map, info, options, &query, &mut global)
                    .await?
                {
                    merged.merge_namespace(&info.name, map);
                }
            }

            let graph = postprocess::finish(merged, options);
            info!(nodes = graph.len(), edges = graph.edge_count(), "Built namespaces graph");
            Ok::<_, GraphError>(graph)
        }
        .instrument(span)
        .await
    }

    /// Builds the graph around the node named in `options`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::BadRequest`] when `options` names no node,
    /// otherwise as [`GraphEngine::namespaces_graph`].
    pub async fn node_graph(
        &self,
        options: &GraphOptions,
        cancel: &CancellationToken,
    ) -> Result<TrafficMap> {
        let Some(node) = options.node.as_ref() else {
            return Err(GraphError::bad_request("Node graph requires node options"));
        };
        let span = info_span!(
            "node_graph",
            request = %Uuid::new_v4(),
            cluster = %self.cluster,
            namespace = %node.namespace,
        );
        async {
            let info = options.namespaces.get(&node.namespace).ok_or_else(|| {
                GraphError::bad_request(format!(
                    "Node namespace [{}] was not requested",
                    node.namespace
                ))
            })?;
            let query = QueryContext::new(cancel.clone(), self.config.query_timeout());
            let builder = TrafficMapBuilder::new(&*self.telemetry, options, &self.config, &query);
            let appenders = Appender::pipeline(options);
            let mut global = GlobalCache::new();

            let mut map = builder.node_map(node).await?;
            if !self
                .append(&appenders, &mut map, info, options, &query, &mut global)
                .await?
            {
                map = TrafficMap::new();
            }

            postprocess::mark_outsiders(&mut map, options);
            postprocess::mark_traffic_generators(&mut map);
            info!(nodes = map.len(), edges = map.edge_count(), "Built node graph");
            Ok::<_, GraphError>(map)
        }
        .instrument(span)
        .await
    }

    /// Resolves the cross-cluster edges leaving this cluster. `clusters`
    /// maps every cluster name to its gateway address.
    ///
    /// # Errors
    ///
    /// Returns the first telemetry or inventory failure.
    pub async fn multi_cluster_edges(
        &self,
        options: &GraphOptions,
        clusters: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<Vec<MultiClusterEdge>> {
        let query = QueryContext::new(cancel.clone(), self.config.query_timeout());
        MultiClusterResolver::new(&self.config, clusters, &self.cluster)
            .resolve(&*self.telemetry, &*self.inventory, options, &query)
            .await
    }

    /// Runs the pipeline over one namespace map. Returns whether the map
    /// should be kept.
    async fn append(
        &self,
        appenders: &[Appender],
        map: &mut TrafficMap,
        info: &NamespaceInfo,
        options: &GraphOptions,
        query: &QueryContext,
        global: &mut GlobalCache,
    ) -> Result<bool> {
        let mut namespace = NamespaceCache::new(info.clone());
        let mut ctx = AppenderContext {
            options,
            config: &self.config,
            telemetry: &*self.telemetry,
            inventory: &*self.inventory,
            query,
            global,
            namespace: &mut namespace,
        };

        for appender in appenders {
            match appender.append_graph(map, &mut ctx).await {
                Ok(()) => {
                    debug!(
                        namespace = %info.name,
                        appender = %appender.name(),
                        nodes = map.len(),
                        "Appender completed"
                    );
                }
                Err(GraphError::Cancelled { operation }) => {
                    return Err(GraphError::Cancelled { operation });
                }
                Err(e) => {
                    warn!(
                        namespace = %info.name,
                        appender = %appender.name(),
                        error = %e,
                        policy = ?self.config.on_appender_error,
                        "Appender failed, skipping the rest of the pipeline"
                    );
                    return Ok(self.config.on_appender_error == AppenderFailurePolicy::Keep);
                }
            }
        }
        Ok(true)
    }
}
