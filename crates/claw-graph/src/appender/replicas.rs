//! `replicasNode`: annotate nodes with workload inventory.

use std::collections::HashSet;

use tracing::debug;

use super::AppenderContext;
use crate::config::LabelNames;
use crate::error::Result;
use crate::identity::{NodeKey, is_ok};
use crate::inventory::{InventorySource, Workload};
use crate::telemetry::TelemetrySource;
use crate::traffic::{Node, TrafficMap};
use crate::types::GraphType;

/// Attaches pod count, sidecar flag, health flag and labels to the nodes
/// backed by each workload. Never changes topology.
///
/// A workload annotates the node carrying its own ID under the request's
/// graph type, and the service node named after its app label. Nodes
/// backed by several workloads (app nodes, services) get the summed pod
/// count and a sidecar flag that holds only if every workload has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicasNodeAppender {
    /// Graph type of the request.
    pub graph_type: GraphType,
}

impl ReplicasNodeAppender {
    /// Runs the appender.
    pub async fn append_graph<T, I>(
        &self,
        map: &mut TrafficMap,
        ctx: &mut AppenderContext<'_, T, I>,
    ) -> Result<()>
    where
        T: TelemetrySource,
        I: InventorySource,
    {
        if map.is_empty() {
            return Ok(());
        }
        let namespace = ctx.namespace.name().to_string();
        let workloads = ctx.namespace.workloads(ctx.inventory, ctx.query).await?;
        let annotated = self.apply(map, &namespace, workloads, &ctx.config.labels);
        debug!(namespace = %namespace, annotated, "Annotated replicas");
        Ok(())
    }

    /// Annotates `map` from `workloads`. Returns the number of nodes touched.
    pub fn apply(
        &self,
        map: &mut TrafficMap,
        namespace: &str,
        workloads: &[Workload],
        names: &LabelNames,
    ) -> usize {
        let mut touched: HashSet<String> = HashSet::new();
        for workload in workloads {
            let app = workload.app(names).unwrap_or_default();
            let version = workload.version(names).unwrap_or_default();

            let mut targets = Vec::with_capacity(2);
            let key = NodeKey::workload(namespace, &workload.name, app, version);
            if let Some((id, _)) = key.try_id(self.graph_type) {
                targets.push(id);
            }
            if is_ok(app) {
                let (id, _) = NodeKey::service(namespace, app).id(GraphType::Service);
                targets.push(id);
            }

            for id in targets {
                if let Some(node) = map.get_mut(&id) {
                    annotate(node, workload, !touched.insert(id));
                }
            }
        }
        touched.len()
    }
}

fn annotate(node: &mut Node, workload: &Workload, accumulate: bool) {
    let metadata = &mut node.metadata;
    metadata.is_healthy = true;
    if accumulate {
        metadata.replicas = Some(metadata.replicas.unwrap_or_default() + workload.pod_count);
        metadata.has_sidecar = Some(metadata.has_sidecar.unwrap_or(true) && workload.has_sidecar);
    } else {
        metadata.replicas = Some(workload.pod_count);
        metadata.has_sidecar = Some(workload.has_sidecar);
        metadata.labels.clone_from(&workload.labels);
    }
}
