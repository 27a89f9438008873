//! `sidecarsCheck`: flag workloads missing the mesh sidecar.

use tracing::debug;

use super::{AppenderContext, app_workloads, find_workload};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::inventory::{InventorySource, Workload};
use crate::telemetry::TelemetrySource;
use crate::traffic::TrafficMap;
use crate::types::{NamespaceInfo, NodeKind};

/// Flags nodes whose backing workloads lack the sidecar on at least one
/// pod. Only nodes of the namespace being appended are checked. Mesh
/// infrastructure namespaces and dead nodes are skipped, and a node with
/// no backing workloads is never flagged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SidecarsCheckAppender;

impl SidecarsCheckAppender {
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
        let info = ctx.namespace.info().clone();
        let workloads = ctx.namespace.workloads(ctx.inventory, ctx.query).await?;
        let flagged = self.apply(map, &info, workloads, ctx.config);
        debug!(namespace = %info.name, flagged, "Checked sidecars");
        Ok(())
    }

    /// Flags nodes. Returns the number of nodes flagged.
    pub fn apply(
        &self,
        map: &mut TrafficMap,
        info: &NamespaceInfo,
        workloads: &[Workload],
        config: &EngineConfig,
    ) -> usize {
        if info.is_mesh_infra || config.is_mesh_namespace(&info.name) {
            return 0;
        }

        let mut flagged = 0;
        for node in map.nodes_mut() {
            if node.namespace != info.name || node.metadata.is_dead {
                continue;
            }
            let missing = match node.kind {
                NodeKind::Workload => {
                    find_workload(workloads, node.workload_name()).is_some_and(|w| !w.has_sidecar)
                }
                NodeKind::App => app_workloads(
                    workloads,
                    node.app_name(),
                    node.version_name(),
                    &config.labels,
                )
                .iter()
                .any(|w| !w.has_sidecar),
                NodeKind::Service | NodeKind::Unknown => false,
            };
            if missing {
                node.metadata.has_missing_sidecar = true;
                flagged += 1;
            }
        }
        flagged
    }
}
