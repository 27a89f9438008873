//! `deadNode`: drop nodes with no traffic and no backing workload.

use std::collections::HashSet;

use tracing::debug;

use super::{AppenderContext, find_workload};
use crate::error::Result;
use crate::identity::is_ok;
use crate::inventory::{InventorySource, Workload};
use crate::telemetry::TelemetrySource;
use crate::traffic::{Node, TrafficMap};
use crate::types::NodeKind;

/// Removes traffic-free nodes that nothing can explain.
///
/// A traffic-free service node goes unless it still has outgoing edges, is
/// a service-entry aggregate or is an egress sentinel. Any other traffic-free
/// node goes when its workload is missing from inventory (always the case
/// for `unknown_source`); app nodes without a workload name are kept since
/// they never have one. A workload that exists but runs zero pods is
/// flagged dead while the graph still references it, and removed otherwise.
///
/// Removal runs to a fixpoint with edge pruning, so applying the appender a
/// second time changes nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeadNodeAppender;

/// What happened to the map during one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeadNodeOutcome {
    /// Nodes deleted.
    pub removed: usize,
    /// Nodes flagged dead.
    pub flagged: usize,
}

enum Verdict {
    Keep,
    Remove,
    NoPods,
}

impl DeadNodeAppender {
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
        let outcome = self.apply(map, workloads);
        debug!(
            namespace = %namespace,
            removed = outcome.removed,
            flagged = outcome.flagged,
            "Applied dead node removal"
        );
        Ok(())
    }

    /// Removes and flags dead nodes in `map`.
    pub fn apply(&self, map: &mut TrafficMap, workloads: &[Workload]) -> DeadNodeOutcome {
        let mut outcome = DeadNodeOutcome::default();

        loop {
            let doomed: Vec<String> = map
                .nodes()
                .filter(|n| matches!(verdict(n, workloads), Verdict::Remove))
                .map(|n| n.id.clone())
                .collect();
            if doomed.is_empty() {
                break;
            }
            for id in &doomed {
                map.remove(id);
            }
            outcome.removed += doomed.len();
            map.prune_dangling_edges();
        }

        let referenced: HashSet<String> = map.edge_destinations();
        let idle: Vec<(String, bool)> = map
            .nodes()
            .filter(|n| matches!(verdict(n, workloads), Verdict::NoPods))
            .map(|n| (n.id.clone(), !n.edges.is_empty() || referenced.contains(&n.id)))
            .collect();
        for (id, in_use) in idle {
            if in_use {
                if let Some(node) = map.get_mut(&id) {
                    node.metadata.is_dead = true;
                    outcome.flagged += 1;
                }
            } else if map.remove(&id).is_some() {
                outcome.removed += 1;
            }
        }

        outcome
    }
}

fn verdict(node: &Node, workloads: &[Workload]) -> Verdict {
    if node.metadata.traffic.has_traffic() {
        return Verdict::Keep;
    }

    if node.kind == NodeKind::Service {
        let protected = !node.edges.is_empty()
            || node.metadata.is_service_entry.is_some()
            || node.metadata.is_egress_cluster;
        return if protected { Verdict::Keep } else { Verdict::Remove };
    }

    if node.kind != NodeKind::Unknown && !is_ok(node.workload_name()) {
        return Verdict::Keep;
    }

    match find_workload(workloads, node.workload_name()) {
        None => Verdict::Remove,
        Some(workload) if workload.pod_count == 0 => Verdict::NoPods,
        Some(_) => Verdict::Keep,
    }
}
