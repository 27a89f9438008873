//! `serviceEntry`: fold service-entry hosts into aggregate nodes.
//!
//! A single service entry may declare many hosts, and telemetry produces
//! one service node per host actually called. Those per-host nodes are
//! replaced by one aggregate node per (namespace, entry):
//!
//! - node traffic and destination services are merged into the aggregate;
//! - edges leading to any per-host node are redirected to the aggregate and
//!   coalesced per source and protocol;
//! - edges leaving a per-host node (typically to an egress gateway) are
//!   merged into the aggregate's edges per (dest, protocol);
//! - the per-host nodes are deleted.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use super::{AppenderContext, DeclaredServiceEntry, ServiceEntryHosts};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::identity::NodeKey;
use crate::inventory::InventorySource;
use crate::telemetry::TelemetrySource;
use crate::traffic::{Edge, Node, TrafficMap};
use crate::types::{GraphType, NodeKind};

/// Aggregates service nodes that represent service-entry hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntryAppender {
    /// Graph type of the request.
    pub graph_type: GraphType,
}

impl ServiceEntryAppender {
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
        let hosts = ctx
            .global
            .service_entry_hosts(ctx.options, ctx.inventory, ctx.query)
            .await?;
        let aggregated = self.apply(map, ctx.namespace.name(), hosts, ctx.config);
        debug!(namespace = %ctx.namespace.name(), aggregated, "Aggregated service entries");
        Ok(())
    }

    /// Replaces per-host service nodes with service-entry aggregates.
    /// Returns the number of aggregate nodes written.
    pub fn apply(
        &self,
        map: &mut TrafficMap,
        namespace: &str,
        hosts: &ServiceEntryHosts,
        config: &EngineConfig,
    ) -> usize {
        let mut groups: BTreeMap<(String, String), (DeclaredServiceEntry, Vec<String>)> =
            BTreeMap::new();
        for node in map.nodes() {
            if node.kind != NodeKind::Service
                || node.metadata.is_egress_cluster
                || node.edges.len() > 1
            {
                continue;
            }
            if let Some(entry) = hosts.lookup(node.service_name(), config) {
                groups
                    .entry((entry.namespace.clone(), entry.name.clone()))
                    .or_insert_with(|| (entry.clone(), Vec::new()))
                    .1
                    .push(node.id.clone());
            }
        }

        let count = groups.len();
        for (entry, doomed_ids) in groups.into_values() {
            self.aggregate(map, namespace, &entry, &doomed_ids);
        }
        count
    }

    fn aggregate(
        &self,
        map: &mut TrafficMap,
        namespace: &str,
        entry: &DeclaredServiceEntry,
        doomed_ids: &[String],
    ) {
        let doomed: Vec<Node> = doomed_ids.iter().filter_map(|id| map.remove(id)).collect();

        let key = NodeKey::service(namespace, &entry.name);
        let (aggregate_id, kind) = key.id(self.graph_type);
        let mut aggregate = map
            .remove(&aggregate_id)
            .unwrap_or_else(|| Node::resolved(aggregate_id.clone(), kind, &key, self.graph_type));
        aggregate.metadata.is_service_entry = Some(entry.location);

        for node in &doomed {
            aggregate.metadata.traffic.merge(&node.metadata.traffic);
            aggregate
                .metadata
                .dest_services
                .extend(node.metadata.dest_services.clone());
            for edge in &node.edges {
                aggregate.absorb_edge(edge);
            }
        }
        map.insert(aggregate);

        let doomed_set: HashSet<&str> = doomed_ids.iter().map(String::as_str).collect();
        for node in map.nodes_mut() {
            let mut redirected = false;
            for edge in &mut node.edges {
                if doomed_set.contains(edge.dest.as_str()) {
                    edge.dest.clone_from(&aggregate_id);
                    redirected = true;
                }
            }
            if redirected {
                coalesce_edges(node, &aggregate_id);
            }
        }
    }
}

/// Collapses a node's edges to `dest` into one edge per protocol.
fn coalesce_edges(node: &mut Node, dest: &str) {
    let (to_dest, mut kept): (Vec<Edge>, Vec<Edge>) =
        std::mem::take(&mut node.edges).into_iter().partition(|e| e.dest == dest);
    let mut merged: Vec<Edge> = Vec::with_capacity(to_dest.len());
    for edge in to_dest {
        match merged.iter_mut().find(|m| m.protocol() == edge.protocol()) {
            Some(existing) => existing.metadata.traffic.merge(&edge.metadata.traffic),
            None => merged.push(edge),
        }
    }
    kept.extend(merged);
    node.edges = kept;
}
