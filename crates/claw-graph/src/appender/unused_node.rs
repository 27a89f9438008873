//! `unusedNode`: add placeholders for traffic-free inventory.

use std::collections::HashSet;

use tracing::debug;

use super::AppenderContext;
use crate::config::LabelNames;
use crate::error::Result;
use crate::identity::{NodeKey, UNKNOWN, UNKNOWN_SOURCE_ID};
use crate::inventory::{InventorySource, ServiceDefinition, Workload};
use crate::metadata::NodeMetadata;
use crate::telemetry::TelemetrySource;
use crate::traffic::{Node, TrafficMap, is_unknown_id};
use crate::types::GraphType;

/// Adds an `is_unused` node for every inventory service and workload the
/// telemetry never mentioned, so idle parts of a namespace still show up.
///
/// Services are only added to service graphs or when service nodes are
/// injected; workloads are added to every graph type but service.
/// Afterwards, versioned app graphs keep only nodes that either carry
/// `unknown` in their ID or match an inventory ID, and every other graph
/// type drops `unknown_source`. Node-detail graphs are left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnusedNodeAppender {
    /// Graph type of the request.
    pub graph_type: GraphType,
    /// Whether service nodes were injected.
    pub inject_service_nodes: bool,
    /// Whether the request is a node-detail graph.
    pub is_node_graph: bool,
}

/// What happened to the map during one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnusedNodeOutcome {
    /// Placeholders added.
    pub added: usize,
    /// Nodes deleted afterwards.
    pub removed: usize,
}

impl UnusedNodeAppender {
    const fn wants_services(&self) -> bool {
        matches!(self.graph_type, GraphType::Service) || self.inject_service_nodes
    }

    const fn wants_workloads(&self) -> bool {
        !matches!(self.graph_type, GraphType::Service)
    }

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
        if self.is_node_graph {
            return Ok(());
        }

        let services = if self.wants_services() {
            ctx.namespace.services(ctx.inventory, ctx.query).await?.to_vec()
        } else {
            Vec::new()
        };
        let workloads = if self.wants_workloads() {
            ctx.namespace.workloads(ctx.inventory, ctx.query).await?.to_vec()
        } else {
            Vec::new()
        };

        let namespace = ctx.namespace.name();
        let outcome = self.apply(map, namespace, &services, &workloads, &ctx.config.labels);
        debug!(
            namespace = %namespace,
            added = outcome.added,
            removed = outcome.removed,
            "Applied unused nodes"
        );
        Ok(())
    }

    /// Adds placeholders and removes strays.
    pub fn apply(
        &self,
        map: &mut TrafficMap,
        namespace: &str,
        services: &[ServiceDefinition],
        workloads: &[Workload],
        names: &LabelNames,
    ) -> UnusedNodeOutcome {
        let mut outcome = UnusedNodeOutcome::default();
        if self.is_node_graph {
            return outcome;
        }

        let services = if self.wants_services() { services } else { &[] };
        let workloads = if self.wants_workloads() { workloads } else { &[] };

        for service in services {
            let key = NodeKey::service(namespace, &service.name);
            if self.add_placeholder(map, &key) {
                outcome.added += 1;
            }
        }
        for workload in workloads {
            let app = workload.app(names).unwrap_or(UNKNOWN);
            let version = workload.version(names).unwrap_or(UNKNOWN);
            let key = NodeKey::workload(namespace, &workload.name, app, version);
            if self.add_placeholder(map, &key) {
                outcome.added += 1;
            }
        }

        if self.graph_type == GraphType::VersionedApp {
            let mut inventory_ids: HashSet<String> = HashSet::new();
            for service in services {
                let key = NodeKey::service(namespace, &service.name);
                if let Some((id, _)) = key.try_id(GraphType::Service) {
                    inventory_ids.insert(id);
                }
            }
            for workload in workloads {
                let app = workload.app(names).unwrap_or(UNKNOWN);
                let version = workload.version(names).unwrap_or(UNKNOWN);
                let key = NodeKey::workload(namespace, &workload.name, app, version);
                if let Some((id, _)) = key.try_id(GraphType::VersionedApp) {
                    inventory_ids.insert(id);
                }
            }
            outcome.removed += map.retain(|n| {
                n.id != UNKNOWN_SOURCE_ID && (is_unknown_id(&n.id) || inventory_ids.contains(&n.id))
            });
        } else if map.remove(UNKNOWN_SOURCE_ID).is_some() {
            outcome.removed += 1;
        }
        map.prune_dangling_edges();

        outcome
    }

    fn add_placeholder(&self, map: &mut TrafficMap, key: &NodeKey<'_>) -> bool {
        let Some((id, kind)) = key.try_id(self.graph_type) else {
            return false;
        };
        let mut node = Node::resolved(id, kind, key, self.graph_type);
        let is_egress_cluster = node.metadata.is_egress_cluster;
        node.metadata = NodeMetadata {
            is_egress_cluster,
            ..NodeMetadata::unused()
        };
        !map.insert_if_absent(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appender::dead_node::DeadNodeAppender;
    use crate::appender::test_support::{connect, workload_node};
    use crate::types::Protocol;

    fn inventory() -> (Vec<ServiceDefinition>, Vec<Workload>) {
        (
            vec![ServiceDefinition::new("reviews"), ServiceDefinition::new("ratings")],
            vec![
                Workload::new("reviews-v1", 1, true)
                    .with_label("app", "reviews")
                    .with_label("version", "v1"),
                Workload::new("ratings-v1", 0, true)
                    .with_label("app", "ratings")
                    .with_label("version", "v1"),
            ],
        )
    }

    fn appender(graph_type: GraphType, inject: bool) -> UnusedNodeAppender {
        UnusedNodeAppender {
            graph_type,
            inject_service_nodes: inject,
            is_node_graph: false,
        }
    }

    #[test]
    fn test_workload_graph_adds_only_workloads() {
        let (services, workloads) = inventory();
        let mut map = TrafficMap::new();
        let outcome = appender(GraphType::Workload, false).apply(
            &mut map,
            "bookinfo",
            &services,
            &workloads,
            &LabelNames::default(),
        );
        assert_eq!(outcome.added, 2);
        let node = map.get("wl_bookinfo_ratings-v1");
        assert!(node.is_some_and(|n| n.metadata.is_unused));
        assert_eq!(
            node.and_then(|n| n.metadata.traffic.get(Protocol::Http)).map(|t| t.outbound),
            Some(0.0)
        );
        assert!(!map.contains("svc_bookinfo_reviews"));
    }

    #[test]
    fn test_service_graph_adds_only_services() {
        let (services, workloads) = inventory();
        let mut map = TrafficMap::new();
        appender(GraphType::Service, true).apply(
            &mut map,
            "bookinfo",
            &services,
            &workloads,
            &LabelNames::default(),
        );
        assert_eq!(
            map.ids(),
            vec!["svc_bookinfo_ratings".to_string(), "svc_bookinfo_reviews".to_string()]
        );
    }

    #[test]
    fn test_existing_nodes_not_replaced() {
        let (services, workloads) = inventory();
        let mut map = TrafficMap::new();
        let mut busy = workload_node("bookinfo", "reviews-v1", "reviews", "v1");
        busy.metadata.traffic.record_inbound(Protocol::Http, "200", 3.0);
        map.insert(busy);
        appender(GraphType::Workload, false).apply(
            &mut map,
            "bookinfo",
            &services,
            &workloads,
            &LabelNames::default(),
        );
        assert!(map.get("wl_bookinfo_reviews-v1").is_some_and(|n| !n.metadata.is_unused));
    }

    #[test]
    fn test_unknown_source_dropped_outside_versioned_app() {
        let mut map = TrafficMap::new();
        let mut src = Node::new(
            &NodeKey::workload(UNKNOWN, UNKNOWN, UNKNOWN, UNKNOWN),
            GraphType::Workload,
        );
        let mut dst = workload_node("bookinfo", "reviews-v1", "reviews", "v1");
        connect(&mut src, &mut dst, Protocol::Http, 1.0);
        map.insert(src);
        map.insert(dst);

        let outcome = appender(GraphType::Workload, false).apply(
            &mut map,
            "bookinfo",
            &[],
            &[],
            &LabelNames::default(),
        );
        assert_eq!(outcome.removed, 1);
        assert!(!map.contains(UNKNOWN_SOURCE_ID));
        assert!(map.contains("wl_bookinfo_reviews-v1"));
    }

    #[test]
    fn test_versioned_app_prunes_nodes_missing_from_inventory() {
        let (services, workloads) = inventory();
        let mut map = TrafficMap::new();
        let key = NodeKey::workload("bookinfo", "legacy-v1", "legacy", "v1");
        let mut stray = Node::new(&key, GraphType::VersionedApp);
        stray.edge_or_insert("vapp_bookinfo_reviews-v1", Protocol::Http);
        map.insert(stray);
        let unknown_key = NodeKey {
            service_namespace: "bookinfo",
            service: UNKNOWN,
            workload_namespace: "",
            workload: UNKNOWN,
            app: UNKNOWN,
            version: UNKNOWN,
        };
        let unknown_dest = Node::new(&unknown_key, GraphType::VersionedApp);
        map.insert(unknown_dest);

        appender(GraphType::VersionedApp, false).apply(
            &mut map,
            "bookinfo",
            &services,
            &workloads,
            &LabelNames::default(),
        );

        assert!(!map.contains("vapp_bookinfo_legacy-v1"));
        assert!(map.contains("vapp_bookinfo_reviews-v1"));
        assert!(map.contains("svc_bookinfo_unknown"));
        assert_eq!(map.edge_count(), 0);
    }

    #[test]
    fn test_node_graph_untouched() {
        let (services, workloads) = inventory();
        let mut map = TrafficMap::new();
        let appender = UnusedNodeAppender {
            graph_type: GraphType::Workload,
            inject_service_nodes: true,
            is_node_graph: true,
        };
        let outcome =
            appender.apply(&mut map, "bookinfo", &services, &workloads, &LabelNames::default());
        assert_eq!(outcome, UnusedNodeOutcome::default());
        assert!(map.is_empty());
    }

    #[test]
    fn test_unused_and_dead_are_complementary() {
        let (services, workloads) = inventory();
        let mut map = TrafficMap::new();
        map.insert(workload_node("bookinfo", "ratings-v1", "ratings", "v1"));

        DeadNodeAppender.apply(&mut map, &workloads);
        appender(GraphType::Workload, false).apply(
            &mut map,
            "bookinfo",
            &services,
            &workloads,
            &LabelNames::default(),
        );

        let node = map.get("wl_bookinfo_ratings-v1");
        assert!(node.is_some_and(|n| n.metadata.is_unused != n.metadata.is_dead));
        assert_eq!(map.nodes().filter(|n| n.workload_name() == "ratings-v1").count(), 1);
    }
}
