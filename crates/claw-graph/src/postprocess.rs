//! Final adjustments over the merged request map.

use tracing::trace;

use crate::identity::UNKNOWN;
use crate::options::GraphOptions;
use crate::traffic::{Node, TrafficMap};
use crate::types::NodeKind;

/// Flags nodes the caller did not ask for or may not inspect.
///
/// Nodes outside the requested namespaces are `is_outside`. Unknown nodes,
/// egress sentinels and services in the `unknown` namespace are always
/// `is_inaccessible`, as are outsiders in namespaces the caller cannot see.
pub fn mark_outsiders(map: &mut TrafficMap, options: &GraphOptions) {
    for node in map.nodes_mut() {
        match node.kind {
            NodeKind::Unknown => node.metadata.is_inaccessible = true,
            NodeKind::Service if node.namespace == UNKNOWN || node.metadata.is_egress_cluster => {
                node.metadata.is_inaccessible = true;
            }
            _ => {
                if !options.namespaces.contains_key(&node.namespace) {
                    node.metadata.is_outside = true;
                    if !options.is_accessible(&node.namespace) {
                        node.metadata.is_inaccessible = true;
                    }
                }
            }
        }
    }
}

/// Flags nodes with outgoing edges and no incoming ones as `is_root`.
pub fn mark_traffic_generators(map: &mut TrafficMap) {
    let destinations = map.edge_destinations();
    for node in map.nodes_mut() {
        if !node.edges.is_empty() && !destinations.contains(&node.id) {
            node.metadata.is_root = true;
        }
    }
}

/// Collapses a workload-level map into a service graph.
///
/// Service nodes are kept and their `service -> workload -> service` paths
/// become direct `service -> service` edges, summed per protocol. Root
/// nodes that are not services are kept with only their edges to services.
/// Everything else is dropped. Generators must already be marked.
#[must_use]
pub fn reduce_to_service_graph(map: &TrafficMap) -> TrafficMap {
    let mut reduced = TrafficMap::new();

    for node in map.nodes() {
        if node.kind != NodeKind::Service {
            if node.metadata.is_root {
                let mut root = node.clone();
                root.edges.retain(|e| is_service(map, &e.dest));
                reduced.insert(root);
            } else {
                trace!(node = %node.id, "Dropping non-service node");
            }
            continue;
        }

        let mut service = Node {
            edges: Vec::new(),
            ..node.clone()
        };
        for hop in &node.edges {
            let Some(middle) = map.get(&hop.dest) else {
                continue;
            };
            if middle.kind == NodeKind::Service {
                service.absorb_edge(hop);
                continue;
            }
            for onward in middle.edges.iter().filter(|e| is_service(map, &e.dest)) {
                service.absorb_edge(onward);
            }
        }
        reduced.insert(service);
    }

    reduced
}

fn is_service(map: &TrafficMap, id: &str) -> bool {
    map.get(id).is_some_and(|n| n.kind == NodeKind::Service)
}

/// Runs every post-processing step for `options`.
#[must_use]
pub fn finish(mut map: TrafficMap, options: &GraphOptions) -> TrafficMap {
    mark_outsiders(&mut map, options);
    mark_traffic_generators(&mut map);
    if options.graph_type == crate::types::GraphType::Service && !options.is_node_graph() {
        map = reduce_to_service_graph(&map);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appender::test_support::{connect, options, service_node, workload_node};
    use crate::identity::{NodeKey, PASSTHROUGH_CLUSTER};
    use crate::types::{GraphType, Protocol};

    // ==================== OUTSIDER TESTS ====================

    #[test]
    fn test_outsiders_and_inaccessible() {
        let options = options("bookinfo", GraphType::Workload);
        let mut map = TrafficMap::new();
        map.insert(workload_node("bookinfo", "reviews-v1", "reviews", "v1"));
        map.insert(workload_node("other", "client-v1", "client", "v1"));
        map.insert(workload_node("secret", "spy-v1", "spy", "v1"));
        map.insert(service_node("unknown", "mystery"));
        map.insert(service_node("bookinfo", PASSTHROUGH_CLUSTER));
        map.insert(Node::new(
            &NodeKey::workload(UNKNOWN, UNKNOWN, UNKNOWN, UNKNOWN),
            GraphType::Workload,
        ));

        mark_outsiders(&mut map, &options);

        let flags = |id: &str| {
            map.get(id)
                .map(|n| (n.metadata.is_outside, n.metadata.is_inaccessible))
        };
        assert_eq!(flags("wl_bookinfo_reviews-v1"), Some((false, false)));
        assert_eq!(flags("wl_other_client-v1"), Some((true, false)));
        assert_eq!(flags("wl_secret_spy-v1"), Some((true, true)));
        assert_eq!(flags("svc_unknown_mystery"), Some((false, true)));
        assert_eq!(flags("svc_bookinfo_PassthroughCluster"), Some((false, true)));
        assert_eq!(flags("unknown_source"), Some((false, true)));
    }

    // ==================== GENERATOR TESTS ====================

    #[test]
    fn test_traffic_generators() {
        let mut client = workload_node("bookinfo", "client-v1", "client", "v1");
        let mut productpage = workload_node("bookinfo", "productpage-v1", "productpage", "v1");
        let mut reviews = workload_node("bookinfo", "reviews-v1", "reviews", "v1");
        connect(&mut client, &mut productpage, Protocol::Http, 1.0);
        connect(&mut productpage, &mut reviews, Protocol::Http, 1.0);
        let idle = workload_node("bookinfo", "idle-v1", "idle", "v1");
        let mut map = TrafficMap::new();
        for node in [client, productpage, reviews, idle] {
            map.insert(node);
        }

        mark_traffic_generators(&mut map);

        let roots: Vec<&str> = map
            .nodes()
            .filter(|n| n.metadata.is_root)
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(roots, vec!["wl_bookinfo_client-v1"]);
    }

    // ==================== SERVICE GRAPH TESTS ====================

    fn injected_chain() -> TrafficMap {
        let mut client = workload_node("bookinfo", "client-v1", "client", "v1");
        let mut productpage_svc = service_node("bookinfo", "productpage");
        let mut productpage = workload_node("bookinfo", "productpage-v1", "productpage", "v1");
        let mut reviews_svc = service_node("bookinfo", "reviews");
        let mut reviews_v1 = workload_node("bookinfo", "reviews-v1", "reviews", "v1");
        let mut reviews_v2 = workload_node("bookinfo", "reviews-v2", "reviews", "v2");
        let mut productpage_v2 = workload_node("bookinfo", "productpage-v2", "productpage", "v2");

        connect(&mut client, &mut productpage_svc, Protocol::Http, 10.0);
        connect(&mut client, &mut reviews_v1, Protocol::Http, 1.0);
        connect(&mut productpage_svc, &mut productpage, Protocol::Http, 6.0);
        connect(&mut productpage_svc, &mut productpage_v2, Protocol::Http, 4.0);
        connect(&mut productpage, &mut reviews_svc, Protocol::Http, 6.0);
        connect(&mut productpage_v2, &mut reviews_svc, Protocol::Http, 4.0);
        connect(&mut productpage, &mut reviews_svc, Protocol::Grpc, 2.0);
        connect(&mut reviews_svc, &mut reviews_v1, Protocol::Http, 5.0);
        connect(&mut reviews_svc, &mut reviews_v2, Protocol::Http, 5.0);

        let mut map = TrafficMap::new();
        let nodes = [
            client,
            productpage_svc,
            productpage,
            productpage_v2,
            reviews_svc,
            reviews_v1,
            reviews_v2,
        ];
        for node in nodes {
            map.insert(node);
        }
        mark_traffic_generators(&mut map);
        map
    }

    #[test]
    fn test_service_graph_keeps_services_and_roots() {
        let reduced = reduce_to_service_graph(&injected_chain());
        assert_eq!(
            reduced.ids(),
            vec![
                "svc_bookinfo_productpage".to_string(),
                "svc_bookinfo_reviews".to_string(),
                "wl_bookinfo_client-v1".to_string(),
            ]
        );
        let client = reduced.get("wl_bookinfo_client-v1");
        assert_eq!(client.map(|n| n.edges.len()), Some(1));
    }

    #[test]
    fn test_service_graph_sums_per_protocol() {
        let reduced = reduce_to_service_graph(&injected_chain());
        let productpage = reduced.get("svc_bookinfo_productpage");
        let edges = productpage.map(|n| n.edges.clone()).unwrap_or_default();
        assert_eq!(edges.len(), 2);

        let http = edges.iter().find(|e| e.protocol() == Protocol::Http);
        assert_eq!(http.map(|e| e.dest.as_str()), Some("svc_bookinfo_reviews"));
        assert_eq!(http.map(|e| e.metadata.total()), Some(10.0));
        assert_eq!(http.map(|e| e.source.as_str()), Some("svc_bookinfo_productpage"));

        let grpc = edges.iter().find(|e| e.protocol() == Protocol::Grpc);
        assert_eq!(grpc.map(|e| e.metadata.total()), Some(2.0));

        assert!(!reduced.has_duplicate_edges());
        assert!(reduced.get("svc_bookinfo_reviews").is_some_and(|n| n.edges.is_empty()));
    }

    #[test]
    fn test_finish_reduces_only_service_graphs() {
        let workload = finish(injected_chain(), &options("bookinfo", GraphType::Workload));
        assert_eq!(workload.len(), 7);

        let service = finish(injected_chain(), &options("bookinfo", GraphType::Service));
        assert_eq!(service.len(), 3);
    }
}
