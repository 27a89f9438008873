//! Nodes, edges and the traffic map.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::identity::{NodeKey, UNKNOWN, is_egress_cluster, is_ok};
use crate::metadata::{EdgeMetadata, NodeMetadata};
use crate::types::{GraphType, NodeKind, Protocol};

/// A directed edge. Owned by its source node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Source node ID.
    pub source: String,
    /// Destination node ID.
    pub dest: String,
    /// Edge metadata.
    pub metadata: EdgeMetadata,
}

impl Edge {
    /// Creates an empty edge.
    #[must_use]
    pub fn new(source: impl Into<String>, dest: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
            metadata: EdgeMetadata::new(protocol),
        }
    }

    /// Edge protocol.
    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        self.metadata.protocol
    }
}

/// A graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Canonical ID.
    pub id: String,
    /// Resolved kind.
    pub kind: NodeKind,
    /// Owning namespace.
    pub namespace: String,
    /// Workload name, for workload and versioned app nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload: Option<String>,
    /// App label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    /// Version label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Service name, for service nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Node metadata.
    pub metadata: NodeMetadata,
    /// Outgoing edges, at most one per (dest, protocol).
    #[serde(default)]
    pub edges: Vec<Edge>,
}

fn present(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn known(value: &str) -> Option<String> {
    is_ok(value).then(|| value.to_string())
}

impl Node {
    /// Creates a node, resolving its ID from the key.
    ///
    /// # Panics
    ///
    /// Panics when the key cannot be resolved; see [`NodeKey::id`].
    #[must_use]
    pub fn new(key: &NodeKey<'_>, graph_type: GraphType) -> Self {
        let (id, kind) = key.id(graph_type);
        Self::resolved(id, kind, key, graph_type)
    }

    /// Creates a node with an already-resolved ID, clearing the fields that
    /// are meaningless for its kind.
    #[must_use]
    pub fn resolved(id: String, kind: NodeKind, key: &NodeKey<'_>, graph_type: GraphType) -> Self {
        let mut node = Self {
            id,
            kind,
            namespace: key.namespace().to_string(),
            workload: present(key.workload),
            app: present(key.app),
            version: present(key.version),
            service: present(key.service),
            metadata: NodeMetadata::default(),
            edges: Vec::new(),
        };

        match kind {
            NodeKind::Workload => {
                node.app = known(key.app);
                node.version = known(key.version);
                node.service = None;
            }
            NodeKind::App => {
                if graph_type != GraphType::VersionedApp {
                    node.workload = None;
                    node.version = None;
                }
                node.service = None;
            }
            NodeKind::Service => {
                node.workload = None;
                node.app = None;
                node.version = None;
                node.metadata.is_egress_cluster = is_egress_cluster(key.service);
            }
            NodeKind::Unknown => {}
        }
        node
    }

    /// Workload name, or empty.
    #[must_use]
    pub fn workload_name(&self) -> &str {
        self.workload.as_deref().unwrap_or_default()
    }

    /// App label, or empty.
    #[must_use]
    pub fn app_name(&self) -> &str {
        self.app.as_deref().unwrap_or_default()
    }

    /// Version label, or empty.
    #[must_use]
    pub fn version_name(&self) -> &str {
        self.version.as_deref().unwrap_or_default()
    }

    /// Service name, or empty.
    #[must_use]
    pub fn service_name(&self) -> &str {
        self.service.as_deref().unwrap_or_default()
    }

    /// Finds the edge to `dest` with `protocol`.
    pub fn edge_mut(&mut self, dest: &str, protocol: Protocol) -> Option<&mut Edge> {
        self.edges
            .iter_mut()
            .find(|e| e.dest == dest && e.protocol() == protocol)
    }

    /// Returns the edge to `dest` with `protocol`, adding an empty one when
    /// none exists.
    pub fn edge_or_insert(&mut self, dest: &str, protocol: Protocol) -> &mut Edge {
        let index = match self
            .edges
            .iter()
            .position(|e| e.dest == dest && e.protocol() == protocol)
        {
            Some(index) => index,
            None => {
                self.edges.push(Edge::new(self.id.clone(), dest, protocol));
                self.edges.len() - 1
            }
        };
        &mut self.edges[index]
    }

    /// Merges an edge into this node's edges, summing traffic into an
    /// existing (dest, protocol) edge.
    pub fn absorb_edge(&mut self, edge: &Edge) {
        let target = self.edge_or_insert(&edge.dest, edge.protocol());
        target.metadata.traffic.merge(&edge.metadata.traffic);
    }
}

/// Mapping from node ID to node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrafficMap {
    nodes: BTreeMap<String, Node>,
}

impl TrafficMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true when the map has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Total number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.edges.len()).sum()
    }

    /// Returns true when a node with `id` exists.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Looks up a node.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Looks up a node mutably.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Inserts a node, replacing any node with the same ID.
    pub fn insert(&mut self, node: Node) -> Option<Node> {
        self.nodes.insert(node.id.clone(), node)
    }

    /// Removes a node. Edges pointing to it are left in place.
    pub fn remove(&mut self, id: &str) -> Option<Node> {
        self.nodes.remove(id)
    }

    /// Inserts `node` when no node with its ID exists. Returns true when
    /// a node was already present.
    pub fn insert_if_absent(&mut self, node: Node) -> bool {
        if self.nodes.contains_key(&node.id) {
            return true;
        }
        self.nodes.insert(node.id.clone(), node);
        false
    }

    /// Iterates over nodes in ID order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Iterates over nodes mutably.
    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }

    /// Iterates over every edge.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.nodes.values().flat_map(|n| n.edges.iter())
    }

    /// Node IDs in order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    /// IDs of every node that is the destination of some edge.
    #[must_use]
    pub fn edge_destinations(&self) -> HashSet<String> {
        self.edges().map(|e| e.dest.clone()).collect()
    }

    /// Keeps only the nodes for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&Node) -> bool) -> usize {
        let before = self.nodes.len();
        self.nodes.retain(|_, n| keep(n));
        before - self.nodes.len()
    }

    /// Removes edges whose destination is no longer in the map. Returns
    /// the number of edges removed.
    pub fn prune_dangling_edges(&mut self) -> usize {
        let ids: HashSet<String> = self.nodes.keys().cloned().collect();
        let mut pruned = 0;
        for node in self.nodes.values_mut() {
            let before = node.edges.len();
            node.edges.retain(|e| ids.contains(&e.dest));
            pruned += before - node.edges.len();
        }
        pruned
    }

    /// Merges a namespace map into this one.
    ///
    /// When both maps hold the same ID, the node belonging to `namespace`
    /// is kept and the other node's edges are added unless an edge with
    /// the same (dest, protocol) already exists.
    pub fn merge_namespace(&mut self, namespace: &str, other: Self) {
        for (id, incoming) in other.nodes {
            let Some(existing) = self.nodes.remove(&id) else {
                self.nodes.insert(id, incoming);
                continue;
            };

            let (mut kept, dropped) = if incoming.namespace == namespace {
                (incoming, existing)
            } else {
                (existing, incoming)
            };

            for edge in dropped.edges {
                let duplicate = kept
                    .edges
                    .iter()
                    .any(|e| e.dest == edge.dest && e.protocol() == edge.protocol());
                if !duplicate {
                    kept.metadata
                        .traffic
                        .record_outbound(edge.protocol(), edge.metadata.total());
                    kept.edges.push(Edge {
                        source: kept.id.clone(),
                        ..edge
                    });
                }
            }
            self.nodes.insert(id, kept);
        }
    }

    /// Returns true if some node holds two edges with the same
    /// (dest, protocol).
    #[must_use]
    pub fn has_duplicate_edges(&self) -> bool {
        self.nodes.values().any(|n| {
            let mut seen = HashSet::new();
            n.edges.iter().any(|e| !seen.insert((e.dest.as_str(), e.protocol())))
        })
    }
}

/// Returns true when the ID refers to placeholder telemetry.
#[must_use]
pub fn is_unknown_id(id: &str) -> bool {
    id.contains(UNKNOWN)
}
