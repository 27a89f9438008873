//! Telemetry to traffic map.
//!
//! The builder issues the provenance queries for a namespace (or a single
//! node), and the [`MapAssembler`] folds the returned samples into nodes
//! and edges:
//!
//! ```text
//!   unknown origin ──┐
//!   other namespaces ├──► samples ──► TrafficSample ──► hops ──► TrafficMap
//!   this namespace ──┘                (sanitized)      (+svc)
//! ```
//!
//! Values are summed into existing nodes and edges, so the order in which
//! queries return is irrelevant.

use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::context::QueryContext;
use crate::error::{GraphError, Result};
use crate::identity::{NodeKey, UNKNOWN, is_ok};
use crate::metadata::ServiceName;
use crate::options::{GraphOptions, NodeOptions};
use crate::sample::{SampleShape, TrafficSample};
use crate::telemetry::{
    MatchOp, MetricKind, MetricSelector, Reporter, Sample, TelemetrySource, labels,
};
use crate::traffic::{Node, TrafficMap};
use crate::types::{GraphType, NamespaceInfo, NodeKind};

/// Folds traffic samples into a [`TrafficMap`].
#[derive(Debug, Clone, Copy)]
pub struct MapAssembler<'a> {
    graph_type: GraphType,
    inject_service_nodes: bool,
    config: &'a EngineConfig,
}

impl<'a> MapAssembler<'a> {
    /// Creates an assembler.
    #[must_use]
    pub const fn new(
        graph_type: GraphType,
        inject_service_nodes: bool,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            graph_type,
            inject_service_nodes,
            config,
        }
    }

    /// Adds every usable sample to `map`. Unusable samples are logged and
    /// skipped. Returns the number of samples added.
    pub fn add_samples(
        &self,
        map: &mut TrafficMap,
        samples: &[Sample],
        shape: SampleShape,
    ) -> usize {
        let mut added = 0;
        for raw in samples {
            match TrafficSample::parse(raw, shape, self.config) {
                Ok(sample) => {
                    if self.add_sample(map, &sample) {
                        added += 1;
                    }
                }
                Err(reason) => {
                    warn!(reason = %reason, labels = ?raw.labels, "Skipping telemetry sample");
                }
            }
        }
        added
    }

    /// Adds one sanitized sample. Returns false when a side of the sample
    /// has no identity.
    pub fn add_sample(&self, map: &mut TrafficMap, sample: &TrafficSample<'_>) -> bool {
        let mut resolved = Vec::with_capacity(2);
        for (source, dest) in sample.hops(self.graph_type, self.inject_service_nodes) {
            let (Some(source_id), Some(dest_id)) =
                (source.try_id(self.graph_type), dest.try_id(self.graph_type))
            else {
                warn!(source = ?source, dest = ?dest, "Skipping sample without node identity");
                return false;
            };
            resolved.push(((source, source_id), (dest, dest_id)));
        }

        for ((source, (source_id, source_kind)), (dest, (dest_id, dest_kind))) in resolved {
            let source_found = self.ensure_node(map, &source, &source_id, source_kind);
            let dest_found = self.ensure_node(map, &dest, &dest_id, dest_kind);

            if let Some(node) = map.get_mut(&dest_id) {
                if is_ok(dest.service) {
                    node.metadata
                        .add_dest_service(ServiceName::new(dest.service_namespace, dest.service));
                }
                if dest_found {
                    self.reconcile_labels(node, dest.app, dest.version, sample.value);
                }
                node.metadata
                    .traffic
                    .record_inbound(sample.protocol, sample.code, sample.value);
            }

            if let Some(node) = map.get_mut(&source_id) {
                if source_found {
                    self.reconcile_labels(node, source.app, source.version, sample.value);
                }
                node.metadata.traffic.record_outbound(sample.protocol, sample.value);
                node.edge_or_insert(&dest_id, sample.protocol).metadata.record(
                    sample.code,
                    sample.flags,
                    sample.dest_host,
                    sample.value,
                );
            }
        }
        true
    }

    /// Inserts the node when missing. Returns true when it already existed.
    fn ensure_node(
        &self,
        map: &mut TrafficMap,
        key: &NodeKey<'_>,
        id: &str,
        kind: NodeKind,
    ) -> bool {
        if map.contains(id) {
            return true;
        }
        map.insert(Node::resolved(id.to_string(), kind, key, self.graph_type));
        false
    }

    /// Flags a workload node (or versioned app node) seen with a different
    /// app or version label. The labels of active series win.
    fn reconcile_labels(&self, node: &mut Node, app: &str, version: &str, value: f64) {
        let applies = node.kind == NodeKind::Workload
            || (node.kind == NodeKind::App && self.graph_type == GraphType::VersionedApp);
        if !applies {
            return;
        }

        let mut differing = Vec::new();
        if normalized(node.app_name()) != normalized(app) {
            differing.push(self.config.labels.app.as_str());
        }
        if normalized(node.version_name()) != normalized(version) {
            differing.push(self.config.labels.version.as_str());
        }
        if differing.is_empty() {
            return;
        }

        node.metadata.is_misconfigured = Some(format!("labels=[{}]", differing.join(" ")));
        if value > 0.0 {
            node.app = is_ok(app).then(|| app.to_string());
            node.version = is_ok(version).then(|| version.to_string());
        }
    }
}

fn normalized(value: &str) -> &str {
    if is_ok(value) { value } else { "" }
}

/// What a node-detail graph is centred on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeFocus<'a> {
    /// A single workload.
    Workload(&'a str),
    /// An app, optionally narrowed to one version.
    App {
        /// App label value.
        app: &'a str,
        /// Version label value, or empty.
        version: &'a str,
    },
    /// A service.
    Service(&'a str),
}

impl<'a> NodeFocus<'a> {
    /// Derives the focus from validated node options.
    #[must_use]
    pub fn of(node: &'a NodeOptions) -> Self {
        if !node.service.is_empty() {
            Self::Service(&node.service)
        } else if !node.app.is_empty() {
            Self::App {
                app: &node.app,
                version: &node.version,
            }
        } else {
            Self::Workload(&node.workload)
        }
    }
}

fn requests(range: std::time::Duration) -> MetricSelector {
    MetricSelector::new(MetricKind::Requests, range)
}

fn tcp(range: std::time::Duration) -> MetricSelector {
    MetricSelector::new(MetricKind::TcpSentBytes, range)
}

/// The provenance queries for a namespace graph, in issue order.
#[must_use]
pub fn namespace_selectors(
    info: &NamespaceInfo,
    options: &GraphOptions,
    config: &EngineConfig,
) -> Vec<(MetricSelector, SampleShape)> {
    let ns = info.name.as_str();
    let range = info.duration;
    let mut selectors = Vec::with_capacity(6);

    // Unknown origin, reported by the destination proxy.
    selectors.push((
        requests(range)
            .reporter(Reporter::Destination)
            .label_eq(labels::SOURCE_WORKLOAD, UNKNOWN)
            .label_eq(labels::DESTINATION_WORKLOAD_NAMESPACE, ns),
        SampleShape::Requests,
    ));

    // Workloads of other namespaces calling into this one.
    let external = if info.is_mesh_infra {
        let mut excluded = vec![ns.to_string()];
        excluded.extend(options.excluded_mesh_namespaces(config));
        requests(range)
            .reporter(Reporter::Destination)
            .matching(labels::SOURCE_WORKLOAD_NAMESPACE, MatchOp::NoneOf(excluded))
    } else {
        requests(range)
            .reporter(Reporter::Source)
            .label_ne(labels::SOURCE_WORKLOAD_NAMESPACE, ns)
    };
    selectors.push((
        external
            .label_ne(labels::SOURCE_WORKLOAD, UNKNOWN)
            .label_eq(labels::DESTINATION_SERVICE_NAMESPACE, ns),
        SampleShape::Requests,
    ));

    // Traffic originating in this namespace.
    selectors.push((
        requests(range)
            .reporter(Reporter::Source)
            .label_eq(labels::SOURCE_WORKLOAD_NAMESPACE, ns),
        SampleShape::Requests,
    ));

    if info.is_mesh_infra {
        // Mesh infra to mesh infra is only reported by the destination.
        selectors.push((
            requests(range)
                .reporter(Reporter::Destination)
                .label_eq(labels::SOURCE_WORKLOAD_NAMESPACE, ns)
                .matching(
                    labels::DESTINATION_SERVICE_NAMESPACE,
                    MatchOp::OneOf(options.requested_mesh_namespaces()),
                ),
            SampleShape::Requests,
        ));
        return selectors;
    }

    selectors.push((
        tcp(range)
            .reporter(Reporter::Destination)
            .label_eq(labels::SOURCE_WORKLOAD, UNKNOWN)
            .label_eq(labels::DESTINATION_WORKLOAD_NAMESPACE, ns),
        SampleShape::Tcp,
    ));
    selectors.push((
        tcp(range)
            .reporter(Reporter::Source)
            .label_ne(labels::SOURCE_WORKLOAD_NAMESPACE, ns)
            .label_ne(labels::SOURCE_WORKLOAD, UNKNOWN)
            .label_eq(labels::DESTINATION_SERVICE_NAMESPACE, ns),
        SampleShape::Tcp,
    ));
    selectors.push((
        tcp(range)
            .reporter(Reporter::Source)
            .label_eq(labels::SOURCE_WORKLOAD_NAMESPACE, ns),
        SampleShape::Tcp,
    ));
    selectors
}

/// Constrains a selector to the destination side of `focus`.
fn inbound_to(
    selector: MetricSelector,
    ns: &str,
    focus: NodeFocus<'_>,
    config: &EngineConfig,
) -> MetricSelector {
    match focus {
        NodeFocus::Workload(workload) => selector
            .label_eq(labels::DESTINATION_WORKLOAD_NAMESPACE, ns)
            .label_eq(labels::DESTINATION_WORKLOAD, workload),
        NodeFocus::App { app, version } => {
            let selector = selector
                .label_eq(labels::DESTINATION_SERVICE_NAMESPACE, ns)
                .label_eq(labels::destination(&config.labels.app), app);
            if is_ok(version) {
                selector.label_eq(labels::destination(&config.labels.version), version)
            } else {
                selector
            }
        }
        NodeFocus::Service(service) => selector
            .label_eq(labels::DESTINATION_SERVICE_NAMESPACE, ns)
            .label_eq(labels::DESTINATION_SERVICE_NAME, service),
    }
}

/// Constrains a selector to the source side of `focus`. Services never
/// originate traffic.
fn outbound_from(
    selector: MetricSelector,
    ns: &str,
    focus: NodeFocus<'_>,
    config: &EngineConfig,
) -> Option<MetricSelector> {
    let selector = selector.label_eq(labels::SOURCE_WORKLOAD_NAMESPACE, ns);
    match focus {
        NodeFocus::Workload(workload) => Some(selector.label_eq(labels::SOURCE_WORKLOAD, workload)),
        NodeFocus::App { app, version } => {
            let selector = selector.label_eq(labels::source(&config.labels.app), app);
            Some(if is_ok(version) {
                selector.label_eq(labels::source(&config.labels.version), version)
            } else {
                selector
            })
        }
        NodeFocus::Service(_) => None,
    }
}

/// The queries for a node-detail graph, in issue order.
#[must_use]
pub fn node_selectors(
    focus: NodeFocus<'_>,
    info: &NamespaceInfo,
    options: &GraphOptions,
    config: &EngineConfig,
) -> Vec<(MetricSelector, SampleShape)> {
    let ns = info.name.as_str();
    let range = info.duration;
    let mut selectors = Vec::with_capacity(6);

    let mut inbound = requests(range).reporter(Reporter::Destination);
    if info.is_mesh_infra {
        let excluded = options.excluded_mesh_namespaces(config);
        if !excluded.is_empty() {
            inbound =
                inbound.matching(labels::SOURCE_WORKLOAD_NAMESPACE, MatchOp::NoneOf(excluded));
        }
    }
    if let NodeFocus::Service(service) = focus {
        // Unknown callers reach a service through its workloads only.
        selectors.push((
            requests(range)
                .reporter(Reporter::Destination)
                .label_eq(labels::SOURCE_WORKLOAD, UNKNOWN)
                .label_eq(labels::DESTINATION_WORKLOAD_NAMESPACE, ns)
                .label_eq(labels::DESTINATION_SERVICE_NAME, service),
            SampleShape::Requests,
        ));
        inbound = requests(range).reporter(Reporter::Source);
    }
    selectors.push((inbound_to(inbound, ns, focus, config), SampleShape::Requests));

    let outbound = outbound_from(requests(range).reporter(Reporter::Source), ns, focus, config);
    if let Some(outbound) = outbound {
        selectors.push((outbound, SampleShape::Requests));
    }

    if info.is_mesh_infra {
        let supplemental = match focus {
            NodeFocus::Service(_) => Some(inbound_to(
                requests(range).reporter(Reporter::Destination),
                ns,
                focus,
                config,
            )),
            _ => outbound_from(
                requests(range).reporter(Reporter::Destination),
                ns,
                focus,
                config,
            )
            .map(|s| {
                s.matching(
                    labels::DESTINATION_SERVICE_NAMESPACE,
                    MatchOp::OneOf(options.requested_mesh_namespaces()),
                )
            }),
        };
        if let Some(selector) = supplemental {
            selectors.push((selector, SampleShape::Requests));
        }
        return selectors;
    }

    selectors.push((
        inbound_to(tcp(range).reporter(Reporter::Source), ns, focus, config),
        SampleShape::Tcp,
    ));
    let outbound = outbound_from(tcp(range).reporter(Reporter::Source), ns, focus, config);
    if let Some(outbound) = outbound {
        selectors.push((outbound, SampleShape::Tcp));
    }
    selectors
}

/// Issues provenance queries and assembles traffic maps.
pub struct TrafficMapBuilder<'a, T> {
    telemetry: &'a T,
    options: &'a GraphOptions,
    config: &'a EngineConfig,
    query: &'a QueryContext,
}

impl<'a, T: TelemetrySource> TrafficMapBuilder<'a, T> {
    /// Creates a builder for one request.
    #[must_use]
    pub const fn new(
        telemetry: &'a T,
        options: &'a GraphOptions,
        config: &'a EngineConfig,
        query: &'a QueryContext,
    ) -> Self {
        Self {
            telemetry,
            options,
            config,
            query,
        }
    }

    fn assembler(&self) -> MapAssembler<'a> {
        MapAssembler::new(self.options.graph_type, self.options.inject_service_nodes, self.config)
    }

    /// Builds the traffic map of one namespace.
    ///
    /// # Errors
    ///
    /// Propagates the first failed, timed-out or cancelled query.
    pub async fn namespace_map(&self, info: &NamespaceInfo) -> Result<TrafficMap> {
        let selectors = namespace_selectors(info, self.options, self.config);
        let map = self.run(&selectors).await?;
        debug!(
            namespace = %info.name,
            nodes = map.len(),
            edges = map.edge_count(),
            "Built namespace traffic map"
        );
        Ok(map)
    }

    /// Builds the traffic map around one node.
    ///
    /// # Errors
    ///
    /// Propagates the first failed, timed-out or cancelled query, and
    /// returns [`GraphError::BadRequest`] when the node namespace was not
    /// part of the request options.
    pub async fn node_map(&self, node: &NodeOptions) -> Result<TrafficMap> {
        let info = self.options.namespaces.get(&node.namespace).ok_or_else(|| {
            GraphError::bad_request(format!(
                "Node namespace [{}] was not requested",
                node.namespace
            ))
        })?;
        let selectors = node_selectors(NodeFocus::of(node), info, self.options, self.config);
        let map = self.run(&selectors).await?;
        debug!(
            namespace = %info.name,
            nodes = map.len(),
            edges = map.edge_count(),
            "Built node traffic map"
        );
        Ok(map)
    }

    async fn run(&self, selectors: &[(MetricSelector, SampleShape)]) -> Result<TrafficMap> {
        let assembler = self.assembler();
        let mut map = TrafficMap::new();
        for (selector, shape) in selectors {
            let samples = self
                .query
                .bounded(
                    "telemetry query",
                    self.telemetry.query(selector, self.options.query_time),
                )
                .await?;
            let added = assembler.add_samples(&mut map, &samples, *shape);
            debug!(selector = %selector, samples = samples.len(), added, "Applied telemetry query");
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appender::test_support::options;
    use crate::sample::fixtures::RawSample;
    use crate::types::Protocol;

    fn assembler(config: &EngineConfig, graph_type: GraphType, inject: bool) -> MapAssembler<'_> {
        MapAssembler::new(graph_type, inject, config)
    }

    fn productpage_to_reviews(value: f64) -> Sample {
        RawSample::request(
            ("bookinfo", "productpage-v1", "productpage", "v1"),
            ("bookinfo", "reviews-v1", "reviews", "v1"),
            "reviews",
            value,
        )
        .build()
    }

    // ==================== ASSEMBLY TESTS ====================

    #[test]
    fn test_samples_on_same_edge_are_summed() {
        let config = EngineConfig::default();
        let mut map = TrafficMap::new();
        let added = assembler(&config, GraphType::Workload, false).add_samples(
            &mut map,
            &[productpage_to_reviews(5.0), productpage_to_reviews(3.0)],
            SampleShape::Requests,
        );

        assert_eq!(added, 2);
        assert_eq!(map.len(), 2);
        let source = map.get("wl_bookinfo_productpage-v1");
        assert_eq!(source.map(|n| n.edges.len()), Some(1));
        assert_eq!(source.and_then(|n| n.edges.first()).map(|e| e.metadata.total()), Some(8.0));
        assert_eq!(
            source.and_then(|n| n.metadata.traffic.get(Protocol::Http)).map(|t| t.outbound),
            Some(8.0)
        );
        let dest = map.get("wl_bookinfo_reviews-v1");
        assert_eq!(
            dest.and_then(|n| n.metadata.traffic.get(Protocol::Http)).map(|t| t.inbound.total),
            Some(8.0)
        );
        assert!(dest.is_some_and(|n| n.metadata.dest_services.contains_key("bookinfo reviews")));
    }

    #[test]
    fn test_protocols_produce_separate_edges() {
        let config = EngineConfig::default();
        let mut map = TrafficMap::new();
        let grpc = RawSample::request(
            ("bookinfo", "productpage-v1", "productpage", "v1"),
            ("bookinfo", "reviews-v1", "reviews", "v1"),
            "reviews",
            1.0,
        )
        .with("request_protocol", "grpc")
        .build();
        assembler(&config, GraphType::Workload, false).add_samples(
            &mut map,
            &[productpage_to_reviews(2.0), grpc],
            SampleShape::Requests,
        );
        assert_eq!(map.edge_count(), 2);
        assert!(!map.has_duplicate_edges());
    }

    #[test]
    fn test_injected_service_node() {
        let config = EngineConfig::default();
        let mut map = TrafficMap::new();
        assembler(&config, GraphType::Workload, true).add_samples(
            &mut map,
            &[productpage_to_reviews(4.0)],
            SampleShape::Requests,
        );

        assert_eq!(map.len(), 3);
        let service = map.get("svc_bookinfo_reviews");
        assert!(service.is_some_and(|n| n.kind == NodeKind::Service));
        assert_eq!(service.map(|n| n.edges.len()), Some(1));
        assert_eq!(
            service.and_then(|n| n.edges.first()).map(|e| e.dest.as_str()),
            Some("wl_bookinfo_reviews-v1")
        );
        let source = map.get("wl_bookinfo_productpage-v1");
        assert_eq!(
            source.and_then(|n| n.edges.first()).map(|e| e.dest.as_str()),
            Some("svc_bookinfo_reviews")
        );
    }

    #[test]
    fn test_unknown_source_node() {
        let config = EngineConfig::default();
        let mut map = TrafficMap::new();
        let ingress = RawSample::request(
            ("unknown", "unknown", "unknown", "unknown"),
            ("bookinfo", "productpage-v1", "productpage", "v1"),
            "productpage",
            1.0,
        )
        .build();
        assembler(&config, GraphType::App, false).add_samples(
            &mut map,
            &[ingress],
            SampleShape::Requests,
        );
        assert!(map.contains("unknown_source"));
        assert!(map.contains("app_bookinfo_productpage"));
    }

    #[test]
    fn test_malformed_samples_skipped() {
        let config = EngineConfig::default();
        let mut map = TrafficMap::new();
        let broken = RawSample::request(
            ("bookinfo", "productpage-v1", "productpage", "v1"),
            ("bookinfo", "reviews-v1", "reviews", "v1"),
            "reviews",
            1.0,
        )
        .without("response_flags")
        .build();
        let added = assembler(&config, GraphType::Workload, false).add_samples(
            &mut map,
            &[broken, productpage_to_reviews(1.0)],
            SampleShape::Requests,
        );
        assert_eq!(added, 1);
    }

    #[test]
    fn test_misconfigured_labels_flagged() {
        let config = EngineConfig::default();
        let mut map = TrafficMap::new();
        let relabeled = RawSample::request(
            ("bookinfo", "productpage-v1", "productpage", "v1"),
            ("bookinfo", "reviews-v1", "reviews", "v2"),
            "reviews",
            2.0,
        )
        .build();
        let idle = RawSample::request(
            ("bookinfo", "productpage-v1", "productpage", "v1"),
            ("bookinfo", "reviews-v1", "reviews", "v3"),
            "reviews",
            0.0,
        )
        .build();
        assembler(&config, GraphType::Workload, false).add_samples(
            &mut map,
            &[productpage_to_reviews(1.0), relabeled, idle],
            SampleShape::Requests,
        );

        let node = map.get("wl_bookinfo_reviews-v1");
        assert_eq!(
            node.and_then(|n| n.metadata.is_misconfigured.as_deref()),
            Some("labels=[version]")
        );
        assert_eq!(node.map(Node::version_name), Some("v2"));
    }

    #[test]
    fn test_tcp_samples() {
        let config = EngineConfig::default();
        let mut map = TrafficMap::new();
        let sample = RawSample::request(
            ("bookinfo", "reviews-v1", "reviews", "v1"),
            ("bookinfo", "mysqldb-v1", "mysqldb", "v1"),
            "mysqldb",
            1024.0,
        )
        .without("response_code")
        .without("request_protocol")
        .build();
        assembler(&config, GraphType::Workload, false).add_samples(
            &mut map,
            &[sample],
            SampleShape::Tcp,
        );
        let edge = map.get("wl_bookinfo_reviews-v1").and_then(|n| n.edges.first());
        assert_eq!(edge.map(crate::traffic::Edge::protocol), Some(Protocol::Tcp));
        assert!(edge.is_some_and(|e| e.metadata.traffic.responses.is_empty()));
    }

    // ==================== SELECTOR TESTS ====================

    #[test]
    fn test_namespace_selectors_regular_namespace() {
        let options = options("bookinfo", GraphType::Workload);
        let info = &options.namespaces["bookinfo"];
        let selectors = namespace_selectors(info, &options, &EngineConfig::default());
        assert_eq!(selectors.len(), 6);
        assert_eq!(
            selectors.iter().filter(|(_, shape)| *shape == SampleShape::Tcp).count(),
            3
        );
        assert_eq!(selectors[0].0.reporter, Some(Reporter::Destination));
        assert_eq!(selectors[2].0.reporter, Some(Reporter::Source));
    }

    #[test]
    fn test_namespace_selectors_mesh_infra() {
        let options = options("istio-system,bookinfo", GraphType::Workload);
        let info = &options.namespaces["istio-system"];
        let selectors = namespace_selectors(info, &options, &EngineConfig::default());
        assert_eq!(selectors.len(), 4);
        assert!(selectors.iter().all(|(_, shape)| *shape == SampleShape::Requests));
        assert_eq!(selectors[1].0.reporter, Some(Reporter::Destination));
        assert_eq!(
            selectors[3].0.matchers.last().map(|m| m.op.clone()),
            Some(MatchOp::OneOf(vec!["istio-system".to_string()]))
        );
    }

    #[test]
    fn test_node_selectors_service_has_no_outbound() {
        let options = options("bookinfo", GraphType::Workload);
        let info = &options.namespaces["bookinfo"];
        let selectors = node_selectors(
            NodeFocus::Service("reviews"),
            info,
            &options,
            &EngineConfig::default(),
        );
        assert_eq!(selectors.len(), 3);
        assert!(selectors
            .iter()
            .all(|(s, _)| s.matchers.iter().any(|m| m.label == labels::DESTINATION_SERVICE_NAME)));
    }

    #[test]
    fn test_node_focus_of_options() {
        let app = NodeOptions {
            namespace: "bookinfo".to_string(),
            app: "reviews".to_string(),
            version: "v2".to_string(),
            ..NodeOptions::default()
        };
        assert_eq!(NodeFocus::of(&app), NodeFocus::App { app: "reviews", version: "v2" });
    }
}
