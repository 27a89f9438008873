//! Cross-cluster edges.
//!
//! Requests leaving a cluster for a federated service are addressed to a
//! host such as `reviews.bookinfo.global`, declared by a service entry
//! whose endpoints are the ingress gateways of the clusters hosting it.
//! The resolver turns each such request into one [`MultiClusterEdge`] per
//! target cluster. These edges are returned next to the per-cluster maps
//! and never merged into them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::context::QueryContext;
use crate::error::Result;
use crate::identity::NodeKey;
use crate::inventory::{InventorySource, ServiceEntry};
use crate::options::{GraphOptions, NodeOptions};
use crate::telemetry::{MatchOp, MetricKind, MetricSelector, Sample, TelemetrySource, labels};
use crate::types::{GraphType, NamespaceInfo, Protocol};

/// A synthetic edge between clusters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiClusterEdge {
    /// Source node ID, in versioned app form.
    pub source: String,
    /// Destination service node ID.
    pub dest: String,
    /// Request protocol.
    pub protocol: Protocol,
    /// Measured request rate.
    pub rate: f64,
    /// Estimated share of the rate handled by the target cluster.
    pub share_percent: f64,
    /// Response code of the counted requests.
    pub response_code: String,
    /// Cluster the request left.
    pub from_cluster: String,
    /// Cluster the request was routed to.
    pub to_cluster: String,
    /// Federation host.
    pub host: String,
}

/// Resolves federated requests of one cluster into cross-cluster edges.
#[derive(Debug, Clone)]
pub struct MultiClusterResolver<'a> {
    config: &'a EngineConfig,
    clusters: &'a BTreeMap<String, String>,
    current: &'a str,
}

impl<'a> MultiClusterResolver<'a> {
    /// Creates a resolver for requests leaving `current`. `clusters` maps
    /// cluster names to gateway addresses.
    #[must_use]
    pub const fn new(
        config: &'a EngineConfig,
        clusters: &'a BTreeMap<String, String>,
        current: &'a str,
    ) -> Self {
        Self {
            config,
            clusters,
            current,
        }
    }

    /// Successful requests from `info` to federation hosts.
    #[must_use]
    pub fn selector(&self, info: &NamespaceInfo) -> MetricSelector {
        MetricSelector::new(MetricKind::RequestBytesCount, info.duration)
            .label_eq(labels::RESPONSE_CODE, "200")
            .label_eq(labels::SOURCE_WORKLOAD_NAMESPACE, info.name.as_str())
            .matching(
                labels::DESTINATION_SERVICE,
                MatchOp::EndsWith(format!(".{}", self.config.federation_suffix)),
            )
    }

    /// Queries every requested namespace (or the node's namespace for a
    /// node-detail request) and resolves the results.
    ///
    /// # Errors
    ///
    /// Returns the first telemetry or inventory failure.
    pub async fn resolve<T, I>(
        &self,
        telemetry: &T,
        inventory: &I,
        options: &GraphOptions,
        query: &QueryContext,
    ) -> Result<Vec<MultiClusterEdge>>
    where
        T: TelemetrySource,
        I: InventorySource,
    {
        let focus = options.node.as_ref();
        let mut edges = Vec::new();
        for (name, info) in &options.namespaces {
            if focus.is_some_and(|node| &node.namespace != name) {
                continue;
            }
            let mesh = query
                .bounded("mesh config", inventory.mesh_config(name))
                .await?;
            let samples = query
                .bounded(
                    "multi-cluster query",
                    telemetry.query(&self.selector(info), options.query_time),
                )
                .await?;
            let resolved = self.resolve_samples(&samples, &mesh.service_entries, focus);
            debug!(
                namespace = %name,
                cluster = %self.current,
                samples = samples.len(),
                edges = resolved.len(),
                "Resolved multi-cluster edges"
            );
            edges.extend(resolved);
        }
        Ok(edges)
    }

    /// Turns samples into edges using the namespace's service entries.
    /// Samples repeating an edge key are summed.
    #[must_use]
    pub fn resolve_samples(
        &self,
        samples: &[Sample],
        entries: &[ServiceEntry],
        focus: Option<&NodeOptions>,
    ) -> Vec<MultiClusterEdge> {
        let mut edges: BTreeMap<(String, String, Protocol, String), MultiClusterEdge> =
            BTreeMap::new();

        for raw in samples {
            let Some(sample) = FederatedSample::read(raw, self.config) else {
                trace!("Skipping multi-cluster sample with missing labels");
                continue;
            };
            if focus.is_some_and(|node| !sample.concerns(node)) {
                continue;
            }
            if !self.config.is_federation_host(sample.host) {
                continue;
            }
            let entry = entries
                .iter()
                .find(|e| e.hosts.iter().any(|h| h == sample.host));
            let Some(entry) = entry else {
                continue;
            };
            if entry.endpoints.is_empty() {
                continue;
            }

            let source_key = NodeKey::workload(
                sample.source_namespace,
                sample.source_workload,
                sample.source_app,
                sample.source_version,
            );
            let Some((source, _)) = source_key.try_id(GraphType::VersionedApp) else {
                continue;
            };
            let service = sample.host.split('.').next().unwrap_or_default();
            let dest = format!("svc_{}_{service}", sample.dest_service_namespace);

            let share_percent = 100.0 / entry.endpoints.len() as f64;

            for cluster in self.target_clusters(entry) {
                let key = (source.clone(), dest.clone(), sample.protocol, cluster.to_string());
                edges
                    .entry(key)
                    .and_modify(|edge| edge.rate += sample.value)
                    .or_insert_with(|| MultiClusterEdge {
                        source: source.clone(),
                        dest: dest.clone(),
                        protocol: sample.protocol,
                        rate: sample.value,
                        share_percent,
                        response_code: sample.code.to_string(),
                        from_cluster: self.current.to_string(),
                        to_cluster: cluster.to_string(),
                        host: sample.host.to_string(),
                    });
            }
        }

        edges.into_values().collect()
    }

    /// Clusters whose gateway address is an endpoint of `entry`, excluding
    /// the current cluster.
    fn target_clusters<'e>(&'e self, entry: &'e ServiceEntry) -> impl Iterator<Item = &'e str> {
        self.clusters
            .iter()
            .filter(|(name, _)| name.as_str() != self.current)
            .filter(|(_, address)| entry.endpoints.iter().any(|e| &e.address == *address))
            .map(|(name, _)| name.as_str())
    }
}

/// The labels a federated request sample must carry.
#[derive(Debug, Clone, Copy)]
struct FederatedSample<'a> {
    source_namespace: &'a str,
    source_workload: &'a str,
    source_app: &'a str,
    source_version: &'a str,
    dest_service_namespace: &'a str,
    dest_app: &'a str,
    host: &'a str,
    protocol: Protocol,
    code: &'a str,
    value: f64,
}

impl<'a> FederatedSample<'a> {
    fn read(sample: &'a Sample, config: &EngineConfig) -> Option<Self> {
        sample.label(labels::DESTINATION_WORKLOAD)?;
        Some(Self {
            source_namespace: sample.label(labels::SOURCE_WORKLOAD_NAMESPACE)?,
            source_workload: sample.label(labels::SOURCE_WORKLOAD)?,
            source_app: sample.label(&labels::source(&config.labels.app))?,
            source_version: sample.label(&labels::source(&config.labels.version))?,
            dest_service_namespace: sample
                .label(labels::DESTINATION_SERVICE_NAMESPACE)
                .unwrap_or_default(),
            dest_app: sample
                .label(&labels::destination(&config.labels.app))
                .unwrap_or_default(),
            host: sample.label(labels::DESTINATION_SERVICE)?,
            protocol: Protocol::parse(sample.label(labels::REQUEST_PROTOCOL)?)?,
            code: sample.label(labels::RESPONSE_CODE).unwrap_or_default(),
            value: sample.value,
        })
    }

    /// Whether the request involves the node of a node-detail graph.
    fn concerns(&self, node: &NodeOptions) -> bool {
        if !node.app.is_empty() {
            return self.source_app == node.app || self.dest_app == node.app;
        }
        if !node.service.is_empty() {
            return self.host.split('.').next() == Some(node.service.as_str());
        }
        !node.workload.is_empty() && self.source_workload == node.workload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MeshLocation;
    use crate::sample::fixtures::RawSample;

    fn clusters() -> BTreeMap<String, String> {
        [("c1", "10.0.1.1"), ("c2", "10.0.2.1"), ("c3", "10.0.3.1")]
            .into_iter()
            .map(|(name, address)| (name.to_string(), address.to_string()))
            .collect()
    }

    fn entries() -> Vec<ServiceEntry> {
        vec![
            ServiceEntry::new("reviews-global", MeshLocation::MeshInternal)
                .with_host("reviews.bookinfo.global")
                .with_endpoint("10.0.2.1")
                .with_endpoint("10.0.3.1"),
        ]
    }

    fn federated(host: &str, value: f64) -> Sample {
        RawSample::request(
            ("bookinfo", "productpage-v1", "productpage", "v1"),
            ("bookinfo", "unknown", "unknown", "unknown"),
            host,
            value,
        )
        .with("destination_service", host)
        .build()
    }

    #[test]
    fn test_two_target_clusters_split_evenly() {
        let config = EngineConfig::default();
        let clusters = clusters();
        let resolver = MultiClusterResolver::new(&config, &clusters, "c1");

        let samples = [federated("reviews.bookinfo.global", 10.0)];
        let edges = resolver.resolve_samples(&samples, &entries(), None);

        assert_eq!(edges.len(), 2);
        let targets: Vec<&str> = edges.iter().map(|e| e.to_cluster.as_str()).collect();
        assert_eq!(targets, vec!["c2", "c3"]);
        for edge in &edges {
            assert_eq!(edge.source, "vapp_bookinfo_productpage-v1");
            assert_eq!(edge.dest, "svc_bookinfo_reviews");
            assert_eq!(edge.from_cluster, "c1");
            assert!((edge.rate - 10.0).abs() < f64::EPSILON);
            assert!((edge.share_percent - 50.0).abs() < f64::EPSILON);
            assert_eq!(edge.response_code, "200");
        }
    }

    #[test]
    fn test_current_cluster_excluded() {
        let config = EngineConfig::default();
        let clusters = clusters();
        let resolver = MultiClusterResolver::new(&config, &clusters, "c2");
        let samples = [federated("reviews.bookinfo.global", 4.0)];
        let edges = resolver.resolve_samples(&samples, &entries(), None);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].to_cluster, "c3");
    }

    #[test]
    fn test_repeated_samples_summed() {
        let config = EngineConfig::default();
        let clusters = clusters();
        let resolver = MultiClusterResolver::new(&config, &clusters, "c1");
        let samples = [
            federated("reviews.bookinfo.global", 3.0),
            federated("reviews.bookinfo.global", 2.0),
        ];
        let edges = resolver.resolve_samples(&samples, &entries(), None);
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|e| (e.rate - 5.0).abs() < f64::EPSILON));
    }

    #[test]
    fn test_non_federation_hosts_ignored() {
        let config = EngineConfig::default();
        let clusters = clusters();
        let entries = vec![
            ServiceEntry::new("odd", MeshLocation::MeshInternal)
                .with_host("reviews.bookinfo.svc.global")
                .with_endpoint("10.0.2.1"),
        ];
        let resolver = MultiClusterResolver::new(&config, &clusters, "c1");
        let samples = [federated("reviews.bookinfo.svc.global", 1.0)];
        let edges = resolver.resolve_samples(&samples, &entries, None);
        assert!(edges.is_empty());
    }

    #[test]
    fn test_unmatched_host_and_missing_labels_ignored() {
        let config = EngineConfig::default();
        let clusters = clusters();
        let resolver = MultiClusterResolver::new(&config, &clusters, "c1");
        let incomplete = RawSample::request(
            ("bookinfo", "productpage-v1", "productpage", "v1"),
            ("bookinfo", "unknown", "unknown", "unknown"),
            "reviews.bookinfo.global",
            1.0,
        )
        .with("destination_service", "reviews.bookinfo.global")
        .without("source_version")
        .build();
        let samples = [federated("ratings.bookinfo.global", 1.0), incomplete];
        assert!(resolver.resolve_samples(&samples, &entries(), None).is_empty());
    }

    #[test]
    fn test_node_focus_filters_by_service() {
        let config = EngineConfig::default();
        let clusters = clusters();
        let resolver = MultiClusterResolver::new(&config, &clusters, "c1");
        let samples = [federated("reviews.bookinfo.global", 1.0)];

        let reviews = NodeOptions {
            namespace: "bookinfo".to_string(),
            service: "reviews".to_string(),
            ..NodeOptions::default()
        };
        assert_eq!(resolver.resolve_samples(&samples, &entries(), Some(&reviews)).len(), 2);

        let ratings = NodeOptions {
            service: "ratings".to_string(),
            ..reviews
        };
        assert!(resolver.resolve_samples(&samples, &entries(), Some(&ratings)).is_empty());
    }

    #[test]
    fn test_selector_targets_federation_suffix() {
        let config = EngineConfig::default();
        let clusters = clusters();
        let resolver = MultiClusterResolver::new(&config, &clusters, "c1");
        let info = NamespaceInfo::new("bookinfo", std::time::Duration::from_secs(600), false);
        let selector = resolver.selector(&info);
        assert_eq!(selector.metric, MetricKind::RequestBytesCount);
        assert!(selector.matches(&federated("reviews.bookinfo.global", 1.0)));
        assert!(!selector.matches(&federated("reviews", 1.0)));
    }
}
