//! `securityPolicy`: attach mTLS percentages to edges.

use std::collections::HashMap;

use tracing::{debug, trace};

use super::{AppenderContext, edge_selectors};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::inventory::InventorySource;
use crate::sample::{SampleShape, TrafficSample};
use crate::telemetry::{MetricKind, Sample, TelemetrySource, labels};
use crate::traffic::TrafficMap;
use crate::types::{GraphType, Protocol};

/// Label value marking a mutually authenticated connection.
pub const MUTUAL_TLS: &str = "mutual_tls";

/// Sets `mtls_percent` on each edge: the share of its traffic, as
/// reported by the destination, carried over mutual TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityPolicyAppender {
    /// Graph type of the request.
    pub graph_type: GraphType,
    /// Whether service nodes were injected.
    pub inject_service_nodes: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct PolicyRates {
    total: f64,
    mutual: f64,
}

impl SecurityPolicyAppender {
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
        let mut http = Vec::new();
        let mut tcp = Vec::new();
        let metrics = [
            (MetricKind::Requests, &mut http),
            (MetricKind::TcpSentBytes, &mut tcp),
        ];
        for (metric, sink) in metrics {
            for selector in edge_selectors(metric, ctx.namespace.info()) {
                let samples = ctx
                    .query
                    .bounded(
                        "security policy query",
                        ctx.telemetry.query(&selector, ctx.options.query_time),
                    )
                    .await?;
                sink.extend(samples);
            }
        }
        let annotated = self.apply(map, &http, &tcp, ctx.config);
        debug!(namespace = %ctx.namespace.name(), annotated, "Annotated security policy");
        Ok(())
    }

    /// Annotates edges from request and TCP samples grouped by connection
    /// security policy. Returns the number of edges annotated.
    pub fn apply(
        &self,
        map: &mut TrafficMap,
        requests: &[Sample],
        tcp: &[Sample],
        config: &EngineConfig,
    ) -> usize {
        let mut rates: HashMap<(String, String, Protocol), PolicyRates> = HashMap::new();
        let batches = [(requests, SampleShape::Annotation), (tcp, SampleShape::Tcp)];
        for (samples, shape) in batches {
            for raw in samples {
                let sample = match TrafficSample::parse(raw, shape, config) {
                    Ok(sample) => sample,
                    Err(reason) => {
                        trace!(reason = %reason, "Skipping security policy sample");
                        continue;
                    }
                };
                let mutual = raw.label(labels::CONNECTION_SECURITY_POLICY) == Some(MUTUAL_TLS);
                for (source, dest) in sample.edge_ids(self.graph_type, self.inject_service_nodes) {
                    let entry = rates.entry((source, dest, sample.protocol)).or_default();
                    entry.total += sample.value;
                    if mutual {
                        entry.mutual += sample.value;
                    }
                }
            }
        }

        let mut annotated = 0;
        for ((source, dest, protocol), rates) in rates {
            if rates.total <= 0.0 {
                continue;
            }
            if let Some(edge) = map.get_mut(&source).and_then(|n| n.edge_mut(&dest, protocol)) {
                edge.metadata.mtls_percent = Some(rates.mutual / rates.total * 100.0);
                annotated += 1;
            }
        }
        annotated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appender::test_support::{connect, workload_node};
    use crate::sample::fixtures::RawSample;

    fn secured(policy: &str, value: f64) -> Sample {
        RawSample::request(
            ("bookinfo", "productpage-v1", "productpage", "v1"),
            ("bookinfo", "reviews-v1", "reviews", "v1"),
            "reviews",
            value,
        )
        .with("reporter", "destination")
        .with(labels::CONNECTION_SECURITY_POLICY, policy)
        .build()
    }

    fn map() -> TrafficMap {
        let mut productpage = workload_node("bookinfo", "productpage-v1", "productpage", "v1");
        let mut reviews = workload_node("bookinfo", "reviews-v1", "reviews", "v1");
        connect(&mut productpage, &mut reviews, Protocol::Http, 4.0);
        let mut map = TrafficMap::new();
        map.insert(productpage);
        map.insert(reviews);
        map
    }

    fn appender() -> SecurityPolicyAppender {
        SecurityPolicyAppender {
            graph_type: GraphType::Workload,
            inject_service_nodes: false,
        }
    }

    #[test]
    fn test_partial_mtls() {
        let mut map = map();
        let samples = [secured(MUTUAL_TLS, 3.0), secured("none", 1.0)];
        let annotated = appender().apply(&mut map, &samples, &[], &EngineConfig::default());
        assert_eq!(annotated, 1);
        let edge = map.get("wl_bookinfo_productpage-v1").and_then(|n| n.edges.first());
        assert_eq!(edge.and_then(|e| e.metadata.mtls_percent), Some(75.0));
    }

    #[test]
    fn test_plaintext_edge_is_zero_percent() {
        let mut map = map();
        appender().apply(&mut map, &[secured("none", 2.0)], &[], &EngineConfig::default());
        let edge = map.get("wl_bookinfo_productpage-v1").and_then(|n| n.edges.first());
        assert_eq!(edge.and_then(|e| e.metadata.mtls_percent), Some(0.0));
    }

    #[test]
    fn test_edge_without_samples_untouched() {
        let mut map = map();
        let annotated = appender().apply(&mut map, &[], &[], &EngineConfig::default());
        assert_eq!(annotated, 0);
        assert!(map.edges().all(|e| e.metadata.mtls_percent.is_none()));
    }
}
