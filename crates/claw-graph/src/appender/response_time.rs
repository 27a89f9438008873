//! `responseTime`: attach response times to edges.

use tracing::{debug, trace};

use super::{AppenderContext, edge_selectors};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::inventory::InventorySource;
use crate::sample::{SampleShape, TrafficSample};
use crate::telemetry::{MetricKind, Sample, TelemetrySource};
use crate::traffic::TrafficMap;
use crate::types::{GraphType, Protocol};

/// Sets `response_time_ms` on HTTP and gRPC edges from the backend's
/// quantile computation. When several samples land on the same edge (an
/// injected service edge fed by many callers) the slowest one wins.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseTimeAppender {
    /// Graph type of the request.
    pub graph_type: GraphType,
    /// Whether service nodes were injected.
    pub inject_service_nodes: bool,
    /// Quantile in (0, 1).
    pub quantile: f64,
}

impl ResponseTimeAppender {
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
        let metric = MetricKind::ResponseTime {
            quantile: self.quantile,
        };
        let mut annotated = 0;
        for selector in edge_selectors(metric, ctx.namespace.info()) {
            let samples = ctx
                .query
                .bounded(
                    "response time query",
                    ctx.telemetry.query(&selector, ctx.options.query_time),
                )
                .await?;
            annotated += self.apply(map, &samples, ctx.config);
        }
        debug!(
            namespace = %ctx.namespace.name(),
            annotated,
            quantile = self.quantile,
            "Annotated response times"
        );
        Ok(())
    }

    /// Annotates edges from response-time samples. Returns the number of
    /// edge updates.
    pub fn apply(&self, map: &mut TrafficMap, samples: &[Sample], config: &EngineConfig) -> usize {
        let mut annotated = 0;
        for raw in samples {
            let sample = match TrafficSample::parse(raw, SampleShape::Annotation, config) {
                Ok(sample) => sample,
                Err(reason) => {
                    trace!(reason = %reason, "Skipping response time sample");
                    continue;
                }
            };
            if sample.protocol == Protocol::Tcp || sample.value.is_nan() {
                continue;
            }
            for (source, dest) in sample.edge_ids(self.graph_type, self.inject_service_nodes) {
                let Some(edge) = map
                    .get_mut(&source)
                    .and_then(|n| n.edge_mut(&dest, sample.protocol))
                else {
                    continue;
                };
                let slowest = edge
                    .metadata
                    .response_time_ms
                    .map_or(sample.value, |current| current.max(sample.value));
                edge.metadata.response_time_ms = Some(slowest);
                annotated += 1;
            }
        }
        annotated
    }
}
