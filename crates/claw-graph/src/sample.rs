//! Reading traffic samples into identity tuples.
//!
//! The map builder and the edge annotators need the same view of a
//! sample: the source and destination tuples, sanitized the same way.

use std::fmt;

use crate::config::{EngineConfig, LabelNames};
use crate::identity::{NodeKey, UNKNOWN, is_ok};
use crate::telemetry::{Sample, labels};
use crate::types::{GraphType, NodeKind, Protocol};

/// Which label set a sample is expected to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleShape {
    /// Request counters: protocol, response code and flags.
    Requests,
    /// TCP byte counters: flags only, protocol is implied.
    Tcp,
    /// Per-edge annotations: protocol only.
    Annotation,
}

/// Why a sample was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// A required label is absent.
    MissingLabel(String),
    /// The protocol label is not one the graph understands.
    UnknownProtocol(String),
    /// The source namespace is known but its workload is not.
    BadSource,
    /// The destination is a raw host the proxy could not resolve.
    BadDestination,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingLabel(label) => write!(f, "missing label {label}"),
            Self::UnknownProtocol(p) => write!(f, "unknown protocol {p}"),
            Self::BadSource => f.write_str("bad source telemetry"),
            Self::BadDestination => f.write_str("bad destination telemetry"),
        }
    }
}

/// A sanitized traffic sample, borrowing from the raw [`Sample`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrafficSample<'a> {
    /// Source workload namespace.
    pub source_namespace: &'a str,
    /// Source workload.
    pub source_workload: &'a str,
    /// Source app label.
    pub source_app: &'a str,
    /// Source version label.
    pub source_version: &'a str,
    /// Destination service namespace.
    pub dest_service_namespace: &'a str,
    /// Destination host as reported.
    pub dest_host: &'a str,
    /// Declared destination service name.
    pub dest_service: &'a str,
    /// Destination workload namespace.
    pub dest_workload_namespace: &'a str,
    /// Destination workload.
    pub dest_workload: &'a str,
    /// Destination app label.
    pub dest_app: &'a str,
    /// Destination version label.
    pub dest_version: &'a str,
    /// Protocol.
    pub protocol: Protocol,
    /// Response code, with gRPC status substituted where meaningful.
    pub code: &'a str,
    /// Response flags.
    pub flags: &'a str,
    /// Sample value.
    pub value: f64,
}

fn required<'a>(sample: &'a Sample, label: &str) -> Result<&'a str, Rejection> {
    sample
        .label(label)
        .ok_or_else(|| Rejection::MissingLabel(label.to_string()))
}

impl<'a> TrafficSample<'a> {
    /// Reads and sanitizes a sample.
    ///
    /// # Errors
    ///
    /// Returns the [`Rejection`] explaining why the sample cannot be used.
    pub fn parse(
        sample: &'a Sample,
        shape: SampleShape,
        config: &EngineConfig,
    ) -> Result<Self, Rejection> {
        let names: &LabelNames = &config.labels;
        let source_app_label = labels::source(&names.app);
        let source_version_label = labels::source(&names.version);
        let dest_app_label = labels::destination(&names.app);
        let dest_version_label = labels::destination(&names.version);

        let source_namespace = required(sample, labels::SOURCE_WORKLOAD_NAMESPACE)?;
        let source_workload = required(sample, labels::SOURCE_WORKLOAD)?;
        let source_app = required(sample, &source_app_label)?;
        let source_version = required(sample, &source_version_label)?;
        let raw_service_namespace = required(sample, labels::DESTINATION_SERVICE_NAMESPACE)?;
        let dest_host = required(sample, labels::DESTINATION_SERVICE)?;
        let raw_service = required(sample, labels::DESTINATION_SERVICE_NAME)?;
        let dest_workload_namespace = required(sample, labels::DESTINATION_WORKLOAD_NAMESPACE)?;
        let dest_workload = required(sample, labels::DESTINATION_WORKLOAD)?;
        let dest_app = required(sample, &dest_app_label)?;
        let dest_version = required(sample, &dest_version_label)?;

        let (protocol, code, flags) = match shape {
            SampleShape::Requests => {
                let raw = required(sample, labels::REQUEST_PROTOCOL)?;
                let protocol = Protocol::parse(raw)
                    .ok_or_else(|| Rejection::UnknownProtocol(raw.to_string()))?;
                let code = required(sample, labels::RESPONSE_CODE)?;
                let flags = required(sample, labels::RESPONSE_FLAGS)?;
                let grpc_status = sample.label(labels::GRPC_RESPONSE_STATUS);
                let code = response_code(protocol, code, grpc_status);
                (protocol, code, flags)
            }
            SampleShape::Tcp => (Protocol::Tcp, "", required(sample, labels::RESPONSE_FLAGS)?),
            SampleShape::Annotation => {
                let raw = required(sample, labels::REQUEST_PROTOCOL)?;
                let protocol = Protocol::parse(raw)
                    .ok_or_else(|| Rejection::UnknownProtocol(raw.to_string()))?;
                (protocol, "", "")
            }
        };

        if is_ok(source_namespace) && !is_ok(source_workload) {
            return Err(Rejection::BadSource);
        }

        let (dest_service_namespace, dest_service) = federated_destination(
            source_namespace,
            source_workload,
            raw_service_namespace,
            raw_service,
            config,
        );

        if !is_ok(dest_workload)
            && is_ok(dest_host)
            && is_ok(dest_service)
            && dest_host == dest_service
        {
            return Err(Rejection::BadDestination);
        }

        Ok(Self {
            source_namespace,
            source_workload,
            source_app,
            source_version,
            dest_service_namespace,
            dest_host,
            dest_service,
            dest_workload_namespace,
            dest_workload,
            dest_app,
            dest_version,
            protocol,
            code,
            flags,
            value: sample.value,
        })
    }

    /// Identity tuple of the calling side.
    #[must_use]
    pub const fn source_key(&self) -> NodeKey<'a> {
        NodeKey::workload(
            self.source_namespace,
            self.source_workload,
            self.source_app,
            self.source_version,
        )
    }

    /// Identity tuple of the receiving side.
    #[must_use]
    pub const fn dest_key(&self) -> NodeKey<'a> {
        NodeKey {
            service_namespace: self.dest_service_namespace,
            service: self.dest_service,
            workload_namespace: self.dest_workload_namespace,
            workload: self.dest_workload,
            app: self.dest_app,
            version: self.dest_version,
        }
    }

    /// Identity tuple of the declared destination service.
    #[must_use]
    pub const fn service_key(&self) -> NodeKey<'a> {
        NodeKey::service(self.dest_service_namespace, self.dest_service)
    }

    /// The hops this sample contributes: source to destination, or source to
    /// service and service to destination when a service node is injected.
    ///
    /// A service node is injected only when requested, when the declared
    /// service name is known and when the destination would not already
    /// resolve to a service node.
    #[must_use]
    pub fn hops(
        &self,
        graph_type: GraphType,
        inject_service_nodes: bool,
    ) -> Vec<(NodeKey<'a>, NodeKey<'a>)> {
        let inject = inject_service_nodes
            && is_ok(self.dest_service)
            && self
                .dest_key()
                .try_id(graph_type)
                .is_some_and(|(_, kind)| kind != NodeKind::Service);
        if inject {
            vec![
                (self.source_key(), self.service_key()),
                (self.service_key(), self.dest_key()),
            ]
        } else {
            vec![(self.source_key(), self.dest_key())]
        }
    }

    /// Source and destination IDs of each hop that resolves on both sides.
    #[must_use]
    pub fn edge_ids(
        &self,
        graph_type: GraphType,
        inject_service_nodes: bool,
    ) -> Vec<(String, String)> {
        self.hops(graph_type, inject_service_nodes)
            .into_iter()
            .filter_map(|(source, dest)| {
                let (source_id, _) = source.try_id(graph_type)?;
                let (dest_id, _) = dest.try_id(graph_type)?;
                Some((source_id, dest_id))
            })
            .collect()
    }
}

/// Uses the gRPC status as the response code for gRPC requests that
/// completed at the HTTP layer.
fn response_code<'a>(protocol: Protocol, code: &'a str, grpc_status: Option<&'a str>) -> &'a str {
    match grpc_status {
        Some(status) if protocol == Protocol::Grpc && is_ok(status) && code == "200" => status,
        _ => code,
    }
}

/// Requests of unknown origin addressed to `<name>.<ns>.<federation suffix>`
/// are reported against the federation host; attribute them to the
/// service it names.
fn federated_destination<'a>(
    source_namespace: &str,
    source_workload: &str,
    service_namespace: &'a str,
    service: &'a str,
    config: &EngineConfig,
) -> (&'a str, &'a str) {
    if source_namespace != UNKNOWN
        || source_workload != UNKNOWN
        || !config.is_federation_host(service)
    {
        return (service_namespace, service);
    }
    let mut parts = service.split('.');
    match (parts.next(), parts.next()) {
        (Some(name), Some(namespace)) => (namespace, name),
        _ => (service_namespace, service),
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::RawSample;
    use super::*;
    use test_case::test_case;

    fn productpage_to_reviews() -> RawSample {
        RawSample::request(
            ("bookinfo", "productpage-v1", "productpage", "v1"),
            ("bookinfo", "reviews-v1", "reviews", "v1"),
            "reviews",
            5.0,
        )
    }

    #[test]
    fn test_parse_complete_sample() {
        let raw = productpage_to_reviews().build();
        let parsed = TrafficSample::parse(&raw, SampleShape::Requests, &EngineConfig::default());
        let sample = match parsed {
            Ok(sample) => sample,
            Err(e) => unreachable!("sample should parse: {e}"),
        };
        assert_eq!(sample.protocol, Protocol::Http);
        assert_eq!(sample.code, "200");
        let id = |key: NodeKey<'_>| key.try_id(GraphType::Workload).map(|(id, _)| id);
        assert_eq!(id(sample.source_key()).as_deref(), Some("wl_bookinfo_productpage-v1"));
        assert_eq!(id(sample.dest_key()).as_deref(), Some("wl_bookinfo_reviews-v1"));
    }

    #[test]
    fn test_missing_label_rejected() {
        let raw = productpage_to_reviews().without("destination_version").build();
        let parsed = TrafficSample::parse(&raw, SampleShape::Requests, &EngineConfig::default());
        assert_eq!(parsed, Err(Rejection::MissingLabel("destination_version".to_string())));
    }

    #[test]
    fn test_tcp_shape_needs_no_code() {
        let raw = productpage_to_reviews()
            .without("response_code")
            .without("request_protocol")
            .build();
        let parsed = TrafficSample::parse(&raw, SampleShape::Tcp, &EngineConfig::default());
        assert_eq!(parsed.map(|s| s.protocol), Ok(Protocol::Tcp));
    }

    #[test]
    fn test_bad_source_rejected() {
        let raw = productpage_to_reviews().with("source_workload", "unknown").build();
        let parsed = TrafficSample::parse(&raw, SampleShape::Requests, &EngineConfig::default());
        assert_eq!(parsed, Err(Rejection::BadSource));
    }

    #[test]
    fn test_bad_destination_rejected() {
        let raw = productpage_to_reviews()
            .with("destination_workload", "unknown")
            .with("destination_service", "10.0.0.7:9080")
            .with("destination_service_name", "10.0.0.7:9080")
            .build();
        let parsed = TrafficSample::parse(&raw, SampleShape::Requests, &EngineConfig::default());
        assert_eq!(parsed, Err(Rejection::BadDestination));
    }

    #[test]
    fn test_federated_destination_rewritten() {
        let raw = productpage_to_reviews()
            .with("source_workload_namespace", "unknown")
            .with("source_workload", "unknown")
            .with("destination_service_namespace", "istio-system")
            .with("destination_service_name", "ratings.bookinfo.global")
            .build();
        let parsed = TrafficSample::parse(&raw, SampleShape::Requests, &EngineConfig::default());
        let sample = match parsed {
            Ok(sample) => sample,
            Err(e) => unreachable!("sample should parse: {e}"),
        };
        assert_eq!(sample.dest_service_namespace, "bookinfo");
        assert_eq!(sample.dest_service, "ratings");
    }

    #[test_case("grpc", "200", Some("14"), "14" ; "grpc status replaces 200")]
    #[test_case("grpc", "503", Some("14"), "503" ; "http failure kept")]
    #[test_case("grpc", "200", None, "200" ; "no grpc status")]
    #[test_case("http", "200", Some("14"), "200" ; "http ignores grpc status")]
    fn test_response_code(protocol: &str, code: &str, grpc: Option<&str>, expected: &str) {
        let mut raw = productpage_to_reviews()
            .with("request_protocol", protocol)
            .with("response_code", code);
        if let Some(status) = grpc {
            raw = raw.with("grpc_response_status", status);
        }
        let raw = raw.build();
        let parsed = TrafficSample::parse(&raw, SampleShape::Requests, &EngineConfig::default());
        assert_eq!(parsed.map(|s| s.code), Ok(expected));
    }

    #[test]
    fn test_hops_inject_service() {
        let raw = productpage_to_reviews().build();
        let config = EngineConfig::default();
        let Ok(sample) = TrafficSample::parse(&raw, SampleShape::Requests, &config) else {
            unreachable!("sample should parse")
        };
        assert_eq!(sample.hops(GraphType::Workload, false).len(), 1);
        let hops = sample.hops(GraphType::Workload, true);
        assert_eq!(hops.len(), 2);
        assert_eq!(hops[0].1, NodeKey::service("bookinfo", "reviews"));
        assert_eq!(hops[1].0, NodeKey::service("bookinfo", "reviews"));
    }

    #[test]
    fn test_hops_no_injection_for_service_destination() {
        let raw = productpage_to_reviews()
            .with("destination_workload", "unknown")
            .with("destination_app", "unknown")
            .with("destination_version", "unknown")
            .build();
        let config = EngineConfig::default();
        let Ok(sample) = TrafficSample::parse(&raw, SampleShape::Requests, &config) else {
            unreachable!("sample should parse")
        };
        assert_eq!(sample.hops(GraphType::Workload, true).len(), 1);
    }
}
