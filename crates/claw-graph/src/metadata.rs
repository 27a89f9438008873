//! Typed metadata carried by nodes and edges.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::Protocol;

/// Rate totals split into response classes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseRates {
    /// Total request (or byte) rate.
    pub total: f64,
    /// HTTP 3xx rate.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub rate_3xx: f64,
    /// HTTP 4xx rate.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub rate_4xx: f64,
    /// HTTP 5xx rate.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub rate_5xx: f64,
    /// gRPC non-OK rate.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub rate_grpc_err: f64,
    /// Requests that received no response.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub rate_no_response: f64,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(value: &f64) -> bool {
    *value == 0.0
}

impl ResponseRates {
    /// Adds a sample, bucketing it by response class.
    pub fn record(&mut self, protocol: Protocol, code: &str, value: f64) {
        self.total += value;
        match protocol {
            Protocol::Http => match code.as_bytes().first() {
                Some(b'3') => self.rate_3xx += value,
                Some(b'4') => self.rate_4xx += value,
                Some(b'5') => self.rate_5xx += value,
                _ if code == "0" || code == "-" => self.rate_no_response += value,
                _ => {}
            },
            Protocol::Grpc => match code {
                "0" | "200" => {}
                "-" => self.rate_no_response += value,
                _ => self.rate_grpc_err += value,
            },
            Protocol::Tcp => {}
        }
    }

    /// Adds every bucket of `other` into `self`.
    pub fn merge(&mut self, other: &Self) {
        self.total += other.total;
        self.rate_3xx += other.rate_3xx;
        self.rate_4xx += other.rate_4xx;
        self.rate_5xx += other.rate_5xx;
        self.rate_grpc_err += other.rate_grpc_err;
        self.rate_no_response += other.rate_no_response;
    }

    /// Error rate: 4xx + 5xx + gRPC errors + no-response.
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        self.rate_4xx + self.rate_5xx + self.rate_grpc_err + self.rate_no_response
    }
}

/// Inbound and outbound traffic of one protocol at a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolTraffic {
    /// Traffic received.
    #[serde(rename = "in")]
    pub inbound: ResponseRates,
    /// Traffic sent.
    #[serde(rename = "out")]
    pub outbound: f64,
}

/// Per-protocol node traffic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeTraffic(BTreeMap<Protocol, ProtocolTraffic>);

impl NodeTraffic {
    /// Records traffic received by the node.
    pub fn record_inbound(&mut self, protocol: Protocol, code: &str, value: f64) {
        self.0.entry(protocol).or_default().inbound.record(protocol, code, value);
    }

    /// Records traffic sent by the node.
    pub fn record_outbound(&mut self, protocol: Protocol, value: f64) {
        self.0.entry(protocol).or_default().outbound += value;
    }

    /// Seeds a zero-valued entry for `protocol`.
    pub fn touch(&mut self, protocol: Protocol) {
        self.0.entry(protocol).or_default();
    }

    /// Returns the traffic recorded for a protocol.
    #[must_use]
    pub fn get(&self, protocol: Protocol) -> Option<&ProtocolTraffic> {
        self.0.get(&protocol)
    }

    /// Returns true when any inbound or outbound rate is positive.
    #[must_use]
    pub fn has_traffic(&self) -> bool {
        self.0
            .values()
            .any(|t| t.inbound.total > 0.0 || t.outbound > 0.0)
    }

    /// Adds all of `other` into `self`.
    pub fn merge(&mut self, other: &Self) {
        for (protocol, traffic) in &other.0 {
            let entry = self.0.entry(*protocol).or_default();
            entry.inbound.merge(&traffic.inbound);
            entry.outbound += traffic.outbound;
        }
    }
}

/// Location of a declared service entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeshLocation {
    /// Outside the mesh.
    #[default]
    MeshExternal,
    /// Inside the mesh, e.g. another cluster.
    MeshInternal,
}

/// A `(namespace, name)` pair naming a declared service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceName {
    /// Service namespace.
    pub namespace: String,
    /// Service name.
    pub name: String,
}

impl ServiceName {
    /// Creates a service name.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Returns `<namespace> <name>`, the key used in destination-service sets.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{} {}", self.namespace, self.name)
    }
}

/// Metadata attached to a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct NodeMetadata {
    /// Observed traffic per protocol.
    pub traffic: NodeTraffic,
    /// Declared services this node received traffic for.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dest_services: BTreeMap<String, ServiceName>,
    /// Backing workload exists but has no pods.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_dead: bool,
    /// Placeholder for a declared but traffic-free service or workload.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_unused: bool,
    /// Traffic generator: sends but never receives.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_root: bool,
    /// Node lives outside the requested namespaces.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_outside: bool,
    /// Node cannot be inspected by the caller.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_inaccessible: bool,
    /// Node is one of the mesh's egress sentinels.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_egress_cluster: bool,
    /// Node aggregates hosts of a declared service entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_service_entry: Option<MeshLocation>,
    /// Label mismatch observed across samples, e.g. `labels=[app version]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_misconfigured: Option<String>,
    /// A backing workload lacks the mesh sidecar.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub has_missing_sidecar: bool,
    /// A virtual service routes to this node.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub has_virtual_service: bool,
    /// A destination rule configures circuit breaking for this node.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub has_circuit_breaker: bool,
    /// Pod count of the backing workload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
    /// Whether the backing workload carries the mesh sidecar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_sidecar: Option<bool>,
    /// Set once the backing workload was found in inventory.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_healthy: bool,
    /// Labels of the backing workload.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Appender-private scratch data.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl NodeMetadata {
    /// Metadata for an unused placeholder: zero HTTP in/out.
    #[must_use]
    pub fn unused() -> Self {
        let mut metadata = Self {
            is_unused: true,
            ..Self::default()
        };
        metadata.traffic.touch(Protocol::Http);
        metadata
    }

    /// Records a declared destination service.
    pub fn add_dest_service(&mut self, service: ServiceName) {
        self.dest_services.insert(service.key(), service);
    }
}

/// Traffic carried by an edge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeTraffic {
    /// Totals by response class.
    pub rates: ResponseRates,
    /// Rate by response code, then response flags.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub responses: BTreeMap<String, BTreeMap<String, f64>>,
    /// Rate by requested host.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hosts: BTreeMap<String, f64>,
}

impl EdgeTraffic {
    /// Adds all of `other` into `self`.
    pub fn merge(&mut self, other: &Self) {
        self.rates.merge(&other.rates);
        for (code, flags) in &other.responses {
            let entry = self.responses.entry(code.clone()).or_default();
            for (flag, rate) in flags {
                *entry.entry(flag.clone()).or_default() += rate;
            }
        }
        for (host, rate) in &other.hosts {
            *self.hosts.entry(host.clone()).or_default() += rate;
        }
    }
}

/// Metadata attached to an edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeMetadata {
    /// Edge protocol. Always set.
    pub protocol: Protocol,
    /// Observed traffic.
    pub traffic: EdgeTraffic,
    /// Response time at the requested quantile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<f64>,
    /// Share of requests secured by mutual TLS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtls_percent: Option<f64>,
}

impl EdgeMetadata {
    /// Creates empty metadata for a protocol.
    #[must_use]
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            traffic: EdgeTraffic::default(),
            response_time_ms: None,
            mtls_percent: None,
        }
    }

    /// Adds one telemetry sample.
    pub fn record(&mut self, code: &str, flags: &str, host: &str, value: f64) {
        self.traffic.rates.record(self.protocol, code, value);
        if self.protocol != Protocol::Tcp {
            *self
                .traffic
                .responses
                .entry(code.to_string())
                .or_default()
                .entry(flags.to_string())
                .or_default() += value;
        }
        if !host.is_empty() {
            *self.traffic.hosts.entry(host.to_string()).or_default() += value;
        }
    }

    /// Total edge rate.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.traffic.rates.total
    }
}
