//! Telemetry source contract.
//!
//! The engine never speaks a query language. It describes what it wants
//! with a [`MetricSelector`] and a backend returns matching, already
//! rate-aggregated [`Sample`]s.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Well-known telemetry label names.
pub mod labels {
    /// Which side of the connection reported the sample.
    pub const REPORTER: &str = "reporter";
    /// Source workload namespace.
    pub const SOURCE_WORKLOAD_NAMESPACE: &str = "source_workload_namespace";
    /// Source workload.
    pub const SOURCE_WORKLOAD: &str = "source_workload";
    /// Destination service namespace.
    pub const DESTINATION_SERVICE_NAMESPACE: &str = "destination_service_namespace";
    /// Destination host, e.g. `reviews.bookinfo.svc.cluster.local`.
    pub const DESTINATION_SERVICE: &str = "destination_service";
    /// Declared destination service name.
    pub const DESTINATION_SERVICE_NAME: &str = "destination_service_name";
    /// Destination workload namespace.
    pub const DESTINATION_WORKLOAD_NAMESPACE: &str = "destination_workload_namespace";
    /// Destination workload.
    pub const DESTINATION_WORKLOAD: &str = "destination_workload";
    /// Request protocol.
    pub const REQUEST_PROTOCOL: &str = "request_protocol";
    /// HTTP response code.
    pub const RESPONSE_CODE: &str = "response_code";
    /// gRPC status code.
    pub const GRPC_RESPONSE_STATUS: &str = "grpc_response_status";
    /// Envoy response flags.
    pub const RESPONSE_FLAGS: &str = "response_flags";
    /// mTLS or none.
    pub const CONNECTION_SECURITY_POLICY: &str = "connection_security_policy";

    /// `source_<label>`, e.g. `source_app`.
    #[must_use]
    pub fn source(label: &str) -> String {
        format!("source_{label}")
    }

    /// `destination_<label>`, e.g. `destination_version`.
    #[must_use]
    pub fn destination(label: &str) -> String {
        format!("destination_{label}")
    }
}

/// A labeled numeric sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Label values.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Sample value (a per-second rate, a quantile, ...).
    pub value: f64,
}

impl Sample {
    /// Creates a sample from label pairs.
    #[must_use]
    pub fn new<I, K, V>(labels: I, value: f64) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            value,
        }
    }

    /// Returns a label value.
    #[must_use]
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }
}

/// Metric families the engine queries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Request counter.
    Requests,
    /// TCP bytes sent counter.
    TcpSentBytes,
    /// Request size histogram count.
    RequestBytesCount,
    /// Request duration at a quantile.
    ResponseTime {
        /// Quantile in (0, 1).
        quantile: f64,
    },
}

impl MetricKind {
    /// Metric name as exported by the mesh.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Requests => "istio_requests_total",
            Self::TcpSentBytes => "istio_tcp_sent_bytes_total",
            Self::RequestBytesCount => "istio_request_bytes_count",
            Self::ResponseTime { .. } => "istio_request_duration_milliseconds",
        }
    }
}

/// Which proxy reported a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reporter {
    /// The calling proxy.
    Source,
    /// The receiving proxy.
    Destination,
}

impl Reporter {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Destination => "destination",
        }
    }
}

/// Label comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOp {
    /// Label equals the value (absent counts as empty).
    Equal(String),
    /// Label differs from the value.
    NotEqual(String),
    /// Label is one of the values.
    OneOf(Vec<String>),
    /// Label is none of the values.
    NoneOf(Vec<String>),
    /// Label ends with the suffix.
    EndsWith(String),
}

/// A single label constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMatcher {
    /// Label name.
    pub label: String,
    /// Comparison.
    pub op: MatchOp,
}

impl LabelMatcher {
    /// Evaluates the matcher against a label value.
    #[must_use]
    pub fn matches(&self, value: Option<&str>) -> bool {
        let value = value.unwrap_or_default();
        match &self.op {
            MatchOp::Equal(v) => value == v,
            MatchOp::NotEqual(v) => value != v,
            MatchOp::OneOf(vs) => vs.iter().any(|v| v == value),
            MatchOp::NoneOf(vs) => vs.iter().all(|v| v != value),
            MatchOp::EndsWith(suffix) => value.ends_with(suffix.as_str()),
        }
    }
}

impl fmt::Display for LabelMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.op {
            MatchOp::Equal(v) => write!(f, "{}=\"{v}\"", self.label),
            MatchOp::NotEqual(v) => write!(f, "{}!=\"{v}\"", self.label),
            MatchOp::OneOf(vs) => write!(f, "{}=~\"{}\"", self.label, vs.join("|")),
            MatchOp::NoneOf(vs) => write!(f, "{}!~\"{}\"", self.label, vs.join("|")),
            MatchOp::EndsWith(s) => write!(f, "{}=~\".*{s}\"", self.label),
        }
    }
}

/// Describes one telemetry query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSelector {
    /// Metric family.
    pub metric: MetricKind,
    /// Required reporter, if any.
    pub reporter: Option<Reporter>,
    /// Label constraints, all of which must hold.
    pub matchers: Vec<LabelMatcher>,
    /// Rate window.
    pub range: Duration,
}

impl MetricSelector {
    /// Creates a selector with no constraints.
    #[must_use]
    pub const fn new(metric: MetricKind, range: Duration) -> Self {
        Self {
            metric,
            reporter: None,
            matchers: Vec::new(),
            range,
        }
    }

    /// Restricts the reporter.
    #[must_use]
    pub fn reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Adds a label constraint.
    #[must_use]
    pub fn matching(mut self, label: impl Into<String>, op: MatchOp) -> Self {
        self.matchers.push(LabelMatcher {
            label: label.into(),
            op,
        });
        self
    }

    /// Shorthand for an equality constraint.
    #[must_use]
    pub fn label_eq(self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.matching(label, MatchOp::Equal(value.into()))
    }

    /// Shorthand for an inequality constraint.
    #[must_use]
    pub fn label_ne(self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.matching(label, MatchOp::NotEqual(value.into()))
    }

    /// Returns true when the sample satisfies the reporter and every matcher.
    #[must_use]
    pub fn matches(&self, sample: &Sample) -> bool {
        if let Some(reporter) = self.reporter {
            if sample.label(labels::REPORTER) != Some(reporter.as_str()) {
                return false;
            }
        }
        self.matchers.iter().all(|m| m.matches(sample.label(&m.label)))
    }
}

impl fmt::Display for MetricSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.metric.name())?;
        let mut first = true;
        if let Some(reporter) = self.reporter {
            write!(f, "{}=\"{}\"", labels::REPORTER, reporter.as_str())?;
            first = false;
        }
        for matcher in &self.matchers {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{matcher}")?;
            first = false;
        }
        write!(f, "}}[{}s]", self.range.as_secs())
    }
}

/// A source of aggregated telemetry samples.
pub trait TelemetrySource: Send + Sync + 'static {
    /// Returns every sample matching `selector`, evaluated at `instant`.
    fn query(
        &self,
        selector: &MetricSelector,
        instant: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Sample>>> + Send;
}
