//! Core vocabulary types shared by every stage of graph construction.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Granularity of the graph being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum GraphType {
    /// One node per workload.
    #[default]
    Workload,
    /// One node per app label.
    App,
    /// One node per app and version.
    VersionedApp,
    /// Service-to-service edges only.
    Service,
}

impl GraphType {
    /// Returns the wire name of the graph type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Workload => "workload",
            Self::App => "app",
            Self::VersionedApp => "versionedApp",
            Self::Service => "service",
        }
    }

    /// Returns true for the app-based graph types.
    #[must_use]
    pub const fn is_app_based(self) -> bool {
        matches!(self, Self::App | Self::VersionedApp)
    }
}

impl fmt::Display for GraphType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GraphType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "workload" => Ok(Self::Workload),
            "app" => Ok(Self::App),
            "versionedApp" => Ok(Self::VersionedApp),
            "service" => Ok(Self::Service),
            other => Err(GraphError::bad_request(format!(
                "Invalid graphType [{other}]"
            ))),
        }
    }
}

/// Kind of a resolved graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A workload (deployment, stateful set, ...).
    Workload,
    /// An app, optionally versioned.
    App,
    /// A service.
    Service,
    /// Traffic of unidentifiable origin.
    Unknown,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Workload => write!(f, "workload"),
            Self::App => write!(f, "app"),
            Self::Service => write!(f, "service"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Request protocol carried by an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Plain HTTP.
    Http,
    /// gRPC over HTTP/2.
    Grpc,
    /// Raw TCP.
    Tcp,
}

impl Protocol {
    /// Parses a `request_protocol` label value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "http" => Some(Self::Http),
            "grpc" => Some(Self::Grpc),
            "tcp" => Some(Self::Tcp),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::Grpc => write!(f, "grpc"),
            Self::Tcp => write!(f, "tcp"),
        }
    }
}

/// A namespace selected for graphing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceInfo {
    /// Namespace name.
    pub name: String,
    /// Query window, already clamped to the namespace lifetime.
    pub duration: Duration,
    /// Whether the namespace hosts mesh control-plane components.
    pub is_mesh_infra: bool,
}

impl NamespaceInfo {
    /// Creates namespace info.
    #[must_use]
    pub fn new(name: impl Into<String>, duration: Duration, is_mesh_infra: bool) -> Self {
        Self {
            name: name.into(),
            duration,
            is_mesh_infra,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("workload", GraphType::Workload ; "workload")]
    #[test_case("app", GraphType::App ; "app")]
    #[test_case("versionedApp", GraphType::VersionedApp ; "versioned app")]
    #[test_case("service", GraphType::Service ; "service")]
    fn test_graph_type_round_trip(raw: &str, expected: GraphType) {
        let parsed: GraphType = raw.parse().ok().unwrap_or_default();
        assert_eq!(parsed, expected);
        assert_eq!(parsed.to_string(), raw);
    }

    #[test]
    fn test_graph_type_rejects_unknown() {
        let err = "versionedapp".parse::<GraphType>();
        assert!(matches!(err, Err(GraphError::BadRequest(_))));
    }

    #[test]
    fn test_graph_type_serde_names() {
        let json = serde_json::to_string(&GraphType::VersionedApp).ok();
        assert_eq!(json.as_deref(), Some("\"versionedApp\""));
    }

    #[test]
    fn test_protocol_parse() {
        assert_eq!(Protocol::parse("http"), Some(Protocol::Http));
        assert_eq!(Protocol::parse("grpc"), Some(Protocol::Grpc));
        assert_eq!(Protocol::parse("tcp"), Some(Protocol::Tcp));
        assert_eq!(Protocol::parse("udp"), None);
    }

    #[test]
    fn test_node_kind_display() {
        assert_eq!(NodeKind::Service.to_string(), "service");
        assert_eq!(NodeKind::Unknown.to_string(), "unknown");
    }
}
