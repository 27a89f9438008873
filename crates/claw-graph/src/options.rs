//! Validation of raw graph requests into typed options.
//!
//! Everything a request can get wrong is rejected here, before a single
//! telemetry query runs.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::appender::RequestedAppenders;
use crate::config::EngineConfig;
use crate::error::{GraphError, Result};
use crate::inventory::NamespaceRecord;
use crate::types::{GraphType, NamespaceInfo};

/// Default query window.
pub const DEFAULT_DURATION: &str = "10m";

/// A raw graph request, as received from a caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphRequest {
    /// Comma-separated namespaces.
    pub namespaces: String,
    /// Graph type name.
    pub graph_type: Option<String>,
    /// Query window, e.g. `10m` or `1h30m`.
    pub duration: Option<String>,
    /// Whether to split workload edges through service nodes.
    pub inject_service_nodes: Option<bool>,
    /// Query instant, unix seconds.
    pub query_time: Option<i64>,
    /// Comma-separated appender names.
    pub appenders: Option<String>,
    /// Response-time quantile.
    pub response_time_quantile: Option<f64>,
    /// Focus node for a node-detail graph.
    pub node: Option<NodeRequest>,
}

/// The focus of a node-detail graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeRequest {
    /// Node namespace.
    pub namespace: String,
    /// Workload name.
    pub workload: Option<String>,
    /// App name.
    pub app: Option<String>,
    /// App version.
    pub version: Option<String>,
    /// Service name.
    pub service: Option<String>,
}

/// Validated focus of a node-detail graph. Unset fields are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeOptions {
    /// Node namespace.
    pub namespace: String,
    /// Workload name.
    pub workload: String,
    /// App name.
    pub app: String,
    /// App version.
    pub version: String,
    /// Service name.
    pub service: String,
}

/// Validated graph options.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphOptions {
    /// Graph type.
    pub graph_type: GraphType,
    /// Requested window, before per-namespace clamping.
    pub duration: Duration,
    /// Whether service nodes are injected.
    pub inject_service_nodes: bool,
    /// Query instant.
    pub query_time: DateTime<Utc>,
    /// Appenders to run.
    pub appenders: RequestedAppenders,
    /// Response-time quantile.
    pub response_time_quantile: f64,
    /// Requested namespaces by name.
    pub namespaces: BTreeMap<String, NamespaceInfo>,
    /// Namespaces the caller may see, with creation times.
    pub accessible_namespaces: BTreeMap<String, Option<DateTime<Utc>>>,
    /// Focus node, for node-detail graphs.
    pub node: Option<NodeOptions>,
}

fn non_empty(value: Option<&String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

impl GraphOptions {
    /// Validates a raw request.
    ///
    /// # Errors
    ///
    /// [`GraphError::BadRequest`] for malformed parameters,
    /// [`GraphError::Forbidden`] for a namespace outside `accessible`.
    pub fn parse(
        request: &GraphRequest,
        accessible: &[NamespaceRecord],
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let graph_type = match request.graph_type.as_deref() {
            None | Some("") => GraphType::default(),
            Some(raw) => raw.parse()?,
        };

        let duration = parse_duration(request.duration.as_deref().unwrap_or(DEFAULT_DURATION))?;

        let query_time = match request.query_time {
            None => now,
            Some(secs) => DateTime::from_timestamp(secs, 0).ok_or_else(|| {
                GraphError::bad_request(format!("Invalid queryTime [{secs}]"))
            })?,
        };

        let inject_service_nodes =
            graph_type == GraphType::Service || request.inject_service_nodes.unwrap_or(false);

        let appenders = match request.appenders.as_deref() {
            None => RequestedAppenders::All,
            Some(list) => RequestedAppenders::parse(list)?,
        };

        let response_time_quantile = request
            .response_time_quantile
            .unwrap_or(config.default_quantile);
        if !(response_time_quantile > 0.0 && response_time_quantile < 1.0) {
            return Err(GraphError::bad_request(format!(
                "Invalid quantile, expecting float in (0, 1) [{response_time_quantile}]"
            )));
        }

        let accessible_namespaces: BTreeMap<String, Option<DateTime<Utc>>> = accessible
            .iter()
            .map(|ns| (ns.name.clone(), ns.created_at))
            .collect();

        let node = request
            .node
            .as_ref()
            .map(|n| validate_node(n, graph_type))
            .transpose()?;

        let requested: Vec<String> = match &node {
            Some(n) => vec![n.namespace.clone()],
            None => request
                .namespaces
                .split(',')
                .map(str::trim)
                .filter(|ns| !ns.is_empty())
                .map(str::to_string)
                .collect(),
        };
        if requested.is_empty() {
            return Err(GraphError::bad_request(
                "At least one namespace must be specified via the namespaces parameter",
            ));
        }

        let mut namespaces = BTreeMap::new();
        for name in requested {
            let Some(created_at) = accessible_namespaces.get(&name) else {
                return Err(GraphError::Forbidden(name));
            };
            let safe = safe_namespace_duration(&name, *created_at, duration, query_time)?;
            let info = NamespaceInfo::new(name.clone(), safe, config.is_mesh_namespace(&name));
            namespaces.insert(name, info);
        }

        Ok(Self {
            graph_type,
            duration,
            inject_service_nodes,
            query_time,
            appenders,
            response_time_quantile,
            namespaces,
            accessible_namespaces,
            node,
        })
    }

    /// Returns true for node-detail requests.
    #[must_use]
    pub const fn is_node_graph(&self) -> bool {
        self.node.is_some()
    }

    /// Requested namespaces that host mesh infrastructure.
    #[must_use]
    pub fn requested_mesh_namespaces(&self) -> Vec<String> {
        self.namespaces
            .values()
            .filter(|ns| ns.is_mesh_infra)
            .map(|ns| ns.name.clone())
            .collect()
    }

    /// Mesh-infra namespaces from the configuration that were not requested.
    #[must_use]
    pub fn excluded_mesh_namespaces(&self, config: &EngineConfig) -> Vec<String> {
        config
            .mesh_namespaces
            .iter()
            .filter(|ns| !self.namespaces.contains_key(*ns))
            .cloned()
            .collect()
    }

    /// Returns true when the caller may see `namespace`.
    #[must_use]
    pub fn is_accessible(&self, namespace: &str) -> bool {
        self.accessible_namespaces.contains_key(namespace)
    }
}

fn validate_node(request: &NodeRequest, graph_type: GraphType) -> Result<NodeOptions> {
    let node = NodeOptions {
        namespace: request.namespace.trim().to_string(),
        workload: non_empty(request.workload.as_ref()),
        app: non_empty(request.app.as_ref()),
        version: non_empty(request.version.as_ref()),
        service: non_empty(request.service.as_ref()),
    };

    if node.namespace.is_empty() {
        return Err(GraphError::bad_request("Node graph requires a namespace"));
    }

    let focus = [&node.workload, &node.app, &node.service]
        .iter()
        .filter(|v| !v.is_empty())
        .count();
    if focus != 1 {
        return Err(GraphError::bad_request(
            "Node graph requires exactly one of workload, app or service",
        ));
    }

    if !node.app.is_empty() && !graph_type.is_app_based() {
        return Err(GraphError::bad_request(format!(
            "Invalid graphType [{graph_type}] for app node, expecting app or versionedApp"
        )));
    }

    if !node.version.is_empty() && (node.app.is_empty() || graph_type != GraphType::VersionedApp) {
        return Err(GraphError::bad_request(
            "A node version requires an app and the versionedApp graph type",
        ));
    }

    Ok(node)
}

/// Parses a Prometheus-style duration such as `30s`, `10m` or `1h30m`.
///
/// # Errors
///
/// Returns [`GraphError::BadRequest`] for malformed or zero durations.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let invalid = || GraphError::bad_request(format!("Invalid duration [{raw}]"));
    let mut rest = raw.trim();
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total = Duration::ZERO;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
        if digits == 0 {
            return Err(invalid());
        }
        let value: u64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit_secs: u64 = match &rest[..unit_len] {
            "ms" => {
                total = total
                    .checked_add(Duration::from_millis(value))
                    .ok_or_else(invalid)?;
                rest = &rest[unit_len..];
                continue;
            }
            "s" => 1,
            "m" => 60,
            "h" => 3_600,
            "d" => 86_400,
            "w" => 604_800,
            "y" => 31_536_000,
            _ => return Err(invalid()),
        };
        let secs = value.checked_mul(unit_secs).ok_or_else(invalid)?;
        total = total.checked_add(Duration::from_secs(secs)).ok_or_else(invalid)?;
        rest = &rest[unit_len..];
    }

    if total.is_zero() {
        return Err(invalid());
    }
    Ok(total)
}

/// Clamps `requested` to the namespace lifetime at `query_time`.
///
/// # Errors
///
/// Returns [`GraphError::BadRequest`] when the namespace did not exist at
/// `query_time`.
pub fn safe_namespace_duration(
    namespace: &str,
    created_at: Option<DateTime<Utc>>,
    requested: Duration,
    query_time: DateTime<Utc>,
) -> Result<Duration> {
    let Some(created_at) = created_at else {
        return Ok(requested);
    };

    let lifetime = query_time - created_at;
    if lifetime <= TimeDelta::zero() {
        return Err(GraphError::bad_request(format!(
            "Namespace [{namespace}] did not exist at query time"
        )));
    }

    let lifetime = lifetime.to_std().map_err(|e| {
        GraphError::bad_request(format!("Invalid lifetime for namespace [{namespace}]: {e}"))
    })?;
    if lifetime < requested {
        debug!(
            namespace,
            requested = ?requested,
            clamped = ?lifetime,
            "Reducing query window to namespace lifetime"
        );
        return Ok(lifetime);
    }
    Ok(requested)
}
