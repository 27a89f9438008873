//! The appender pipeline.
//!
//! Appenders are graph passes run over each namespace's traffic map in a
//! fixed order. Callers may select a subset by name, but never reorder:
//!
//! 1. `replicasNode`: annotate nodes with workload inventory
//! 2. `serviceEntry`: fold service-entry hosts into aggregate nodes
//! 3. `deadNode`: drop nodes with no traffic and no backing workload
//! 4. `responseTime`: attach response times to edges
//! 5. `securityPolicy`: attach mTLS percentages to edges
//! 6. `unusedNode`: add placeholders for traffic-free inventory
//! 7. `istio`: flag virtual services and circuit breakers
//! 8. `sidecarsCheck`: flag workloads missing the mesh sidecar
//!
//! Inventory is fetched lazily through [`NamespaceCache`] and
//! [`GlobalCache`], so each list is loaded at most once per namespace (or
//! per request) no matter how many appenders ask for it.

mod dead_node;
mod mesh_config;
mod replicas;
mod response_time;
mod security_policy;
mod service_entry;
mod sidecars;
mod unused_node;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use tracing::{debug, warn};

pub use dead_node::DeadNodeAppender;
pub use mesh_config::MeshConfigAppender;
pub use replicas::ReplicasNodeAppender;
pub use response_time::ResponseTimeAppender;
pub use security_policy::SecurityPolicyAppender;
pub use service_entry::ServiceEntryAppender;
pub use sidecars::SidecarsCheckAppender;
pub use unused_node::UnusedNodeAppender;

use crate::config::{EngineConfig, LabelNames};
use crate::context::QueryContext;
use crate::error::{GraphError, Result};
use crate::inventory::{InventorySource, MeshConfig, ServiceDefinition, Workload};
use crate::metadata::MeshLocation;
use crate::options::GraphOptions;
use crate::telemetry::{MetricKind, MetricSelector, Reporter, TelemetrySource, labels};
use crate::traffic::TrafficMap;
use crate::types::NamespaceInfo;

/// Names of the available appenders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AppenderName {
    /// `replicasNode`
    ReplicasNode,
    /// `serviceEntry`
    ServiceEntry,
    /// `deadNode`
    DeadNode,
    /// `responseTime`
    ResponseTime,
    /// `securityPolicy`
    SecurityPolicy,
    /// `unusedNode`
    UnusedNode,
    /// `istio`
    MeshConfig,
    /// `sidecarsCheck`
    SidecarsCheck,
}

impl AppenderName {
    /// Every appender, in pipeline order.
    pub const ALL: [Self; 8] = [
        Self::ReplicasNode,
        Self::ServiceEntry,
        Self::DeadNode,
        Self::ResponseTime,
        Self::SecurityPolicy,
        Self::UnusedNode,
        Self::MeshConfig,
        Self::SidecarsCheck,
    ];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReplicasNode => "replicasNode",
            Self::ServiceEntry => "serviceEntry",
            Self::DeadNode => "deadNode",
            Self::ResponseTime => "responseTime",
            Self::SecurityPolicy => "securityPolicy",
            Self::UnusedNode => "unusedNode",
            Self::MeshConfig => "istio",
            Self::SidecarsCheck => "sidecarsCheck",
        }
    }
}

impl fmt::Display for AppenderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppenderName {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| GraphError::bad_request(format!("Invalid appender [{s}]")))
    }
}

/// The appenders a request asked for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RequestedAppenders {
    /// Every appender.
    #[default]
    All,
    /// Only the named appenders (possibly none).
    Only(BTreeSet<AppenderName>),
}

impl RequestedAppenders {
    /// Parses a comma-separated list. Empty entries are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::BadRequest`] for an unknown name.
    pub fn parse(list: &str) -> Result<Self> {
        let names = list
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::parse)
            .collect::<Result<BTreeSet<AppenderName>>>()?;
        Ok(Self::Only(names))
    }

    /// Returns true when `name` should run.
    #[must_use]
    pub fn includes(&self, name: AppenderName) -> bool {
        match self {
            Self::All => true,
            Self::Only(names) => names.contains(&name),
        }
    }
}

/// A service entry as seen through one of its hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredServiceEntry {
    /// Entry name.
    pub name: String,
    /// Namespace declaring the entry.
    pub namespace: String,
    /// Entry location.
    pub location: MeshLocation,
    /// Endpoint addresses.
    pub endpoints: Vec<String>,
}

/// Host index over every service entry in the accessible namespaces.
#[derive(Debug, Clone, Default)]
pub struct ServiceEntryHosts {
    hosts: HashMap<String, DeclaredServiceEntry>,
}

impl ServiceEntryHosts {
    /// Indexes a namespace's service entries. A host declared again
    /// replaces the earlier declaration.
    pub fn add_namespace(&mut self, namespace: &str, config: &MeshConfig) {
        for entry in &config.service_entries {
            let declared = DeclaredServiceEntry {
                name: entry.name.clone(),
                namespace: namespace.to_string(),
                location: entry.location,
                endpoints: entry.endpoints.iter().map(|e| e.address.clone()).collect(),
            };
            for host in &entry.hosts {
                if let Some(existing) = self.hosts.get(host) {
                    warn!(
                        host = %host,
                        first = %existing.name,
                        second = %declared.name,
                        "Same host found in two service entries"
                    );
                }
                self.hosts.insert(host.clone(), declared.clone());
            }
        }
    }

    /// Number of indexed hosts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Returns true when no host is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Finds the entry declaring `service`: an exact host match, or for
    /// mesh-internal entries a host whose first label is `service`.
    /// Federation hosts only match exactly.
    #[must_use]
    pub fn lookup(&self, service: &str, config: &EngineConfig) -> Option<&DeclaredServiceEntry> {
        if let Some(entry) = self.hosts.get(service) {
            return Some(entry);
        }
        let mut prefix_matches: Vec<(&String, &DeclaredServiceEntry)> = self
            .hosts
            .iter()
            .filter(|(host, entry)| {
                entry.location == MeshLocation::MeshInternal
                    && !config.is_federation_host(host)
                    && host.split('.').next() == Some(service)
            })
            .collect();
        prefix_matches.sort_by(|a, b| a.0.cmp(b.0));
        prefix_matches.first().map(|(_, entry)| *entry)
    }
}

/// Request-wide appender state.
#[derive(Debug, Default)]
pub struct GlobalCache {
    service_entry_hosts: Option<ServiceEntryHosts>,
}

impl GlobalCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the service-entry host index, building it on first use from
    /// the mesh config of every accessible namespace.
    pub async fn service_entry_hosts<I: InventorySource>(
        &mut self,
        options: &GraphOptions,
        inventory: &I,
        query: &QueryContext,
    ) -> Result<&ServiceEntryHosts> {
        if self.service_entry_hosts.is_none() {
            let mut index = ServiceEntryHosts::default();
            for namespace in options.accessible_namespaces.keys() {
                let config = query
                    .bounded("mesh config", inventory.mesh_config(namespace))
                    .await?;
                index.add_namespace(namespace, &config);
            }
            debug!(hosts = index.len(), "Indexed service entry hosts");
            self.service_entry_hosts = Some(index);
        }
        Ok(self.service_entry_hosts.get_or_insert_with(ServiceEntryHosts::default))
    }
}

/// Namespace-wide appender state.
#[derive(Debug)]
pub struct NamespaceCache {
    info: NamespaceInfo,
    workloads: Option<Vec<Workload>>,
    services: Option<Vec<ServiceDefinition>>,
    mesh_config: Option<MeshConfig>,
}

impl NamespaceCache {
    /// Creates an empty cache for a namespace.
    #[must_use]
    pub const fn new(info: NamespaceInfo) -> Self {
        Self {
            info,
            workloads: None,
            services: None,
            mesh_config: None,
        }
    }

    /// The namespace.
    #[must_use]
    pub const fn info(&self) -> &NamespaceInfo {
        &self.info
    }

    /// Namespace name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Workloads in the namespace, fetched on first use.
    pub async fn workloads<I: InventorySource>(
        &mut self,
        inventory: &I,
        query: &QueryContext,
    ) -> Result<&[Workload]> {
        if self.workloads.is_none() {
            let list = query
                .bounded("workload list", inventory.workloads(&self.info.name))
                .await?;
            self.workloads = Some(list);
        }
        Ok(self.workloads.as_deref().unwrap_or_default())
    }

    /// Services in the namespace, fetched on first use.
    pub async fn services<I: InventorySource>(
        &mut self,
        inventory: &I,
        query: &QueryContext,
    ) -> Result<&[ServiceDefinition]> {
        if self.services.is_none() {
            let list = query
                .bounded("service list", inventory.services(&self.info.name))
                .await?;
            self.services = Some(list);
        }
        Ok(self.services.as_deref().unwrap_or_default())
    }

    /// Mesh config of the namespace, fetched on first use.
    pub async fn mesh_config<I: InventorySource>(
        &mut self,
        inventory: &I,
        query: &QueryContext,
    ) -> Result<&MeshConfig> {
        if self.mesh_config.is_none() {
            let config = query
                .bounded("mesh config", inventory.mesh_config(&self.info.name))
                .await?;
            self.mesh_config = Some(config);
        }
        Ok(self.mesh_config.get_or_insert_with(MeshConfig::default))
    }
}

/// Finds a workload by name. Empty and `unknown` names never match.
#[must_use]
pub fn find_workload<'a>(workloads: &'a [Workload], name: &str) -> Option<&'a Workload> {
    if !crate::identity::is_ok(name) {
        return None;
    }
    workloads.iter().find(|w| w.name == name)
}

/// Workloads labeled with `app` (and `version`, when known).
#[must_use]
pub fn app_workloads<'a>(
    workloads: &'a [Workload],
    app: &str,
    version: &str,
    names: &LabelNames,
) -> Vec<&'a Workload> {
    let version_ok = crate::identity::is_ok(version);
    workloads
        .iter()
        .filter(|w| w.app(names) == Some(app))
        .filter(|w| !version_ok || w.version(names) == Some(version))
        .collect()
}

/// Destination-reported selectors covering every edge that touches the
/// namespace: traffic into it, and traffic leaving it for other
/// namespaces. No sample matches both.
pub(crate) fn edge_selectors(metric: MetricKind, info: &NamespaceInfo) -> [MetricSelector; 2] {
    let ns = info.name.as_str();
    [
        MetricSelector::new(metric, info.duration)
            .reporter(Reporter::Destination)
            .label_eq(labels::DESTINATION_SERVICE_NAMESPACE, ns),
        MetricSelector::new(metric, info.duration)
            .reporter(Reporter::Destination)
            .label_eq(labels::SOURCE_WORKLOAD_NAMESPACE, ns)
            .label_ne(labels::DESTINATION_SERVICE_NAMESPACE, ns),
    ]
}

/// Everything an appender may read or lazily load.
pub struct AppenderContext<'a, T, I> {
    /// Request options.
    pub options: &'a GraphOptions,
    /// Engine configuration.
    pub config: &'a EngineConfig,
    /// Telemetry backend.
    pub telemetry: &'a T,
    /// Inventory backend.
    pub inventory: &'a I,
    /// Cancellation and deadlines.
    pub query: &'a QueryContext,
    /// Request-wide cache.
    pub global: &'a mut GlobalCache,
    /// Namespace-wide cache.
    pub namespace: &'a mut NamespaceCache,
}

/// A configured appender.
#[derive(Debug, Clone, PartialEq)]
pub enum Appender {
    /// See [`ReplicasNodeAppender`].
    ReplicasNode(ReplicasNodeAppender),
    /// See [`ServiceEntryAppender`].
    ServiceEntry(ServiceEntryAppender),
    /// See [`DeadNodeAppender`].
    DeadNode(DeadNodeAppender),
    /// See [`ResponseTimeAppender`].
    ResponseTime(ResponseTimeAppender),
    /// See [`SecurityPolicyAppender`].
    SecurityPolicy(SecurityPolicyAppender),
    /// See [`UnusedNodeAppender`].
    UnusedNode(UnusedNodeAppender),
    /// See [`MeshConfigAppender`].
    MeshConfig(MeshConfigAppender),
    /// See [`SidecarsCheckAppender`].
    SidecarsCheck(SidecarsCheckAppender),
}

impl Appender {
    /// Builds the requested appenders in pipeline order.
    #[must_use]
    pub fn pipeline(options: &GraphOptions) -> Vec<Self> {
        AppenderName::ALL
            .into_iter()
            .filter(|name| options.appenders.includes(*name))
            .map(|name| match name {
                AppenderName::ReplicasNode => Self::ReplicasNode(ReplicasNodeAppender {
                    graph_type: options.graph_type,
                }),
                AppenderName::ServiceEntry => Self::ServiceEntry(ServiceEntryAppender {
                    graph_type: options.graph_type,
                }),
                AppenderName::DeadNode => Self::DeadNode(DeadNodeAppender),
                AppenderName::ResponseTime => Self::ResponseTime(ResponseTimeAppender {
                    graph_type: options.graph_type,
                    inject_service_nodes: options.inject_service_nodes,
                    quantile: options.response_time_quantile,
                }),
                AppenderName::SecurityPolicy => Self::SecurityPolicy(SecurityPolicyAppender {
                    graph_type: options.graph_type,
                    inject_service_nodes: options.inject_service_nodes,
                }),
                AppenderName::UnusedNode => Self::UnusedNode(UnusedNodeAppender {
                    graph_type: options.graph_type,
                    inject_service_nodes: options.inject_service_nodes,
                    is_node_graph: options.is_node_graph(),
                }),
                AppenderName::MeshConfig => Self::MeshConfig(MeshConfigAppender),
                AppenderName::SidecarsCheck => Self::SidecarsCheck(SidecarsCheckAppender),
            })
            .collect()
    }

    /// The appender's name.
    #[must_use]
    pub const fn name(&self) -> AppenderName {
        match self {
            Self::ReplicasNode(_) => AppenderName::ReplicasNode,
            Self::ServiceEntry(_) => AppenderName::ServiceEntry,
            Self::DeadNode(_) => AppenderName::DeadNode,
            Self::ResponseTime(_) => AppenderName::ResponseTime,
            Self::SecurityPolicy(_) => AppenderName::SecurityPolicy,
            Self::UnusedNode(_) => AppenderName::UnusedNode,
            Self::MeshConfig(_) => AppenderName::MeshConfig,
            Self::SidecarsCheck(_) => AppenderName::SidecarsCheck,
        }
    }

    /// Runs the appender over one namespace's map.
    pub async fn append_graph<T, I>(
        &self,
        map: &mut TrafficMap,
        ctx: &mut AppenderContext<'_, T, I>,
    ) -> Result<()>
    where
        T: TelemetrySource,
        I: InventorySource,
    {
        match self {
            Self::ReplicasNode(a) => a.append_graph(map, ctx).await,
            Self::ServiceEntry(a) => a.append_graph(map, ctx).await,
            Self::DeadNode(a) => a.append_graph(map, ctx).await,
            Self::ResponseTime(a) => a.append_graph(map, ctx).await,
            Self::SecurityPolicy(a) => a.append_graph(map, ctx).await,
            Self::UnusedNode(a) => a.append_graph(map, ctx).await,
            Self::MeshConfig(a) => a.append_graph(map, ctx).await,
            Self::SidecarsCheck(a) => a.append_graph(map, ctx).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Fixtures shared by the appender tests.

    use std::time::Duration;

    use chrono::{DateTime, Utc};

    use crate::config::EngineConfig;
    use crate::identity::NodeKey;
    use crate::inventory::NamespaceRecord;
    use crate::options::{GraphOptions, GraphRequest};
    use crate::traffic::Node;
    use crate::types::{GraphType, Protocol};

    pub fn options(namespaces: &str, graph_type: GraphType) -> GraphOptions {
        let request = GraphRequest {
            namespaces: namespaces.to_string(),
            graph_type: Some(graph_type.as_str().to_string()),
            ..GraphRequest::default()
        };
        let accessible: Vec<NamespaceRecord> = ["bookinfo", "istio-system", "external", "other"]
            .into_iter()
            .map(|name| NamespaceRecord {
                name: name.to_string(),
                created_at: None,
            })
            .collect();
        let now = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default();
        match GraphOptions::parse(&request, &accessible, &EngineConfig::default(), now) {
            Ok(options) => options,
            Err(e) => unreachable!("test options must parse: {e}"),
        }
    }

    pub fn workload_node(ns: &str, workload: &str, app: &str, version: &str) -> Node {
        Node::new(&NodeKey::workload(ns, workload, app, version), GraphType::Workload)
    }

    pub fn service_node(ns: &str, service: &str) -> Node {
        Node::new(&NodeKey::service(ns, service), GraphType::Workload)
    }

    pub fn connect(source: &mut Node, dest: &mut Node, protocol: Protocol, rate: f64) {
        source.metadata.traffic.record_outbound(protocol, rate);
        dest.metadata.traffic.record_inbound(protocol, "200", rate);
        source
            .edge_or_insert(&dest.id, protocol)
            .metadata
            .record("200", "-", "", rate);
    }

    pub const TIMEOUT: Duration = Duration::from_secs(5);
}
