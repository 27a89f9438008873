//! Inventory source contract: workloads, services and mesh configuration.

use std::collections::BTreeMap;
use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::LabelNames;
use crate::error::Result;
use crate::metadata::MeshLocation;

/// A namespace visible to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceRecord {
    /// Namespace name.
    pub name: String,
    /// Creation time, when known.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A workload and its pod summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    /// Workload name.
    pub name: String,
    /// Pod template labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Number of pods.
    #[serde(default)]
    pub pod_count: u32,
    /// Whether every pod carries the mesh sidecar.
    #[serde(default)]
    pub has_sidecar: bool,
}

impl Workload {
    /// Creates a workload with no labels.
    #[must_use]
    pub fn new(name: impl Into<String>, pod_count: u32, has_sidecar: bool) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            pod_count,
            has_sidecar,
        }
    }

    /// Adds a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// App label value.
    #[must_use]
    pub fn app<'a>(&'a self, names: &LabelNames) -> Option<&'a str> {
        self.labels.get(&names.app).map(String::as_str)
    }

    /// Version label value.
    #[must_use]
    pub fn version<'a>(&'a self, names: &LabelNames) -> Option<&'a str> {
        self.labels.get(&names.version).map(String::as_str)
    }
}

/// A declared service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    /// Service name.
    pub name: String,
    /// Service labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl ServiceDefinition {
    /// Creates a service definition.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
        }
    }
}

/// An endpoint of a service entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntryEndpoint {
    /// Endpoint address, typically a cluster ingress gateway.
    pub address: String,
}

/// A mesh service entry declaring hosts outside (or across) the mesh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    /// Entry name.
    pub name: String,
    /// Declared hosts.
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Endpoints.
    #[serde(default)]
    pub endpoints: Vec<ServiceEntryEndpoint>,
    /// Entry location.
    #[serde(default)]
    pub location: MeshLocation,
}

impl ServiceEntry {
    /// Creates a service entry.
    #[must_use]
    pub fn new(name: impl Into<String>, location: MeshLocation) -> Self {
        Self {
            name: name.into(),
            hosts: Vec::new(),
            endpoints: Vec::new(),
            location,
        }
    }

    /// Adds a host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.hosts.push(host.into());
        self
    }

    /// Adds an endpoint address.
    #[must_use]
    pub fn with_endpoint(mut self, address: impl Into<String>) -> Self {
        self.endpoints.push(ServiceEntryEndpoint {
            address: address.into(),
        });
        self
    }
}

/// A virtual service routing requests for its hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualService {
    /// Resource name.
    pub name: String,
    /// Hosts the routes apply to.
    #[serde(default)]
    pub hosts: Vec<String>,
}

/// A destination rule applying traffic policy to a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationRule {
    /// Resource name.
    pub name: String,
    /// Target host.
    pub host: String,
    /// Whether the policy configures circuit breaking.
    #[serde(default)]
    pub has_circuit_breaker: bool,
}

/// Mesh configuration declared in one namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Service entries.
    #[serde(default)]
    pub service_entries: Vec<ServiceEntry>,
    /// Virtual services.
    #[serde(default)]
    pub virtual_services: Vec<VirtualService>,
    /// Destination rules.
    #[serde(default)]
    pub destination_rules: Vec<DestinationRule>,
}

/// Returns true when a mesh host refers to `service` in `namespace`:
/// the short name, `<svc>.<ns>`, or any longer form of the same.
#[must_use]
pub fn host_matches_service(host: &str, service: &str, namespace: &str) -> bool {
    if host == "*" {
        return true;
    }
    let mut parts = host.split('.');
    if parts.next() != Some(service) {
        return false;
    }
    match parts.next() {
        None => true,
        Some(ns) => ns == namespace,
    }
}

/// A source of workload, service and mesh-config inventory.
pub trait InventorySource: Send + Sync + 'static {
    /// Namespaces visible to the caller.
    fn namespaces(&self) -> impl Future<Output = Result<Vec<NamespaceRecord>>> + Send;

    /// Workloads in a namespace.
    fn workloads(&self, namespace: &str) -> impl Future<Output = Result<Vec<Workload>>> + Send;

    /// Services declared in a namespace.
    fn services(
        &self,
        namespace: &str,
    ) -> impl Future<Output = Result<Vec<ServiceDefinition>>> + Send;

    /// Mesh configuration declared in a namespace.
    fn mesh_config(&self, namespace: &str) -> impl Future<Output = Result<MeshConfig>> + Send;
}
