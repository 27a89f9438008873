//! In-memory telemetry and inventory backends.
//!
//! These back the CLI and the tests. A [`ClusterFixture`] describes one
//! cluster's namespaces, inventory and telemetry samples as JSON and turns
//! into a pair of backends.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GraphError, Result};
use crate::inventory::{
    InventorySource, MeshConfig, NamespaceRecord, ServiceDefinition, ServiceEntry, Workload,
};
use crate::telemetry::{MetricKind, MetricSelector, Sample, TelemetrySource};

/// Telemetry held in memory, keyed by metric name.
///
/// Queries evaluate the selector against every stored sample of the
/// metric. Every selector is recorded so tests can assert what was asked.
#[derive(Debug, Default)]
pub struct InMemoryTelemetry {
    samples: RwLock<HashMap<String, Vec<Sample>>>,
    queries: RwLock<Vec<MetricSelector>>,
    failure: RwLock<Option<String>>,
    delay: RwLock<Option<Duration>>,
}

impl InMemoryTelemetry {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sample for `metric`.
    #[must_use]
    pub fn with_sample(self, metric: MetricKind, sample: Sample) -> Self {
        self.push(metric.name(), sample);
        self
    }

    /// Adds a sample under a raw metric name.
    pub fn push(&self, metric: &str, sample: Sample) {
        self.samples
            .write()
            .entry(metric.to_string())
            .or_default()
            .push(sample);
    }

    /// Makes every following query fail with `reason`.
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.failure.write() = Some(reason.into());
    }

    /// Delays every following query.
    pub fn delay_by(&self, delay: Duration) {
        *self.delay.write() = Some(delay);
    }

    /// Selectors queried so far.
    #[must_use]
    pub fn queries(&self) -> Vec<MetricSelector> {
        self.queries.read().clone()
    }
}

impl TelemetrySource for InMemoryTelemetry {
    async fn query(
        &self,
        selector: &MetricSelector,
        _instant: DateTime<Utc>,
    ) -> Result<Vec<Sample>> {
        self.queries.write().push(selector.clone());

        let delay = *self.delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failure.read().clone();
        if let Some(reason) = failure {
            return Err(GraphError::telemetry(reason));
        }

        let matched: Vec<Sample> = self
            .samples
            .read()
            .get(selector.metric.name())
            .map(|samples| samples.iter().filter(|s| selector.matches(s)).cloned().collect())
            .unwrap_or_default();
        debug!(selector = %selector, matched = matched.len(), "Answered in-memory query");
        Ok(matched)
    }
}

/// Inventory held in memory.
#[derive(Debug, Default)]
pub struct InMemoryInventory {
    namespaces: RwLock<Vec<NamespaceRecord>>,
    workloads: RwLock<HashMap<String, Vec<Workload>>>,
    services: RwLock<HashMap<String, Vec<ServiceDefinition>>>,
    mesh_configs: RwLock<HashMap<String, MeshConfig>>,
    failing: RwLock<HashSet<String>>,
    calls: RwLock<Vec<String>>,
}

impl InMemoryInventory {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a namespace with no known creation time.
    #[must_use]
    pub fn with_namespace(self, name: impl Into<String>) -> Self {
        self.add_namespace(NamespaceRecord {
            name: name.into(),
            created_at: None,
        });
        self
    }

    /// Adds a workload.
    #[must_use]
    pub fn with_workload(self, namespace: &str, workload: Workload) -> Self {
        self.workloads
            .write()
            .entry(namespace.to_string())
            .or_default()
            .push(workload);
        self
    }

    /// Adds a service.
    #[must_use]
    pub fn with_service(self, namespace: &str, service: ServiceDefinition) -> Self {
        self.services
            .write()
            .entry(namespace.to_string())
            .or_default()
            .push(service);
        self
    }

    /// Adds a service entry to the namespace's mesh config.
    #[must_use]
    pub fn with_service_entry(self, namespace: &str, entry: ServiceEntry) -> Self {
        self.mesh_configs
            .write()
            .entry(namespace.to_string())
            .or_default()
            .service_entries
            .push(entry);
        self
    }

    /// Replaces the namespace's mesh config.
    #[must_use]
    pub fn with_mesh_config(self, namespace: &str, config: MeshConfig) -> Self {
        self.mesh_configs.write().insert(namespace.to_string(), config);
        self
    }

    /// Adds or replaces a namespace record.
    pub fn add_namespace(&self, record: NamespaceRecord) {
        let mut namespaces = self.namespaces.write();
        namespaces.retain(|ns| ns.name != record.name);
        namespaces.push(record);
    }

    /// Makes every lookup in `namespace` fail.
    pub fn fail_namespace(&self, namespace: impl Into<String>) {
        self.failing.write().insert(namespace.into());
    }

    /// Lookups served so far, as `<kind>:<namespace>`.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().clone()
    }

    fn record(&self, kind: &str, namespace: &str) -> Result<()> {
        self.calls.write().push(format!("{kind}:{namespace}"));
        if self.failing.read().contains(namespace) {
            return Err(GraphError::inventory(namespace, format!("{kind} lookup failed")));
        }
        Ok(())
    }
}

impl InventorySource for InMemoryInventory {
    async fn namespaces(&self) -> Result<Vec<NamespaceRecord>> {
        Ok(self.namespaces.read().clone())
    }

    async fn workloads(&self, namespace: &str) -> Result<Vec<Workload>> {
        self.record("workloads", namespace)?;
        Ok(self.workloads.read().get(namespace).cloned().unwrap_or_default())
    }

    async fn services(&self, namespace: &str) -> Result<Vec<ServiceDefinition>> {
        self.record("services", namespace)?;
        Ok(self.services.read().get(namespace).cloned().unwrap_or_default())
    }

    async fn mesh_config(&self, namespace: &str) -> Result<MeshConfig> {
        self.record("mesh_config", namespace)?;
        Ok(self.mesh_configs.read().get(namespace).cloned().unwrap_or_default())
    }
}

/// One namespace of a cluster fixture.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamespaceFixture {
    /// Namespace name.
    pub name: String,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Workloads.
    #[serde(default)]
    pub workloads: Vec<Workload>,
    /// Services.
    #[serde(default)]
    pub services: Vec<ServiceDefinition>,
    /// Mesh config.
    #[serde(default)]
    pub mesh_config: MeshConfig,
}

/// Samples of one metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricFixture {
    /// Metric name, e.g. `istio_requests_total`.
    pub metric: String,
    /// Samples.
    #[serde(default)]
    pub samples: Vec<Sample>,
}

/// A whole cluster: inventory plus telemetry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterFixture {
    /// Namespaces and their inventory.
    #[serde(default)]
    pub namespaces: Vec<NamespaceFixture>,
    /// Telemetry.
    #[serde(default)]
    pub telemetry: Vec<MetricFixture>,
}

impl ClusterFixture {
    /// Parses a fixture from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Config`] for malformed JSON.
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| GraphError::Config(format!("invalid fixture: {e}")))
    }

    /// Reads a fixture file.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Config`] if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            GraphError::Config(format!(
                "failed to read fixture '{}': {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_json(&content)
    }

    /// Builds the backends described by the fixture.
    #[must_use]
    pub fn into_backends(self) -> (InMemoryTelemetry, InMemoryInventory) {
        let telemetry = InMemoryTelemetry::new();
        for metric in self.telemetry {
            for sample in metric.samples {
                telemetry.push(&metric.metric, sample);
            }
        }

        let mut inventory = InMemoryInventory::new();
        for ns in self.namespaces {
            inventory.add_namespace(NamespaceRecord {
                name: ns.name.clone(),
                created_at: ns.created_at,
            });
            inventory = inventory.with_mesh_config(&ns.name, ns.mesh_config);
            for workload in ns.workloads {
                inventory = inventory.with_workload(&ns.name, workload);
            }
            for service in ns.services {
                inventory = inventory.with_service(&ns.name, service);
            }
        }
        (telemetry, inventory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Reporter;

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default()
    }

    fn sample(reporter: &str, namespace: &str) -> Sample {
        Sample::new(
            [("reporter", reporter), ("source_workload_namespace", namespace)],
            1.0,
        )
    }

    #[tokio::test]
    async fn test_telemetry_filters_by_selector() {
        let telemetry = InMemoryTelemetry::new()
            .with_sample(MetricKind::Requests, sample("source", "bookinfo"))
            .with_sample(MetricKind::Requests, sample("destination", "bookinfo"))
            .with_sample(MetricKind::TcpSentBytes, sample("source", "bookinfo"));

        let selector = MetricSelector::new(MetricKind::Requests, Duration::from_secs(60))
            .reporter(Reporter::Source)
            .label_eq("source_workload_namespace", "bookinfo");
        let result = telemetry.query(&selector, now()).await.unwrap_or_default();

        assert_eq!(result.len(), 1);
        assert_eq!(telemetry.queries(), vec![selector]);
    }

    #[tokio::test]
    async fn test_telemetry_failure() {
        let telemetry = InMemoryTelemetry::new();
        telemetry.fail_with("connection refused");
        let selector = MetricSelector::new(MetricKind::Requests, Duration::from_secs(60));
        let result = telemetry.query(&selector, now()).await;
        assert!(matches!(result, Err(GraphError::Telemetry { .. })));
    }

    #[tokio::test]
    async fn test_inventory_records_calls_and_failures() {
        let inventory = InMemoryInventory::new()
            .with_namespace("bookinfo")
            .with_workload("bookinfo", Workload::new("reviews-v1", 1, true));
        inventory.fail_namespace("broken");

        let workloads = inventory.workloads("bookinfo").await.unwrap_or_default();
        assert_eq!(workloads.len(), 1);
        assert!(inventory.services("broken").await.is_err());
        assert_eq!(
            inventory.calls(),
            vec!["workloads:bookinfo".to_string(), "services:broken".to_string()]
        );
    }

    #[tokio::test]
    async fn test_fixture_into_backends() {
        let json = r#"{
            "namespaces": [
                {
                    "name": "bookinfo",
                    "workloads": [{"name": "reviews-v1", "labels": {"app": "reviews"}, "pod_count": 2, "has_sidecar": true}],
                    "services": [{"name": "reviews"}]
                }
            ],
            "telemetry": [
                {"metric": "istio_requests_total", "samples": [{"labels": {"reporter": "source"}, "value": 2.5}]}
            ]
        }"#;
        let fixture = ClusterFixture::from_json(json).unwrap_or_default();
        assert_eq!(fixture.namespaces.len(), 1);

        let (telemetry, inventory) = fixture.into_backends();
        let namespaces = inventory.namespaces().await.unwrap_or_default();
        assert_eq!(namespaces.len(), 1);
        let services = inventory.services("bookinfo").await.unwrap_or_default();
        assert_eq!(services, vec![ServiceDefinition::new("reviews")]);

        let selector = MetricSelector::new(MetricKind::Requests, Duration::from_secs(60));
        let samples = telemetry.query(&selector, now()).await.unwrap_or_default();
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn test_fixture_rejects_malformed_json() {
        assert!(matches!(
            ClusterFixture::from_json("{\"namespaces\": 3}"),
            Err(GraphError::Config(_))
        ));
    }
}
