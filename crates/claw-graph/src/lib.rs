//! # claw-graph
//!
//! Service mesh traffic graphs for Clawbernetes.
//!
//! This crate turns request telemetry into a directed graph of the
//! services, workloads and apps in a mesh, then decorates it with
//! inventory and configuration facts.
//!
//! ## Features
//!
//! - **Traffic Maps**: Build node and edge rates from raw request samples
//! - **Appender Pipeline**: Ordered graph passes for replicas, dead nodes,
//!   response times, mTLS, unused inventory, mesh config and sidecars
//! - **Node Graphs**: Focus on a single workload, app or service
//! - **Multi-Cluster**: Resolve federated requests into cross-cluster edges
//! - **Fan-Out**: Build every cluster's graph concurrently
//!
//! ## Architecture
//!
//! ```text
//!  GraphRequest ──► GraphOptions ──► TrafficMapBuilder (per namespace)
//!                                          │
//!                                          ▼
//!                          Appender pipeline (fixed order)
//!                                          │
//!                                          ▼
//!                      merge ──► postprocess ──► TrafficMap
//!
//!  ClusterFanout: one GraphEngine task per cluster ──► MeshGraph
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use claw_graph::{EngineConfig, GraphEngine, GraphRequest, InMemoryInventory, InMemoryTelemetry};
//! use tokio_util::sync::CancellationToken;
//!
//! let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
//! let engine = GraphEngine::new(
//!     "primary",
//!     EngineConfig::default(),
//!     Arc::new(InMemoryTelemetry::new()),
//!     Arc::new(InMemoryInventory::new().with_namespace("bookinfo")),
//! );
//!
//! let request = GraphRequest {
//!     namespaces: "bookinfo".to_string(),
//!     ..GraphRequest::default()
//! };
//! let cancel = CancellationToken::new();
//! let graph = runtime.block_on(async {
//!     let options = engine.options(&request, chrono::Utc::now(), &cancel).await?;
//!     engine.namespaces_graph(&options, &cancel).await
//! })?;
//!
//! assert!(graph.is_empty());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod appender;
pub mod builder;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod fanout;
pub mod identity;
pub mod inventory;
pub mod memory;
pub mod metadata;
pub mod multicluster;
pub mod options;
pub mod postprocess;
pub mod sample;
pub mod telemetry;
pub mod traffic;
pub mod types;

pub use appender::{Appender, AppenderName, RequestedAppenders};
pub use config::{AppenderFailurePolicy, EngineConfig, LabelNames};
pub use context::QueryContext;
pub use engine::GraphEngine;
pub use error::{ErrorKind, GraphError, Result};
pub use fanout::{ClusterFanout, MeshGraph};
pub use identity::NodeKey;
pub use inventory::{
    InventorySource, MeshConfig, NamespaceRecord, ServiceDefinition, ServiceEntry, Workload,
};
pub use memory::{ClusterFixture, InMemoryInventory, InMemoryTelemetry};
pub use metadata::{EdgeMetadata, MeshLocation, NodeMetadata};
pub use multicluster::{MultiClusterEdge, MultiClusterResolver};
pub use options::{GraphOptions, GraphRequest, NodeOptions, NodeRequest};
pub use telemetry::{MetricKind, MetricSelector, Sample, TelemetrySource};
pub use traffic::{Edge, Node, TrafficMap};
pub use types::{GraphType, NamespaceInfo, NodeKind, Protocol};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::engine::GraphEngine;
    pub use crate::error::{GraphError, Result};
    pub use crate::fanout::{ClusterFanout, MeshGraph};
    pub use crate::inventory::InventorySource;
    pub use crate::options::{GraphOptions, GraphRequest};
    pub use crate::telemetry::TelemetrySource;
    pub use crate::traffic::TrafficMap;
    pub use crate::types::GraphType;
}

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
