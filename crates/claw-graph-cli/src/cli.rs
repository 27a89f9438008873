//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use claw_graph::{GraphRequest, NodeRequest};

/// Clawgraph - service mesh traffic graphs across clusters.
#[derive(Parser, Debug, Clone)]
#[command(name = "clawgraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (engine settings, default request, clusters).
    #[arg(short, long, env = "CLAWGRAPH_CONFIG", default_value = "clawgraph.toml")]
    pub config: PathBuf,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Summary)]
    pub format: Format,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable summary.
    #[default]
    Summary,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build the graph of one or more namespaces.
    Namespaces(GraphArgs),

    /// Build the graph around a single node.
    Node(NodeArgs),
}

/// Request overrides shared by every graph command.
///
/// Unset flags fall back to the `[request]` section of the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct GraphArgs {
    /// Namespaces to graph (comma-separated).
    #[arg(short, long)]
    pub namespaces: Option<String>,

    /// Graph type: workload, app, versionedApp or service.
    #[arg(short = 't', long)]
    pub graph_type: Option<String>,

    /// Query window, e.g. `10m` or `1h30m`.
    #[arg(short, long)]
    pub duration: Option<String>,

    /// Split workload edges through service nodes.
    #[arg(long)]
    pub inject_service_nodes: bool,

    /// Appenders to run (comma-separated; empty runs none).
    #[arg(short, long)]
    pub appenders: Option<String>,

    /// Query instant, unix seconds.
    #[arg(long)]
    pub query_time: Option<i64>,
}

impl GraphArgs {
    /// Applies the flags that were given on top of `base`.
    #[must_use]
    pub fn apply(&self, mut base: GraphRequest) -> GraphRequest {
        if let Some(namespaces) = &self.namespaces {
            base.namespaces.clone_from(namespaces);
        }
        if self.graph_type.is_some() {
            base.graph_type.clone_from(&self.graph_type);
        }
        if self.duration.is_some() {
            base.duration.clone_from(&self.duration);
        }
        if self.inject_service_nodes {
            base.inject_service_nodes = Some(true);
        }
        if self.appenders.is_some() {
            base.appenders.clone_from(&self.appenders);
        }
        if self.query_time.is_some() {
            base.query_time = self.query_time;
        }
        base
    }
}

/// Arguments for the node command.
#[derive(Args, Debug, Clone)]
pub struct NodeArgs {
    /// Namespace of the node.
    #[arg(required = true)]
    pub namespace: String,

    /// Workload name.
    #[arg(short, long, conflicts_with_all = ["app", "service"])]
    pub workload: Option<String>,

    /// App name.
    #[arg(long, conflicts_with = "service")]
    pub app: Option<String>,

    /// App version (requires --app).
    #[arg(long, requires = "app")]
    pub version: Option<String>,

    /// Service name.
    #[arg(short, long)]
    pub service: Option<String>,

    /// Request overrides.
    #[command(flatten)]
    pub graph: GraphArgs,
}

impl NodeArgs {
    /// The focus node as a request.
    #[must_use]
    pub fn node(&self) -> NodeRequest {
        NodeRequest {
            namespace: self.namespace.clone(),
            workload: self.workload.clone(),
            app: self.app.clone(),
            version: self.version.clone(),
            service: self.service.clone(),
        }
    }

    /// Applies the flags and the focus node on top of `base`.
    #[must_use]
    pub fn apply(&self, base: GraphRequest) -> GraphRequest {
        let mut request = self.graph.apply(base);
        request.node = Some(self.node());
        request
    }
}
