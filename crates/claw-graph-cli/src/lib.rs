//! # claw-graph-cli
//!
//! Command-line front end for `claw-graph`.
//!
//! Provides commands for:
//! - Namespace graphs across every configured cluster
//! - Node-detail graphs around a workload, app or service
//!
//! # Architecture
//!
//! Each cluster in the config file is backed by a JSON fixture holding its
//! inventory and telemetry. The request is fanned out to every cluster and
//! the merged result is printed.
//!
//! ```text
//! ┌────────────┐   toml   ┌──────────────┐  per cluster  ┌─────────────┐
//! │ clawgraph  │─────────►│ GraphCommand │──────────────►│ GraphEngine │
//! └────────────┘          └──────────────┘   (fixture)   └─────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, Format, GraphArgs, NodeArgs};
pub use commands::GraphCommand;
pub use config::{CliConfig, ClusterConfig};
pub use error::CliError;
pub use output::OutputFormat;
