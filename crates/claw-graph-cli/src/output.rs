//! Output formatting for CLI commands.
//!
//! Supports summary (human-readable) and JSON output formats.

use std::io::Write;

use claw_graph::{MeshGraph, Node, TrafficMap};
use serde::Serialize;

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both summary and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Get the current format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// Write a value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + SummaryDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Summary => value.write_summary(writer)?,
        }
        Ok(())
    }

    /// Write a value to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + SummaryDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Summary)
    }
}

/// Trait for types with a human-readable summary.
pub trait SummaryDisplay {
    /// Write the value as a summary.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_summary<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

impl SummaryDisplay for MeshGraph {
    fn write_summary<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        for (cluster, graph) in &self.clusters {
            writeln!(writer, "Cluster {cluster}")?;
            writeln!(writer, "══════════════════════════════════")?;
            write_graph(writer, graph)?;
            writeln!(writer)?;
        }

        if !self.passthrough.is_empty() {
            writeln!(writer, "Cross-Cluster Edges")?;
            writeln!(writer, "══════════════════════════════════")?;
            for edge in &self.passthrough {
                writeln!(
                    writer,
                    "  {} -> {} [{}] {} -> {}  {:.2} req/s ({:.0}%)",
                    edge.source,
                    edge.dest,
                    edge.protocol,
                    edge.from_cluster,
                    edge.to_cluster,
                    edge.rate,
                    edge.share_percent
                )?;
            }
            writeln!(writer)?;
        }

        if !self.failed.is_empty() {
            writeln!(writer, "Failed Clusters: {}", self.failed.join(", "))?;
        }
        Ok(())
    }
}

fn write_graph<W: Write>(writer: &mut W, graph: &TrafficMap) -> Result<(), CliError> {
    writeln!(writer, "Nodes: {}  Edges: {}", graph.len(), graph.edge_count())?;
    if graph.is_empty() {
        return Ok(());
    }
    writeln!(writer)?;
    writeln!(writer, "{:<48} {:<10} {}", "NODE", "KIND", "FLAGS")?;
    writeln!(writer, "{}", "─".repeat(72))?;
    for node in graph.nodes() {
        writeln!(writer, "{:<48} {:<10} {}", node.id, node.kind.to_string(), flags(node))?;
        for edge in &node.edges {
            write!(
                writer,
                "  -> {} [{}] {:.2}",
                edge.dest,
                edge.protocol(),
                edge.metadata.total()
            )?;
            let errors = edge.metadata.traffic.rates.error_rate();
            if errors > 0.0 {
                write!(writer, " (errors {errors:.2})")?;
            }
            writeln!(writer)?;
        }
    }
    Ok(())
}

fn flags(node: &Node) -> String {
    let metadata = &node.metadata;
    let mut flags = Vec::new();
    if metadata.is_root {
        flags.push("root".to_string());
    }
    if metadata.is_dead {
        flags.push("dead".to_string());
    }
    if metadata.is_unused {
        flags.push("unused".to_string());
    }
    if metadata.is_outside {
        flags.push("outside".to_string());
    }
    if metadata.is_inaccessible {
        flags.push("inaccessible".to_string());
    }
    if metadata.has_missing_sidecar {
        flags.push("no-sidecar".to_string());
    }
    if metadata.has_virtual_service {
        flags.push("virtual-service".to_string());
    }
    if metadata.has_circuit_breaker {
        flags.push("circuit-breaker".to_string());
    }
    if metadata.is_service_entry.is_some() {
        flags.push("service-entry".to_string());
    }
    if let Some(reason) = &metadata.is_misconfigured {
        flags.push(format!("misconfigured({reason})"));
    }
    if let Some(replicas) = metadata.replicas {
        flags.push(format!("replicas={replicas}"));
    }
    flags.join(" ")
}
