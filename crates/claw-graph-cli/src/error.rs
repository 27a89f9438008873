//! CLI error types.

use claw_graph::GraphError;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Graph construction failed.
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// No cluster produced a graph.
    #[error("every cluster failed: {}", .0.join(", "))]
    AllClustersFailed(Vec<String>),

    /// Output formatting error.
    #[error("format error: {0}")]
    Format(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_error_display_config() {
        let err = CliError::Config("no clusters".into());
        assert_eq!(err.to_string(), "configuration error: no clusters");
    }

    #[test]
    fn cli_error_display_all_failed() {
        let err = CliError::AllClustersFailed(vec!["east".into(), "west".into()]);
        assert_eq!(err.to_string(), "every cluster failed: east, west");
    }

    #[test]
    fn cli_error_from_graph_error() {
        let err = CliError::from(GraphError::bad_request("Invalid graphType [mesh]"));
        assert!(matches!(err, CliError::Graph(_)));
    }

    #[test]
    fn cli_error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let cli_err = CliError::from(io_err);
        assert!(matches!(cli_err, CliError::Io(_)));
    }
}
