//! Error types for the claw-graph crate.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a [`GraphError`], used by callers to pick a
/// response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request itself is malformed.
    BadRequest,
    /// The request names something the caller may not see.
    Forbidden,
    /// A backend, timeout, or cancellation failure.
    Internal,
}

/// Errors that can occur while building a traffic graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Invalid request parameter.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Namespace is not accessible to the caller.
    #[error("forbidden: namespace [{0}] is not accessible")]
    Forbidden(String),

    /// Telemetry query failed.
    #[error("telemetry query failed: {reason}")]
    Telemetry {
        /// Description of the failure.
        reason: String,
    },

    /// Inventory lookup failed.
    #[error("inventory lookup failed for namespace [{namespace}]: {reason}")]
    Inventory {
        /// Namespace being looked up.
        namespace: String,
        /// Description of the failure.
        reason: String,
    },

    /// An appender could not complete.
    #[error("appender [{appender}] failed: {reason}")]
    Appender {
        /// Name of the failing appender.
        appender: String,
        /// Description of the failure.
        reason: String,
    },

    /// An external call exceeded its deadline.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The configured bound.
        timeout: Duration,
    },

    /// The request was cancelled while an external call was in flight.
    #[error("{operation} cancelled")]
    Cancelled {
        /// The operation that was interrupted.
        operation: String,
    },

    /// Configuration is invalid or unreadable.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl GraphError {
    /// Returns the error classification.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest(_) | Self::Config(_) => ErrorKind::BadRequest,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Telemetry { .. }
            | Self::Inventory { .. }
            | Self::Appender { .. }
            | Self::Timeout { .. }
            | Self::Cancelled { .. } => ErrorKind::Internal,
        }
    }

    /// Shorthand for a [`GraphError::BadRequest`].
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Shorthand for a [`GraphError::Telemetry`].
    pub fn telemetry(reason: impl Into<String>) -> Self {
        Self::Telemetry {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`GraphError::Inventory`].
    pub fn inventory(namespace: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Inventory {
            namespace: namespace.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_display() {
        let err = GraphError::bad_request("Invalid appender [bogus]");
        assert_eq!(err.to_string(), "bad request: Invalid appender [bogus]");
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn test_forbidden_display() {
        let err = GraphError::Forbidden("secret".to_string());
        assert!(err.to_string().contains("secret"));
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn test_inventory_display() {
        let err = GraphError::inventory("bookinfo", "connection refused");
        let msg = err.to_string();
        assert!(msg.contains("bookinfo"));
        assert!(msg.contains("connection refused"));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_timeout_is_internal() {
        let err = GraphError::Timeout {
            operation: "telemetry query".to_string(),
            timeout: Duration::from_secs(5),
        };
        assert!(err.to_string().contains("timed out"));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_cancelled_and_appender_are_internal() {
        let cancelled = GraphError::Cancelled {
            operation: "workload list".to_string(),
        };
        let appender = GraphError::Appender {
            appender: "deadNode".to_string(),
            reason: "boom".to_string(),
        };
        assert_eq!(cancelled.kind(), ErrorKind::Internal);
        assert_eq!(appender.kind(), ErrorKind::Internal);
        assert!(appender.to_string().contains("deadNode"));
    }
}
