//! Error types for metalnode operations
//!
//! Variants follow the failure categories a reconciliation pass can hit:
//! adapter failures, output extraction, timeouts, result interpretation,
//! node validation, verification drift, discovery and declared
//! configuration.

use std::time::Duration;

use thiserror::Error;

/// Main error type for metalnode operations
#[derive(Debug, Error)]
pub enum Error {
    /// External command exited non-zero, could not be spawned, or timed out
    #[error("command failed [{command}]: {message}")]
    Command {
        /// The argv that was run, joined with spaces
        command: String,
        /// Failure reason plus any captured output
        message: String,
    },

    /// The command or wait was cancelled by the caller
    #[error("cancelled: {operation}")]
    Cancelled {
        /// What was in flight when cancellation hit
        operation: String,
    },

    /// Expected pattern was missing from command output
    #[error("extraction error: {message}")]
    Extraction {
        /// Description including the unexpected output
        message: String,
    },

    /// Debug pod never reached a terminal phase
    #[error("timed out after {timeout:?} waiting for debug pod {pod}")]
    Timeout {
        /// Name of the debug pod being waited on
        pod: String,
        /// The deadline that elapsed
        timeout: Duration,
    },

    /// Debug pod finished but its result is a real failure
    #[error("debug pod {pod} on node {node} finished in phase {phase}: {output}")]
    Interpretation {
        /// Name of the debug pod
        pod: String,
        /// Node the pod ran on
        node: String,
        /// Terminal phase reported by the cluster
        phase: String,
        /// Captured pod output
        output: String,
    },

    /// Target node does not exist in the cluster
    #[error("node not found: {node}")]
    NodeNotFound {
        /// The missing node name
        node: String,
    },

    /// Observed state does not match the declared state
    #[error("verification failed for {subject}: {message}")]
    Verification {
        /// What was checked, e.g. `rsb2 role=control`
        subject: String,
        /// Expected versus observed
        message: String,
    },

    /// Logical network could not be resolved to nodes
    #[error("discovery error for network {network}: {message}")]
    Discovery {
        /// Logical network name being resolved
        network: String,
        /// Description of what failed
        message: String,
    },

    /// Declared configuration is malformed or incomplete
    #[error("configuration error [{document}]: {message}")]
    Config {
        /// Document (kind/name or file) the error belongs to
        document: String,
        /// Description of what's invalid
        message: String,
    },

    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a command error for the given argv
    pub fn command(args: &[String], message: impl Into<String>) -> Self {
        Self::Command {
            command: args.join(" "),
            message: message.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create an extraction error
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
        }
    }

    /// Create a verification error
    pub fn verification(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Verification {
            subject: subject.into(),
            message: message.into(),
        }
    }

    /// Create a discovery error for a logical network
    pub fn discovery(network: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Discovery {
            network: network.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error for a document
    pub fn config(document: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            document: document.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error came from cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
