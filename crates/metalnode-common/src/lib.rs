//! Common types for metalnode: cluster CLI adapter, remote node execution,
//! discovery, reports and declared configuration documents

#![cfg_attr(not(test), deny(missing_docs))]

pub mod cleanup;
pub mod discovery;
pub mod dry_run;
pub mod error;
pub mod exec;
pub mod kubectl;
pub mod manifest;
pub mod poll;
pub mod probe;
pub mod reconcile;
pub mod report;
pub mod settings;
pub mod yaml;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::Error;
pub use kubectl::{ClusterCli, CommandFailure, CommandResult, KubectlCli};
pub use report::{OperationReport, TargetOutcome};
pub use settings::RunSettings;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API version every declared document must carry
pub const API_VERSION: &str = "metalnode.io/v1alpha1";

/// Substring identifying debug pods created by `kubectl debug node/...`
pub const DEBUG_POD_PATTERN: &str = "node-debugger";

/// Namespace debug pods are created in unless overridden
pub const DEFAULT_NAMESPACE: &str = "default";

/// Image used for node debug pods unless overridden
pub const DEFAULT_DEBUG_IMAGE: &str = "busybox:1.36";
