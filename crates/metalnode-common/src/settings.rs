//! Run settings threaded into every service at construction
//!
//! One immutable [`RunSettings`] value decides dry-run, validation and timing
//! for a whole pass. Nothing reads ambient flags after construction.

use std::path::PathBuf;
use std::time::Duration;

use crate::manifest::ToolsSpec;
use crate::{DEBUG_POD_PATTERN, DEFAULT_DEBUG_IMAGE, DEFAULT_NAMESPACE};

/// Environment toggle that shrinks the poll interval to zero for test runs
pub const TEST_MODE_ENV: &str = "METALNODE_TEST_MODE";

/// Environment override for the kubectl binary
pub const KUBECTL_ENV: &str = "METALNODE_KUBECTL";

/// Default interval between debug pod phase checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default deadline for a remote command to reach a terminal phase
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(60);

/// Default settling delay before the cleanup sweep lists pods
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(3);

/// Default per-invocation kubectl timeout
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for one reconciliation run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSettings {
    /// Simulate every mutating operation instead of performing it
    pub dry_run: bool,
    /// Confirm target nodes exist before mutating them
    pub validate_nodes: bool,
    /// Sleep between debug pod phase checks
    pub poll_interval: Duration,
    /// Deadline for a debug pod to reach a terminal phase
    pub exec_timeout: Duration,
    /// Delay before the cleanup sweep enumerates pods
    pub settle_delay: Duration,
    /// Timeout for a single kubectl invocation
    pub command_timeout: Duration,
    /// kubectl binary to invoke
    pub kubectl: String,
    /// Explicit kubeconfig passed to every invocation
    pub kubeconfig: Option<PathBuf>,
    /// Namespace debug pods live in
    pub namespace: String,
    /// Image for node debug pods
    pub debug_image: String,
    /// Name substring the cleanup sweep matches
    pub debug_pod_pattern: String,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            dry_run: false,
            validate_nodes: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
            exec_timeout: DEFAULT_EXEC_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            kubectl: "kubectl".to_string(),
            kubeconfig: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            debug_image: DEFAULT_DEBUG_IMAGE.to_string(),
            debug_pod_pattern: DEBUG_POD_PATTERN.to_string(),
        }
    }
}

impl RunSettings {
    /// Settings for unit tests: no sleeping, short deadlines
    pub fn for_tests() -> Self {
        Self {
            poll_interval: Duration::ZERO,
            settle_delay: Duration::ZERO,
            exec_timeout: Duration::from_secs(2),
            ..Self::default()
        }
    }

    /// Apply environment overrides (`METALNODE_TEST_MODE`, `METALNODE_KUBECTL`)
    pub fn with_env(self) -> Self {
        let test_mode = std::env::var(TEST_MODE_ENV)
            .map(|v| is_truthy(&v))
            .unwrap_or(false);
        let mut settings = self.with_test_mode(test_mode);
        if let Ok(kubectl) = std::env::var(KUBECTL_ENV) {
            if !kubectl.is_empty() {
                settings.kubectl = kubectl;
            }
        }
        settings
    }

    /// Zero the poll interval when test mode is on; nothing else changes
    pub fn with_test_mode(mut self, enabled: bool) -> Self {
        if enabled {
            self.poll_interval = Duration::ZERO;
        }
        self
    }

    /// Settings for one document: its `tools` block overrides this base
    pub fn for_document(&self, tools: &ToolsSpec) -> Self {
        let mut settings = self.clone();
        if let Some(dry_run) = tools.dry_run {
            settings.dry_run = dry_run;
        }
        if let Some(validate) = tools.validate_nodes {
            settings.validate_nodes = validate;
        }
        settings
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
