//! ConnectivityTest documents

use std::collections::BTreeSet;

use serde::Deserialize;

use super::ManifestSpec;
use crate::{Error, Result};

/// Probes between logical networks
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivitySpec {
    /// Nodes never used as probe source or target
    #[serde(default)]
    pub exclude_nodes: Vec<String>,
    /// Test cases, run in order
    #[serde(default)]
    pub tests: Vec<ConnectivityCase>,
}

/// One source network to target network check
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityCase {
    /// Unique test name
    pub name: String,
    /// Network the probe runs from
    pub source_network: String,
    /// Network the probe targets
    pub target_network: String,
    /// Whether targets should answer; `false` asserts isolation
    #[serde(default = "default_expect_success")]
    pub expect_success: bool,
    /// Echo requests per probe
    #[serde(default = "default_count")]
    pub count: u32,
    /// Per-reply wait in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u32,
}

fn default_expect_success() -> bool {
    true
}

fn default_count() -> u32 {
    3
}

fn default_timeout_seconds() -> u32 {
    2
}

impl ManifestSpec for ConnectivitySpec {
    const KIND: &'static str = "ConnectivityTest";

    fn validate(&self, document: &str) -> Result<()> {
        let mut names = BTreeSet::new();
        for case in &self.tests {
            if case.name.trim().is_empty() {
                return Err(Error::config(document, "test name cannot be empty"));
            }
            if !names.insert(case.name.as_str()) {
                return Err(Error::config(
                    document,
                    format!("test {} is declared more than once", case.name),
                ));
            }
            if case.source_network.trim().is_empty() || case.target_network.trim().is_empty() {
                return Err(Error::config(
                    document,
                    format!("test {}: sourceNetwork and targetNetwork are required", case.name),
                ));
            }
            if case.count == 0 || case.timeout_seconds == 0 {
                return Err(Error::config(
                    document,
                    format!("test {}: count and timeoutSeconds must be positive", case.name),
                ));
            }
        }
        Ok(())
    }
}
