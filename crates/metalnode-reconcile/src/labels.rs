//! Node label reconciliation
//!
//! Labels are set and unset with single `kubectl label` calls, so no debug
//! pods are involved and no cleanup sweep follows these passes.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use metalnode_common::discovery::{labels_column, parse_labels};
use metalnode_common::dry_run;
use metalnode_common::kubectl::argv;
use metalnode_common::manifest::{NodeLabelEntry, NodeLabelsSpec};
use metalnode_common::reconcile::{is_node_not_found, run_pass};
use metalnode_common::{Error, OperationReport, Result, TargetOutcome};

use crate::PassContext;

/// Note attached to targets whose labels were already gone
pub const ALREADY_ABSENT: &str = "already absent";

/// Result of removing one label
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Removal {
    /// The label was present and has been removed
    Removed,
    /// The node did not carry the label
    AlreadyAbsent,
}

/// Observed labels of one declared node
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeLabelListing {
    /// Node name
    pub node: String,
    /// Labels currently on the node
    pub labels: BTreeMap<String, String>,
    /// Why the labels could not be read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Applies, removes, verifies and lists declared node labels
pub struct LabelService {
    ctx: PassContext,
}

impl LabelService {
    /// Create a service bound to a pass context
    pub fn new(ctx: PassContext) -> Self {
        Self { ctx }
    }

    /// Apply every declared label, overwriting existing values
    pub async fn apply(&self, spec: &NodeLabelsSpec) -> OperationReport {
        run_pass(
            self.ctx.cli(),
            "labels apply",
            &spec.nodes,
            self.ctx.settings().validate_nodes,
            |entry| self.apply_entry(entry),
        )
        .await
    }

    /// Remove every declared label key; absent labels count as removed
    pub async fn remove(&self, spec: &NodeLabelsSpec) -> OperationReport {
        run_pass(
            self.ctx.cli(),
            "labels remove",
            &spec.nodes,
            self.ctx.settings().validate_nodes,
            |entry| self.remove_entry(entry),
        )
        .await
    }

    /// Compare observed labels with the declared ones without mutating
    pub async fn verify(&self, spec: &NodeLabelsSpec) -> OperationReport {
        run_pass(
            self.ctx.cli(),
            "labels verify",
            &spec.nodes,
            false,
            |entry| self.verify_entry(entry),
        )
        .await
    }

    /// Observed labels of every declared node
    pub async fn list(&self, spec: &NodeLabelsSpec) -> Vec<NodeLabelListing> {
        let mut listings = Vec::with_capacity(spec.nodes.len());
        for entry in &spec.nodes {
            let listing = match self.observed_labels(&entry.name).await {
                Ok(labels) => NodeLabelListing {
                    node: entry.name.clone(),
                    labels,
                    error: None,
                },
                Err(e) => NodeLabelListing {
                    node: entry.name.clone(),
                    labels: BTreeMap::new(),
                    error: Some(e.to_string()),
                },
            };
            listings.push(listing);
        }
        listings
    }

    /// Set one label on a node
    pub async fn apply_label(&self, node: &str, key: &str, value: &str) -> Result<()> {
        let pair = format!("{}={}", key, value);
        if self.ctx.settings().dry_run {
            dry_run::simulated(&format!("node/{}", node), "labeled", &format!("label {}", pair));
            return Ok(());
        }

        let args = argv([
            "label".to_string(),
            "node".to_string(),
            node.to_string(),
            pair.clone(),
            "--overwrite".to_string(),
        ]);
        let result = self.ctx.cli().run(&args).await;
        if !result.success && !result.is_cancelled() && is_node_not_found(&result.output, node) {
            return Err(Error::NodeNotFound {
                node: node.to_string(),
            });
        }
        let output = result.into_result(&args)?;
        debug!(node = %node, label = %pair, output = %output.trim(), "Label applied");
        Ok(())
    }

    /// Remove one label key from a node
    ///
    /// A label the node does not carry is reported as [`Removal::AlreadyAbsent`]
    /// rather than an error, so removal passes can be re-run.
    pub async fn remove_label(&self, node: &str, key: &str) -> Result<Removal> {
        if self.ctx.settings().dry_run {
            dry_run::simulated(&format!("node/{}", node), "unlabeled", &format!("remove label {}", key));
            return Ok(Removal::Removed);
        }

        let args = argv([
            "label".to_string(),
            "node".to_string(),
            node.to_string(),
            format!("{}-", key),
        ]);
        let result = self.ctx.cli().run(&args).await;

        if !result.is_cancelled() && is_label_absent(&result.output, key) {
            debug!(node = %node, label = %key, "Label already absent");
            return Ok(Removal::AlreadyAbsent);
        }
        if !result.success && !result.is_cancelled() && is_node_not_found(&result.output, node) {
            return Err(Error::NodeNotFound {
                node: node.to_string(),
            });
        }
        result.into_result(&args)?;
        Ok(Removal::Removed)
    }

    async fn observed_labels(&self, node: &str) -> Result<BTreeMap<String, String>> {
        let args = argv(["get", "node", node, "--show-labels"]);
        let output = self.ctx.cli().run(&args).await.into_result(&args)?;
        Ok(labels_column(&output).map(parse_labels).unwrap_or_default())
    }

    async fn apply_entry(&self, entry: &NodeLabelEntry) -> TargetOutcome {
        let mut outcome = TargetOutcome::default();
        for (key, value) in &entry.labels {
            let pair = format!("{}={}", key, value);
            match self.apply_label(&entry.name, key, value).await {
                Ok(()) => outcome.succeed(pair),
                Err(e) => outcome.fail(pair, e),
            }
        }
        if outcome.is_success() {
            info!(node = %entry.name, labels = entry.labels.len(), "Labels applied");
        }
        outcome
    }

    async fn remove_entry(&self, entry: &NodeLabelEntry) -> TargetOutcome {
        let mut outcome = TargetOutcome::default();
        let mut absent = 0;
        for key in entry.labels.keys() {
            match self.remove_label(&entry.name, key).await {
                Ok(Removal::Removed) => outcome.succeed(key.as_str()),
                Ok(Removal::AlreadyAbsent) => {
                    absent += 1;
                    outcome.succeed(key.as_str());
                }
                Err(e) => outcome.fail(key.as_str(), e),
            }
        }
        if absent > 0 && absent == entry.labels.len() {
            outcome.note(ALREADY_ABSENT);
        } else if absent > 0 {
            outcome.note(format!("{} of {} labels {}", absent, entry.labels.len(), ALREADY_ABSENT));
        }
        outcome
    }

    async fn verify_entry(&self, entry: &NodeLabelEntry) -> TargetOutcome {
        let observed = match self.observed_labels(&entry.name).await {
            Ok(labels) => labels,
            Err(e) => return TargetOutcome::from_error("get labels", e),
        };

        let mut outcome = TargetOutcome::default();
        for (key, value) in &entry.labels {
            let pair = format!("{}={}", key, value);
            match observed.get(key) {
                Some(actual) if actual == value => outcome.succeed(pair),
                Some(actual) => {
                    let err = Error::verification(
                        format!("{} {}", entry.name, key),
                        format!("expected '{}', found '{}'", value, actual),
                    );
                    outcome.fail(pair, err);
                }
                None => {
                    let err = Error::verification(
                        format!("{} {}", entry.name, key),
                        format!("expected '{}', label missing", value),
                    );
                    outcome.fail(pair, err);
                }
            }
        }
        outcome
    }
}

/// True if kubectl reported the label key as not present
fn is_label_absent(output: &str, key: &str) -> bool {
    output.contains(&format!("label \"{}\" not found", key))
}
