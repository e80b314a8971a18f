//! Per-pass operation reports

use std::collections::BTreeMap;

use serde::Serialize;

use crate::cleanup::CleanupReport;
use crate::Error;

/// What happened to one target during a pass
///
/// A target succeeds only if every sub-operation succeeded. Sub-operations
/// that did succeed are still listed so partial progress is visible.
#[derive(Debug, Default)]
pub struct TargetOutcome {
    /// Sub-operations that succeeded (e.g. `role=control`)
    pub succeeded: Vec<String>,
    /// Sub-operations that failed, with their errors
    pub failed: Vec<(String, Error)>,
    /// Free-form note (e.g. "already absent")
    pub note: Option<String>,
}

impl TargetOutcome {
    /// Outcome for a target that failed before any sub-operation ran
    pub fn from_error(item: impl Into<String>, error: Error) -> Self {
        let mut outcome = Self::default();
        outcome.fail(item, error);
        outcome
    }

    /// Record a successful sub-operation
    pub fn succeed(&mut self, item: impl Into<String>) {
        self.succeeded.push(item.into());
    }

    /// Record a failed sub-operation
    pub fn fail(&mut self, item: impl Into<String>, error: Error) {
        self.failed.push((item.into(), error));
    }

    /// Attach a note shown next to the target
    pub fn note(&mut self, note: impl Into<String>) {
        self.note = Some(note.into());
    }

    /// Returns true if no sub-operation failed
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Per-target detail kept in a report
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDetail {
    /// Whether the target as a whole succeeded
    pub success: bool,
    /// Sub-operations that succeeded
    pub succeeded: Vec<String>,
    /// Sub-operations that failed
    pub failed: Vec<String>,
    /// Optional note
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Aggregated result of one reconciliation pass
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationReport {
    /// Pass name, e.g. `labels apply`
    pub operation: String,
    /// Number of targets in the pass
    pub total_targets: usize,
    /// Targets whose sub-operations all succeeded
    pub successful_targets: usize,
    /// Targets with at least one failed sub-operation, in processing order
    pub failed_targets: Vec<String>,
    /// Detail per target
    pub details: BTreeMap<String, TargetDetail>,
    /// Error messages, prefixed with their target
    pub errors: Vec<String>,
    /// Cleanup sweep run after the pass, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<CleanupReport>,
}

impl OperationReport {
    /// Start an empty report for `total_targets` targets
    pub fn new(operation: impl Into<String>, total_targets: usize) -> Self {
        Self {
            operation: operation.into(),
            total_targets,
            ..Default::default()
        }
    }

    /// Record a finished target
    pub fn record(&mut self, target: &str, outcome: TargetOutcome) {
        let success = outcome.is_success();
        if success {
            self.successful_targets += 1;
        } else {
            self.failed_targets.push(target.to_string());
        }

        let mut failed = Vec::with_capacity(outcome.failed.len());
        for (item, error) in outcome.failed {
            self.errors.push(format!("{}: {}", target, error));
            failed.push(item);
        }

        self.details.insert(
            target.to_string(),
            TargetDetail {
                success,
                succeeded: outcome.succeeded,
                failed,
                note: outcome.note,
            },
        );
    }

    /// Returns true if no target failed
    pub fn is_success(&self) -> bool {
        self.failed_targets.is_empty()
    }

    /// One-line human readable summary
    pub fn summary(&self) -> String {
        if self.failed_targets.is_empty() {
            format!(
                "{}: {}/{} targets succeeded",
                self.operation, self.successful_targets, self.total_targets
            )
        } else {
            format!(
                "{}: {}/{} targets succeeded, failed: {}",
                self.operation,
                self.successful_targets,
                self.total_targets,
                self.failed_targets.join(", ")
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_sub_operations_succeeding_counts_target_successful() {
        let mut report = OperationReport::new("labels apply", 1);
        let mut outcome = TargetOutcome::default();
        outcome.succeed("role=control");
        outcome.succeed("rack=r1");
        report.record("rsb2", outcome);

        assert_eq!(report.successful_targets, 1);
        assert!(report.failed_targets.is_empty());
        assert!(report.is_success());
        assert_eq!(report.details["rsb2"].succeeded.len(), 2);
    }

    #[test]
    fn partial_success_counts_target_failed_but_keeps_successes() {
        let mut report = OperationReport::new("labels apply", 1);
        let mut outcome = TargetOutcome::default();
        outcome.succeed("role=control");
        outcome.fail("rack=r1", Error::extraction("boom"));
        report.record("rsb2", outcome);

        assert_eq!(report.successful_targets, 0);
        assert_eq!(report.failed_targets, vec!["rsb2".to_string()]);
        assert_eq!(report.details["rsb2"].succeeded, vec!["role=control".to_string()]);
        assert_eq!(report.details["rsb2"].failed, vec!["rack=r1".to_string()]);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("rsb2: "));
    }

    #[test]
    fn summary_lists_failed_targets() {
        let mut report = OperationReport::new("vlan configure", 2);
        report.record("rsb1/vlan100", TargetOutcome::default());
        report.record(
            "rsb2/vlan100",
            TargetOutcome::from_error("configure", Error::extraction("x")),
        );
        assert_eq!(
            report.summary(),
            "vlan configure: 1/2 targets succeeded, failed: rsb2/vlan100"
        );
    }

    #[test]
    fn report_serializes_camel_case() {
        let report = OperationReport::new("labels verify", 0);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["totalTargets"], 0);
        assert!(json.get("cleanup").is_none());
    }
}
