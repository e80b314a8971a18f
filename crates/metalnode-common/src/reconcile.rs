//! Shared reconciliation pass driver
//!
//! Every domain runs the same loop over its targets:
//! `Validate -> Execute -> Record` per target, then summarize. Targets are
//! processed one at a time and a failing target never stops the pass.

use std::future::Future;

use tracing::{info, warn};

use crate::kubectl::{argv, ClusterCli};
use crate::report::{OperationReport, TargetOutcome};
use crate::{Error, Result};

/// One desired-state entry a pass reconciles
pub trait Target {
    /// Stable identifier used in reports
    fn id(&self) -> String;

    /// Node the target lives on
    fn node(&self) -> &str;
}

/// Confirm `node` exists before mutating it
pub async fn ensure_node_exists(cli: &dyn ClusterCli, node: &str) -> Result<()> {
    let args = argv(["get", "node", node]);
    let result = cli.run(&args).await;
    if result.success {
        return Ok(());
    }
    if result.is_cancelled() {
        return Err(Error::cancelled(args.join(" ")));
    }
    if is_node_not_found(&result.output, node) {
        return Err(Error::NodeNotFound {
            node: node.to_string(),
        });
    }
    result.into_result(&args).map(|_| ())
}

/// Returns true if kubectl output reports that `node` does not exist
///
/// Matches the API server's `(NotFound)` reason or kubectl's
/// `nodes "<n>" not found`. Other "not found" text (a missing label, a
/// missing binary in a pod) does not count.
pub fn is_node_not_found(output: &str, node: &str) -> bool {
    output.contains("(NotFound)") || output.contains(&format!("nodes \"{}\" not found", node))
}

/// Run a pass over `targets`
///
/// When `validate` is set each target's node is checked first and a missing
/// node fails the target without running `step`.
pub async fn run_pass<'a, T, F, Fut>(
    cli: &dyn ClusterCli,
    operation: &str,
    targets: &'a [T],
    validate: bool,
    mut step: F,
) -> OperationReport
where
    T: Target,
    F: FnMut(&'a T) -> Fut,
    Fut: Future<Output = TargetOutcome>,
{
    let mut report = OperationReport::new(operation, targets.len());
    info!(operation, targets = targets.len(), validate, "Starting pass");

    for target in targets {
        let id = target.id();

        if validate {
            if let Err(e) = ensure_node_exists(cli, target.node()).await {
                warn!(operation, target = %id, error = %e, "Validation failed");
                report.record(&id, TargetOutcome::from_error("validate", e));
                continue;
            }
        }

        let outcome = step(target).await;
        if !outcome.is_success() {
            warn!(operation, target = %id, "Target failed");
        }
        report.record(&id, outcome);
    }

    info!(operation, "{}", report.summary());
    report
}
