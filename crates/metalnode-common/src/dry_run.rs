//! Dry-run simulation
//!
//! Mutating operations check `RunSettings::dry_run` and, when set, return one
//! of these canned results instead of calling the adapter. The results have
//! the same shape as a real success so the caller's bookkeeping is unchanged.

use tracing::info;

use crate::exec::ExecOutput;
use crate::kubectl::CommandResult;

/// Prefix marking simulated output and log lines
pub const DRY_RUN_MARKER: &str = "[dry-run]";

/// Simulated success for a single-call mutation
///
/// `entity` is the kubectl-style resource reference (`node/rsb2`) and `verb`
/// the past-tense action kubectl would print (`labeled`, `unlabeled`).
pub fn simulated(entity: &str, verb: &str, action: &str) -> CommandResult {
    info!("{} would {}: {}", DRY_RUN_MARKER, action, entity);
    CommandResult::ok(format!("{} {}", entity, verb))
}

/// Simulated success for a remote node command
pub fn simulated_exec(node: &str, command: &str) -> ExecOutput {
    info!(node = %node, "{} would run on node: {}", DRY_RUN_MARKER, command);
    ExecOutput {
        output: format!("{} would run on node {}: {}", DRY_RUN_MARKER, node, command),
        pod: None,
        simulated: true,
    }
}
