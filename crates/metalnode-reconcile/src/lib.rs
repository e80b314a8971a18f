//! Reconciliation passes for metalnode
//!
//! Three domains share the pass driver in `metalnode_common::reconcile`:
//! - [`labels`]: node labels applied with single kubectl calls
//! - [`vlan`]: VLAN sub-interfaces configured through debug pods
//! - [`connectivity`]: ping probes between logical networks

#![cfg_attr(not(test), deny(missing_docs))]

pub mod connectivity;
pub mod labels;
pub mod vlan;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use metalnode_common::exec::NodeExecutor;
use metalnode_common::manifest::ToolsSpec;
use metalnode_common::{ClusterCli, RunSettings};

pub use connectivity::{ConnectivityReport, ConnectivityTester, NetworkHealth};
pub use labels::LabelService;
pub use vlan::VlanService;

/// Adapter, settings and cancellation shared by every service of a run
#[derive(Clone)]
pub struct PassContext {
    cli: Arc<dyn ClusterCli>,
    settings: Arc<RunSettings>,
    cancel: CancellationToken,
}

impl PassContext {
    /// Create a context for one invocation
    pub fn new(cli: Arc<dyn ClusterCli>, settings: RunSettings, cancel: CancellationToken) -> Self {
        Self {
            cli,
            settings: Arc::new(settings),
            cancel,
        }
    }

    /// Context for one document: its `tools` block overrides the base settings
    pub fn for_document(&self, tools: &ToolsSpec) -> Self {
        Self {
            cli: self.cli.clone(),
            settings: Arc::new(self.settings.for_document(tools)),
            cancel: self.cancel.clone(),
        }
    }

    /// Cluster CLI adapter
    pub fn cli(&self) -> &dyn ClusterCli {
        self.cli.as_ref()
    }

    /// Run settings
    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Cancellation token of the run
    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Remote command executor bound to this context
    pub fn executor(&self) -> NodeExecutor {
        NodeExecutor::new(self.cli.clone(), self.settings.clone(), self.cancel.clone())
    }

    pub(crate) fn shared_cli(&self) -> Arc<dyn ClusterCli> {
        self.cli.clone()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use metalnode_common::testing::ScriptedCli;
    use metalnode_common::RunSettings;
    use tokio_util::sync::CancellationToken;

    use crate::PassContext;

    pub const POD_RSB1: &str = "node-debugger-rsb1-q8m4z";
    pub const POD_RSB2: &str = "node-debugger-rsb2-x7k2p";

    /// Acknowledgment kubectl prints when it creates a node debug pod
    pub fn ack(pod: &str, node: &str) -> String {
        format!(
            "Creating debugging pod {} with container debugger on node {}.\n",
            pod, node
        )
    }

    pub fn context(cli: Arc<ScriptedCli>) -> PassContext {
        PassContext::new(cli, RunSettings::for_tests(), CancellationToken::new())
    }

    pub fn dry_run_context(cli: Arc<ScriptedCli>) -> PassContext {
        let settings = RunSettings {
            dry_run: true,
            ..RunSettings::for_tests()
        };
        PassContext::new(cli, settings, CancellationToken::new())
    }

    /// Script one debug pod on `node` that succeeds with `logs`
    pub fn script_pod(cli: &ScriptedCli, node: &str, pod: &str, phase: &str, logs: &str) {
        let target = format!("node/{}", node);
        cli.ok(&["debug", target.as_str()], &ack(pod, node))
            .ok(&["get", "pod", pod], phase)
            .ok(&["logs", pod], logs);
    }

    /// True if any recorded call would change cluster state
    pub fn has_mutating_call(cli: &ScriptedCli) -> bool {
        cli.calls().iter().any(|call| {
            matches!(
                call.first().map(String::as_str),
                Some("label" | "debug" | "delete")
            )
        })
    }
}
