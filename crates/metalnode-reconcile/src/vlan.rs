//! VLAN sub-interface reconciliation
//!
//! Each (VLAN, node) pair is one target. Configuration runs an idempotent
//! `ip` script on the node through a debug pod, so every pass here ends with
//! a cleanup sweep.

use serde::Serialize;
use tracing::info;

use metalnode_common::cleanup::{cleanup_debug_pods, PodSelectors};
use metalnode_common::exec::{ExecOutput, NodeExecutor};
use metalnode_common::manifest::{VlanConfigSpec, VlanEntry};
use metalnode_common::reconcile::{run_pass, Target};
use metalnode_common::{Error, OperationReport, TargetOutcome};

use crate::labels::ALREADY_ABSENT;
use crate::PassContext;

/// One VLAN address assignment on one node
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VlanAssignment {
    /// Node the sub-interface lives on
    pub node: String,
    /// 802.1Q tag
    pub vlan_id: u16,
    /// Logical network carried on the VLAN
    pub network: String,
    /// Parent NIC
    pub parent: String,
    /// Sub-interface name, e.g. `eno1.100`
    pub link: String,
    /// Node address without prefix
    pub address: String,
    /// Prefix length
    pub prefix_length: u8,
    /// Optional MTU
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
}

impl Target for VlanAssignment {
    fn id(&self) -> String {
        format!("{}/vlan{}", self.node, self.vlan_id)
    }

    fn node(&self) -> &str {
        &self.node
    }
}

impl VlanAssignment {
    fn from_entry(vlan: &VlanEntry) -> impl Iterator<Item = Self> + '_ {
        vlan.nodes.iter().map(move |n| Self {
            node: n.node.clone(),
            vlan_id: vlan.id.get(),
            network: vlan.network.clone(),
            parent: vlan.interface.clone(),
            link: vlan.link_name(),
            address: n.address.clone(),
            prefix_length: vlan.prefix_length,
            mtu: vlan.mtu,
        })
    }

    /// Address in `addr/prefix` form
    pub fn cidr(&self) -> String {
        format!("{}/{}", self.address, self.prefix_length)
    }

    /// Script creating the link, setting MTU and address, bringing it up
    ///
    /// Each step checks current state first so re-running is a no-op.
    pub fn configure_script(&self) -> String {
        let mut steps = vec![
            "set -e".to_string(),
            format!(
                "ip link show {link} >/dev/null 2>&1 || ip link add link {parent} name {link} type vlan id {id}",
                link = self.link,
                parent = self.parent,
                id = self.vlan_id
            ),
        ];
        if let Some(mtu) = self.mtu {
            steps.push(format!("ip link set dev {} mtu {}", self.link, mtu));
        }
        steps.push(format!(
            "ip -o addr show dev {link} | grep -qF ' {cidr} ' || ip addr add {cidr} dev {link}",
            link = self.link,
            cidr = self.cidr()
        ));
        steps.push(format!("ip link set dev {} up", self.link));
        steps.push(format!("echo configured {} {}", self.link, self.cidr()));
        steps.join("; ")
    }

    /// Script deleting the link, reporting when it was already gone
    pub fn remove_script(&self) -> String {
        format!(
            "if ip link show {link} >/dev/null 2>&1; then ip link delete {link} && echo removed {link}; else echo {link} {absent}; fi",
            link = self.link,
            absent = ALREADY_ABSENT
        )
    }

    /// Read-only query of the link's addresses
    pub fn verify_command(&self) -> String {
        format!("ip -o addr show dev {}", self.link)
    }
}

/// Every assignment declared in a VlanConfig spec, in declaration order
pub fn assignments(spec: &VlanConfigSpec) -> Vec<VlanAssignment> {
    spec.vlans.iter().flat_map(VlanAssignment::from_entry).collect()
}

/// Configures, removes, verifies and lists VLAN sub-interfaces
pub struct VlanService {
    ctx: PassContext,
    executor: NodeExecutor,
}

impl VlanService {
    /// Create a service bound to a pass context
    pub fn new(ctx: PassContext) -> Self {
        let executor = ctx.executor();
        Self { ctx, executor }
    }

    /// Create every declared sub-interface and assign its address
    pub async fn configure(&self, spec: &VlanConfigSpec) -> OperationReport {
        let targets = assignments(spec);
        let report = run_pass(
            self.ctx.cli(),
            "vlan configure",
            &targets,
            self.ctx.settings().validate_nodes,
            |a| self.configure_one(a),
        )
        .await;
        self.with_cleanup(report).await
    }

    /// Delete every declared sub-interface; missing links count as removed
    pub async fn remove(&self, spec: &VlanConfigSpec) -> OperationReport {
        let targets = assignments(spec);
        let report = run_pass(
            self.ctx.cli(),
            "vlan remove",
            &targets,
            self.ctx.settings().validate_nodes,
            |a| self.remove_one(a),
        )
        .await;
        self.with_cleanup(report).await
    }

    /// Check each sub-interface exists and carries its declared address
    pub async fn verify(&self, spec: &VlanConfigSpec) -> OperationReport {
        let targets = assignments(spec);
        let report = run_pass(
            self.ctx.cli(),
            "vlan verify",
            &targets,
            false,
            |a| self.verify_one(a),
        )
        .await;
        self.with_cleanup(report).await
    }

    /// Declared assignments; reads nothing from the cluster
    pub fn list(&self, spec: &VlanConfigSpec) -> Vec<VlanAssignment> {
        assignments(spec)
    }

    async fn with_cleanup(&self, mut report: OperationReport) -> OperationReport {
        if report.total_targets == 0 {
            return report;
        }
        let cleanup = cleanup_debug_pods(
            self.ctx.cli(),
            self.ctx.settings(),
            &PodSelectors::default(),
            self.ctx.cancel(),
        )
        .await;
        report.cleanup = Some(cleanup);
        report
    }

    async fn configure_one(&self, a: &VlanAssignment) -> TargetOutcome {
        match self.executor.exec_node_command(&a.node, &a.configure_script()).await {
            Ok(out) => {
                log_exec(a, "configured", &out);
                let mut outcome = TargetOutcome::default();
                outcome.succeed(format!("{} {}", a.link, a.cidr()));
                outcome
            }
            Err(e) => TargetOutcome::from_error(a.link.as_str(), e),
        }
    }

    async fn remove_one(&self, a: &VlanAssignment) -> TargetOutcome {
        match self.executor.exec_node_command(&a.node, &a.remove_script()).await {
            Ok(out) => {
                log_exec(a, "removed", &out);
                let mut outcome = TargetOutcome::default();
                outcome.succeed(a.link.as_str());
                if !out.simulated && out.output.contains(ALREADY_ABSENT) {
                    outcome.note(ALREADY_ABSENT);
                }
                outcome
            }
            Err(e) => TargetOutcome::from_error(a.link.as_str(), e),
        }
    }

    async fn verify_one(&self, a: &VlanAssignment) -> TargetOutcome {
        let out = match self.executor.exec_node_command(&a.node, &a.verify_command()).await {
            Ok(out) => out,
            Err(e) => return TargetOutcome::from_error(a.link.as_str(), e),
        };

        let mut outcome = TargetOutcome::default();
        if out.simulated || has_address(&out.output, &a.cidr()) {
            outcome.succeed(format!("{} {}", a.link, a.cidr()));
        } else {
            outcome.fail(
                format!("{} {}", a.link, a.cidr()),
                Error::verification(
                    format!("{} {}", a.node, a.link),
                    format!("address {} not present", a.cidr()),
                ),
            );
        }
        outcome
    }
}

fn log_exec(a: &VlanAssignment, action: &str, out: &ExecOutput) {
    info!(
        node = %a.node,
        link = %a.link,
        pod = out.pod.as_deref().unwrap_or("-"),
        simulated = out.simulated,
        "VLAN {}", action
    );
}

/// True if `ip -o addr` output lists `cidr` as an inet/inet6 address
fn has_address(output: &str, cidr: &str) -> bool {
    output.lines().any(|line| {
        let mut words = line.split_whitespace();
        while let Some(word) = words.next() {
            if (word == "inet" || word == "inet6") && words.next() == Some(cidr) {
                return true;
            }
        }
        false
    })
}
