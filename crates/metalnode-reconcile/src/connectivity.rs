//! Connectivity tests between logical networks
//!
//! For each test the source and target networks are resolved to nodes, then
//! the first source node pings every target. A test passes when every probe's
//! reachability equals `expectSuccess`, so isolation tests pass when probes
//! get no reply. Per-network health is derived from the probes afterwards.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use metalnode_common::cleanup::{cleanup_debug_pods, PodSelectors};
use metalnode_common::discovery::{NodeDiscovery, VlanTable};
use metalnode_common::exec::NodeExecutor;
use metalnode_common::manifest::{ConnectivityCase, ConnectivitySpec};
use metalnode_common::probe::{reachability, Reachability};
use metalnode_common::{Error, OperationReport, Result, TargetOutcome};

use crate::PassContext;

/// Reachability summary of one logical network for a run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkHealth {
    /// Logical network name
    pub network: String,
    /// Nodes discovered on the network
    pub nodes: Vec<String>,
    /// Probes touching this network whose result matched expectation
    pub probes_matched: usize,
    /// Probes touching this network that did not match or errored
    pub probes_mismatched: usize,
    /// True when nodes were found and no probe mismatched
    pub healthy: bool,
}

/// Outcome of one ping from a source node to a target
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeRecord {
    /// Test the probe belongs to
    pub test: String,
    /// Node the ping ran on
    pub source: String,
    /// Target node
    pub target: String,
    /// Address pinged
    pub address: String,
    /// Observed reachability, absent when the probe errored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reachable: Option<bool>,
    /// Whether the observation matched `expectSuccess`
    pub matched: bool,
}

/// Report of a connectivity run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityReport {
    /// Per-test pass report
    #[serde(flatten)]
    pub report: OperationReport,
    /// Every probe, in order
    pub probes: Vec<ProbeRecord>,
    /// Health per involved network, sorted by name
    pub health: Vec<NetworkHealth>,
}

/// Ping command for one probe
pub fn ping_command(case: &ConnectivityCase, address: &str) -> String {
    format!(
        "ping -c {} -W {} {}",
        case.count, case.timeout_seconds, address
    )
}

#[derive(Default)]
struct HealthTally {
    nodes: BTreeSet<String>,
    matched: usize,
    mismatched: usize,
}

/// Runs connectivity tests
pub struct ConnectivityTester {
    ctx: PassContext,
    executor: NodeExecutor,
}

impl ConnectivityTester {
    /// Create a tester bound to a pass context
    pub fn new(ctx: PassContext) -> Self {
        let executor = ctx.executor();
        Self { ctx, executor }
    }

    /// Run every test in `spec`
    ///
    /// `vlan_table` backs discovery of network names with no known role and
    /// supplies target addresses. Fails as a whole only when the cluster's
    /// nodes cannot be listed at all.
    pub async fn run(
        &self,
        spec: &ConnectivitySpec,
        vlan_table: Option<VlanTable>,
    ) -> Result<ConnectivityReport> {
        let discovery = NodeDiscovery::new(
            self.ctx.shared_cli(),
            spec.exclude_nodes.iter().cloned(),
            vlan_table,
        );

        let cluster_nodes = discovery.list_nodes().await?;
        info!(
            nodes = cluster_nodes.len(),
            tests = spec.tests.len(),
            "Starting connectivity run"
        );

        let mut report = OperationReport::new("connectivity test", spec.tests.len());
        let mut probes = Vec::new();
        let mut tallies: BTreeMap<String, HealthTally> = BTreeMap::new();

        for case in &spec.tests {
            let outcome = self.run_case(&discovery, case, &mut probes, &mut tallies).await;
            if !outcome.is_success() {
                warn!(test = %case.name, "Connectivity test failed");
            }
            report.record(&case.name, outcome);
        }
        info!("{}", report.summary());

        if !probes.is_empty() {
            let cleanup = cleanup_debug_pods(
                self.ctx.cli(),
                self.ctx.settings(),
                &PodSelectors::default(),
                self.ctx.cancel(),
            )
            .await;
            report.cleanup = Some(cleanup);
        }

        Ok(ConnectivityReport {
            report,
            probes,
            health: health_from(tallies),
        })
    }

    async fn run_case(
        &self,
        discovery: &NodeDiscovery,
        case: &ConnectivityCase,
        probes: &mut Vec<ProbeRecord>,
        tallies: &mut BTreeMap<String, HealthTally>,
    ) -> TargetOutcome {
        let sources = match discovery.resolve_nodes(&case.source_network).await {
            Ok(nodes) => nodes,
            Err(e) => return TargetOutcome::from_error("resolve source", e),
        };
        tallies
            .entry(case.source_network.clone())
            .or_default()
            .nodes
            .extend(sources.iter().cloned());

        let targets = match discovery.resolve_nodes(&case.target_network).await {
            Ok(nodes) => nodes,
            Err(e) => return TargetOutcome::from_error("resolve target", e),
        };
        tallies
            .entry(case.target_network.clone())
            .or_default()
            .nodes
            .extend(targets.iter().cloned());

        let mut outcome = TargetOutcome::default();
        let Some(source) = sources.first() else {
            return outcome;
        };

        let mut probed = 0;
        for target in targets.iter().filter(|t| *t != source) {
            probed += 1;
            let address = target_address(discovery.vlan_table(), &case.target_network, target);
            let item = format!("{}->{}", source, target);
            let record = self.probe(case, source, target, &address).await;

            let matched = match &record {
                Ok(rec) => rec.matched,
                Err(_) => false,
            };
            let networks: BTreeSet<&String> = [&case.source_network, &case.target_network].into();
            for network in networks {
                let tally = tallies.entry(network.clone()).or_default();
                if matched {
                    tally.matched += 1;
                } else {
                    tally.mismatched += 1;
                }
            }

            match record {
                Ok(rec) => {
                    if rec.matched {
                        outcome.succeed(item);
                    } else {
                        outcome.fail(
                            item,
                            Error::verification(
                                format!("{} {}", case.name, rec.address),
                                format!(
                                    "expected {}, observed {}",
                                    describe(Some(case.expect_success)),
                                    describe(rec.reachable)
                                ),
                            ),
                        );
                    }
                    probes.push(rec);
                }
                Err(e) => {
                    probes.push(ProbeRecord {
                        test: case.name.clone(),
                        source: source.clone(),
                        target: target.clone(),
                        address,
                        reachable: None,
                        matched: false,
                    });
                    outcome.fail(item, e);
                }
            }
        }

        if probed == 0 {
            outcome.note("no targets besides the source node");
        }
        outcome
    }

    async fn probe(
        &self,
        case: &ConnectivityCase,
        source: &str,
        target: &str,
        address: &str,
    ) -> Result<ProbeRecord> {
        let out = self
            .executor
            .exec_node_command(source, &ping_command(case, address))
            .await?;

        let (reachable, matched) = match reachability(&out.output) {
            Reachability::Reachable => (Some(true), case.expect_success),
            Reachability::Unreachable => (Some(false), !case.expect_success),
            Reachability::Simulated => (None, true),
            Reachability::Unknown => (None, false),
        };
        debug!(
            test = %case.name,
            source = %source,
            target = %target,
            address = %address,
            reachable = ?reachable,
            matched,
            "Probe finished"
        );

        Ok(ProbeRecord {
            test: case.name.clone(),
            source: source.to_string(),
            target: target.to_string(),
            address: address.to_string(),
            reachable,
            matched,
        })
    }
}

/// VLAN table address of `node` on `network`, or the node name
fn target_address(table: Option<&VlanTable>, network: &str, node: &str) -> String {
    table
        .and_then(|t| t.get(network))
        .and_then(|nodes| nodes.get(node))
        .cloned()
        .unwrap_or_else(|| node.to_string())
}

fn describe(reachable: Option<bool>) -> &'static str {
    match reachable {
        Some(true) => "reachable",
        Some(false) => "unreachable",
        None => "no recognisable ping summary",
    }
}

fn health_from(tallies: BTreeMap<String, HealthTally>) -> Vec<NetworkHealth> {
    tallies
        .into_iter()
        .map(|(network, tally)| NetworkHealth {
            healthy: !tally.nodes.is_empty() && tally.mismatched == 0,
            network,
            nodes: tally.nodes.into_iter().collect(),
            probes_matched: tally.matched,
            probes_mismatched: tally.mismatched,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use metalnode_common::testing::ScriptedCli;

    use super::*;
    use crate::test_support::{context, dry_run_context, has_mutating_call, script_pod, POD_RSB1};

    const NO_REPLY: &str = "PING 10.0.0.3 (10.0.0.3): 56 data bytes\n\n\
--- 10.0.0.3 ping statistics ---\n\
3 packets transmitted, 0 packets received, 100% packet loss\n";

    const REPLY: &str = "PING 10.0.0.3 (10.0.0.3): 56 data bytes\n\
64 bytes from 10.0.0.3: seq=0 ttl=64 time=0.211 ms\n\n\
--- 10.0.0.3 ping statistics ---\n\
3 packets transmitted, 3 packets received, 0% packet loss\n";

    fn show_labels(node: &str, labels: &str) -> String {
        format!(
            "NAME   STATUS   ROLES    AGE   VERSION   LABELS\n{}   Ready    <none>   5d    v1.29.2   {}\n",
            node, labels
        )
    }

    /// rsb1 is a tenant worker; rsb2 and rsb3 are control nodes
    fn cluster() -> Arc<ScriptedCli> {
        let cli = Arc::new(ScriptedCli::new());
        cli.ok(&["get", "nodes", "-o", "name"], "node/rsb1\nnode/rsb2\nnode/rsb3\n")
            .ok(
                &["get", "node", "rsb1", "--show-labels"],
                &show_labels("rsb1", "kubernetes.io/hostname=rsb1"),
            )
            .ok(
                &["get", "node", "rsb2", "--show-labels"],
                &show_labels("rsb2", "role=control"),
            )
            .ok(
                &["get", "node", "rsb3", "--show-labels"],
                &show_labels("rsb3", "node-role.kubernetes.io/control-plane="),
            )
            .ok(&["get", "pods"], &format!("pod/{}\n", POD_RSB1))
            .ok(&["delete", "pod"], "pod deleted");
        cli
    }

    fn case(name: &str, source: &str, target: &str, expect_success: bool) -> ConnectivityCase {
        ConnectivityCase {
            name: name.to_string(),
            source_network: source.to_string(),
            target_network: target.to_string(),
            expect_success,
            count: 3,
            timeout_seconds: 2,
        }
    }

    fn spec(cases: Vec<ConnectivityCase>) -> ConnectivitySpec {
        ConnectivitySpec {
            exclude_nodes: Vec::new(),
            tests: cases,
        }
    }

    // ==========================================================================
    // Story: Isolation tests
    //
    // Tenant nodes must not reach management. Pings that get no reply make
    // the debug pod fail, but the zero-packets output means the isolation
    // works and the test passes.
    // ==========================================================================

    #[tokio::test]
    async fn tenant_to_management_isolation_passes_on_zero_packets() {
        let cli = cluster();
        let debug_rsb1 = ["debug", "node/rsb1"];
        cli.ok(&debug_rsb1, &crate::test_support::ack(POD_RSB1, "rsb1"))
            .ok(&["get", "pod", POD_RSB1], "Failed")
            .ok(&["logs", POD_RSB1], NO_REPLY);

        let tester = ConnectivityTester::new(context(cli.clone()));
        let result = tester
            .run(&spec(vec![case("tenant-isolated", "tenant", "management", false)]), None)
            .await
            .unwrap();

        assert!(result.report.is_success(), "{:?}", result.report.errors);
        assert_eq!(result.report.successful_targets, 1);
        assert_eq!(result.probes.len(), 2);
        assert!(result.probes.iter().all(|p| p.reachable == Some(false) && p.matched));
        assert_eq!(cli.count(&["debug"]), 2);

        let tenant = result.health.iter().find(|h| h.network == "tenant").unwrap();
        assert!(tenant.healthy);
        assert_eq!(tenant.nodes, vec!["rsb1".to_string()]);
    }

    #[tokio::test]
    async fn reachable_target_fails_an_isolation_test() {
        let cli = cluster();
        script_pod(&cli, "rsb1", POD_RSB1, "Succeeded", REPLY);

        let result = ConnectivityTester::new(context(cli))
            .run(&spec(vec![case("tenant-isolated", "tenant", "control", false)]), None)
            .await
            .unwrap();

        assert_eq!(result.report.failed_targets, vec!["tenant-isolated".to_string()]);
        let control = result.health.iter().find(|h| h.network == "control").unwrap();
        assert!(!control.healthy);
        assert_eq!(control.probes_mismatched, 2);
    }

    // ==========================================================================
    // Story: Reachability tests
    // ==========================================================================

    #[tokio::test]
    async fn reachable_targets_pass_and_use_vlan_addresses() {
        let cli = cluster();
        script_pod(&cli, "rsb1", POD_RSB1, "Succeeded", REPLY);
        let table = VlanTable::from([(
            "storage-net".to_string(),
            BTreeMap::from([
                ("rsb1".to_string(), "10.100.0.1".to_string()),
                ("rsb3".to_string(), "10.100.0.3".to_string()),
            ]),
        )]);

        let result = ConnectivityTester::new(context(cli.clone()))
            .run(&spec(vec![case("storage-up", "storage-net", "storage-net", true)]), Some(table))
            .await
            .unwrap();

        assert!(result.report.is_success());
        assert_eq!(result.probes.len(), 1);
        assert_eq!(result.probes[0].address, "10.100.0.3");
        let debug_call = cli
            .calls()
            .into_iter()
            .find(|c| c.first().map(String::as_str) == Some("debug"))
            .unwrap();
        assert_eq!(debug_call.last().unwrap(), "ping -c 3 -W 2 10.100.0.3");
    }

    #[tokio::test]
    async fn same_network_probes_are_counted_once() {
        let cli = cluster();
        script_pod(&cli, "rsb1", POD_RSB1, "Succeeded", REPLY);
        let table = VlanTable::from([(
            "storage-net".to_string(),
            BTreeMap::from([
                ("rsb1".to_string(), "10.100.0.1".to_string()),
                ("rsb3".to_string(), "10.100.0.3".to_string()),
            ]),
        )]);

        let result = ConnectivityTester::new(context(cli))
            .run(&spec(vec![case("storage-up", "storage-net", "storage-net", true)]), Some(table))
            .await
            .unwrap();

        assert_eq!(result.health.len(), 1);
        let storage = &result.health[0];
        assert_eq!(storage.network, "storage-net");
        assert_eq!(storage.probes_matched, result.probes.len());
        assert_eq!(storage.probes_mismatched, 0);
        assert!(storage.healthy);
    }

    #[tokio::test]
    async fn real_probe_failure_is_an_error_not_isolation() {
        let cli = cluster();
        script_pod(&cli, "rsb1", POD_RSB1, "Failed", "ping: bad address 'rsb2'\n");

        let result = ConnectivityTester::new(context(cli))
            .run(&spec(vec![case("tenant-isolated", "tenant", "control", false)]), None)
            .await
            .unwrap();

        assert_eq!(result.report.failed_targets, vec!["tenant-isolated".to_string()]);
        assert!(result.probes.iter().all(|p| p.reachable.is_none()));
        assert!(result.report.errors[0].contains("bad address"));
    }

    // ==========================================================================
    // Story: Discovery failures
    // ==========================================================================

    #[tokio::test]
    async fn node_listing_failure_aborts_the_run() {
        let cli = Arc::new(ScriptedCli::new());
        cli.fail(&["get", "nodes"], "Unable to connect to the server");

        let err = ConnectivityTester::new(context(cli))
            .run(&spec(vec![case("t", "tenant", "management", true)]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Command { .. }));
    }

    #[tokio::test]
    async fn unknown_network_fails_only_its_test() {
        let cli = cluster();
        script_pod(&cli, "rsb1", POD_RSB1, "Failed", NO_REPLY);

        let result = ConnectivityTester::new(context(cli))
            .run(
                &spec(vec![
                    case("bogus", "tenant", "backend", true),
                    case("tenant-isolated", "tenant", "control", false),
                ]),
                None,
            )
            .await
            .unwrap();

        assert_eq!(result.report.failed_targets, vec!["bogus".to_string()]);
        assert_eq!(result.report.successful_targets, 1);
    }

    #[tokio::test]
    async fn excluded_nodes_are_never_probed() {
        let cli = cluster();
        script_pod(&cli, "rsb1", POD_RSB1, "Failed", NO_REPLY);

        let mut s = spec(vec![case("tenant-isolated", "tenant", "control", false)]);
        s.exclude_nodes = vec!["rsb3".to_string()];
        let result = ConnectivityTester::new(context(cli)).run(&s, None).await.unwrap();

        assert_eq!(result.probes.len(), 1);
        assert_eq!(result.probes[0].target, "rsb2");
    }

    // ==========================================================================
    // Story: Dry-run
    // ==========================================================================

    #[tokio::test]
    async fn dry_run_probes_are_simulated_and_match() {
        let cli = cluster();

        let result = ConnectivityTester::new(dry_run_context(cli.clone()))
            .run(&spec(vec![case("tenant-isolated", "tenant", "management", false)]), None)
            .await
            .unwrap();

        assert!(result.report.is_success());
        assert!(result.probes.iter().all(|p| p.matched && p.reachable.is_none()));
        assert!(!has_mutating_call(&cli));
    }

    #[test]
    fn report_flattens_pass_fields() {
        let report = ConnectivityReport {
            report: OperationReport::new("connectivity test", 0),
            ..Default::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["operation"], "connectivity test");
        assert!(json["health"].as_array().unwrap().is_empty());
    }
}
