//! Node and role discovery
//!
//! Resolves a logical network name to the nodes that sit on it. Known network
//! names map to a role, and nodes are matched by role inferred from their
//! labels. Unknown names fall back to the static VLAN node table.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::kubectl::{argv, ClusterCli};
use crate::{Error, Result};

/// Role that matches every node
pub const ROLE_ALL: &str = "all";

/// Role assumed when no known label matches
pub const DEFAULT_ROLE: &str = "worker";

/// Logical network name to role
const NETWORK_ROLES: &[(&str, &str)] = &[
    ("management", ROLE_ALL),
    ("control", "control"),
    ("storage", "storage"),
    ("compute", "compute"),
    ("tenant", "worker"),
];

/// Label substrings identifying a role, checked in order
const ROLE_MARKERS: &[(&str, &str)] = &[
    ("node-role.kubernetes.io/control-plane", "control"),
    ("node-role.kubernetes.io/master", "control"),
    ("role=control", "control"),
    ("storage", "storage"),
    ("compute", "compute"),
];

/// Static network -> node -> address table from VLAN configuration
pub type VlanTable = BTreeMap<String, BTreeMap<String, String>>;

/// Role for a known logical network name
pub fn role_for_network(network: &str) -> Option<&'static str> {
    NETWORK_ROLES
        .iter()
        .find(|(name, _)| *name == network)
        .map(|(_, role)| *role)
}

/// Infer a node's role from its comma-separated label string
pub fn infer_role(labels: &str) -> &'static str {
    ROLE_MARKERS
        .iter()
        .find(|(marker, _)| labels.contains(marker))
        .map(|(_, role)| *role)
        .unwrap_or(DEFAULT_ROLE)
}

/// Extract the LABELS column from `kubectl get node <n> --show-labels`
///
/// LABELS is the last column and contains no whitespace.
pub fn labels_column(output: &str) -> Option<&str> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .find(|line| !line.trim_start().starts_with("NAME"))
        .and_then(|line| line.split_whitespace().last())
}

/// Parse a LABELS column into key/value pairs
pub fn parse_labels(column: &str) -> BTreeMap<String, String> {
    column
        .split(',')
        .filter(|pair| !pair.is_empty() && *pair != "<none>")
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

/// Resolves logical networks to node names
pub struct NodeDiscovery {
    cli: Arc<dyn ClusterCli>,
    exclude: BTreeSet<String>,
    vlan_table: Option<VlanTable>,
}

impl NodeDiscovery {
    /// Create a resolver
    ///
    /// `exclude` nodes are never returned; `vlan_table` backs the fallback
    /// path for network names with no known role.
    pub fn new(
        cli: Arc<dyn ClusterCli>,
        exclude: impl IntoIterator<Item = String>,
        vlan_table: Option<VlanTable>,
    ) -> Self {
        Self {
            cli,
            exclude: exclude.into_iter().collect(),
            vlan_table,
        }
    }

    /// Static VLAN table, if one was supplied
    pub fn vlan_table(&self) -> Option<&VlanTable> {
        self.vlan_table.as_ref()
    }

    /// Names of every node in the cluster
    pub async fn list_nodes(&self) -> Result<Vec<String>> {
        let args = argv(["get", "nodes", "-o", "name"]);
        let output = self.cli.run(&args).await.into_result(&args)?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| l.strip_prefix("node/").unwrap_or(l).to_string())
            .collect())
    }

    /// Raw LABELS column for a node
    pub async fn node_label_string(&self, node: &str) -> Result<String> {
        let args = argv(["get", "node", node, "--show-labels"]);
        let output = self.cli.run(&args).await.into_result(&args)?;
        Ok(labels_column(&output).unwrap_or_default().to_string())
    }

    /// Role of a node, inferred from its labels
    pub async fn node_role(&self, node: &str) -> Result<&'static str> {
        let labels = self.node_label_string(node).await?;
        let role = infer_role(&labels);
        if role == DEFAULT_ROLE {
            debug!(node = %node, "No role label matched, defaulting to worker");
        }
        Ok(role)
    }

    /// Nodes on a logical network, minus exclusions
    ///
    /// Fails if node listing fails, if the network is unknown everywhere, or
    /// if nothing is left after exclusions.
    pub async fn resolve_nodes(&self, network: &str) -> Result<Vec<String>> {
        let nodes = match role_for_network(network) {
            Some(role) => self.nodes_with_role(role).await?,
            None => self.nodes_from_vlan_table(network)?,
        };

        if nodes.is_empty() {
            return Err(Error::discovery(
                network,
                "no nodes matched after exclusions",
            ));
        }
        debug!(network = %network, nodes = ?nodes, "Resolved network nodes");
        Ok(nodes)
    }

    async fn nodes_with_role(&self, role: &str) -> Result<Vec<String>> {
        let candidates: Vec<String> = self
            .list_nodes()
            .await?
            .into_iter()
            .filter(|n| !self.exclude.contains(n))
            .collect();

        if role == ROLE_ALL {
            return Ok(candidates);
        }

        let mut matched = Vec::new();
        for node in candidates {
            match self.node_role(&node).await {
                Ok(r) if r == role => matched.push(node),
                Ok(_) => {}
                Err(e) => warn!(node = %node, error = %e, "Could not determine node role"),
            }
        }
        Ok(matched)
    }

    fn nodes_from_vlan_table(&self, network: &str) -> Result<Vec<String>> {
        let table = self.vlan_table.as_ref().ok_or_else(|| {
            Error::discovery(network, "unknown network and no VLAN configuration loaded")
        })?;
        let nodes = table.get(network).ok_or_else(|| {
            Error::discovery(network, "network not found in VLAN configuration")
        })?;
        Ok(nodes
            .keys()
            .filter(|n| !self.exclude.contains(*n))
            .cloned()
            .collect())
    }
}
