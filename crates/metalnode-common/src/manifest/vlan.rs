//! VlanConfig documents

use std::collections::BTreeSet;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use super::ManifestSpec;
use crate::discovery::VlanTable;
use crate::{Error, Result};

const DEFAULT_PREFIX_LENGTH: u8 = 24;
const MAX_INTERFACE_LEN: usize = 15;

/// VLAN ID (1-4094)
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "u16", into = "u16")]
pub struct VlanId(u16);

impl VlanId {
    /// Validate a raw VLAN ID
    pub fn new(id: u16) -> std::result::Result<Self, &'static str> {
        if id == 0 || id > 4094 {
            Err("VLAN ID must be between 1 and 4094")
        } else {
            Ok(Self(id))
        }
    }

    /// Raw ID
    pub fn get(&self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for VlanId {
    type Error = &'static str;

    fn try_from(value: u16) -> std::result::Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VlanId> for u16 {
    fn from(vlan: VlanId) -> Self {
        vlan.0
    }
}

impl std::fmt::Display for VlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// VLAN interfaces to create on nodes
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VlanConfigSpec {
    /// VLAN definitions
    #[serde(default)]
    pub vlans: Vec<VlanEntry>,
}

/// One VLAN and its per-node addresses
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VlanEntry {
    /// 802.1Q tag
    pub id: VlanId,
    /// Logical network carried on this VLAN
    pub network: String,
    /// Parent NIC the VLAN sub-interface is created on
    pub interface: String,
    /// Prefix length of every node address
    #[serde(default = "default_prefix_length")]
    pub prefix_length: u8,
    /// Optional MTU for the sub-interface
    #[serde(default)]
    pub mtu: Option<u32>,
    /// Node address assignments
    #[serde(default)]
    pub nodes: Vec<VlanNodeEntry>,
}

/// Address of one node on a VLAN
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct VlanNodeEntry {
    /// Node name
    pub node: String,
    /// IPv4 or IPv6 address without prefix
    pub address: String,
}

fn default_prefix_length() -> u8 {
    DEFAULT_PREFIX_LENGTH
}

impl VlanEntry {
    /// Sub-interface name, e.g. `eno1.100`
    pub fn link_name(&self) -> String {
        format!("{}.{}", self.interface, self.id)
    }

    fn validate(&self, document: &str) -> Result<()> {
        let ctx = format!("vlan {}", self.id);
        if self.network.trim().is_empty() {
            return Err(Error::config(document, format!("{}: network cannot be empty", ctx)));
        }
        if self.interface.trim().is_empty() || self.interface.contains(char::is_whitespace) {
            return Err(Error::config(
                document,
                format!("{}: invalid parent interface '{}'", ctx, self.interface),
            ));
        }
        if self.link_name().len() > MAX_INTERFACE_LEN {
            return Err(Error::config(
                document,
                format!("{}: interface name {} is too long", ctx, self.link_name()),
            ));
        }
        if let Some(mtu) = self.mtu {
            if !(68..=9216).contains(&mtu) {
                return Err(Error::config(document, format!("{}: mtu {} out of range", ctx, mtu)));
            }
        }

        let mut seen = BTreeSet::new();
        for entry in &self.nodes {
            if entry.node.trim().is_empty() {
                return Err(Error::config(document, format!("{}: node name cannot be empty", ctx)));
            }
            if !seen.insert(entry.node.as_str()) {
                return Err(Error::config(
                    document,
                    format!("{}: node {} is listed more than once", ctx, entry.node),
                ));
            }
            let addr: IpAddr = entry.address.parse().map_err(|_| {
                Error::config(
                    document,
                    format!("{}: invalid address '{}' for node {}", ctx, entry.address, entry.node),
                )
            })?;
            let max_prefix = if addr.is_ipv4() { 32 } else { 128 };
            if self.prefix_length == 0 || self.prefix_length > max_prefix {
                return Err(Error::config(
                    document,
                    format!("{}: prefixLength {} invalid for {}", ctx, self.prefix_length, addr),
                ));
            }
        }
        Ok(())
    }
}

impl VlanConfigSpec {
    /// Network name to node to address
    pub fn table(&self) -> VlanTable {
        let mut table = VlanTable::new();
        for vlan in &self.vlans {
            let nodes = table.entry(vlan.network.clone()).or_default();
            for entry in &vlan.nodes {
                nodes.insert(entry.node.clone(), entry.address.clone());
            }
        }
        table
    }
}

impl ManifestSpec for VlanConfigSpec {
    const KIND: &'static str = "VlanConfig";

    fn validate(&self, document: &str) -> Result<()> {
        let mut ids = BTreeSet::new();
        for vlan in &self.vlans {
            if !ids.insert(vlan.id) {
                return Err(Error::config(
                    document,
                    format!("vlan {} is declared more than once", vlan.id),
                ));
            }
            vlan.validate(document)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(value: serde_json::Value) -> VlanConfigSpec {
        serde_json::from_value(value).unwrap()
    }

    fn storage_vlan() -> serde_json::Value {
        json!({
            "vlans": [{
                "id": 100,
                "network": "storage-net",
                "interface": "eno1",
                "nodes": [
                    {"node": "rsb1", "address": "10.100.0.1"},
                    {"node": "rsb2", "address": "10.100.0.2"}
                ]
            }]
        })
    }

    #[test]
    fn vlan_id_range() {
        assert!(VlanId::new(1).is_ok());
        assert!(VlanId::new(4094).is_ok());
        assert!(VlanId::new(0).is_err());
        assert!(VlanId::new(4095).is_err());

        let result: std::result::Result<VlanConfigSpec, _> = serde_json::from_value(json!({
            "vlans": [{"id": 5000, "network": "n", "interface": "eno1"}]
        }));
        assert!(result.is_err());
    }

    #[test]
    fn defaults_and_link_name() {
        let s = spec(storage_vlan());
        assert_eq!(s.vlans[0].prefix_length, 24);
        assert_eq!(s.vlans[0].mtu, None);
        assert_eq!(s.vlans[0].link_name(), "eno1.100");
        assert!(s.validate("VlanConfig/x").is_ok());
    }

    #[test]
    fn table_is_network_node_address() {
        let table = spec(storage_vlan()).table();
        assert_eq!(table["storage-net"]["rsb1"], "10.100.0.1");
        assert_eq!(table["storage-net"].len(), 2);
    }

    #[test]
    fn bad_address_is_rejected() {
        let mut value = storage_vlan();
        value["vlans"][0]["nodes"][0]["address"] = json!("10.100.0.300");
        let err = spec(value).validate("VlanConfig/x").unwrap_err();
        assert!(err.to_string().contains("invalid address"));
    }

    #[test]
    fn prefix_must_fit_address_family() {
        let mut value = storage_vlan();
        value["vlans"][0]["prefixLength"] = json!(64);
        assert!(spec(value).validate("VlanConfig/x").is_err());

        let v6 = spec(json!({
            "vlans": [{
                "id": 200, "network": "v6", "interface": "eno2", "prefixLength": 64,
                "nodes": [{"node": "rsb1", "address": "fd00::1"}]
            }]
        }));
        assert!(v6.validate("VlanConfig/x").is_ok());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut value = storage_vlan();
        let copy = value["vlans"][0].clone();
        value["vlans"].as_array_mut().unwrap().push(copy);
        assert!(spec(value).validate("VlanConfig/x").is_err());
    }

    #[test]
    fn overlong_interface_name_is_rejected() {
        let mut value = storage_vlan();
        value["vlans"][0]["interface"] = json!("enp129s0f1np1");
        assert!(spec(value).validate("VlanConfig/x").is_err());
    }
}
