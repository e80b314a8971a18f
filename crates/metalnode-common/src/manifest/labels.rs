//! NodeLabels documents

use std::collections::{BTreeMap, BTreeSet};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::ManifestSpec;
use crate::reconcile::Target;
use crate::{Error, Result};

const MAX_NAME_LEN: usize = 63;
const MAX_PREFIX_LEN: usize = 253;

/// Desired labels per node
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeLabelsSpec {
    /// Nodes and the labels each should carry
    #[serde(default)]
    pub nodes: Vec<NodeLabelEntry>,
}

/// Labels for one node
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct NodeLabelEntry {
    /// Node name
    pub name: String,
    /// Label key to value; numbers and booleans are accepted as strings
    #[serde(default, deserialize_with = "scalar_map")]
    pub labels: BTreeMap<String, String>,
}

impl Target for NodeLabelEntry {
    fn id(&self) -> String {
        self.name.clone()
    }

    fn node(&self) -> &str {
        &self.name
    }
}

impl ManifestSpec for NodeLabelsSpec {
    const KIND: &'static str = "NodeLabels";

    fn validate(&self, document: &str) -> Result<()> {
        let mut seen = BTreeSet::new();
        for entry in &self.nodes {
            if entry.name.trim().is_empty() {
                return Err(Error::config(document, "node name cannot be empty"));
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(Error::config(
                    document,
                    format!("node {} is listed more than once", entry.name),
                ));
            }
            for (key, value) in &entry.labels {
                validate_label(key, value).map_err(|msg| {
                    Error::config(document, format!("node {}: {}", entry.name, msg))
                })?;
            }
        }
        Ok(())
    }
}

/// Check a label key/value against Kubernetes label syntax
///
/// Keys are `[prefix/]name`; names and values are at most 63 characters of
/// alphanumerics, `-`, `_` and `.`, starting and ending alphanumeric.
pub fn validate_label(key: &str, value: &str) -> std::result::Result<(), String> {
    let name = match key.rsplit_once('/') {
        Some((prefix, name)) => {
            if prefix.is_empty() || prefix.len() > MAX_PREFIX_LEN {
                return Err(format!("label key {} has an invalid prefix", key));
            }
            name
        }
        None => key,
    };
    if name.is_empty() || !is_label_segment(name) {
        return Err(format!("invalid label key '{}'", key));
    }
    if !value.is_empty() && !is_label_segment(value) {
        return Err(format!("invalid value '{}' for label {}", value, key));
    }
    Ok(())
}

fn is_label_segment(s: &str) -> bool {
    let bytes = s.as_bytes();
    s.len() <= MAX_NAME_LEN
        && bytes.first().is_some_and(u8::is_ascii_alphanumeric)
        && bytes.last().is_some_and(u8::is_ascii_alphanumeric)
        && bytes
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

fn scalar_map<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| match value {
            Value::String(s) => Ok((key, s)),
            Value::Number(n) => Ok((key, n.to_string())),
            Value::Bool(b) => Ok((key, b.to_string())),
            Value::Null => Ok((key, String::new())),
            other => Err(D::Error::custom(format!(
                "label {} must be a scalar, got {}",
                key, other
            ))),
        })
        .collect()
}
