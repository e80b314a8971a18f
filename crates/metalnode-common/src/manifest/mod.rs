//! Declared configuration documents
//!
//! A bundle is one or more YAML documents separated by `---`. Every document
//! carries the same envelope:
//!
//! ```yaml
//! apiVersion: metalnode.io/v1alpha1
//! kind: NodeLabels | VlanConfig | ConnectivityTest
//! metadata:
//!   name: rack-a
//! tools:            # optional per-document overrides
//!   dryRun: true
//!   validateNodes: false
//!   logLevel: debug
//! spec: { ... }     # kind specific
//! ```
//!
//! CLI flags are overlaid on every document through [`ToolOverrides`], a typed
//! setter interface each document kind implements.

mod connectivity;
mod labels;
mod vlan;

pub use connectivity::{ConnectivityCase, ConnectivitySpec};
pub use labels::{validate_label, NodeLabelEntry, NodeLabelsSpec};
pub use vlan::{VlanConfigSpec, VlanEntry, VlanId, VlanNodeEntry};

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::discovery::VlanTable;
use crate::yaml;
use crate::{Error, Result, API_VERSION};

/// Log levels accepted in `tools.logLevel`, least verbose first
pub const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

/// Per-document tool overrides
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ToolsSpec {
    /// Simulate mutations for this document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
    /// Check node existence before mutating
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validate_nodes: Option<bool>,
    /// Log level requested by this document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl ToolsSpec {
    fn validate(&self, document: &str) -> Result<()> {
        match &self.log_level {
            Some(level) if log_level_rank(level).is_none() => Err(Error::config(
                document,
                format!(
                    "tools.logLevel '{}' must be one of {}",
                    level,
                    LOG_LEVELS.join(", ")
                ),
            )),
            _ => Ok(()),
        }
    }
}

/// Verbosity rank of a log level name (higher is more verbose)
pub fn log_level_rank(level: &str) -> Option<usize> {
    let level = level.trim().to_ascii_lowercase();
    LOG_LEVELS.iter().position(|l| *l == level)
}

/// Document metadata
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Metadata {
    /// Document name
    pub name: String,
}

/// Kind-specific document body
pub trait ManifestSpec: DeserializeOwned {
    /// Value of the document's `kind` field
    const KIND: &'static str;

    /// Check semantic constraints; `document` names the document in errors
    fn validate(&self, document: &str) -> Result<()>;
}

/// A typed, validated document
#[derive(Clone, Debug, PartialEq)]
pub struct Manifest<S> {
    /// Document metadata
    pub metadata: Metadata,
    /// Tool overrides after CLI precedence is applied
    pub tools: ToolsSpec,
    /// Kind-specific body
    pub spec: S,
}

impl<S: ManifestSpec> Manifest<S> {
    /// `Kind/name` identifier used in logs and errors
    pub fn id(&self) -> String {
        format!("{}/{}", S::KIND, self.metadata.name)
    }

    fn from_raw(raw: RawDocument) -> Result<Self> {
        let id = format!("{}/{}", S::KIND, raw.metadata.name);
        let spec_value = match raw.spec {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        let spec: S = serde_json::from_value(spec_value)
            .map_err(|e| Error::config(&id, format!("invalid spec: {}", e)))?;
        spec.validate(&id)?;

        let tools = raw.tools.unwrap_or_default();
        tools.validate(&id)?;

        Ok(Self {
            metadata: raw.metadata,
            tools,
            spec,
        })
    }
}

/// Typed setters for the overridable tool settings of any document kind
pub trait ToolOverrides {
    /// Document identifier for logging
    fn describe(&self) -> String;

    /// Force dry-run on or off
    fn set_dry_run(&mut self, dry_run: bool);

    /// Replace the log level
    fn set_log_level(&mut self, level: &str);
}

impl<S: ManifestSpec> ToolOverrides for Manifest<S> {
    fn describe(&self) -> String {
        self.id()
    }

    fn set_dry_run(&mut self, dry_run: bool) {
        self.tools.dry_run = Some(dry_run);
    }

    fn set_log_level(&mut self, level: &str) {
        self.tools.log_level = Some(level.to_string());
    }
}

/// Global CLI flags that take precedence over document `tools` blocks
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GlobalFlags {
    /// `--dry-run` was given
    pub dry_run: bool,
    /// `--log-level` value, if given
    pub log_level: Option<String>,
}

impl GlobalFlags {
    /// Overlay the flags that were given onto one document
    pub fn apply_to(&self, target: &mut dyn ToolOverrides) {
        if self.dry_run {
            target.set_dry_run(true);
        }
        if let Some(level) = &self.log_level {
            target.set_log_level(level);
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    api_version: String,
    kind: String,
    metadata: Metadata,
    #[serde(default)]
    spec: Value,
    #[serde(default)]
    tools: Option<ToolsSpec>,
}

/// Any supported document
#[derive(Clone, Debug, PartialEq)]
pub enum Document {
    /// Desired node labels
    NodeLabels(Manifest<NodeLabelsSpec>),
    /// VLAN interfaces and the static network table
    VlanConfig(Manifest<VlanConfigSpec>),
    /// Connectivity tests between logical networks
    ConnectivityTest(Manifest<ConnectivitySpec>),
}

impl Document {
    /// `Kind/name` identifier
    pub fn id(&self) -> String {
        match self {
            Self::NodeLabels(m) => m.id(),
            Self::VlanConfig(m) => m.id(),
            Self::ConnectivityTest(m) => m.id(),
        }
    }

    /// Tool overrides of this document
    pub fn tools(&self) -> &ToolsSpec {
        match self {
            Self::NodeLabels(m) => &m.tools,
            Self::VlanConfig(m) => &m.tools,
            Self::ConnectivityTest(m) => &m.tools,
        }
    }

    /// The document as an override target
    pub fn overrides_mut(&mut self) -> &mut dyn ToolOverrides {
        match self {
            Self::NodeLabels(m) => m,
            Self::VlanConfig(m) => m,
            Self::ConnectivityTest(m) => m,
        }
    }

    fn from_value(value: Value, origin: &str) -> Result<Self> {
        let raw: RawDocument = serde_json::from_value(value)
            .map_err(|e| Error::config(origin, format!("invalid document: {}", e)))?;

        if raw.api_version != API_VERSION {
            return Err(Error::config(
                origin,
                format!(
                    "unsupported apiVersion '{}', expected '{}'",
                    raw.api_version, API_VERSION
                ),
            ));
        }
        if raw.metadata.name.trim().is_empty() {
            return Err(Error::config(origin, "metadata.name cannot be empty"));
        }

        match raw.kind.as_str() {
            k if k == NodeLabelsSpec::KIND => Manifest::from_raw(raw).map(Self::NodeLabels),
            k if k == VlanConfigSpec::KIND => Manifest::from_raw(raw).map(Self::VlanConfig),
            k if k == ConnectivitySpec::KIND => {
                Manifest::from_raw(raw).map(Self::ConnectivityTest)
            }
            other => Err(Error::config(
                origin,
                format!("unsupported kind '{}'", other),
            )),
        }
    }
}

/// All documents loaded for one invocation
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bundle {
    /// Documents in load order
    pub documents: Vec<Document>,
}

impl Bundle {
    /// Parse a multi-document YAML string; `source` names it in errors
    pub fn parse(input: &str, source: &str) -> Result<Self> {
        let values = yaml::parse_documents(input)
            .map_err(|e| Error::config(source, format!("invalid YAML: {}", e)))?;

        let documents = values
            .into_iter()
            .enumerate()
            .map(|(i, value)| Document::from_value(value, &format!("{}#{}", source, i + 1)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { documents })
    }

    /// Load and concatenate bundles from files
    pub fn load_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut bundle = Self::default();
        for path in paths {
            let path = path.as_ref();
            let source = path.display().to_string();
            let content = std::fs::read_to_string(path)
                .map_err(|e| Error::config(&source, format!("failed to read: {}", e)))?;
            bundle.documents.extend(Self::parse(&content, &source)?.documents);
        }
        Ok(bundle)
    }

    /// Overlay global flags onto every document
    pub fn apply_overrides(&mut self, flags: &GlobalFlags) {
        for doc in &mut self.documents {
            let target = doc.overrides_mut();
            tracing::debug!(document = %target.describe(), "Applying global flag overrides");
            flags.apply_to(target);
        }
    }

    /// NodeLabels documents
    pub fn node_labels(&self) -> impl Iterator<Item = &Manifest<NodeLabelsSpec>> {
        self.documents.iter().filter_map(|d| match d {
            Document::NodeLabels(m) => Some(m),
            _ => None,
        })
    }

    /// VlanConfig documents
    pub fn vlan_configs(&self) -> impl Iterator<Item = &Manifest<VlanConfigSpec>> {
        self.documents.iter().filter_map(|d| match d {
            Document::VlanConfig(m) => Some(m),
            _ => None,
        })
    }

    /// ConnectivityTest documents
    pub fn connectivity_tests(&self) -> impl Iterator<Item = &Manifest<ConnectivitySpec>> {
        self.documents.iter().filter_map(|d| match d {
            Document::ConnectivityTest(m) => Some(m),
            _ => None,
        })
    }

    /// Static network table merged from every VlanConfig document
    ///
    /// `None` when the bundle has no VLAN configuration.
    pub fn vlan_table(&self) -> Option<VlanTable> {
        let mut configs = self.vlan_configs().peekable();
        configs.peek()?;

        let mut table = VlanTable::new();
        for config in configs {
            for (network, nodes) in config.spec.table() {
                table.entry(network).or_default().extend(nodes);
            }
        }
        Some(table)
    }

    /// Most verbose log level any document requests
    pub fn log_level(&self) -> Option<&str> {
        self.documents
            .iter()
            .filter_map(|d| d.tools().log_level.as_deref())
            .max_by_key(|level| log_level_rank(level))
    }
}
