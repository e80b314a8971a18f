//! VLAN command

use std::path::PathBuf;

use clap::{Args, Subcommand};
use tracing::info;

use metalnode_common::manifest::Bundle;
use metalnode_reconcile::vlan::VlanAssignment;
use metalnode_reconcile::VlanService;

use super::{require_documents, FileArgs, Session};
use crate::output::{ensure_success, print_json, print_reports, print_table, OutputFormat};
use crate::Result;

#[derive(Args, Debug)]
pub struct VlanArgs {
    #[command(subcommand)]
    pub action: VlanAction,
}

#[derive(Subcommand, Debug)]
pub enum VlanAction {
    /// Create VLAN sub-interfaces and assign addresses
    Configure(FileArgs),
    /// Delete VLAN sub-interfaces
    Remove(FileArgs),
    /// Check sub-interfaces carry their declared addresses
    Verify(FileArgs),
    /// Show the declared network table
    List(FileArgs),
}

impl VlanArgs {
    pub(crate) fn files(&self) -> &[PathBuf] {
        match &self.action {
            VlanAction::Configure(f)
            | VlanAction::Remove(f)
            | VlanAction::Verify(f)
            | VlanAction::List(f) => &f.files,
        }
    }
}

pub async fn run(args: VlanArgs, session: &Session, bundle: &Bundle) -> Result<()> {
    require_documents(bundle.vlan_configs().count(), "VlanConfig")?;

    if let VlanAction::List(_) = args.action {
        let rows: Vec<VlanAssignment> = bundle
            .vlan_configs()
            .flat_map(|doc| VlanService::new(session.context().for_document(&doc.tools)).list(&doc.spec))
            .collect();
        return print_assignments(&rows, session.output());
    }

    let mut reports = Vec::new();
    for doc in bundle.vlan_configs() {
        info!(document = %doc.id(), vlans = doc.spec.vlans.len(), "Reconciling VLANs");
        let service = VlanService::new(session.context().for_document(&doc.tools));
        let report = match args.action {
            VlanAction::Configure(_) => service.configure(&doc.spec).await,
            VlanAction::Remove(_) => service.remove(&doc.spec).await,
            VlanAction::Verify(_) | VlanAction::List(_) => service.verify(&doc.spec).await,
        };
        reports.push(report);
    }

    print_reports(&reports, session.output())?;
    ensure_success(&reports)
}

fn print_assignments(rows: &[VlanAssignment], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(rows),
        OutputFormat::Table => {
            let rows: Vec<Vec<String>> = rows
                .iter()
                .map(|a| {
                    vec![
                        a.network.clone(),
                        a.vlan_id.to_string(),
                        a.node.clone(),
                        a.link.clone(),
                        a.cidr(),
                        a.mtu.map(|m| m.to_string()).unwrap_or_else(|| "-".to_string()),
                    ]
                })
                .collect();
            print_table(&["NETWORK", "VLAN", "NODE", "LINK", "ADDRESS", "MTU"], &rows);
            Ok(())
        }
    }
}
