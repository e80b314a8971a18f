//! Labels command

use std::path::PathBuf;

use clap::{Args, Subcommand};
use tracing::info;

use metalnode_common::manifest::Bundle;
use metalnode_reconcile::labels::NodeLabelListing;
use metalnode_reconcile::LabelService;

use super::{require_documents, FileArgs, Session};
use crate::output::{ensure_success, print_json, print_reports, print_table, OutputFormat};
use crate::Result;

#[derive(Args, Debug)]
pub struct LabelsArgs {
    #[command(subcommand)]
    pub action: LabelsAction,
}

#[derive(Subcommand, Debug)]
pub enum LabelsAction {
    /// Apply declared labels, overwriting existing values
    Apply(FileArgs),
    /// Remove declared label keys
    Remove(FileArgs),
    /// Compare node labels with the declared ones
    Verify(FileArgs),
    /// Show the current labels of declared nodes
    List(FileArgs),
}

impl LabelsArgs {
    pub(crate) fn files(&self) -> &[PathBuf] {
        match &self.action {
            LabelsAction::Apply(f)
            | LabelsAction::Remove(f)
            | LabelsAction::Verify(f)
            | LabelsAction::List(f) => &f.files,
        }
    }
}

pub async fn run(args: LabelsArgs, session: &Session, bundle: &Bundle) -> Result<()> {
    require_documents(bundle.node_labels().count(), "NodeLabels")?;

    if let LabelsAction::List(_) = args.action {
        let mut listings = Vec::new();
        for doc in bundle.node_labels() {
            let service = LabelService::new(session.context().for_document(&doc.tools));
            listings.extend(service.list(&doc.spec).await);
        }
        return print_listings(&listings, session.output());
    }

    let mut reports = Vec::new();
    for doc in bundle.node_labels() {
        info!(document = %doc.id(), dry_run = ?doc.tools.dry_run, "Reconciling node labels");
        let service = LabelService::new(session.context().for_document(&doc.tools));
        let report = match args.action {
            LabelsAction::Apply(_) => service.apply(&doc.spec).await,
            LabelsAction::Remove(_) => service.remove(&doc.spec).await,
            LabelsAction::Verify(_) | LabelsAction::List(_) => service.verify(&doc.spec).await,
        };
        reports.push(report);
    }

    print_reports(&reports, session.output())?;
    ensure_success(&reports)
}

fn print_listings(listings: &[NodeLabelListing], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(listings),
        OutputFormat::Table => {
            let rows: Vec<Vec<String>> = listings
                .iter()
                .map(|l| {
                    let labels = match &l.error {
                        Some(e) => format!("<error: {}>", e),
                        None => l
                            .labels
                            .iter()
                            .map(|(k, v)| format!("{}={}", k, v))
                            .collect::<Vec<_>>()
                            .join(","),
                    };
                    vec![l.node.clone(), labels]
                })
                .collect();
            print_table(&["NODE", "LABELS"], &rows);
            Ok(())
        }
    }
}
