//! Report rendering

use clap::ValueEnum;
use serde::Serialize;

use metalnode_common::OperationReport;
use metalnode_reconcile::NetworkHealth;

use crate::{Error, Result};

/// Output format
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    /// Columnar table (default)
    #[default]
    Table,
    /// JSON
    Json,
}

/// Print rows as a column-aligned table with headers.
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    for line in render_table(headers, rows) {
        println!("{}", line);
    }
}

fn render_table(headers: &[&str], rows: &[Vec<String>]) -> Vec<String> {
    let num_cols = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < num_cols {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let format_row = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:<width$}", cell, width = w)
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![format_row(headers.to_vec())];
    lines.extend(
        rows.iter()
            .map(|row| format_row(row.iter().map(String::as_str).collect())),
    );
    lines
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Table rows for a pass report: TARGET, STATUS, SUCCEEDED, FAILED, NOTE
pub fn report_rows(report: &OperationReport) -> Vec<Vec<String>> {
    report
        .details
        .iter()
        .map(|(target, detail)| {
            vec![
                target.clone(),
                if detail.success { "ok" } else { "FAILED" }.to_string(),
                join_or_dash(&detail.succeeded),
                join_or_dash(&detail.failed),
                detail.note.clone().unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect()
}

fn join_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(",")
    }
}

/// Print pass reports in the requested format
pub fn print_reports(reports: &[OperationReport], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(reports),
        OutputFormat::Table => {
            for report in reports {
                print_report_table(report);
            }
            Ok(())
        }
    }
}

/// Print one report as a table plus its errors and cleanup summary
pub fn print_report_table(report: &OperationReport) {
    println!("{}", report.summary());
    print_table(
        &["TARGET", "STATUS", "SUCCEEDED", "FAILED", "NOTE"],
        &report_rows(report),
    );
    if !report.errors.is_empty() {
        println!("Errors:");
        for error in &report.errors {
            println!("  - {}", error);
        }
    }
    if let Some(cleanup) = &report.cleanup {
        println!(
            "Cleanup: {} debug pods matched, {} deleted{}, {} failed",
            cleanup.matched.len(),
            cleanup.deleted.len(),
            if cleanup.simulated { " (dry-run)" } else { "" },
            cleanup.failed.len()
        );
    }
    println!();
}

/// Table rows for network health: NETWORK, NODES, MATCHED, MISMATCHED, HEALTHY
pub fn health_rows(health: &[NetworkHealth]) -> Vec<Vec<String>> {
    health
        .iter()
        .map(|h| {
            vec![
                h.network.clone(),
                h.nodes.join(","),
                h.probes_matched.to_string(),
                h.probes_mismatched.to_string(),
                if h.healthy { "yes" } else { "no" }.to_string(),
            ]
        })
        .collect()
}

/// Fail with the summaries of every report that has failed targets
pub fn ensure_success<'a>(reports: impl IntoIterator<Item = &'a OperationReport>) -> Result<()> {
    let failed: Vec<String> = reports
        .into_iter()
        .filter(|r| !r.is_success())
        .map(OperationReport::summary)
        .collect();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(Error::Failed {
            summary: failed.join("; "),
        })
    }
}
