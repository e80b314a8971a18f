//! Cleanup command
//!
//! Runs the debug pod sweep on its own. No pass precedes it, so there is no
//! settling delay, and deletion failures are reported as warnings.

use std::time::Duration;

use clap::Args;
use tracing::warn;

use metalnode_common::cleanup::{cleanup_debug_pods, CleanupReport, PodSelectors};
use metalnode_common::RunSettings;

use super::Session;
use crate::output::{print_json, print_table, OutputFormat};
use crate::Result;

#[derive(Args, Debug, Default)]
pub struct CleanupArgs {
    /// Only consider pods matching this field selector
    #[arg(long)]
    pub field_selector: Option<String>,

    /// Only consider pods matching this label selector
    #[arg(short = 'l', long)]
    pub selector: Option<String>,
}

pub async fn run(args: CleanupArgs, session: &Session) -> Result<()> {
    let selectors = PodSelectors {
        field_selector: args.field_selector,
        label_selector: args.selector,
    };
    let ctx = session.context();
    let settings = RunSettings {
        settle_delay: Duration::ZERO,
        ..ctx.settings().clone()
    };
    let report = cleanup_debug_pods(ctx.cli(), &settings, &selectors, ctx.cancel()).await;

    print_cleanup(&report, session.output())?;
    if !report.failed.is_empty() {
        warn!(
            failed = report.failed.len(),
            pods = %report.failed.join(", "),
            "Some debug pods could not be deleted"
        );
    }
    Ok(())
}

fn print_cleanup(report: &CleanupReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let status = |pod: &String| {
                if report.failed.contains(pod) {
                    "FAILED"
                } else if report.simulated {
                    "would delete"
                } else {
                    "deleted"
                }
            };
            let rows: Vec<Vec<String>> = report
                .matched
                .iter()
                .map(|pod| vec![pod.clone(), status(pod).to_string()])
                .collect();
            print_table(&["POD", "STATUS"], &rows);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use metalnode_common::testing::ScriptedCli;
    use metalnode_reconcile::PassContext;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::commands::test_support::session;

    #[tokio::test]
    async fn sweeps_debug_pods_with_selectors() {
        let cli = Arc::new(ScriptedCli::new());
        cli.ok(&["get", "pods"], "pod/node-debugger-rsb1-q8m4z\npod/web-1\n")
            .ok(&["delete", "pod"], "pod deleted");

        let args = CleanupArgs {
            field_selector: Some("status.phase!=Running".to_string()),
            selector: None,
        };
        run(args, &session(cli.clone())).await.unwrap();

        assert_eq!(cli.count(&["delete", "pod", "node-debugger-rsb1-q8m4z"]), 1);
        assert_eq!(cli.count(&["delete", "pod", "web-1"]), 0);
        assert!(cli.calls()[0].contains(&"--field-selector".to_string()));
    }

    #[tokio::test]
    async fn deletion_failure_is_only_a_warning() {
        let cli = Arc::new(ScriptedCli::new());
        cli.ok(&["get", "pods"], "pod/node-debugger-rsb1-q8m4z\npod/node-debugger-rsb2-x7k2p\n")
            .fail(&["delete", "pod", "node-debugger-rsb1-q8m4z"], "Error from server (Forbidden)")
            .ok(&["delete", "pod", "node-debugger-rsb2-x7k2p"], "pod deleted");

        run(CleanupArgs::default(), &session(cli.clone())).await.unwrap();
        assert_eq!(cli.count(&["delete", "pod"]), 2);
    }

    #[tokio::test]
    async fn standalone_sweep_does_not_wait_to_settle() {
        let cli = Arc::new(ScriptedCli::new());
        cli.ok(&["get", "pods"], "");
        let settings = RunSettings {
            settle_delay: Duration::from_secs(3600),
            ..RunSettings::for_tests()
        };
        let ctx = PassContext::new(cli.clone(), settings, CancellationToken::new());
        let session = Session::new(ctx, OutputFormat::Json);

        tokio::time::timeout(Duration::from_secs(5), run(CleanupArgs::default(), &session))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cli.count(&["get", "pods"]), 1);
    }
}
