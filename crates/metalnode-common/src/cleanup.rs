//! Debug pod cleanup sweep
//!
//! Runs after any pass that may have created debug pods. Deletion failures
//! are warnings; the sweep never fails a pass.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dry_run::DRY_RUN_MARKER;
use crate::kubectl::{argv, ClusterCli};
use crate::settings::RunSettings;
use crate::Result;

/// Optional selectors narrowing a pod listing
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PodSelectors {
    /// `--field-selector` value
    pub field_selector: Option<String>,
    /// `--selector` (label selector) value
    pub label_selector: Option<String>,
}

/// What the sweep found and did
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    /// Pods whose name matched the debug pattern
    pub matched: Vec<String>,
    /// Pods deleted (or that would be, in dry-run)
    pub deleted: Vec<String>,
    /// Pods whose deletion failed
    pub failed: Vec<String>,
    /// True when deletions were simulated
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub simulated: bool,
}

/// List pod names in `namespace`, without the `pod/` prefix
pub async fn list_pods(
    cli: &dyn ClusterCli,
    namespace: &str,
    selectors: &PodSelectors,
) -> Result<Vec<String>> {
    let mut args = argv(["get", "pods", "-n", namespace, "-o", "name"]);
    if let Some(fs) = &selectors.field_selector {
        args.push("--field-selector".to_string());
        args.push(fs.clone());
    }
    if let Some(ls) = &selectors.label_selector {
        args.push("--selector".to_string());
        args.push(ls.clone());
    }

    let output = cli.run(&args).await.into_result(&args)?;
    Ok(output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| l.strip_prefix("pod/").unwrap_or(l).to_string())
        .collect())
}

/// Delete leftover debug pods whose name contains the configured pattern
///
/// Sleeps `settle_delay` first so pods from the pass can reach a terminal
/// phase. Cancellation during the wait skips the sweep.
pub async fn cleanup_debug_pods(
    cli: &dyn ClusterCli,
    settings: &RunSettings,
    selectors: &PodSelectors,
    cancel: &CancellationToken,
) -> CleanupReport {
    let mut report = CleanupReport {
        simulated: settings.dry_run,
        ..Default::default()
    };

    if !settings.settle_delay.is_zero() {
        debug!(delay = ?settings.settle_delay, "Waiting before cleanup sweep");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Cleanup sweep cancelled, debug pods left for the next run");
                return report;
            }
            _ = tokio::time::sleep(settings.settle_delay) => {}
        }
    }

    let pods = match list_pods(cli, &settings.namespace, selectors).await {
        Ok(pods) => pods,
        Err(e) => {
            warn!(error = %e, "Cleanup sweep could not list pods");
            return report;
        }
    };

    report.matched = pods
        .into_iter()
        .filter(|p| p.contains(&settings.debug_pod_pattern))
        .collect();

    for pod in &report.matched {
        if settings.dry_run {
            info!(pod = %pod, "{} would delete debug pod", DRY_RUN_MARKER);
            report.deleted.push(pod.clone());
            continue;
        }

        let args = argv([
            "delete",
            "pod",
            pod.as_str(),
            "-n",
            settings.namespace.as_str(),
            "--ignore-not-found",
        ]);
        match cli.run(&args).await.into_result(&args) {
            Ok(_) => {
                debug!(pod = %pod, "Deleted debug pod");
                report.deleted.push(pod.clone());
            }
            Err(e) => {
                warn!(pod = %pod, error = %e, "Failed to delete debug pod");
                report.failed.push(pod.clone());
            }
        }
    }

    if !report.matched.is_empty() {
        info!(
            matched = report.matched.len(),
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "Cleanup sweep finished"
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCli;

    const PODS: &str = "pod/node-debugger-rsb1-abcde\npod/web-7d9f\npod/node-debugger-rsb2-fghij\n";

    async fn sweep(cli: &ScriptedCli, settings: &RunSettings) -> CleanupReport {
        cleanup_debug_pods(cli, settings, &PodSelectors::default(), &CancellationToken::new()).await
    }

    #[tokio::test]
    async fn deletes_only_matching_pods() {
        let cli = ScriptedCli::new();
        cli.ok(&["get", "pods"], PODS)
            .ok(&["delete", "pod"], "pod deleted");

        let report = sweep(&cli, &RunSettings::for_tests()).await;

        assert_eq!(
            report.deleted,
            vec![
                "node-debugger-rsb1-abcde".to_string(),
                "node-debugger-rsb2-fghij".to_string()
            ]
        );
        assert_eq!(cli.count(&["delete", "pod", "node-debugger-rsb1-abcde"]), 1);
        assert_eq!(cli.count(&["delete", "pod", "node-debugger-rsb2-fghij"]), 1);
        assert_eq!(cli.count(&["delete", "pod", "web-7d9f"]), 0);
    }

    #[tokio::test]
    async fn deletion_failures_are_reported_not_raised() {
        let cli = ScriptedCli::new();
        cli.ok(&["get", "pods"], PODS)
            .ok(&["delete", "pod", "node-debugger-rsb1-abcde"], "deleted")
            .fail(&["delete", "pod", "node-debugger-rsb2-fghij"], "forbidden");

        let report = sweep(&cli, &RunSettings::for_tests()).await;
        assert_eq!(report.deleted.len(), 1);
        assert_eq!(report.failed, vec!["node-debugger-rsb2-fghij".to_string()]);
    }

    #[tokio::test]
    async fn listing_failure_yields_empty_report() {
        let cli = ScriptedCli::new();
        cli.fail(&["get", "pods"], "Unable to connect to the server");

        let report = sweep(&cli, &RunSettings::for_tests()).await;
        assert_eq!(report, CleanupReport::default());
    }

    #[tokio::test]
    async fn dry_run_lists_but_never_deletes() {
        let cli = ScriptedCli::new();
        cli.ok(&["get", "pods"], PODS);
        let settings = RunSettings {
            dry_run: true,
            ..RunSettings::for_tests()
        };

        let report = sweep(&cli, &settings).await;
        assert!(report.simulated);
        assert_eq!(report.deleted.len(), 2);
        assert_eq!(cli.count(&["delete"]), 0);
    }

    #[tokio::test]
    async fn cancellation_during_settle_skips_the_sweep() {
        let cli = ScriptedCli::new();
        cli.ok(&["get", "pods"], PODS);
        let settings = RunSettings {
            settle_delay: std::time::Duration::from_secs(3600),
            ..RunSettings::for_tests()
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = cleanup_debug_pods(&cli, &settings, &PodSelectors::default(), &cancel).await;
        assert_eq!(report, CleanupReport::default());
        assert!(cli.calls().is_empty());
    }

    #[tokio::test]
    async fn selectors_are_passed_through() {
        let cli = ScriptedCli::new();
        cli.ok(&["get", "pods"], "");
        let selectors = PodSelectors {
            field_selector: Some("status.phase!=Running".to_string()),
            label_selector: Some("app=debug".to_string()),
        };

        let pods = list_pods(&cli, "default", &selectors).await.unwrap();
        assert!(pods.is_empty());
        assert_eq!(
            cli.calls()[0],
            argv([
                "get",
                "pods",
                "-n",
                "default",
                "-o",
                "name",
                "--field-selector",
                "status.phase!=Running",
                "--selector",
                "app=debug"
            ])
        );
    }
}
