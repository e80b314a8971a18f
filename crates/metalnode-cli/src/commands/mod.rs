//! CLI commands

use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use metalnode_common::manifest::Bundle;
use metalnode_common::{KubectlCli, RunSettings};
use metalnode_reconcile::PassContext;

use crate::output::OutputFormat;
use crate::{Error, GlobalArgs, Result};

pub mod cleanup;
pub mod labels;
pub mod validate;
pub mod vlan;

/// Extension trait to convert errors with Display to CLI Error::CommandFailed.
pub trait CommandErrorExt<T> {
    /// Convert an error to `Error::CommandFailed` using its Display implementation.
    fn cmd_err(self) -> Result<T>;
}

impl<T, E: Display> CommandErrorExt<T> for std::result::Result<T, E> {
    fn cmd_err(self) -> Result<T> {
        self.map_err(|e| Error::command_failed(e.to_string()))
    }
}

/// Document files for commands that read a bundle
#[derive(Args, Debug)]
pub struct FileArgs {
    /// YAML file(s) holding one or more `---` separated documents
    #[arg(short = 'f', long = "file", required = true)]
    pub files: Vec<PathBuf>,
}

/// Load every file into one bundle and overlay the global flags
pub fn load_bundle(files: &[PathBuf], global: &GlobalArgs) -> Result<Bundle> {
    let mut bundle = Bundle::load_files(files)?;
    bundle.apply_overrides(&global.overrides());
    Ok(bundle)
}

/// Base settings built from global flags and the environment
pub fn base_settings(global: &GlobalArgs) -> RunSettings {
    let mut settings = RunSettings {
        dry_run: global.dry_run,
        kubeconfig: global.kubeconfig.clone(),
        ..RunSettings::default()
    };
    if let Some(namespace) = &global.namespace {
        settings.namespace = namespace.clone();
    }
    if let Some(image) = &global.debug_image {
        settings.debug_image = image.clone();
    }
    if let Some(secs) = global.exec_timeout {
        settings.exec_timeout = Duration::from_secs(secs);
    }
    settings.with_env()
}

/// Everything a command needs to talk to the cluster and print results
pub struct Session {
    ctx: PassContext,
    output: OutputFormat,
}

impl Session {
    /// Real kubectl-backed session
    pub fn from_args(global: &GlobalArgs, cancel: CancellationToken) -> Self {
        let settings = base_settings(global);
        debug!(settings = ?settings, "Run settings");
        let cli = Arc::new(KubectlCli::new(&settings, cancel.clone()));
        Self::new(PassContext::new(cli, settings, cancel), global.output)
    }

    /// Session over an existing context
    pub fn new(ctx: PassContext, output: OutputFormat) -> Self {
        Self { ctx, output }
    }

    /// Base context; documents derive their own with `for_document`
    pub fn context(&self) -> &PassContext {
        &self.ctx
    }

    /// Requested output format
    pub fn output(&self) -> OutputFormat {
        self.output
    }
}

/// Fail when the bundle holds no documents of the kind a command needs
pub(crate) fn require_documents(count: usize, kind: &str) -> Result<()> {
    if count == 0 {
        return Err(Error::validation(format!("no {} documents in the given files", kind)));
    }
    info!(documents = count, kind, "Loaded documents");
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_shape_base_settings() {
        let global = GlobalArgs {
            dry_run: true,
            namespace: Some("metal-system".to_string()),
            exec_timeout: Some(90),
            kubeconfig: Some(PathBuf::from("/etc/metalnode/kubeconfig")),
            ..Default::default()
        };
        let settings = base_settings(&global);
        assert!(settings.dry_run);
        assert_eq!(settings.namespace, "metal-system");
        assert_eq!(settings.exec_timeout, Duration::from_secs(90));
        assert_eq!(
            settings.kubeconfig.as_deref(),
            Some(std::path::Path::new("/etc/metalnode/kubeconfig"))
        );
    }

    #[test]
    fn load_bundle_applies_global_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.yaml");
        std::fs::write(
            &path,
            "apiVersion: metalnode.io/v1alpha1\nkind: NodeLabels\nmetadata:\n  name: rack-a\ntools:\n  dryRun: false\nspec:\n  nodes: []\n",
        )
        .unwrap();

        let global = GlobalArgs {
            dry_run: true,
            ..Default::default()
        };
        let bundle = load_bundle(&[path], &global).unwrap();
        assert_eq!(bundle.documents[0].tools().dry_run, Some(true));
    }

    #[test]
    fn missing_documents_is_a_validation_error() {
        assert!(matches!(
            require_documents(0, "NodeLabels"),
            Err(Error::Validation { .. })
        ));
        assert!(require_documents(1, "NodeLabels").is_ok());
    }
}
