//! metalnode CLI library

pub mod commands;
pub mod error;
pub mod logging;
pub mod output;

pub use error::{Error, Result};

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use metalnode_common::manifest::{log_level_rank, GlobalFlags, LOG_LEVELS};

use crate::commands::Session;
use crate::output::OutputFormat;

/// metalnode - declarative bare-metal node labels, VLANs and connectivity checks
#[derive(Parser, Debug)]
#[command(name = "metalnode")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags accepted by every subcommand
#[derive(Args, Clone, Debug, Default)]
pub struct GlobalArgs {
    /// Simulate every mutation; overrides `tools.dryRun` in all documents
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Log level; overrides `tools.logLevel` in all documents
    #[arg(long, global = true, value_parser = parse_log_level)]
    pub log_level: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Kubeconfig passed to every kubectl call
    #[arg(long, global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Namespace debug pods are created in
    #[arg(long, global = true)]
    pub namespace: Option<String>,

    /// Image used for node debug pods
    #[arg(long, global = true)]
    pub debug_image: Option<String>,

    /// Seconds to wait for a node command to finish
    #[arg(long, global = true)]
    pub exec_timeout: Option<u64>,

    /// Output format
    #[arg(short, long, default_value = "table", global = true)]
    pub output: OutputFormat,
}

impl GlobalArgs {
    /// The flags that override document `tools` blocks
    pub fn overrides(&self) -> GlobalFlags {
        GlobalFlags {
            dry_run: self.dry_run,
            log_level: self.log_level.clone(),
        }
    }
}

fn parse_log_level(s: &str) -> std::result::Result<String, String> {
    match log_level_rank(s) {
        Some(_) => Ok(s.trim().to_ascii_lowercase()),
        None => Err(format!("expected one of {}", LOG_LEVELS.join(", "))),
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply, remove, verify or list node labels
    Labels(commands::labels::LabelsArgs),
    /// Configure, remove, verify or list VLAN sub-interfaces
    Vlan(commands::vlan::VlanArgs),
    /// Run connectivity tests between logical networks
    Test(commands::test::TestArgs),
    /// Delete leftover node debug pods
    Cleanup(commands::cleanup::CleanupArgs),
    /// Load and validate documents without touching the cluster
    Validate(commands::validate::ValidateArgs),
}

impl Commands {
    fn files(&self) -> Option<&[PathBuf]> {
        match self {
            Commands::Labels(args) => Some(args.files()),
            Commands::Vlan(args) => Some(args.files()),
            Commands::Test(args) => Some(args.files()),
            Commands::Validate(args) => Some(&args.files.files),
            Commands::Cleanup(_) => None,
        }
    }
}

impl Cli {
    /// Run the CLI command
    ///
    /// Documents are loaded before logging starts so their `tools.logLevel`
    /// can take part in the filter.
    pub async fn run(self) -> Result<()> {
        let bundle = match self.command.files() {
            Some(files) => Some(commands::load_bundle(files, &self.global)?),
            None => None,
        };
        logging::init(&self.global, bundle.as_ref().and_then(|b| b.log_level()))?;

        let cancel = CancellationToken::new();
        spawn_interrupt_handler(cancel.clone());
        let session = Session::from_args(&self.global, cancel);

        match (self.command, bundle) {
            (Commands::Labels(args), Some(bundle)) => {
                commands::labels::run(args, &session, &bundle).await
            }
            (Commands::Vlan(args), Some(bundle)) => commands::vlan::run(args, &session, &bundle).await,
            (Commands::Test(args), Some(bundle)) => commands::test::run(args, &session, &bundle).await,
            (Commands::Validate(_), Some(bundle)) => commands::validate::run(&bundle, &session),
            (Commands::Cleanup(args), _) => commands::cleanup::run(args, &session).await,
            (_, None) => Err(Error::validation("no documents loaded")),
        }
    }
}

/// Cancel in-flight kubectl calls and debug pod waits on Ctrl-C
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight operations");
            cancel.cancel();
        }
    });
}
