//! Cluster CLI adapter
//!
//! Every interaction with the cluster goes through one kubectl invocation at a
//! time. The [`ClusterCli`] trait abstracts command execution for testability;
//! [`KubectlCli`] is the real implementation that spawns the binary.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::settings::RunSettings;
use crate::{Error, Result};

/// Why an adapter call did not succeed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandFailure {
    /// Process ran and exited non-zero
    Exit(Option<i32>),
    /// Process could not be spawned
    Spawn(String),
    /// Process exceeded the per-call timeout and was killed
    TimedOut(Duration),
    /// Caller cancelled the call
    Cancelled,
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exit(Some(code)) => write!(f, "exit status {}", code),
            Self::Exit(None) => write!(f, "terminated by signal"),
            Self::Spawn(e) => write!(f, "failed to execute: {}", e),
            Self::TimedOut(d) => write!(f, "timed out after {:?}", d),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of a single adapter call
///
/// `output` is stdout followed by stderr. Consumed immediately by the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandResult {
    /// True when the process exited zero
    pub success: bool,
    /// Combined stdout and stderr
    pub output: String,
    /// Failure reason when `success` is false
    pub error: Option<CommandFailure>,
}

impl CommandResult {
    /// Successful result with the given output
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    /// Failed result with the given output and reason
    pub fn failed(output: impl Into<String>, error: CommandFailure) -> Self {
        Self {
            success: false,
            output: output.into(),
            error: Some(error),
        }
    }

    /// Returns true if the call failed because it was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self.error, Some(CommandFailure::Cancelled))
    }

    /// Convert into a `Result`, keeping output on success
    ///
    /// `args` is only used to describe the failing command.
    pub fn into_result(self, args: &[String]) -> Result<String> {
        if self.success {
            return Ok(self.output);
        }
        match self.error {
            Some(CommandFailure::Cancelled) => Err(Error::cancelled(args.join(" "))),
            Some(failure) => {
                let output = self.output.trim();
                if output.is_empty() {
                    Err(Error::command(args, failure.to_string()))
                } else {
                    Err(Error::command(args, format!("{}: {}", failure, output)))
                }
            }
            None => Err(Error::command(args, self.output.trim().to_string())),
        }
    }
}

/// Build an owned argv from string slices
pub fn argv<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

/// Trait for issuing cluster CLI invocations
///
/// One call runs one command and blocks the caller until it exits. No retries
/// at this layer.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterCli: Send + Sync {
    /// Run the CLI with the given arguments
    async fn run(&self, args: &[String]) -> CommandResult;
}

/// [`ClusterCli`] backed by the kubectl binary
pub struct KubectlCli {
    binary: String,
    kubeconfig: Option<PathBuf>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl KubectlCli {
    /// Create an adapter from run settings
    ///
    /// `cancel` aborts any in-flight invocation when triggered.
    pub fn new(settings: &RunSettings, cancel: CancellationToken) -> Self {
        Self {
            binary: settings.kubectl.clone(),
            kubeconfig: settings.kubeconfig.clone(),
            timeout: settings.command_timeout,
            cancel,
        }
    }

    /// Full argv including the global `--kubeconfig` flag when configured
    fn full_args(&self, args: &[String]) -> Vec<String> {
        let mut full = Vec::with_capacity(args.len() + 2);
        if let Some(path) = &self.kubeconfig {
            full.push("--kubeconfig".to_string());
            full.push(path.to_string_lossy().into_owned());
        }
        full.extend(args.iter().cloned());
        full
    }
}

#[async_trait]
impl ClusterCli for KubectlCli {
    async fn run(&self, args: &[String]) -> CommandResult {
        let full = self.full_args(args);
        debug!(binary = %self.binary, args = ?full, "Running cluster CLI");

        let mut cmd = Command::new(&self.binary);
        cmd.args(&full).kill_on_drop(true);

        let output = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!(args = ?full, "Cluster CLI call cancelled");
                return CommandResult::failed(String::new(), CommandFailure::Cancelled);
            }
            res = tokio::time::timeout(self.timeout, cmd.output()) => res,
        };

        let output = match output {
            Err(_) => {
                return CommandResult::failed(String::new(), CommandFailure::TimedOut(self.timeout))
            }
            Ok(Err(e)) => {
                return CommandResult::failed(String::new(), CommandFailure::Spawn(e.to_string()))
            }
            Ok(Ok(output)) => output,
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            CommandResult::ok(combined)
        } else {
            CommandResult::failed(combined, CommandFailure::Exit(output.status.code()))
        }
    }
}
