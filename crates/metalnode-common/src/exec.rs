//! Remote command execution on cluster nodes
//!
//! The cluster has no "run this on a node" primitive, so each command gets its
//! own privileged debug pod:
//!
//! 1. `kubectl debug node/<n> --profile=sysadmin` starts a pod that chroots
//!    into the host filesystem and runs the command
//! 2. The pod name is parsed from kubectl's acknowledgment line
//! 3. The pod phase is polled until Succeeded/Failed or the deadline passes
//! 4. Pod logs are fetched and classified by [`crate::probe::interpret`]
//!
//! Debug pods are left in place; the cleanup sweep removes them after a pass.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dry_run;
use crate::kubectl::{argv, ClusterCli};
use crate::poll::{wait_with_timeout, WaitError};
use crate::probe::{self, Verdict};
use crate::settings::RunSettings;
use crate::{Error, Result};

/// Start of the line kubectl prints when it creates a node debug pod
pub const DEBUG_ACK_PREFIX: &str = "Creating debugging pod ";

/// Pod phase as reported by `.status.phase`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PodPhase {
    /// Accepted but not all containers started
    Pending,
    /// At least one container running
    Running,
    /// All containers exited zero
    Succeeded,
    /// At least one container exited non-zero
    Failed,
    /// Anything else, including an empty phase
    Unknown(String),
}

impl PodPhase {
    /// Parse the jsonpath phase output
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Returns true for phases a pod never leaves
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
            Self::Unknown(raw) if raw.is_empty() => write!(f, "Unknown"),
            Self::Unknown(raw) => write!(f, "{}", raw),
        }
    }
}

/// Extract the generated pod name from `kubectl debug` output
///
/// Expects `Creating debugging pod <name> with container <c> on node <n>.`
/// Returns `None` if the line is missing or its shape changed.
pub fn extract_debug_pod_name(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let start = line.find(DEBUG_ACK_PREFIX)?;
        let rest = &line[start + DEBUG_ACK_PREFIX.len()..];
        let name = rest.split_whitespace().next()?;
        let tail = rest[rest.find(name)? + name.len()..].trim_start();
        tail.starts_with("with container").then(|| name.to_string())
    })
}

/// Result of a remote command that did not fail
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecOutput {
    /// Captured pod output (or simulated text in dry-run)
    pub output: String,
    /// Debug pod that ran the command; `None` when simulated
    pub pod: Option<String>,
    /// True when dry-run skipped the real execution
    pub simulated: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionState {
    Pending,
    Succeeded,
    Failed,
    TimedOut,
}

/// One debug pod's lifecycle; owned by a single `exec_node_command` call
#[derive(Debug)]
struct DebugSession {
    node: String,
    pod: String,
    created_at: DateTime<Utc>,
    started: Instant,
    deadline: Instant,
    timeout: Duration,
    state: SessionState,
}

impl DebugSession {
    fn start(node: &str, pod: String, timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            node: node.to_string(),
            pod,
            created_at: Utc::now(),
            started,
            deadline: started + timeout,
            timeout,
            state: SessionState::Pending,
        }
    }

    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    fn time_out(&mut self) {
        self.state = SessionState::TimedOut;
    }

    fn finish(&mut self, verdict: Verdict) {
        self.state = if verdict.is_success() {
            SessionState::Succeeded
        } else {
            SessionState::Failed
        };
    }
}

/// Runs shell commands on nodes through ephemeral debug pods
#[derive(Clone)]
pub struct NodeExecutor {
    cli: Arc<dyn ClusterCli>,
    settings: Arc<RunSettings>,
    cancel: CancellationToken,
}

impl NodeExecutor {
    /// Create an executor; `cancel` aborts an in-progress wait
    pub fn new(
        cli: Arc<dyn ClusterCli>,
        settings: Arc<RunSettings>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cli,
            settings,
            cancel,
        }
    }

    /// Settings this executor was built with
    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Run `command` on `node` and wait for its result
    ///
    /// Errors: adapter failure creating the pod, no pod name in the
    /// acknowledgment, deadline elapsed, cancellation, or a terminal phase
    /// that [`probe::interpret`] classifies as a real failure.
    pub async fn exec_node_command(&self, node: &str, command: &str) -> Result<ExecOutput> {
        if self.settings.dry_run {
            return Ok(dry_run::simulated_exec(node, command));
        }

        let pod = self.create_debug_pod(node, command).await?;
        let mut session = DebugSession::start(node, pod, self.settings.exec_timeout);
        info!(node = %session.node, pod = %session.pod, created_at = %session.created_at, "Started debug pod");

        let phase = match self.wait_for_terminal_phase(&session).await {
            Ok(phase) => phase,
            Err(WaitError::TimedOut) => {
                session.time_out();
                warn!(node = %session.node, pod = %session.pod, timeout = ?session.timeout, "Debug pod did not finish in time");
                return Err(Error::Timeout {
                    pod: session.pod,
                    timeout: session.timeout,
                });
            }
            Err(WaitError::Cancelled) => {
                return Err(Error::cancelled(format!(
                    "waiting for debug pod {}",
                    session.pod
                )));
            }
            Err(WaitError::Failed(e)) => {
                return Err(Error::command(&[session.pod.clone()], e));
            }
        };

        let output = self.pod_logs(&session.pod).await?;
        let verdict = probe::interpret(command, &phase, &output);
        session.finish(verdict);
        debug!(
            pod = %session.pod,
            phase = %phase,
            verdict = ?verdict,
            state = ?session.state,
            elapsed = ?session.started.elapsed(),
            "Debug pod finished"
        );

        match verdict {
            Verdict::Succeeded => Ok(ExecOutput {
                output,
                pod: Some(session.pod),
                simulated: false,
            }),
            Verdict::NoReply => {
                info!(node = %session.node, pod = %session.pod, "Probe got no reply");
                Ok(ExecOutput {
                    output,
                    pod: Some(session.pod),
                    simulated: false,
                })
            }
            Verdict::Failed => Err(Error::Interpretation {
                pod: session.pod,
                node: session.node,
                phase: phase.to_string(),
                output: output.trim().to_string(),
            }),
        }
    }

    fn debug_args(&self, node: &str, command: &str) -> Vec<String> {
        argv([
            "debug".to_string(),
            format!("node/{}", node),
            "--profile=sysadmin".to_string(),
            format!("--image={}", self.settings.debug_image),
            "-n".to_string(),
            self.settings.namespace.clone(),
            "--".to_string(),
            "chroot".to_string(),
            "/host".to_string(),
            "sh".to_string(),
            "-c".to_string(),
            command.to_string(),
        ])
    }

    async fn create_debug_pod(&self, node: &str, command: &str) -> Result<String> {
        let args = self.debug_args(node, command);
        let ack = self.cli.run(&args).await.into_result(&args)?;

        extract_debug_pod_name(&ack).ok_or_else(|| {
            Error::extraction(format!(
                "no debug pod name in kubectl debug output for node {}: {}",
                node,
                ack.trim()
            ))
        })
    }

    async fn wait_for_terminal_phase(
        &self,
        session: &DebugSession,
    ) -> std::result::Result<PodPhase, WaitError> {
        let args = argv([
            "get",
            "pod",
            session.pod.as_str(),
            "-n",
            self.settings.namespace.as_str(),
            "-o",
            "jsonpath={.status.phase}",
        ]);
        let description = format!("debug pod {}", session.pod);

        wait_with_timeout(
            session.remaining(),
            self.settings.poll_interval,
            &description,
            &self.cancel,
            || {
                let cli = self.cli.clone();
                let args = args.clone();
                async move {
                    let result = cli.run(&args).await;
                    if !result.success {
                        // pod may not be visible yet
                        debug!(output = %result.output.trim(), "Phase query failed, retrying");
                        return Ok(None);
                    }
                    let phase = PodPhase::parse(&result.output);
                    Ok(phase.is_terminal().then_some(phase))
                }
            },
        )
        .await
    }

    async fn pod_logs(&self, pod: &str) -> Result<String> {
        let args = argv(["logs", pod, "-n", self.settings.namespace.as_str()]);
        self.cli.run(&args).await.into_result(&args)
    }
}
