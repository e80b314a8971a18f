//! Command output classification
//!
//! All text-based success interpretation lives here. The executor asks
//! [`interpret`] for a [`Verdict`] once a debug pod is terminal, and the
//! connectivity domain asks [`reachability`] what a probe observed. New probe
//! families only need a new [`CommandFamily`] arm.

use crate::dry_run::DRY_RUN_MARKER;
use crate::exec::PodPhase;

/// Commands recognised as network reachability probes (first word)
const PROBE_COMMANDS: &[&str] = &["ping", "ping6", "arping"];

/// Family of a remote shell command, deciding how its result is read
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandFamily {
    /// Network reachability probe; a no-reply outcome is not an error
    ReachabilityProbe,
    /// Anything else; the pod phase is authoritative
    Generic,
}

/// Classify a shell command by its first word
pub fn classify(command: &str) -> CommandFamily {
    let first = command.split_whitespace().next().unwrap_or_default();
    let program = first.rsplit('/').next().unwrap_or(first);
    if PROBE_COMMANDS.contains(&program) {
        CommandFamily::ReachabilityProbe
    } else {
        CommandFamily::Generic
    }
}

/// How the executor should report a terminal debug pod
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Command succeeded
    Succeeded,
    /// Probe found no response; an expected negative outcome, not an error
    NoReply,
    /// Command genuinely failed
    Failed,
}

impl Verdict {
    /// Returns true unless the verdict is a real failure
    pub fn is_success(self) -> bool {
        !matches!(self, Self::Failed)
    }
}

/// Decide the outcome of a terminal debug pod
///
/// For probes the zero-packets signature wins over the pod phase: the probe
/// ran and legitimately saw no reply. Any other probe failure stays a failure.
/// For generic commands the phase decides.
pub fn interpret(command: &str, phase: &PodPhase, output: &str) -> Verdict {
    match classify(command) {
        CommandFamily::ReachabilityProbe if has_zero_packet_signature(output) => Verdict::NoReply,
        _ if *phase == PodPhase::Succeeded => Verdict::Succeeded,
        _ => Verdict::Failed,
    }
}

/// Returns true if probe output reports zero packets received
///
/// Understands the iputils (`3 packets transmitted, 0 received`) and busybox
/// (`3 packets transmitted, 0 packets received`) summaries, plus a bare
/// `100% packet loss`.
pub fn has_zero_packet_signature(output: &str) -> bool {
    received_count(output) == Some(0) || output.lines().any(reports_total_loss)
}

fn reports_total_loss(line: &str) -> bool {
    line.split(',')
        .any(|segment| segment.trim().starts_with("100% packet loss"))
}

/// Number of reply packets a probe summary reports, if any summary is present
pub fn received_count(output: &str) -> Option<u32> {
    output
        .lines()
        .filter(|line| line.contains("transmitted"))
        .flat_map(|line| line.split(','))
        .map(str::trim)
        .find(|segment| segment.ends_with("received"))
        .and_then(|segment| segment.split_whitespace().next())
        .and_then(|count| count.parse().ok())
}

/// What a probe observed about its target
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reachability {
    /// At least one reply came back
    Reachable,
    /// No replies at all
    Unreachable,
    /// Probe was not run (dry-run)
    Simulated,
    /// Output carries no recognisable summary
    Unknown,
}

/// Read reachability from probe output
pub fn reachability(output: &str) -> Reachability {
    if output.trim_start().starts_with(DRY_RUN_MARKER) {
        return Reachability::Simulated;
    }
    if has_zero_packet_signature(output) {
        return Reachability::Unreachable;
    }
    match received_count(output) {
        Some(n) if n > 0 => Reachability::Reachable,
        _ => Reachability::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPUTILS_NO_REPLY: &str = "PING 10.0.1.2 (10.0.1.2) 56(84) bytes of data.\n\n\
--- 10.0.1.2 ping statistics ---\n\
3 packets transmitted, 0 received, 100% packet loss, time 2051ms\n";

    const BUSYBOX_NO_REPLY: &str = "PING 10.0.1.2 (10.0.1.2): 56 data bytes\n\n\
--- 10.0.1.2 ping statistics ---\n\
3 packets transmitted, 0 packets received, 100% packet loss\n";

    const IPUTILS_REPLY: &str = "PING 10.0.1.2 (10.0.1.2) 56(84) bytes of data.\n\
64 bytes from 10.0.1.2: icmp_seq=1 ttl=64 time=0.211 ms\n\n\
--- 10.0.1.2 ping statistics ---\n\
3 packets transmitted, 3 received, 0% packet loss, time 2003ms\n";

    const TEN_REPLIES: &str = "10 packets transmitted, 10 received, 0% packet loss, time 9012ms\n";

    // ==========================================================================
    // Story: Command families
    // ==========================================================================

    #[test]
    fn ping_variants_are_probes() {
        assert_eq!(classify("ping -c 3 10.0.1.2"), CommandFamily::ReachabilityProbe);
        assert_eq!(classify("  ping6 fd00::1"), CommandFamily::ReachabilityProbe);
        assert_eq!(classify("/bin/ping -c1 x"), CommandFamily::ReachabilityProbe);
        assert_eq!(classify("arping -c 1 10.0.0.1"), CommandFamily::ReachabilityProbe);
    }

    #[test]
    fn other_commands_are_generic() {
        assert_eq!(classify("ip link show"), CommandFamily::Generic);
        assert_eq!(classify("echo ping"), CommandFamily::Generic);
        assert_eq!(classify(""), CommandFamily::Generic);
    }

    // ==========================================================================
    // Story: Zero packet signature
    // ==========================================================================

    #[test]
    fn zero_received_signatures_are_detected() {
        assert!(has_zero_packet_signature(IPUTILS_NO_REPLY));
        assert!(has_zero_packet_signature(BUSYBOX_NO_REPLY));
        assert!(has_zero_packet_signature("100% packet loss"));
    }

    #[test]
    fn ten_received_is_not_zero_received() {
        assert!(!has_zero_packet_signature(TEN_REPLIES));
        assert_eq!(received_count(TEN_REPLIES), Some(10));
    }

    #[test]
    fn replies_are_not_zero_signature() {
        assert!(!has_zero_packet_signature(IPUTILS_REPLY));
        assert_eq!(received_count(IPUTILS_REPLY), Some(3));
    }

    // ==========================================================================
    // Story: Verdicts
    //
    // A probe that found no reply is an expected outcome regardless of the pod
    // phase; any other failing probe is still a failure.
    // ==========================================================================

    #[test]
    fn probe_with_zero_packets_is_no_reply_whatever_the_phase() {
        for phase in [PodPhase::Failed, PodPhase::Succeeded] {
            assert_eq!(
                interpret("ping -c 3 10.0.1.2", &phase, IPUTILS_NO_REPLY),
                Verdict::NoReply
            );
        }
    }

    #[test]
    fn failed_probe_without_signature_is_failure() {
        let output = "ping: bad address 'nowhere'\n";
        assert_eq!(
            interpret("ping -c 3 nowhere", &PodPhase::Failed, output),
            Verdict::Failed
        );
    }

    #[test]
    fn successful_probe_is_success() {
        assert_eq!(
            interpret("ping -c 3 10.0.1.2", &PodPhase::Succeeded, IPUTILS_REPLY),
            Verdict::Succeeded
        );
    }

    #[test]
    fn generic_command_follows_phase() {
        assert_eq!(
            interpret("ip link show eno1.100", &PodPhase::Succeeded, ""),
            Verdict::Succeeded
        );
        // zero-packet text in generic output does not rescue a failed pod
        assert_eq!(
            interpret("cat /tmp/log", &PodPhase::Failed, IPUTILS_NO_REPLY),
            Verdict::Failed
        );
    }

    #[test]
    fn no_reply_counts_as_success() {
        assert!(Verdict::NoReply.is_success());
        assert!(Verdict::Succeeded.is_success());
        assert!(!Verdict::Failed.is_success());
    }

    // ==========================================================================
    // Story: Reachability
    // ==========================================================================

    #[test]
    fn reachability_from_output() {
        assert_eq!(reachability(IPUTILS_REPLY), Reachability::Reachable);
        assert_eq!(reachability(BUSYBOX_NO_REPLY), Reachability::Unreachable);
        assert_eq!(reachability("garbage"), Reachability::Unknown);
        assert_eq!(
            reachability("[dry-run] would run on node rsb1: ping -c 3 10.0.1.2"),
            Reachability::Simulated
        );
    }
}
