//! HA safety gate.
//!
//! A host over the memory threshold may only be restarted when at least
//! `min_other_running` *other* hosts were running at snapshot time. The
//! gate is pure: no I/O, no clock, no shared state.

use tracing::debug;

use memwarden_core::config::ServiceConfig;
use memwarden_core::{GateDecision, GateOutcome, HostState};

use crate::snapshot::RunningSet;

/// Decide whether `host` may be restarted.
///
/// `memory_percent` is `None` when the host is running but its memory
/// could not be read.
pub fn decide(
    host: &str,
    memory_percent: Option<u32>,
    running: &RunningSet,
    threshold: u32,
    min_other_running: usize,
) -> GateDecision {
    let other_running = running.others(host);

    let (outcome, reason) = match memory_percent {
        None => (
            GateOutcome::SkipUnknownMemory,
            "SKIP restart - mem unknown".to_string(),
        ),
        Some(mem) if mem <= threshold => (
            GateOutcome::Ok,
            format!("OK - mem={mem}% <= {threshold}%"),
        ),
        Some(mem) if other_running < min_other_running => (
            GateOutcome::SkipQuorum,
            format!(
                "SKIP restart - high mem={mem}% but only {other_running} other nodes running \
                 (min required {min_other_running})"
            ),
        ),
        Some(mem) => (
            GateOutcome::Allow,
            format!("RESTART allowed - high mem={mem}% and other_running={other_running}"),
        ),
    };

    debug!(%host, mem = ?memory_percent, other_running, outcome = %outcome, "gate evaluated");

    GateDecision {
        host: host.to_string(),
        outcome,
        reason,
        memory_percent,
        other_running,
    }
}

/// Threshold and quorum for one run, taken from the service config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatePolicy {
    pub threshold: u32,
    pub min_other_running: usize,
}

impl GatePolicy {
    pub fn from_config(service: &ServiceConfig) -> Self {
        Self {
            threshold: service.memory_threshold_percent,
            min_other_running: service.min_other_running_nodes,
        }
    }

    /// Evaluate a running host. Stopped hosts are never evaluated.
    pub fn evaluate(&self, state: &HostState, running: &RunningSet) -> Option<GateDecision> {
        if !state.running {
            return None;
        }
        Some(decide(
            &state.host,
            state.memory_percent,
            running,
            self.threshold,
            self.min_other_running,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(states: &[(&str, bool)]) -> RunningSet {
        let states: Vec<HostState> = states
            .iter()
            .map(|(h, up)| {
                if *up {
                    HostState::running(h, Some(1), Some(1), String::new(), 0)
                } else {
                    HostState::not_running(h, String::new(), 0)
                }
            })
            .collect();
        RunningSet::from_states(&states)
    }

    #[test]
    fn at_threshold_is_ok() {
        let running = set(&[("a", true)]);
        let d = decide("a", Some(60), &running, 60, 1);
        assert_eq!(d.outcome, GateOutcome::Ok);
        assert_eq!(d.reason, "OK - mem=60% <= 60%");
    }

    #[test]
    fn below_threshold_is_ok_even_without_quorum() {
        let running = set(&[("a", true)]);
        let d = decide("a", Some(10), &running, 60, 5);
        assert_eq!(d.outcome, GateOutcome::Ok);
    }

    #[test]
    fn unknown_memory_skips() {
        let running = set(&[("a", true), ("b", true)]);
        let d = decide("a", None, &running, 60, 1);
        assert_eq!(d.outcome, GateOutcome::SkipUnknownMemory);
        assert!(!d.allowed());
    }

    #[test]
    fn over_threshold_with_quorum_allows() {
        let running = set(&[("a", true), ("b", true), ("c", false)]);
        let d = decide("a", Some(70), &running, 60, 1);
        assert_eq!(d.outcome, GateOutcome::Allow);
        assert_eq!(d.other_running, 1);
        assert_eq!(d.reason, "RESTART allowed - high mem=70% and other_running=1");
    }

    #[test]
    fn over_threshold_without_quorum_skips() {
        let running = set(&[("a", true), ("b", false), ("c", false)]);
        let d = decide("a", Some(80), &running, 60, 1);
        assert_eq!(d.outcome, GateOutcome::SkipQuorum);
        assert_eq!(d.other_running, 0);
        assert_eq!(
            d.reason,
            "SKIP restart - high mem=80% but only 0 other nodes running (min required 1)"
        );
    }

    #[test]
    fn self_never_counts_toward_quorum() {
        // Two running hosts, quorum of two others: neither may restart.
        let running = set(&[("a", true), ("b", true)]);
        assert_eq!(decide("a", Some(99), &running, 60, 2).outcome, GateOutcome::SkipQuorum);
        assert_eq!(decide("b", Some(99), &running, 60, 2).outcome, GateOutcome::SkipQuorum);
    }

    #[test]
    fn zero_quorum_allows_lone_host() {
        let running = set(&[("a", true)]);
        let d = decide("a", Some(99), &running, 60, 0);
        assert_eq!(d.outcome, GateOutcome::Allow);
    }

    #[test]
    fn policy_skips_stopped_hosts() {
        let policy = GatePolicy {
            threshold: 60,
            min_other_running: 1,
        };
        let stopped = HostState::not_running("c", String::new(), 0);
        let running = set(&[("a", true)]);
        assert!(policy.evaluate(&stopped, &running).is_none());
    }

    #[test]
    fn policy_from_config() {
        let policy = GatePolicy::from_config(&ServiceConfig::default());
        assert_eq!(policy.threshold, 60);
        assert_eq!(policy.min_other_running, 1);
    }
}
