//! Fleet snapshot — the point-in-time view every decision in a run uses.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::info;

use memwarden_core::{HostId, HostState};

/// Hosts observed running at the end of the probe phase.
///
/// There is no way to add or remove members after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunningSet(BTreeSet<HostId>);

impl RunningSet {
    pub fn from_states(states: &[HostState]) -> Self {
        Self(
            states
                .iter()
                .filter(|s| s.running)
                .map(|s| s.host.clone())
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, host: &str) -> bool {
        self.0.contains(host)
    }

    /// Members other than `host`. A host never counts toward its own quorum.
    pub fn others(&self, host: &str) -> usize {
        self.0.iter().filter(|h| h.as_str() != host).count()
    }
}

/// All host states of a run plus the frozen running set.
#[derive(Debug, Clone, Serialize)]
pub struct FleetSnapshot {
    /// Host states in inventory order.
    states: Vec<HostState>,
    running: RunningSet,
}

impl FleetSnapshot {
    /// Freeze the probe results. Call once, after every probe has finished.
    pub fn freeze(states: Vec<HostState>) -> Self {
        let running = RunningSet::from_states(&states);
        info!(
            hosts = states.len(),
            running = running.len(),
            "fleet snapshot frozen"
        );
        Self { states, running }
    }

    pub fn states(&self) -> &[HostState] {
        &self.states
    }

    pub fn get(&self, host: &str) -> Option<&HostState> {
        self.states.iter().find(|s| s.host == host)
    }

    pub fn running(&self) -> &RunningSet {
        &self.running
    }

    /// Running hosts in inventory order.
    pub fn running_hosts(&self) -> impl Iterator<Item = &HostState> {
        self.states.iter().filter(|s| s.running)
    }

    /// `running_hosts=<n> :: a, b` summary line for the run log.
    pub fn summary_line(&self) -> String {
        let names: Vec<&str> = self.running_hosts().map(|s| s.host.as_str()).collect();
        let list = if names.is_empty() {
            "(none)".to_string()
        } else {
            names.join(", ")
        };
        format!("running_hosts={} :: {}", names.len(), list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(host: &str, mem: u32) -> HostState {
        HostState::running(host, Some(100), Some(mem), String::new(), 0)
    }

    fn stopped(host: &str) -> HostState {
        HostState::not_running(host, "STATE stopped service=memhog".to_string(), 0)
    }

    #[test]
    fn running_set_only_contains_running_hosts() {
        let snap = FleetSnapshot::freeze(vec![running("a", 10), stopped("b"), running("c", 90)]);
        assert_eq!(snap.running().len(), 2);
        assert!(snap.running().contains("a"));
        assert!(!snap.running().contains("b"));
        assert!(snap.running().contains("c"));
    }

    #[test]
    fn others_excludes_self() {
        let snap = FleetSnapshot::freeze(vec![running("a", 10), running("b", 10)]);
        assert_eq!(snap.running().others("a"), 1);
        assert_eq!(snap.running().others("b"), 1);
        // A host outside the set sees every member.
        assert_eq!(snap.running().others("z"), 2);
    }

    #[test]
    fn summary_line_lists_in_inventory_order() {
        let snap = FleetSnapshot::freeze(vec![running("zeta", 1), stopped("b"), running("alpha", 1)]);
        assert_eq!(snap.summary_line(), "running_hosts=2 :: zeta, alpha");
    }

    #[test]
    fn summary_line_none() {
        let snap = FleetSnapshot::freeze(vec![stopped("a")]);
        assert_eq!(snap.summary_line(), "running_hosts=0 :: (none)");
    }

    #[test]
    fn get_by_host() {
        let snap = FleetSnapshot::freeze(vec![running("a", 42)]);
        assert_eq!(snap.get("a").unwrap().memory_percent, Some(42));
        assert!(snap.get("b").is_none());
    }
}
