//! Per-run domain types.
//!
//! Everything here lives for a single run. Nothing is kept in memory
//! between runs; the run log and marker files are the only durable output.

use serde::{Deserialize, Serialize};

/// Host identifier as written in the inventory (IP or hostname).
pub type HostId = String;

/// Raw result of one remote call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Process exit code. Transport failures use [`CommandOutput::TRANSPORT_FAILURE`]
    /// and [`CommandOutput::TIMED_OUT`].
    pub exit_code: i32,
    /// stdout followed by stderr, trimmed.
    pub output: String,
}

impl CommandOutput {
    /// Exit code ssh itself uses when it cannot reach the host.
    pub const TRANSPORT_FAILURE: i32 = 255;
    /// Exit code reported when a remote call exceeds its timeout.
    pub const TIMED_OUT: i32 = 124;

    pub fn new(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Observed state of the service on one host.
///
/// `pid` and `memory_percent` are only ever set when `running` is true.
/// Either may still be `None` while running, meaning the value is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostState {
    pub host: HostId,
    pub running: bool,
    pub pid: Option<u32>,
    pub memory_percent: Option<u32>,
    /// Full remote output, kept for the run log.
    pub raw: String,
    pub exit_code: i32,
}

impl HostState {
    pub fn running(
        host: &str,
        pid: Option<u32>,
        memory_percent: Option<u32>,
        raw: String,
        exit_code: i32,
    ) -> Self {
        Self {
            host: host.to_string(),
            running: true,
            pid,
            memory_percent,
            raw,
            exit_code,
        }
    }

    pub fn not_running(host: &str, raw: String, exit_code: i32) -> Self {
        Self {
            host: host.to_string(),
            running: false,
            pid: None,
            memory_percent: None,
            raw,
            exit_code,
        }
    }
}

/// Outcome of the safety gate for one running host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateOutcome {
    /// Memory at or below threshold; nothing to do.
    Ok,
    /// Running, but memory could not be read.
    SkipUnknownMemory,
    /// Over threshold, but too few other hosts are running.
    SkipQuorum,
    /// Over threshold and quorum holds; restart may proceed.
    Allow,
}

impl GateOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateOutcome::Ok => "ok",
            GateOutcome::SkipUnknownMemory => "skip-unknown-memory",
            GateOutcome::SkipQuorum => "skip-quorum",
            GateOutcome::Allow => "allow",
        }
    }
}

impl std::fmt::Display for GateOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    pub host: HostId,
    pub outcome: GateOutcome,
    /// Human-readable reason, written to the run log verbatim.
    pub reason: String,
    pub memory_percent: Option<u32>,
    /// Size of the frozen running set minus this host.
    pub other_running: usize,
}

impl GateDecision {
    pub fn allowed(&self) -> bool {
        self.outcome == GateOutcome::Allow
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartOutcome {
    pub host: HostId,
    pub success: bool,
    pub exit_code: i32,
    pub output: String,
}
