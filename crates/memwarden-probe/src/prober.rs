//! Probe output parsing and fleet fan-out.
//!
//! The probe contract is a single line on the remote output:
//!
//! ```text
//! STATE running service=<name> pid=<int> mem=<int>
//! STATE stopped service=<name>
//! ```
//!
//! Anything that is not exit code 0 plus a `STATE running` line is
//! treated as not running.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use memwarden_core::{CommandOutput, HostId, HostState, RestartOutcome};

use crate::remote::RemoteCapability;

static PID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bpid=([0-9]+)\b").expect("static pattern"));
static MEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bmem=([0-9]+)\b").expect("static pattern"));
static RESTARTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bRESTARTED service=(\S+)").expect("static pattern"));

/// Classify one probe result.
pub fn parse_probe(host: &str, out: CommandOutput) -> HostState {
    let running_line = out
        .output
        .lines()
        .find(|line| line.contains("STATE running"));

    match running_line {
        Some(line) if out.success() => {
            let pid = parse_int_kv(&PID_RE, line);
            let mem = parse_int_kv(&MEM_RE, line);
            if mem.is_none() {
                warn!(%host, "service running but memory reading missing");
            }
            HostState::running(host, pid, mem, out.output, out.exit_code)
        }
        _ => HostState::not_running(host, out.output, out.exit_code),
    }
}

/// Classify one restart result: exit code 0 and a matching `RESTARTED` line.
pub fn parse_restart(host: &str, service: &str, out: CommandOutput) -> RestartOutcome {
    let confirmed = out
        .output
        .lines()
        .filter_map(|line| RESTARTED_RE.captures(line))
        .any(|caps| &caps[1] == service);

    RestartOutcome {
        host: host.to_string(),
        success: out.success() && confirmed,
        exit_code: out.exit_code,
        output: out.output,
    }
}

fn parse_int_kv(re: &Regex, line: &str) -> Option<u32> {
    re.captures(line).and_then(|caps| caps[1].parse().ok())
}

/// Probe a single host.
pub async fn probe_host<R: RemoteCapability>(remote: &R, host: &str) -> HostState {
    let out = remote.probe(host).await;
    let state = parse_probe(host, out);
    debug!(
        %host,
        running = state.running,
        pid = ?state.pid,
        mem = ?state.memory_percent,
        exit_code = state.exit_code,
        "probe finished"
    );
    state
}

/// Probe every host, at most `workers` at a time (0 = all at once).
///
/// Returns only once every probe has finished, in the order of `hosts`.
pub async fn probe_fleet<R: RemoteCapability>(
    remote: Arc<R>,
    hosts: &[HostId],
    workers: usize,
) -> Vec<HostState> {
    let permits = if workers == 0 {
        hosts.len().max(1)
    } else {
        workers
    };
    let semaphore = Arc::new(Semaphore::new(permits));

    info!(hosts = hosts.len(), workers = permits, "probing fleet");

    let handles: Vec<_> = hosts
        .iter()
        .map(|host| {
            let remote = remote.clone();
            let semaphore = semaphore.clone();
            let host = host.clone();
            tokio::spawn(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await.ok();
                probe_host(remote.as_ref(), &host).await
            })
        })
        .collect();

    let mut states = Vec::with_capacity(hosts.len());
    for (host, handle) in hosts.iter().zip(handles) {
        match handle.await {
            Ok(state) => states.push(state),
            Err(e) => {
                warn!(%host, error = %e, "probe task failed");
                states.push(HostState::not_running(
                    host,
                    format!("probe task failed: {e}"),
                    CommandOutput::TRANSPORT_FAILURE,
                ));
            }
        }
    }
    states
}
