//! Run orchestrator — drives one complete cycle across the inventory.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use memwarden_audit::{AuditRecorder, RunHeader};
use memwarden_core::{
    GateDecision, GateOutcome, HostId, HostState, Inventory, InventorySource, MemwardenConfig,
};
use memwarden_gate::{FleetSnapshot, GatePolicy};
use memwarden_probe::{probe_fleet, RemoteCapability};

use crate::dispatcher::{DispatchRecord, RestartDispatcher};
use crate::error::RunResult;

/// Per-invocation knobs that are not part of the config file.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Fixed run id; defaults to the current UTC time.
    pub run_id: Option<String>,
    /// Evaluate the gate but never call the restart capability.
    pub dry_run: bool,
}

/// Everything that happened to one host during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostSummary {
    pub host: HostId,
    pub running: bool,
    pub exit_code: i32,
    pub pid: Option<u32>,
    pub memory_percent: Option<u32>,
    /// `None` for hosts that were not running.
    pub decision: Option<GateOutcome>,
    pub restart: Option<DispatchRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub source: InventorySource,
    pub log_path: PathBuf,
    pub running_hosts: usize,
    pub dry_run: bool,
    pub hosts: Vec<HostSummary>,
}

impl RunSummary {
    pub fn host(&self, host: &str) -> Option<&HostSummary> {
        self.hosts.iter().find(|h| h.host == host)
    }

    pub fn restarted(&self) -> impl Iterator<Item = &HostSummary> {
        self.hosts
            .iter()
            .filter(|h| h.restart.as_ref().is_some_and(|r| r.outcome.success))
    }
}

/// Owns the config and the remote capability for the lifetime of the process.
pub struct Orchestrator<R> {
    config: Arc<MemwardenConfig>,
    remote: Arc<R>,
}

impl<R: RemoteCapability> Orchestrator<R> {
    pub fn new(config: Arc<MemwardenConfig>, remote: Arc<R>) -> Self {
        Self { config, remote }
    }

    /// Execute one run. Only local audit-trail failures return `Err`.
    pub async fn run(&self, options: RunOptions) -> RunResult<RunSummary> {
        let config = &self.config;
        let run_id = options.run_id.clone().unwrap_or_else(utc_stamp);
        let inventory = Inventory::load(&config.inventory);
        let policy = GatePolicy::from_config(&config.service);

        info!(
            %run_id,
            source = %inventory.source,
            hosts = inventory.len(),
            service = %config.service.name,
            threshold = policy.threshold,
            min_other_running = policy.min_other_running,
            dry_run = options.dry_run,
            "run starting"
        );

        let header = RunHeader {
            run_id: run_id.clone(),
            source: inventory.source,
            service: config.service.name.clone(),
            threshold_percent: policy.threshold,
            min_other_running: policy.min_other_running,
            host_count: inventory.len(),
        };
        let recorder = Arc::new(
            AuditRecorder::create(
                header,
                &config.paths.runs_dir(),
                &config.paths.triggers_dir(),
            )
            .await?,
        );

        // Probe phase. Every probe is joined before the snapshot is frozen.
        let states = probe_fleet(
            self.remote.clone(),
            &inventory.hosts,
            config.concurrency.probe_workers,
        )
        .await;
        for state in &states {
            recorder.host_line(&state.host, probe_line(state)).await;
        }

        let snapshot = FleetSnapshot::freeze(states);
        recorder.append("").await;
        recorder.append(snapshot.summary_line()).await;
        recorder.append("").await;

        let dispatcher = RestartDispatcher::new(
            self.remote.clone(),
            recorder.clone(),
            &config.service.name,
            policy.threshold,
            config.concurrency.restart_workers,
        );
        // One worker: restart each host right after its gate line so the log
        // reads host by host. More workers: gate everyone, then fan out.
        let sequential = config.concurrency.restart_workers <= 1;

        // Gate phase, all against the same frozen running set.
        let mut decisions: Vec<GateDecision> = Vec::new();
        let mut records: Vec<DispatchRecord> = Vec::new();
        let mut first_err = None;
        for state in snapshot.running_hosts() {
            let Some(decision) = policy.evaluate(state, snapshot.running()) else {
                continue;
            };
            let line = if decision.outcome == GateOutcome::SkipUnknownMemory {
                format!("{} :: {}", decision.reason, state.raw)
            } else {
                decision.reason.clone()
            };
            recorder.host_line(&state.host, line).await;

            if decision.allowed() {
                if options.dry_run {
                    recorder.host_line(&state.host, "DRY-RUN restart skipped").await;
                } else if sequential {
                    match dispatcher.dispatch(std::slice::from_ref(&decision), &snapshot).await {
                        Ok(mut done) => records.append(&mut done),
                        Err(e) => {
                            if first_err.is_none() {
                                first_err = Some(e);
                            }
                        }
                    }
                }
            }
            decisions.push(decision);
        }

        // Restart phase for concurrent workers.
        if !options.dry_run && !sequential {
            let allowed: Vec<GateDecision> =
                decisions.iter().filter(|d| d.allowed()).cloned().collect();
            match dispatcher.dispatch(&allowed, &snapshot).await {
                Ok(done) => records = done,
                Err(e) => first_err = Some(e),
            }
        }

        if let Some(e) = first_err {
            // Keep whatever evidence we can before giving up.
            if let Err(log_err) = recorder.finish().await {
                error!(error = %log_err, "run log could not be written either");
            }
            return Err(e);
        }

        let (log_path, _) = recorder.finish().await?;
        let summary = summarize(
            &run_id,
            inventory.source,
            log_path,
            &snapshot,
            &decisions,
            records,
            options.dry_run,
        );

        info!(
            %run_id,
            running = summary.running_hosts,
            restarted = summary.restarted().count(),
            "run finished"
        );
        Ok(summary)
    }
}

fn probe_line(state: &HostState) -> String {
    let status = if state.running {
        "RUNNING".to_string()
    } else {
        format!("NOT_RUNNING(rc={})", state.exit_code)
    };
    format!("PROBE {status} :: {}", state.raw)
}

fn summarize(
    run_id: &str,
    source: InventorySource,
    log_path: PathBuf,
    snapshot: &FleetSnapshot,
    decisions: &[GateDecision],
    mut records: Vec<DispatchRecord>,
    dry_run: bool,
) -> RunSummary {
    let hosts = snapshot
        .states()
        .iter()
        .map(|state| {
            let decision = decisions
                .iter()
                .find(|d| d.host == state.host)
                .map(|d| d.outcome);
            let restart = records
                .iter()
                .position(|r| r.outcome.host == state.host)
                .map(|i| records.swap_remove(i));
            HostSummary {
                host: state.host.clone(),
                running: state.running,
                exit_code: state.exit_code,
                pid: state.pid,
                memory_percent: state.memory_percent,
                decision,
                restart,
            }
        })
        .collect();

    RunSummary {
        run_id: run_id.to_string(),
        source,
        log_path,
        running_hosts: snapshot.running().len(),
        dry_run,
        hosts,
    }
}

/// UTC timestamp used as the run id, e.g. `20240102T030405Z`.
fn utc_stamp() -> String {
    chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string()
}
