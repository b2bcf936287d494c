//! Restart dispatcher — the only component that mutates remote state.
//!
//! Each allowed host gets exactly one restart attempt. A failed restart is
//! logged and the next host proceeds; there are no retries.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use memwarden_audit::{AuditRecorder, AuditResult, Marker};
use memwarden_core::{CommandOutput, GateDecision, RestartOutcome};
use memwarden_gate::FleetSnapshot;
use memwarden_probe::{parse_restart, RemoteCapability};

use crate::error::RunResult;

/// Result of one restart attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchRecord {
    pub outcome: RestartOutcome,
    /// Set if and only if the restart succeeded.
    pub marker: Option<PathBuf>,
}

pub struct RestartDispatcher<R> {
    remote: Arc<R>,
    recorder: Arc<AuditRecorder>,
    service: String,
    threshold: u32,
    workers: usize,
}

impl<R: RemoteCapability> RestartDispatcher<R> {
    pub fn new(
        remote: Arc<R>,
        recorder: Arc<AuditRecorder>,
        service: &str,
        threshold: u32,
        workers: usize,
    ) -> Self {
        Self {
            remote,
            recorder,
            service: service.to_string(),
            threshold,
            workers: workers.max(1),
        }
    }

    /// Restart every allowed host, `workers` at a time.
    ///
    /// Records come back in the order of `allowed`. Every attempt runs to
    /// completion even if writing an earlier marker failed; the first such
    /// failure is then returned.
    pub async fn dispatch(
        &self,
        allowed: &[GateDecision],
        snapshot: &FleetSnapshot,
    ) -> RunResult<Vec<DispatchRecord>> {
        let semaphore = Arc::new(Semaphore::new(self.workers));

        let handles: Vec<_> = allowed
            .iter()
            .filter(|d| d.allowed())
            .map(|decision| {
                let job = RestartJob {
                    remote: self.remote.clone(),
                    recorder: self.recorder.clone(),
                    service: self.service.clone(),
                    threshold: self.threshold,
                    pid: snapshot.get(&decision.host).and_then(|s| s.pid),
                    decision: decision.clone(),
                };
                let semaphore = semaphore.clone();
                let host = decision.host.clone();
                let handle = tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    job.run().await
                });
                (host, handle)
            })
            .collect();

        let mut records = Vec::with_capacity(handles.len());
        let mut first_err = None;
        for (host, handle) in handles {
            match handle.await {
                Ok(Ok(record)) => records.push(record),
                Ok(Err((record, e))) => {
                    error!(%host, error = %e, "failed to persist restart marker");
                    records.push(record);
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
                Err(e) => {
                    // Whether the remote restart ran is unknown; no marker.
                    warn!(%host, error = %e, "restart task failed");
                    self.recorder
                        .host_line(&host, format!("RESTART FAIL(task) :: {e}"))
                        .await;
                    records.push(DispatchRecord {
                        outcome: RestartOutcome {
                            host,
                            success: false,
                            exit_code: CommandOutput::TRANSPORT_FAILURE,
                            output: e.to_string(),
                        },
                        marker: None,
                    });
                }
            }
        }

        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(records),
        }
    }
}

/// Everything one restart task needs, owned so it can move into a task.
struct RestartJob<R> {
    remote: Arc<R>,
    recorder: Arc<AuditRecorder>,
    service: String,
    threshold: u32,
    pid: Option<u32>,
    decision: GateDecision,
}

impl<R: RemoteCapability> RestartJob<R> {
    async fn run(
        self,
    ) -> Result<DispatchRecord, (DispatchRecord, memwarden_audit::AuditError)> {
        let host = self.decision.host.as_str();
        let out = self.remote.restart(host).await;
        let outcome = parse_restart(host, &self.service, out);

        let status = if outcome.success {
            "SUCCESS".to_string()
        } else {
            format!("FAIL(rc={})", outcome.exit_code)
        };
        self.recorder
            .host_line(host, format!("RESTART {status} :: {}", outcome.output))
            .await;

        if !outcome.success {
            warn!(%host, exit_code = outcome.exit_code, "restart failed");
            return Ok(DispatchRecord {
                outcome,
                marker: None,
            });
        }
        info!(%host, mem = ?self.decision.memory_percent, "service restarted");

        match self.write_marker().await {
            Ok(path) => {
                self.recorder
                    .host_line(host, format!("manager_marker={}", path.display()))
                    .await;
                Ok(DispatchRecord {
                    outcome,
                    marker: Some(path),
                })
            }
            Err(e) => {
                self.recorder
                    .host_line(host, format!("manager_marker_failed :: {e}"))
                    .await;
                Err((
                    DispatchRecord {
                        outcome,
                        marker: None,
                    },
                    e,
                ))
            }
        }
    }

    async fn write_marker(&self) -> AuditResult<PathBuf> {
        let mem = self
            .decision
            .memory_percent
            .map_or_else(|| "unknown".to_string(), |m| m.to_string());
        let marker = Marker {
            run_id: self.recorder.header().run_id.clone(),
            host: self.decision.host.clone(),
            service: self.service.clone(),
            threshold_percent: self.threshold,
            memory_percent: self.decision.memory_percent,
            pid: self.pid,
            note: format!(
                "Restarted because mem={mem}% > {}%, other_running={}",
                self.threshold, self.decision.other_running
            ),
        };
        self.recorder.write_marker(&marker).await
    }
}
