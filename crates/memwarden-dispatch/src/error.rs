//! Run error types.
//!
//! Per-host failures are never errors here; they end up in the run log.

use thiserror::Error;

/// Errors that end a run early.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("audit trail unavailable: {0}")]
    Audit(#[from] memwarden_audit::AuditError),
}

pub type RunResult<T> = Result<T, RunError>;
