//! memwarden-audit — durable record of every run.
//!
//! Two artifacts are written:
//!
//! - one run log per run (`<runs_dir>/run_<run_id>.log`), written at the end;
//! - one marker per successful restart (`<triggers_dir>/<host>_<run_id>_mem<N>.txt`),
//!   written as soon as the restart succeeds so a crash later in the run
//!   still leaves evidence.
//!
//! All appends go through one mutex so concurrent phases cannot interleave
//! lines.

pub mod error;
pub mod record;
pub mod recorder;

pub use error::{AuditError, AuditResult};
pub use record::{Marker, RunHeader, RunRecord};
pub use recorder::AuditRecorder;
