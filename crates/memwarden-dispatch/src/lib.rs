//! memwarden-dispatch — one run of the probe → gate → restart → audit cycle.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator::run()
//!   ├── Inventory::load()
//!   ├── AuditRecorder::create()          (fatal on failure)
//!   ├── probe_fleet()                    (bounded fan-out, joined)
//!   ├── FleetSnapshot::freeze()          (running set fixed for the run)
//!   ├── GatePolicy::evaluate() per running host
//!   ├── RestartDispatcher::dispatch()    (allowed hosts only, once each)
//!   │   └── AuditRecorder::write_marker() on success
//!   └── AuditRecorder::finish()
//! ```

pub mod dispatcher;
pub mod error;
pub mod run;

pub use dispatcher::{DispatchRecord, RestartDispatcher};
pub use error::{RunError, RunResult};
pub use run::{HostSummary, Orchestrator, RunOptions, RunSummary};
