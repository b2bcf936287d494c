//! memwarden-gate — fleet snapshot and the HA safety gate.
//!
//! # Components
//!
//! - **`snapshot`** — `FleetSnapshot`, built once after the probe phase.
//!   Its running set is frozen and shared by every gate evaluation of the run.
//! - **`gate`** — `decide()`, a pure function from one host's memory reading
//!   and the frozen running set to a `GateDecision`.

pub mod gate;
pub mod snapshot;

pub use gate::{decide, GatePolicy};
pub use snapshot::{FleetSnapshot, RunningSet};
