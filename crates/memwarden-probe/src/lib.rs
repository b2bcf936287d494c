//! memwarden-probe — remote probes and the capability seam.
//!
//! # Architecture
//!
//! ```text
//! probe_fleet(hosts, workers)
//!   ├── one task per host, bounded by a semaphore
//!   │   ├── RemoteCapability::probe(host) → CommandOutput
//!   │   └── parse_probe() → HostState
//!   └── join all tasks → Vec<HostState> in inventory order
//! ```
//!
//! `RemoteCapability` is the only place that touches the network. The
//! production implementation is [`SshCapability`]; tests use a scripted
//! fake.
//!
//! Probes are read-only. A transport failure is indistinguishable from a
//! stopped service and yields `running = false`, so it can never lead to
//! a restart.

pub mod prober;
pub mod remote;
pub mod ssh;

pub use prober::{parse_probe, parse_restart, probe_fleet, probe_host};
pub use remote::RemoteCapability;
pub use ssh::SshCapability;
