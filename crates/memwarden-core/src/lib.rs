//! memwarden-core — shared data model, configuration and inventory loading.
//!
//! Every other memwarden crate depends on this one. It holds no I/O beyond
//! reading the config file and the inventory file.

pub mod config;
pub mod error;
pub mod inventory;
pub mod types;

pub use config::MemwardenConfig;
pub use error::{ConfigError, ConfigResult};
pub use inventory::{Inventory, InventorySource};
pub use types::*;
