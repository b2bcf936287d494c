//! Inventory loading.
//!
//! Hosts come from the inventory file when it yields at least one host,
//! otherwise from the static list in the config. Loading never fails.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::InventoryConfig;
use crate::types::HostId;

/// Where the host list came from. Recorded as `nodes_source=` in the run log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventorySource {
    File,
    Array,
}

impl fmt::Display for InventorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InventorySource::File => f.write_str("file"),
            InventorySource::Array => f.write_str("array"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inventory {
    pub hosts: Vec<HostId>,
    pub source: InventorySource,
}

impl Inventory {
    pub fn load(config: &InventoryConfig) -> Self {
        if let Some(path) = &config.file {
            if let Some(hosts) = read_hosts_file(path) {
                debug!(path = %path.display(), count = hosts.len(), "inventory loaded from file");
                return Self::new(hosts, InventorySource::File);
            }
        }
        debug!(count = config.hosts.len(), "inventory loaded from static list");
        Self::new(config.hosts.clone(), InventorySource::Array)
    }

    /// Build an inventory, dropping duplicate hosts but keeping first-seen order.
    pub fn new(hosts: Vec<HostId>, source: InventorySource) -> Self {
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(hosts.len());
        for host in hosts {
            if seen.insert(host.clone()) {
                unique.push(host);
            } else {
                warn!(%host, "duplicate host in inventory ignored");
            }
        }
        Self {
            hosts: unique,
            source,
        }
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Returns `None` when the file is missing, unreadable or has no hosts.
fn read_hosts_file(path: &Path) -> Option<Vec<HostId>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "inventory file not usable");
            return None;
        }
    };
    let hosts = parse_hosts(&content);
    if hosts.is_empty() { None } else { Some(hosts) }
}

fn parse_hosts(content: &str) -> Vec<HostId> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
