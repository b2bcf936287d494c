//! On-disk record formats.
//!
//! Both formats are plain `key=value` lines so they can be grepped and
//! parsed by shell tooling on the manager node.

use serde::Serialize;

use memwarden_core::{HostId, InventorySource};

/// Durable proof that a restart happened. Written only on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Marker {
    pub run_id: String,
    pub host: HostId,
    pub service: String,
    pub threshold_percent: u32,
    pub memory_percent: Option<u32>,
    pub pid: Option<u32>,
    pub note: String,
}

impl Marker {
    /// `<host_safe>_<run_id>_mem<N>.txt`, or `mem_unknown` without a reading.
    pub fn file_name(&self) -> String {
        self.file_name_numbered(1)
    }

    /// Like [`Marker::file_name`], with `_<n>` before the extension for
    /// `n > 1`. Distinct hosts can share a sanitized name.
    pub fn file_name_numbered(&self, n: u32) -> String {
        let mem_part = match self.memory_percent {
            Some(m) => format!("mem{m}"),
            None => "mem_unknown".to_string(),
        };
        let stem = format!("{}_{}_{}", host_safe(&self.host), self.run_id, mem_part);
        if n > 1 {
            format!("{stem}_{n}.txt")
        } else {
            format!("{stem}.txt")
        }
    }

    pub fn render(&self) -> String {
        let lines = [
            format!("timestamp_utc={}", self.run_id),
            format!("host={}", self.host),
            format!("service={}", self.service),
            format!("threshold_percent={}", self.threshold_percent),
            format!("memory_percent={}", or_unknown(self.memory_percent)),
            format!("pid={}", or_unknown(self.pid)),
            "action=restart".to_string(),
            format!("note={}", self.note),
        ];
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

/// Header fields of a run log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunHeader {
    pub run_id: String,
    pub source: InventorySource,
    pub service: String,
    pub threshold_percent: u32,
    pub min_other_running: usize,
    pub host_count: usize,
}

impl RunHeader {
    fn lines(&self) -> Vec<String> {
        vec![
            format!("run_id={}", self.run_id),
            format!("nodes_source={}", self.source),
            format!("service={}", self.service),
            format!("threshold_percent={}", self.threshold_percent),
            format!("min_other_running_nodes={}", self.min_other_running),
            format!("nodes={}", self.host_count),
            String::new(),
        ]
    }
}

/// Complete run log: header plus ordered per-host lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub header: RunHeader,
    pub lines: Vec<String>,
}

impl RunRecord {
    pub fn file_name(&self) -> String {
        format!("run_{}.log", self.header.run_id)
    }

    pub fn render(&self) -> String {
        let mut all = self.header.lines();
        all.extend(self.lines.iter().cloned());
        let mut out = all.join("\n");
        out.push('\n');
        out
    }
}

fn host_safe(host: &str) -> String {
    host.replace([':', '/', ' '], "_")
}

fn or_unknown(v: Option<u32>) -> String {
    v.map_or_else(|| "unknown".to_string(), |v| v.to_string())
}
