//! Audit recorder — single writer for the run log and marker files.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{AuditError, AuditResult};
use crate::record::{Marker, RunHeader, RunRecord};

/// Collects the run log in memory and persists markers as they happen.
#[derive(Debug)]
pub struct AuditRecorder {
    header: RunHeader,
    runs_dir: PathBuf,
    triggers_dir: PathBuf,
    /// Ordered run log lines. The only shared mutable state of a run.
    lines: Mutex<Vec<String>>,
}

impl AuditRecorder {
    /// Create the recorder and both output directories.
    ///
    /// Failing here means the run cannot leave an audit trail and must not
    /// proceed.
    pub async fn create(
        header: RunHeader,
        runs_dir: &Path,
        triggers_dir: &Path,
    ) -> AuditResult<Self> {
        ensure_dir(runs_dir).await?;
        ensure_dir(triggers_dir).await?;
        Ok(Self {
            header,
            runs_dir: runs_dir.to_path_buf(),
            triggers_dir: triggers_dir.to_path_buf(),
            lines: Mutex::new(Vec::new()),
        })
    }

    pub fn header(&self) -> &RunHeader {
        &self.header
    }

    pub async fn append(&self, line: impl Into<String>) {
        let line = line.into();
        debug!(run_id = %self.header.run_id, %line, "audit");
        self.lines.lock().await.push(line);
    }

    /// Append a `[host] ...` line.
    pub async fn host_line(&self, host: &str, text: impl AsRef<str>) {
        self.append(format!("[{host}] {}", text.as_ref())).await;
    }

    /// Write a marker file right away and return its path.
    ///
    /// Never overwrites: if the name is taken, `_2`, `_3`, ... is appended.
    pub async fn write_marker(&self, marker: &Marker) -> AuditResult<PathBuf> {
        ensure_dir(&self.triggers_dir).await?;
        let mut n = 1;
        let (path, mut file) = loop {
            let path = self.triggers_dir.join(marker.file_name_numbered(n));
            let opened = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;
            match opened {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    debug!(path = %path.display(), "marker name taken");
                    n += 1;
                }
                Err(source) => return Err(AuditError::Write { path, source }),
            }
        };
        let written = async {
            file.write_all(marker.render().as_bytes()).await?;
            file.flush().await
        }
        .await;
        if let Err(source) = written {
            return Err(AuditError::Write { path, source });
        }
        info!(host = %marker.host, path = %path.display(), "restart marker written");
        Ok(path)
    }

    /// Copy of the lines recorded so far.
    pub async fn lines(&self) -> Vec<String> {
        self.lines.lock().await.clone()
    }

    /// Persist the run log. Later appends are not written.
    pub async fn finish(&self) -> AuditResult<(PathBuf, RunRecord)> {
        let record = RunRecord {
            header: self.header.clone(),
            lines: self.lines().await,
        };
        ensure_dir(&self.runs_dir).await?;
        let path = self.runs_dir.join(record.file_name());
        write_file(&path, &record.render()).await?;
        info!(path = %path.display(), lines = record.lines.len(), "run log written");
        Ok((path, record))
    }
}

async fn ensure_dir(path: &Path) -> AuditResult<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| AuditError::CreateDir {
            path: path.to_path_buf(),
            source,
        })
}

async fn write_file(path: &Path, content: &str) -> AuditResult<()> {
    tokio::fs::write(path, content)
        .await
        .map_err(|source| AuditError::Write {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use memwarden_core::InventorySource;

    use super::*;

    fn header() -> RunHeader {
        RunHeader {
            run_id: "20240102T030405Z".to_string(),
            source: InventorySource::Array,
            service: "memhog".to_string(),
            threshold_percent: 60,
            min_other_running: 1,
            host_count: 1,
        }
    }

    fn marker(host: &str) -> Marker {
        Marker {
            run_id: "20240102T030405Z".to_string(),
            host: host.to_string(),
            service: "memhog".to_string(),
            threshold_percent: 60,
            memory_percent: Some(80),
            pid: Some(7),
            note: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn create_makes_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let runs = dir.path().join("a/b/runs");
        let triggers = dir.path().join("a/b/triggers");
        AuditRecorder::create(header(), &runs, &triggers).await.unwrap();
        assert!(runs.is_dir());
        assert!(triggers.is_dir());
    }

    #[tokio::test]
    async fn create_fails_when_path_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();

        let err = AuditRecorder::create(header(), &blocker.join("runs"), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::CreateDir { .. }));
    }

    #[tokio::test]
    async fn marker_written_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let rec = AuditRecorder::create(header(), &dir.path().join("runs"), &dir.path().join("triggers"))
            .await
            .unwrap();

        let path = rec.write_marker(&marker("10.0.0.1")).await.unwrap();
        assert_eq!(
            path,
            dir.path().join("triggers/10.0.0.1_20240102T030405Z_mem80.txt")
        );
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("action=restart\n"));

        // Nothing in the runs dir until finish().
        assert_eq!(std::fs::read_dir(dir.path().join("runs")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn colliding_marker_names_are_numbered() {
        let dir = tempfile::tempdir().unwrap();
        let rec = AuditRecorder::create(header(), &dir.path().join("runs"), &dir.path().join("triggers"))
            .await
            .unwrap();

        let first = rec.write_marker(&marker("n:1")).await.unwrap();
        let second = rec.write_marker(&marker("n_1")).await.unwrap();
        assert_eq!(first, dir.path().join("triggers/n_1_20240102T030405Z_mem80.txt"));
        assert_eq!(second, dir.path().join("triggers/n_1_20240102T030405Z_mem80_2.txt"));
        assert!(std::fs::read_to_string(&first).unwrap().contains("host=n:1\n"));
        assert!(std::fs::read_to_string(&second).unwrap().contains("host=n_1\n"));
    }

    #[tokio::test]
    async fn finish_writes_header_and_lines() {
        let dir = tempfile::tempdir().unwrap();
        let rec = AuditRecorder::create(header(), &dir.path().join("runs"), &dir.path().join("triggers"))
            .await
            .unwrap();
        rec.host_line("a", "PROBE RUNNING :: ok").await;
        rec.append("").await;

        let (path, record) = rec.finish().await.unwrap();
        assert_eq!(path, dir.path().join("runs/run_20240102T030405Z.log"));
        assert_eq!(record.lines, vec!["[a] PROBE RUNNING :: ok".to_string(), String::new()]);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("run_id=20240102T030405Z\nnodes_source=array\n"));
        assert!(text.ends_with("[a] PROBE RUNNING :: ok\n\n"));
    }

    #[tokio::test]
    async fn concurrent_appends_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let rec = Arc::new(
            AuditRecorder::create(header(), &dir.path().join("runs"), &dir.path().join("triggers"))
                .await
                .unwrap(),
        );

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let rec = rec.clone();
                tokio::spawn(async move { rec.host_line(&format!("h{i}"), "x").await })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(rec.lines().await.len(), 32);
    }
}
