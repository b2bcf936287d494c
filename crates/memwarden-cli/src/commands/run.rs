use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use memwarden_core::MemwardenConfig;
use memwarden_dispatch::{Orchestrator, RunOptions, RunSummary};
use memwarden_probe::SshCapability;

const DEFAULT_CONFIG: &str = "/etc/memwarden/memwarden.toml";

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub inventory_file: Option<PathBuf>,
    pub service: Option<String>,
    pub threshold: Option<u32>,
    pub min_other_running: Option<usize>,
    pub probe_workers: Option<usize>,
}

impl Overrides {
    fn apply(self, config: &mut MemwardenConfig) {
        if let Some(file) = self.inventory_file {
            config.inventory.file = Some(file);
        }
        if let Some(service) = self.service {
            config.service.name = service;
        }
        if let Some(threshold) = self.threshold {
            config.service.memory_threshold_percent = threshold;
        }
        if let Some(min) = self.min_other_running {
            config.service.min_other_running_nodes = min;
        }
        if let Some(workers) = self.probe_workers {
            config.concurrency.probe_workers = workers;
        }
    }
}

pub async fn run(
    config_path: Option<&Path>,
    overrides: Overrides,
    dry_run: bool,
    format: &str,
) -> anyhow::Result<()> {
    let config = load_config(config_path, overrides)?;
    let remote = SshCapability::new(config.remote.clone(), &config.service.name);
    let orchestrator = Orchestrator::new(Arc::new(config), Arc::new(remote));

    let summary = orchestrator
        .run(RunOptions {
            run_id: None,
            dry_run,
        })
        .await
        .context("run aborted")?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => print_text(&summary),
    }
    Ok(())
}

fn load_config(path: Option<&Path>, overrides: Overrides) -> anyhow::Result<MemwardenConfig> {
    let mut config = match path {
        Some(p) => MemwardenConfig::from_file(p)?,
        None if Path::new(DEFAULT_CONFIG).exists() => {
            MemwardenConfig::from_file(Path::new(DEFAULT_CONFIG))?
        }
        None => {
            info!("no config file, using built-in defaults");
            MemwardenConfig::default()
        }
    };
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn print_text(summary: &RunSummary) {
    for host in &summary.hosts {
        let decision = host.decision.map_or("-", |d| d.as_str());
        let restart = match &host.restart {
            Some(r) if r.outcome.success => "restarted",
            Some(_) => "restart failed",
            None => "",
        };
        println!("{:<24} {:<20} {}", host.host, decision, restart);
    }
    println!("Wrote run log: {}", summary.log_path.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memwarden.toml");
        std::fs::write(
            &path,
            "[service]\nname = \"api\"\nmemory_threshold_percent = 50\n",
        )
        .unwrap();

        let config = load_config(
            Some(&path),
            Overrides {
                threshold: Some(80),
                min_other_running: Some(2),
                ..Overrides::default()
            },
        )
        .unwrap();

        assert_eq!(config.service.name, "api");
        assert_eq!(config.service.memory_threshold_percent, 80);
        assert_eq!(config.service.min_other_running_nodes, 2);
    }

    #[test]
    fn invalid_override_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memwarden.toml");
        std::fs::write(&path, "").unwrap();

        let result = load_config(
            Some(&path),
            Overrides {
                threshold: Some(150),
                ..Overrides::default()
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn explicit_missing_config_is_error() {
        let result = load_config(Some(Path::new("/nonexistent/memwarden.toml")), Overrides::default());
        assert!(result.is_err());
    }
}
