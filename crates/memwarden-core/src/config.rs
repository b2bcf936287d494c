//! memwarden.toml configuration parser.
//!
//! The config is loaded once at startup and handed to every component.
//! All sections are optional; missing fields take the defaults below.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemwardenConfig {
    pub inventory: InventoryConfig,
    pub remote: RemoteConfig,
    pub service: ServiceConfig,
    pub paths: PathsConfig,
    pub concurrency: ConcurrencyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InventoryConfig {
    /// One host per line; `#` comments and blank lines are ignored.
    pub file: Option<PathBuf>,
    /// Static fallback used when the file is missing, unreadable or empty.
    pub hosts: Vec<String>,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            file: Some(PathBuf::from("/opt/thirdparty_highmem_restart/inventory.txt")),
            hosts: vec!["192.168.56.11".to_string(), "192.168.56.12".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteConfig {
    pub user: String,
    pub identity_file: Option<PathBuf>,
    pub connect_timeout_secs: u64,
    /// Upper bound on a whole remote call. Defaults to connect timeout + 30s.
    pub command_timeout_secs: Option<u64>,
    pub ssh_program: String,
    /// Run the restart command through `sudo`.
    pub use_sudo: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            user: "vagrant".to_string(),
            identity_file: Some(PathBuf::from("/home/vagrant/.ssh/highmem_ed25519")),
            connect_timeout_secs: 8,
            command_timeout_secs: None,
            ssh_program: "ssh".to_string(),
            use_sudo: true,
        }
    }
}

impl RemoteConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        let secs = self
            .command_timeout_secs
            .unwrap_or(self.connect_timeout_secs + 30);
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// systemd unit name on the target hosts.
    pub name: String,
    /// Restart above this share of total RAM (ps %mem, integer).
    pub memory_threshold_percent: u32,
    /// Other hosts that must be running before one host may be restarted.
    pub min_other_running_nodes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "memhog".to_string(),
            memory_threshold_percent: 60,
            min_other_running_nodes: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub base_dir: PathBuf,
    pub runs_dir: Option<PathBuf>,
    pub triggers_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("/var/log/thirdparty_highmem_restart"),
            runs_dir: None,
            triggers_dir: None,
        }
    }
}

impl PathsConfig {
    /// Directory holding one `run_<id>.log` per run.
    pub fn runs_dir(&self) -> PathBuf {
        self.runs_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join("runs"))
    }

    /// Directory holding one marker file per successful restart.
    pub fn triggers_dir(&self) -> PathBuf {
        self.triggers_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join("triggers"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConcurrencyConfig {
    /// Concurrent probes. 0 means one worker per host.
    pub probe_workers: usize,
    /// Concurrent restarts. 1 keeps the run log in gate order.
    pub restart_workers: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            probe_workers: 0,
            restart_workers: 1,
        }
    }
}

impl MemwardenConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: MemwardenConfig =
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values that would make a run meaningless or unsafe.
    pub fn validate(&self) -> ConfigResult<()> {
        let name = &self.service.name;
        if name.is_empty() {
            return Err(ConfigError::Invalid("service.name must not be empty".into()));
        }
        // The name is spliced into remote shell scripts.
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '@' | '-'))
        {
            return Err(ConfigError::Invalid(format!(
                "service.name {name:?} contains characters outside [A-Za-z0-9_.@-]"
            )));
        }
        if self.service.memory_threshold_percent > 100 {
            return Err(ConfigError::Invalid(format!(
                "service.memory_threshold_percent must be 0..=100, got {}",
                self.service.memory_threshold_percent
            )));
        }
        if self.remote.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "remote.connect_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.remote.command_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "remote.command_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.remote.user.is_empty() {
            return Err(ConfigError::Invalid("remote.user must not be empty".into()));
        }
        Ok(())
    }
}
