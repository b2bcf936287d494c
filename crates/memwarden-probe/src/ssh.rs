//! SSH transport for the remote capability.
//!
//! Each call runs `ssh ... <user>@<host> bash -s` and feeds a bash script
//! over stdin, which sidesteps quoting problems with `bash -c`.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use memwarden_core::config::RemoteConfig;
use memwarden_core::CommandOutput;

use crate::remote::RemoteCapability;

const SERVICE_PLACEHOLDER: &str = "__SERVICE__";

/// Read-only probe. Prints exactly one `STATE ...` line.
const PROBE_SCRIPT: &str = r#"
set -euo pipefail

SERVICE="__SERVICE__"

PID=$(systemctl show -p MainPID --value "$SERVICE" || true)
if [ -z "$PID" ] || [ "$PID" = "0" ]; then
  echo "STATE stopped service=${SERVICE}"
  exit 0
fi

PMEM_RAW=$(ps -p "$PID" -o %mem= || true)
PMEM_INT=$(echo "$PMEM_RAW" | awk '{printf("%d\n",$1)}')

echo "STATE running service=${SERVICE} pid=${PID} mem=${PMEM_INT}"
"#;

const RESTART_SCRIPT: &str = r#"
set -euo pipefail
SERVICE="__SERVICE__"
__SUDO__systemctl restart "$SERVICE"
echo "RESTARTED service=${SERVICE}"
"#;

/// Production [`RemoteCapability`] backed by the system `ssh` client.
#[derive(Debug, Clone)]
pub struct SshCapability {
    config: RemoteConfig,
    probe_script: String,
    restart_script: String,
}

impl SshCapability {
    /// The service name must already be validated; it is spliced into the scripts.
    pub fn new(config: RemoteConfig, service: &str) -> Self {
        let sudo = if config.use_sudo { "sudo " } else { "" };
        Self {
            probe_script: PROBE_SCRIPT.replace(SERVICE_PLACEHOLDER, service),
            restart_script: RESTART_SCRIPT
                .replace(SERVICE_PLACEHOLDER, service)
                .replace("__SUDO__", sudo),
            config,
        }
    }

    /// Arguments passed to the ssh program, host last before the remote command.
    fn ssh_args(&self, host: &str) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(key) = &self.config.identity_file {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
        args.extend([
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout().as_secs()),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            format!("{}@{}", self.config.user, host),
            "bash".to_string(),
            "-s".to_string(),
        ]);
        args
    }

    async fn run(&self, host: &str, script: &str) -> CommandOutput {
        let timeout = self.config.command_timeout();
        match tokio::time::timeout(timeout, self.run_inner(host, script)).await {
            Ok(output) => output,
            Err(_) => {
                warn!(%host, timeout_secs = timeout.as_secs(), "remote call timed out");
                CommandOutput::new(
                    CommandOutput::TIMED_OUT,
                    format!("ssh: timed out after {}", fmt_secs(timeout)),
                )
            }
        }
    }

    async fn run_inner(&self, host: &str, script: &str) -> CommandOutput {
        let mut child = match Command::new(&self.config.ssh_program)
            .args(self.ssh_args(host))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(c) => c,
            Err(e) => {
                warn!(%host, error = %e, program = %self.config.ssh_program, "failed to spawn ssh");
                return CommandOutput::new(
                    CommandOutput::TRANSPORT_FAILURE,
                    format!("failed to spawn {}: {e}", self.config.ssh_program),
                );
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(script.as_bytes()).await {
                // The remote side may have closed early; its exit status tells the story.
                debug!(%host, error = %e, "writing script to ssh stdin failed");
            }
            drop(stdin);
        }

        match child.wait_with_output().await {
            Ok(out) => {
                let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&out.stderr));
                let exit_code = out.status.code().unwrap_or(CommandOutput::TRANSPORT_FAILURE);
                debug!(%host, exit_code, "remote call finished");
                CommandOutput::new(exit_code, text.trim())
            }
            Err(e) => {
                warn!(%host, error = %e, "waiting for ssh failed");
                CommandOutput::new(CommandOutput::TRANSPORT_FAILURE, format!("ssh wait failed: {e}"))
            }
        }
    }
}

impl RemoteCapability for SshCapability {
    async fn probe(&self, host: &str) -> CommandOutput {
        self.run(host, &self.probe_script).await
    }

    async fn restart(&self, host: &str) -> CommandOutput {
        self.run(host, &self.restart_script).await
    }
}

fn fmt_secs(d: Duration) -> String {
    format!("{}s", d.as_secs())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn test_remote() -> RemoteConfig {
        RemoteConfig {
            user: "ops".to_string(),
            identity_file: Some(PathBuf::from("/keys/id")),
            connect_timeout_secs: 3,
            command_timeout_secs: Some(2),
            ssh_program: "ssh".to_string(),
            use_sudo: true,
        }
    }

    #[test]
    fn scripts_carry_service_name() {
        let ssh = SshCapability::new(test_remote(), "memhog");
        assert!(ssh.probe_script.contains(r#"SERVICE="memhog""#));
        assert!(!ssh.probe_script.contains(SERVICE_PLACEHOLDER));
        assert!(ssh.restart_script.contains(r#"sudo systemctl restart "$SERVICE""#));
    }

    #[test]
    fn probe_script_is_read_only() {
        let ssh = SshCapability::new(test_remote(), "memhog");
        assert!(!ssh.probe_script.contains("restart"));
        assert!(!ssh.probe_script.contains("sudo"));
    }

    #[test]
    fn sudo_can_be_disabled() {
        let remote = RemoteConfig {
            use_sudo: false,
            ..test_remote()
        };
        let ssh = SshCapability::new(remote, "memhog");
        assert!(ssh.restart_script.contains("\nsystemctl restart"));
        assert!(!ssh.restart_script.contains("sudo"));
    }

    #[test]
    fn ssh_args_layout() {
        let ssh = SshCapability::new(test_remote(), "memhog");
        let args = ssh.ssh_args("10.0.0.5");
        assert_eq!(&args[..2], ["-i", "/keys/id"]);
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"ConnectTimeout=3".to_string()));
        assert!(args.contains(&"StrictHostKeyChecking=accept-new".to_string()));
        assert_eq!(&args[args.len() - 3..], ["ops@10.0.0.5", "bash", "-s"]);
    }

    #[test]
    fn no_identity_file_omits_flag() {
        let remote = RemoteConfig {
            identity_file: None,
            ..test_remote()
        };
        let args = SshCapability::new(remote, "memhog").ssh_args("h");
        assert!(!args.contains(&"-i".to_string()));
    }

    #[tokio::test]
    async fn missing_program_is_transport_failure() {
        let remote = RemoteConfig {
            ssh_program: "/nonexistent/ssh-binary".to_string(),
            ..test_remote()
        };
        let ssh = SshCapability::new(remote, "memhog");
        let out = ssh.probe("10.0.0.5").await;
        assert_eq!(out.exit_code, CommandOutput::TRANSPORT_FAILURE);
        assert!(out.output.contains("failed to spawn"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_remote_call_times_out() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fake_ssh = dir.path().join("fake-ssh");
        std::fs::write(&fake_ssh, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&fake_ssh, std::fs::Permissions::from_mode(0o755)).unwrap();

        let remote = RemoteConfig {
            ssh_program: fake_ssh.display().to_string(),
            command_timeout_secs: Some(1),
            ..test_remote()
        };
        let ssh = SshCapability::new(remote, "memhog");

        let started = std::time::Instant::now();
        let out = ssh.probe("10.0.0.5").await;
        assert_eq!(out.exit_code, CommandOutput::TIMED_OUT);
        assert_eq!(out.output, "ssh: timed out after 1s");
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
