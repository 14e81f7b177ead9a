//! SSH/SCP transport over subprocesses.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use jartrack_core::config::JartrackConfig;
use jartrack_core::error::JartrackError;
use jartrack_core::models::service::Service;

use crate::process::{run_with_timeout, CommandOutput};
use crate::{listing, Listing, Transport};

/// Transport for services reachable over SSH with stored credentials.
pub struct SshTransport {
    host: String,
    port: u16,
    username: String,
    password: String,
    connect_timeout_secs: u64,
    command_timeout: Duration,
}

impl SshTransport {
    pub fn from_service(service: &Service, config: &JartrackConfig) -> Self {
        Self {
            host: service.host.clone(),
            port: service.port,
            username: service.username.clone(),
            password: service.password.clone(),
            connect_timeout_secs: config.ssh_connect_timeout_secs,
            command_timeout: Duration::from_secs(config.ssh_command_timeout_secs),
        }
    }

    fn target(&self) -> String {
        if self.username.is_empty() {
            self.host.clone()
        } else {
            format!("{}@{}", self.username, self.host)
        }
    }

    /// Build ssh/scp with common options. Password auth is routed through
    /// `sshpass -e`; the secret travels in the environment, never on argv.
    fn base_command(&self, program: &str) -> Command {
        let mut cmd = if self.password.is_empty() {
            let mut cmd = Command::new(program);
            cmd.arg("-o").arg("BatchMode=yes");
            cmd
        } else {
            let mut cmd = Command::new("sshpass");
            cmd.arg("-e").env("SSHPASS", &self.password).arg(program);
            cmd
        };
        cmd.arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout_secs));
        cmd
    }

    fn ssh_command(&self) -> Command {
        let mut cmd = self.base_command("ssh");
        cmd.arg("-p").arg(self.port.to_string());
        cmd
    }

    fn scp_command(&self) -> Command {
        let mut cmd = self.base_command("scp");
        cmd.arg("-P").arg(self.port.to_string()).arg("-C");
        cmd
    }

    /// Execute one remote command under the configured timeout.
    fn run(&self, remote_command: &str) -> Result<CommandOutput, JartrackError> {
        let mut cmd = self.ssh_command();
        cmd.arg(self.target()).arg(remote_command);
        run_with_timeout(cmd, self.command_timeout)
    }
}

impl Transport for SshTransport {
    fn list(&self, path: &str, recursive: bool) -> Result<Listing, JartrackError> {
        let flag = if recursive { "-lR" } else { "-l" };
        let remote = format!("cd '{path}' && ls {flag} --block-size=1 --time-style=full-iso");
        let output = self.run(&remote)?;
        if !output.success() {
            return Err(JartrackError::Transport {
                service: self.target(),
                message: format!("listing {path} failed: {}", output.stderr_text()),
            });
        }
        let text = listing::decode_listing(&output.stdout);
        let parsed = listing::parse_listing(&text);
        if parsed.malformed > 0 {
            tracing::warn!(
                host = %self.host,
                path,
                malformed = parsed.malformed,
                "listing contained unparseable lines"
            );
        }
        Ok(parsed)
    }

    fn fetch(&self, src: &str, dst: &Path) -> Result<u64, JartrackError> {
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut cmd = self.scp_command();
        cmd.arg(format!("{}:{}", self.target(), src)).arg(dst);
        let output = run_with_timeout(cmd, self.command_timeout)?;
        if !output.success() {
            return Err(JartrackError::Transport {
                service: self.target(),
                message: format!("fetch {src} failed: {}", output.stderr_text()),
            });
        }
        let meta = std::fs::metadata(dst)?;
        Ok(meta.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jartrack_core::models::service::ServiceSpec;

    fn remote_service() -> Service {
        Service::from_spec(ServiceSpec {
            service_name: "gateway".to_string(),
            environment: "production".to_string(),
            host: "10.0.0.5".to_string(),
            port: 2222,
            username: "deploy".to_string(),
            password: "secret".to_string(),
            server_base_path: String::new(),
            jar_path: "lib".to_string(),
            classes_path: "classes".to_string(),
            jar_decompile_output_dir: "out/lib".to_string(),
            class_decompile_output_dir: "out/classes".to_string(),
            description: None,
        })
    }

    #[test]
    fn test_target_includes_username() {
        let transport = SshTransport::from_service(&remote_service(), &JartrackConfig::default());
        assert_eq!(transport.target(), "deploy@10.0.0.5");
    }

    #[test]
    fn test_password_goes_through_sshpass_env() {
        let transport = SshTransport::from_service(&remote_service(), &JartrackConfig::default());
        let cmd = transport.ssh_command();
        assert_eq!(cmd.get_program(), "sshpass");
        let args: Vec<_> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert!(args.contains(&"ssh".to_string()));
        assert!(!args.iter().any(|a| a.contains("secret")));
        let envs: Vec<_> = cmd
            .get_envs()
            .filter_map(|(k, v)| v.map(|v| (k.to_string_lossy().to_string(), v.to_string_lossy().to_string())))
            .collect();
        assert!(envs.contains(&("SSHPASS".to_string(), "secret".to_string())));
    }

    #[test]
    fn test_keyless_uses_batch_mode() {
        let mut service = remote_service();
        service.password = String::new();
        let transport = SshTransport::from_service(&service, &JartrackConfig::default());
        let cmd = transport.ssh_command();
        assert_eq!(cmd.get_program(), "ssh");
        let args: Vec<_> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"ConnectTimeout=10".to_string()));
    }
}
