//! Appliance side channel
//!
//! Recovery sometimes has to act on the appliance itself: restart the UI
//! service, kill stuck UI workers or install the MiqQE javascript shim.

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use miqnav_common::ControlConfig;

use crate::error::{NavError, NavResult};

#[async_trait]
pub trait ApplianceControl: Send + Sync {
    /// Restart the service behind the web UI (evmserverd)
    async fn restart_ui_service(&self) -> NavResult<()>;

    async fn kill_ui_workers(&self) -> NavResult<()>;

    /// Block until the web UI answers again
    async fn wait_for_web_ui(&self, timeout: Duration) -> NavResult<()>;

    async fn shim_installed(&self) -> NavResult<bool> {
        Ok(true)
    }

    async fn install_shim(&self) -> NavResult<()> {
        Ok(())
    }
}

/// Runs the shell commands configured under `[control]`
pub struct CommandControl {
    config: ControlConfig,
    ui_url: String,
    client: reqwest::Client,
    poll_interval: Duration,
}

impl CommandControl {
    pub fn new(config: ControlConfig, ui_url: impl Into<String>) -> NavResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| NavError::Control(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            config,
            ui_url: ui_url.into(),
            client,
            poll_interval: Duration::from_secs(5),
        })
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn run(&self, what: &str, command: Option<&String>) -> NavResult<String> {
        let command = command.ok_or_else(|| {
            NavError::Control(format!("no command configured to {}", what))
        })?;
        info!("Running {} command: {}", what, command);

        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .map_err(|e| NavError::Control(format!("{}: {}", what, e)))?;

        if !output.status.success() {
            return Err(NavError::Control(format!(
                "{} exited with {}: {}",
                what,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl ApplianceControl for CommandControl {
    async fn restart_ui_service(&self) -> NavResult<()> {
        self.run("restart the UI service", self.config.restart_ui_service.as_ref())
            .await
            .map(|_| ())
    }

    async fn kill_ui_workers(&self) -> NavResult<()> {
        self.run("kill UI workers", self.config.kill_ui_workers.as_ref())
            .await
            .map(|_| ())
    }

    async fn wait_for_web_ui(&self, timeout: Duration) -> NavResult<()> {
        let start = Instant::now();
        let mut attempts = 0u32;

        while start.elapsed() < timeout {
            attempts += 1;

            match self.client.get(&self.ui_url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!("Web UI answered after {:.1}s", start.elapsed().as_secs_f64());
                    return Ok(());
                }
                Ok(resp) => {
                    debug!("Web UI returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for web UI at {}...", self.ui_url);
                    }
                    if !e.is_connect() {
                        warn!("Web UI check error: {}", e);
                    }
                }
            }

            sleep(self.poll_interval).await;
        }

        Err(NavError::Control(format!(
            "web UI at {} did not answer within {:.0}s ({} attempts)",
            self.ui_url,
            timeout.as_secs_f64(),
            attempts
        )))
    }

    async fn shim_installed(&self) -> NavResult<bool> {
        match &self.config.shim_check {
            None => Ok(true),
            Some(_) => {
                let out = self.run("check the MiqQE shim", self.config.shim_check.as_ref()).await;
                match out {
                    Ok(_) => Ok(true),
                    Err(NavError::Control(msg)) => {
                        debug!("MiqQE shim check failed: {}", msg);
                        Ok(false)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    async fn install_shim(&self) -> NavResult<()> {
        self.run("install the MiqQE shim", self.config.install_shim.as_ref())
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control(config: ControlConfig) -> CommandControl {
        CommandControl::new(config, "https://127.0.0.1:9/").unwrap()
    }

    #[tokio::test]
    async fn test_missing_command_is_a_control_error() {
        let err = control(ControlConfig::default())
            .restart_ui_service()
            .await
            .unwrap_err();
        assert!(matches!(err, NavError::Control(msg) if msg.contains("no command configured")));
    }

    #[tokio::test]
    async fn test_shim_check_without_command_assumes_installed() {
        assert!(control(ControlConfig::default()).shim_installed().await.unwrap());
    }

    #[tokio::test]
    async fn test_shim_check_runs_command() {
        let config = ControlConfig {
            shim_check: Some("exit 1".to_string()),
            ..Default::default()
        };
        assert!(!control(config).shim_installed().await.unwrap());

        let config = ControlConfig {
            shim_check: Some("true".to_string()),
            ..Default::default()
        };
        assert!(control(config).shim_installed().await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_command_reports_stderr() {
        let config = ControlConfig {
            kill_ui_workers: Some("echo boom >&2; exit 3".to_string()),
            ..Default::default()
        };
        let err = control(config).kill_ui_workers().await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_wait_for_web_ui_times_out() {
        let control = control(ControlConfig::default()).poll_interval(Duration::from_millis(10));
        let err = control
            .wait_for_web_ui(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, NavError::Control(_)));
    }
}
