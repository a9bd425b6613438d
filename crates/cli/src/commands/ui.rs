//! Web UI Commands

use anyhow::Result;
use clap::Args;
use std::time::Duration;

use miqnav::{ApplianceControl, CommandControl};
use miqnav_common::{parse_duration, NavConfig};

use crate::output::{print_error, print_success};

#[derive(Args)]
pub struct WaitUiArgs {
    /// How long to wait, e.g. 15m; defaults to timeouts.web_ui_s
    #[arg(long)]
    timeout: Option<String>,
}

fn timeout(args: &WaitUiArgs, config: &NavConfig) -> Result<Duration> {
    Ok(match &args.timeout {
        Some(raw) => parse_duration(raw)?,
        None => config.timeouts.web_ui(),
    })
}

pub async fn execute(args: WaitUiArgs, config: NavConfig) -> Result<()> {
    let timeout = timeout(&args, &config)?;
    let control = CommandControl::new(config.control.clone(), config.admin_url())?;

    match control.wait_for_web_ui(timeout).await {
        Ok(()) => {
            print_success(&format!("Web UI is up at {}", config.admin_url()));
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Web UI did not come up: {}", e));
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_defaults_to_config() {
        let config = NavConfig::default();
        let args = WaitUiArgs { timeout: None };
        assert_eq!(timeout(&args, &config).unwrap(), config.timeouts.web_ui());

        let args = WaitUiArgs {
            timeout: Some("2m".to_string()),
        };
        assert_eq!(timeout(&args, &config).unwrap(), Duration::from_secs(120));
    }
}
