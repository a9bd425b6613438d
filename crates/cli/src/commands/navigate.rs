//! Navigate Command

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::time::Instant;

use miqnav::{Appliance, NavArgs};
use miqnav_common::NavConfig;

use super::ui_kind;
use crate::output::{print_item, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct NavigateArgs {
    /// Destination name, e.g. LoggedIn
    destination: String,

    /// Navigate in the self-service UI
    #[arg(long)]
    ssui: bool,

    /// Skip the destination's resetter
    #[arg(long)]
    no_resetter: bool,

    /// Wait for the destination view, e.g. 10s or 2m
    #[arg(long)]
    wait: Option<String>,

    /// Leave the browser open afterwards
    #[arg(long)]
    keep_open: bool,
}

impl NavigateArgs {
    fn nav_args(&self) -> Result<NavArgs> {
        let mut args = NavArgs::new();
        if self.no_resetter {
            args = args.no_resetter();
        }
        if let Some(wait) = &self.wait {
            args = args.wait_for_view_str(wait)?;
        }
        Ok(args)
    }
}

#[derive(Serialize)]
pub struct NavigationDisplay {
    pub ui: String,
    pub destination: String,
    pub view: Option<String>,
    pub elapsed_ms: u128,
}

impl TableDisplay for NavigationDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["UI", "DESTINATION", "VIEW", "ELAPSED (ms)"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.ui.clone(),
            self.destination.clone(),
            self.view.clone().unwrap_or_else(|| "-".to_string()),
            self.elapsed_ms.to_string(),
        ]
    }
}

pub async fn execute(args: NavigateArgs, config: NavConfig, format: OutputFormat) -> Result<()> {
    let nav_args = args.nav_args()?;
    let kind = ui_kind(args.ssui);
    let appliance = Appliance::from_config(config)?;

    let start = Instant::now();
    let result = appliance
        .implementation(kind)
        .navigate_to(appliance.server(), &args.destination, nav_args)
        .await;
    let elapsed_ms = start.elapsed().as_millis();

    if !args.keep_open {
        appliance.quit_browsers().await;
    }

    let view = result?;
    print_item(
        &NavigationDisplay {
            ui: kind.to_string(),
            destination: args.destination,
            view: view.map(|v| v.name().to_string()),
            elapsed_ms,
        },
        format,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn args(no_resetter: bool, wait: Option<&str>) -> NavigateArgs {
        NavigateArgs {
            destination: "LoggedIn".to_string(),
            ssui: false,
            no_resetter,
            wait: wait.map(String::from),
            keep_open: false,
        }
    }

    #[test]
    fn test_nav_args_from_flags() {
        let nav = args(true, Some("10s")).nav_args().unwrap();
        assert!(!nav.use_resetter);
        assert_eq!(nav.wait_for_view, Some(Duration::from_secs(10)));

        let nav = args(false, None).nav_args().unwrap();
        assert!(nav.use_resetter);
        assert_eq!(nav.wait_for_view, None);
    }

    #[test]
    fn test_bad_wait_is_rejected() {
        assert!(args(false, Some("soon")).nav_args().is_err());
    }
}
