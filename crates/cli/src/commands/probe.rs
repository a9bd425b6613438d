//! Probe Command

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use miqnav::views::ErrorView;
use miqnav::{Appliance, MiqBrowserPlugin, PageProbes, UiKind, ViewContext};
use miqnav_common::NavConfig;

use super::ui_kind;
use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct ProbeArgs {
    /// Open the self-service UI
    #[arg(long)]
    ssui: bool,

    /// Leave the browser open afterwards
    #[arg(long)]
    keep_open: bool,
}

#[derive(Serialize)]
pub struct ProbeDisplay {
    pub check: String,
    pub result: String,
}

impl ProbeDisplay {
    fn new(check: impl Into<String>, result: impl ToString) -> Self {
        Self {
            check: check.into(),
            result: result.to_string(),
        }
    }
}

impl TableDisplay for ProbeDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["CHECK", "RESULT"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.check.clone(), self.result.clone()]
    }
}

pub fn page_rows(probes: &PageProbes) -> Vec<ProbeDisplay> {
    vec![
        ProbeDisplay::new("blocker", probes.blocker),
        ProbeDisplay::new("exception_div", probes.exception_div),
        ProbeDisplay::new("proxy_error", probes.proxy_error),
        ProbeDisplay::new(
            "error_page",
            probes.error_page.as_deref().unwrap_or("-"),
        ),
        ProbeDisplay::new("rails_dialog", probes.rails_dialog),
        ProbeDisplay::new("menu_glitch", probes.menu_glitch),
        ProbeDisplay::new("login_page", probes.login_page),
    ]
}

async fn collect(appliance: &Appliance, kind: UiKind) -> Result<Vec<ProbeDisplay>> {
    let implementation = appliance.implementation(kind);
    let browser = implementation.open_browser().await?;

    let mut rows = vec![
        ProbeDisplay::new("url", browser.current_url().await?),
        ProbeDisplay::new("alert", browser.get_alert().await.unwrap_or_else(|| "-".to_string())),
    ];
    rows.extend(page_rows(&PageProbes::collect(&browser, kind).await));

    let errors = browser.create_view::<ErrorView>(ViewContext::default());
    rows.push(ProbeDisplay::new(
        "backend_unavailable",
        errors.backend_unavailable().await.unwrap_or_else(|| "-".to_string()),
    ));
    rows.push(ProbeDisplay::new(
        "rails_error",
        errors.rails_error().await.unwrap_or_else(|| "-".to_string()),
    ));

    if kind == UiKind::Admin {
        for (name, quiet) in MiqBrowserPlugin.probe_report(&browser).await {
            rows.push(ProbeDisplay::new(format!("quiet.{}", name), quiet));
        }
    }
    Ok(rows)
}

pub async fn execute(args: ProbeArgs, config: NavConfig, format: OutputFormat) -> Result<()> {
    let appliance = Appliance::from_config(config)?;
    let result = collect(&appliance, ui_kind(args.ssui)).await;
    if !args.keep_open {
        appliance.quit_browsers().await;
    }
    print_list(&result?, format)
}
