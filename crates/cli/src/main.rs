//! miqnav CLI - Main Entry Point
//!
//! Drives the navigation core against a live appliance: inspect the
//! configuration and destination registry, probe the page, navigate the
//! appliance server to a destination or wait for the web UI to come back.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use miqnav_common::NavConfig;

mod commands;
mod output;

use commands::{config, destinations, navigate, probe, ui};

/// Navigation core for ManageIQ/CFME UI automation
#[derive(Parser)]
#[command(name = "miqnav")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (YAML, or TOML by extension)
    #[arg(long, env = "MIQNAV_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the effective configuration
    Config(config::ConfigArgs),

    /// List registered destinations
    Destinations(destinations::DestinationsArgs),

    /// Report what the current page looks like to the badness checks
    Probe(probe::ProbeArgs),

    /// Navigate the appliance server to a destination
    Navigate(navigate::NavigateArgs),

    /// Wait until the web UI answers
    WaitUi(ui::WaitUiArgs),

    /// Show version information
    Version,
}

fn load_config(path: Option<PathBuf>) -> Result<NavConfig> {
    let path = path.unwrap_or_else(miqnav_common::default_config_path);
    NavConfig::load(&path).with_context(|| format!("loading {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut nav_config = load_config(cli.config)?;
    if cli.verbose {
        nav_config.logging.level = "debug".to_string();
    }
    miqnav_common::logging::init(&nav_config.logging)?;

    match cli.command {
        Commands::Config(args) => config::execute(args, &nav_config, cli.format)?,
        Commands::Destinations(args) => destinations::execute(args, cli.format)?,
        Commands::Probe(args) => probe::execute(args, nav_config, cli.format).await?,
        Commands::Navigate(args) => navigate::execute(args, nav_config, cli.format).await?,
        Commands::WaitUi(args) => ui::execute(args, nav_config).await?,
        Commands::Version => {
            println!("miqnav v{}", miqnav_common::VERSION);
        }
    }

    Ok(())
}
