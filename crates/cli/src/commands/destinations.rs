//! Destination Commands

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use miqnav::server::{admin_navigator, ssui_navigator};
use miqnav::Navigate;

use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct DestinationsArgs {
    /// List the self-service registry
    #[arg(long)]
    ssui: bool,
}

#[derive(Serialize)]
pub struct DestinationDisplay {
    pub class: String,
    pub destination: String,
}

impl TableDisplay for DestinationDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["CLASS", "DESTINATION"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.class.clone(), self.destination.clone()]
    }
}

pub fn listing(navigate: &Navigate) -> Vec<DestinationDisplay> {
    navigate
        .destinations()
        .into_iter()
        .map(|(class, destination)| DestinationDisplay {
            class: class.to_string(),
            destination,
        })
        .collect()
}

pub fn execute(args: DestinationsArgs, format: OutputFormat) -> Result<()> {
    let navigate = if args.ssui {
        ssui_navigator()?
    } else {
        admin_navigator()?
    };
    print_list(&listing(&navigate), format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_listing_is_sorted() {
        let rows = listing(&admin_navigator().unwrap());
        let names: Vec<&str> = rows.iter().map(|r| r.destination.as_str()).collect();
        assert_eq!(names, vec!["Configuration", "Dashboard", "LoggedIn", "LoginScreen"]);
        assert!(rows.iter().all(|r| r.class == "Server"));
    }
}
