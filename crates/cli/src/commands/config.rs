//! Config Commands

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use serde_json::Value;

use miqnav_common::NavConfig;

use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct ConfigArgs {
    /// Show the password instead of masking it
    #[arg(long)]
    show_secrets: bool,
}

#[derive(Serialize)]
pub struct SettingDisplay {
    pub key: String,
    pub value: String,
}

impl TableDisplay for SettingDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["KEY", "VALUE"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.key.clone(), self.value.clone()]
    }
}

/// Dotted `key = value` pairs of a JSON tree, leaves only
fn flatten(prefix: &str, value: &Value, out: &mut Vec<SettingDisplay>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let key = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten(&key, child, out);
            }
        }
        Value::Null => out.push(SettingDisplay {
            key: prefix.to_string(),
            value: "-".to_string(),
        }),
        Value::String(s) => out.push(SettingDisplay {
            key: prefix.to_string(),
            value: s.clone(),
        }),
        other => out.push(SettingDisplay {
            key: prefix.to_string(),
            value: other.to_string(),
        }),
    }
}

pub fn settings(config: &NavConfig, show_secrets: bool) -> Result<Value> {
    let mut config = config.clone();
    if !show_secrets {
        config.credentials.secret = "********".to_string();
    }
    Ok(serde_json::to_value(&config)?)
}

pub fn execute(args: ConfigArgs, config: &NavConfig, format: OutputFormat) -> Result<()> {
    let tree = settings(config, args.show_secrets)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&tree)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&tree)?),
        OutputFormat::Table | OutputFormat::Plain => {
            let mut rows = Vec::new();
            flatten("", &tree, &mut rows);
            print_list(&rows, format)?;
        }
    }
    Ok(())
}
