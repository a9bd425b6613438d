//! miqnav common library
//!
//! Configuration, error type, logging setup and small utilities shared by the
//! navigation core and the CLI.

pub mod config;
pub mod error;
pub mod logging;
pub mod version;
pub mod wait;

pub use config::{
    BrowserConfig, ControlConfig, Credentials, LoggingConfig, NavConfig, TimeoutConfig,
};
pub use error::{Error, Result};
pub use version::Version;
pub use wait::{parse_duration, wait_for, WaitOptions};

/// miqnav version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file path
pub fn default_config_path() -> std::path::PathBuf {
    std::env::var_os("HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".miqnav")
        .join("config.yaml")
}
