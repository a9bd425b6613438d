//! Navigation configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Top-level configuration for one appliance and its browser sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    /// Appliance entry point
    pub base_url: String,

    /// Appliance product version, when known up front
    pub version: Option<String>,

    /// Default login
    pub credentials: Credentials,

    /// Bounded waits used by the core
    pub timeouts: TimeoutConfig,

    /// Attempts per `go` before giving up
    pub max_tries: u32,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Browser / WebDriver configuration
    pub browser: BrowserConfig,

    /// Appliance side-channel commands
    pub control: ControlConfig,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            base_url: "https://localhost/".to_string(),
            version: None,
            credentials: Credentials::default(),
            timeouts: TimeoutConfig::default(),
            max_tries: 3,
            logging: LoggingConfig::default(),
            browser: BrowserConfig::default(),
            control: ControlConfig::default(),
        }
    }
}

/// Login credentials
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub principal: String,
    pub secret: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            principal: "admin".to_string(),
            secret: "smartvm".to_string(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("principal", &self.principal)
            .field("secret", &"********")
            .finish()
    }
}

/// Timeouts, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upper bound for ensure-page-safe polling
    pub ensure_safe_s: f64,

    /// Upper bound for the post-navigation view wait
    pub wait_for_view_s: f64,

    /// Pause before every keyboard input
    pub keyboard_debounce_s: f64,

    /// Minimum pause after typing into an observed field
    pub observed_field_s: f64,

    /// Upper bound for waiting on the web UI after a backend restart
    pub web_ui_s: f64,

    /// Rest period after killing UI workers
    pub ui_settle_s: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            ensure_safe_s: 20.0,
            wait_for_view_s: 10.0,
            keyboard_debounce_s: 0.3,
            observed_field_s: 0.8,
            web_ui_s: 900.0,
            ui_settle_s: 10.0,
        }
    }
}

/// Longest timeout accepted in configuration, one day
pub const MAX_TIMEOUT_S: f64 = 86_400.0;

fn bounded(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds.min(MAX_TIMEOUT_S)).unwrap_or_default()
}

impl TimeoutConfig {
    pub fn ensure_safe(&self) -> Duration {
        bounded(self.ensure_safe_s)
    }

    pub fn wait_for_view(&self) -> Duration {
        bounded(self.wait_for_view_s)
    }

    pub fn keyboard_debounce(&self) -> Duration {
        bounded(self.keyboard_debounce_s)
    }

    pub fn observed_field(&self) -> Duration {
        bounded(self.observed_field_s)
    }

    pub fn web_ui(&self) -> Duration {
        bounded(self.web_ui_s)
    }

    pub fn ui_settle(&self) -> Duration {
        bounded(self.ui_settle_s)
    }

    fn fields(&self) -> [(&'static str, f64); 6] {
        [
            ("ensure_safe_s", self.ensure_safe_s),
            ("wait_for_view_s", self.wait_for_view_s),
            ("keyboard_debounce_s", self.keyboard_debounce_s),
            ("observed_field_s", self.observed_field_s),
            ("web_ui_s", self.web_ui_s),
            ("ui_settle_s", self.ui_settle_s),
        ]
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level filter, overridden by `RUST_LOG`
    pub level: String,

    /// Optional log file; rotated by size
    pub file_path: Option<PathBuf>,

    /// Rotate once the file grows past this many bytes
    pub max_size: u64,

    /// Number of rotated files to keep
    pub backups: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_path: None,
            max_size: 10 * 1024 * 1024,
            backups: 5,
        }
    }
}

/// Browser configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// W3C WebDriver endpoint (geckodriver, chromedriver, Selenium grid)
    pub webdriver_url: String,

    /// `browserName` capability
    pub browser_name: String,

    /// Run without a visible window
    pub headless: bool,

    /// Path of the self-service UI relative to `base_url`
    pub ssui_path: String,

    /// Skip the post-navigation view wait even when requested
    pub disable_view_assert: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://127.0.0.1:4444".to_string(),
            browser_name: "firefox".to_string(),
            headless: true,
            ssui_path: "self_service".to_string(),
            disable_view_assert: false,
        }
    }
}

/// Shell commands used for appliance side-channel actions
///
/// Any transport works as long as it is a command line, e.g.
/// `ssh root@appliance systemctl restart evmserverd`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub restart_ui_service: Option<String>,
    pub kill_ui_workers: Option<String>,
    pub install_shim: Option<String>,
    /// Exits 0 when the MiqQE shim is present
    pub shim_check: Option<String>,
}

impl NavConfig {
    /// Load configuration from a TOML or YAML file; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&content)?,
            _ => Self::from_yaml(&content)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Check the values that the core relies on
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.base_url)
            .map_err(|e| Error::InvalidConfig(format!("base_url {:?}: {}", self.base_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidConfig(format!(
                "base_url must be http(s), got {}",
                url.scheme()
            )));
        }

        if self.max_tries == 0 {
            return Err(Error::InvalidConfig("max_tries must be at least 1".to_string()));
        }

        for (name, value) in self.timeouts.fields() {
            if !(0.0..=MAX_TIMEOUT_S).contains(&value) {
                return Err(Error::InvalidConfig(format!(
                    "timeouts.{} must be between 0 and {}, got {}",
                    name, MAX_TIMEOUT_S, value
                )));
            }
        }

        if let Some(version) = &self.version {
            version.parse::<crate::Version>()?;
        }

        Ok(())
    }

    /// Address of the admin UI
    pub fn admin_url(&self) -> String {
        self.base_url.clone()
    }

    /// Address of the self-service UI
    pub fn ssui_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{}/{}", base, self.browser.ssui_path.trim_start_matches('/'))
    }
}
