//! The appliance under test

use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use miqnav_common::{NavConfig, Version};

use crate::control::{ApplianceControl, CommandControl};
use crate::driver::DriverFactory;
use crate::error::NavResult;
use crate::implementation::{Implementation, UiKind};
use crate::navigation::{EntityRef, Navigate};
use crate::server::{self, Server};
use crate::webdriver::RemoteDriverFactory;

/// Releases older than this need the MiqQE javascript shim
pub static SHIM_CUTOFF: Lazy<Version> = Lazy::new(|| Version::new(&[5, 6, 3]));

pub struct Appliance {
    config: NavConfig,
    version: Version,
    control: Arc<dyn ApplianceControl>,
    admin: Arc<Implementation>,
    ssui: Arc<Implementation>,
}

impl Appliance {
    pub fn new(
        config: NavConfig,
        control: Arc<dyn ApplianceControl>,
        factory: Arc<dyn DriverFactory>,
        admin_navigator: Navigate,
        ssui_navigator: Navigate,
    ) -> NavResult<Arc<Self>> {
        config.validate()?;
        let version = match &config.version {
            Some(raw) => raw.parse::<Version>()?,
            None => Version::latest(),
        };
        info!("Appliance at {} (version {})", config.base_url, version);

        let admin_navigator = Arc::new(admin_navigator);
        let ssui_navigator = Arc::new(ssui_navigator);
        Ok(Arc::new_cyclic(|me| Self {
            admin: Arc::new(Implementation::new(
                UiKind::Admin,
                me.clone(),
                admin_navigator,
                factory.clone(),
            )),
            ssui: Arc::new(Implementation::new(
                UiKind::SelfService,
                me.clone(),
                ssui_navigator,
                factory,
            )),
            config,
            version,
            control,
        }))
    }

    /// Appliance with the remote WebDriver, shell command control and the
    /// built-in server destinations
    pub fn from_config(config: NavConfig) -> NavResult<Arc<Self>> {
        let control = Arc::new(CommandControl::new(
            config.control.clone(),
            config.admin_url(),
        )?);
        let factory = Arc::new(RemoteDriverFactory::new(&config.browser)?);
        Self::new(
            config,
            control,
            factory,
            server::admin_navigator()?,
            server::ssui_navigator()?,
        )
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn control(&self) -> &Arc<dyn ApplianceControl> {
        &self.control
    }

    pub fn admin(&self) -> &Arc<Implementation> {
        &self.admin
    }

    pub fn ssui(&self) -> &Arc<Implementation> {
        &self.ssui
    }

    pub fn implementation(&self, kind: UiKind) -> &Arc<Implementation> {
        match kind {
            UiKind::Admin => &self.admin,
            UiKind::SelfService => &self.ssui,
        }
    }

    /// Whether this release predates the MiqQE shim
    pub fn is_miqqe_patch_candidate(&self) -> bool {
        self.version < *SHIM_CUTOFF
    }

    /// The server entity, root of the built-in destinations
    pub fn server(self: &Arc<Self>) -> EntityRef {
        Arc::new(Server::new(self.clone()))
    }

    pub async fn quit_browsers(&self) {
        self.admin.quit_browser().await;
        self.ssui.quit_browser().await;
    }
}

impl fmt::Debug for Appliance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Appliance")
            .field("base_url", &self.config.base_url)
            .field("version", &self.version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("5.5.3", true ; "old release")]
    #[test_case("5.6.2.9", true ; "just below")]
    #[test_case("5.6.3", false ; "cutoff")]
    #[test_case("5.9", false ; "newer")]
    #[test_case("master", false ; "upstream")]
    fn test_patch_candidate(version: &str, expected: bool) {
        let version: Version = version.parse().unwrap();
        assert_eq!(version < *SHIM_CUTOFF, expected);
    }
}
