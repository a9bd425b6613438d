//! Failure classification for the badness guard
//!
//! `classify` is a pure function of the error, the try number and, for driver
//! errors that do not explain themselves, a snapshot of what the page shows.

use std::fmt;
use tracing::debug;

use crate::browser::Browser;
use crate::driver::DriverError;
use crate::error::{Badness, NavError};
use crate::implementation::UiKind;
use crate::view::{View, ViewContext};
use crate::views::{ErrorView, LoginPage, SsuiLoginPage};

pub const BLOCKER: &str = "//div[@id='blocker_div' or @id='notification']";
pub const MODAL_BACKDROP: &str = ".modal-backdrop.fade.in";
pub const EXCEPTION_DIV: &str = "//div[@id='exception_div']";
pub const RAILS_DIALOG: &str = "//body/div[@class='dialog' and ./h1 and ./p]";
pub const MENU_INACTIVE: &str = "//ul[@id='maintab']/li[@class='inactive']";
pub const MENU_ACTIVE_ITEMS: &str = "//ul[@id='maintab']/li[@class='active']/ul/li";

/// What the guard does about a failed hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Not recoverable here; the error goes to the caller
    Propagate,
    AcceptAlertAndRetry,
    QuitAndRetry,
    RestartBackendAndRetry,
    KillWorkersAndRetry,
    /// Install the MiqQE shim; does not use up a try
    InstallShimAndRetry,
}

impl RecoveryAction {
    pub fn consumes_try(&self) -> bool {
        !matches!(self, RecoveryAction::InstallShimAndRetry)
    }
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecoveryAction::Propagate => "propagate",
            RecoveryAction::AcceptAlertAndRetry => "accept alert and retry",
            RecoveryAction::QuitAndRetry => "quit browser and retry",
            RecoveryAction::RestartBackendAndRetry => "restart backend and retry",
            RecoveryAction::KillWorkersAndRetry => "kill UI workers and retry",
            RecoveryAction::InstallShimAndRetry => "install shim and retry",
        };
        f.write_str(name)
    }
}

/// Page state looked at when a driver error does not explain itself
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageProbes {
    pub blocker: bool,
    pub exception_div: bool,
    pub proxy_error: bool,
    /// Title of an Apache style error page
    pub error_page: Option<String>,
    pub rails_dialog: bool,
    pub menu_glitch: bool,
    pub login_page: bool,
}

impl PageProbes {
    pub async fn collect(browser: &Browser, kind: UiKind) -> Self {
        let blocker =
            browser.is_displayed(BLOCKER).await || browser.is_displayed(MODAL_BACKDROP).await;
        let exception_div = browser.is_displayed(EXCEPTION_DIV).await;
        let proxy_error = browser.is_displayed(ErrorView::PROXY_ERROR).await;
        let error_page = if browser.is_displayed(ErrorView::ERROR_PAGE).await {
            Some(browser.text(ErrorView::TITLE).await.unwrap_or_default())
        } else {
            None
        };
        let rails_dialog = browser.is_displayed(RAILS_DIALOG).await;
        let menu_glitch = has_elements(browser, MENU_INACTIVE).await
            && !has_elements(browser, MENU_ACTIVE_ITEMS).await;
        let login_page = match kind {
            UiKind::Admin => {
                browser
                    .create_view::<LoginPage>(ViewContext::default())
                    .is_displayed()
                    .await
            }
            UiKind::SelfService => {
                browser
                    .create_view::<SsuiLoginPage>(ViewContext::default())
                    .is_displayed()
                    .await
            }
        };

        let probes = Self {
            blocker,
            exception_div,
            proxy_error,
            error_page,
            rails_dialog,
            menu_glitch,
            login_page,
        };
        debug!("Page probes: {:?}", probes);
        probes
    }
}

async fn has_elements(browser: &Browser, locator: &str) -> bool {
    matches!(browser.elements(locator).await, Ok(found) if !found.is_empty())
}

/// Whether `classify` needs [`PageProbes`] to decide about `err`
pub fn needs_page_probe(err: &NavError) -> bool {
    match err {
        NavError::Driver(e) => !explains_itself(e),
        _ => false,
    }
}

fn explains_itself(e: &DriverError) -> bool {
    matches!(
        e,
        DriverError::UnexpectedAlertOpen { .. }
            | DriverError::ErrorInResponse(_)
            | DriverError::NoSuchWindow(_)
    ) || e.is_session_dead()
        || e.to_string().contains("jQuery")
}

/// Map a failure on try number `tries` (1-based) to a recovery action
pub fn classify(err: &NavError, tries: u32, probes: &PageProbes) -> RecoveryAction {
    match err {
        NavError::Interrupted | NavError::InvalidValue(_) => RecoveryAction::Propagate,

        NavError::Badness(badness) => match badness {
            Badness::ShimMissing => RecoveryAction::InstallShimAndRetry,
            Badness::BlockerOverlay => RecoveryAction::QuitAndRetry,
            Badness::JQueryMissing(_) => RecoveryAction::KillWorkersAndRetry,
            Badness::ApplicationError(_) => RecoveryAction::QuitAndRetry,
            Badness::BackendUnavailable(_) => RecoveryAction::RestartBackendAndRetry,
        },

        NavError::CfmeExceptionOccurred(_)
        | NavError::CannotContinueWithNavigation(_)
        | NavError::BrowserClosed => RecoveryAction::QuitAndRetry,

        NavError::Driver(e) => classify_driver(e, tries, probes),

        _ => RecoveryAction::Propagate,
    }
}

fn classify_driver(e: &DriverError, tries: u32, probes: &PageProbes) -> RecoveryAction {
    match e {
        DriverError::UnexpectedAlertOpen { .. } if tries <= 1 => {
            return RecoveryAction::AcceptAlertAndRetry
        }
        DriverError::UnexpectedAlertOpen { .. }
        | DriverError::ErrorInResponse(_)
        | DriverError::NoSuchWindow(_) => return RecoveryAction::QuitAndRetry,
        _ => {}
    }
    if e.is_session_dead() {
        return RecoveryAction::QuitAndRetry;
    }
    if e.to_string().contains("jQuery") {
        return RecoveryAction::KillWorkersAndRetry;
    }

    if probes.blocker || probes.exception_div {
        RecoveryAction::QuitAndRetry
    } else if probes.proxy_error {
        RecoveryAction::RestartBackendAndRetry
    } else if let Some(title) = &probes.error_page {
        if title.contains("Service Unavailable") || title.contains("503") {
            RecoveryAction::RestartBackendAndRetry
        } else {
            RecoveryAction::QuitAndRetry
        }
    } else if probes.rails_dialog || probes.menu_glitch || probes.login_page {
        RecoveryAction::QuitAndRetry
    } else {
        RecoveryAction::Propagate
    }
}
