//! Page-safety plugins
//!
//! The web UI does not announce when it is ready. A plugin decides when the
//! page is quiet enough to act on and runs hooks around every click and
//! keystroke the [`Browser`] performs.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use miqnav_common::{wait_for, WaitOptions};

use crate::browser::Browser;
use crate::driver::ElementRef;

const POLL_DELAY: Duration = Duration::from_millis(200);

#[async_trait]
pub trait BrowserPlugin: Send + Sync {
    /// Block until the page is quiet or `timeout` elapses; never fails
    async fn ensure_page_safe(&self, browser: &Browser, timeout: Duration);

    async fn before_click(&self, _browser: &Browser, _element: &ElementRef) {}

    async fn after_click(&self, _browser: &Browser, _element: &ElementRef) {}

    async fn before_keyboard_input(&self, _browser: &Browser, _element: &ElementRef, _text: &str) {}

    async fn after_keyboard_input(&self, _browser: &Browser, _element: &ElementRef, _text: &str) {}
}

const READY_STATE_JS: &str = r#"return document.readyState == "complete";"#;

/// Waits for `document.readyState` only
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPlugin;

#[async_trait]
impl BrowserPlugin for DefaultPlugin {
    async fn ensure_page_safe(&self, browser: &Browser, timeout: Duration) {
        let options = WaitOptions::new("document ready", timeout)
            .delay(POLL_DELAY)
            .silent();
        let _ = wait_for(&options, || async move {
            matches!(
                browser.execute_script(READY_STATE_JS, vec![], true).await,
                Ok(Value::Bool(true))
            )
        })
        .await;
    }
}

/// One independent quiescence check; the script returns `true` when quiet
#[derive(Debug, Clone, Copy)]
pub struct SafetyProbe {
    pub name: &'static str,
    pub script: &'static str,
}

pub const SAFETY_PROBES: [SafetyProbe; 4] = [
    SafetyProbe {
        name: "spinner",
        script: r#"
            function isHidden(el) { if (el === null) return true; return el.offsetParent === null; }
            return isHidden(document.getElementById("spinner_div"))
                || !isHidden(document.getElementById("lightbox_div"));
        "#,
    },
    SafetyProbe {
        name: "in_flight",
        script: r#"
            try {
                return !ManageIQ.qe.anythingInFlight();
            } catch (err) {
                return ((typeof $ === "undefined") ? true : $.active < 1)
                    && ((typeof checkMiqQE === "undefined") ? true : checkMiqQE('autofocus') < 1)
                    && ((typeof checkMiqQE === "undefined") ? true : checkMiqQE('debounce') < 1)
                    && ((typeof checkAllMiqQE === "undefined") ? true : checkAllMiqQE() < 1);
            }
        "#,
    },
    SafetyProbe {
        name: "data_loading",
        script: r#"
            try { return !window.ManageIQ.gtl.loading; } catch (err) { return true; }
        "#,
    },
    SafetyProbe {
        name: "ready_state",
        script: READY_STATE_JS,
    },
];

/// Clears event notifications that cover the page and hides the error modal
const HOUSEKEEPING_JS: &str = r#"
    try {
        var notifications = angular.element('#notification-app').injector().get('eventNotifications');
        notifications.clearAll(ManageIQ.angular.eventNotificationsData.state.groups[0]);
        notifications.clearAll(ManageIQ.angular.eventNotificationsData.state.groups[1]);
    } catch (err) {}
    try { angular.element('error-modal').hide(); } catch (err) {}
"#;

const PAGE_HAS_CHANGES_JS: &str = r##"
    function PageHasChanges() {
        try {
            if (ManageIQ.angular.scope) {
                if (angular.isDefined(ManageIQ.angular.scope.angularForm)
                    && ManageIQ.angular.scope.angularForm.$dirty
                    && !miqDomElementExists("ignore_form_changes"))
                    return true;
            } else {
                if ((miqDomElementExists("buttons_on") && $("#buttons_on").is(":visible")
                    || null !== ManageIQ.changes)
                    && !miqDomElementExists("ignore_form_changes"))
                    return true;
            }
            return false;
        } catch (err) {
            return false;
        }
    };
    return PageHasChanges();
"##;

pub const OBSERVED_FIELD_MARKERS: [&str; 3] = [
    "data-miq_observe",
    "data-miq_observe_date",
    "data-miq_observe_checkbox",
];

pub const ABANDON_CHANGES: &str = "Abandon changes?";

/// Plugin for the ManageIQ admin UI
#[derive(Debug, Default, Clone, Copy)]
pub struct MiqBrowserPlugin;

impl MiqBrowserPlugin {
    /// Run every probe, stopping at the first one that reports activity
    pub async fn is_page_safe(&self, browser: &Browser) -> bool {
        if let Err(e) = browser.execute_script(HOUSEKEEPING_JS, vec![], true).await {
            debug!("Page housekeeping failed: {}", e);
        }
        for probe in SAFETY_PROBES.iter() {
            if !Self::run_probe(browser, probe).await {
                return false;
            }
        }
        true
    }

    /// Every probe with its result, for diagnostics
    pub async fn probe_report(&self, browser: &Browser) -> Vec<(&'static str, bool)> {
        let mut report = Vec::with_capacity(SAFETY_PROBES.len());
        for probe in SAFETY_PROBES.iter() {
            report.push((probe.name, Self::run_probe(browser, probe).await));
        }
        report
    }

    async fn run_probe(browser: &Browser, probe: &SafetyProbe) -> bool {
        matches!(
            browser.execute_script(probe.script, vec![], true).await,
            Ok(Value::Bool(true))
        )
    }

    /// Whether a form on the page holds unsaved changes
    pub async fn page_has_changes(&self, browser: &Browser) -> Option<bool> {
        match browser.execute_script(PAGE_HAS_CHANGES_JS, vec![], true).await {
            Ok(Value::Bool(dirty)) => Some(dirty),
            _ => None,
        }
    }

    /// Firefox loses document focus after alerts; a throwaway window brings it back
    pub async fn make_document_focused(&self, browser: &Browser) {
        if browser.browser_type() != "firefox" {
            return;
        }
        if let Ok(Value::Bool(true)) = browser
            .execute_script("return document.hasFocus()", vec![], true)
            .await
        {
            return;
        }

        debug!("Fixing firefox focus by opening and closing a new window");
        let driver = browser.driver();
        let result = async {
            let original = driver.window_handle().await?;
            let scratch = driver.new_window().await?;
            driver.switch_to_window(&scratch).await?;
            driver.close_window().await?;
            driver.switch_to_window(&original).await
        }
        .await;
        if let Err(e) = result {
            debug!("Could not refocus the document: {}", e);
        }
    }
}

/// `interval` of an observed-field marker, never below `default`
pub fn observed_field_interval(raw: &str, default: Duration) -> Duration {
    let parsed = serde_json::from_str::<Value>(raw).ok().and_then(|v| match v.get("interval") {
        None => Some(default.as_secs_f64()),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    });

    match parsed {
        Some(secs) => match Duration::try_from_secs_f64(secs) {
            Ok(interval) => interval.max(default),
            Err(e) => {
                warn!("observed field interval {} out of range: {}", secs, e);
                default
            }
        },
        None => {
            warn!("could not parse observed field marker {:?}", raw);
            default
        }
    }
}

#[async_trait]
impl BrowserPlugin for MiqBrowserPlugin {
    async fn ensure_page_safe(&self, browser: &Browser, timeout: Duration) {
        if browser.page_dirty() == Some(true)
            && browser.get_alert().await.as_deref() == Some(ABANDON_CHANGES)
        {
            debug!("Accepting {:?} alert on a dirty page", ABANDON_CHANGES);
            if let Err(e) = browser.handle_alert(Duration::ZERO, false, None).await {
                debug!("Could not accept {:?}: {}", ABANDON_CHANGES, e);
            }
        }

        let options = WaitOptions::new("page safe", timeout)
            .delay(POLL_DELAY)
            .silent();
        let _ = wait_for(&options, || self.is_page_safe(browser)).await;
    }

    async fn before_click(&self, browser: &Browser, _element: &ElementRef) {
        let dirty = self.page_has_changes(browser).await;
        browser.set_page_dirty(dirty);
    }

    async fn after_click(&self, browser: &Browser, _element: &ElementRef) {
        browser.set_page_dirty(None);
    }

    async fn before_keyboard_input(&self, browser: &Browser, _element: &ElementRef, _text: &str) {
        sleep(browser.timeouts().keyboard_debounce()).await;
        self.make_document_focused(browser).await;
    }

    async fn after_keyboard_input(&self, browser: &Browser, element: &ElementRef, _text: &str) {
        let mut marker = None;
        for attr in OBSERVED_FIELD_MARKERS {
            if let Ok(Some(value)) = browser.element_attribute(element, attr).await {
                marker = Some(value);
                break;
            }
        }
        let Some(raw) = marker else {
            return;
        };

        let interval = observed_field_interval(&raw, browser.timeouts().observed_field());
        debug!(
            "observed field detected, pausing for {:.1} seconds",
            interval.as_secs_f64()
        );
        sleep(interval).await;
        self.ensure_page_safe(browser, browser.timeouts().ensure_safe())
            .await;
        self.make_document_focused(browser).await;
    }
}
