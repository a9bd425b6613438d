//! Browser adapter
//!
//! [`Browser`] wraps one driver session with the helpers the rest of the core
//! needs. Clicks and keyboard input run through the [`BrowserPlugin`] hooks so
//! the page is quiescent before and after every interaction.

use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use miqnav_common::{TimeoutConfig, Version};

use crate::appliance::Appliance;
use crate::driver::{DriverError, DriverResult, ElementRef, Locator, WebDriver};
use crate::error::{NavError, NavResult};
use crate::plugin::BrowserPlugin;
use crate::session::BrowserManager;
use crate::view::{ViewBase, ViewClass, ViewContext, ViewFactory, ViewRef};

/// Objects attached to a browser for views and widgets to reach
pub struct BrowserExtras {
    appliance: Weak<Appliance>,
    store: Mutex<Map<String, Value>>,
}

impl BrowserExtras {
    pub fn new(appliance: Weak<Appliance>) -> Self {
        Self {
            appliance,
            store: Mutex::new(Map::new()),
        }
    }

    pub fn appliance(&self) -> Option<Arc<Appliance>> {
        self.appliance.upgrade()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.store.lock().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.store.lock().insert(key.into(), value);
    }
}

pub struct Browser {
    driver: Arc<dyn WebDriver>,
    manager: Arc<BrowserManager>,
    plugin: Arc<dyn BrowserPlugin>,
    timeouts: TimeoutConfig,
    product_version: Version,
    extras: BrowserExtras,
    page_dirty: Mutex<Option<bool>>,
    me: Weak<Browser>,
}

impl Browser {
    pub fn new(
        driver: Arc<dyn WebDriver>,
        manager: Arc<BrowserManager>,
        plugin: Arc<dyn BrowserPlugin>,
        timeouts: TimeoutConfig,
        product_version: Version,
        extras: BrowserExtras,
    ) -> Arc<Self> {
        info!(
            "Opened browser {} (product version {})",
            driver.browser_name(),
            product_version
        );
        Arc::new_cyclic(|me| Self {
            driver,
            manager,
            plugin,
            timeouts,
            product_version,
            extras,
            page_dirty: Mutex::new(None),
            me: me.clone(),
        })
    }

    pub fn driver(&self) -> &Arc<dyn WebDriver> {
        &self.driver
    }

    pub fn plugin(&self) -> &Arc<dyn BrowserPlugin> {
        &self.plugin
    }

    pub fn timeouts(&self) -> &TimeoutConfig {
        &self.timeouts
    }

    pub fn product_version(&self) -> &Version {
        &self.product_version
    }

    pub fn browser_type(&self) -> &str {
        self.driver.browser_name()
    }

    pub fn extras(&self) -> &BrowserExtras {
        &self.extras
    }

    pub fn page_dirty(&self) -> Option<bool> {
        *self.page_dirty.lock()
    }

    pub fn set_page_dirty(&self, dirty: Option<bool>) {
        *self.page_dirty.lock() = dirty;
    }

    /// Mark the session for replacement when the driver says it died
    fn check<T>(&self, result: DriverResult<T>) -> NavResult<T> {
        result.map_err(|e| {
            if e.is_session_dead() {
                warn!("Browser session died: {}", e);
                self.manager.mark_dead();
            }
            NavError::Driver(e)
        })
    }

    pub async fn current_url(&self) -> NavResult<String> {
        self.check(self.driver.current_url().await)
    }

    pub async fn refresh(&self) -> NavResult<()> {
        debug!("Refreshing the page");
        self.check(self.driver.refresh().await)
    }

    /// Run `script` in the page; `silent` only keeps it out of the log
    pub async fn execute_script(
        &self,
        script: &str,
        args: Vec<Value>,
        silent: bool,
    ) -> NavResult<Value> {
        if !silent {
            debug!("execute_script({:?})", script);
        }
        self.check(self.driver.execute(script, args).await)
    }

    pub async fn elements(&self, locator: impl Into<Locator>) -> NavResult<Vec<ElementRef>> {
        let locator = locator.into();
        self.check(self.driver.find_elements(&locator).await)
    }

    pub async fn elements_in(
        &self,
        parent: &ElementRef,
        locator: impl Into<Locator>,
    ) -> NavResult<Vec<ElementRef>> {
        let locator = locator.into();
        self.check(self.driver.find_elements_from(parent, &locator).await)
    }

    /// First visible match, or the first match when none is visible
    pub async fn element(&self, locator: impl Into<Locator>) -> NavResult<ElementRef> {
        let locator = locator.into();
        let found = self.elements(locator.clone()).await?;
        self.pick(found, &locator).await
    }

    pub async fn element_in(
        &self,
        parent: &ElementRef,
        locator: impl Into<Locator>,
    ) -> NavResult<ElementRef> {
        let locator = locator.into();
        let found = self.elements_in(parent, locator.clone()).await?;
        self.pick(found, &locator).await
    }

    async fn pick(&self, found: Vec<ElementRef>, locator: &Locator) -> NavResult<ElementRef> {
        for element in &found {
            if self.is_element_displayed(element).await {
                return Ok(element.clone());
            }
        }
        found
            .into_iter()
            .next()
            .ok_or_else(|| NavError::Driver(DriverError::NoSuchElement(locator.to_string())))
    }

    /// Presence and visibility probe; never fails
    pub async fn is_displayed(&self, locator: impl Into<Locator>) -> bool {
        match self.elements(locator).await {
            Ok(found) => {
                for element in &found {
                    if self.is_element_displayed(element).await {
                        return true;
                    }
                }
                false
            }
            Err(_) => false,
        }
    }

    pub async fn is_element_displayed(&self, element: &ElementRef) -> bool {
        matches!(
            self.check(self.driver.is_element_displayed(element).await),
            Ok(true)
        )
    }

    pub async fn click(&self, locator: impl Into<Locator>) -> NavResult<()> {
        let element = self.element(locator).await?;
        self.click_element(&element).await
    }

    pub async fn click_element(&self, element: &ElementRef) -> NavResult<()> {
        self.plugin.before_click(self, element).await;
        let result = self.check(self.driver.click(element).await);
        if result.is_ok() {
            self.ensure_page_safe().await;
        }
        self.plugin.after_click(self, element).await;
        result
    }

    pub async fn send_keys(&self, text: &str, locator: impl Into<Locator>) -> NavResult<()> {
        let element = self.element(locator).await?;
        self.send_keys_to(&element, text).await
    }

    pub async fn send_keys_to(&self, element: &ElementRef, text: &str) -> NavResult<()> {
        self.plugin.before_keyboard_input(self, element, text).await;
        self.check(self.driver.send_keys(element, text).await)?;
        self.plugin.after_keyboard_input(self, element, text).await;
        Ok(())
    }

    pub async fn clear(&self, element: &ElementRef) -> NavResult<()> {
        self.check(self.driver.clear(element).await)
    }

    /// Replace the value of a text field; returns false when it already held `text`
    pub async fn fill(&self, element: &ElementRef, text: &str) -> NavResult<bool> {
        let current = self.element_attribute(element, "value").await?;
        if current.as_deref() == Some(text) {
            return Ok(false);
        }
        self.clear(element).await?;
        self.send_keys_to(element, text).await?;
        Ok(true)
    }

    pub async fn text(&self, locator: impl Into<Locator>) -> NavResult<String> {
        let element = self.element(locator).await?;
        self.element_text(&element).await
    }

    pub async fn element_text(&self, element: &ElementRef) -> NavResult<String> {
        Ok(self
            .check(self.driver.element_text(element).await)?
            .trim()
            .to_string())
    }

    pub async fn get_attribute(
        &self,
        name: &str,
        locator: impl Into<Locator>,
    ) -> NavResult<Option<String>> {
        let element = self.element(locator).await?;
        self.element_attribute(&element, name).await
    }

    pub async fn element_attribute(
        &self,
        element: &ElementRef,
        name: &str,
    ) -> NavResult<Option<String>> {
        self.check(self.driver.element_attribute(element, name).await)
    }

    /// Text of the open alert without handling it; `None` when there is none
    pub async fn get_alert(&self) -> Option<String> {
        self.driver.alert_text().await.ok().flatten()
    }

    pub async fn alert_present(&self) -> bool {
        self.get_alert().await.is_some()
    }

    /// Accept (or with `cancel`, dismiss) the next alert
    ///
    /// Waits up to `wait` for one to show up; `Duration::ZERO` checks once.
    /// Returns whether an alert was accepted, and its text.
    pub async fn handle_alert(
        &self,
        wait: Duration,
        cancel: bool,
        prompt: Option<&str>,
    ) -> NavResult<(bool, Option<String>)> {
        let start = Instant::now();
        let text = loop {
            if let Some(text) = self.get_alert().await {
                break text;
            }
            if start.elapsed() >= wait {
                return Ok((false, None));
            }
            sleep(Duration::from_millis(200)).await;
        };

        if let Some(prompt) = prompt {
            self.check(self.driver.send_alert_text(prompt).await)?;
        }
        if cancel {
            debug!("Dismissing alert {:?}", text);
            self.check(self.driver.dismiss_alert().await)?;
        } else {
            debug!("Accepting alert {:?}", text);
            self.check(self.driver.accept_alert().await)?;
        }
        Ok((!cancel, Some(text)))
    }

    /// Dismiss every open alert
    pub async fn dismiss_any_alerts(&self) {
        for _ in 0..10 {
            match self.get_alert().await {
                Some(text) => {
                    debug!("Dismissing stray alert {:?}", text);
                    if self.driver.dismiss_alert().await.is_err() {
                        break;
                    }
                }
                None => break,
            }
        }
    }

    pub async fn ensure_page_safe(&self) {
        self.plugin
            .ensure_page_safe(self, self.timeouts.ensure_safe())
            .await
    }

    /// Build a view bound to this browser; nothing touches the page
    pub fn create_view<V: ViewClass>(&self, context: ViewContext) -> V {
        V::new(ViewBase::new(self.me.clone(), context))
    }

    pub fn create_view_from(&self, factory: ViewFactory, context: ViewContext) -> ViewRef {
        factory(ViewBase::new(self.me.clone(), context))
    }
}
