//! Widgets used by the built-in views

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use crate::browser::Browser;
use crate::driver::{DriverError, ElementRef, Locator};
use crate::error::{NavError, NavResult};
use crate::view::ViewBase;

#[async_trait]
pub trait Widget: Send + Sync {
    fn locator(&self) -> &Locator;

    /// Never fails; a missing element is simply not displayed
    async fn is_displayed(&self) -> bool;

    async fn read(&self) -> NavResult<Value>;

    /// Returns whether anything changed
    async fn fill(&self, _value: &Value) -> NavResult<bool> {
        Err(NavError::InvalidValue(format!(
            "widget {} cannot be filled",
            self.locator()
        )))
    }

    fn flush(&self);
}

/// Lookup and cache shared by every widget
struct WidgetCore {
    base: ViewBase,
    locator: Locator,
    cached: Mutex<Option<ElementRef>>,
}

impl WidgetCore {
    fn new(base: &ViewBase, locator: Locator) -> Self {
        Self {
            base: base.clone(),
            locator,
            cached: Mutex::new(None),
        }
    }

    async fn lookup(&self, browser: &Browser) -> NavResult<ElementRef> {
        let cached = self.cached.lock().clone();
        if let Some(element) = cached {
            return Ok(element);
        }
        let element = match self.base.root() {
            Some(root) => {
                let parent = browser.element(root).await?;
                browser.element_in(&parent, &self.locator).await?
            }
            None => browser.element(&self.locator).await?,
        };
        *self.cached.lock() = Some(element.clone());
        Ok(element)
    }

    /// Run `op` on the element, looking it up again once if it went stale
    async fn with_element<T, F, Fut>(&self, op: F) -> NavResult<T>
    where
        F: Fn(Arc<Browser>, ElementRef) -> Fut,
        Fut: Future<Output = NavResult<T>>,
    {
        let browser = self.base.browser()?;
        let element = self.lookup(&browser).await?;
        match op(browser.clone(), element).await {
            Err(NavError::Driver(DriverError::StaleElementReference(_))) => {
                self.flush();
                let element = self.lookup(&browser).await?;
                op(browser, element).await
            }
            other => other,
        }
    }

    async fn is_displayed(&self) -> bool {
        let browser = match self.base.browser() {
            Ok(browser) => browser,
            Err(_) => return false,
        };
        match self.lookup(&browser).await {
            Ok(element) => {
                if browser.is_element_displayed(&element).await {
                    return true;
                }
                // a cached element may have been replaced by a visible twin
                self.flush();
                match self.lookup(&browser).await {
                    Ok(element) => browser.is_element_displayed(&element).await,
                    Err(_) => false,
                }
            }
            Err(_) => false,
        }
    }

    async fn text(&self) -> NavResult<String> {
        self.with_element(|browser, element| async move { browser.element_text(&element).await })
            .await
    }

    async fn click(&self) -> NavResult<()> {
        self.with_element(|browser, element| async move { browser.click_element(&element).await })
            .await
    }

    fn flush(&self) {
        self.cached.lock().take();
    }
}

fn quote(text: &str) -> String {
    if text.contains('\'') {
        format!("\"{}\"", text)
    } else {
        format!("'{}'", text)
    }
}

/// Read-only text, clickable
pub struct Text {
    core: WidgetCore,
}

impl Text {
    pub fn new(base: &ViewBase, locator: &str) -> Self {
        Self {
            core: WidgetCore::new(base, base.locator(locator)),
        }
    }

    pub async fn text(&self) -> NavResult<String> {
        self.core.text().await
    }

    pub async fn click(&self) -> NavResult<()> {
        self.core.click().await
    }
}

#[async_trait]
impl Widget for Text {
    fn locator(&self) -> &Locator {
        &self.core.locator
    }

    async fn is_displayed(&self) -> bool {
        self.core.is_displayed().await
    }

    async fn read(&self) -> NavResult<Value> {
        Ok(Value::String(self.text().await?))
    }

    fn flush(&self) {
        self.core.flush()
    }
}

/// Text input
pub struct Input {
    core: WidgetCore,
}

impl Input {
    pub fn new(base: &ViewBase, locator: &str) -> Self {
        Self {
            core: WidgetCore::new(base, base.locator(locator)),
        }
    }

    /// Input addressed by its `name` attribute
    pub fn by_name(base: &ViewBase, name: &str) -> Self {
        Self {
            core: WidgetCore::new(base, Locator::xpath(format!(".//input[@name={}]", quote(name)))),
        }
    }

    pub async fn value(&self) -> NavResult<String> {
        self.core
            .with_element(|browser, element| async move {
                Ok(browser
                    .element_attribute(&element, "value")
                    .await?
                    .unwrap_or_default())
            })
            .await
    }

    pub async fn fill_text(&self, text: &str) -> NavResult<bool> {
        self.core
            .with_element(|browser, element| async move { browser.fill(&element, text).await })
            .await
    }
}

#[async_trait]
impl Widget for Input {
    fn locator(&self) -> &Locator {
        &self.core.locator
    }

    async fn is_displayed(&self) -> bool {
        self.core.is_displayed().await
    }

    async fn read(&self) -> NavResult<Value> {
        Ok(Value::String(self.value().await?))
    }

    async fn fill(&self, value: &Value) -> NavResult<bool> {
        match value {
            Value::String(text) => self.fill_text(text).await,
            Value::Null => Ok(false),
            other => self.fill_text(&other.to_string()).await,
        }
    }

    fn flush(&self) {
        self.core.flush()
    }
}

/// Button or link addressed by its text, title or value
pub struct Button {
    core: WidgetCore,
}

impl Button {
    pub fn new(base: &ViewBase, text: &str) -> Self {
        Self {
            core: WidgetCore::new(base, Locator::xpath(Self::xpath_for(text))),
        }
    }

    pub fn xpath_for(text: &str) -> String {
        let q = quote(text);
        format!(
            ".//*[(self::a or self::button or (self::input and (@type='button' or @type='submit'))) \
             and (normalize-space(.)={q} or @title={q} or @value={q} or @alt={q})]"
        )
    }

    pub async fn click(&self) -> NavResult<()> {
        self.core.click().await
    }

    pub async fn is_enabled(&self) -> NavResult<bool> {
        self.core
            .with_element(|browser, element| async move {
                let class = browser
                    .element_attribute(&element, "class")
                    .await?
                    .unwrap_or_default();
                let disabled = browser.element_attribute(&element, "disabled").await?;
                Ok(disabled.is_none() && !class.split_whitespace().any(|c| c == "disabled"))
            })
            .await
    }
}

#[async_trait]
impl Widget for Button {
    fn locator(&self) -> &Locator {
        &self.core.locator
    }

    async fn is_displayed(&self) -> bool {
        self.core.is_displayed().await
    }

    async fn read(&self) -> NavResult<Value> {
        Ok(Value::String(self.core.text().await?))
    }

    fn flush(&self) {
        self.core.flush()
    }
}

const CHECKED_JS: &str = "return arguments[0].checked;";

pub struct Checkbox {
    core: WidgetCore,
}

impl Checkbox {
    pub fn new(base: &ViewBase, locator: &str) -> Self {
        Self {
            core: WidgetCore::new(base, base.locator(locator)),
        }
    }

    pub fn by_name(base: &ViewBase, name: &str) -> Self {
        Self {
            core: WidgetCore::new(
                base,
                Locator::xpath(format!(".//input[@type='checkbox' and @name={}]", quote(name))),
            ),
        }
    }

    pub async fn is_checked(&self) -> NavResult<bool> {
        self.core
            .with_element(|browser, element| async move {
                let value = browser
                    .execute_script(CHECKED_JS, vec![element.to_json()], true)
                    .await?;
                Ok(value.as_bool().unwrap_or(false))
            })
            .await
    }

    pub async fn set(&self, checked: bool) -> NavResult<bool> {
        if self.is_checked().await? == checked {
            return Ok(false);
        }
        self.core.click().await?;
        Ok(true)
    }
}

#[async_trait]
impl Widget for Checkbox {
    fn locator(&self) -> &Locator {
        &self.core.locator
    }

    async fn is_displayed(&self) -> bool {
        self.core.is_displayed().await
    }

    async fn read(&self) -> NavResult<Value> {
        Ok(Value::Bool(self.is_checked().await?))
    }

    async fn fill(&self, value: &Value) -> NavResult<bool> {
        match value {
            Value::Bool(checked) => self.set(*checked).await,
            Value::Null => Ok(false),
            other => Err(NavError::InvalidValue(format!(
                "checkbox takes a bool, got {}",
                other
            ))),
        }
    }

    fn flush(&self) {
        self.core.flush()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Info,
    Warning,
    Error,
}

impl FlashLevel {
    fn from_class(class: &str) -> Self {
        let classes: Vec<&str> = class.split_whitespace().collect();
        if classes.iter().any(|c| *c == "alert-danger" || *c == "alert-error") {
            FlashLevel::Error
        } else if classes.contains(&"alert-warning") {
            FlashLevel::Warning
        } else if classes.contains(&"alert-success") {
            FlashLevel::Success
        } else {
            FlashLevel::Info
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FlashMessage {
    pub text: String,
    pub level: FlashLevel,
}

/// Flash message area
pub struct FlashMessages {
    core: WidgetCore,
}

impl FlashMessages {
    const MESSAGE: &'static str = ".//div[contains(@class, 'alert')]";

    pub fn new(base: &ViewBase, locator: &str) -> Self {
        Self {
            core: WidgetCore::new(base, base.locator(locator)),
        }
    }

    pub async fn messages(&self) -> NavResult<Vec<FlashMessage>> {
        self.core
            .with_element(|browser, area| async move {
                let mut messages = Vec::new();
                for element in browser.elements_in(&area, Self::MESSAGE).await? {
                    if !browser.is_element_displayed(&element).await {
                        continue;
                    }
                    let class = browser
                        .element_attribute(&element, "class")
                        .await?
                        .unwrap_or_default();
                    messages.push(FlashMessage {
                        text: browser.element_text(&element).await?,
                        level: FlashLevel::from_class(&class),
                    });
                }
                Ok(messages)
            })
            .await
    }

    /// Fail with the first error message shown
    pub async fn assert_no_error(&self) -> NavResult<()> {
        if !self.is_displayed().await {
            return Ok(());
        }
        match self
            .messages()
            .await?
            .into_iter()
            .find(|m| m.level == FlashLevel::Error)
        {
            Some(message) => Err(NavError::FlashError(message.text)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Widget for FlashMessages {
    fn locator(&self) -> &Locator {
        &self.core.locator
    }

    async fn is_displayed(&self) -> bool {
        self.core.is_displayed().await
    }

    async fn read(&self) -> NavResult<Value> {
        Ok(serde_json::to_value(self.messages().await?).unwrap_or(Value::Null))
    }

    fn flush(&self) {
        self.core.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("alert alert-danger", FlashLevel::Error ; "danger")]
    #[test_case("alert alert-warning", FlashLevel::Warning ; "warning")]
    #[test_case("alert alert-success", FlashLevel::Success ; "success")]
    #[test_case("alert", FlashLevel::Info ; "plain")]
    fn test_flash_level(class: &str, level: FlashLevel) {
        assert_eq!(FlashLevel::from_class(class), level);
    }

    #[test]
    fn test_quote_picks_safe_delimiter() {
        assert_eq!(quote("Login"), "'Login'");
        assert_eq!(quote("Don't"), "\"Don't\"");
    }
}
