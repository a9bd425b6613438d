//! WebDriver sessions on top of fantoccini
//!
//! Talks to geckodriver, chromedriver or a Selenium grid.

use async_trait::async_trait;
use fantoccini::elements::{Element, ElementRef as RemoteElementRef};
use fantoccini::error::{CmdError, NewSessionError};
use fantoccini::wd::WindowHandle;
use fantoccini::{Client, ClientBuilder};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use miqnav_common::BrowserConfig;

use crate::driver::{DriverError, DriverFactory, DriverResult, ElementRef, Locator, WebDriver};

impl From<CmdError> for DriverError {
    fn from(err: CmdError) -> Self {
        match err {
            CmdError::Standard(wd) => {
                DriverError::from_w3c(&wd.error.to_string(), &wd.message, wd.data.as_ref())
            }
            CmdError::Lost(e) => DriverError::Transport {
                message: e.to_string(),
                lost: true,
            },
            CmdError::Failed(e) => DriverError::Transport {
                lost: e.is_connect(),
                message: e.to_string(),
            },
            other => DriverError::ErrorInResponse(other.to_string()),
        }
    }
}

impl From<NewSessionError> for DriverError {
    fn from(err: NewSessionError) -> Self {
        DriverError::SessionNotCreated(err.to_string())
    }
}

fn fantoccini_locator(locator: &Locator) -> fantoccini::Locator<'_> {
    match locator {
        Locator::Css(s) => fantoccini::Locator::Css(s),
        Locator::XPath(s) => fantoccini::Locator::XPath(s),
    }
}

fn window_handle(handle: &str) -> DriverResult<WindowHandle> {
    WindowHandle::try_from(handle.to_string())
        .map_err(|e| DriverError::NoSuchWindow(format!("{}: {}", handle, e)))
}

/// Starts sessions on a remote WebDriver endpoint
pub struct RemoteDriverFactory {
    endpoint: String,
    browser_name: String,
    headless: bool,
}

impl RemoteDriverFactory {
    pub fn new(config: &BrowserConfig) -> DriverResult<Self> {
        Ok(Self {
            endpoint: config.webdriver_url.trim_end_matches('/').to_string(),
            browser_name: config.browser_name.to_lowercase(),
            headless: config.headless,
        })
    }

    fn capabilities(&self) -> Map<String, Value> {
        let mut caps = Map::new();
        caps.insert("browserName".to_string(), json!(self.browser_name));
        if self.headless {
            match self.browser_name.as_str() {
                "firefox" => {
                    caps.insert("moz:firefoxOptions".to_string(), json!({ "args": ["-headless"] }));
                }
                "chrome" | "chromium" => {
                    caps.insert(
                        "goog:chromeOptions".to_string(),
                        json!({ "args": ["--headless=new"] }),
                    );
                }
                other => debug!("No headless switch known for {}", other),
            }
        }
        // Open alerts fail commands instead of being auto-handled
        caps.insert("unhandledPromptBehavior".to_string(), json!("ignore"));
        caps
    }
}

#[async_trait]
impl DriverFactory for RemoteDriverFactory {
    async fn start(&self, url: &str) -> DriverResult<Arc<dyn WebDriver>> {
        info!("Starting {} session on {}", self.browser_name, self.endpoint);

        let client = ClientBuilder::native()
            .capabilities(self.capabilities())
            .connect(&self.endpoint)
            .await?;
        let session_id = client.session_id().await?.unwrap_or_default();

        let driver = RemoteWebDriver {
            client,
            session_id,
            browser_name: self.browser_name.clone(),
        };
        driver.goto(url).await?;
        info!("Session {} ready at {}", driver.session_id, url);

        Ok(Arc::new(driver))
    }
}

/// One remote WebDriver session
pub struct RemoteWebDriver {
    client: Client,
    session_id: String,
    browser_name: String,
}

impl RemoteWebDriver {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn element(&self, element: &ElementRef) -> Element {
        Element::from_element_id(
            self.client.clone(),
            RemoteElementRef::from(element.id().to_string()),
        )
    }

    fn refs(elements: Vec<Element>) -> Vec<ElementRef> {
        elements
            .into_iter()
            .map(|e| ElementRef(e.element_id().to_string()))
            .collect()
    }
}

#[async_trait]
impl WebDriver for RemoteWebDriver {
    fn browser_name(&self) -> &str {
        &self.browser_name
    }

    async fn goto(&self, url: &str) -> DriverResult<()> {
        Ok(self.client.goto(url).await?)
    }

    async fn current_url(&self) -> DriverResult<String> {
        Ok(self.client.current_url().await?.to_string())
    }

    async fn refresh(&self) -> DriverResult<()> {
        Ok(self.client.refresh().await?)
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> DriverResult<Value> {
        Ok(self.client.execute(script, args).await?)
    }

    async fn find_elements(&self, locator: &Locator) -> DriverResult<Vec<ElementRef>> {
        let found = self.client.find_all(fantoccini_locator(locator)).await?;
        Ok(Self::refs(found))
    }

    async fn find_elements_from(
        &self,
        parent: &ElementRef,
        locator: &Locator,
    ) -> DriverResult<Vec<ElementRef>> {
        let locator = locator.relative();
        let found = self
            .element(parent)
            .find_all(fantoccini_locator(&locator))
            .await?;
        Ok(Self::refs(found))
    }

    async fn is_element_displayed(&self, element: &ElementRef) -> DriverResult<bool> {
        Ok(self.element(element).is_displayed().await?)
    }

    async fn click(&self, element: &ElementRef) -> DriverResult<()> {
        Ok(self.element(element).click().await?)
    }

    async fn clear(&self, element: &ElementRef) -> DriverResult<()> {
        Ok(self.element(element).clear().await?)
    }

    async fn send_keys(&self, element: &ElementRef, text: &str) -> DriverResult<()> {
        Ok(self.element(element).send_keys(text).await?)
    }

    async fn element_text(&self, element: &ElementRef) -> DriverResult<String> {
        Ok(self.element(element).text().await?)
    }

    async fn element_attribute(
        &self,
        element: &ElementRef,
        name: &str,
    ) -> DriverResult<Option<String>> {
        Ok(self.element(element).attr(name).await?)
    }

    async fn alert_text(&self) -> DriverResult<Option<String>> {
        match self.client.get_alert_text().await.map_err(DriverError::from) {
            Ok(text) => Ok(Some(text)),
            Err(DriverError::NoSuchAlert) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn accept_alert(&self) -> DriverResult<()> {
        Ok(self.client.accept_alert().await?)
    }

    async fn dismiss_alert(&self) -> DriverResult<()> {
        Ok(self.client.dismiss_alert().await?)
    }

    async fn send_alert_text(&self, text: &str) -> DriverResult<()> {
        Ok(self.client.send_alert_text(text).await?)
    }

    async fn window_handle(&self) -> DriverResult<String> {
        Ok(self.client.window().await?.into())
    }

    async fn window_handles(&self) -> DriverResult<Vec<String>> {
        let handles = self.client.windows().await?;
        Ok(handles.into_iter().map(String::from).collect())
    }

    async fn switch_to_window(&self, handle: &str) -> DriverResult<()> {
        Ok(self.client.switch_to_window(window_handle(handle)?).await?)
    }

    async fn new_window(&self) -> DriverResult<String> {
        let created = self.client.new_window(false).await?;
        Ok(created.handle.into())
    }

    async fn close_window(&self) -> DriverResult<()> {
        Ok(self.client.close_window().await?)
    }

    async fn quit(&self) -> DriverResult<()> {
        debug!("Deleting session {}", self.session_id);
        match self.client.clone().close().await.map_err(DriverError::from) {
            Ok(()) => Ok(()),
            Err(e) if e.is_session_dead() => Ok(()),
            Err(e) => {
                warn!("Failed to delete session {}: {}", self.session_id, e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_firefox_capabilities() {
        let factory = RemoteDriverFactory::new(&BrowserConfig::default()).unwrap();
        let caps = factory.capabilities();
        assert_eq!(caps.get("browserName"), Some(&json!("firefox")));
        assert_eq!(
            caps.get("moz:firefoxOptions").and_then(|o| o.pointer("/args/0")),
            Some(&json!("-headless"))
        );
        assert_eq!(caps.get("unhandledPromptBehavior"), Some(&json!("ignore")));
    }

    #[test]
    fn test_headed_chrome_has_no_args() {
        let config = BrowserConfig {
            browser_name: "Chrome".to_string(),
            headless: false,
            ..BrowserConfig::default()
        };
        let factory = RemoteDriverFactory::new(&config).unwrap();
        let caps = factory.capabilities();
        assert_eq!(caps.get("browserName"), Some(&json!("chrome")));
        assert!(caps.get("goog:chromeOptions").is_none());
    }

    #[test]
    fn test_locator_strategies_carry_over() {
        let css = Locator::css("#main");
        let xpath = Locator::xpath("//div");
        assert!(matches!(fantoccini_locator(&css), fantoccini::Locator::Css("#main")));
        assert!(matches!(fantoccini_locator(&xpath), fantoccini::Locator::XPath("//div")));
    }

    #[test]
    fn test_lost_connection_kills_the_session() {
        let lost = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = DriverError::from(CmdError::Lost(lost));
        assert!(err.is_session_dead());
        assert!(!DriverError::from(CmdError::NotJson("<html>".to_string())).is_session_dead());
    }
}
