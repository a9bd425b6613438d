//! Driver abstraction
//!
//! The rest of the core talks to a browser only through [`WebDriver`]. The
//! production implementation speaks the W3C WebDriver wire protocol (see
//! [`crate::webdriver`]); tests plug in an in-memory fake.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub type DriverResult<T> = Result<T, DriverError>;

/// Element locator
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    /// Guess the strategy the way page objects write locators:
    /// anything that looks like a path expression is XPath, the rest is CSS.
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim_start();
        if trimmed.starts_with('/') || trimmed.starts_with("./") || trimmed.starts_with('(') {
            Locator::XPath(s.to_string())
        } else {
            Locator::Css(s.to_string())
        }
    }

    pub fn css(s: impl Into<String>) -> Self {
        Locator::Css(s.into())
    }

    pub fn xpath(s: impl Into<String>) -> Self {
        Locator::XPath(s.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Locator::Css(s) | Locator::XPath(s) => s,
        }
    }

    /// W3C `using` value
    pub fn strategy(&self) -> &'static str {
        match self {
            Locator::Css(_) => "css selector",
            Locator::XPath(_) => "xpath",
        }
    }

    /// Make an absolute XPath relative so it can be searched under another element
    pub fn relative(&self) -> Self {
        match self {
            Locator::XPath(s) if s.starts_with('/') => Locator::XPath(format!(".{}", s)),
            other => other.clone(),
        }
    }
}

impl From<&str> for Locator {
    fn from(s: &str) -> Self {
        Locator::parse(s)
    }
}

impl From<String> for Locator {
    fn from(s: String) -> Self {
        Locator::parse(&s)
    }
}

impl From<&Locator> for Locator {
    fn from(l: &Locator) -> Self {
        l.clone()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// W3C web element identifier key
pub const ELEMENT_KEY: &str = "element-6066-11e4-a4f6-4a4d4a4d4a4d";

/// Opaque reference to an element in the current page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

impl ElementRef {
    pub fn id(&self) -> &str {
        &self.0
    }

    /// Script argument form of the reference
    pub fn to_json(&self) -> Value {
        serde_json::json!({ (ELEMENT_KEY): self.0 })
    }
}

/// Driver-level failures, named after the W3C error codes
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("no such element: {0}")]
    NoSuchElement(String),

    #[error("stale element reference: {0}")]
    StaleElementReference(String),

    #[error("invalid element state: {0}")]
    InvalidElementState(String),

    #[error("element not interactable: {0}")]
    ElementNotInteractable(String),

    #[error("unexpected alert open: {text:?}")]
    UnexpectedAlertOpen { text: Option<String> },

    #[error("no such alert")]
    NoSuchAlert,

    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("no such window: {0}")]
    NoSuchWindow(String),

    #[error("javascript error: {0}")]
    JavaScript(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("session not created: {0}")]
    SessionNotCreated(String),

    #[error("malformed response: {0}")]
    ErrorInResponse(String),

    #[error("WebDriver connection failed: {message}")]
    Transport { message: String, lost: bool },

    #[error("{error}: {message}")]
    Unknown { error: String, message: String },
}

impl DriverError {
    /// Map a W3C error code and message
    pub fn from_w3c(error: &str, message: &str, data: Option<&Value>) -> Self {
        let message = message.to_string();
        match error {
            "no such element" => DriverError::NoSuchElement(message),
            "stale element reference" => DriverError::StaleElementReference(message),
            "invalid element state" => DriverError::InvalidElementState(message),
            "element not interactable" | "element click intercepted" => {
                DriverError::ElementNotInteractable(message)
            }
            "unexpected alert open" => DriverError::UnexpectedAlertOpen {
                text: data
                    .and_then(|d| d.get("text"))
                    .and_then(|t| t.as_str())
                    .map(String::from),
            },
            "no such alert" => DriverError::NoSuchAlert,
            "invalid session id" => DriverError::InvalidSessionId(message),
            "no such window" | "no such frame" => DriverError::NoSuchWindow(message),
            "javascript error" => DriverError::JavaScript(message),
            "timeout" | "script timeout" => DriverError::Timeout(message),
            "session not created" => DriverError::SessionNotCreated(message),
            other => DriverError::Unknown {
                error: other.to_string(),
                message,
            },
        }
    }

    /// The session cannot be used any more and must be replaced
    pub fn is_session_dead(&self) -> bool {
        match self {
            DriverError::InvalidSessionId(_) | DriverError::SessionNotCreated(_) => true,
            DriverError::Transport { lost, .. } => *lost,
            DriverError::Unknown { message, .. } => {
                message.contains("Browsing context has been discarded")
                    || message.contains("chrome not reachable")
            }
            _ => false,
        }
    }
}

/// One live browser session
#[async_trait]
pub trait WebDriver: Send + Sync {
    /// `browserName` of the session, lower case
    fn browser_name(&self) -> &str;

    async fn goto(&self, url: &str) -> DriverResult<()>;

    async fn current_url(&self) -> DriverResult<String>;

    async fn refresh(&self) -> DriverResult<()>;

    /// Run a synchronous script body; `return` yields the value
    async fn execute(&self, script: &str, args: Vec<Value>) -> DriverResult<Value>;

    async fn find_elements(&self, locator: &Locator) -> DriverResult<Vec<ElementRef>>;

    async fn find_elements_from(
        &self,
        parent: &ElementRef,
        locator: &Locator,
    ) -> DriverResult<Vec<ElementRef>>;

    async fn is_element_displayed(&self, element: &ElementRef) -> DriverResult<bool>;

    async fn click(&self, element: &ElementRef) -> DriverResult<()>;

    async fn clear(&self, element: &ElementRef) -> DriverResult<()>;

    async fn send_keys(&self, element: &ElementRef, text: &str) -> DriverResult<()>;

    async fn element_text(&self, element: &ElementRef) -> DriverResult<String>;

    async fn element_attribute(
        &self,
        element: &ElementRef,
        name: &str,
    ) -> DriverResult<Option<String>>;

    /// Text of the open alert, `None` when there is no alert
    async fn alert_text(&self) -> DriverResult<Option<String>>;

    async fn accept_alert(&self) -> DriverResult<()>;

    async fn dismiss_alert(&self) -> DriverResult<()>;

    async fn send_alert_text(&self, text: &str) -> DriverResult<()>;

    async fn window_handle(&self) -> DriverResult<String>;

    async fn window_handles(&self) -> DriverResult<Vec<String>>;

    async fn switch_to_window(&self, handle: &str) -> DriverResult<()>;

    /// Open a blank window and return its handle
    async fn new_window(&self) -> DriverResult<String>;

    /// Close the current window
    async fn close_window(&self) -> DriverResult<()>;

    async fn quit(&self) -> DriverResult<()>;
}

/// Starts browser sessions
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Start a session and load `url`
    async fn start(&self, url: &str) -> DriverResult<Arc<dyn WebDriver>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("//div[@id='x']", "xpath" ; "absolute xpath")]
    #[test_case(".//a", "xpath" ; "relative xpath")]
    #[test_case("(//li)[1]", "xpath" ; "grouped xpath")]
    #[test_case("#blocker_div", "css selector" ; "css id")]
    #[test_case(".modal-backdrop.fade.in", "css selector" ; "css class")]
    fn test_locator_parse(input: &str, strategy: &str) {
        assert_eq!(Locator::parse(input).strategy(), strategy);
    }

    #[test]
    fn test_relative_xpath() {
        assert_eq!(
            Locator::xpath("//h1").relative(),
            Locator::XPath(".//h1".to_string())
        );
        assert_eq!(Locator::css("h1").relative(), Locator::css("h1"));
    }

    #[test]
    fn test_w3c_mapping() {
        let data = serde_json::json!({"text": "Abandon changes?"});
        match DriverError::from_w3c("unexpected alert open", "", Some(&data)) {
            DriverError::UnexpectedAlertOpen { text } => {
                assert_eq!(text.as_deref(), Some("Abandon changes?"))
            }
            other => panic!("unexpected mapping: {other:?}"),
        }
        assert!(DriverError::from_w3c("invalid session id", "gone", None).is_session_dead());
        assert!(!DriverError::from_w3c("no such element", "x", None).is_session_dead());
    }
}
