//! Error types for navigation

use std::fmt;
use thiserror::Error;

use crate::driver::DriverError;

pub type NavResult<T> = Result<T, NavError>;

#[derive(Error, Debug)]
pub enum NavError {
    #[error(transparent)]
    Navigation(#[from] NavigationError),

    #[error("Candidate not found: {0}")]
    CandidateNotFound(String),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("CFME exception occurred: {0}")]
    CfmeExceptionOccurred(String),

    #[error("Cannot continue with navigation: {0}")]
    CannotContinueWithNavigation(String),

    #[error("Page is in a bad state: {0}")]
    Badness(Badness),

    #[error("Flash error: {0}")]
    FlashError(String),

    #[error("Destination {name:?} is already registered on {class}")]
    DuplicateDestination { class: String, name: String },

    #[error("View {view} was not displayed within {seconds:.1}s")]
    ViewNotDisplayed { view: String, seconds: f64 },

    #[error("No browser is open")]
    BrowserClosed,

    #[error("WebDriver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Appliance control error: {0}")]
    Control(String),

    #[error("Appliance is gone")]
    ApplianceGone,

    #[error("Interrupted")]
    Interrupted,

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error(transparent)]
    Common(#[from] miqnav_common::Error),
}

impl NavError {
    /// The UI did not contain something a step needed
    pub fn is_content_error(&self) -> bool {
        matches!(self, NavError::CandidateNotFound(_) | NavError::ItemNotFound(_))
    }

    pub fn is_navigation_error(&self) -> bool {
        matches!(self, NavError::Navigation(_))
    }

    /// First line of the message, capped for log lines
    pub fn summary(&self) -> String {
        let full = self.to_string();
        let line = full.lines().next().unwrap_or_default();
        if line.chars().count() > 200 {
            let cut: String = line.chars().take(200).collect();
            format!("{}...", cut)
        } else {
            line.to_string()
        }
    }
}

/// Abnormal page states found by the pre-navigation check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Badness {
    /// The MiqQE javascript shim is not installed on the appliance
    ShimMissing,
    /// A blocker div or modal backdrop covers the page
    BlockerOverlay,
    /// jQuery is not defined in the page
    JQueryMissing(String),
    /// Rails or application error page
    ApplicationError(String),
    /// Proxy error or service unavailable page
    BackendUnavailable(String),
}

impl fmt::Display for Badness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Badness::ShimMissing => write!(f, "MiqQE shim not installed"),
            Badness::BlockerOverlay => write!(f, "page blocked by an overlay"),
            Badness::JQueryMissing(msg) => write!(f, "jQuery missing ({})", msg),
            Badness::ApplicationError(msg) => write!(f, "application error: {}", msg),
            Badness::BackendUnavailable(msg) => write!(f, "backend unavailable: {}", msg),
        }
    }
}

/// No destination could be reached
#[derive(Error, Debug)]
#[error("Navigation to {destination:?} for {entity_class} failed: {reason}")]
pub struct NavigationError {
    pub destination: String,
    pub entity_class: String,
    pub reason: NavigationFailure,
    #[source]
    pub last_error: Option<Box<NavError>>,
}

impl NavigationError {
    pub fn unresolved(destination: &str, entity_class: &str) -> Self {
        Self {
            destination: destination.to_string(),
            entity_class: entity_class.to_string(),
            reason: NavigationFailure::Unresolved,
            last_error: None,
        }
    }

    pub fn exhausted(
        destination: &str,
        entity_class: &str,
        tries: u32,
        last_error: Option<NavError>,
    ) -> Self {
        Self {
            destination: destination.to_string(),
            entity_class: entity_class.to_string(),
            reason: NavigationFailure::Exhausted { tries },
            last_error: last_error.map(Box::new),
        }
    }

    pub fn cycle(destination: &str, entity_class: &str, trail: Vec<String>) -> Self {
        Self {
            destination: destination.to_string(),
            entity_class: entity_class.to_string(),
            reason: NavigationFailure::Cycle { trail },
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationFailure {
    /// No class in the entity's ancestry registers the destination
    Unresolved,
    /// Every try failed
    Exhausted { tries: u32 },
    /// The prerequisite chain came back to a destination already being entered
    Cycle { trail: Vec<String> },
}

impl fmt::Display for NavigationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigationFailure::Unresolved => write!(f, "no such destination"),
            NavigationFailure::Exhausted { tries } => write!(f, "gave up after {} tries", tries),
            NavigationFailure::Cycle { trail } => {
                write!(f, "prerequisite cycle {}", trail.join(" -> "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_exhausted_keeps_last_error_as_source() {
        let err = NavError::from(NavigationError::exhausted(
            "All",
            "Domain",
            3,
            Some(NavError::CandidateNotFound("Datastores".to_string())),
        ));
        assert!(err.to_string().contains("gave up after 3 tries"));
        let source = err.source().expect("source");
        assert!(source.to_string().contains("Datastores"));
    }

    #[test]
    fn test_summary_is_single_line() {
        let err = NavError::InvalidValue("first\nsecond".to_string());
        assert_eq!(err.summary(), "Invalid value: first");
    }

    #[test]
    fn test_content_errors() {
        assert!(NavError::ItemNotFound("x".into()).is_content_error());
        assert!(!NavError::Interrupted.is_content_error());
    }
}
