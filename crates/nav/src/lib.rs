//! miqnav: navigation core for ManageIQ/CFME UI automation
//!
//! This crate gets a browser to a named destination of the web UI and keeps
//! it there despite a flaky UI:
//! - Drives a browser through a W3C WebDriver session, replacing dead sessions
//! - Waits for the page to settle around every click and keystroke
//! - Resolves destinations through a registry keyed by entity class
//! - Recovers from blocked, broken or logged-out pages and retries
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  navigate_to(entity, "Destination", args)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Appliance                                                  │
//! │    ├── admin: Implementation ──┐                            │
//! │    ├── ssui:  Implementation ──┤  Navigate (registry)       │
//! │    └── control (side channel)  │  BrowserManager (session)  │
//! │                                │  Browser + plugin          │
//! ├────────────────────────────────┴────────────────────────────┤
//! │  Stepper::go                                                │
//! │    pre_navigate → am_i_here → prerequisite → step           │
//! │      → resetter → post_navigate → wait for view             │
//! │    every page-touching hook under the badness guard:        │
//! │      pre-check → hook → classify failure → recover → retry  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod appliance;
pub mod browser;
pub mod control;
pub mod driver;
pub mod error;
pub mod implementation;
pub mod navigation;
pub mod plugin;
pub mod recovery;
pub mod server;
pub mod session;
pub mod step;
pub mod stepper;
pub mod view;
pub mod views;
pub mod webdriver;
pub mod widgets;

pub use appliance::Appliance;
pub use browser::{Browser, BrowserExtras};
pub use control::{ApplianceControl, CommandControl};
pub use driver::{DriverError, DriverFactory, ElementRef, Locator, WebDriver};
pub use error::{Badness, NavError, NavResult, NavigationError, NavigationFailure};
pub use implementation::{Implementation, UiKind};
pub use navigation::{Entity, EntityClass, EntityRef, Navigate};
pub use plugin::{BrowserPlugin, DefaultPlugin, MiqBrowserPlugin};
pub use recovery::{classify, PageProbes, RecoveryAction};
pub use server::Server;
pub use session::BrowserManager;
pub use step::{Hook, NavArgs, NavigateStep, NavigateToAttribute, NavigateToSibling, StepInstance};
pub use stepper::{Stepper, MAX_TRIES};
pub use view::{view_factory, View, ViewBase, ViewClass, ViewContext, ViewFactory, ViewRef};
pub use webdriver::{RemoteDriverFactory, RemoteWebDriver};

/// Navigate `obj` to destination `name` in the admin UI of its appliance
pub async fn navigate_to(obj: &EntityRef, name: &str, args: NavArgs) -> NavResult<Option<ViewRef>> {
    let appliance = obj.appliance();
    appliance
        .admin()
        .navigate_to(obj.clone(), name, args)
        .await
}
