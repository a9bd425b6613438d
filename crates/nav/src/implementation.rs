//! UI implementations
//!
//! An [`Implementation`] binds an appliance to one of its web UIs: the browser
//! session for that UI, the browser adapter built on top of it, and the
//! navigation registry its destinations live in.

use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

use crate::appliance::Appliance;
use crate::browser::{Browser, BrowserExtras};
use crate::driver::DriverFactory;
use crate::error::{NavError, NavResult};
use crate::navigation::{EntityRef, Navigate};
use crate::plugin::{BrowserPlugin, DefaultPlugin, MiqBrowserPlugin};
use crate::session::BrowserManager;
use crate::step::NavArgs;
use crate::view::{ViewClass, ViewContext, ViewFactory, ViewRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UiKind {
    /// The classic admin UI
    Admin,
    /// The self-service UI
    SelfService,
}

impl UiKind {
    fn plugin(&self) -> Arc<dyn BrowserPlugin> {
        match self {
            UiKind::Admin => Arc::new(MiqBrowserPlugin),
            UiKind::SelfService => Arc::new(DefaultPlugin),
        }
    }
}

impl fmt::Display for UiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UiKind::Admin => f.write_str("UI"),
            UiKind::SelfService => f.write_str("SSUI"),
        }
    }
}

pub struct Implementation {
    kind: UiKind,
    appliance: Weak<Appliance>,
    navigator: Arc<Navigate>,
    manager: Arc<BrowserManager>,
    plugin: Arc<dyn BrowserPlugin>,
    /// Adapter for the session of the recorded manager generation
    cached: Mutex<Option<(u64, Arc<Browser>)>>,
}

impl Implementation {
    pub fn new(
        kind: UiKind,
        appliance: Weak<Appliance>,
        navigator: Arc<Navigate>,
        factory: Arc<dyn DriverFactory>,
    ) -> Self {
        Self {
            kind,
            appliance,
            navigator,
            manager: Arc::new(BrowserManager::new(factory)),
            plugin: kind.plugin(),
            cached: Mutex::new(None),
        }
    }

    pub fn kind(&self) -> UiKind {
        self.kind
    }

    pub fn appliance(&self) -> NavResult<Arc<Appliance>> {
        self.appliance.upgrade().ok_or(NavError::ApplianceGone)
    }

    pub fn navigator(&self) -> &Arc<Navigate> {
        &self.navigator
    }

    pub fn manager(&self) -> &Arc<BrowserManager> {
        &self.manager
    }

    /// Entry point of this UI
    pub fn url(&self) -> NavResult<String> {
        let appliance = self.appliance()?;
        Ok(match self.kind {
            UiKind::Admin => appliance.config().admin_url(),
            UiKind::SelfService => appliance.config().ssui_url(),
        })
    }

    /// Make sure a live session exists and return its adapter
    pub async fn open_browser(&self) -> NavResult<Arc<Browser>> {
        let url = self.url()?;
        self.open_browser_at(&url).await
    }

    pub async fn open_browser_at(&self, url: &str) -> NavResult<Arc<Browser>> {
        let driver = self.manager.ensure_open(url).await?;
        let generation = self.manager.generation();

        let cached = self.cached.lock().clone();
        if let Some((cached_generation, browser)) = cached {
            if cached_generation == generation {
                return Ok(browser);
            }
        }

        let appliance = self.appliance()?;
        let browser = Browser::new(
            driver,
            self.manager.clone(),
            self.plugin.clone(),
            appliance.config().timeouts.clone(),
            appliance.version().clone(),
            BrowserExtras::new(self.appliance.clone()),
        );
        debug!("{} browser adapter built for session generation {}", self.kind, generation);
        *self.cached.lock() = Some((generation, browser.clone()));
        Ok(browser)
    }

    /// The adapter of the live session, without probing it
    pub fn cached_browser(&self) -> Option<Arc<Browser>> {
        if !self.manager.is_open() {
            return None;
        }
        let generation = self.manager.generation();
        self.cached
            .lock()
            .as_ref()
            .filter(|(cached_generation, _)| *cached_generation == generation)
            .map(|(_, browser)| browser.clone())
    }

    /// The current adapter, opening a browser when there is none
    pub async fn browser(&self) -> NavResult<Arc<Browser>> {
        match self.cached_browser() {
            Some(browser) => Ok(browser),
            None => self.open_browser().await,
        }
    }

    pub async fn quit_browser(&self) {
        self.cached.lock().take();
        self.manager.quit().await;
    }

    pub async fn create_view<V: ViewClass>(&self, context: ViewContext) -> NavResult<V> {
        Ok(self.browser().await?.create_view::<V>(context))
    }

    pub async fn create_view_from(
        &self,
        factory: ViewFactory,
        context: ViewContext,
    ) -> NavResult<ViewRef> {
        Ok(self.browser().await?.create_view_from(factory, context))
    }

    /// Navigate `obj` to destination `name` in this UI
    pub async fn navigate_to(
        self: &Arc<Self>,
        obj: EntityRef,
        name: &str,
        args: NavArgs,
    ) -> NavResult<Option<ViewRef>> {
        self.navigator.navigate(self, obj, name, args).await
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Implementation")
            .field("kind", &self.kind)
            .field("destinations", &self.navigator.len())
            .field("open_count", &self.manager.open_count())
            .finish()
    }
}
