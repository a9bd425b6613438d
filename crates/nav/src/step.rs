//! Navigation steps
//!
//! A [`NavigateStep`] describes how to reach one destination; the stepper
//! drives its hooks against a [`StepInstance`], which binds the step to the
//! entity being navigated and the implementation doing the navigating.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use miqnav_common::parse_duration;

use crate::appliance::Appliance;
use crate::browser::Browser;
use crate::error::{NavError, NavResult};
use crate::implementation::Implementation;
use crate::navigation::{entity_key, EntityRef};
use crate::view::{ViewClass, ViewContext, ViewFactory, ViewRef};

/// The step hooks, as seen by the badness guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    PreNavigate,
    AmIHere,
    Step,
    Resetter,
    PostNavigate,
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Hook::PreNavigate => "pre_navigate",
            Hook::AmIHere => "am_i_here",
            Hook::Step => "step",
            Hook::Resetter => "resetter",
            Hook::PostNavigate => "post_navigate",
        };
        f.write_str(name)
    }
}

/// How to reach one destination
#[async_trait]
pub trait NavigateStep: Send + Sync {
    /// View shown once the destination is reached
    fn view(&self) -> Option<ViewFactory> {
        None
    }

    /// Whether the browser already shows the destination; must not change the page
    async fn am_i_here(&self, nav: &StepInstance) -> NavResult<bool> {
        match nav.view().await? {
            Some(view) => Ok(view.is_displayed().await),
            None => Ok(false),
        }
    }

    /// Reach the state `step` starts from
    async fn prerequisite(&self, _nav: &StepInstance) -> NavResult<Option<ViewRef>> {
        Ok(None)
    }

    async fn step(&self, nav: &StepInstance, _args: &NavArgs) -> NavResult<()> {
        Err(NavError::InvalidValue(format!(
            "{} has no step",
            nav.prefix()
        )))
    }

    /// Bring the destination to its canonical state
    ///
    /// Steps that implement this, `pre_navigate` or `post_navigate` report it
    /// from [`overrides`](Self::overrides) so the hook runs under the badness check.
    async fn resetter(&self, _nav: &StepInstance, _args: &NavArgs) -> NavResult<()> {
        Ok(())
    }

    async fn pre_navigate(&self, _nav: &StepInstance, _tries: u32) -> NavResult<()> {
        Ok(())
    }

    async fn post_navigate(&self, _nav: &StepInstance, _args: &NavArgs) -> NavResult<()> {
        Ok(())
    }

    /// Optional hooks this step implements itself
    fn overrides(&self, _hook: Hook) -> bool {
        false
    }

    /// Hooks that run without the page-badness check and recovery
    fn can_skip_badness_test(&self, hook: Hook) -> bool {
        matches!(hook, Hook::PreNavigate | Hook::Resetter | Hook::PostNavigate)
            && !self.overrides(hook)
    }
}

/// Options of one navigation
#[derive(Debug, Clone)]
pub struct NavArgs {
    pub use_resetter: bool,
    /// Wait this long for the destination view; `None` skips the wait
    pub wait_for_view: Option<Duration>,
    /// Step-specific arguments
    pub kwargs: Map<String, Value>,
}

impl Default for NavArgs {
    fn default() -> Self {
        Self {
            use_resetter: true,
            wait_for_view: None,
            kwargs: Map::new(),
        }
    }
}

impl NavArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_resetter(mut self) -> Self {
        self.use_resetter = false;
        self
    }

    pub fn with_wait(mut self, timeout: Duration) -> Self {
        self.wait_for_view = Some(timeout);
        self
    }

    /// Wait for the view with a humane timeout such as `"10s"`
    pub fn wait_for_view_str(self, timeout: &str) -> NavResult<Self> {
        Ok(self.with_wait(parse_duration(timeout)?))
    }

    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.kwargs.get(key)
    }
}

/// One `(entity, destination)` being entered
#[derive(Debug, Clone)]
pub struct TrailEntry {
    pub entity: usize,
    pub class: &'static str,
    pub destination: String,
}

impl TrailEntry {
    pub fn new(obj: &EntityRef, destination: &str) -> Self {
        Self {
            entity: entity_key(obj),
            class: obj.entity_class().name,
            destination: destination.to_string(),
        }
    }
}

impl PartialEq for TrailEntry {
    fn eq(&self, other: &Self) -> bool {
        self.entity == other.entity && self.destination == other.destination
    }
}

impl Eq for TrailEntry {}

impl fmt::Display for TrailEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.class, self.destination)
    }
}

pub type NavFuture<'a> = Pin<Box<dyn Future<Output = NavResult<Option<ViewRef>>> + Send + 'a>>;

/// A step bound to the entity it navigates
pub struct StepInstance {
    implementation: Arc<Implementation>,
    obj: EntityRef,
    name: String,
    step: Arc<dyn NavigateStep>,
    trail: Vec<TrailEntry>,
    prerequisite_view: Mutex<Option<ViewRef>>,
    view: Mutex<Option<ViewRef>>,
}

impl StepInstance {
    pub fn new(
        implementation: Arc<Implementation>,
        obj: EntityRef,
        name: &str,
        step: Arc<dyn NavigateStep>,
        mut trail: Vec<TrailEntry>,
    ) -> Self {
        trail.push(TrailEntry::new(&obj, name));
        Self {
            implementation,
            obj,
            name: name.to_string(),
            step,
            trail,
            prerequisite_view: Mutex::new(None),
            view: Mutex::new(None),
        }
    }

    pub fn implementation(&self) -> &Arc<Implementation> {
        &self.implementation
    }

    pub fn obj(&self) -> &EntityRef {
        &self.obj
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class_name(&self) -> &'static str {
        self.obj.entity_class().name
    }

    pub fn step(&self) -> &Arc<dyn NavigateStep> {
        &self.step
    }

    pub fn trail(&self) -> &[TrailEntry] {
        &self.trail
    }

    /// `[UI-NAV/<class>/<destination>]`
    pub fn prefix(&self) -> String {
        format!("[UI-NAV/{}/{}]", self.class_name(), self.name)
    }

    pub fn appliance(&self) -> NavResult<Arc<Appliance>> {
        self.implementation.appliance()
    }

    pub async fn browser(&self) -> NavResult<Arc<Browser>> {
        self.implementation.browser().await
    }

    pub fn prerequisite_view(&self) -> Option<ViewRef> {
        self.prerequisite_view.lock().clone()
    }

    pub(crate) fn set_prerequisite_view(&self, view: Option<ViewRef>) {
        *self.prerequisite_view.lock() = view;
    }

    /// The destination view, built once per browser session
    pub async fn view(&self) -> NavResult<Option<ViewRef>> {
        let Some(factory) = self.step.view() else {
            return Ok(None);
        };
        let browser = self.browser().await?;

        let mut cached = self.view.lock();
        if let Some(view) = cached.as_ref() {
            let same_browser = view
                .base()
                .browser()
                .map(|b| Arc::ptr_eq(&b, &browser))
                .unwrap_or(false);
            if same_browser {
                return Ok(Some(view.clone()));
            }
        }
        let view = browser.create_view_from(factory, ViewContext::for_object(self.obj.clone()));
        *cached = Some(view.clone());
        Ok(Some(view))
    }

    /// Build a view about this step's entity
    pub async fn create_view<V: ViewClass>(&self) -> NavResult<V> {
        let browser = self.browser().await?;
        Ok(browser.create_view::<V>(ViewContext::for_object(self.obj.clone())))
    }

    /// Navigate `obj` to `name` as part of this step's prerequisite chain
    pub fn navigate_prerequisite(&self, obj: EntityRef, name: &str) -> NavFuture<'_> {
        let name = name.to_string();
        Box::pin(async move {
            self.implementation
                .navigator()
                .navigate_with_trail(
                    &self.implementation,
                    obj,
                    &name,
                    NavArgs::default(),
                    self.trail.clone(),
                )
                .await
        })
    }
}

/// Prerequisite: another destination of the same entity
#[derive(Debug, Clone)]
pub struct NavigateToSibling {
    name: String,
}

impl NavigateToSibling {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub async fn resolve(&self, nav: &StepInstance) -> NavResult<Option<ViewRef>> {
        nav.navigate_prerequisite(nav.obj().clone(), &self.name)
            .await
    }
}

/// Prerequisite: a destination of a related entity, reached by a dotted attribute path
#[derive(Debug, Clone)]
pub struct NavigateToAttribute {
    path: String,
    name: String,
}

impl NavigateToAttribute {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }

    pub fn target(&self, obj: &EntityRef) -> NavResult<EntityRef> {
        let mut current = obj.clone();
        for attr in self.path.split('.') {
            current = current.attribute(attr).ok_or_else(|| {
                NavError::InvalidValue(format!(
                    "{} has no attribute {:?} (resolving {:?})",
                    current.entity_class().name,
                    attr,
                    self.path
                ))
            })?;
        }
        Ok(current)
    }

    pub async fn resolve(&self, nav: &StepInstance) -> NavResult<Option<ViewRef>> {
        let target = self.target(nav.obj())?;
        nav.navigate_prerequisite(target, &self.name).await
    }
}
