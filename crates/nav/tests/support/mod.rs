//! In-memory browser, appliance control and scripted steps for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

use miqnav::driver::DriverResult;
use miqnav::{
    view_factory, Appliance, ApplianceControl, DriverError, DriverFactory, ElementRef, Entity,
    EntityClass, EntityRef, Locator, NavArgs, NavError, NavResult, Navigate, NavigateStep,
    Hook, NavigateToAttribute, NavigateToSibling, StepInstance, View, ViewBase, ViewClass, ViewFactory,
    ViewRef, WebDriver,
};
use miqnav_common::NavConfig;

pub type Effect = Arc<dyn Fn(&mut FakeState) + Send + Sync>;

#[derive(Clone, Debug)]
pub enum Script {
    Value(Value),
    Error(String),
}

struct ScriptRule {
    needle: String,
    result: Script,
    remaining: Option<u32>,
}

/// Everything the fake page shows and everything done to it
#[derive(Default)]
pub struct FakeState {
    /// Visible locators that survive a new session
    pub displayed: HashSet<String>,
    /// Visible locators that go away with the session
    pub transient: HashSet<String>,
    pub texts: HashMap<String, String>,
    pub attributes: HashMap<(String, String), String>,
    pub alert: Option<String>,
    rules: Vec<ScriptRule>,
    on_click: HashMap<String, Effect>,
    on_session: HashMap<u32, Effect>,
    pub clicks: Vec<String>,
    pub typed: Vec<(String, String)>,
    pub executed: Vec<String>,
    pub refreshes: u32,
    pub alerts_accepted: u32,
    pub alerts_dismissed: u32,
    pub sessions_started: u32,
    pub quits: u32,
    pub windows_opened: u32,
    dead: HashSet<u32>,
    pub url: String,
}

impl FakeState {
    fn visible(&self, locator: &str) -> bool {
        self.displayed.contains(locator) || self.transient.contains(locator)
    }

    fn present(&self, locator: &str) -> bool {
        self.visible(locator) || self.texts.contains_key(locator)
    }

    fn run_script(&mut self, script: &str) -> DriverResult<Value> {
        self.executed.push(script.to_string());

        let found = self
            .rules
            .iter_mut()
            .find(|r| script.contains(&r.needle) && r.remaining != Some(0));
        if let Some(rule) = found {
            if let Some(n) = rule.remaining.as_mut() {
                *n -= 1;
            }
            return match &rule.result {
                Script::Value(v) => Ok(v.clone()),
                Script::Error(msg) => Err(DriverError::JavaScript(msg.clone())),
            };
        }

        if script.contains("PageHasChanges") {
            return Ok(Value::Bool(false));
        }
        let quiet = ["readyState", "anythingInFlight", "gtl.loading", "spinner_div", "hasFocus"];
        if quiet.iter().any(|needle| script.contains(needle)) {
            return Ok(Value::Bool(true));
        }
        Ok(Value::Null)
    }
}

/// Shared handle on the fake page
#[derive(Clone, Default)]
pub struct FakeApp(Arc<Mutex<FakeState>>);

impl FakeApp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.0.lock())
    }

    pub fn show(&self, locator: &str) {
        self.with(|s| s.displayed.insert(locator.to_string()));
    }

    pub fn hide(&self, locator: &str) {
        self.with(|s| {
            s.displayed.remove(locator);
            s.transient.remove(locator);
        });
    }

    pub fn show_transient(&self, locator: &str) {
        self.with(|s| s.transient.insert(locator.to_string()));
    }

    pub fn set_text(&self, locator: &str, text: &str) {
        self.with(|s| s.texts.insert(locator.to_string(), text.to_string()));
    }

    pub fn set_attribute(&self, locator: &str, name: &str, value: &str) {
        self.with(|s| {
            s.attributes
                .insert((locator.to_string(), name.to_string()), value.to_string())
        });
    }

    pub fn is_shown(&self, locator: &str) -> bool {
        self.with(|s| s.visible(locator))
    }

    /// Scripts containing `needle` return `result`; earlier rules win
    pub fn script(&self, needle: &str, result: Script) {
        self.add_rule(needle, result, None);
    }

    /// Like [`FakeApp::script`], for the next `times` matching scripts only
    pub fn script_times(&self, needle: &str, result: Script, times: u32) {
        self.add_rule(needle, result, Some(times));
    }

    fn add_rule(&self, needle: &str, result: Script, remaining: Option<u32>) {
        self.with(|s| {
            s.rules.push(ScriptRule {
                needle: needle.to_string(),
                result,
                remaining,
            })
        });
    }

    pub fn on_click(&self, locator: &str, effect: impl Fn(&mut FakeState) + Send + Sync + 'static) {
        self.with(|s| s.on_click.insert(locator.to_string(), Arc::new(effect)));
    }

    /// Runs `effect` once the `n`-th session has started
    pub fn on_session(&self, n: u32, effect: impl Fn(&mut FakeState) + Send + Sync + 'static) {
        self.with(|s| s.on_session.insert(n, Arc::new(effect)));
    }

    pub fn raise_alert(&self, text: &str) {
        self.with(|s| s.alert = Some(text.to_string()));
    }

    pub fn clicks(&self) -> Vec<String> {
        self.with(|s| s.clicks.clone())
    }

    pub fn refreshes(&self) -> u32 {
        self.with(|s| s.refreshes)
    }

    pub fn quits(&self) -> u32 {
        self.with(|s| s.quits)
    }

    pub fn script_count(&self, needle: &str) -> usize {
        self.with(|s| s.executed.iter().filter(|e| e.contains(needle)).count())
    }

    /// Kill every session started so far, as if the browser crashed
    pub fn kill_sessions(&self) {
        self.with(|s| {
            let started = s.sessions_started;
            s.dead.extend(1..=started);
        });
    }

    /// Admin login form that logs in when the button is clicked
    pub fn logged_out_admin(&self) {
        use miqnav::views::{BaseLoggedInPage, LoginPage};
        use miqnav::widgets::Button;

        let login = Button::xpath_for(LoginPage::LOGIN);
        for locator in [LoginPage::USERNAME, LoginPage::PASSWORD, login.as_str()] {
            self.show(locator);
        }
        let form = [
            LoginPage::USERNAME.to_string(),
            LoginPage::PASSWORD.to_string(),
            login.clone(),
        ];
        self.on_click(&login, move |s| {
            for locator in &form {
                s.displayed.remove(locator);
            }
            s.displayed.insert(BaseLoggedInPage::USER_MENU.to_string());
        });
    }
}

pub struct FakeDriver {
    id: u32,
    app: FakeApp,
}

impl FakeDriver {
    fn alive(&self, s: &FakeState) -> DriverResult<()> {
        if s.dead.contains(&self.id) {
            return Err(DriverError::InvalidSessionId(format!("session {} is gone", self.id)));
        }
        Ok(())
    }

    /// Gate for every command that is refused while an alert is open
    fn ready<R>(&self, f: impl FnOnce(&mut FakeState) -> DriverResult<R>) -> DriverResult<R> {
        self.app.with(|s| {
            self.alive(s)?;
            if let Some(text) = &s.alert {
                return Err(DriverError::UnexpectedAlertOpen {
                    text: Some(text.clone()),
                });
            }
            f(s)
        })
    }

    fn alert_op<R>(&self, f: impl FnOnce(&mut FakeState) -> DriverResult<R>) -> DriverResult<R> {
        self.app.with(|s| {
            self.alive(s)?;
            f(s)
        })
    }
}

#[async_trait]
impl WebDriver for FakeDriver {
    fn browser_name(&self) -> &str {
        "chrome"
    }

    async fn goto(&self, url: &str) -> DriverResult<()> {
        self.ready(|s| {
            s.url = url.to_string();
            Ok(())
        })
    }

    async fn current_url(&self) -> DriverResult<String> {
        self.ready(|s| Ok(s.url.clone()))
    }

    async fn refresh(&self) -> DriverResult<()> {
        self.ready(|s| {
            s.refreshes += 1;
            Ok(())
        })
    }

    async fn execute(&self, script: &str, _args: Vec<Value>) -> DriverResult<Value> {
        self.ready(|s| s.run_script(script))
    }

    async fn find_elements(&self, locator: &Locator) -> DriverResult<Vec<ElementRef>> {
        self.ready(|s| {
            let key = locator.as_str();
            Ok(if s.present(key) {
                vec![ElementRef(key.to_string())]
            } else {
                Vec::new()
            })
        })
    }

    async fn find_elements_from(
        &self,
        parent: &ElementRef,
        locator: &Locator,
    ) -> DriverResult<Vec<ElementRef>> {
        self.ready(|s| {
            let key = format!("{} {}", parent.id(), locator.as_str());
            Ok(if s.present(&key) {
                vec![ElementRef(key)]
            } else {
                Vec::new()
            })
        })
    }

    async fn is_element_displayed(&self, element: &ElementRef) -> DriverResult<bool> {
        self.ready(|s| Ok(s.visible(element.id())))
    }

    async fn click(&self, element: &ElementRef) -> DriverResult<()> {
        self.ready(|s| {
            if !s.visible(element.id()) {
                return Err(DriverError::ElementNotInteractable(element.id().to_string()));
            }
            s.clicks.push(element.id().to_string());
            if let Some(effect) = s.on_click.get(element.id()).cloned() {
                effect(s);
            }
            Ok(())
        })
    }

    async fn clear(&self, element: &ElementRef) -> DriverResult<()> {
        self.ready(|s| {
            s.attributes
                .remove(&(element.id().to_string(), "value".to_string()));
            Ok(())
        })
    }

    async fn send_keys(&self, element: &ElementRef, text: &str) -> DriverResult<()> {
        self.ready(|s| {
            s.typed.push((element.id().to_string(), text.to_string()));
            s.attributes
                .insert((element.id().to_string(), "value".to_string()), text.to_string());
            Ok(())
        })
    }

    async fn element_text(&self, element: &ElementRef) -> DriverResult<String> {
        self.ready(|s| Ok(s.texts.get(element.id()).cloned().unwrap_or_default()))
    }

    async fn element_attribute(
        &self,
        element: &ElementRef,
        name: &str,
    ) -> DriverResult<Option<String>> {
        self.ready(|s| {
            Ok(s.attributes
                .get(&(element.id().to_string(), name.to_string()))
                .cloned())
        })
    }

    async fn alert_text(&self) -> DriverResult<Option<String>> {
        self.alert_op(|s| Ok(s.alert.clone()))
    }

    async fn accept_alert(&self) -> DriverResult<()> {
        self.alert_op(|s| match s.alert.take() {
            Some(_) => {
                s.alerts_accepted += 1;
                Ok(())
            }
            None => Err(DriverError::NoSuchAlert),
        })
    }

    async fn dismiss_alert(&self) -> DriverResult<()> {
        self.alert_op(|s| match s.alert.take() {
            Some(_) => {
                s.alerts_dismissed += 1;
                Ok(())
            }
            None => Err(DriverError::NoSuchAlert),
        })
    }

    async fn send_alert_text(&self, _text: &str) -> DriverResult<()> {
        self.alert_op(|s| match s.alert {
            Some(_) => Ok(()),
            None => Err(DriverError::NoSuchAlert),
        })
    }

    async fn window_handle(&self) -> DriverResult<String> {
        self.ready(|_| Ok("main".to_string()))
    }

    async fn window_handles(&self) -> DriverResult<Vec<String>> {
        self.ready(|_| Ok(vec!["main".to_string()]))
    }

    async fn switch_to_window(&self, _handle: &str) -> DriverResult<()> {
        self.ready(|_| Ok(()))
    }

    async fn new_window(&self) -> DriverResult<String> {
        self.ready(|s| {
            s.windows_opened += 1;
            Ok(format!("scratch-{}", s.windows_opened))
        })
    }

    async fn close_window(&self) -> DriverResult<()> {
        self.ready(|_| Ok(()))
    }

    async fn quit(&self) -> DriverResult<()> {
        self.app.with(|s| {
            s.quits += 1;
            s.dead.insert(self.id);
        });
        Ok(())
    }
}

/// Starts [`FakeDriver`] sessions on one [`FakeApp`]
pub struct FakeDriverFactory {
    app: FakeApp,
}

impl FakeDriverFactory {
    pub fn new(app: FakeApp) -> Self {
        Self { app }
    }
}

#[async_trait]
impl DriverFactory for FakeDriverFactory {
    async fn start(&self, url: &str) -> DriverResult<Arc<dyn WebDriver>> {
        let id = self.app.with(|s| {
            s.sessions_started += 1;
            s.transient.clear();
            s.alert = None;
            s.url = url.to_string();
            if let Some(effect) = s.on_session.get(&s.sessions_started).cloned() {
                effect(s);
            }
            s.sessions_started
        });
        Ok(Arc::new(FakeDriver {
            id,
            app: self.app.clone(),
        }))
    }
}

/// Records side-channel calls instead of touching an appliance
#[derive(Default)]
pub struct RecordingControl {
    calls: Mutex<Vec<String>>,
    shim: AtomicBool,
}

impl RecordingControl {
    pub fn new(shim_installed: bool) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            shim: AtomicBool::new(shim_installed),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().push(call.to_string());
    }
}

#[async_trait]
impl ApplianceControl for RecordingControl {
    async fn restart_ui_service(&self) -> NavResult<()> {
        self.record("restart_ui_service");
        Ok(())
    }

    async fn kill_ui_workers(&self) -> NavResult<()> {
        self.record("kill_ui_workers");
        Ok(())
    }

    async fn wait_for_web_ui(&self, _timeout: Duration) -> NavResult<()> {
        self.record("wait_for_web_ui");
        Ok(())
    }

    async fn shim_installed(&self) -> NavResult<bool> {
        self.record("shim_installed");
        Ok(self.shim.load(Ordering::SeqCst))
    }

    async fn install_shim(&self) -> NavResult<()> {
        self.record("install_shim");
        self.shim.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub static THING: EntityClass = EntityClass::new("Thing", &[]);
pub static SPECIAL_THING: EntityClass = EntityClass::new("SpecialThing", &[&THING]);

pub struct Thing {
    appliance: Arc<Appliance>,
    class: &'static EntityClass,
    parent: Option<EntityRef>,
}

impl Entity for Thing {
    fn entity_class(&self) -> &'static EntityClass {
        self.class
    }

    fn appliance(&self) -> Arc<Appliance> {
        self.appliance.clone()
    }

    fn parent(&self) -> Option<EntityRef> {
        self.parent.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The page a scripted step lands on
pub struct TargetPage {
    base: ViewBase,
}

impl TargetPage {
    pub const MARKER: &'static str = "#target";
}

impl ViewClass for TargetPage {
    fn new(base: ViewBase) -> Self {
        Self { base }
    }
}

#[async_trait]
impl View for TargetPage {
    fn name(&self) -> &'static str {
        "TargetPage"
    }

    fn base(&self) -> &ViewBase {
        &self.base
    }

    async fn is_displayed(&self) -> bool {
        match self.base.browser() {
            Ok(browser) => browser.is_displayed(Self::MARKER).await,
            Err(_) => false,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Ordered record of hook calls, `"<destination>:<hook>"`
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn record(&self, destination: &str, hook: &str) -> usize {
        let entry = format!("{}:{}", destination, hook);
        let mut entries = self.0.lock();
        entries.push(entry.clone());
        entries.iter().filter(|e| **e == entry).count()
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, destination: &str, hook: &str) -> usize {
        let entry = format!("{}:{}", destination, hook);
        self.0.lock().iter().filter(|e| **e == entry).count()
    }
}

pub type Fault = Arc<dyn Fn(&FakeApp, usize) -> Option<NavError> + Send + Sync>;

enum Prerequisite {
    None,
    Sibling(String),
    Attribute(String, String),
}

/// Step whose behavior is set up by the test
pub struct ScriptedStep {
    name: String,
    app: FakeApp,
    journal: Journal,
    view: Option<ViewFactory>,
    prerequisite: Prerequisite,
    click: Option<String>,
    fault: Option<Fault>,
    reset_fault: Option<Fault>,
    here_error: Option<Arc<dyn Fn() -> NavError + Send + Sync>>,
}

impl ScriptedStep {
    pub fn new(name: &str, app: &FakeApp, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            app: app.clone(),
            journal: journal.clone(),
            view: None,
            prerequisite: Prerequisite::None,
            click: None,
            fault: None,
            reset_fault: None,
            here_error: None,
        }
    }

    /// Lands on [`TargetPage`] by clicking `#go`
    pub fn to_target(name: &str, app: &FakeApp, journal: &Journal) -> Self {
        app.show("#go");
        app.on_click("#go", |s| {
            s.displayed.insert(TargetPage::MARKER.to_string());
        });
        Self::new(name, app, journal)
            .with_view(view_factory::<TargetPage>())
            .clicking("#go")
    }

    pub fn with_view(mut self, view: ViewFactory) -> Self {
        self.view = Some(view);
        self
    }

    pub fn after_sibling(mut self, name: &str) -> Self {
        self.prerequisite = Prerequisite::Sibling(name.to_string());
        self
    }

    pub fn after_attribute(mut self, path: &str, name: &str) -> Self {
        self.prerequisite = Prerequisite::Attribute(path.to_string(), name.to_string());
        self
    }

    pub fn clicking(mut self, locator: &str) -> Self {
        self.click = Some(locator.to_string());
        self
    }

    /// `fault(app, n)` runs at the start of the n-th step call; `Some` fails it
    pub fn failing(
        mut self,
        fault: impl Fn(&FakeApp, usize) -> Option<NavError> + Send + Sync + 'static,
    ) -> Self {
        self.fault = Some(Arc::new(fault));
        self
    }

    /// Like [`failing`](Self::failing) for the resetter, which then counts as overridden
    pub fn resetting(
        mut self,
        fault: impl Fn(&FakeApp, usize) -> Option<NavError> + Send + Sync + 'static,
    ) -> Self {
        self.reset_fault = Some(Arc::new(fault));
        self
    }

    pub fn here_fails(mut self, error: impl Fn() -> NavError + Send + Sync + 'static) -> Self {
        self.here_error = Some(Arc::new(error));
        self
    }
}

#[async_trait]
impl NavigateStep for ScriptedStep {
    fn view(&self) -> Option<ViewFactory> {
        self.view
    }

    async fn am_i_here(&self, nav: &StepInstance) -> NavResult<bool> {
        self.journal.record(&self.name, "am_i_here");
        if let Some(error) = &self.here_error {
            return Err(error());
        }
        match nav.view().await? {
            Some(view) => Ok(view.is_displayed().await),
            None => Ok(false),
        }
    }

    async fn prerequisite(&self, nav: &StepInstance) -> NavResult<Option<ViewRef>> {
        self.journal.record(&self.name, "prerequisite");
        match &self.prerequisite {
            Prerequisite::None => Ok(None),
            Prerequisite::Sibling(name) => NavigateToSibling::new(name.as_str()).resolve(nav).await,
            Prerequisite::Attribute(path, name) => {
                NavigateToAttribute::new(path.as_str(), name.as_str())
                    .resolve(nav)
                    .await
            }
        }
    }

    async fn step(&self, nav: &StepInstance, _args: &NavArgs) -> NavResult<()> {
        let n = self.journal.record(&self.name, "step");
        if let Some(fault) = &self.fault {
            if let Some(error) = fault(&self.app, n) {
                return Err(error);
            }
        }
        if let Some(locator) = &self.click {
            nav.browser().await?.click(locator.as_str()).await?;
        }
        Ok(())
    }

    fn overrides(&self, hook: Hook) -> bool {
        hook == Hook::Resetter && self.reset_fault.is_some()
    }

    async fn resetter(&self, _nav: &StepInstance, _args: &NavArgs) -> NavResult<()> {
        let n = self.journal.record(&self.name, "resetter");
        if let Some(fault) = &self.reset_fault {
            if let Some(error) = fault(&self.app, n) {
                return Err(error);
            }
        }
        Ok(())
    }

    async fn pre_navigate(&self, _nav: &StepInstance, _tries: u32) -> NavResult<()> {
        self.journal.record(&self.name, "pre_navigate");
        Ok(())
    }

    async fn post_navigate(&self, _nav: &StepInstance, _args: &NavArgs) -> NavResult<()> {
        self.journal.record(&self.name, "post_navigate");
        Ok(())
    }
}

/// An appliance wired to fakes
pub struct Harness {
    pub app: FakeApp,
    pub control: Arc<RecordingControl>,
    pub appliance: Arc<Appliance>,
}

impl Harness {
    pub fn new(navigate: Navigate) -> Self {
        Self::with_config(navigate, config())
    }

    pub fn with_config(navigate: Navigate, config: NavConfig) -> Self {
        Self::build(navigate, Navigate::new(), config, FakeApp::new(), true)
    }

    pub fn build(
        admin: Navigate,
        ssui: Navigate,
        config: NavConfig,
        app: FakeApp,
        shim_installed: bool,
    ) -> Self {
        let control = Arc::new(RecordingControl::new(shim_installed));
        let factory = Arc::new(FakeDriverFactory::new(app.clone()));
        let appliance = Appliance::new(config, control.clone(), factory, admin, ssui)
            .expect("appliance");
        Self {
            app,
            control,
            appliance,
        }
    }

    pub fn thing(&self) -> EntityRef {
        self.entity(&THING, None)
    }

    pub fn entity(&self, class: &'static EntityClass, parent: Option<EntityRef>) -> EntityRef {
        Arc::new(Thing {
            appliance: self.appliance.clone(),
            class,
            parent,
        })
    }

    pub fn open_count(&self) -> u32 {
        self.appliance.admin().manager().open_count()
    }
}

pub fn config() -> NavConfig {
    NavConfig {
        version: Some("5.9".to_string()),
        ..NavConfig::default()
    }
}

/// Captures formatted log lines for assertions
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock())
            .lines()
            .map(String::from)
            .collect()
    }

    /// Lines at `level` (e.g. `"ERROR"`) that contain `needle`
    pub fn count(&self, level: &str, needle: &str) -> usize {
        self.lines()
            .iter()
            .filter(|l| l.contains(level) && l.contains(needle))
            .count()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
