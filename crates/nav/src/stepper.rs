//! The navigation stepper
//!
//! `go` runs one destination's hooks in order: pre-navigation, the "already
//! here" check, prerequisite and step, resetter, post-navigation and finally
//! the optional wait for the destination view. Every hook that touches the
//! page runs under the badness guard, which checks the page before the hook
//! and maps failures to a recovery action. Any recovery restarts `go` from the
//! top with one try less to spare.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use miqnav_common::{wait_for, WaitOptions};

use crate::error::{Badness, NavError, NavResult, NavigationError};
use crate::implementation::Implementation;
use crate::navigation::EntityRef;
use crate::recovery::{classify, needs_page_probe, PageProbes, RecoveryAction, BLOCKER, MODAL_BACKDROP};
use crate::step::{Hook, NavArgs, NavigateStep, StepInstance, TrailEntry};
use crate::view::{ViewContext, ViewRef};
use crate::views::ErrorView;

pub const MAX_TRIES: u32 = 3;

const SPARKLE_OFF_JS: &str = "miqSparkleOff();";
const JQUERY_JS: &str = "jQuery";
const LARGE_MODAL: &str = "//div[contains(@class, 'modal-dialog') and contains(@class, 'modal-lg')]";
const MODAL_CLOSE: &str = "//button[contains(@class, 'close') and contains(@data-dismiss, 'modal')]";
const VIEW_POLL: Duration = Duration::from_millis(500);

/// How a guarded hook failed
#[derive(Debug)]
pub(crate) enum Failure {
    /// Recovery ran; start over
    Retry { error: NavError, consume_try: bool },
    Fatal(NavError),
}

/// Bookkeeping shared by every try of one `go`
#[derive(Debug, Default)]
struct GoState {
    shim_checked: bool,
    refreshed: bool,
}

struct Outcome {
    here: bool,
    resetter_used: bool,
    view: Option<ViewRef>,
    waited: bool,
}

impl Outcome {
    fn summary(&self, elapsed: Duration) -> String {
        format!(
            "{}/{}/{}/{} (elapsed {}ms)",
            if self.here { "Already Here" } else { "Needed Navigation" },
            if self.resetter_used { "Resetter Used" } else { "No Resetter" },
            if self.view.is_some() { "View Returned" } else { "No View Available" },
            if self.waited { "Waited on View" } else { "No Wait on View" },
            elapsed.as_millis()
        )
    }
}

pub struct Stepper {
    nav: StepInstance,
    max_tries: u32,
}

impl Stepper {
    pub fn new(
        implementation: Arc<Implementation>,
        obj: EntityRef,
        name: &str,
        step: Arc<dyn NavigateStep>,
        trail: Vec<TrailEntry>,
    ) -> Self {
        let max_tries = implementation
            .appliance()
            .map(|a| a.config().max_tries)
            .unwrap_or(MAX_TRIES);
        Self {
            nav: StepInstance::new(implementation, obj, name, step, trail),
            max_tries,
        }
    }

    pub fn instance(&self) -> &StepInstance {
        &self.nav
    }

    /// Navigate, retrying after recoveries until the tries run out
    pub async fn go(&self, args: &NavArgs) -> NavResult<Option<ViewRef>> {
        let prefix = self.nav.prefix();
        info!("{} Beginning Navigation...", prefix);
        let start = Instant::now();

        let mut state = GoState::default();
        let mut last_error: Option<NavError> = None;
        let mut tries = 0u32;

        loop {
            tries += 1;
            if tries > self.max_tries {
                error!(
                    "{} Navigation failed after {} tries: {}",
                    prefix,
                    self.max_tries,
                    last_error
                        .as_ref()
                        .map(|e| e.summary())
                        .unwrap_or_else(|| "no error recorded".to_string())
                );
                return Err(NavigationError::exhausted(
                    self.nav.name(),
                    self.nav.class_name(),
                    self.max_tries,
                    last_error,
                )
                .into());
            }

            match self.attempt(tries, args, &mut state).await {
                Ok(outcome) => {
                    info!("{} {}", prefix, outcome.summary(start.elapsed()));
                    return Ok(outcome.view);
                }
                Err(Failure::Retry { error, consume_try }) => {
                    if !consume_try {
                        tries -= 1;
                    }
                    debug!("{} Retrying after: {}", prefix, error.summary());
                    last_error = Some(error);
                }
                Err(Failure::Fatal(e)) => {
                    error!(
                        "{} Navigation failed on try {}/{}: {}",
                        prefix,
                        tries,
                        self.max_tries,
                        e.summary()
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn attempt(
        &self,
        tries: u32,
        args: &NavArgs,
        state: &mut GoState,
    ) -> Result<Outcome, Failure> {
        let nav = &self.nav;
        let step = nav.step();
        let prefix = nav.prefix();

        self.guarded(Hook::PreNavigate, tries, state, || step.pre_navigate(nav, tries))
            .await?;

        let here = match self
            .guarded(Hook::AmIHere, tries, state, || step.am_i_here(nav))
            .await
        {
            Ok(here) => here,
            Err(Failure::Fatal(NavError::Interrupted)) => {
                return Err(Failure::Fatal(NavError::Interrupted))
            }
            Err(Failure::Fatal(e)) => {
                warn!(
                    "{} Exception raised [{}] whilst checking if already here",
                    prefix,
                    e.summary()
                );
                false
            }
            Err(retry) => return Err(retry),
        };

        if !here {
            debug!("{} Prerequisite Needed", prefix);
            let view = step.prerequisite(nav).await.map_err(Failure::Fatal)?;
            nav.set_prerequisite_view(view);

            match self
                .guarded(Hook::Step, tries, state, || step.step(nav, args))
                .await
            {
                Ok(()) => {}
                Err(Failure::Fatal(e)) if e.is_content_error() => {
                    if state.refreshed {
                        return Err(Failure::Retry {
                            error: e,
                            consume_try: true,
                        });
                    }
                    state.refreshed = true;
                    warn!(
                        "{} Item/Tree Exception raised [{}] whilst running step, trying refresh",
                        prefix,
                        e.summary()
                    );
                    let browser = nav.browser().await.map_err(Failure::Fatal)?;
                    browser.refresh().await.map_err(Failure::Fatal)?;

                    match self
                        .guarded(Hook::Step, tries, state, || step.step(nav, args))
                        .await
                    {
                        Ok(()) => {}
                        Err(Failure::Fatal(e)) if e.is_content_error() => {
                            return Err(Failure::Retry {
                                error: e,
                                consume_try: true,
                            })
                        }
                        Err(other) => return Err(other),
                    }
                }
                Err(other) => return Err(other),
            }
        }

        if args.use_resetter {
            self.guarded(Hook::Resetter, tries, state, || step.resetter(nav, args))
                .await?;
        }
        self.guarded(Hook::PostNavigate, tries, state, || step.post_navigate(nav, args))
            .await?;

        let view = nav.view().await.map_err(Failure::Fatal)?;
        let waited = match (&view, self.wait_timeout(args)) {
            (Some(view), Some(timeout)) => {
                self.wait_for_view(view, timeout).await?;
                true
            }
            _ => false,
        };

        Ok(Outcome {
            here,
            resetter_used: args.use_resetter,
            view,
            waited,
        })
    }

    /// Run one hook, under the badness check unless the step says it can skip it
    async fn guarded<T, F, Fut>(
        &self,
        hook: Hook,
        tries: u32,
        state: &mut GoState,
        op: F,
    ) -> Result<T, Failure>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = NavResult<T>>,
    {
        if self.nav.step().can_skip_badness_test(hook) {
            return op().await.map_err(Failure::Fatal);
        }

        let result = async {
            self.nav.implementation().open_browser().await?;
            self.pre_badness_check(state).await?;
            debug!("{} Invoking {}", self.nav.prefix(), hook);
            op().await
        }
        .await;

        match result {
            Ok(value) => Ok(value),
            Err(e) => Err(self.recover(e, tries).await),
        }
    }

    /// Look for known bad page states before touching the page
    async fn pre_badness_check(&self, state: &mut GoState) -> NavResult<()> {
        let implementation = self.nav.implementation();
        let prefix = self.nav.prefix();

        if !state.shim_checked {
            state.shim_checked = true;
            let appliance = implementation.appliance()?;
            if appliance.is_miqqe_patch_candidate() && !appliance.control().shim_installed().await? {
                return Err(NavError::Badness(Badness::ShimMissing));
            }
        }

        let browser = implementation.browser().await?;

        if browser.execute_script(SPARKLE_OFF_JS, vec![], true).await.is_err() {
            browser.dismiss_any_alerts().await;
            if let Err(e) = browser.execute_script(SPARKLE_OFF_JS, vec![], true).await {
                debug!("{} Could not hide the sparkle after dismissing alerts: {}", prefix, e);
            }
        }

        if browser.is_displayed(BLOCKER).await || browser.is_displayed(MODAL_BACKDROP).await {
            warn!("{} Page was blocked with blocker div on start of navigation", prefix);
            return Err(NavError::Badness(Badness::BlockerOverlay));
        }

        if browser.is_displayed(LARGE_MODAL).await {
            warn!("{} Modal window was open; closing the window", prefix);
            browser.click(MODAL_CLOSE).await?;
        }

        if let Err(e) = browser.execute_script(JQUERY_JS, vec![], true).await {
            let message = e.to_string();
            if !message.contains("jQuery") {
                warn!("{} Checked for jQuery but got something different: {}", prefix, message);
            }
            return Err(NavError::Badness(Badness::JQueryMissing(message)));
        }

        let errors = browser.create_view::<ErrorView>(ViewContext::default());
        if let Some(message) = errors.backend_unavailable().await {
            return Err(NavError::Badness(Badness::BackendUnavailable(message)));
        }
        if let Some(message) = errors.rails_error().await {
            warn!("{} Page was blocked by rails error: {}", prefix, message);
            return Err(NavError::Badness(Badness::ApplicationError(message)));
        }

        Ok(())
    }

    /// Classify `error` and carry out the recovery it calls for
    async fn recover(&self, error: NavError, tries: u32) -> Failure {
        let implementation = self.nav.implementation();

        let probes = match implementation.cached_browser() {
            Some(browser) if needs_page_probe(&error) => {
                PageProbes::collect(&browser, implementation.kind()).await
            }
            _ => PageProbes::default(),
        };

        let action = classify(&error, tries, &probes);
        if action == RecoveryAction::Propagate {
            return Failure::Fatal(error);
        }

        warn!(
            "{} {} on try {}: {}",
            self.nav.prefix(),
            action,
            tries,
            error.summary()
        );
        match self.apply(action).await {
            Ok(()) => Failure::Retry {
                error,
                consume_try: action.consumes_try(),
            },
            Err(e) => Failure::Fatal(e),
        }
    }

    async fn apply(&self, action: RecoveryAction) -> NavResult<()> {
        let implementation = self.nav.implementation();

        match action {
            RecoveryAction::Propagate => {}
            RecoveryAction::AcceptAlertAndRetry => {
                if let Some(browser) = implementation.cached_browser() {
                    if let Err(e) = browser.handle_alert(Duration::ZERO, false, None).await {
                        debug!("Could not accept the alert ({}), recycling the browser", e);
                        implementation.quit_browser().await;
                    }
                }
            }
            RecoveryAction::QuitAndRetry => {
                implementation.quit_browser().await;
            }
            RecoveryAction::RestartBackendAndRetry => {
                let appliance = implementation.appliance()?;
                appliance.control().restart_ui_service().await?;
                appliance
                    .control()
                    .wait_for_web_ui(appliance.config().timeouts.web_ui())
                    .await?;
                implementation.quit_browser().await;
            }
            RecoveryAction::KillWorkersAndRetry => {
                let appliance = implementation.appliance()?;
                appliance.control().kill_ui_workers().await?;
                sleep(appliance.config().timeouts.ui_settle()).await;
                appliance
                    .control()
                    .wait_for_web_ui(appliance.config().timeouts.web_ui())
                    .await?;
                implementation.quit_browser().await;
            }
            RecoveryAction::InstallShimAndRetry => {
                let appliance = implementation.appliance()?;
                appliance.control().install_shim().await?;
                implementation.quit_browser().await;
            }
        }
        Ok(())
    }

    /// How long to wait for the destination view, if at all
    fn wait_timeout(&self, args: &NavArgs) -> Option<Duration> {
        let disabled = self
            .nav
            .appliance()
            .map(|a| a.config().browser.disable_view_assert)
            .unwrap_or(false);
        if disabled {
            None
        } else {
            args.wait_for_view
        }
    }

    async fn wait_for_view(&self, view: &ViewRef, timeout: Duration) -> Result<(), Failure> {
        let options = WaitOptions::new(format!("view [{}] to display", view.name()), timeout)
            .delay(VIEW_POLL)
            .silent();
        let shown = wait_for(&options, || view.is_displayed())
            .await
            .map_err(|e| Failure::Fatal(e.into()))?;
        if shown {
            Ok(())
        } else {
            Err(Failure::Fatal(NavError::ViewNotDisplayed {
                view: view.name().to_string(),
                seconds: timeout.as_secs_f64(),
            }))
        }
    }
}
