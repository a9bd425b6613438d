//! Browser session manager
//!
//! Owns at most one live driver session. `ensure_open` is cheap to call before
//! every interaction: it only starts a browser when there is none, when the
//! current one stopped answering, or when a different url key is requested.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::driver::{DriverError, DriverFactory, WebDriver};
use crate::error::NavResult;

#[derive(Default)]
struct SessionState {
    driver: Option<Arc<dyn WebDriver>>,
    url_key: Option<String>,
}

pub struct BrowserManager {
    factory: Arc<dyn DriverFactory>,
    state: Mutex<SessionState>,
    dead: AtomicBool,
    open_count: AtomicU32,
    generation: AtomicU64,
}

impl BrowserManager {
    pub fn new(factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            factory,
            state: Mutex::new(SessionState::default()),
            dead: AtomicBool::new(false),
            open_count: AtomicU32::new(0),
            generation: AtomicU64::new(0),
        }
    }

    /// Return the live session for `url_key`, starting one if needed
    pub async fn ensure_open(&self, url_key: &str) -> NavResult<Arc<dyn WebDriver>> {
        let (current, same_key) = {
            let state = self.state.lock();
            (
                state.driver.clone(),
                state.url_key.as_deref() == Some(url_key),
            )
        };

        if let Some(driver) = current {
            if same_key && !self.dead.load(Ordering::SeqCst) {
                match driver.current_url().await {
                    Ok(_) => return Ok(driver),
                    Err(DriverError::UnexpectedAlertOpen { text }) => {
                        debug!("Dismissing alert {:?} found while probing the browser", text);
                        if driver.dismiss_alert().await.is_ok() {
                            return Ok(driver);
                        }
                    }
                    Err(e) => warn!("Browser stopped answering ({}), starting a new one", e),
                }
            } else if !same_key {
                info!("Browser url key changed to {}, restarting", url_key);
            }
        }

        self.start(url_key).await
    }

    async fn start(&self, url_key: &str) -> NavResult<Arc<dyn WebDriver>> {
        self.quit().await;

        let driver = self.factory.start(url_key).await?;
        {
            let mut state = self.state.lock();
            state.driver = Some(driver.clone());
            state.url_key = Some(url_key.to_string());
        }
        self.dead.store(false, Ordering::SeqCst);
        let count = self.open_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.generation.fetch_add(1, Ordering::SeqCst);
        info!("Opened browser session #{} at {}", count, url_key);

        Ok(driver)
    }

    /// Tear the session down; a no-op when nothing is open
    pub async fn quit(&self) {
        let driver = {
            let mut state = self.state.lock();
            state.url_key = None;
            state.driver.take()
        };

        if let Some(driver) = driver {
            debug!("Quitting browser");
            if let Err(e) = driver.quit().await {
                debug!("Ignoring error while quitting browser: {}", e);
            }
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Force a new session on the next `ensure_open`
    pub fn mark_dead(&self) {
        self.dead.store(true, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().driver.is_some()
    }

    /// The live session, if any, without probing it
    pub fn current(&self) -> Option<Arc<dyn WebDriver>> {
        self.state.lock().driver.clone()
    }

    /// Number of sessions started so far
    pub fn open_count(&self) -> u32 {
        self.open_count.load(Ordering::SeqCst)
    }

    /// Bumped whenever a session starts or ends
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}
