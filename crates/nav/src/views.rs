//! Views shared by every destination: error pages, login and the logged-in shell

use async_trait::async_trait;
use std::any::Any;
use std::time::Duration;
use tracing::debug;

use miqnav_common::Credentials;

use crate::error::NavResult;
use crate::view::{View, ViewBase, ViewClass};
use crate::widgets::{Button, FlashMessages, Input, Text, Widget};

/// Apache and rails error pages
pub struct ErrorView {
    base: ViewBase,
    pub title: Text,
    pub body: Text,
    pub error_text: Text,
}

impl ErrorView {
    pub const ERROR_PAGE: &'static str = "//body[./h1 and ./p and ./hr and ./address]";
    pub const TITLE: &'static str = "//body/h1";
    pub const BODY: &'static str = "//body/p";
    pub const UNEXPECTED_ERROR: &'static str =
        "//h1[normalize-space(.)='Unexpected error encountered']";
    pub const ERROR_TEXT: &'static str =
        "//h1[normalize-space(.)='Unexpected error encountered']/following-sibling::h3[not(fieldset)]";
    pub const PROXY_ERROR: &'static str = "//body/h1[normalize-space(.)='Proxy Error']";

    /// The displayed application error, if any
    pub async fn rails_error(&self) -> Option<String> {
        if self.error_page_shown().await {
            let title = self.title.text().await.ok()?;
            let body = self.body.text().await.ok()?;
            Some(format!("{}: {}", title, body))
        } else if self.base.browser().ok()?.is_displayed(Self::UNEXPECTED_ERROR).await {
            self.error_text.text().await.ok()
        } else {
            None
        }
    }

    /// Proxy error (502) or service unavailable (503) page, if shown
    pub async fn backend_unavailable(&self) -> Option<String> {
        let browser = self.base.browser().ok()?;
        if browser.is_displayed(Self::PROXY_ERROR).await {
            return Some("Proxy Error".to_string());
        }
        if self.error_page_shown().await {
            let title = self.title.text().await.ok()?;
            if title.contains("Service Unavailable") || title.contains("503") {
                return Some(title);
            }
        }
        None
    }

    async fn error_page_shown(&self) -> bool {
        match self.base.browser() {
            Ok(browser) => browser.is_displayed(Self::ERROR_PAGE).await,
            Err(_) => false,
        }
    }
}

impl ViewClass for ErrorView {
    fn new(base: ViewBase) -> Self {
        Self {
            title: Text::new(&base, Self::TITLE),
            body: Text::new(&base, Self::BODY),
            error_text: Text::new(&base, Self::ERROR_TEXT),
            base,
        }
    }
}

#[async_trait]
impl View for ErrorView {
    fn name(&self) -> &'static str {
        "ErrorView"
    }

    fn base(&self) -> &ViewBase {
        &self.base
    }

    async fn is_displayed(&self) -> bool {
        self.rails_error().await.is_some() || self.backend_unavailable().await.is_some()
    }

    fn flush_widget_cache(&self) {
        self.title.flush();
        self.body.flush();
        self.error_text.flush();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Admin UI login form
pub struct LoginPage {
    base: ViewBase,
    pub flash: FlashMessages,
    pub username: Input,
    pub password: Input,
    pub login: Button,
}

impl LoginPage {
    pub const FLASH: &'static str = "div#flash_text_div";
    pub const USERNAME: &'static str = ".//input[@name='user_name']";
    pub const PASSWORD: &'static str = ".//input[@name='user_password']";
    pub const LOGIN: &'static str = "Login";

    pub async fn logged_out(&self) -> bool {
        self.username.is_displayed().await
            && self.password.is_displayed().await
            && self.login.is_displayed().await
    }

    pub async fn log_in(&self, credentials: &Credentials) -> NavResult<()> {
        debug!("Logging in as {}", credentials.principal);
        self.username.fill_text(&credentials.principal).await?;
        self.password.fill_text(&credentials.secret).await?;
        self.login.click().await?;
        self.flash.assert_no_error().await
    }
}

impl ViewClass for LoginPage {
    fn new(base: ViewBase) -> Self {
        Self {
            flash: FlashMessages::new(&base, Self::FLASH),
            username: Input::new(&base, Self::USERNAME),
            password: Input::new(&base, Self::PASSWORD),
            login: Button::new(&base, Self::LOGIN),
            base,
        }
    }
}

#[async_trait]
impl View for LoginPage {
    fn name(&self) -> &'static str {
        "LoginPage"
    }

    fn base(&self) -> &ViewBase {
        &self.base
    }

    async fn is_displayed(&self) -> bool {
        self.logged_out().await
    }

    fn flush_widget_cache(&self) {
        self.flash.flush();
        self.username.flush();
        self.password.flush();
        self.login.flush();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Chrome shared by every admin page once logged in
pub struct BaseLoggedInPage {
    base: ViewBase,
    pub flash: FlashMessages,
    pub user_menu: Text,
    pub logout_link: Text,
}

impl BaseLoggedInPage {
    pub const USER_MENU: &'static str =
        "//nav//li[contains(@class, 'dropdown') and .//span[contains(@class, 'pficon-user')]]/a";
    pub const LOGOUT: &'static str = "//nav//a[normalize-space(.)='Logout']";
    pub const FLASH: &'static str = "div#flash_msg_div";

    pub async fn logged_in(&self) -> bool {
        self.user_menu.is_displayed().await
    }

    pub async fn current_fullname(&self) -> NavResult<String> {
        self.user_menu.text().await
    }

    pub async fn logout(&self) -> NavResult<()> {
        self.user_menu.click().await?;
        self.logout_link.click().await?;
        let browser = self.base.browser()?;
        browser.handle_alert(Duration::ZERO, false, None).await?;
        Ok(())
    }

    /// Walk the vertical navigation, e.g. `["Cloud Intel", "Dashboard"]`
    pub async fn select_menu(&self, levels: &[&str]) -> NavResult<()> {
        let browser = self.base.browser()?;
        for level in levels {
            let locator = format!(
                "//nav[contains(@class, 'navbar-pf-vertical')]//li/a[normalize-space(.)='{}']",
                level
            );
            browser.click(locator.as_str()).await?;
        }
        Ok(())
    }

    /// Pick an entry of the top-right user menu
    pub async fn click_top_right(&self, item: &str) -> NavResult<()> {
        self.user_menu.click().await?;
        let browser = self.base.browser()?;
        let locator = format!(
            "//nav//ul[contains(@class, 'dropdown-menu')]//a[normalize-space(.)='{}']",
            item
        );
        browser.click(locator.as_str()).await
    }
}

impl ViewClass for BaseLoggedInPage {
    fn new(base: ViewBase) -> Self {
        Self {
            flash: FlashMessages::new(&base, Self::FLASH),
            user_menu: Text::new(&base, Self::USER_MENU),
            logout_link: Text::new(&base, Self::LOGOUT),
            base,
        }
    }
}

#[async_trait]
impl View for BaseLoggedInPage {
    fn name(&self) -> &'static str {
        "BaseLoggedInPage"
    }

    fn base(&self) -> &ViewBase {
        &self.base
    }

    async fn is_displayed(&self) -> bool {
        self.logged_in().await
    }

    fn flush_widget_cache(&self) {
        self.flash.flush();
        self.user_menu.flush();
        self.logout_link.flush();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Self-service UI login form
pub struct SsuiLoginPage {
    base: ViewBase,
    pub username: Input,
    pub password: Input,
    pub login: Button,
}

impl SsuiLoginPage {
    pub const USERNAME: &'static str = "//input[@id='inputUsername']";
    pub const PASSWORD: &'static str = "//input[@id='inputPassword']";
    pub const LOGIN: &'static str = "Log In";

    pub async fn log_in(&self, credentials: &Credentials) -> NavResult<()> {
        self.username.fill_text(&credentials.principal).await?;
        self.password.fill_text(&credentials.secret).await?;
        self.login.click().await
    }
}

impl ViewClass for SsuiLoginPage {
    fn new(base: ViewBase) -> Self {
        Self {
            username: Input::new(&base, Self::USERNAME),
            password: Input::new(&base, Self::PASSWORD),
            login: Button::new(&base, Self::LOGIN),
            base,
        }
    }
}

#[async_trait]
impl View for SsuiLoginPage {
    fn name(&self) -> &'static str {
        "SsuiLoginPage"
    }

    fn base(&self) -> &ViewBase {
        &self.base
    }

    async fn is_displayed(&self) -> bool {
        self.username.is_displayed().await
            && self.password.is_displayed().await
            && self.login.is_displayed().await
    }

    fn flush_widget_cache(&self) {
        self.username.flush();
        self.password.flush();
        self.login.flush();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct SsuiLoggedInPage {
    base: ViewBase,
    pub user_menu: Text,
    pub logout_link: Text,
}

impl SsuiLoggedInPage {
    pub const USER_MENU: &'static str = "//nav//li[contains(@class, 'dropdown')]/a[@id='dropdownMenu2']";
    pub const LOGOUT: &'static str = "//nav//a[normalize-space(.)='Logout']";

    pub async fn logged_in(&self) -> bool {
        self.user_menu.is_displayed().await
    }

    pub async fn logout(&self) -> NavResult<()> {
        self.user_menu.click().await?;
        self.logout_link.click().await
    }
}

impl ViewClass for SsuiLoggedInPage {
    fn new(base: ViewBase) -> Self {
        Self {
            user_menu: Text::new(&base, Self::USER_MENU),
            logout_link: Text::new(&base, Self::LOGOUT),
            base,
        }
    }
}

#[async_trait]
impl View for SsuiLoggedInPage {
    fn name(&self) -> &'static str {
        "SsuiLoggedInPage"
    }

    fn base(&self) -> &ViewBase {
        &self.base
    }

    async fn is_displayed(&self) -> bool {
        self.logged_in().await
    }

    fn flush_widget_cache(&self) {
        self.user_menu.flush();
        self.logout_link.flush();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
