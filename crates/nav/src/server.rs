//! Built-in destinations of the appliance server

use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;
use tracing::warn;

use crate::appliance::Appliance;
use crate::error::{NavError, NavResult};
use crate::navigation::{Entity, EntityClass, Navigate};
use crate::step::{NavArgs, NavigateStep, NavigateToSibling, StepInstance};
use crate::view::{view_factory, View, ViewFactory, ViewRef};
use crate::views::{BaseLoggedInPage, LoginPage, SsuiLoggedInPage, SsuiLoginPage};

pub static SERVER: EntityClass = EntityClass::new("Server", &[]);

/// The appliance's web server
pub struct Server {
    appliance: Arc<Appliance>,
}

impl Server {
    pub fn new(appliance: Arc<Appliance>) -> Self {
        Self { appliance }
    }

    pub fn address(&self) -> String {
        self.appliance.config().admin_url()
    }
}

impl Entity for Server {
    fn entity_class(&self) -> &'static EntityClass {
        &SERVER
    }

    fn appliance(&self) -> Arc<Appliance> {
        self.appliance.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Blank login form, logged out
pub struct LoginScreen;

#[async_trait]
impl NavigateStep for LoginScreen {
    fn view(&self) -> Option<ViewFactory> {
        Some(view_factory::<LoginPage>())
    }

    async fn prerequisite(&self, nav: &StepInstance) -> NavResult<Option<ViewRef>> {
        nav.implementation().open_browser().await?;
        Ok(None)
    }

    async fn step(&self, nav: &StepInstance, _args: &NavArgs) -> NavResult<()> {
        let logged_in = nav.create_view::<BaseLoggedInPage>().await?;
        if logged_in.logged_in().await {
            logged_in.logout().await?;
        }
        if nav.create_view::<LoginPage>().await?.is_displayed().await {
            return Ok(());
        }

        warn!("{} Login form missing, recycling the browser", nav.prefix());
        let implementation = nav.implementation();
        implementation.quit_browser().await;
        implementation.open_browser().await?;
        if nav.create_view::<LoginPage>().await?.is_displayed().await {
            Ok(())
        } else {
            Err(NavError::CannotContinueWithNavigation(
                "could not open the login screen".to_string(),
            ))
        }
    }
}

pub struct LoggedIn;

#[async_trait]
impl NavigateStep for LoggedIn {
    fn view(&self) -> Option<ViewFactory> {
        Some(view_factory::<BaseLoggedInPage>())
    }

    async fn prerequisite(&self, nav: &StepInstance) -> NavResult<Option<ViewRef>> {
        NavigateToSibling::new("LoginScreen").resolve(nav).await
    }

    async fn step(&self, nav: &StepInstance, _args: &NavArgs) -> NavResult<()> {
        let appliance = nav.appliance()?;
        nav.create_view::<LoginPage>()
            .await?
            .log_in(&appliance.config().credentials)
            .await
    }
}

/// Cloud Intel dashboard
pub struct Dashboard;

#[async_trait]
impl NavigateStep for Dashboard {
    async fn prerequisite(&self, nav: &StepInstance) -> NavResult<Option<ViewRef>> {
        NavigateToSibling::new("LoggedIn").resolve(nav).await
    }

    async fn step(&self, nav: &StepInstance, _args: &NavArgs) -> NavResult<()> {
        nav.create_view::<BaseLoggedInPage>()
            .await?
            .select_menu(&["Cloud Intel", "Dashboard"])
            .await
    }
}

pub struct Configuration;

#[async_trait]
impl NavigateStep for Configuration {
    async fn prerequisite(&self, nav: &StepInstance) -> NavResult<Option<ViewRef>> {
        NavigateToSibling::new("LoggedIn").resolve(nav).await
    }

    async fn step(&self, nav: &StepInstance, _args: &NavArgs) -> NavResult<()> {
        nav.create_view::<BaseLoggedInPage>()
            .await?
            .click_top_right("Configuration")
            .await
    }
}

pub fn register_admin(navigate: &mut Navigate) -> NavResult<()> {
    navigate.register(&SERVER, Some("LoginScreen"), LoginScreen)?;
    navigate.register(&SERVER, Some("LoggedIn"), LoggedIn)?;
    navigate.register(&SERVER, Some("Dashboard"), Dashboard)?;
    navigate.register(&SERVER, Some("Configuration"), Configuration)?;
    Ok(())
}

pub fn admin_navigator() -> NavResult<Navigate> {
    let mut navigate = Navigate::new();
    register_admin(&mut navigate)?;
    Ok(navigate)
}

/// Self-service login form
pub struct SsuiLoginScreen;

#[async_trait]
impl NavigateStep for SsuiLoginScreen {
    fn view(&self) -> Option<ViewFactory> {
        Some(view_factory::<SsuiLoginPage>())
    }

    async fn prerequisite(&self, nav: &StepInstance) -> NavResult<Option<ViewRef>> {
        nav.implementation().open_browser().await?;
        Ok(None)
    }

    async fn step(&self, nav: &StepInstance, _args: &NavArgs) -> NavResult<()> {
        let logged_in = nav.create_view::<SsuiLoggedInPage>().await?;
        if logged_in.logged_in().await {
            logged_in.logout().await?;
        }
        if nav.create_view::<SsuiLoginPage>().await?.is_displayed().await {
            Ok(())
        } else {
            Err(NavError::CannotContinueWithNavigation(
                "self-service login form is not displayed".to_string(),
            ))
        }
    }
}

pub struct SsuiLoggedIn;

#[async_trait]
impl NavigateStep for SsuiLoggedIn {
    fn view(&self) -> Option<ViewFactory> {
        Some(view_factory::<SsuiLoggedInPage>())
    }

    async fn prerequisite(&self, nav: &StepInstance) -> NavResult<Option<ViewRef>> {
        NavigateToSibling::new("LoginScreen").resolve(nav).await
    }

    async fn step(&self, nav: &StepInstance, _args: &NavArgs) -> NavResult<()> {
        let appliance = nav.appliance()?;
        nav.create_view::<SsuiLoginPage>()
            .await?
            .log_in(&appliance.config().credentials)
            .await
    }
}

pub fn register_ssui(navigate: &mut Navigate) -> NavResult<()> {
    navigate.register(&SERVER, Some("LoginScreen"), SsuiLoginScreen)?;
    navigate.register(&SERVER, Some("LoggedIn"), SsuiLoggedIn)?;
    Ok(())
}

pub fn ssui_navigator() -> NavResult<Navigate> {
    let mut navigate = Navigate::new();
    register_ssui(&mut navigate)?;
    Ok(navigate)
}
