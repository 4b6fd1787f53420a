//! The complete project-log run: login, navigate, fill, submit.
//!
//! Step screenshots follow the suite's long-standing numbering so run
//! artifacts stay comparable across reimplementations:
//! `step1-app-launch` … `step7-form-filled`, then `final-state`.

use crate::config::{FlowData, FormLayout, NavigatorLayout};
use crate::errors::FlowError;
use crate::login::LoginFlow;
use crate::observer::FlowObserver;
use crate::workflow::form::FormFiller;
use crate::workflow::WorkflowNavigator;
use crate::App;
use std::time::Duration;
use tracing::{info, instrument};

const SETTLE_IDLE_TIMEOUT: Duration = Duration::from_secs(5);
// A successful login replaces the window; give the new one a moment to
// exist before re-acquiring it.
const POST_LOGIN_GRACE: Duration = Duration::from_secs(2);

pub struct ProjectLogFlow {
    app: App,
    data: FlowData,
    observer: FlowObserver,
    login: LoginFlow,
    navigator: WorkflowNavigator,
    form: FormFiller,
}

impl ProjectLogFlow {
    pub fn new(app: App, data: FlowData) -> Self {
        let observer = FlowObserver::new(&data.screenshots_dir);
        let clock = app.clock();
        Self {
            login: LoginFlow::new(clock.clone()),
            navigator: WorkflowNavigator::new(
                NavigatorLayout::default(),
                clock.clone(),
                observer.clone(),
            ),
            form: FormFiller::new(FormLayout::default(), clock, observer.clone()),
            app,
            data,
            observer,
        }
    }

    /// Override the default UI layouts, e.g. from a config file.
    pub fn with_layouts(mut self, navigator: NavigatorLayout, form: FormLayout) -> Self {
        let clock = self.app.clock();
        self.navigator = WorkflowNavigator::new(navigator, clock.clone(), self.observer.clone());
        self.form = FormFiller::new(form, clock, self.observer.clone());
        self
    }

    pub fn with_login(mut self, login: LoginFlow) -> Self {
        self.login = login;
        self
    }

    pub fn observer(&self) -> &FlowObserver {
        &self.observer
    }

    /// Run the whole flow. Authentication happens exactly once; every later
    /// step re-acquires the current window instead of holding on to it.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), FlowError> {
        // Step 1: application up, window reachable.
        let window = self.app.current_window().await?;
        window.settle(SETTLE_IDLE_TIMEOUT).await?;
        let shot = self.observer.screenshot_path("step1-app-launch");
        let taken = self.observer.capture(&window, &shot).await;
        self.observer.step_succeeded("app launch", taken);
        let url = window.url().await.ok().flatten();
        info!(?url, "application window acquired");

        // Step 2: authenticate, then re-acquire the (possibly replaced)
        // window.
        let method = self.login.authenticate(&window, &self.observer).await?;
        info!(?method, "authenticated");
        self.app.clock().sleep(POST_LOGIN_GRACE).await;
        let window = self.app.current_window().await?;
        window.settle(SETTLE_IDLE_TIMEOUT).await?;
        let shot = self.observer.screenshot_path("step2-login-success");
        self.observer.capture(&window, &shot).await;

        // Steps 3-6: navigate to the log form.
        let window = self.app.current_window().await?;
        self.navigator
            .click_business_control(&window, &self.observer.screenshot_path("step3-business-click"))
            .await?;

        let window = self.app.current_window().await?;
        self.navigator
            .open_project(
                &window,
                &self.data.project_name,
                &self.observer.screenshot_path("step4-project-click"),
            )
            .await?;

        let window = self.app.current_window().await?;
        self.navigator
            .open_management(&window, &self.observer.screenshot_path("step5-manage-click"))
            .await?;

        let window = self.app.current_window().await?;
        self.navigator
            .open_log_entry(&window, &self.observer.screenshot_path("step6-log-button-click"))
            .await?;

        // Step 7: fill the form inside the freshly re-resolved project
        // document, then submit.
        let window = self.app.current_window().await?;
        let form = self.navigator.resolve_project_embed(&window).await?;
        self.form
            .fill_form(
                &window,
                &form,
                &self.data.project_sub_name,
                &self.data.log_date,
                &self.data.work_content,
                &self.observer.screenshot_path("step7-form-filled"),
            )
            .await?;

        let form = self.navigator.resolve_project_embed(&window).await?;
        self.form.submit(&form).await?;
        self.observer.step_succeeded("submit form", None);

        let shot = self.observer.screenshot_path("final-state");
        self.observer.capture(&window, &shot).await;
        info!("project log filed");
        Ok(())
    }
}
