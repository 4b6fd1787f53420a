//! Field-by-field population of the project-log form.
//!
//! The three fill operations are isolated: one field failing does not stop
//! the others from being attempted, and the aggregate fails afterwards if
//! any of them reported failure. Individual fills are probe-style and
//! return `bool`; only the aggregate raises.

use crate::clock::Clock;
use crate::config::FormLayout;
use crate::errors::FlowError;
use crate::locator::{first_visible_match, Locator};
use crate::observer::FlowObserver;
use crate::selector::Matcher;
use crate::surface::{Element, Surface};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

const FIELD_WAIT: Duration = Duration::from_secs(10);
const PANEL_WAIT: Duration = Duration::from_secs(30);

pub struct FormFiller {
    layout: FormLayout,
    clock: Arc<dyn Clock>,
    observer: FlowObserver,
}

impl FormFiller {
    pub fn new(layout: FormLayout, clock: Arc<dyn Clock>, observer: FlowObserver) -> Self {
        Self {
            layout,
            clock,
            observer,
        }
    }

    /// Fill all three fields, then capture the filled form. The screenshot
    /// is taken only when every fill reported success.
    #[instrument(skip(self, window, form, shot))]
    pub async fn fill_form(
        &self,
        window: &Surface,
        form: &Surface,
        project_sub_name: &str,
        log_date: &str,
        work_content: &str,
        shot: &Path,
    ) -> Result<(), FlowError> {
        let mut failed: Vec<&str> = Vec::new();

        if !self.select_project(form, project_sub_name).await {
            failed.push("project");
        }
        if !self.select_date(window, form, log_date).await {
            failed.push("date");
        }
        if !self.fill_work_content(form, work_content).await {
            failed.push("work content");
        }

        if !failed.is_empty() {
            let error = FlowError::StepFailed(format!("form fields failed: {}", failed.join(", ")));
            self.observer
                .step_failed("fill log form", &error, Some(window), Some(shot))
                .await;
            return Err(error);
        }

        let taken = self.observer.capture(window, shot).await;
        self.observer.step_succeeded("fill log form", taken);
        Ok(())
    }

    /// Dropdown select: open the n-th combobox, settle, click the option
    /// with the requested visible text.
    pub async fn select_project(&self, form: &Surface, project_sub_name: &str) -> bool {
        match self.try_select_project(form, project_sub_name).await {
            Ok(()) => {
                info!(project = project_sub_name, "project selected");
                true
            }
            Err(e) => {
                warn!(error = %e, "project select failed");
                false
            }
        }
    }

    async fn try_select_project(
        &self,
        form: &Surface,
        project_sub_name: &str,
    ) -> Result<(), FlowError> {
        let combobox = self
            .wait_for_nth(form, &Matcher::role("combobox"), self.layout.project_combobox_index)
            .await?;
        combobox.click().await?;

        // Options render asynchronously after the dropdown opens.
        self.clock
            .sleep(Duration::from_millis(self.layout.dropdown_settle_ms))
            .await;

        let option = self
            .wait_for_text_in(form, &self.layout.option_role, project_sub_name)
            .await?;
        option.click().await?;
        Ok(())
    }

    /// Date select: primary path through the picker panel, with a one-shot
    /// scripted fallback. Picker widgets are known to sometimes ignore
    /// simulated clicks, so the fallback sets the value directly and
    /// dispatches the events the widget listens for.
    pub async fn select_date(&self, window: &Surface, form: &Surface, date: &str) -> bool {
        match self.try_select_date(form, date).await {
            Ok(()) => {
                info!(date, "date selected");
                return true;
            }
            Err(e) => {
                warn!(error = %e, "date picker path failed, trying scripted fallback");
            }
        }

        match self.scripted_date_fallback(form, date).await {
            Ok(true) => {
                info!(date, "date set via scripted fallback");
                true
            }
            Ok(false) => {
                self.capture_date_failure(window).await;
                false
            }
            Err(e) => {
                warn!(error = %e, "scripted date fallback failed");
                self.capture_date_failure(window).await;
                false
            }
        }
    }

    async fn try_select_date(&self, form: &Surface, date: &str) -> Result<(), FlowError> {
        let input = Locator::new(form.clone(), self.layout.date_input.clone(), self.clock.clone())
            .wait(Some(FIELD_WAIT))
            .await?;
        input.click().await?;

        Locator::new(form.clone(), self.layout.date_panel.clone(), self.clock.clone())
            .wait_visible(Some(PANEL_WAIT))
            .await?;

        let panel_input = Locator::new(
            form.clone(),
            panel_input_matcher(&self.layout.date_panel),
            self.clock.clone(),
        )
        .wait(Some(FIELD_WAIT))
        .await?;
        panel_input.fill(date).await?;
        panel_input.press("Enter").await?;
        Ok(())
    }

    /// Direct DOM manipulation of the same input: set the value, then
    /// dispatch `input` and a keydown Enter so the widget commits it.
    async fn scripted_date_fallback(&self, form: &Surface, date: &str) -> Result<bool, FlowError> {
        let input_selector = matcher_css(&self.layout.date_input)?;
        let panel_selector = matcher_css(&self.layout.date_panel)?;
        let script = format!(
            r#"(() => {{
                const input = document.querySelector({input});
                if (!input) return false;
                input.click();
                const panel = document.querySelector({panel} + ' input') || input.querySelector('input') || input;
                panel.value = {value};
                panel.dispatchEvent(new Event('input', {{ bubbles: true }}));
                panel.dispatchEvent(new KeyboardEvent('keydown', {{
                    key: 'Enter', code: 'Enter', keyCode: 13, bubbles: true
                }}));
                return true;
            }})()"#,
            input = js_string(&input_selector),
            panel = js_string(&panel_selector),
            value = js_string(date),
        );
        let value = form.eval(&script).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn capture_date_failure(&self, window: &Surface) {
        let path = self.observer.screenshot_path("date-selection-failed");
        self.observer.capture(window, &path).await;
    }

    /// Text area fill: click, then replace the whole content.
    pub async fn fill_work_content(&self, form: &Surface, content: &str) -> bool {
        match self.try_fill_work_content(form, content).await {
            Ok(()) => {
                info!("work content filled");
                true
            }
            Err(e) => {
                warn!(error = %e, "work content fill failed");
                false
            }
        }
    }

    async fn try_fill_work_content(&self, form: &Surface, content: &str) -> Result<(), FlowError> {
        let textarea = Locator::new(
            form.clone(),
            self.layout.work_content.clone(),
            self.clock.clone(),
        )
        .wait_visible(Some(PANEL_WAIT))
        .await?;
        textarea.click().await?;
        textarea.fill(content).await?;
        Ok(())
    }

    /// Click the submit control.
    #[instrument(skip(self, form))]
    pub async fn submit(&self, form: &Surface) -> Result<(), FlowError> {
        let deadline = self.clock.now() + FIELD_WAIT;
        loop {
            if let Some((element, matcher)) =
                first_visible_match(form, &self.layout.submit_control).await?
            {
                info!(%matcher, "submitting form");
                element.click().await?;
                return Ok(());
            }
            if self.clock.now() >= deadline {
                return Err(FlowError::ControlNotFound(format!(
                    "no visible submit control among {:?}",
                    self.layout.submit_control
                )));
            }
            self.clock.sleep(Duration::from_millis(250)).await;
        }
    }

    /// Wait until at least `index + 1` elements match, then take the n-th.
    async fn wait_for_nth(
        &self,
        form: &Surface,
        matcher: &Matcher,
        index: usize,
    ) -> Result<Element, FlowError> {
        let deadline = self.clock.now() + PANEL_WAIT;
        loop {
            let elements = form.find_all(matcher).await?;
            let found = elements.len();
            if let Some(element) = elements.into_iter().nth(index) {
                return Ok(element);
            }
            if self.clock.now() >= deadline {
                return Err(FlowError::Timeout(format!(
                    "only {found} elements matched {matcher}, needed index {index}"
                )));
            }
            self.clock.sleep(Duration::from_millis(250)).await;
        }
    }

    /// Wait for an element matching `matcher` whose text contains `text`.
    async fn wait_for_text_in(
        &self,
        form: &Surface,
        matcher: &Matcher,
        text: &str,
    ) -> Result<Element, FlowError> {
        let deadline = self.clock.now() + FIELD_WAIT;
        loop {
            for element in form.find_all(matcher).await? {
                if element.text().await.unwrap_or_default().contains(text) {
                    return Ok(element);
                }
            }
            if self.clock.now() >= deadline {
                return Err(FlowError::ControlNotFound(format!(
                    "no {matcher} with text {text:?}"
                )));
            }
            self.clock.sleep(Duration::from_millis(250)).await;
        }
    }
}

fn panel_input_matcher(panel: &Matcher) -> Matcher {
    match panel {
        Matcher::Css(css) => Matcher::Css(format!("{css} input")),
        other => other.clone(),
    }
}

fn matcher_css(matcher: &Matcher) -> Result<String, FlowError> {
    match matcher {
        Matcher::Css(css) => Ok(css.clone()),
        other => Err(FlowError::InvalidMatcher(format!(
            "scripted fallback needs a CSS matcher, got {other}"
        ))),
    }
}

fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
