//! The business workflow navigator: sequences clicks through progressively
//! nested embedded documents until the project-log form is reachable.
//!
//! Surfaces are never carried between steps. Every step re-resolves its
//! embed chain from the root window, because the clicks in between navigate
//! the shell and can invalidate previously held handles. A failed step is
//! retryable only by re-invoking it whole.

pub mod form;

use crate::clock::Clock;
use crate::config::NavigatorLayout;
use crate::embed::{EmbedHop, EmbedPath, FrameLocator};
use crate::errors::FlowError;
use crate::locator::{first_visible_match, Locator};
use crate::observer::FlowObserver;
use crate::selector::Matcher;
use crate::surface::Surface;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

const SETTLE_IDLE_TIMEOUT: Duration = Duration::from_secs(5);
const CONTROL_WAIT: Duration = Duration::from_secs(10);
const LOG_ENTRY_WAIT: Duration = Duration::from_secs(30);
const MANAGE_EMBED_WAIT: Duration = Duration::from_secs(20);

pub struct WorkflowNavigator {
    layout: NavigatorLayout,
    frames: FrameLocator,
    clock: Arc<dyn Clock>,
    observer: FlowObserver,
}

impl WorkflowNavigator {
    pub fn new(layout: NavigatorLayout, clock: Arc<dyn Clock>, observer: FlowObserver) -> Self {
        Self {
            frames: FrameLocator::new(clock.clone()),
            layout,
            clock,
            observer,
        }
    }

    fn project_embed_path(&self) -> EmbedPath {
        EmbedPath::new(vec![EmbedHop::first_under(self.layout.tab_panel.clone())])
    }

    fn management_hop(&self) -> EmbedPath {
        EmbedPath::new(vec![EmbedHop::at_index(self.layout.manage_embed_index)])
    }

    /// Re-resolve the project document from the root window. Used by every
    /// step that operates inside it, and by the form filler afterwards.
    pub async fn resolve_project_embed(&self, window: &Surface) -> Result<Surface, FlowError> {
        self.frames
            .resolve_innermost(window, &self.project_embed_path())
            .await
    }

    /// Re-resolve the management document: project embed, then its
    /// configured n-th nested embed.
    pub async fn resolve_management_embed(&self, window: &Surface) -> Result<Surface, FlowError> {
        let project = self.resolve_project_embed(window).await?;
        self.frames
            .clone()
            .with_hop_timeout(MANAGE_EMBED_WAIT)
            .resolve_innermost(&project, &self.management_hop())
            .await
    }

    /// Step 1: click the first visible candidate for the business-area
    /// control.
    #[instrument(skip(self, window, shot))]
    pub async fn click_business_control(
        &self,
        window: &Surface,
        shot: &Path,
    ) -> Result<(), FlowError> {
        let result = self.try_click_business_control(window).await;
        self.finish_step("click business button", window, shot, result)
            .await
    }

    async fn try_click_business_control(&self, window: &Surface) -> Result<(), FlowError> {
        match first_visible_match(window, &self.layout.business_control).await? {
            Some((element, matcher)) => {
                info!(%matcher, "business control found");
                element.click().await?;
                Ok(())
            }
            None => Err(FlowError::ControlNotFound(format!(
                "no visible business control among {:?}",
                self.layout.business_control
            ))),
        }
    }

    /// Step 2: open the project tab inside the tab-panel's embedded
    /// document, then let the shell settle.
    #[instrument(skip(self, window, shot))]
    pub async fn open_project(
        &self,
        window: &Surface,
        project_name: &str,
        shot: &Path,
    ) -> Result<(), FlowError> {
        let result = self.try_open_project(window, project_name).await;
        self.finish_step("select project", window, shot, result)
            .await
    }

    async fn try_open_project(
        &self,
        window: &Surface,
        project_name: &str,
    ) -> Result<(), FlowError> {
        window.settle(SETTLE_IDLE_TIMEOUT).await?;
        let embed = self.resolve_project_embed(window).await?;

        let button = Locator::new(
            embed.clone(),
            Matcher::text(project_name),
            self.clock.clone(),
        )
        .wait_visible(Some(CONTROL_WAIT))
        .await?;
        button.click().await?;
        info!(project = project_name, "project tab clicked");

        // Tab switch kicks off a reload of the embedded document.
        window.settle(SETTLE_IDLE_TIMEOUT).await?;
        Ok(())
    }

    /// Step 3: click the management control inside the project document and
    /// make sure its nested embedded document comes up.
    #[instrument(skip(self, window, shot))]
    pub async fn open_management(&self, window: &Surface, shot: &Path) -> Result<(), FlowError> {
        let result = self.try_open_management(window).await;
        self.finish_step("click manage button", window, shot, result)
            .await
    }

    async fn try_open_management(&self, window: &Surface) -> Result<(), FlowError> {
        let project = self.resolve_project_embed(window).await?;

        let manage = Locator::new(
            project.clone(),
            Matcher::exact_text(&self.layout.manage_label),
            self.clock.clone(),
        )
        .wait_visible(Some(CONTROL_WAIT))
        .await?;
        manage.click().await?;
        info!(label = %self.layout.manage_label, "management control clicked");

        window.settle(SETTLE_IDLE_TIMEOUT).await?;

        let inner = self
            .frames
            .clone()
            .with_hop_timeout(MANAGE_EMBED_WAIT)
            .resolve_innermost(&project, &self.management_hop())
            .await?;
        info!(surface = %inner.label(), "management document resolved");
        Ok(())
    }

    /// Step 4: click the log-entry container inside the management
    /// document. The target wraps extra markup, so it is matched by an
    /// exact text-block filter rather than a plain text match.
    #[instrument(skip(self, window, shot))]
    pub async fn open_log_entry(&self, window: &Surface, shot: &Path) -> Result<(), FlowError> {
        let result = self.try_open_log_entry(window, shot).await;
        match result {
            Ok(()) => {
                self.observer
                    .step_succeeded("click project log button", Some(shot.to_path_buf()));
                Ok(())
            }
            Err(e) => {
                self.observer
                    .step_failed("click project log button", &e, Some(window), Some(shot))
                    .await;
                Err(e)
            }
        }
    }

    async fn try_open_log_entry(&self, window: &Surface, shot: &Path) -> Result<(), FlowError> {
        let inner = self.resolve_management_embed(window).await?;

        let entry = Locator::new(
            inner.clone(),
            Matcher::TextBlock(self.layout.log_entry_label.clone()),
            self.clock.clone(),
        )
        .wait_visible(Some(LOG_ENTRY_WAIT))
        .await?;

        // Capture the pre-click state: the click navigates to the form.
        self.observer.capture(window, shot).await;
        entry.click().await?;
        info!(label = %self.layout.log_entry_label, "log entry clicked");
        Ok(())
    }

    /// Shared step epilogue: success screenshot + record, or error
    /// screenshot at the derived `-error` path + record, then propagate.
    async fn finish_step(
        &self,
        name: &str,
        window: &Surface,
        shot: &Path,
        result: Result<(), FlowError>,
    ) -> Result<(), FlowError> {
        match result {
            Ok(()) => {
                let taken = self.observer.capture(window, shot).await;
                self.observer.step_succeeded(name, taken);
                Ok(())
            }
            Err(e) => {
                self.observer
                    .step_failed(name, &e, Some(window), Some(shot))
                    .await;
                Err(e)
            }
        }
    }
}
