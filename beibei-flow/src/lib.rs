//! Automation flow for the Beibei management client
//!
//! This crate drives a Chromium-embedded desktop application end to end:
//! detect the login method, complete QR login by polling, navigate the
//! nested embedded documents of the business UI, and file a project log.
//! The automation engine is reached through a driver seam
//! ([`surface::Surface`] over trait objects), so everything above the
//! driver is testable against in-memory doubles.

use std::sync::Arc;
use tracing::instrument;

pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod drivers;
pub mod embed;
pub mod errors;
pub mod flow;
pub mod locator;
pub mod login;
pub mod observer;
pub mod selector;
pub mod surface;
pub mod workflow;
#[cfg(test)]
mod tests;

pub use clock::{Clock, TokioClock};
pub use config::{FlowConfig, FlowData, FormLayout, NavigatorLayout};
pub use diagnostics::DiagnosticsSink;
pub use embed::{EmbedHop, EmbedPath, FrameLocator};
pub use errors::FlowError;
pub use flow::ProjectLogFlow;
pub use locator::Locator;
pub use login::{CredentialLogin, LoginDetector, LoginFlow, LoginMethod, QrLoginPoller, ScanState};
pub use observer::{FlowObserver, StepOutcome, StepRecord};
pub use selector::{CandidateList, Matcher};
pub use surface::{Element, Surface};
pub use workflow::form::FormFiller;
pub use workflow::WorkflowNavigator;

use drivers::cdp::{CdpConfig, CdpSession};
use drivers::DriverSession;

/// The main entry point: a handle on the driven application.
///
/// The handle never caches a window. Workflow steps re-acquire the current
/// top-level window through it, which tolerates the window being replaced
/// by a login-driven reload.
pub struct App {
    session: Arc<dyn DriverSession>,
    clock: Arc<dyn Clock>,
}

impl App {
    pub fn new(session: Arc<dyn DriverSession>) -> Self {
        Self {
            session,
            clock: Arc::new(TokioClock),
        }
    }

    /// Substitute the time source, for tests that must not sleep.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Launch (or attach to) the application over the DevTools protocol,
    /// wiring network diagnostics into `sink` when one is given.
    #[instrument(skip(config, sink))]
    pub async fn launch(
        config: &FlowConfig,
        sink: Option<DiagnosticsSink>,
    ) -> Result<Self, FlowError> {
        let session = CdpSession::launch(
            CdpConfig::new(config.app_path.clone(), config.debug_port),
            sink,
        )
        .await?;
        Ok(Self::new(session))
    }

    pub async fn current_window(&self) -> Result<Surface, FlowError> {
        self.session.current_window().await
    }

    pub async fn close(&self) -> Result<(), FlowError> {
        self.session.close().await
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }
}

impl Clone for App {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            clock: self.clock.clone(),
        }
    }
}
