//! Login-method detection and the QR login flow.
//!
//! Authentication runs at most once per flow: the method is detected once,
//! the matching login path is driven to completion, and detection is never
//! re-entered after the first success.

mod credential;
mod detector;
mod qr;

pub use credential::{CredentialLayout, CredentialLogin};
pub use detector::{DetectorConfig, LoginDetector, LoginMethod};
pub use qr::{QrLoginConfig, QrLoginPoller, ScanState};

use crate::clock::Clock;
use crate::errors::FlowError;
use crate::locator::Locator;
use crate::observer::FlowObserver;
use crate::surface::Surface;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Drives authentication end to end: classify the login method, then run
/// the matching login path. QR login waits for the code to render, captures
/// it for the operator, and polls until confirmation.
pub struct LoginFlow {
    detector: LoginDetector,
    poller: QrLoginPoller,
    clock: Arc<dyn Clock>,
}

impl LoginFlow {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            detector: LoginDetector::new(DetectorConfig::default(), clock.clone()),
            poller: QrLoginPoller::new(QrLoginConfig::default(), clock.clone()),
            clock,
        }
    }

    pub fn with_detector(mut self, detector: LoginDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_poller(mut self, poller: QrLoginPoller) -> Self {
        self.poller = poller;
        self
    }

    /// Authenticate on `surface`. Returns the detected method on success.
    #[instrument(skip(self, surface, observer))]
    pub async fn authenticate(
        &self,
        surface: &Surface,
        observer: &FlowObserver,
    ) -> Result<LoginMethod, FlowError> {
        let initial_url = surface.url().await.unwrap_or(None).unwrap_or_default();
        let method = self.detector.detect(surface).await;
        info!(?method, "login method detected");

        match method {
            LoginMethod::AlreadyAuthenticated => Ok(method),
            LoginMethod::QrCode => {
                self.wait_for_code_displayed(surface).await;
                let qr_shot = observer.screenshot_path("qrcode");
                observer.capture(surface, &qr_shot).await;

                self.poller.run(surface, &initial_url).await?;
                observer.step_succeeded("qr login", Some(qr_shot));
                Ok(method)
            }
            LoginMethod::CredentialForm | LoginMethod::Unknown => Err(FlowError::StepFailed(
                format!("unsupported login method: {method:?}"),
            )),
        }
    }

    /// Bounded wait for the QR code to render. Failure is tolerated: the
    /// follow-up screenshot of the whole window still gives the operator
    /// something to scan.
    async fn wait_for_code_displayed(&self, surface: &Surface) {
        for matcher in &self.detector.config().indicators {
            let locator = Locator::new(surface.clone(), matcher.clone(), self.clock.clone());
            match locator.wait_visible(Some(Duration::from_secs(30))).await {
                Ok(_) => {
                    info!(%matcher, "login code displayed");
                    return;
                }
                Err(e) if e.is_surface_closed() => return,
                Err(_) => continue,
            }
        }
        warn!("no login-code indicator appeared, capturing full window anyway");
    }
}
