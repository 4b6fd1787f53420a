use crate::clock::Clock;
use crate::errors::FlowError;
use crate::locator::Locator;
use crate::selector::CandidateList;
use crate::surface::Surface;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// The authentication mechanism in effect on a surface. Determined once per
/// run; immutable thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoginMethod {
    CredentialForm,
    QrCode,
    AlreadyAuthenticated,
    Unknown,
}

/// Probe configuration for [`LoginDetector`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Concrete rendered indicators of a QR login, in priority order.
    /// A canvas is the strongest signal the production shell gives.
    pub indicators: CandidateList,
    /// Bounded-wait budget per indicator in the second probe pass.
    pub wait_per_candidate: Duration,
    /// Words that mark a login page at all.
    pub login_keywords: Vec<String>,
    /// Words that mark the QR variant of the login page.
    pub qr_keywords: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            indicators: CandidateList::parse("css:canvas"),
            wait_per_candidate: Duration::from_secs(5),
            login_keywords: ["登录", "登陆", "login", "Login", "LOGIN"]
                .map(str::to_string)
                .to_vec(),
            qr_keywords: ["二维码", "qrcode", "QRCode", "扫码", "扫描", "手机扫码"]
                .map(str::to_string)
                .to_vec(),
        }
    }
}

/// Classifies the authentication mechanism on a surface.
///
/// Probe order is deliberate and fixed: a rendered indicator beats keyword
/// text, and an immediate existence check beats a bounded wait. The
/// zero-wait pass over every indicator completes before any bounded wait
/// starts, so an already-rendered code is classified without blocking.
pub struct LoginDetector {
    config: DetectorConfig,
    clock: Arc<dyn Clock>,
}

impl LoginDetector {
    pub fn new(config: DetectorConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Detect the login method. Probe-style: transient errors classify
    /// conservatively instead of propagating, and the surface going away
    /// mid-probe is read as a completed login (navigation away from the
    /// login page is its observable effect).
    #[instrument(skip(self, surface))]
    pub async fn detect(&self, surface: &Surface) -> LoginMethod {
        // Pass 1: zero-wait existence probes over all indicators.
        for matcher in &self.config.indicators {
            match surface.count(matcher).await {
                Ok(n) if n > 0 => {
                    info!(%matcher, count = n, "login indicator already rendered");
                    return LoginMethod::QrCode;
                }
                Ok(_) => {}
                Err(e) if e.is_surface_closed() => return LoginMethod::AlreadyAuthenticated,
                Err(e) => debug!(%matcher, error = %e, "existence probe failed, skipping"),
            }
        }

        // Pass 2: bounded wait per indicator.
        for matcher in &self.config.indicators {
            let locator = Locator::new(surface.clone(), matcher.clone(), self.clock.clone());
            match locator.wait(Some(self.config.wait_per_candidate)).await {
                Ok(_) => {
                    info!(%matcher, "login indicator appeared");
                    return LoginMethod::QrCode;
                }
                Err(e) if e.is_surface_closed() => {
                    info!("surface went away during probing, treating as logged in");
                    return LoginMethod::AlreadyAuthenticated;
                }
                Err(FlowError::Timeout(_)) => {
                    debug!(%matcher, "indicator wait timed out");
                }
                Err(e) => debug!(%matcher, error = %e, "indicator wait failed, skipping"),
            }
        }

        // Pass 3: keyword scan over visible text, the weakest signal.
        let text = match surface.visible_text().await {
            Ok(text) => text,
            Err(e) if e.is_surface_closed() => return LoginMethod::AlreadyAuthenticated,
            Err(e) => {
                debug!(error = %e, "visible-text scan failed");
                return LoginMethod::Unknown;
            }
        };

        if !self.config.login_keywords.iter().any(|k| text.contains(k)) {
            debug!("no login keywords found, not a login page");
            return LoginMethod::Unknown;
        }
        if let Some(keyword) = self.config.qr_keywords.iter().find(|k| text.contains(*k)) {
            info!(keyword = %keyword, "login keyword scan found QR variant");
            return LoginMethod::QrCode;
        }

        // Login page without a QR signal: likely a credential form, but a
        // keyword match alone is not enough to commit to it.
        LoginMethod::Unknown
    }
}
