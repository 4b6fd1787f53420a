use crate::clock::Clock;
use crate::errors::FlowError;
use crate::surface::Surface;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Progress of the scan-with-phone handshake. Advances forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanState {
    Unscanned,
    ScannedAwaitingConfirmation,
    Confirmed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrLoginConfig {
    pub poll_interval: Duration,
    pub total_timeout: Duration,
    /// Substring that marks a URL as still being part of the login flow.
    pub login_url_marker: String,
    /// Text fragments that mean the code was scanned and the phone-side
    /// confirmation is still pending.
    pub scan_pending_texts: Vec<String>,
}

impl Default for QrLoginConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            total_timeout: Duration::from_secs(2 * 60),
            login_url_marker: "login".to_string(),
            scan_pending_texts: ["扫描成功", "请在手机上确认登录"]
                .map(str::to_string)
                .to_vec(),
        }
    }
}

enum ScanProbe {
    Scanned,
    NotScanned,
    SurfaceGone,
}

/// Polls the asynchronous "scan with phone, confirm on phone" flow to
/// completion or timeout.
///
/// Success is never pushed to us: each tick first checks the success
/// condition (URL moved off the login flow, or the surface itself became
/// unreachable — a successful login replaces the window), then the scan
/// condition while the code is still unscanned. The elapsed cap produces a
/// [`FlowError::LoginTimeout`] whose message distinguishes a code that was
/// never scanned from one that was scanned but never confirmed.
pub struct QrLoginPoller {
    config: QrLoginConfig,
    clock: Arc<dyn Clock>,
    on_progress: Option<Arc<dyn Fn(ScanState) + Send + Sync>>,
}

impl QrLoginPoller {
    pub fn new(config: QrLoginConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            on_progress: None,
        }
    }

    /// Observe forward state transitions (scanned, confirmed).
    pub fn with_progress(mut self, callback: Arc<dyn Fn(ScanState) + Send + Sync>) -> Self {
        self.on_progress = Some(callback);
        self
    }

    #[instrument(skip(self, surface, initial_url))]
    pub async fn run(&self, surface: &Surface, initial_url: &str) -> Result<(), FlowError> {
        let started = self.clock.now();
        let mut state = ScanState::Unscanned;
        let mut ticks: u64 = 0;

        loop {
            if self.probe_success(surface, initial_url).await {
                info!("login confirmed");
                self.emit(ScanState::Confirmed);
                return Ok(());
            }

            if state == ScanState::Unscanned {
                match self.probe_scan(surface).await {
                    ScanProbe::Scanned => {
                        info!("code scanned, waiting for confirmation on the phone");
                        state = ScanState::ScannedAwaitingConfirmation;
                        self.emit(state);
                    }
                    ScanProbe::SurfaceGone => {
                        info!("surface went away during scan check, treating as confirmed");
                        self.emit(ScanState::Confirmed);
                        return Ok(());
                    }
                    ScanProbe::NotScanned => {}
                }
            }

            let elapsed = self.clock.now() - started;
            if elapsed >= self.config.total_timeout {
                return Err(FlowError::LoginTimeout {
                    scanned: state != ScanState::Unscanned,
                });
            }

            ticks += 1;
            if ticks % 5 == 0 {
                match state {
                    ScanState::Unscanned => {
                        info!(waited_secs = elapsed.as_secs(), "waiting for the code to be scanned")
                    }
                    _ => info!(waited_secs = elapsed.as_secs(), "waiting for confirmation"),
                }
            }

            self.clock.sleep(self.config.poll_interval).await;
        }
    }

    /// Success condition: URL moved away from the login flow, or the
    /// surface is unreachable. Transient probe failures read as "not yet".
    async fn probe_success(&self, surface: &Surface, initial_url: &str) -> bool {
        if surface.is_closed().await {
            return true;
        }
        match surface.url().await {
            Ok(Some(url)) => {
                url != initial_url && !url.contains(&self.config.login_url_marker)
            }
            Ok(None) => false,
            Err(e) if e.is_surface_closed() => true,
            Err(e) => {
                debug!(error = %e, "success probe failed, retrying next tick");
                false
            }
        }
    }

    async fn probe_scan(&self, surface: &Surface) -> ScanProbe {
        match surface.visible_text().await {
            Ok(text) => {
                if self
                    .config
                    .scan_pending_texts
                    .iter()
                    .any(|t| text.contains(t))
                {
                    ScanProbe::Scanned
                } else {
                    ScanProbe::NotScanned
                }
            }
            Err(e) if e.is_surface_closed() => ScanProbe::SurfaceGone,
            Err(e) => {
                debug!(error = %e, "scan probe failed, retrying next tick");
                ScanProbe::NotScanned
            }
        }
    }

    fn emit(&self, state: ScanState) {
        if let Some(callback) = &self.on_progress {
            callback(state);
        }
    }
}
