use crate::errors::FlowError;
use crate::surface::Surface;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Outcome of one named workflow step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    Failed(String),
}

/// One record per named step: outcome plus the screenshot artifact, if any.
/// Written at step boundaries, read only by the final report.
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub name: String,
    pub outcome: StepOutcome,
    pub screenshot: Option<PathBuf>,
}

/// Cross-cutting observer invoked at step boundaries and on failure paths.
///
/// Everything here is best-effort: a screenshot that cannot be taken is
/// logged and recorded as absent, never turned into a workflow failure.
#[derive(Clone, Debug)]
pub struct FlowObserver {
    inner: Arc<ObserverInner>,
}

#[derive(Debug)]
struct ObserverInner {
    screenshots_dir: PathBuf,
    records: Mutex<Vec<StepRecord>>,
}

impl FlowObserver {
    pub fn new(screenshots_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(ObserverInner {
                screenshots_dir: screenshots_dir.into(),
                records: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn screenshots_dir(&self) -> &Path {
        &self.inner.screenshots_dir
    }

    /// Deterministic per-step artifact path: `<dir>/<file_name>.png`.
    pub fn screenshot_path(&self, file_name: &str) -> PathBuf {
        self.inner.screenshots_dir.join(format!("{file_name}.png"))
    }

    /// Capture `surface` to `path`, best-effort. Returns the path on success.
    pub async fn capture(&self, surface: &Surface, path: &Path) -> Option<PathBuf> {
        match surface.screenshot_to(path, true).await {
            Ok(()) => Some(path.to_path_buf()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "screenshot failed, continuing");
                None
            }
        }
    }

    pub fn step_succeeded(&self, name: &str, screenshot: Option<PathBuf>) {
        info!(step = name, "step succeeded");
        self.push(StepRecord {
            name: name.to_string(),
            outcome: StepOutcome::Succeeded,
            screenshot,
        });
    }

    /// Record a failed step, attempting a diagnostic screenshot at the
    /// `-error` variant of the step path. The capture itself is guarded so a
    /// broken surface cannot mask the original failure.
    pub async fn step_failed(
        &self,
        name: &str,
        error: &FlowError,
        surface: Option<&Surface>,
        step_path: Option<&Path>,
    ) {
        warn!(step = name, error = %error, "step failed");
        let mut shot = None;
        if let (Some(surface), Some(path)) = (surface, step_path) {
            let error_target = error_screenshot_path(path);
            shot = self.capture(surface, &error_target).await;
        }
        self.push(StepRecord {
            name: name.to_string(),
            outcome: StepOutcome::Failed(error.to_string()),
            screenshot: shot,
        });
    }

    pub fn records(&self) -> Vec<StepRecord> {
        match self.inner.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn push(&self, record: StepRecord) {
        match self.inner.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}

/// Derive the failure-state screenshot path: `-error` inserted before the
/// extension (`qrcode.png` → `qrcode-error.png`).
pub fn error_screenshot_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}-error.{}", ext.to_string_lossy()),
        None => format!("{stem}-error"),
    };
    path.with_file_name(name)
}
