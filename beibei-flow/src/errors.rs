use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Control not found: {0}")]
    ControlNotFound(String),

    #[error("Embed chain resolution failed at hop {hop}: {message}")]
    FrameResolution { hop: usize, message: String },

    #[error("{}", login_timeout_message(.scanned))]
    LoginTimeout { scanned: bool },

    #[error("Surface is gone: {0}")]
    SurfaceClosed(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Step failed: {0}")]
    StepFailed(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Invalid matcher: {0}")]
    InvalidMatcher(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn login_timeout_message(scanned: &bool) -> &'static str {
    if *scanned {
        "Login timed out: code scanned, awaiting confirmation on phone"
    } else {
        "Login timed out: code never scanned"
    }
}

impl FlowError {
    /// Whether this error means the underlying window or embedded document
    /// went away (closed, navigated, replaced). Probe loops treat this as a
    /// signal, not a failure.
    pub fn is_surface_closed(&self) -> bool {
        matches!(self, FlowError::SurfaceClosed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_timeout_messages_distinguish_scan_state() {
        let unscanned = FlowError::LoginTimeout { scanned: false }.to_string();
        let scanned = FlowError::LoginTimeout { scanned: true }.to_string();
        assert!(unscanned.contains("never scanned"));
        assert!(scanned.contains("awaiting confirmation"));
        assert_ne!(unscanned, scanned);
    }

    #[test]
    fn frame_resolution_reports_hop() {
        let err = FlowError::FrameResolution {
            hop: 2,
            message: "content never attached".into(),
        };
        assert!(err.to_string().contains("hop 2"));
    }
}
