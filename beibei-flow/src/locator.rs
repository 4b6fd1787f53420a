use crate::clock::Clock;
use crate::errors::FlowError;
use crate::selector::{CandidateList, Matcher};
use crate::surface::{Element, Surface};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

// Default timeout if none is specified on the locator itself
const DEFAULT_LOCATOR_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A high-level API for finding and waiting on elements within a surface.
///
/// All waits are bounded; a wait that exhausts its timeout maps to
/// [`FlowError::Timeout`] carrying the matcher, while surface loss
/// propagates as [`FlowError::SurfaceClosed`] so probe loops can react to it.
#[derive(Clone)]
pub struct Locator {
    surface: Surface,
    matcher: Matcher,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl Locator {
    pub fn new(surface: Surface, matcher: Matcher, clock: Arc<dyn Clock>) -> Self {
        Self {
            surface,
            matcher,
            timeout: DEFAULT_LOCATOR_TIMEOUT,
            clock,
        }
    }

    /// Set a default timeout for waiting operations on this locator instance.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// All current matches, no waiting.
    pub async fn all(&self) -> Result<Vec<Element>, FlowError> {
        self.surface.find_all(&self.matcher).await
    }

    /// Wait for any element matching the locator to exist.
    #[instrument(level = "debug", skip(self, timeout))]
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<Element, FlowError> {
        self.wait_inner(timeout, false).await
    }

    /// Wait for a matching element that is also visible.
    #[instrument(level = "debug", skip(self, timeout))]
    pub async fn wait_visible(&self, timeout: Option<Duration>) -> Result<Element, FlowError> {
        self.wait_inner(timeout, true).await
    }

    async fn wait_inner(
        &self,
        timeout: Option<Duration>,
        require_visible: bool,
    ) -> Result<Element, FlowError> {
        let effective_timeout = timeout.unwrap_or(self.timeout);
        let deadline = self.clock.now() + effective_timeout;
        debug!(matcher = %self.matcher, ?effective_timeout, "waiting for element");

        loop {
            let candidates = self.surface.find_all(&self.matcher).await?;
            for element in candidates {
                if !require_visible || element.is_visible().await.unwrap_or(false) {
                    return Ok(element);
                }
            }
            if self.clock.now() >= deadline {
                return Err(FlowError::Timeout(format!(
                    "timed out after {effective_timeout:?} waiting for {} in {}",
                    self.matcher,
                    self.surface.label()
                )));
            }
            self.clock.sleep(POLL_INTERVAL).await;
        }
    }
}

/// Evaluate an ordered candidate list against a surface, first-match-wins,
/// returning the first *visible* element along with the matcher that found
/// it. Enumeration only, no waiting.
pub async fn first_visible_match(
    surface: &Surface,
    candidates: &CandidateList,
) -> Result<Option<(Element, Matcher)>, FlowError> {
    for matcher in candidates {
        let elements = surface.find_all(matcher).await?;
        let total = elements.len();
        for (i, element) in elements.into_iter().enumerate() {
            if element.is_visible().await.unwrap_or(false) {
                debug!(%matcher, index = i, total, "candidate matched");
                return Ok(Some((element, matcher.clone())));
            }
        }
    }
    Ok(None)
}
