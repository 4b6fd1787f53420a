use crate::clock::Clock;
use crate::errors::FlowError;
use crate::selector::Matcher;
use crate::surface::{EmbedProbe, Surface};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

const DEFAULT_HOP_TIMEOUT: Duration = Duration::from_secs(10);
const PROBE_INTERVAL: Duration = Duration::from_millis(250);

/// One step of an embed chain: an optional container to scope the search,
/// and which embed under it to enter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedHop {
    pub container: Option<Matcher>,
    pub embed_index: usize,
}

impl EmbedHop {
    /// First embed under a container, e.g. the tab-panel's iframe.
    pub fn first_under(container: Matcher) -> Self {
        Self {
            container: Some(container),
            embed_index: 0,
        }
    }

    /// The n-th embed directly under the surface root.
    pub fn at_index(embed_index: usize) -> Self {
        Self {
            container: None,
            embed_index,
        }
    }
}

/// A path descriptor through nested embedded documents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbedPath(pub Vec<EmbedHop>);

impl EmbedPath {
    pub fn new(hops: Vec<EmbedHop>) -> Self {
        Self(hops)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Resolves chains of nested embedded-document contexts.
///
/// Each hop waits, bounded, for the container and embed element to appear
/// and for the embed's content document to attach. There is no retry beyond
/// the single bounded wait; callers re-attempt the whole chain if needed.
#[derive(Clone)]
pub struct FrameLocator {
    clock: Arc<dyn Clock>,
    hop_timeout: Duration,
}

impl FrameLocator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            hop_timeout: DEFAULT_HOP_TIMEOUT,
        }
    }

    pub fn with_hop_timeout(mut self, timeout: Duration) -> Self {
        self.hop_timeout = timeout;
        self
    }

    /// Resolve every hop of `path` starting from `root`, returning the
    /// surface chain outermost-first. Fails with
    /// [`FlowError::FrameResolution`] carrying the 1-based index of the hop
    /// that could not be resolved.
    #[instrument(level = "debug", skip(self, root, path), fields(hops = path.len()))]
    pub async fn resolve_chain(
        &self,
        root: &Surface,
        path: &EmbedPath,
    ) -> Result<Vec<Surface>, FlowError> {
        let mut chain = Vec::with_capacity(path.len());
        let mut current = root.clone();

        for (i, hop) in path.0.iter().enumerate() {
            let hop_number = i + 1;
            let surface = self.resolve_hop(&current, hop, hop_number).await?;
            debug!(hop = hop_number, surface = %surface.label(), "hop resolved");
            chain.push(surface.clone());
            current = surface;
        }

        Ok(chain)
    }

    /// Resolve `path` and return only the innermost surface.
    pub async fn resolve_innermost(
        &self,
        root: &Surface,
        path: &EmbedPath,
    ) -> Result<Surface, FlowError> {
        let chain = self.resolve_chain(root, path).await?;
        chain.into_iter().last().ok_or_else(|| {
            FlowError::Config("embed path must contain at least one hop".into())
        })
    }

    async fn resolve_hop(
        &self,
        surface: &Surface,
        hop: &EmbedHop,
        hop_number: usize,
    ) -> Result<Surface, FlowError> {
        let deadline = self.clock.now() + self.hop_timeout;
        let mut last_probe = EmbedProbe::Missing;

        loop {
            match surface.embedded(hop.container.as_ref(), hop.embed_index).await {
                Ok(EmbedProbe::Ready(embedded)) => return Ok(embedded),
                Ok(probe) => last_probe = probe,
                Err(e) if e.is_surface_closed() => return Err(e),
                Err(e) => {
                    return Err(FlowError::FrameResolution {
                        hop: hop_number,
                        message: e.to_string(),
                    })
                }
            }

            if self.clock.now() >= deadline {
                let message = match last_probe {
                    EmbedProbe::Missing => format!(
                        "embed {} under {:?} never appeared within {:?}",
                        hop.embed_index, hop.container, self.hop_timeout
                    ),
                    EmbedProbe::ContentDetached => format!(
                        "embed {} exists but its content never attached within {:?}",
                        hop.embed_index, self.hop_timeout
                    ),
                    EmbedProbe::Ready(_) => unreachable!("ready probes return early"),
                };
                return Err(FlowError::FrameResolution {
                    hop: hop_number,
                    message,
                });
            }

            self.clock.sleep(PROBE_INTERVAL).await;
        }
    }
}
