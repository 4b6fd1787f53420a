use crate::errors::FlowError;
use crate::selector::Matcher;
use async_trait::async_trait;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Outcome of a single embed-resolution probe.
///
/// The distinction between `Missing` and `ContentDetached` matters for
/// diagnostics: the outer `<iframe>`/webview element existing while its
/// content document never attaches is still a resolution failure, not a
/// partial success.
#[derive(Debug)]
pub enum EmbedProbe {
    /// The embed element itself is not present (yet).
    Missing,
    /// The embed element exists but its content document is not reachable.
    ContentDetached,
    /// The embedded document resolved to a usable surface.
    Ready(Surface),
}

/// Interface for driver-specific surface implementations.
///
/// A surface is an addressable UI context: the application's top-level
/// window, or an embedded document nested inside one. Surfaces form a tree
/// and are never cached across workflow steps.
#[async_trait]
pub trait SurfaceImpl: Send + Sync + Debug {
    /// Short label for logs, e.g. `window` or `window/embed[1]`.
    fn label(&self) -> String;

    async fn url(&self) -> Result<Option<String>, FlowError>;

    /// Concatenated text of the visible portion of the surface.
    async fn visible_text(&self) -> Result<String, FlowError>;

    /// Zero-wait existence probe: how many elements match right now.
    async fn count(&self, matcher: &Matcher) -> Result<usize, FlowError>;

    /// All current matches, in document order. No waiting.
    async fn find_all(&self, matcher: &Matcher) -> Result<Vec<Element>, FlowError>;

    /// Probe the `index`-th embed under `container` (or under the surface
    /// root when `container` is `None`). Single probe, no waiting.
    async fn embedded(
        &self,
        container: Option<&Matcher>,
        index: usize,
    ) -> Result<EmbedProbe, FlowError>;

    /// Wait for the document to load, then for the network to go idle up to
    /// `idle_timeout`. An idle timeout is tolerated and reported as `Ok`.
    async fn settle(&self, idle_timeout: Duration) -> Result<(), FlowError>;

    /// Evaluate a script in the surface's document context.
    async fn eval(&self, script: &str) -> Result<serde_json::Value, FlowError>;

    /// Capture the surface as a PNG.
    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, FlowError>;

    /// Whether the surface has been closed or navigated away.
    async fn is_closed(&self) -> bool;
}

/// Interface for driver-specific element implementations
#[async_trait]
pub trait ElementImpl: Send + Sync + Debug {
    fn describe(&self) -> String;
    async fn is_visible(&self) -> Result<bool, FlowError>;
    async fn text(&self) -> Result<String, FlowError>;
    async fn click(&self) -> Result<(), FlowError>;
    /// Replace the element's content with `text` (not append).
    async fn fill(&self, text: &str) -> Result<(), FlowError>;
    async fn press(&self, key: &str) -> Result<(), FlowError>;
}

/// An addressable UI context: top-level window or embedded document
#[derive(Clone, Debug)]
pub struct Surface {
    inner: Arc<dyn SurfaceImpl>,
}

impl Surface {
    pub fn new(inner: Arc<dyn SurfaceImpl>) -> Self {
        Self { inner }
    }

    pub fn label(&self) -> String {
        self.inner.label()
    }

    pub async fn url(&self) -> Result<Option<String>, FlowError> {
        self.inner.url().await
    }

    pub async fn visible_text(&self) -> Result<String, FlowError> {
        self.inner.visible_text().await
    }

    pub async fn count(&self, matcher: &Matcher) -> Result<usize, FlowError> {
        self.inner.count(matcher).await
    }

    pub async fn find_all(&self, matcher: &Matcher) -> Result<Vec<Element>, FlowError> {
        self.inner.find_all(matcher).await
    }

    pub async fn embedded(
        &self,
        container: Option<&Matcher>,
        index: usize,
    ) -> Result<EmbedProbe, FlowError> {
        self.inner.embedded(container, index).await
    }

    pub async fn settle(&self, idle_timeout: Duration) -> Result<(), FlowError> {
        self.inner.settle(idle_timeout).await
    }

    pub async fn eval(&self, script: &str) -> Result<serde_json::Value, FlowError> {
        self.inner.eval(script).await
    }

    pub async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, FlowError> {
        self.inner.screenshot(full_page).await
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.is_closed().await
    }

    /// Capture the surface to a PNG file, creating parent directories.
    pub async fn screenshot_to(
        &self,
        path: impl AsRef<Path>,
        full_page: bool,
    ) -> Result<(), FlowError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = self.screenshot(full_page).await?;
        tokio::fs::write(path, bytes).await?;
        debug!(path = %path.display(), surface = %self.label(), "screenshot saved");
        Ok(())
    }
}

/// A concrete UI node within a surface
#[derive(Clone, Debug)]
pub struct Element {
    inner: Arc<dyn ElementImpl>,
}

impl Element {
    pub fn new(inner: Arc<dyn ElementImpl>) -> Self {
        Self { inner }
    }

    pub fn describe(&self) -> String {
        self.inner.describe()
    }

    pub async fn is_visible(&self) -> Result<bool, FlowError> {
        self.inner.is_visible().await
    }

    pub async fn text(&self) -> Result<String, FlowError> {
        self.inner.text().await
    }

    pub async fn click(&self) -> Result<(), FlowError> {
        self.inner.click().await
    }

    pub async fn fill(&self, text: &str) -> Result<(), FlowError> {
        self.inner.fill(text).await
    }

    pub async fn press(&self, key: &str) -> Result<(), FlowError> {
        self.inner.press(key).await
    }
}
