//! In-memory doubles for the driver seam: scriptable surfaces, elements,
//! a session and a manual clock. The whole workflow runs against these
//! without touching a real application or the wall clock.

use crate::clock::Clock;
use crate::drivers::DriverSession;
use crate::errors::FlowError;
use crate::selector::Matcher;
use crate::surface::{Element, ElementImpl, EmbedProbe, Surface, SurfaceImpl};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Manual clock: `sleep` advances virtual time instead of waiting.
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Arc<Mutex<Instant>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }
}

#[async_trait]
impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        {
            let mut now = self.now.lock().unwrap();
            *now += duration;
        }
        // Let concurrently scripted tasks interleave with the poll loop.
        tokio::task::yield_now().await;
    }
}

/// A scriptable element. Cloning shares state, so a test can keep a handle
/// and assert on interactions after the flow ran.
#[derive(Debug, Clone)]
pub struct MockElement {
    inner: Arc<ElementState>,
}

#[derive(Debug)]
struct ElementState {
    text: String,
    role: Option<String>,
    css: Vec<String>,
    block_text: Option<String>,
    visible: AtomicBool,
    fail_clicks: AtomicBool,
    clicks: AtomicUsize,
    fills: Mutex<Vec<String>>,
    presses: Mutex<Vec<String>>,
}

pub fn el(text: &str) -> MockElement {
    MockElement {
        inner: Arc::new(ElementState {
            text: text.to_string(),
            role: None,
            css: Vec::new(),
            block_text: None,
            visible: AtomicBool::new(true),
            fail_clicks: AtomicBool::new(false),
            clicks: AtomicUsize::new(0),
            fills: Mutex::new(Vec::new()),
            presses: Mutex::new(Vec::new()),
        }),
    }
}

impl MockElement {
    fn state(&self) -> &ElementState {
        &self.inner
    }

    pub fn with_role(self, role: &str) -> Self {
        self.rebuild(|s| s.role = Some(role.to_string()))
    }

    pub fn with_css(self, selector: &str) -> Self {
        self.rebuild(|s| s.css.push(selector.to_string()))
    }

    pub fn with_block_text(self, text: &str) -> Self {
        self.rebuild(|s| s.block_text = Some(text.to_string()))
    }

    pub fn hidden(self) -> Self {
        self.inner.visible.store(false, Ordering::SeqCst);
        self
    }

    pub fn failing_clicks(self) -> Self {
        self.inner.fail_clicks.store(true, Ordering::SeqCst);
        self
    }

    pub fn clicks(&self) -> usize {
        self.inner.clicks.load(Ordering::SeqCst)
    }

    pub fn fills(&self) -> Vec<String> {
        self.inner.fills.lock().unwrap().clone()
    }

    pub fn presses(&self) -> Vec<String> {
        self.inner.presses.lock().unwrap().clone()
    }

    // Builder-time only: the Arc has a single owner until the element is
    // added to a surface.
    fn rebuild(self, update: impl FnOnce(&mut ElementState)) -> Self {
        let mut state = Arc::try_unwrap(self.inner).unwrap_or_else(|arc| {
            panic!("configure mock elements before sharing them: {arc:?}")
        });
        update(&mut state);
        Self {
            inner: Arc::new(state),
        }
    }

    fn matches(&self, matcher: &Matcher) -> bool {
        let state = self.state();
        match matcher {
            Matcher::Text(needle) => state
                .text
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            Matcher::ExactText(needle) => state.text.trim() == needle,
            Matcher::TextBlock(needle) => state.block_text.as_deref() == Some(needle),
            Matcher::Role(role) => state.role.as_deref() == Some(role),
            Matcher::Css(selector) => state.css.iter().any(|s| s == selector),
        }
    }

    pub fn as_element(&self) -> Element {
        Element::new(Arc::new(self.clone()))
    }
}

#[async_trait]
impl ElementImpl for MockElement {
    fn describe(&self) -> String {
        format!("mock element {:?}", self.state().text)
    }

    async fn is_visible(&self) -> Result<bool, FlowError> {
        Ok(self.state().visible.load(Ordering::SeqCst))
    }

    async fn text(&self) -> Result<String, FlowError> {
        Ok(self.state().text.clone())
    }

    async fn click(&self) -> Result<(), FlowError> {
        if self.state().fail_clicks.load(Ordering::SeqCst) {
            return Err(FlowError::Driver("scripted click failure".into()));
        }
        self.state().clicks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fill(&self, text: &str) -> Result<(), FlowError> {
        self.state().fills.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn press(&self, key: &str) -> Result<(), FlowError> {
        self.state().presses.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

/// A scriptable surface. URL changes and closure can be scheduled to happen
/// after the n-th URL probe, which is how login-driven navigation and
/// window replacement are simulated.
#[derive(Debug, Clone)]
pub struct MockSurface {
    inner: Arc<SurfaceState>,
}

#[derive(Debug)]
struct SurfaceState {
    label: String,
    url: Mutex<Option<String>>,
    text: Mutex<String>,
    closed: AtomicBool,
    url_calls: AtomicUsize,
    close_after_url_calls: Mutex<Option<usize>>,
    url_change_after_calls: Mutex<Option<(usize, String)>>,
    elements: Mutex<Vec<MockElement>>,
    embeds: Mutex<Vec<(bool, MockSurface)>>,
    resolve_count: AtomicUsize,
    eval_calls: AtomicUsize,
    eval_results: Mutex<VecDeque<serde_json::Value>>,
    screenshot_fails: AtomicBool,
    probe_log: Mutex<Vec<String>>,
}

impl MockSurface {
    pub fn new(label: &str) -> Self {
        Self {
            inner: Arc::new(SurfaceState {
                label: label.to_string(),
                url: Mutex::new(None),
                text: Mutex::new(String::new()),
                closed: AtomicBool::new(false),
                url_calls: AtomicUsize::new(0),
                close_after_url_calls: Mutex::new(None),
                url_change_after_calls: Mutex::new(None),
                elements: Mutex::new(Vec::new()),
                embeds: Mutex::new(Vec::new()),
                resolve_count: AtomicUsize::new(0),
                eval_calls: AtomicUsize::new(0),
                eval_results: Mutex::new(VecDeque::new()),
                screenshot_fails: AtomicBool::new(false),
                probe_log: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn as_surface(&self) -> Surface {
        Surface::new(Arc::new(self.clone()))
    }

    pub fn set_url(&self, url: &str) {
        *self.inner.url.lock().unwrap() = Some(url.to_string());
    }

    pub fn set_text(&self, text: &str) {
        *self.inner.text.lock().unwrap() = text.to_string();
    }

    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed_now(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Close the surface once `n` URL probes have happened.
    pub fn close_after_url_calls(&self, n: usize) {
        *self.inner.close_after_url_calls.lock().unwrap() = Some(n);
    }

    /// Switch the URL once `n` URL probes have happened, simulating a
    /// login-driven navigation.
    pub fn change_url_after_calls(&self, n: usize, url: &str) {
        *self.inner.url_change_after_calls.lock().unwrap() = Some((n, url.to_string()));
    }

    pub fn add_element(&self, element: MockElement) -> MockElement {
        self.inner.elements.lock().unwrap().push(element.clone());
        element
    }

    pub fn add_embed(&self, attached: bool, surface: &MockSurface) {
        self.inner
            .embeds
            .lock()
            .unwrap()
            .push((attached, surface.clone()));
    }

    pub fn set_embed_attached(&self, index: usize, attached: bool) {
        if let Some(entry) = self.inner.embeds.lock().unwrap().get_mut(index) {
            entry.0 = attached;
        }
    }

    /// How often this surface was handed out as a resolved embed.
    pub fn resolve_count(&self) -> usize {
        self.inner.resolve_count.load(Ordering::SeqCst)
    }

    pub fn eval_calls(&self) -> usize {
        self.inner.eval_calls.load(Ordering::SeqCst)
    }

    pub fn push_eval_result(&self, value: serde_json::Value) {
        self.inner.eval_results.lock().unwrap().push_back(value);
    }

    pub fn fail_screenshots(&self) {
        self.inner.screenshot_fails.store(true, Ordering::SeqCst);
    }

    pub fn probe_log(&self) -> Vec<String> {
        self.inner.probe_log.lock().unwrap().clone()
    }

    fn log(&self, entry: String) {
        self.inner.probe_log.lock().unwrap().push(entry);
    }

    fn closed_err(&self) -> FlowError {
        FlowError::SurfaceClosed(format!("{} is closed", self.inner.label))
    }

    fn check_open(&self) -> Result<(), FlowError> {
        if self.is_closed_now() {
            Err(self.closed_err())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SurfaceImpl for MockSurface {
    fn label(&self) -> String {
        self.inner.label.clone()
    }

    async fn url(&self) -> Result<Option<String>, FlowError> {
        let calls = self.inner.url_calls.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut change = self.inner.url_change_after_calls.lock().unwrap();
            if let Some((threshold, url)) = change.clone() {
                if calls >= threshold {
                    *self.inner.url.lock().unwrap() = Some(url);
                    *change = None;
                }
            }
        }
        {
            let close_after = self.inner.close_after_url_calls.lock().unwrap();
            if let Some(threshold) = *close_after {
                if calls >= threshold {
                    self.inner.closed.store(true, Ordering::SeqCst);
                }
            }
        }
        self.check_open()?;
        Ok(self.inner.url.lock().unwrap().clone())
    }

    async fn visible_text(&self) -> Result<String, FlowError> {
        self.check_open()?;
        Ok(self.inner.text.lock().unwrap().clone())
    }

    async fn count(&self, matcher: &Matcher) -> Result<usize, FlowError> {
        self.log(format!("count:{matcher}"));
        self.check_open()?;
        Ok(self
            .inner
            .elements
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.matches(matcher))
            .count())
    }

    async fn find_all(&self, matcher: &Matcher) -> Result<Vec<Element>, FlowError> {
        self.log(format!("find:{matcher}"));
        self.check_open()?;
        Ok(self
            .inner
            .elements
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.matches(matcher))
            .map(|e| e.as_element())
            .collect())
    }

    async fn embedded(
        &self,
        container: Option<&Matcher>,
        index: usize,
    ) -> Result<EmbedProbe, FlowError> {
        self.check_open()?;
        if let Some(matcher) = container {
            let present = self
                .inner
                .elements
                .lock()
                .unwrap()
                .iter()
                .any(|e| e.matches(matcher));
            if !present {
                return Ok(EmbedProbe::Missing);
            }
        }
        let embeds = self.inner.embeds.lock().unwrap();
        match embeds.get(index) {
            None => Ok(EmbedProbe::Missing),
            Some((false, _)) => Ok(EmbedProbe::ContentDetached),
            Some((true, surface)) => {
                surface.inner.resolve_count.fetch_add(1, Ordering::SeqCst);
                Ok(EmbedProbe::Ready(surface.as_surface()))
            }
        }
    }

    async fn settle(&self, _idle_timeout: Duration) -> Result<(), FlowError> {
        self.check_open()
    }

    async fn eval(&self, _script: &str) -> Result<serde_json::Value, FlowError> {
        self.check_open()?;
        self.inner.eval_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .inner
            .eval_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(serde_json::Value::Bool(true)))
    }

    async fn screenshot(&self, _full_page: bool) -> Result<Vec<u8>, FlowError> {
        if self.inner.screenshot_fails.load(Ordering::SeqCst) {
            return Err(FlowError::Driver("scripted screenshot failure".into()));
        }
        self.check_open()?;
        Ok(b"\x89PNG mock".to_vec())
    }

    async fn is_closed(&self) -> bool {
        self.is_closed_now()
    }
}

/// A session over a single mock window. `current_window` always hands the
/// window back, mirroring a shell whose window navigates in place.
#[derive(Debug)]
pub struct MockSession {
    window: MockSurface,
}

impl MockSession {
    pub fn new(window: MockSurface) -> Self {
        Self { window }
    }
}

#[async_trait]
impl DriverSession for MockSession {
    async fn current_window(&self) -> Result<Surface, FlowError> {
        Ok(self.window.as_surface())
    }

    async fn close(&self) -> Result<(), FlowError> {
        self.window.close();
        Ok(())
    }
}
