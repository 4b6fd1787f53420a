//! Chrome-DevTools-protocol driver for the Chromium-embedded shell.
//!
//! The app is spawned with `--remote-debugging-port` and attached to over
//! the DevTools websocket. Element queries run as frame-piercing script in
//! the page (the shell's embed chains are same-origin), interaction goes
//! through trusted CDP input dispatch at page coordinates, and the Network
//! domain feeds the diagnostics sink.

use crate::diagnostics::{summarize_body, DiagnosticsSink};
use crate::drivers::DriverSession;
use crate::errors::FlowError;
use crate::selector::Matcher;
use crate::surface::{Element, ElementImpl, EmbedProbe, Surface, SurfaceImpl};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams as NetworkEnableParams, EventLoadingFailed, EventLoadingFinished,
    EventRequestWillBeSent, EventResponseReceived, GetResponseBodyParams,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

const ATTACH_TIMEOUT: Duration = Duration::from_secs(30);
const ATTACH_POLL: Duration = Duration::from_millis(250);
const LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Launch settings for the driven application.
#[derive(Debug, Clone)]
pub struct CdpConfig {
    /// Executable to spawn; `None` attaches to an already-running instance.
    pub app_path: Option<PathBuf>,
    pub debug_port: u16,
    /// Extra command-line arguments for the shell.
    pub args: Vec<String>,
}

impl CdpConfig {
    pub fn new(app_path: Option<PathBuf>, debug_port: u16) -> Self {
        Self {
            app_path,
            debug_port,
            args: [
                "--no-sandbox",
                "--no-first-run",
                "--no-default-browser-check",
            ]
            .map(str::to_string)
            .to_vec(),
        }
    }
}

/// A connection to the shell over the DevTools protocol.
pub struct CdpSession {
    browser: Mutex<Browser>,
    child: StdMutex<Option<tokio::process::Child>>,
    diagnostics: Option<DiagnosticsSink>,
    instrumented: StdMutex<HashSet<String>>,
}

impl std::fmt::Debug for CdpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdpSession").finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

impl CdpSession {
    /// Spawn the app (when a path is configured), wait for its DevTools
    /// endpoint, and attach. Network diagnostics are wired into `sink` for
    /// every window the session hands out.
    #[instrument(skip(config, sink))]
    pub async fn launch(
        config: CdpConfig,
        sink: Option<DiagnosticsSink>,
    ) -> Result<Arc<Self>, FlowError> {
        let child = match &config.app_path {
            Some(path) => {
                info!(app = %path.display(), port = config.debug_port, "launching application");
                let child = tokio::process::Command::new(path)
                    .arg(format!("--remote-debugging-port={}", config.debug_port))
                    .args(&config.args)
                    .kill_on_drop(true)
                    .spawn()
                    .map_err(|e| {
                        FlowError::Driver(format!("failed to spawn {}: {e}", path.display()))
                    })?;
                Some(child)
            }
            None => {
                info!(port = config.debug_port, "attaching to running application");
                None
            }
        };

        let ws_url = wait_for_devtools(config.debug_port).await?;
        let (browser, mut handler) = Browser::connect(ws_url.as_str())
            .await
            .map_err(|e| FlowError::Driver(format!("devtools connect failed: {e}")))?;

        // The handler must be pumped for the whole session lifetime.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Arc::new(Self {
            browser: Mutex::new(browser),
            child: StdMutex::new(child),
            diagnostics: sink,
            instrumented: StdMutex::new(HashSet::new()),
        }))
    }

    async fn first_page(&self) -> Result<Page, FlowError> {
        let browser = self.browser.lock().await;
        let pages = browser
            .pages()
            .await
            .map_err(|e| map_cdp_message(e.to_string()))?;
        pages
            .into_iter()
            .next()
            .ok_or_else(|| FlowError::SurfaceClosed("no windows are open".into()))
    }

    fn instrument(&self, page: &Page) {
        let Some(sink) = self.diagnostics.clone() else {
            return;
        };
        let target = format!("{:?}", page.target_id());
        {
            let mut seen = match self.instrumented.lock() {
                Ok(g) => g,
                Err(p) => p.into_inner(),
            };
            if !seen.insert(target) {
                return;
            }
        }
        let page = page.clone();
        tokio::spawn(async move {
            if let Err(e) = instrument_page(page, sink).await {
                warn!(error = %e, "network diagnostics unavailable for window");
            }
        });
    }
}

#[async_trait]
impl DriverSession for CdpSession {
    async fn current_window(&self) -> Result<Surface, FlowError> {
        let page = self.first_page().await?;
        self.instrument(&page);
        Ok(Surface::new(Arc::new(CdpSurface {
            page: Arc::new(page),
            hops: Vec::new(),
        })))
    }

    async fn close(&self) -> Result<(), FlowError> {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            debug!(error = %e, "browser close reported an error");
        }
        let child = {
            let mut guard = match self.child.lock() {
                Ok(g) => g,
                Err(p) => p.into_inner(),
            };
            guard.take()
        };
        if let Some(mut child) = child {
            let _ = child.start_kill();
        }
        Ok(())
    }
}

async fn wait_for_devtools(port: u16) -> Result<String, FlowError> {
    let url = format!("http://127.0.0.1:{port}/json/version");
    let deadline = tokio::time::Instant::now() + ATTACH_TIMEOUT;
    loop {
        match reqwest::get(&url).await {
            Ok(resp) => match resp.json::<VersionInfo>().await {
                Ok(info) => return Ok(info.web_socket_debugger_url),
                Err(e) => debug!(error = %e, "devtools endpoint not ready"),
            },
            Err(e) => debug!(error = %e, "devtools endpoint not reachable yet"),
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(FlowError::Timeout(format!(
                "devtools endpoint {url} did not come up within {ATTACH_TIMEOUT:?}"
            )));
        }
        tokio::time::sleep(ATTACH_POLL).await;
    }
}

/// Wire Network-domain events into the diagnostics sink for one window.
async fn instrument_page(page: Page, sink: DiagnosticsSink) -> Result<(), FlowError> {
    page.execute(NetworkEnableParams::default())
        .await
        .map_err(|e| map_cdp_message(e.to_string()))?;

    // request_id -> (url, method) for failure rows, and the response
    // envelope held until loadingFinished supplies the body.
    let requests: Arc<StdMutex<HashMap<String, (String, String)>>> =
        Arc::new(StdMutex::new(HashMap::new()));
    let responses: Arc<StdMutex<HashMap<String, ResponseEnvelope>>> =
        Arc::new(StdMutex::new(HashMap::new()));

    let mut sent = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .map_err(|e| map_cdp_message(e.to_string()))?;
    let sent_sink = sink.clone();
    let sent_requests = requests.clone();
    tokio::spawn(async move {
        while let Some(event) = sent.next().await {
            let headers = serde_json::to_value(&event.request.headers)
                .unwrap_or(serde_json::Value::Null);
            sent_sink.record_request(
                &event.request.url,
                &event.request.method,
                &headers,
                event.request.post_data.as_deref(),
            );
            lock_unpoisoned(&sent_requests).insert(
                event.request_id.inner().clone(),
                (event.request.url.clone(), event.request.method.clone()),
            );
        }
    });

    let mut received = page
        .event_listener::<EventResponseReceived>()
        .await
        .map_err(|e| map_cdp_message(e.to_string()))?;
    let received_responses = responses.clone();
    tokio::spawn(async move {
        while let Some(event) = received.next().await {
            let envelope = ResponseEnvelope {
                url: event.response.url.clone(),
                status: event.response.status,
                status_text: event.response.status_text.clone(),
                headers: serde_json::to_value(&event.response.headers)
                    .unwrap_or(serde_json::Value::Null),
                mime_type: event.response.mime_type.clone(),
            };
            lock_unpoisoned(&received_responses)
                .insert(event.request_id.inner().clone(), envelope);
        }
    });

    let mut finished = page
        .event_listener::<EventLoadingFinished>()
        .await
        .map_err(|e| map_cdp_message(e.to_string()))?;
    let finished_sink = sink.clone();
    let finished_responses = responses.clone();
    let finished_page = page.clone();
    tokio::spawn(async move {
        while let Some(event) = finished.next().await {
            let envelope =
                lock_unpoisoned(&finished_responses).remove(event.request_id.inner());
            let Some(envelope) = envelope else { continue };

            let body = match finished_page
                .execute(GetResponseBodyParams::new(event.request_id.clone()))
                .await
            {
                Ok(reply) => {
                    let raw = if reply.result.base64_encoded {
                        BASE64.decode(&reply.result.body).unwrap_or_default()
                    } else {
                        reply.result.body.clone().into_bytes()
                    };
                    summarize_body(envelope.status, &envelope.mime_type, &raw)
                }
                Err(_) => summarize_body(envelope.status, &envelope.mime_type, b""),
            };
            finished_sink.record_response(
                &envelope.url,
                envelope.status,
                &envelope.status_text,
                &envelope.headers,
                &body,
            );
        }
    });

    let mut failed = page
        .event_listener::<EventLoadingFailed>()
        .await
        .map_err(|e| map_cdp_message(e.to_string()))?;
    let failed_sink = sink;
    let failed_requests = requests;
    tokio::spawn(async move {
        while let Some(event) = failed.next().await {
            let (url, method) = lock_unpoisoned(&failed_requests)
                .remove(event.request_id.inner())
                .unwrap_or_default();
            failed_sink.record_failure(&url, &method, &event.error_text);
        }
    });

    Ok(())
}

struct ResponseEnvelope {
    url: String,
    status: i64,
    status_text: String,
    headers: serde_json::Value,
    mime_type: String,
}

fn lock_unpoisoned<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// "Target closed"-family failures mean the window or its document went
/// away; everything else is a plain driver error.
fn map_cdp_message(message: String) -> FlowError {
    let lower = message.to_lowercase();
    if lower.contains("target closed")
        || lower.contains("session closed")
        || lower.contains("target not found")
        || lower.contains("browser closed")
        || lower.contains("connection closed")
    {
        FlowError::SurfaceClosed(message)
    } else {
        FlowError::Driver(message)
    }
}

/// One hop of the embed chain a surface was resolved through.
#[derive(Debug, Clone)]
struct CdpHop {
    container: Option<Matcher>,
    index: usize,
}

/// A window or embedded document, addressed as a chain of embed hops from
/// the window's root document.
#[derive(Clone)]
struct CdpSurface {
    page: Arc<Page>,
    hops: Vec<CdpHop>,
}

impl std::fmt::Debug for CdpSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdpSurface")
            .field("label", &self.label())
            .finish_non_exhaustive()
    }
}

// Script helpers shared by every query. Matchers arrive as their
// serde-serialized shape, e.g. {"Text":"业务"} or {"Css":"canvas"}.
const JS_HELPERS: &str = r#"
const __bbVisible = (el) => {
    if (!el || !el.getBoundingClientRect) return false;
    const rect = el.getBoundingClientRect();
    if (rect.width <= 0 || rect.height <= 0) return false;
    const view = el.ownerDocument.defaultView || window;
    const style = view.getComputedStyle(el);
    return style.display !== 'none' && style.visibility !== 'hidden' && style.opacity !== '0';
};
const __bbText = (el) => (el.innerText !== undefined ? el.innerText : (el.textContent || ''));
function __bbMatch(doc, m) {
    if (m.Css !== undefined) return Array.from(doc.querySelectorAll(m.Css));
    const all = Array.from(doc.querySelectorAll('*'));
    let matched = [];
    if (m.Role !== undefined) {
        const role = m.Role.toLowerCase();
        const implicit = { button: 'button', combobox: 'select', option: 'option', textbox: 'textarea' };
        return all.filter((el) => {
            const explicit = ((el.getAttribute && el.getAttribute('role')) || '').toLowerCase();
            if (explicit === role) return true;
            return implicit[role] === el.tagName.toLowerCase();
        });
    }
    if (m.Text !== undefined) {
        const needle = m.Text.toLowerCase();
        matched = all.filter((el) => __bbText(el).toLowerCase().includes(needle));
    } else if (m.ExactText !== undefined) {
        matched = all.filter((el) => __bbText(el).trim() === m.ExactText);
    } else if (m.TextBlock !== undefined) {
        // The target wraps extra markup: match on full text content and
        // keep document order so the wrapping container comes first.
        return all.filter((el) => {
            const tag = el.tagName.toLowerCase();
            if (tag === 'html' || tag === 'body') return false;
            return (el.textContent || '').trim() === m.TextBlock;
        });
    } else {
        return [];
    }
    // Keep the innermost matches: a text hit on an ancestor is noise.
    return matched.filter((el) => !matched.some((other) => other !== el && el.contains(other)));
}
function __bbEmbedDoc(doc, m, index) {
    if (!doc) return null;
    let scope = doc;
    if (m) {
        const containers = __bbMatch(doc, m).filter(__bbVisible);
        if (!containers.length) return null;
        scope = containers[0];
    }
    const embeds = scope.querySelectorAll('iframe, webview');
    const el = embeds[index];
    if (!el) return null;
    return el.contentDocument || null;
}
function __bbEmbedProbe(doc, m, index) {
    if (!doc) return 'gone';
    let scope = doc;
    if (m) {
        const containers = __bbMatch(doc, m).filter(__bbVisible);
        if (!containers.length) return 'missing';
        scope = containers[0];
    }
    const embeds = scope.querySelectorAll('iframe, webview');
    const el = embeds[index];
    if (!el) return 'missing';
    return el.contentDocument ? 'ready' : 'detached';
}
function __bbFrameOffset(doc) {
    let x = 0, y = 0;
    let view = doc.defaultView;
    while (view && view.frameElement) {
        const rect = view.frameElement.getBoundingClientRect();
        x += rect.left;
        y += rect.top;
        view = view.parent;
    }
    return { x, y };
}
"#;

impl CdpSurface {
    fn doc_expr(&self) -> String {
        let mut expr = String::from("document");
        for hop in &self.hops {
            let container = hop
                .container
                .as_ref()
                .and_then(|m| serde_json::to_string(m).ok())
                .unwrap_or_else(|| "null".to_string());
            expr = format!("__bbEmbedDoc({expr}, {container}, {})", hop.index);
        }
        expr
    }

    fn matcher_json(matcher: &Matcher) -> String {
        serde_json::to_string(matcher).unwrap_or_else(|_| "{}".to_string())
    }

    /// Run `body` with `doc` bound to this surface's document. The body
    /// must `return` its result.
    fn script(&self, body: &str) -> String {
        format!(
            "(() => {{ {JS_HELPERS}\nconst doc = {};\n{body} }})()",
            self.doc_expr()
        )
    }

    async fn eval_value(&self, script: &str) -> Result<serde_json::Value, FlowError> {
        let result = self
            .page
            .evaluate(script.to_string())
            .await
            .map_err(|e| map_cdp_message(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    fn element(&self, matcher: &Matcher, index: usize) -> Element {
        Element::new(Arc::new(CdpElement {
            surface: self.clone(),
            matcher: matcher.clone(),
            index,
        }))
    }
}

#[async_trait]
impl SurfaceImpl for CdpSurface {
    fn label(&self) -> String {
        let mut label = String::from("window");
        for hop in &self.hops {
            label.push_str(&format!("/embed[{}]", hop.index));
        }
        label
    }

    async fn url(&self) -> Result<Option<String>, FlowError> {
        if self.hops.is_empty() {
            return self
                .page
                .url()
                .await
                .map_err(|e| map_cdp_message(e.to_string()));
        }
        let script = self.script(
            "if (!doc) return null; \
             return doc.defaultView && doc.defaultView.location ? doc.defaultView.location.href : null;",
        );
        match self.eval_value(&script).await? {
            serde_json::Value::String(url) => Ok(Some(url)),
            _ => Ok(None),
        }
    }

    async fn visible_text(&self) -> Result<String, FlowError> {
        let script =
            self.script("if (!doc || !doc.body) return null; return __bbText(doc.body);");
        match self.eval_value(&script).await? {
            serde_json::Value::String(text) => Ok(text),
            _ => Err(FlowError::SurfaceClosed(format!(
                "{} has no document",
                self.label()
            ))),
        }
    }

    async fn count(&self, matcher: &Matcher) -> Result<usize, FlowError> {
        let body = format!(
            "if (!doc) return null; return __bbMatch(doc, {}).length;",
            Self::matcher_json(matcher)
        );
        let script = self.script(&body);
        match self.eval_value(&script).await? {
            serde_json::Value::Number(n) => Ok(n.as_u64().unwrap_or(0) as usize),
            _ => Err(FlowError::SurfaceClosed(format!(
                "{} has no document",
                self.label()
            ))),
        }
    }

    async fn find_all(&self, matcher: &Matcher) -> Result<Vec<Element>, FlowError> {
        let count = self.count(matcher).await?;
        Ok((0..count).map(|i| self.element(matcher, i)).collect())
    }

    async fn embedded(
        &self,
        container: Option<&Matcher>,
        index: usize,
    ) -> Result<EmbedProbe, FlowError> {
        let container_json = container
            .map(Self::matcher_json)
            .unwrap_or_else(|| "null".to_string());
        let body = format!("return __bbEmbedProbe(doc, {container_json}, {index});");
        let script = self.script(&body);
        let probe = self.eval_value(&script).await?;
        match probe.as_str() {
            Some("ready") => {
                let mut hops = self.hops.clone();
                hops.push(CdpHop {
                    container: container.cloned(),
                    index,
                });
                Ok(EmbedProbe::Ready(Surface::new(Arc::new(CdpSurface {
                    page: self.page.clone(),
                    hops,
                }))))
            }
            Some("detached") => Ok(EmbedProbe::ContentDetached),
            Some("missing") => Ok(EmbedProbe::Missing),
            _ => Err(FlowError::SurfaceClosed(format!(
                "{} has no document",
                self.label()
            ))),
        }
    }

    async fn settle(&self, idle_timeout: Duration) -> Result<(), FlowError> {
        // Document load, bounded.
        let load_deadline = tokio::time::Instant::now() + LOAD_TIMEOUT;
        loop {
            let script = self.script("return doc ? doc.readyState : null;");
            match self.eval_value(&script).await {
                Ok(value) if value.as_str() == Some("complete") => break,
                Ok(_) => {}
                Err(e) if e.is_surface_closed() => return Err(e),
                Err(e) => debug!(error = %e, "readyState probe failed"),
            }
            if tokio::time::Instant::now() >= load_deadline {
                debug!(surface = %self.label(), "load wait timed out, continuing");
                break;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        // Network idle: no new resource entries for half a second, bounded
        // by `idle_timeout` and tolerated to time out.
        let idle_deadline = tokio::time::Instant::now() + idle_timeout;
        let mut last_count: i64 = -1;
        loop {
            let script = self.script(
                "if (!doc || !doc.defaultView || !doc.defaultView.performance) return null; \
                 return doc.defaultView.performance.getEntriesByType('resource').length;",
            );
            let count = match self.eval_value(&script).await {
                Ok(value) => value.as_i64().unwrap_or(-1),
                Err(e) if e.is_surface_closed() => return Err(e),
                Err(_) => -1,
            };
            if count >= 0 && count == last_count {
                return Ok(());
            }
            last_count = count;
            if tokio::time::Instant::now() >= idle_deadline {
                debug!(surface = %self.label(), "network idle wait timed out, continuing");
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    async fn eval(&self, script: &str) -> Result<serde_json::Value, FlowError> {
        // Bind `document` to this surface's document so caller scripts
        // work unchanged inside embeds.
        let wrapped = self.script(&format!(
            "if (!doc) return null; return (function(document) {{ return ({script}); }})(doc);"
        ));
        self.eval_value(&wrapped).await
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, FlowError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(full_page)
            .build();
        self.page
            .screenshot(params)
            .await
            .map_err(|e| map_cdp_message(e.to_string()))
    }

    async fn is_closed(&self) -> bool {
        let script = self.script("return doc ? true : false;");
        match self.eval_value(&script).await {
            Ok(serde_json::Value::Bool(alive)) => !alive,
            Ok(_) => true,
            Err(_) => true,
        }
    }
}

#[derive(Deserialize)]
struct Point {
    x: f64,
    y: f64,
}

/// An element addressed as (matcher, index) within its surface; every
/// operation re-locates it so handles never go stale.
struct CdpElement {
    surface: CdpSurface,
    matcher: Matcher,
    index: usize,
}

impl std::fmt::Debug for CdpElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdpElement")
            .field("matcher", &self.matcher)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl CdpElement {
    fn locate_body(&self, tail: &str) -> String {
        format!(
            "if (!doc) return null; \
             const els = __bbMatch(doc, {}); \
             const el = els[{}]; \
             if (!el) return null; \
             {tail}",
            CdpSurface::matcher_json(&self.matcher),
            self.index
        )
    }

    /// Scroll the element into view and return its center in page
    /// coordinates, embed offsets included.
    async fn center(&self) -> Result<Point, FlowError> {
        let body = self.locate_body(
            "el.scrollIntoView({ block: 'center', inline: 'center' }); \
             const rect = el.getBoundingClientRect(); \
             const offset = __bbFrameOffset(el.ownerDocument); \
             return { x: offset.x + rect.left + rect.width / 2, y: offset.y + rect.top + rect.height / 2 };",
        );
        let script = self.surface.script(&body);
        let value = self.surface.eval_value(&script).await?;
        if value.is_null() {
            return Err(FlowError::ControlNotFound(format!(
                "{} no longer matches at index {}",
                self.matcher, self.index
            )));
        }
        serde_json::from_value(value)
            .map_err(|e| FlowError::Driver(format!("bad element coordinates: {e}")))
    }

    async fn dispatch_mouse(
        &self,
        kind: DispatchMouseEventType,
        x: f64,
        y: f64,
        button: Option<MouseButton>,
    ) -> Result<(), FlowError> {
        let mut builder = DispatchMouseEventParams::builder().r#type(kind).x(x).y(y);
        if let Some(button) = button {
            builder = builder.button(button).click_count(1);
        }
        let params = builder
            .build()
            .map_err(|e| FlowError::Driver(format!("mouse event build failed: {e}")))?;
        self.surface
            .page
            .execute(params)
            .await
            .map(|_| ())
            .map_err(|e| map_cdp_message(e.to_string()))
    }

    async fn dispatch_key(
        &self,
        kind: DispatchKeyEventType,
        key: &str,
        modifiers: i64,
    ) -> Result<(), FlowError> {
        let params = DispatchKeyEventParams::builder()
            .r#type(kind)
            .key(key)
            .modifiers(modifiers)
            .build()
            .map_err(|e| FlowError::Driver(format!("key event build failed: {e}")))?;
        self.surface
            .page
            .execute(params)
            .await
            .map(|_| ())
            .map_err(|e| map_cdp_message(e.to_string()))
    }

    async fn type_chars(&self, text: &str) -> Result<(), FlowError> {
        for c in text.chars() {
            let params = DispatchKeyEventParams::builder()
                .r#type(DispatchKeyEventType::Char)
                .text(c.to_string())
                .build()
                .map_err(|e| FlowError::Driver(format!("key event build failed: {e}")))?;
            self.surface
                .page
                .execute(params)
                .await
                .map(|_| ())
                .map_err(|e| map_cdp_message(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ElementImpl for CdpElement {
    fn describe(&self) -> String {
        format!("{}#{} in {}", self.matcher, self.index, self.surface.label())
    }

    async fn is_visible(&self) -> Result<bool, FlowError> {
        let body = self.locate_body("return __bbVisible(el);");
        let script = self.surface.script(&body);
        Ok(self
            .surface
            .eval_value(&script)
            .await?
            .as_bool()
            .unwrap_or(false))
    }

    async fn text(&self) -> Result<String, FlowError> {
        let body = self.locate_body("return __bbText(el);");
        let script = self.surface.script(&body);
        match self.surface.eval_value(&script).await? {
            serde_json::Value::String(text) => Ok(text),
            _ => Err(FlowError::ControlNotFound(format!(
                "{} no longer matches at index {}",
                self.matcher, self.index
            ))),
        }
    }

    async fn click(&self) -> Result<(), FlowError> {
        let point = self.center().await?;
        self.dispatch_mouse(DispatchMouseEventType::MouseMoved, point.x, point.y, None)
            .await?;
        self.dispatch_mouse(
            DispatchMouseEventType::MousePressed,
            point.x,
            point.y,
            Some(MouseButton::Left),
        )
        .await?;
        self.dispatch_mouse(
            DispatchMouseEventType::MouseReleased,
            point.x,
            point.y,
            Some(MouseButton::Left),
        )
        .await?;
        debug!(element = %self.describe(), "clicked");
        Ok(())
    }

    async fn fill(&self, text: &str) -> Result<(), FlowError> {
        // Focus, select everything, then type over the selection.
        self.click().await?;
        self.dispatch_key(DispatchKeyEventType::KeyDown, "a", 2).await?;
        self.dispatch_key(DispatchKeyEventType::KeyUp, "a", 2).await?;
        self.type_chars(text).await?;
        Ok(())
    }

    async fn press(&self, key: &str) -> Result<(), FlowError> {
        self.dispatch_key(DispatchKeyEventType::KeyDown, key, 0).await?;
        self.dispatch_key(DispatchKeyEventType::KeyUp, key, 0).await?;
        Ok(())
    }
}
