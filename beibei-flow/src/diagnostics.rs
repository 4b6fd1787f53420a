use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::warn;

const REQUEST_HEADER: &str = "time|url|method|headers|postData";
const FINISHED_HEADER: &str = "time|url|status|statusText|headers|body";
const FAILED_HEADER: &str = "time|url|method|errorText";

const REDIRECT_STATUSES: [i64; 5] = [301, 302, 303, 307, 308];
const BODY_TRUNCATE_AT: usize = 5000;

/// Append-only network diagnostics, one sink per run.
///
/// Three `|`-separated flat files record outbound requests, finished
/// responses and failed requests. The header line is written once if the
/// file does not exist yet. Recording is best-effort: failures are logged
/// and swallowed, never propagated into the workflow.
#[derive(Clone, Debug)]
pub struct DiagnosticsSink {
    inner: Arc<SinkInner>,
}

#[derive(Debug)]
struct SinkInner {
    request_log: PathBuf,
    finished_log: PathBuf,
    failed_log: PathBuf,
    // Serializes appends across the driver's event tasks
    lock: Mutex<()>,
}

impl DiagnosticsSink {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            inner: Arc::new(SinkInner {
                request_log: dir.join("request_log.csv"),
                finished_log: dir.join("requestfinished_log.csv"),
                failed_log: dir.join("requestfailed_log.csv"),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn request_log_path(&self) -> &Path {
        &self.inner.request_log
    }

    pub fn finished_log_path(&self) -> &Path {
        &self.inner.finished_log
    }

    pub fn failed_log_path(&self) -> &Path {
        &self.inner.failed_log
    }

    pub fn record_request(
        &self,
        url: &str,
        method: &str,
        headers: &serde_json::Value,
        post_data: Option<&str>,
    ) {
        let row = [
            now_iso(),
            url.to_string(),
            method.to_string(),
            headers.to_string(),
            post_data
                .map(|d| serde_json::Value::String(d.to_string()).to_string())
                .unwrap_or_default(),
        ]
        .join("|");
        self.append(&self.inner.request_log, REQUEST_HEADER, &row);
    }

    pub fn record_response(
        &self,
        url: &str,
        status: i64,
        status_text: &str,
        headers: &serde_json::Value,
        body: &str,
    ) {
        let row = [
            now_iso(),
            url.to_string(),
            status.to_string(),
            status_text.to_string(),
            headers.to_string(),
            serde_json::Value::String(body.to_string()).to_string(),
        ]
        .join("|");
        self.append(&self.inner.finished_log, FINISHED_HEADER, &row);
    }

    pub fn record_failure(&self, url: &str, method: &str, error_text: &str) {
        let row = [
            now_iso(),
            url.to_string(),
            method.to_string(),
            error_text.to_string(),
        ]
        .join("|");
        self.append(&self.inner.failed_log, FAILED_HEADER, &row);
    }

    fn append(&self, path: &Path, header: &str, row: &str) {
        let _guard = match self.inner.lock.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = append_row(path, header, row) {
            warn!(path = %path.display(), error = %e, "failed to append diagnostics row");
        }
    }
}

fn append_row(path: &Path, header: &str, row: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let needs_header = !path.exists();
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if needs_header {
        writeln!(file, "{header}")?;
    }
    writeln!(file, "{row}")?;
    Ok(())
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Condense a response body for the finished-requests log the same way the
/// suite always has: redirects carry no body, JSON is truncated, everything
/// else is summarized by content type and length.
pub fn summarize_body(status: i64, content_type: &str, body: &[u8]) -> String {
    if REDIRECT_STATUSES.contains(&status) {
        return "<redirect response: no body>".to_string();
    }
    if content_type.contains("application/json") {
        let text = String::from_utf8_lossy(body);
        if text.chars().count() > BODY_TRUNCATE_AT {
            let truncated: String = text.chars().take(BODY_TRUNCATE_AT).collect();
            return format!("{truncated}...");
        }
        return text.into_owned();
    }
    format!("<{content_type}> length: {}", body.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiagnosticsSink::new(dir.path());

        sink.record_failure("http://a", "GET", "net::ERR_FAILED");
        sink.record_failure("http://b", "POST", "net::ERR_ABORTED");

        let content = std::fs::read_to_string(sink.failed_log_path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], FAILED_HEADER);
        assert!(lines[1].contains("http://a"));
        assert!(lines[2].contains("net::ERR_ABORTED"));
        assert_eq!(
            content.matches(FAILED_HEADER).count(),
            1,
            "header must not repeat"
        );
    }

    #[test]
    fn request_row_is_pipe_separated() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiagnosticsSink::new(dir.path());

        let headers = serde_json::json!({"accept": "application/json"});
        sink.record_request("http://api/login", "POST", &headers, Some("a=1"));

        let content = std::fs::read_to_string(sink.request_log_path()).unwrap();
        let row = content.lines().nth(1).unwrap();
        let fields: Vec<_> = row.split('|').collect();
        assert_eq!(fields.len(), 5);
        assert_eq!(fields[1], "http://api/login");
        assert_eq!(fields[2], "POST");
        assert_eq!(fields[4], "\"a=1\"");
    }

    #[test]
    fn json_bodies_truncate_at_limit() {
        let long = "x".repeat(6000);
        let summary = summarize_body(200, "application/json; charset=utf-8", long.as_bytes());
        assert_eq!(summary.chars().count(), 5003);
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn redirects_and_binary_bodies_are_summarized() {
        assert_eq!(
            summarize_body(302, "text/html", b"ignored"),
            "<redirect response: no body>"
        );
        assert_eq!(
            summarize_body(200, "image/png", &[0u8; 128]),
            "<image/png> length: 128"
        );
    }
}
