use crate::errors::FlowError;
use crate::selector::{CandidateList, Matcher};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment-provided run configuration.
///
/// Environment variable names are the suite's long-standing external
/// interface, so they stay as-is across reimplementations.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Path to the application executable (`ELECTRON_APP_PATH`).
    pub app_path: Option<PathBuf>,
    /// Environment profile name (`test_env`), selects `environments/.env.<profile>`.
    pub profile: String,
    /// Base URL for the web-flow variant (`BASEURL`).
    pub base_url: String,
    /// Keep the application running after the flow for manual inspection
    /// (`KEEP_APP_RUNNING=true`).
    pub keep_running: bool,
    /// DevTools debugging port used when launching the app
    /// (`REMOTE_DEBUGGING_PORT`).
    pub debug_port: u16,
}

impl FlowConfig {
    /// Load the `.env.<profile>` file (if present) and read the
    /// environment. Missing profile files are tolerated: explicit
    /// environment variables win either way.
    pub fn from_env() -> Self {
        let profile = std::env::var("test_env").unwrap_or_else(|_| "production".to_string());

        let env_file = Path::new("environments").join(format!(".env.{profile}"));
        match dotenvy::from_path_override(&env_file) {
            Ok(()) => info!(profile = %profile, file = %env_file.display(), "environment profile loaded"),
            Err(e) => warn!(file = %env_file.display(), error = %e, "no environment profile file, using process env"),
        }

        let app_path = std::env::var("ELECTRON_APP_PATH")
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        Self {
            app_path,
            profile,
            base_url: std::env::var("BASEURL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            keep_running: std::env::var("KEEP_APP_RUNNING").as_deref() == Ok("true"),
            debug_port: std::env::var("REMOTE_DEBUGGING_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(9222),
        }
    }
}

/// Test-data record, read once at suite load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowData {
    pub project_name: String,
    pub project_sub_name: String,
    /// Literal `YYYY-MM-DD` string, passed to the date picker verbatim.
    pub log_date: String,
    pub work_content: String,
    pub screenshots_dir: PathBuf,
}

impl FlowData {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| {
            FlowError::Config(format!("invalid test data file {}: {e}", path.display()))
        })
    }
}

/// Structural assumptions about the business UI, kept out of the navigation
/// code because UI structure is the most volatile part of the flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigatorLayout {
    /// Fallback chain for the business-area control.
    pub business_control: CandidateList,
    /// Container that hosts the project tab's embedded document.
    pub tab_panel: Matcher,
    /// Exact label of the management control inside the project embed.
    pub manage_label: String,
    /// Which embed under the project document hosts the management UI.
    /// The production shell renders a hidden helper embed first, so the
    /// management document is the second one.
    pub manage_embed_index: usize,
    /// Exact text of the log-entry container in the inner embed.
    pub log_entry_label: String,
}

impl Default for NavigatorLayout {
    fn default() -> Self {
        Self {
            business_control: CandidateList::parse(
                "text:业务, [title=\"业务\"], .business-menu, [data-test=\"business\"]",
            ),
            tab_panel: Matcher::role("tabpanel"),
            manage_label: "管理".to_string(),
            manage_embed_index: 1,
            log_entry_label: "项目日志填报".to_string(),
        }
    }
}

/// Form-field selectors and timings for the project-log form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormLayout {
    /// The project dropdown is the n-th combobox on the form.
    pub project_combobox_index: usize,
    /// Options rendered after the dropdown opens.
    pub option_role: Matcher,
    /// Date input wrapper.
    pub date_input: Matcher,
    /// Picker panel that opens on click; its nested input takes the literal date.
    pub date_panel: Matcher,
    /// Free-text work-content area.
    pub work_content: Matcher,
    /// Fallback chain for the submit control.
    pub submit_control: CandidateList,
    /// Settle delay after opening the dropdown, milliseconds.
    pub dropdown_settle_ms: u64,
}

impl Default for FormLayout {
    fn default() -> Self {
        Self {
            project_combobox_index: 2,
            option_role: Matcher::role("option"),
            date_input: Matcher::css("#dx_11181_riqi"),
            date_panel: Matcher::css(".ant-calendar-input-wrap"),
            work_content: Matcher::css("textarea"),
            submit_control: CandidateList::parse("text:提交, .ant-btn-primary"),
            dropdown_settle_ms: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_data_reads_camel_case_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project-log.json");
        std::fs::write(
            &path,
            r#"{
                "projectName": "贝贝项目",
                "projectSubName": "贝贝子项目",
                "logDate": "2024-06-01",
                "workContent": "日常巡检",
                "screenshotsDir": "screenshots"
            }"#,
        )
        .unwrap();

        let data = FlowData::load(&path).unwrap();
        assert_eq!(data.project_name, "贝贝项目");
        assert_eq!(data.log_date, "2024-06-01");
        assert_eq!(data.screenshots_dir, PathBuf::from("screenshots"));
    }

    #[test]
    fn flow_data_rejects_malformed_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{\"projectName\": 42}").unwrap();
        assert!(matches!(FlowData::load(&path), Err(FlowError::Config(_))));
    }

    #[test]
    fn default_layout_targets_second_manage_embed() {
        let layout = NavigatorLayout::default();
        assert_eq!(layout.manage_embed_index, 1);
        assert!(!layout.business_control.is_empty());
    }
}
