use crate::config::FormLayout;
use crate::errors::FlowError;
use crate::observer::{FlowObserver, StepOutcome};
use crate::tests::mock::{el, MockClock, MockElement, MockSurface};
use crate::workflow::form::FormFiller;
use std::sync::Arc;

struct FormParts {
    comboboxes: Vec<MockElement>,
    option: MockElement,
    panel_input: MockElement,
    textarea: MockElement,
    submit: MockElement,
}

fn full_form() -> (MockSurface, FormParts) {
    let form = MockSurface::new("project");
    let comboboxes = (0..3)
        .map(|i| form.add_element(el(&format!("combobox-{i}")).with_role("combobox")))
        .collect();
    let option = form.add_element(el("贝贝子项目").with_role("option"));
    form.add_element(el("").with_css("#dx_11181_riqi"));
    form.add_element(el("").with_css(".ant-calendar-input-wrap"));
    let panel_input = form.add_element(el("").with_css(".ant-calendar-input-wrap input"));
    let textarea = form.add_element(el("").with_css("textarea"));
    let submit = form.add_element(el("提交"));
    (
        form,
        FormParts {
            comboboxes,
            option,
            panel_input,
            textarea,
            submit,
        },
    )
}

fn filler(observer: &FlowObserver) -> FormFiller {
    FormFiller::new(
        FormLayout::default(),
        Arc::new(MockClock::new()),
        observer.clone(),
    )
}

#[tokio::test]
async fn fill_form_populates_all_fields_and_captures_after_success() {
    crate::tests::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let observer = FlowObserver::new(dir.path());
    let window = MockSurface::new("window");
    let (form, parts) = full_form();

    let shot = observer.screenshot_path("step7-form-filled");
    filler(&observer)
        .fill_form(
            &window.as_surface(),
            &form.as_surface(),
            "贝贝子项目",
            "2024-06-01",
            "日常巡检",
            &shot,
        )
        .await
        .expect("all fields fill");

    assert_eq!(parts.option.clicks(), 1);
    assert_eq!(parts.panel_input.fills(), vec!["2024-06-01"]);
    assert_eq!(parts.panel_input.presses(), vec!["Enter"]);
    assert_eq!(parts.textarea.fills(), vec!["日常巡检"]);
    assert!(shot.exists(), "form-filled screenshot must be captured");

    let records = observer.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, StepOutcome::Succeeded);
}

#[tokio::test]
async fn one_failing_field_does_not_stop_the_others() {
    let dir = tempfile::tempdir().unwrap();
    let observer = FlowObserver::new(dir.path());
    let window = MockSurface::new("window");

    // Same form, but without the work-content textarea.
    let form = MockSurface::new("project");
    for i in 0..3 {
        form.add_element(el(&format!("combobox-{i}")).with_role("combobox"));
    }
    let option = form.add_element(el("贝贝子项目").with_role("option"));
    form.add_element(el("").with_css("#dx_11181_riqi"));
    form.add_element(el("").with_css(".ant-calendar-input-wrap"));
    let panel_input = form.add_element(el("").with_css(".ant-calendar-input-wrap input"));

    let shot = observer.screenshot_path("step7-form-filled");
    let err = filler(&observer)
        .fill_form(
            &window.as_surface(),
            &form.as_surface(),
            "贝贝子项目",
            "2024-06-01",
            "日常巡检",
            &shot,
        )
        .await
        .expect_err("missing textarea fails the aggregate");
    assert!(matches!(err, FlowError::StepFailed(_)));
    assert!(err.to_string().contains("work content"));

    // Earlier fields were still attempted.
    assert_eq!(option.clicks(), 1);
    assert_eq!(panel_input.fills(), vec!["2024-06-01"]);

    // No success screenshot, but an error capture at the derived path.
    assert!(!shot.exists());
    assert!(dir.path().join("step7-form-filled-error.png").exists());
}

#[tokio::test]
async fn date_fallback_runs_exactly_once_and_can_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let observer = FlowObserver::new(dir.path());
    let window = MockSurface::new("window");
    // No date widgets at all: the primary picker path fails.
    let form = MockSurface::new("project");
    form.push_eval_result(serde_json::Value::Bool(true));

    let ok = filler(&observer)
        .select_date(&window.as_surface(), &form.as_surface(), "2024-06-01")
        .await;
    assert!(ok, "scripted fallback set the date");
    assert_eq!(form.eval_calls(), 1, "fallback must run exactly once");
}

#[tokio::test]
async fn date_fallback_failure_fails_the_operation_after_one_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let observer = FlowObserver::new(dir.path());
    let window = MockSurface::new("window");
    let form = MockSurface::new("project");
    form.push_eval_result(serde_json::Value::Bool(false));

    let ok = filler(&observer)
        .select_date(&window.as_surface(), &form.as_surface(), "2024-06-01")
        .await;
    assert!(!ok);
    assert_eq!(form.eval_calls(), 1, "no second fallback attempt");
    assert!(
        dir.path().join("date-selection-failed.png").exists(),
        "date failure leaves a diagnostic screenshot"
    );
}

#[tokio::test]
async fn project_select_uses_the_configured_combobox() {
    let dir = tempfile::tempdir().unwrap();
    let observer = FlowObserver::new(dir.path());
    let (form, parts) = full_form();

    let ok = filler(&observer)
        .select_project(&form.as_surface(), "贝贝子项目")
        .await;
    assert!(ok);
    assert_eq!(parts.comboboxes[2].clicks(), 1, "third combobox is the project field");
    assert_eq!(parts.comboboxes[0].clicks(), 0);
    assert_eq!(parts.comboboxes[1].clicks(), 0);
}

#[tokio::test]
async fn submit_clicks_the_first_visible_candidate() {
    let dir = tempfile::tempdir().unwrap();
    let observer = FlowObserver::new(dir.path());
    let (form, parts) = full_form();

    filler(&observer)
        .submit(&form.as_surface())
        .await
        .expect("submit control present");
    assert_eq!(parts.submit.clicks(), 1);
}
