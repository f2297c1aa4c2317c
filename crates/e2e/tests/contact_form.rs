//! Contact form scenario tests against a scripted page
//!
//! Time is paused, so timeouts elapse instantly and deterministically.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use aaft_common::callback::{CallbackRequest, CallbackResponse};
use aaft_common::{
    CallbackTransport, CompletedStep, DeliveryError, DeliveryOutcome, LogCode, StepSettings,
    StepStatus,
};
use aaft_e2e::config::RunnerConfig;
use aaft_e2e::{BrowserPage, E2eError, E2eResult, StepRunner, CONFIRMATION_ASSERTION};
use async_trait::async_trait;
use serde_json::Value;
use test_case::test_case;

const CONFIRMATION: &str = ".gform_confirmation_message";
const VALIDATION: &str = ".gform_validation_errors";
const FORM_FIELDS: [&str; 4] = ["#input_1_1", "#input_1_3", "#input_1_4", "#gform_submit_button_1"];

/// Page whose elements appear after fixed delays
#[derive(Default)]
struct ScriptedPage {
    appears_after: HashMap<String, Duration>,
    texts: HashMap<String, String>,
    fail_goto: bool,
    fail_fill: Option<String>,
    panic_on_text: bool,
    calls: Mutex<Vec<String>>,
    closed: AtomicUsize,
}

impl ScriptedPage {
    /// A form whose fields are present right away
    fn form() -> Self {
        let mut page = Self::default();
        for selector in FORM_FIELDS {
            page.appears_after.insert(selector.to_string(), Duration::ZERO);
        }
        page
    }

    fn showing(mut self, selector: &str, after: Duration) -> Self {
        self.appears_after.insert(selector.to_string(), after);
        self
    }

    fn without(mut self, selector: &str) -> Self {
        self.appears_after.remove(selector);
        self
    }

    fn with_text(mut self, selector: &str, text: &str) -> Self {
        self.texts.insert(selector.to_string(), text.to_string());
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl BrowserPage for ScriptedPage {
    async fn goto(&self, url: &str, _timeout: Duration) -> E2eResult<()> {
        self.record(format!("goto:{}", url));
        if self.fail_goto {
            return Err(E2eError::Playwright("net::ERR_NAME_NOT_RESOLVED".to_string()));
        }
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> E2eResult<()> {
        self.record(format!("wait:{}", selector));
        match self.appears_after.get(selector) {
            Some(after) if *after <= timeout => {
                tokio::time::sleep(*after).await;
                Ok(())
            }
            _ => {
                tokio::time::sleep(timeout).await;
                Err(E2eError::Timeout {
                    target: selector.to_string(),
                    after: timeout,
                })
            }
        }
    }

    async fn fill(&self, selector: &str, value: &str) -> E2eResult<()> {
        self.record(format!("fill:{}={}", selector, value));
        if self.fail_fill.as_deref() == Some(selector) {
            return Err(E2eError::Playwright("element is not editable".to_string()));
        }
        Ok(())
    }

    async fn click(&self, selector: &str) -> E2eResult<()> {
        self.record(format!("click:{}", selector));
        Ok(())
    }

    async fn inner_text(&self, selector: &str) -> E2eResult<String> {
        self.record(format!("text:{}", selector));
        if self.panic_on_text {
            panic!("page crashed while reading {}", selector);
        }
        Ok(self.texts.get(selector).cloned().unwrap_or_default())
    }

    async fn close(&self) -> E2eResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingTransport {
    requests: Mutex<Vec<CallbackRequest>>,
}

impl RecordingTransport {
    fn bodies(&self) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| serde_json::from_str(&r.body).unwrap())
            .collect()
    }
}

#[async_trait]
impl CallbackTransport for RecordingTransport {
    async fn post(&self, request: &CallbackRequest) -> Result<CallbackResponse, DeliveryError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(CallbackResponse {
            status: 200,
            body: "{\"ok\":true}".to_string(),
        })
    }
}

fn runner(expected_text: &str, callback: Option<&str>) -> StepRunner {
    let mut config = RunnerConfig::new(StepSettings {
        test_id: "t-1".to_string(),
        step_id: "s-1".to_string(),
        step_class_name: "ContactFormStep".to_string(),
        callback_url: callback.map(String::from),
        target_url: "https://example.com/contact".to_string(),
        expected_text: expected_text.to_string(),
        ..Default::default()
    });
    config.secret_token = "tok".to_string();
    StepRunner::new(config)
}

async fn run(page: &ScriptedPage) -> (CompletedStep, RecordingTransport) {
    let transport = RecordingTransport::default();
    let completed = runner("Thank you", Some("https://aaft.example.com/cb"))
        .run_with_page(page, &transport)
        .await;
    (completed, transport)
}

fn log_text(completed: &CompletedStep) -> String {
    completed
        .report
        .logs()
        .iter()
        .map(|l| l.message.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[tokio::test(start_paused = true)]
async fn confirmation_with_expected_text_passes() {
    let page = ScriptedPage::form()
        .showing(CONFIRMATION, Duration::from_secs(2))
        .with_text("body", "Contact us\nThank you for your message!");

    let (completed, transport) = run(&page).await;

    assert_eq!(completed.report.status(), StepStatus::Passed);
    assert_eq!(completed.report.assertions().len(), 1);
    assert_eq!(completed.report.assertions()[0].name, CONFIRMATION_ASSERTION);
    assert!(completed.report.assertions()[0].passed);
    assert_eq!(completed.delivery, DeliveryOutcome::Delivered { status: 200 });
    assert_eq!(page.closed.load(Ordering::SeqCst), 1);

    let bodies = transport.bodies();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["status"], "passed");
    assert_eq!(bodies[0]["assertions"][0]["name"], "Expected confirmation text found");
    assert_eq!(bodies[0]["assertions"][0]["passed"], true);
}

#[test_case("Thank you for your message", "Thank you", true ; "exact substring")]
#[test_case("thank you for your message", "Thank you", false ; "case sensitive")]
#[test_case("Message received", "Thank you", false ; "absent")]
#[tokio::test(start_paused = true)]
async fn confirmation_text_check(body: &str, expected: &str, passes: bool) {
    let page = ScriptedPage::form()
        .showing(CONFIRMATION, Duration::from_millis(500))
        .with_text("body", body);
    let transport = RecordingTransport::default();

    let completed = runner(expected, Some("https://aaft.example.com/cb"))
        .run_with_page(&page, &transport)
        .await;

    assert_eq!(completed.report.assertions()[0].passed, passes);
    let expected_status = if passes { StepStatus::Passed } else { StepStatus::Failed };
    assert_eq!(completed.report.status(), expected_status);
}

#[tokio::test(start_paused = true)]
async fn missing_expected_text_fails_the_run() {
    let page = ScriptedPage::form()
        .showing(CONFIRMATION, Duration::from_secs(1))
        .with_text("body", "Your submission was received.");

    let (completed, transport) = run(&page).await;

    assert_eq!(completed.report.status(), StepStatus::Failed);
    assert!(!completed.report.assertions()[0].passed);
    assert!(log_text(&completed).contains("Expected text 'Thank you' not found"));
    assert_eq!(transport.bodies()[0]["status"], "failed");
}

#[tokio::test(start_paused = true)]
async fn validation_error_fails_without_assertion() {
    let page = ScriptedPage::form()
        .showing(VALIDATION, Duration::from_secs(1))
        .with_text(VALIDATION, "There was a problem with your submission. Email is required.");

    let (completed, transport) = run(&page).await;

    assert_eq!(completed.report.status(), StepStatus::Failed);
    assert!(completed.report.assertions().is_empty());
    assert!(completed
        .report
        .logs()
        .iter()
        .any(|l| l.code == LogCode::Error
            && l.message == "There was a problem with your submission. Email is required."));
    assert!(!page.calls().contains(&"text:body".to_string()));
    assert_eq!(page.closed.load(Ordering::SeqCst), 1);
    assert_eq!(transport.bodies().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn first_terminal_state_wins_the_race() {
    let page = ScriptedPage::form()
        .showing(VALIDATION, Duration::from_secs(3))
        .showing(CONFIRMATION, Duration::from_secs(1))
        .with_text("body", "Thank you");
    let (completed, _) = run(&page).await;
    assert_eq!(completed.report.status(), StepStatus::Passed);

    let page = ScriptedPage::form()
        .showing(VALIDATION, Duration::from_secs(1))
        .showing(CONFIRMATION, Duration::from_secs(3))
        .with_text("body", "Thank you")
        .with_text(VALIDATION, "Invalid email");
    let (completed, _) = run(&page).await;
    assert_eq!(completed.report.status(), StepStatus::Failed);
    assert!(completed.report.assertions().is_empty());
    assert!(log_text(&completed).contains("Invalid email"));
}

#[tokio::test(start_paused = true)]
async fn no_response_still_closes_and_delivers() {
    let page = ScriptedPage::form().with_text("body", "Thank you");

    let started = tokio::time::Instant::now();
    let (completed, transport) = run(&page).await;

    assert_eq!(completed.report.status(), StepStatus::Failed);
    assert!(log_text(&completed).to_lowercase().contains("no response"));
    assert!(completed.report.assertions().is_empty());
    assert_eq!(page.closed.load(Ordering::SeqCst), 1);
    assert_eq!(transport.bodies().len(), 1);
    assert_eq!(transport.bodies()[0]["status"], "failed");
    // Both waits run side by side on their own 10s budget.
    assert!(started.elapsed() < Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn navigation_failure_aborts_remaining_stages() {
    let page = ScriptedPage {
        fail_goto: true,
        ..ScriptedPage::form()
    };

    let (completed, transport) = run(&page).await;

    assert_eq!(completed.report.status(), StepStatus::Failed);
    assert!(log_text(&completed).contains("Navigation failed: Playwright error: net::ERR_NAME_NOT_RESOLVED"));
    assert_eq!(page.calls(), vec!["goto:https://example.com/contact".to_string()]);
    assert_eq!(page.closed.load(Ordering::SeqCst), 1);
    assert_eq!(transport.bodies().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_fields_are_named_and_waited_independently() {
    let page = ScriptedPage::form()
        .without("#input_1_3")
        .without("#gform_submit_button_1");

    let started = tokio::time::Instant::now();
    let (completed, _) = run(&page).await;

    assert_eq!(completed.report.status(), StepStatus::Failed);
    let logs = log_text(&completed);
    assert!(logs.contains(
        "Required field(s) not found: email (#input_1_3), submit (#gform_submit_button_1)"
    ));
    // Each missing field used its own 5s timeout.
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert!(!page.calls().iter().any(|c| c.starts_with("fill:")));
    assert_eq!(page.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn probe_values_are_filled_in_order() {
    let page = ScriptedPage::form()
        .showing(CONFIRMATION, Duration::ZERO)
        .with_text("body", "Thank you");

    run(&page).await;

    let fills: Vec<String> = page
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("fill:"))
        .collect();
    assert_eq!(
        fills,
        vec![
            "fill:#input_1_1=Test User".to_string(),
            "fill:#input_1_3=test@example.com".to_string(),
            "fill:#input_1_4=Hello".to_string(),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn fill_failure_is_attributed_to_field() {
    let page = ScriptedPage {
        fail_fill: Some("#input_1_3".to_string()),
        ..ScriptedPage::form()
    };

    let (completed, _) = run(&page).await;

    assert_eq!(completed.report.status(), StepStatus::Failed);
    assert!(log_text(&completed).contains("Fill failed for email"));
    assert!(!page.calls().iter().any(|c| c.starts_with("click:")));
}

#[tokio::test(start_paused = true)]
async fn unexpected_panic_is_reported() {
    let page = ScriptedPage {
        panic_on_text: true,
        ..ScriptedPage::form().showing(CONFIRMATION, Duration::ZERO)
    };

    let (completed, transport) = run(&page).await;

    assert_eq!(completed.report.status(), StepStatus::Failed);
    assert!(log_text(&completed).contains("page crashed while reading body"));
    assert_eq!(page.closed.load(Ordering::SeqCst), 1);
    assert_eq!(transport.bodies().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn passing_scenario_without_callback_is_failed() {
    let page = ScriptedPage::form()
        .showing(CONFIRMATION, Duration::ZERO)
        .with_text("body", "Thank you");
    let transport = RecordingTransport::default();

    let completed = runner("Thank you", None).run_with_page(&page, &transport).await;

    assert!(completed.report.assertions()[0].passed);
    assert_eq!(completed.report.status(), StepStatus::Failed);
    assert_eq!(completed.delivery, DeliveryOutcome::NotConfigured);
    assert!(transport.bodies().is_empty());
}
