//! Contact form scenario
//!
//! Stages run strictly in order and each one translates its own failure:
//!
//! ```text
//! navigate -> await fields -> fill -> submit + race -> resolve outcome
//!                                                          |
//!            (any abort) ----------------------------> close page -> complete
//! ```
//!
//! The only concurrency is the race after submit: the confirmation and the
//! validation-error waits run together and the first one to resolve wins.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use aaft_common::{
    CallbackTransport, CompletedStep, CompletionExtras, LogCode, StepReport, StepSettings,
};
use futures::FutureExt;
use tracing::debug;

use crate::browser::{bounded_wait, BrowserPage};
use crate::error::StageError;

/// Name under which the confirmation check is reported
pub const CONFIRMATION_ASSERTION: &str = "Expected confirmation text found";

const UNEXPECTED_ERROR: &str = "Unexpected error during contact form scenario";

/// Values typed into the form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeValues {
    pub name: String,
    pub email: String,
    pub message: String,
}

impl Default for ProbeValues {
    fn default() -> Self {
        Self {
            name: "Test User".to_string(),
            email: "test@example.com".to_string(),
            message: "Hello".to_string(),
        }
    }
}

/// Per-operation timeouts; none of them is shared across stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScenarioTimeouts {
    pub navigation: Duration,
    /// Applied to each required field separately
    pub field: Duration,
    /// Applied to each of the two raced waits separately
    pub outcome: Duration,
}

impl Default for ScenarioTimeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(30),
            field: Duration::from_secs(5),
            outcome: Duration::from_secs(10),
        }
    }
}

/// Terminal UI state reached after submitting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Confirmation,
    ValidationError,
    Unresolved,
}

pub struct ContactFormScenario<'a> {
    settings: &'a StepSettings,
    timeouts: ScenarioTimeouts,
    probe: ProbeValues,
}

impl<'a> ContactFormScenario<'a> {
    pub fn new(settings: &'a StepSettings) -> Self {
        Self {
            settings,
            timeouts: ScenarioTimeouts::default(),
            probe: ProbeValues::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: ScenarioTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_probe_values(mut self, probe: ProbeValues) -> Self {
        self.probe = probe;
        self
    }

    /// Run every stage against `page`, release the page and deliver the
    /// report. Always produces a completed step.
    pub async fn execute(
        &self,
        page: &dyn BrowserPage,
        mut report: StepReport,
        transport: &dyn CallbackTransport,
        extras: CompletionExtras,
    ) -> CompletedStep {
        let stages = AssertUnwindSafe(self.run_stages(page, &mut report))
            .catch_unwind()
            .await;

        match stages {
            Ok(Ok(())) => {}
            Ok(Err(e)) => report.fail(e.to_string()),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<String>()
                    .map(String::as_str)
                    .or_else(|| panic.downcast_ref::<&str>().copied())
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or(UNEXPECTED_ERROR)
                    .to_string();
                report.fail(message);
            }
        }

        if let Err(e) = page.close().await {
            report.add_log(LogCode::Warning, format!("Failed to close page: {}", e));
        }

        report.complete(transport, extras).await
    }

    /// Stages 1 to 5. An `Err` aborts the remaining stages.
    pub async fn run_stages(
        &self,
        page: &dyn BrowserPage,
        report: &mut StepReport,
    ) -> Result<(), StageError> {
        self.navigate(page, report).await?;
        self.await_fields(page, report).await?;
        self.fill(page, report).await?;
        let outcome = self.submit(page, report).await?;
        self.resolve(page, report, outcome).await;
        Ok(())
    }

    async fn navigate(&self, page: &dyn BrowserPage, report: &mut StepReport) -> Result<(), StageError> {
        let url = &self.settings.target_url;
        page.goto(url, self.timeouts.navigation)
            .await
            .map_err(StageError::Navigation)?;
        report.add_log(LogCode::Info, format!("Navigated to {}", url));
        Ok(())
    }

    fn required_fields(&self) -> [(&'static str, &str); 4] {
        let selectors = &self.settings.selectors;
        [
            ("name", selectors.name_selector.as_str()),
            ("email", selectors.email_selector.as_str()),
            ("message", selectors.message_selector.as_str()),
            ("submit", selectors.submit_selector.as_str()),
        ]
    }

    async fn await_fields(&self, page: &dyn BrowserPage, report: &mut StepReport) -> Result<(), StageError> {
        let mut missing = Vec::new();
        for (field, selector) in self.required_fields() {
            if let Err(e) = bounded_wait(page, selector, self.timeouts.field).await {
                debug!("Field {} ({}) not ready: {}", field, selector, e);
                missing.push(format!("{} ({})", field, selector));
            }
        }

        if !missing.is_empty() {
            return Err(StageError::FieldsNotFound(missing));
        }
        report.add_log(LogCode::Info, "All required form fields are present");
        Ok(())
    }

    async fn fill(&self, page: &dyn BrowserPage, report: &mut StepReport) -> Result<(), StageError> {
        let selectors = &self.settings.selectors;
        let values = [
            ("name", selectors.name_selector.as_str(), self.probe.name.as_str()),
            ("email", selectors.email_selector.as_str(), self.probe.email.as_str()),
            ("message", selectors.message_selector.as_str(), self.probe.message.as_str()),
        ];

        for (field, selector, value) in values {
            page.fill(selector, value)
                .await
                .map_err(|source| StageError::Fill { field, source })?;
        }
        report.add_log(LogCode::Info, "Filled name, email and message");
        Ok(())
    }

    async fn submit(&self, page: &dyn BrowserPage, report: &mut StepReport) -> Result<Outcome, StageError> {
        let selectors = &self.settings.selectors;
        page.click(&selectors.submit_selector)
            .await
            .map_err(StageError::Submit)?;
        report.add_log(LogCode::Info, "Form submitted");

        match self.race_outcome(page).await {
            Outcome::Unresolved => Err(StageError::NoResponse {
                confirmation: selectors.confirmation_selector.clone(),
                validation: selectors.validation_selector.clone(),
                after: self.timeouts.outcome,
            }),
            outcome => Ok(outcome),
        }
    }

    /// Race the two terminal states. A wait that fails drops out of the race;
    /// the loser is dropped without being awaited.
    async fn race_outcome(&self, page: &dyn BrowserPage) -> Outcome {
        let selectors = &self.settings.selectors;
        let confirmation = bounded_wait(page, &selectors.confirmation_selector, self.timeouts.outcome);
        let validation = bounded_wait(page, &selectors.validation_selector, self.timeouts.outcome);
        tokio::pin!(confirmation, validation);

        let mut confirmation_open = true;
        let mut validation_open = true;

        loop {
            tokio::select! {
                result = &mut confirmation, if confirmation_open => match result {
                    Ok(()) => return Outcome::Confirmation,
                    Err(e) => {
                        debug!("Confirmation wait ended: {}", e);
                        confirmation_open = false;
                    }
                },
                result = &mut validation, if validation_open => match result {
                    Ok(()) => return Outcome::ValidationError,
                    Err(e) => {
                        debug!("Validation wait ended: {}", e);
                        validation_open = false;
                    }
                },
                else => return Outcome::Unresolved,
            }
        }
    }

    async fn resolve(&self, page: &dyn BrowserPage, report: &mut StepReport, outcome: Outcome) {
        match outcome {
            Outcome::ValidationError => {
                report.add_log(LogCode::Warning, "Form returned a validation error");
                match page.inner_text(&self.settings.selectors.validation_selector).await {
                    Ok(text) => report.fail(text),
                    Err(e) => report.fail(format!("Validation error text unavailable: {}", e)),
                }
            }
            Outcome::Confirmation => {
                let expected = &self.settings.expected_text;
                let found = match page.inner_text("body").await {
                    Ok(text) => text.contains(expected.as_str()),
                    Err(e) => {
                        report.add_log(LogCode::Error, format!("Failed to read page text: {}", e));
                        false
                    }
                };
                report.add_assertion(CONFIRMATION_ASSERTION, found);
                if found {
                    report.add_log(LogCode::Info, format!("Found expected text '{}'", expected));
                } else {
                    report.add_log(LogCode::Error, format!("Expected text '{}' not found on page", expected));
                }
            }
            Outcome::Unresolved => report.fail("Unknown outcome after submit"),
        }
    }
}

