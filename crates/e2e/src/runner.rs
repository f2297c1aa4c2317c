//! Step runner: launches the browser, runs the scenario and reports

use std::path::{Path, PathBuf};
use std::time::Instant;

use aaft_common::{
    CallbackTransport, CompletedStep, CompletionExtras, HttpTransport, LogCode, StepReport,
    StepStatus,
};
use serde_json::json;
use tracing::{error, info};

use crate::browser::BrowserPage;
use crate::config::RunnerConfig;
use crate::error::{E2eResult, StageError};
use crate::playwright::PlaywrightPage;
use crate::scenario::ContactFormScenario;

pub struct StepRunner {
    config: RunnerConfig,
}

impl StepRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Fresh result aggregate for this run
    pub fn new_report(&self) -> StepReport {
        let settings = &self.config.settings;
        let mut report = StepReport::new(settings)
            .with_context(self.config.context.clone())
            .with_secret_token(self.config.secret_token.clone());

        report.add_log(
            LogCode::Info,
            format!(
                "Running contact form step against {} (script: {})",
                settings.target_url,
                settings.script_ref.as_deref().unwrap_or("default")
            ),
        );
        report
    }

    /// Run the step with Playwright and the HTTP callback.
    ///
    /// Only fails if the callback client cannot be built; every scenario
    /// problem ends up in the returned report instead.
    pub async fn run(&self) -> E2eResult<CompletedStep> {
        let transport = HttpTransport::new(self.config.callback_timeout)?;

        let completed = match PlaywrightPage::launch(&self.config.playwright).await {
            Ok(page) => self.run_with_page(&page, &transport).await,
            Err(e) => {
                let start = Instant::now();
                let mut report = self.new_report();
                report.fail(StageError::Launch(e).to_string());
                let completed = report.complete(&transport, CompletionExtras::default()).await;
                log_summary(&completed, start);
                completed
            }
        };

        if let Some(path) = &self.config.output {
            if let Err(e) = write_results(path, &completed) {
                error!("Failed to write report to {}: {}", path.display(), e);
            }
        }

        Ok(completed)
    }

    /// Run the scenario on an already opened page.
    pub async fn run_with_page(
        &self,
        page: &dyn BrowserPage,
        transport: &dyn CallbackTransport,
    ) -> CompletedStep {
        let start = Instant::now();
        let scenario = ContactFormScenario::new(&self.config.settings)
            .with_timeouts(self.config.timeouts)
            .with_probe_values(self.config.probe.clone());

        let completed = scenario
            .execute(page, self.new_report(), transport, CompletionExtras::default())
            .await;

        log_summary(&completed, start);
        completed
    }
}

fn log_summary(completed: &CompletedStep, start: Instant) {
    let report = &completed.report;
    let failed_assertions = report.assertions().iter().filter(|a| !a.passed).count();
    let duration_ms = start.elapsed().as_millis() as u64;

    let line = format!(
        "{} {} / {}: {} ({} assertion(s), {} failed; delivery {}; {} ms)",
        if report.status() == StepStatus::Passed { "✓" } else { "✗" },
        report.test_id(),
        report.step_id(),
        report.status(),
        report.assertions().len(),
        failed_assertions,
        completed.delivery,
        duration_ms
    );
    if report.status() == StepStatus::Passed {
        info!("{}", line);
    } else {
        error!("{}", line);
    }
}

/// Write the final report, including entries logged after delivery.
pub fn write_results(path: &Path, completed: &CompletedStep) -> E2eResult<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let document = json!({
        "report": completed.report.to_payload(),
        "delivery": completed.delivery,
    });
    std::fs::write(path, serde_json::to_string_pretty(&document)?)?;

    info!("Report written to: {}", path.display());
    Ok(path.to_path_buf())
}
