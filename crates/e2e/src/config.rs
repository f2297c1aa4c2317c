//! Step configuration from flags and environment
//!
//! The dispatching harness passes everything through the environment. It is
//! read once here into a [`RunnerConfig`]; nothing downstream looks at the
//! process environment again.

use std::path::PathBuf;
use std::time::Duration;

use aaft_common::callback::normalize_secret;
use aaft_common::{decode_client_data, RunContext, StepSettings};
use clap::Parser;

use crate::playwright::{Browser, PlaywrightConfig};
use crate::scenario::{ProbeValues, ScenarioTimeouts};

#[derive(Parser, Debug, Clone)]
#[command(name = "aaft-step")]
#[command(about = "Contact form acceptance step reporting to an AAFT orchestrator")]
#[command(version)]
pub struct Args {
    /// Base64-encoded JSON settings bundle (client_payload.data)
    #[arg(long, env = "AAFT_DATA", hide_env_values = true)]
    pub data: Option<String>,

    #[arg(long, env = "AAFT_TEST_ID")]
    pub test_id: Option<String>,

    #[arg(long, env = "AAFT_STEP_ID")]
    pub step_id: Option<String>,

    #[arg(long, env = "AAFT_STEP_CLASS_NAME")]
    pub step_class_name: Option<String>,

    /// Callback URL the result is posted to
    #[arg(long, env = "AAFT_CALLBACK")]
    pub callback: Option<String>,

    /// Shared secret sent as X-AAFT-Token
    #[arg(long, env = "AAFT_SECRET_TOKEN", hide_env_values = true)]
    pub secret_token: Option<String>,

    /// Older name of the shared secret, used when AAFT_SECRET_TOKEN is unset
    #[arg(long = "token", env = "AAFT_TOKEN", hide = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Scenario script reference reported by the orchestrator
    #[arg(long, env = "AAFT_SCRIPT_REF")]
    pub script_ref: Option<String>,

    #[arg(long, env = "TARGET_URL")]
    pub target_url: Option<String>,

    /// Text the confirmation page must contain (case-sensitive)
    #[arg(long, env = "EXPECTED_TEXT")]
    pub expected_text: Option<String>,

    #[arg(long, env = "NAME_SELECTOR")]
    pub name_selector: Option<String>,

    #[arg(long, env = "EMAIL_SELECTOR")]
    pub email_selector: Option<String>,

    #[arg(long, env = "MESSAGE_SELECTOR")]
    pub message_selector: Option<String>,

    #[arg(long, env = "SUBMIT_SELECTOR")]
    pub submit_selector: Option<String>,

    #[arg(long, env = "CONFIRMATION_SELECTOR")]
    pub confirmation_selector: Option<String>,

    #[arg(long, env = "VALIDATION_SELECTOR")]
    pub validation_selector: Option<String>,

    #[arg(long, env = "GITHUB_RUN_ID")]
    pub github_run_id: Option<String>,

    #[arg(long, env = "GITHUB_SERVER_URL")]
    pub github_server_url: Option<String>,

    #[arg(long, env = "GITHUB_REPOSITORY")]
    pub github_repository: Option<String>,

    #[arg(long, env = "GITHUB_WORKFLOW")]
    pub github_workflow: Option<String>,

    /// Navigation timeout in milliseconds
    #[arg(long, env = "AAFT_NAVIGATION_TIMEOUT_MS", default_value = "30000")]
    pub navigation_timeout_ms: u64,

    /// Per-field readiness timeout in milliseconds
    #[arg(long, env = "AAFT_FIELD_TIMEOUT_MS", default_value = "5000")]
    pub field_timeout_ms: u64,

    /// Timeout for each of the confirmation / validation waits
    #[arg(long, env = "AAFT_OUTCOME_TIMEOUT_MS", default_value = "10000")]
    pub outcome_timeout_ms: u64,

    /// Reply deadline for fill, click, text and close commands
    #[arg(long, env = "AAFT_ACTION_TIMEOUT_MS", default_value = "30000")]
    pub action_timeout_ms: u64,

    /// HTTP timeout for the callback request
    #[arg(long, env = "AAFT_CALLBACK_TIMEOUT_MS", default_value = "30000")]
    pub callback_timeout_ms: u64,

    /// Browser to use
    #[arg(long, env = "AAFT_BROWSER", value_enum, default_value = "chromium")]
    pub browser: Browser,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    #[arg(long, default_value = "1280")]
    pub viewport_width: u32,

    #[arg(long, default_value = "720")]
    pub viewport_height: u32,

    /// Directory whose node_modules provides playwright
    #[arg(long, env = "AAFT_PLAYWRIGHT_DIR", default_value = ".")]
    pub playwright_dir: PathBuf,

    /// Node.js binary
    #[arg(long, env = "AAFT_NODE", default_value = "node")]
    pub node: PathBuf,

    /// Also write the final report (with local diagnostics) to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Log as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

/// Everything one step run needs, resolved up front
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub settings: StepSettings,
    /// Normalized secret; empty when none was supplied
    pub secret_token: String,
    pub context: RunContext,
    pub timeouts: ScenarioTimeouts,
    pub probe: ProbeValues,
    pub playwright: PlaywrightConfig,
    pub callback_timeout: Duration,
    pub output: Option<PathBuf>,
}

impl RunnerConfig {
    pub fn new(settings: StepSettings) -> Self {
        Self {
            settings,
            secret_token: String::new(),
            context: RunContext::default(),
            timeouts: ScenarioTimeouts::default(),
            probe: ProbeValues::default(),
            playwright: PlaywrightConfig::default(),
            callback_timeout: Duration::from_secs(30),
            output: None,
        }
    }
}

impl Args {
    /// Resolve settings from the bundled blob and/or discrete fields.
    ///
    /// Discrete fields given explicitly win over the blob. Fails on any
    /// setup problem, before a browser is started.
    pub fn into_config(self) -> aaft_common::Result<RunnerConfig> {
        let mut settings = match self.data.as_deref().filter(|d| !d.trim().is_empty()) {
            Some(raw) => StepSettings::from_client_data(decode_client_data(Some(raw))?)?,
            None => StepSettings::default(),
        };

        let overrides = [
            (&mut settings.test_id, self.test_id),
            (&mut settings.step_id, self.step_id),
            (&mut settings.step_class_name, self.step_class_name),
            (&mut settings.target_url, self.target_url),
            (&mut settings.expected_text, self.expected_text),
            (&mut settings.selectors.name_selector, self.name_selector),
            (&mut settings.selectors.email_selector, self.email_selector),
            (&mut settings.selectors.message_selector, self.message_selector),
            (&mut settings.selectors.submit_selector, self.submit_selector),
            (&mut settings.selectors.confirmation_selector, self.confirmation_selector),
            (&mut settings.selectors.validation_selector, self.validation_selector),
        ];
        for (field, value) in overrides {
            if let Some(value) = value {
                *field = value;
            }
        }
        if self.callback.is_some() {
            settings.callback_url = self.callback;
        }
        if self.script_ref.is_some() {
            settings.script_ref = self.script_ref;
        }

        settings.validate()?;

        let context = RunContext::from_github(
            self.github_server_url.as_deref(),
            self.github_repository.as_deref(),
            self.github_run_id.as_deref(),
            self.github_workflow.as_deref(),
        );

        Ok(RunnerConfig {
            settings,
            secret_token: normalize_secret(self.secret_token.or(self.token).as_deref()),
            context,
            timeouts: ScenarioTimeouts {
                navigation: Duration::from_millis(self.navigation_timeout_ms),
                field: Duration::from_millis(self.field_timeout_ms),
                outcome: Duration::from_millis(self.outcome_timeout_ms),
            },
            probe: ProbeValues::default(),
            playwright: PlaywrightConfig {
                browser: self.browser,
                headless: !self.headed,
                viewport_width: self.viewport_width,
                viewport_height: self.viewport_height,
                working_dir: self.playwright_dir,
                node_binary: self.node,
                action_timeout: Duration::from_millis(self.action_timeout_ms),
                ..Default::default()
            },
            callback_timeout: Duration::from_millis(self.callback_timeout_ms),
            output: self.output,
        })
    }
}
