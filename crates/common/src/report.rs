//! Step result aggregate
//!
//! A [`StepReport`] collects the status, assertions and log entries of one
//! step run and delivers them to the orchestrator exactly once through
//! [`StepReport::complete`], which consumes the report.
//!
//! Status starts optimistic (`passed`) and can only be downgraded: once a
//! run has failed it stays failed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::callback::{
    redact, CallbackRequest, CallbackTransport, CompletionExtras, CONTENT_TYPE_JSON, TOKEN_HEADER,
};
use crate::settings::{RunContext, StepSettings};

/// Step status as understood by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub const ALL: [StepStatus; 5] = [
        StepStatus::Pending,
        StepStatus::Running,
        StepStatus::Passed,
        StepStatus::Failed,
        StepStatus::Skipped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Passed => "passed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }

    fn legal_values() -> String {
        Self::ALL
            .iter()
            .map(StepStatus::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected status value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidStatus(pub String);

impl fmt::Display for InvalidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid status '{}'; expected one of: {}",
            self.0,
            StepStatus::legal_values()
        )
    }
}

impl std::error::Error for InvalidStatus {}

impl FromStr for StepStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| InvalidStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assertion {
    pub name: String,
    pub passed: bool,
}

/// Severity code of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCode {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogCode::Debug => write!(f, "debug"),
            LogCode::Info => write!(f, "info"),
            LogCode::Warning => write!(f, "warning"),
            LogCode::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub code: LogCode,
    pub message: String,
}

/// What happened to the one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// No callback URL was configured; nothing was sent
    NotConfigured,
    /// The callback answered 200
    Delivered { status: u16 },
    /// The callback answered with a non-200 status
    Rejected { status: u16 },
    /// The request could not be sent
    Failed { error: String },
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryOutcome::NotConfigured => write!(f, "not configured"),
            DeliveryOutcome::Delivered { status } => write!(f, "delivered ({})", status),
            DeliveryOutcome::Rejected { status } => write!(f, "rejected ({})", status),
            DeliveryOutcome::Failed { error } => write!(f, "failed ({})", error),
        }
    }
}

/// Final state of a run after [`StepReport::complete`]
#[derive(Debug)]
pub struct CompletedStep {
    pub report: StepReport,
    pub delivery: DeliveryOutcome,
}

/// Mutable result of one step run
#[derive(Debug, Clone)]
pub struct StepReport {
    test_id: String,
    step_id: String,
    step_class_name: String,
    callback_url: Option<String>,
    secret_token: String,
    status: StepStatus,
    assertions: Vec<Assertion>,
    logs: Vec<LogEntry>,
    context: RunContext,
}

#[derive(Serialize)]
struct Payload<'a> {
    test_id: &'a str,
    step_id: &'a str,
    step_class_name: &'a str,
    status: StepStatus,
    assertions: &'a [Assertion],
    logs: &'a [LogEntry],
    github: &'a RunContext,
}

impl StepReport {
    pub fn new(settings: &StepSettings) -> Self {
        Self {
            test_id: settings.test_id.clone(),
            step_id: settings.step_id.clone(),
            step_class_name: settings.step_class_name.clone(),
            callback_url: settings.callback().map(String::from),
            secret_token: String::new(),
            status: StepStatus::Passed,
            assertions: Vec::new(),
            logs: Vec::new(),
            context: RunContext::default(),
        }
    }

    pub fn with_context(mut self, context: RunContext) -> Self {
        self.context = context;
        self
    }

    /// Secret sent in the token header; expected to be normalized already.
    pub fn with_secret_token(mut self, token: impl Into<String>) -> Self {
        self.secret_token = token.into();
        self
    }

    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    pub fn step_class_name(&self) -> &str {
        &self.step_class_name
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    pub fn assertions(&self) -> &[Assertion] {
        &self.assertions
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Apply a typed status. A failed run is never moved to another status.
    pub fn set_status(&mut self, status: StepStatus) {
        if self.status == StepStatus::Failed && status != StepStatus::Failed {
            warn!(
                test_id = %self.test_id,
                step_id = %self.step_id,
                "Ignoring status change from failed to {}", status
            );
            return;
        }
        self.status = status;
    }

    /// Apply a status given as text. Unknown values are not applied: the run
    /// is failed and the rejection is logged with the legal set.
    pub fn set_status_str(&mut self, raw: &str) {
        match raw.parse::<StepStatus>() {
            Ok(status) => self.set_status(status),
            Err(rejected) => {
                self.status = StepStatus::Failed;
                self.add_log(LogCode::Error, rejected.to_string());
            }
        }
    }

    pub fn add_assertion(&mut self, name: impl Into<String>, passed: bool) {
        let name = name.into();
        debug!(
            test_id = %self.test_id,
            step_id = %self.step_id,
            passed,
            "Assertion: {}", name
        );
        self.assertions.push(Assertion { name, passed });
        if !passed {
            self.set_status(StepStatus::Failed);
        }
    }

    /// Append a log entry and mirror it to tracing.
    pub fn add_log(&mut self, code: LogCode, message: impl Into<String>) {
        let message = message.into();
        match code {
            LogCode::Debug => debug!(test_id = %self.test_id, step_id = %self.step_id, "{}", message),
            LogCode::Info => info!(test_id = %self.test_id, step_id = %self.step_id, "{}", message),
            LogCode::Warning => warn!(test_id = %self.test_id, step_id = %self.step_id, "{}", message),
            LogCode::Error => error!(test_id = %self.test_id, step_id = %self.step_id, "{}", message),
        }
        self.logs.push(LogEntry { code, message });
    }

    /// Mark the run failed and record why.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.set_status(StepStatus::Failed);
        self.add_log(LogCode::Error, message);
    }

    /// Base result fields as sent to the callback
    pub fn to_payload(&self) -> Map<String, Value> {
        let payload = Payload {
            test_id: &self.test_id,
            step_id: &self.step_id,
            step_class_name: &self.step_class_name,
            status: self.status,
            assertions: &self.assertions,
            logs: &self.logs,
            github: &self.context,
        };
        match serde_json::to_value(payload) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Deliver the result to the callback. Consumes the report so delivery
    /// happens at most once; never returns an error.
    ///
    /// Entries logged after the body is serialized (the body preview, the
    /// response, transport errors) are kept in the returned report but are
    /// not part of what was sent.
    pub async fn complete(
        mut self,
        transport: &dyn CallbackTransport,
        extras: CompletionExtras,
    ) -> CompletedStep {
        let Some(url) = self.callback_url.clone() else {
            self.fail("No callback URL configured; the result cannot be delivered");
            return CompletedStep {
                report: self,
                delivery: DeliveryOutcome::NotConfigured,
            };
        };

        let mut headers = vec![
            ("Content-Type".to_string(), CONTENT_TYPE_JSON.to_string()),
            (TOKEN_HEADER.to_string(), self.secret_token.clone()),
        ];
        headers.extend(extras.headers);

        let logged_headers = headers
            .iter()
            .map(|(name, value)| {
                if name.eq_ignore_ascii_case(TOKEN_HEADER) {
                    format!("{}: {}", name, redact(value))
                } else {
                    format!("{}: {}", name, value)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");

        self.add_log(LogCode::Debug, format!("Sending result with status {} to callback", self.status));
        self.add_log(LogCode::Debug, format!("Callback URL: {}", url));
        self.add_log(LogCode::Debug, format!("Callback headers: {}", logged_headers));

        let mut payload = self.to_payload();
        for (key, value) in extras.payload {
            payload.insert(key, value);
        }
        let body = Value::Object(payload).to_string();
        self.add_log(LogCode::Debug, format!("Callback body: {}", body));

        let request = CallbackRequest { url, headers, body };

        let delivery = match transport.post(&request).await {
            Ok(response) if response.status == 200 => {
                self.add_log(
                    LogCode::Info,
                    format!("Callback responded {}: {}", response.status, response.body),
                );
                DeliveryOutcome::Delivered { status: response.status }
            }
            Ok(response) => {
                self.add_log(
                    LogCode::Warning,
                    format!("Callback responded {}: {}", response.status, response.body),
                );
                DeliveryOutcome::Rejected { status: response.status }
            }
            Err(e) => {
                self.fail(format!("Callback delivery failed: {}", e));
                DeliveryOutcome::Failed { error: e.to_string() }
            }
        };

        CompletedStep {
            report: self,
            delivery,
        }
    }
}
