//! Step settings and CI run context

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Everything a step needs to know about the form under test.
///
/// Decoded once per run, then only read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSettings {
    #[serde(default, deserialize_with = "string_or_number")]
    pub test_id: String,

    #[serde(default, deserialize_with = "string_or_number")]
    pub step_id: String,

    #[serde(default)]
    pub step_class_name: String,

    /// Where the finished result is posted. A missing callback is not a
    /// setup error; the result aggregate reports it as a failed delivery.
    #[serde(default, alias = "callback")]
    pub callback_url: Option<String>,

    /// Scenario script the orchestrator dispatched this step for
    #[serde(default)]
    pub script_ref: Option<String>,

    #[serde(default)]
    pub target_url: String,

    #[serde(default)]
    pub expected_text: String,

    #[serde(flatten)]
    pub selectors: FieldSelectors,
}

/// CSS selectors for the form fields and the two terminal UI states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldSelectors {
    pub name_selector: String,
    pub email_selector: String,
    pub message_selector: String,
    pub submit_selector: String,
    pub confirmation_selector: String,
    pub validation_selector: String,
}

impl Default for FieldSelectors {
    fn default() -> Self {
        Self {
            name_selector: "#input_1_1".to_string(),
            email_selector: "#input_1_3".to_string(),
            message_selector: "#input_1_4".to_string(),
            submit_selector: "#gform_submit_button_1".to_string(),
            confirmation_selector: ".gform_confirmation_message".to_string(),
            validation_selector: ".gform_validation_errors".to_string(),
        }
    }
}

impl StepSettings {
    /// Build settings from a decoded client-data object.
    pub fn from_client_data(data: Map<String, Value>) -> Result<Self, ConfigError> {
        serde_json::from_value(Value::Object(data)).map_err(|e| ConfigError::Invalid {
            field: "AAFT_DATA",
            reason: e.to_string(),
        })
    }

    /// Check the fields the scenario cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_url.trim().is_empty() {
            return Err(ConfigError::Missing("target_url"));
        }
        if self.expected_text.is_empty() {
            return Err(ConfigError::Missing("expected_text"));
        }

        let selectors = [
            ("name_selector", &self.selectors.name_selector),
            ("email_selector", &self.selectors.email_selector),
            ("message_selector", &self.selectors.message_selector),
            ("submit_selector", &self.selectors.submit_selector),
            ("confirmation_selector", &self.selectors.confirmation_selector),
            ("validation_selector", &self.selectors.validation_selector),
        ];
        for (field, selector) in selectors {
            if selector.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "selector is empty".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Callback URL, if one was configured with a non-blank value
    pub fn callback(&self) -> Option<&str> {
        self.callback_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// CI run identifiers attached to every reported result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    pub run_id: Option<String>,
    pub run_url: Option<String>,
    pub workflow: Option<String>,
    pub repository: Option<String>,
}

impl RunContext {
    /// Build the context from GitHub Actions values. The run URL is only
    /// composed when server, repository and run id are all known.
    pub fn from_github(
        server_url: Option<&str>,
        repository: Option<&str>,
        run_id: Option<&str>,
        workflow: Option<&str>,
    ) -> Self {
        fn non_empty(value: Option<&str>) -> Option<&str> {
            value.map(str::trim).filter(|s| !s.is_empty())
        }

        let server_url = non_empty(server_url);
        let repository = non_empty(repository);
        let run_id = non_empty(run_id);

        let run_url = match (server_url, repository, run_id) {
            (Some(server), Some(repo), Some(id)) => Some(format!(
                "{}/{}/actions/runs/{}",
                server.trim_end_matches('/'),
                repo,
                id
            )),
            _ => None,
        };

        Self {
            run_id: run_id.map(String::from),
            run_url,
            workflow: non_empty(workflow).map(String::from),
            repository: repository.map(String::from),
        }
    }
}

/// Orchestrators send ids as either JSON strings or numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {}",
            other
        ))),
    }
}
