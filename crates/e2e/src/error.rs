//! Error types for the browser side of a step

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Playwright not found. Install with: npm install playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright driver failed to start: {0}")]
    DriverStartup(String),

    #[error("Playwright driver exited before replying to {0}")]
    DriverExited(String),

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Timeout after {} ms waiting for: {target}", .after.as_millis())]
    Timeout { target: String, after: Duration },

    #[error("Callback transport error: {0}")]
    Callback(#[from] aaft_common::DeliveryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;

/// Why a scenario stage aborted the run
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Browser launch failed: {0}")]
    Launch(#[source] E2eError),

    #[error("Navigation failed: {0}")]
    Navigation(#[source] E2eError),

    #[error("Required field(s) not found: {}", .0.join(", "))]
    FieldsNotFound(Vec<String>),

    #[error("Fill failed for {field}: {source}")]
    Fill {
        field: &'static str,
        #[source]
        source: E2eError,
    },

    #[error("Submit failed: {0}")]
    Submit(#[source] E2eError),

    #[error(
        "No response: neither confirmation ({confirmation}) nor validation error ({validation}) appeared within {} ms",
        .after.as_millis()
    )]
    NoResponse {
        confirmation: String,
        validation: String,
        after: Duration,
    },
}
