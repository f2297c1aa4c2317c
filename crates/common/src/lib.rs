//! AAFT Common Library
//!
//! Shared pieces of AAFT acceptance steps: decoding the client payload,
//! step settings, the step result aggregate and callback delivery.

pub mod callback;
pub mod client_data;
pub mod error;
pub mod report;
pub mod settings;

// Re-export commonly used types
pub use callback::{CallbackTransport, CompletionExtras, HttpTransport};
pub use client_data::{decode_client_data, encode_client_data};
pub use error::{ConfigError, DecodeError, DeliveryError, Error, Result};
pub use report::{
    Assertion, CompletedStep, DeliveryOutcome, LogCode, LogEntry, StepReport, StepStatus,
};
pub use settings::{FieldSelectors, RunContext, StepSettings};

/// AAFT step runner version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
