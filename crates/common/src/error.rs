//! Error types for AAFT steps

use thiserror::Error;

/// Result type alias using the AAFT setup error
pub type Result<T> = std::result::Result<T, Error>;

/// Setup errors. Every variant is fatal: no settings, no scenario.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Client data error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Failure to turn the `AAFT_DATA` blob into a JSON object
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("AAFT_DATA is missing or empty")]
    Missing,

    #[error("Failed to base64 decode AAFT_DATA: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("AAFT_DATA is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Failed to parse AAFT_DATA JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("AAFT_DATA must decode to a JSON object, got {0}")]
    NotAnObject(&'static str),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Setting {field} has an invalid value: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Transport-level failure while posting a result to the callback
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Invalid callback URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Transport(String),
}
