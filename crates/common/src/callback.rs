//! Callback transport used to deliver step results

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};

use crate::client_data::strip_wrapping_quotes;
use crate::error::DeliveryError;

/// Header carrying the shared secret expected by the orchestrator
pub const TOKEN_HEADER: &str = "X-AAFT-Token";

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// A fully composed callback request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl CallbackRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackResponse {
    pub status: u16,
    pub body: String,
}

/// Single-attempt POST. Implementations must not retry.
#[async_trait]
pub trait CallbackTransport: Send + Sync {
    async fn post(&self, request: &CallbackRequest) -> Result<CallbackResponse, DeliveryError>;
}

/// `reqwest` backed transport
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CallbackTransport for HttpTransport {
    async fn post(&self, request: &CallbackRequest) -> Result<CallbackResponse, DeliveryError> {
        let url = reqwest::Url::parse(&request.url).map_err(|e| DeliveryError::InvalidUrl {
            url: request.url.clone(),
            reason: e.to_string(),
        })?;

        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| DeliveryError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|e| DeliveryError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            headers.insert(header_name, header_value);
        }

        let response = self
            .client
            .post(url)
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(CallbackResponse { status, body })
    }
}

/// Extra fields and headers merged into the callback request
#[derive(Debug, Clone, Default)]
pub struct CompletionExtras {
    /// Merged over the base result fields; keys here win.
    pub payload: Map<String, Value>,
    pub headers: Vec<(String, String)>,
}

impl CompletionExtras {
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Normalize the configured secret: trim, drop one wrapping quote pair, trim
/// again. A missing secret becomes the empty string.
pub fn normalize_secret(raw: Option<&str>) -> String {
    raw.map(|s| strip_wrapping_quotes(s.trim()).trim().to_string())
        .unwrap_or_default()
}

/// Mask a secret for diagnostics, keeping only its length.
pub fn redact(secret: &str) -> String {
    if secret.is_empty() {
        "<empty>".to_string()
    } else {
        format!("<redacted:{} chars>", secret.chars().count())
    }
}
