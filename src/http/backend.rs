//! Backend forwarder: one synchronous POST per telemetry payload.
//!
//! The payload goes out verbatim as a JSON-content-typed body. Success is
//! a status in the 2xx range; anything else, including transport errors,
//! is reported to the caller and not retried.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tracing::debug;

use crate::gateway::{BridgeError, TelemetrySink};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Backend returned status {0}")]
    Status(u16),
}

/// Owns the process-wide HTTP client and the fixed backend URL.
pub struct BackendClient {
    client: reqwest::Client,
    url: String,
}

impl BackendClient {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    /// Single POST attempt. Connection resources are released on every
    /// exit path; no timeout is configured beyond the client's defaults.
    pub async fn forward(&self, payload: Vec<u8>) -> Result<(), BackendError> {
        debug!("POST {} ({} bytes)", self.url, payload.len());

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        debug!("Response status: {}", status);

        if status.is_success() {
            Ok(())
        } else {
            Err(BackendError::Status(status.as_u16()))
        }
    }
}

#[async_trait]
impl TelemetrySink for BackendClient {
    async fn forward_telemetry(&self, payload: Vec<u8>) -> Result<(), BridgeError> {
        self.forward(payload).await.map_err(|e| match e {
            BackendError::Status(code) => BridgeError::BackendStatus(code),
            other => BridgeError::Backend(other.to_string()),
        })
    }
}
