use std::time::Duration;
use thiserror::Error;

use super::presentation::response_text;
use crate::models::{CapturedPhoto, ErrorBody};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("gateway returned {status}: {message}")]
    Gateway { status: u16, message: String },

    #[error("gateway request timed out")]
    Timeout,

    #[error("gateway unreachable: {0}")]
    Transport(String),

    #[error("gateway response is not JSON: {0}")]
    Body(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}

/// Sends a captured photo for analysis and returns the raw model text.
#[async_trait::async_trait]
pub trait PhotoAnalyzer: Send + Sync {
    async fn analyze(&self, photo: &CapturedPhoto) -> Result<String, ClientError>;
}

/// HTTP client for the gateway's analysis endpoint.
pub struct GatewayClient {
    url: String,
    client: reqwest::Client,
}

impl GatewayClient {
    pub fn new(url: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { url, client })
    }
}

#[async_trait::async_trait]
impl PhotoAnalyzer for GatewayClient {
    async fn analyze(&self, photo: &CapturedPhoto) -> Result<String, ClientError> {
        let part = reqwest::multipart::Part::bytes(photo.bytes.clone())
            .file_name("photo.jpg")
            .mime_str(&photo.mime_type)?;
        let form = reqwest::multipart::Form::new().part("image", part);

        log::info!("📤 Sending {} byte photo to {}", photo.bytes.len(), self.url);

        let response = self.client.post(&self.url).multipart(form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|e| match e.details {
                    Some(details) => format!("{} ({})", e.error, details),
                    None => e.error,
                })
                .unwrap_or_else(|_| "Failed to upload image for analysis".to_string());
            log::error!("❌ Gateway error {}: {}", status, message);
            return Err(ClientError::Gateway {
                status: status.as_u16(),
                message,
            });
        }

        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| ClientError::Body(e.to_string()))?;
        Ok(response_text(&value))
    }
}
