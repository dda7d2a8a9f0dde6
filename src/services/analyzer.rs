use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{AnalysisBackend, GatewayConfig};
use crate::models::AnalysisText;

use super::{GeminiAnalyzer, WorkflowAnalyzer};

/// Instruction sent with every photo.
pub const FOOD_ANALYSIS_PROMPT: &str = "Given the provided image, identify the dish/food name and extract the following \
nutritional properties: calories, protein, carbohydrates, and fat. Return your response as a raw JSON object \
WITHOUT any markdown formatting, code block indicators, explanations, or additional text. The JSON should use \
the following keys exactly: 'name', 'calories', 'protein', 'carbs', and 'fat'. Example of the expected format:
{
\"name\": \"Dish Name\",
\"calories\": 000,
\"protein\": 00,
\"carbs\": 00,
\"fat\": 00
}";

/// System instruction for backends that support one.
pub const JSON_ONLY_INSTRUCTION: &str = "You are a nutrition analysis assistant. Respond with a single JSON object \
containing exactly the keys name (string), calories, protein, carbs and fat (numbers). Never wrap the JSON in \
markdown and never add prose.";

pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// Errors raised while talking to the external inference service.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Upstream API error ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Upstream request timed out: {0}")]
    Timeout(String),

    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),

    #[error("Scratch storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for AnalysisError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AnalysisError::Timeout(err.to_string())
        } else if err.is_decode() {
            AnalysisError::InvalidResponse(err.to_string())
        } else {
            AnalysisError::Network(err.to_string())
        }
    }
}

/// One photo plus the fixed instruction, as handed to a backend.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisRequest<'a> {
    pub image: &'a [u8],
    pub mime_type: &'a str,
    pub prompt: &'static str,
}

impl<'a> AnalysisRequest<'a> {
    pub fn new(image: &'a [u8], mime_type: &'a str) -> Self {
        let mime_type = if mime_type.trim().is_empty() {
            DEFAULT_IMAGE_MIME
        } else {
            mime_type
        };

        Self {
            image,
            mime_type,
            prompt: FOOD_ANALYSIS_PROMPT,
        }
    }
}

/// Given an image, return model-generated text that should hold the food JSON.
#[async_trait::async_trait]
pub trait ImageAnalyzer: Send + Sync {
    async fn analyze_image(&self, image: &[u8], mime_type: &str) -> Result<AnalysisText, AnalysisError>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}

/// File extension used when an upload has to touch the disk.
pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/heic" => "heic",
        _ => "jpg",
    }
}

pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}

/// Build the configured backend. `None` when no credential is configured.
pub fn build_analyzer(config: &GatewayConfig) -> anyhow::Result<Option<Arc<dyn ImageAnalyzer>>> {
    let api_key = match &config.api_key {
        Some(key) => key.clone(),
        None => return Ok(None),
    };

    let analyzer: Arc<dyn ImageAnalyzer> = match config.backend {
        AnalysisBackend::Inline => Arc::new(GeminiAnalyzer::new(
            api_key,
            config.gemini_api_base.clone(),
            config.gemini_model.clone(),
            config.upstream_timeout,
        )?),
        AnalysisBackend::Workflow => Arc::new(WorkflowAnalyzer::new(
            api_key,
            config.gemini_api_base.clone(),
            config.workflow_url.clone(),
            config.workflow_file_slot.clone(),
            config.scratch_dir.clone(),
            config.upstream_timeout,
        )?),
    };

    Ok(Some(analyzer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_names_every_field() {
        for key in ["'name'", "'calories'", "'protein'", "'carbs'", "'fat'"] {
            assert!(FOOD_ANALYSIS_PROMPT.contains(key), "prompt misses {}", key);
        }
        assert!(FOOD_ANALYSIS_PROMPT.contains("WITHOUT any markdown"));
    }

    #[test]
    fn test_request_defaults_mime_type() {
        let bytes = [0xFFu8, 0xD8, 0xFF];
        let request = AnalysisRequest::new(&bytes, "");
        assert_eq!(request.mime_type, "image/jpeg");

        let request = AnalysisRequest::new(&bytes, "image/png");
        assert_eq!(request.mime_type, "image/png");
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("image/png"), "png");
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("application/octet-stream"), "jpg");
    }

    #[test]
    fn test_build_analyzer_without_key() {
        let config = GatewayConfig::from_lookup(|_| None).unwrap();
        assert!(build_analyzer(&config).unwrap().is_none());
    }

    #[test]
    fn test_build_analyzer_picks_backend() {
        let config = GatewayConfig::from_lookup(|key| match key {
            "GOOGLE_AI_API_KEY" => Some("key".to_string()),
            "ANALYSIS_BACKEND" => Some("workflow".to_string()),
            _ => None,
        })
        .unwrap();

        let analyzer = build_analyzer(&config).unwrap().unwrap();
        assert_eq!(analyzer.backend(), "workflow");
    }
}
