use base64::{engine::general_purpose, Engine};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::analyzer::{build_http_client, AnalysisError, AnalysisRequest, ImageAnalyzer, JSON_ONLY_INSTRUCTION};
use crate::models::AnalysisText;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ContentPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

/// Sends the photo inline (base64) to Gemini `generateContent`.
pub struct GeminiAnalyzer {
    api_key: String,
    api_base: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiAnalyzer {
    pub fn new(
        api_key: String,
        api_base: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            api_key,
            api_base,
            model,
            client: build_http_client(timeout)?,
        })
    }

    fn api_url(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.api_base, self.model)
    }

    fn build_request(request: &AnalysisRequest<'_>) -> GenerateContentRequest {
        let base64_image = general_purpose::STANDARD.encode(request.image);

        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![
                    ContentPart::InlineData {
                        inline_data: InlineData {
                            mime_type: request.mime_type.to_string(),
                            data: base64_image,
                        },
                    },
                    ContentPart::Text {
                        text: request.prompt.to_string(),
                    },
                ],
            }],
            system_instruction: Some(Content {
                role: None,
                parts: vec![ContentPart::Text {
                    text: JSON_ONLY_INSTRUCTION.to_string(),
                }],
            }),
            generation_config: Some(GenerationConfig {
                response_mime_type: "application/json".to_string(),
                temperature: 0.2,
            }),
        }
    }

    fn extract_text(response: GenerateContentResponse) -> Result<AnalysisText, AnalysisError> {
        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| AnalysisError::InvalidResponse("no candidates returned".to_string()))?;

        if candidate.finish_reason.as_deref() == Some("SAFETY") {
            return Err(AnalysisError::InvalidResponse(
                "response blocked by safety filter".to_string(),
            ));
        }

        let text: String = candidate
            .content
            .map(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text),
                ContentPart::InlineData { .. } => None,
            })
            .collect();

        if text.trim().is_empty() {
            return Err(AnalysisError::InvalidResponse("candidate has no text".to_string()));
        }

        Ok(AnalysisText(text))
    }
}

#[async_trait::async_trait]
impl ImageAnalyzer for GeminiAnalyzer {
    async fn analyze_image(&self, image: &[u8], mime_type: &str) -> Result<AnalysisText, AnalysisError> {
        let request = AnalysisRequest::new(image, mime_type);
        log::debug!("📊 Image size: {} bytes ({})", request.image.len(), request.mime_type);

        let body = Self::build_request(&request);

        log::info!("🤖 Sending image to Gemini with model: {}", self.model);

        let response = self
            .client
            .post(self.api_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        log::debug!("📥 Gemini response status: {}", response.status());

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            log::error!("❌ Gemini API error response: {}", error_text);
            return Err(AnalysisError::Upstream {
                status: status.as_u16(),
                body: error_text,
            });
        }

        let response_text = response.text().await?;
        log::debug!("📄 Raw Gemini response size: {} bytes", response_text.len());

        let parsed: GenerateContentResponse = serde_json::from_str(&response_text)
            .map_err(|e| AnalysisError::InvalidResponse(e.to_string()))?;

        let text = Self::extract_text(parsed)?;
        log::info!("💬 Gemini response content: {}", text);

        Ok(text)
    }

    fn backend(&self) -> &'static str {
        "inline"
    }
}
