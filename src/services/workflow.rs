use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::analyzer::{build_http_client, extension_for, AnalysisError, AnalysisRequest, ImageAnalyzer};
use super::scratch::ScratchFile;
use crate::models::AnalysisText;

#[derive(Debug, Serialize)]
struct StartUploadRequest<'a> {
    file: StartUploadFile<'a>,
}

#[derive(Debug, Serialize)]
struct StartUploadFile<'a> {
    display_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: UploadedFile,
}

/// File stored by the Files API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub uri: String,
}

#[derive(Debug, Serialize)]
struct WorkflowRunRequest<'a> {
    input_value: &'a str,
    output_type: &'a str,
    input_type: &'a str,
    tweaks: serde_json::Map<String, Value>,
}

/// Uploads the photo to the Gemini Files API, then runs a workflow engine
/// whose file slot receives the uploaded URI.
pub struct WorkflowAnalyzer {
    api_key: String,
    api_base: String,
    workflow_url: String,
    file_slot: String,
    scratch_dir: PathBuf,
    client: reqwest::Client,
}

impl WorkflowAnalyzer {
    pub fn new(
        api_key: String,
        api_base: String,
        workflow_url: String,
        file_slot: String,
        scratch_dir: PathBuf,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            api_key,
            api_base,
            workflow_url,
            file_slot,
            scratch_dir,
            client: build_http_client(timeout)?,
        })
    }

    /// Resumable upload: a `start` call hands out an upload URL, a second
    /// call sends the bytes and finalizes.
    async fn upload_file(
        &self,
        path: &Path,
        mime_type: &str,
        display_name: &str,
    ) -> Result<UploadedFile, AnalysisError> {
        let bytes = tokio::fs::read(path).await?;

        let start = self
            .client
            .post(format!("{}/upload/v1beta/files", self.api_base))
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&StartUploadRequest {
                file: StartUploadFile { display_name },
            })
            .send()
            .await?;

        if !start.status().is_success() {
            let status = start.status();
            let error_text = start.text().await.unwrap_or_default();
            log::error!("❌ File upload start failed ({}): {}", status, error_text);
            return Err(AnalysisError::Upstream {
                status: status.as_u16(),
                body: error_text,
            });
        }

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| AnalysisError::InvalidResponse("missing x-goog-upload-url header".to_string()))?;

        log::debug!("📤 Uploading {} bytes to upload session", bytes.len());

        let response = self
            .client
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            log::error!("❌ File upload failed ({}): {}", status, error_text);
            return Err(AnalysisError::Upstream {
                status: status.as_u16(),
                body: error_text,
            });
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::InvalidResponse(format!("file upload response: {}", e)))?;

        Ok(uploaded.file)
    }

    fn build_run_request<'a>(&self, prompt: &'a str, file_uri: &str) -> WorkflowRunRequest<'a> {
        let mut tweaks = serde_json::Map::new();
        tweaks.insert(
            self.file_slot.clone(),
            serde_json::json!({ "input_value": file_uri }),
        );

        WorkflowRunRequest {
            input_value: prompt,
            output_type: "chat",
            input_type: "chat",
            tweaks,
        }
    }

    async fn run_workflow(&self, prompt: &str, file_uri: &str) -> Result<AnalysisText, AnalysisError> {
        let body = self.build_run_request(prompt, file_uri);

        log::info!("🔁 Invoking workflow at {}", self.workflow_url);

        let response = self
            .client
            .post(&self.workflow_url)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            log::error!("❌ Workflow request failed with status {}: {}", status, error_text);
            return Err(AnalysisError::Upstream {
                status: status.as_u16(),
                body: error_text,
            });
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| AnalysisError::InvalidResponse(format!("workflow response: {}", e)))?;

        let text = extract_message_text(&envelope).ok_or_else(|| {
            AnalysisError::InvalidResponse("workflow response has no message text".to_string())
        })?;

        log::info!("💬 Response from workflow: {}", text);
        Ok(AnalysisText(text))
    }
}

/// Pull the chat message out of a workflow run envelope.
fn extract_message_text(envelope: &Value) -> Option<String> {
    let message = envelope
        .pointer("/outputs/0/outputs/0/results/message")?;

    message
        .pointer("/data/text")
        .or_else(|| message.get("text"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait::async_trait]
impl ImageAnalyzer for WorkflowAnalyzer {
    async fn analyze_image(&self, image: &[u8], mime_type: &str) -> Result<AnalysisText, AnalysisError> {
        let request = AnalysisRequest::new(image, mime_type);
        let millis = chrono::Utc::now().timestamp_millis();

        let scratch = ScratchFile::write(
            &self.scratch_dir,
            &format!("image-{}.{}", millis, extension_for(request.mime_type)),
            request.image,
        )
        .await?;

        let uploaded = self
            .upload_file(scratch.path(), request.mime_type, &format!("food-image-{}", millis))
            .await;

        // The local copy is only needed for the upload.
        scratch.cleanup().await;
        let uploaded = uploaded?;

        log::info!(
            "Uploaded file {} as: {}",
            uploaded.display_name.as_deref().unwrap_or(&uploaded.name),
            uploaded.uri
        );

        self.run_workflow(request.prompt, &uploaded.uri).await
    }

    fn backend(&self) -> &'static str {
        "workflow"
    }
}
