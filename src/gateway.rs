use thiserror::Error;

use crate::models::{AnalysisText, ErrorBody, ErrorKind};
use crate::services::{AnalysisError, ImageAnalyzer};

pub const IMAGE_FIELD: &str = "image";

/// Failures a gateway request can end in. Each maps to one HTTP status
/// and one stable `error` string.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("API keys are not configured")]
    Configuration,

    #[error("No image provided")]
    Validation(Option<String>),

    #[error("Image too large")]
    TooLarge(Option<String>),

    #[error("Failed to process request: {0}")]
    Upstream(AnalysisError),

    #[error("Upstream request timed out: {0}")]
    Timeout(AnalysisError),
}

impl From<AnalysisError> for GatewayError {
    fn from(err: AnalysisError) -> Self {
        if matches!(err, AnalysisError::Timeout(_)) {
            GatewayError::Timeout(err)
        } else {
            GatewayError::Upstream(err)
        }
    }
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Configuration => ErrorKind::Configuration,
            GatewayError::Validation(_) | GatewayError::TooLarge(_) => ErrorKind::Validation,
            GatewayError::Upstream(_) => ErrorKind::Upstream,
            GatewayError::Timeout(_) => ErrorKind::Timeout,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Configuration => 500,
            GatewayError::Validation(_) => 400,
            GatewayError::TooLarge(_) => 413,
            GatewayError::Upstream(_) => 500,
            GatewayError::Timeout(_) => 504,
        }
    }

    pub fn body(&self) -> ErrorBody {
        let (error, details) = match self {
            GatewayError::Configuration => ("API keys are not configured", None),
            GatewayError::Validation(details) => ("No image provided", details.clone()),
            GatewayError::TooLarge(details) => ("Image too large", details.clone()),
            GatewayError::Upstream(e) => ("Failed to process request", Some(e.to_string())),
            GatewayError::Timeout(e) => ("Upstream request timed out", Some(e.to_string())),
        };

        ErrorBody {
            error: error.to_string(),
            kind: self.kind(),
            details,
        }
    }
}

/// Image part pulled out of the multipart form.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImageUpload {
    pub fn new(bytes: Vec<u8>, content_type: Option<&str>) -> Self {
        let mime_type = match content_type.map(str::trim) {
            Some(ct) if !ct.is_empty() && ct != "application/octet-stream" => ct.to_string(),
            _ => "image/jpeg".to_string(),
        };
        Self { bytes, mime_type }
    }
}

/// Forward a validated upload to the analyzer.
pub async fn analyze_upload(
    analyzer: &dyn ImageAnalyzer,
    upload: ImageUpload,
) -> Result<AnalysisText, GatewayError> {
    if upload.bytes.is_empty() {
        return Err(GatewayError::Validation(Some("image is empty".to_string())));
    }

    log::info!(
        "📸 Analyzing {} byte {} image via {} backend",
        upload.bytes.len(),
        upload.mime_type,
        analyzer.backend()
    );

    match analyzer.analyze_image(&upload.bytes, &upload.mime_type).await {
        Ok(text) => Ok(text),
        Err(e) => {
            log::error!("Error processing request: {}", e);
            Err(e.into())
        }
    }
}

// Axum integration
#[cfg(feature = "gateway-server")]
pub mod server {
    use super::*;
    use axum::{
        extract::{
            multipart::{MultipartError, MultipartRejection},
            DefaultBodyLimit, Multipart, State,
        },
        http::{Method, StatusCode},
        response::{IntoResponse, Response},
        routing::{get, post},
        Json, Router,
    };
    use std::sync::Arc;
    use tower_http::cors::{Any, CorsLayer};

    pub struct AppState {
        /// `None` when no credential is configured.
        pub analyzer: Option<Arc<dyn ImageAnalyzer>>,
    }

    impl IntoResponse for GatewayError {
        fn into_response(self) -> Response {
            let status =
                StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(self.body())).into_response()
        }
    }

    pub fn create_gateway_router(
        analyzer: Option<Arc<dyn ImageAnalyzer>>,
        max_upload_bytes: usize,
    ) -> Router {
        let state = Arc::new(AppState { analyzer });

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any);

        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_check))
            .route("/api/analyze", post(analyze_handler))
            .route("/api/upload-to-google", post(analyze_handler))
            .layer(DefaultBodyLimit::max(max_upload_bytes))
            .layer(cors)
            .with_state(state)
    }

    async fn analyze_handler(
        State(state): State<Arc<AppState>>,
        multipart: Result<Multipart, MultipartRejection>,
    ) -> Result<Json<AnalysisText>, GatewayError> {
        // Credential first: without it nothing is read or forwarded.
        let analyzer = match &state.analyzer {
            Some(analyzer) => analyzer.clone(),
            None => {
                log::error!("❌ GOOGLE_AI_API_KEY is not configured, rejecting request");
                return Err(GatewayError::Configuration);
            }
        };

        let multipart = multipart.map_err(|e| {
            log::warn!("⚠️ Rejected non-multipart request: {}", e);
            GatewayError::Validation(Some(e.body_text()))
        })?;

        let upload = read_image_field(multipart).await?;
        let text = analyze_upload(analyzer.as_ref(), upload).await?;

        log::info!("✅ Analysis complete ({} chars)", text.as_str().len());
        Ok(Json(text))
    }

    async fn read_image_field(mut multipart: Multipart) -> Result<ImageUpload, GatewayError> {
        loop {
            let field = multipart
                .next_field()
                .await
                .map_err(form_error)?;

            let Some(field) = field else {
                return Err(GatewayError::Validation(None));
            };

            if field.name() != Some(IMAGE_FIELD) {
                log::debug!("Skipping form field {:?}", field.name());
                continue;
            }

            let content_type = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(form_error)?;

            return Ok(ImageUpload::new(bytes.to_vec(), content_type.as_deref()));
        }
    }

    /// A body cut off by the upload limit still carried an image.
    fn form_error(e: MultipartError) -> GatewayError {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            log::warn!("⚠️ Rejected oversized upload: {}", e);
            GatewayError::TooLarge(Some(e.body_text()))
        } else {
            GatewayError::Validation(Some(e.body_text()))
        }
    }

    async fn root_handler() -> &'static str {
        "Kally analysis gateway - POST a multipart 'image' field to /api/analyze"
    }

    async fn health_check() -> &'static str {
        "OK"
    }

}
