use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::camera::{acquire, CameraDevice, CameraStream, JPEG_QUALITY};
use super::client::PhotoAnalyzer;
use super::presentation::parse_food_analysis;
use crate::models::{CapturedPhoto, FoodAnalysis};

pub const CAMERA_ERROR_MESSAGE: &str =
    "Unable to access camera. Please ensure you've granted camera permissions.";
pub const CAPTURE_ERROR_MESSAGE: &str = "Failed to capture the photo. Please try again.";
pub const ANALYZE_ERROR_MESSAGE: &str = "Failed to analyze the photo. Please try again.";
pub const PARSE_ERROR_MESSAGE: &str = "Error parsing food data.";

/// Pause between releasing the camera and reopening it on retake.
pub const DEFAULT_RELEASE_DELAY: Duration = Duration::from_millis(500);

/// What the screen shows. Payloads live with the state that owns them.
#[derive(Debug)]
pub enum UiState {
    Idle,
    Previewing {
        stream: CameraStream,
    },
    Capturing,
    Analyzing {
        photo: CapturedPhoto,
    },
    ShowingResult {
        photo: CapturedPhoto,
        analysis: FoodAnalysis,
    },
    ShowingError {
        message: String,
        photo: Option<CapturedPhoto>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Previewing,
    Capturing,
    Analyzing,
    ShowingResult,
    ShowingError,
}

impl UiState {
    pub fn phase(&self) -> Phase {
        match self {
            UiState::Idle => Phase::Idle,
            UiState::Previewing { .. } => Phase::Previewing,
            UiState::Capturing => Phase::Capturing,
            UiState::Analyzing { .. } => Phase::Analyzing,
            UiState::ShowingResult { .. } => Phase::ShowingResult,
            UiState::ShowingError { .. } => Phase::ShowingError,
        }
    }

    pub fn photo(&self) -> Option<&CapturedPhoto> {
        match self {
            UiState::Analyzing { photo } | UiState::ShowingResult { photo, .. } => Some(photo),
            UiState::ShowingError { photo, .. } => photo.as_ref(),
            _ => None,
        }
    }

    pub fn analysis(&self) -> Option<&FoodAnalysis> {
        match self {
            UiState::ShowingResult { analysis, .. } => Some(analysis),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            UiState::ShowingError { message, .. } => Some(message),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot {action} while {phase:?}")]
pub struct SessionError {
    pub action: &'static str,
    pub phase: Phase,
}

/// One capture cycle at a time: preview, capture, analyze, show, retake.
pub struct CaptureSession {
    camera: Arc<dyn CameraDevice>,
    analyzer: Arc<dyn PhotoAnalyzer>,
    state: UiState,
    release_delay: Duration,
}

impl CaptureSession {
    pub fn new(camera: Arc<dyn CameraDevice>, analyzer: Arc<dyn PhotoAnalyzer>) -> Self {
        Self {
            camera,
            analyzer,
            state: UiState::Idle,
            release_delay: DEFAULT_RELEASE_DELAY,
        }
    }

    pub fn with_release_delay(mut self, delay: Duration) -> Self {
        self.release_delay = delay;
        self
    }

    pub fn state(&self) -> &UiState {
        &self.state
    }

    fn reject(&self, action: &'static str) -> SessionError {
        SessionError {
            action,
            phase: self.state.phase(),
        }
    }

    /// Idle -> Previewing, or ShowingError when no camera can be opened.
    pub async fn mount(&mut self) -> Result<(), SessionError> {
        if self.state.phase() != Phase::Idle {
            return Err(self.reject("mount"));
        }

        self.state = match acquire(self.camera.as_ref()).await {
            Ok(stream) => {
                log::info!("📷 Previewing {}", stream.label());
                UiState::Previewing { stream }
            }
            Err(e) => {
                log::error!("Error accessing camera: {}", e);
                UiState::ShowingError {
                    message: CAMERA_ERROR_MESSAGE.to_string(),
                    photo: None,
                }
            }
        };
        Ok(())
    }

    /// Previewing -> Capturing -> Analyzing. The stream is stopped whether
    /// or not the frame could be grabbed.
    pub async fn take_photo(&mut self) -> Result<(), SessionError> {
        if self.state.phase() != Phase::Previewing {
            return Err(self.reject("capture"));
        }

        let mut stream = match std::mem::replace(&mut self.state, UiState::Capturing) {
            UiState::Previewing { stream } => stream,
            other => {
                self.state = other;
                return Err(self.reject("capture"));
            }
        };

        let grabbed = stream
            .grab_frame()
            .and_then(|frame| frame.encode_jpeg(JPEG_QUALITY));
        stream.stop();

        self.state = match grabbed {
            Ok(photo) => {
                log::info!("📸 Captured {}x{} photo ({} bytes)", photo.width, photo.height, photo.bytes.len());
                UiState::Analyzing { photo }
            }
            Err(e) => {
                log::error!("Error capturing photo: {}", e);
                UiState::ShowingError {
                    message: CAPTURE_ERROR_MESSAGE.to_string(),
                    photo: None,
                }
            }
        };
        Ok(())
    }

    /// Analyzing -> ShowingResult or ShowingError.
    pub async fn analyze(&mut self) -> Result<(), SessionError> {
        let outcome = match &self.state {
            UiState::Analyzing { photo } => self.analyzer.analyze(photo).await,
            _ => return Err(self.reject("analyze")),
        };

        let photo = match std::mem::replace(&mut self.state, UiState::Idle) {
            UiState::Analyzing { photo } => photo,
            other => {
                self.state = other;
                return Err(self.reject("analyze"));
            }
        };

        self.state = match outcome {
            Ok(text) => match parse_food_analysis(&text) {
                Ok(analysis) => {
                    log::info!("✅ Recognized {} ({} kcal)", analysis.name, analysis.calories);
                    UiState::ShowingResult { photo, analysis }
                }
                Err(e) => {
                    log::error!("Error parsing food data: {}", e);
                    UiState::ShowingError {
                        message: PARSE_ERROR_MESSAGE.to_string(),
                        photo: Some(photo),
                    }
                }
            },
            Err(e) => {
                log::error!("Error analyzing photo: {}", e);
                UiState::ShowingError {
                    message: ANALYZE_ERROR_MESSAGE.to_string(),
                    photo: Some(photo),
                }
            }
        };
        Ok(())
    }

    /// Full capture cycle from a live preview.
    pub async fn capture(&mut self) -> Result<(), SessionError> {
        self.take_photo().await?;
        if self.state.phase() == Phase::Analyzing {
            self.analyze().await?;
        }
        Ok(())
    }

    /// Drop photo, result and error, release any stream, wait for the device
    /// and start previewing again.
    pub async fn retake(&mut self) -> Result<(), SessionError> {
        match self.state.phase() {
            Phase::ShowingResult | Phase::ShowingError | Phase::Previewing => {}
            _ => return Err(self.reject("retake")),
        }

        self.state = UiState::Idle;
        if !self.release_delay.is_zero() {
            tokio::time::sleep(self.release_delay).await;
        }
        self.mount().await
    }
}
