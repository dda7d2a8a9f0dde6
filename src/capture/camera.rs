use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::models::CapturedPhoto;

/// Browser default for `canvas.toDataURL("image/jpeg")`.
pub const JPEG_QUALITY: u8 = 92;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    /// Rear camera.
    Environment,
    /// Front camera.
    User,
    Any,
}

impl Facing {
    fn accepts(self, source: Facing) -> bool {
        self == Facing::Any || self == source
    }
}

impl std::fmt::Display for Facing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Facing::Environment => "environment",
            Facing::User => "user",
            Facing::Any => "any",
        };
        write!(f, "{}", s)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("no {0} camera available")]
    NotFound(Facing),

    #[error("camera {0} is already in use")]
    Busy(String),

    #[error("camera access denied: {0}")]
    PermissionDenied(String),

    #[error("failed to read frame: {0}")]
    Frame(String),
}

/// Raw RGB frame grabbed from a live stream.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl Frame {
    pub fn encode_jpeg(&self, quality: u8) -> Result<CapturedPhoto, DeviceError> {
        let expected = self.width as usize * self.height as usize * 3;
        if self.width == 0 || self.height == 0 || self.rgb.len() != expected {
            return Err(DeviceError::Frame(format!(
                "frame {}x{} carries {} bytes, expected {}",
                self.width,
                self.height,
                self.rgb.len(),
                expected
            )));
        }

        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, quality)
            .write_image(&self.rgb, self.width, self.height, ExtendedColorType::Rgb8)
            .map_err(|e| DeviceError::Frame(e.to_string()))?;

        Ok(CapturedPhoto::jpeg(buffer, self.width, self.height))
    }
}

/// An open device handle. Implementations hand out at most one per source.
pub trait LiveStream: Send {
    fn grab_frame(&mut self) -> Result<Frame, DeviceError>;

    /// Give the device back. Must be idempotent.
    fn release(&mut self);

    fn label(&self) -> &str;
}

/// Owns a live stream and releases the device when stopped or dropped.
pub struct CameraStream {
    inner: Option<Box<dyn LiveStream>>,
}

impl CameraStream {
    pub fn new(inner: Box<dyn LiveStream>) -> Self {
        Self { inner: Some(inner) }
    }

    pub fn grab_frame(&mut self) -> Result<Frame, DeviceError> {
        match self.inner.as_mut() {
            Some(stream) => stream.grab_frame(),
            None => Err(DeviceError::Frame("stream already stopped".to_string())),
        }
    }

    pub fn label(&self) -> &str {
        self.inner.as_ref().map(|s| s.label()).unwrap_or("stopped")
    }

    pub fn stop(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(mut stream) = self.inner.take() {
            stream.release();
            log::debug!("📷 Released camera {}", stream.label());
        }
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl std::fmt::Debug for CameraStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraStream").field("label", &self.label()).finish()
    }
}

#[async_trait::async_trait]
pub trait CameraDevice: Send + Sync {
    async fn open(&self, facing: Facing) -> Result<CameraStream, DeviceError>;
}

/// Rear camera first, any camera second.
pub async fn acquire(camera: &dyn CameraDevice) -> Result<CameraStream, DeviceError> {
    match camera.open(Facing::Environment).await {
        Ok(stream) => Ok(stream),
        Err(e) => {
            log::warn!("⚠️ Rear camera unavailable ({}), falling back to any camera", e);
            camera.open(Facing::Any).await
        }
    }
}

#[derive(Debug, Clone)]
pub struct CameraSource {
    pub path: PathBuf,
    pub facing: Facing,
}

struct SourceSlot {
    source: CameraSource,
    in_use: AtomicBool,
}

/// Camera whose "sensor" is a still image on disk, one per source.
pub struct FileCamera {
    slots: Vec<Arc<SourceSlot>>,
}

impl FileCamera {
    pub fn new(sources: Vec<CameraSource>) -> Self {
        Self {
            slots: sources
                .into_iter()
                .map(|source| {
                    Arc::new(SourceSlot {
                        source,
                        in_use: AtomicBool::new(false),
                    })
                })
                .collect(),
        }
    }

    #[cfg(test)]
    pub fn in_use(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.in_use.load(Ordering::SeqCst))
            .count()
    }
}

#[async_trait::async_trait]
impl CameraDevice for FileCamera {
    async fn open(&self, facing: Facing) -> Result<CameraStream, DeviceError> {
        let mut busy = None;

        for slot in self.slots.iter().filter(|s| facing.accepts(s.source.facing)) {
            if slot
                .in_use
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                log::info!("📷 Opened {} camera {}", slot.source.facing, slot.source.path.display());
                return Ok(CameraStream::new(Box::new(FileStream {
                    slot: slot.clone(),
                    label: slot.source.path.display().to_string(),
                    released: false,
                })));
            }
            busy = Some(slot.source.path.display().to_string());
        }

        Err(match busy {
            Some(label) => DeviceError::Busy(label),
            None => DeviceError::NotFound(facing),
        })
    }
}

struct FileStream {
    slot: Arc<SourceSlot>,
    label: String,
    released: bool,
}

impl LiveStream for FileStream {
    fn grab_frame(&mut self) -> Result<Frame, DeviceError> {
        let img = image::open(&self.slot.source.path).map_err(|e| match e {
            image::ImageError::IoError(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
                DeviceError::PermissionDenied(io.to_string())
            }
            other => DeviceError::Frame(other.to_string()),
        })?;

        let rgb = img.to_rgb8();
        Ok(Frame {
            width: rgb.width(),
            height: rgb.height(),
            rgb: rgb.into_raw(),
        })
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.slot.in_use.store(false, Ordering::SeqCst);
        }
    }

    fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for FileStream {
    fn drop(&mut self) {
        self.release();
    }
}
