pub mod camera;
pub mod client;
pub mod presentation;
pub mod session;

pub use camera::{CameraSource, Facing, FileCamera};
pub use client::GatewayClient;
pub use session::{CaptureSession, Phase};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::models::CapturedPhoto;
use session::SessionError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Capture,
    Retake,
    Quit,
    Unknown(String),
}

impl Command {
    fn parse(line: &str) -> Self {
        match line.trim().to_lowercase().as_str() {
            "" | "c" | "capture" => Command::Capture,
            "r" | "retake" => Command::Retake,
            "q" | "quit" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        }
    }
}

/// Run one command against the session. `Ok(true)` means a new photo was taken.
async fn apply(session: &mut CaptureSession, command: &Command) -> Result<bool, SessionError> {
    match command {
        Command::Capture => {
            session.take_photo().await?;
            // A failed frame grab lands in ShowingError with nothing to analyze.
            if session.state().phase() == Phase::Analyzing {
                println!("{}", presentation::render(session.state()));
                session.analyze().await?;
            }
            Ok(session.state().photo().is_some())
        }
        Command::Retake => session.retake().await.map(|_| false),
        Command::Quit => Ok(false),
        Command::Unknown(other) => {
            println!("Unknown command '{}'", other);
            Ok(false)
        }
    }
}

async fn save_photo(path: &Path, photo: &CapturedPhoto) -> Result<()> {
    tokio::fs::write(path, &photo.bytes)
        .await
        .with_context(|| format!("Failed to save photo to {}", path.display()))?;
    log::info!("💾 Saved photo to {}", path.display());
    Ok(())
}

/// Terminal event loop: Enter captures, `r` retakes, `q` quits.
pub async fn run_interactive(mut session: CaptureSession, save_to: Option<PathBuf>) -> Result<()> {
    session.mount().await?;
    println!("{}", presentation::render(session.state()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let command = Command::parse(&line);
        if command == Command::Quit {
            break;
        }

        match apply(&mut session, &command).await {
            Ok(true) => {
                if let (Some(path), Some(photo)) = (&save_to, session.state().photo()) {
                    save_photo(path, photo).await?;
                }
            }
            Ok(false) => {}
            Err(e) => log::warn!("⚠️ {}", e),
        }

        println!("{}", presentation::render(session.state()));
    }

    log::info!("🛑 Closing camera session");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::client::{ClientError, PhotoAnalyzer};
    use crate::capture::session::CAPTURE_ERROR_MESSAGE;
    use crate::test_support::{unique_temp_dir, write_test_png};
    use std::sync::Arc;
    use std::time::Duration;

    struct CannedAnalyzer;

    #[async_trait::async_trait]
    impl PhotoAnalyzer for CannedAnalyzer {
        async fn analyze(&self, _photo: &CapturedPhoto) -> Result<String, ClientError> {
            Ok(r#"{"name":"Salad","calories":150,"protein":4,"carbs":12,"fat":9}"#.to_string())
        }
    }

    async fn mounted_session(source: PathBuf) -> CaptureSession {
        let camera = Arc::new(FileCamera::new(vec![CameraSource {
            path: source,
            facing: Facing::Environment,
        }]));
        let mut session =
            CaptureSession::new(camera, Arc::new(CannedAnalyzer)).with_release_delay(Duration::ZERO);
        session.mount().await.unwrap();
        assert_eq!(session.state().phase(), Phase::Previewing);
        session
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!(Command::parse(""), Command::Capture);
        assert_eq!(Command::parse("  C \n"), Command::Capture);
        assert_eq!(Command::parse("retake"), Command::Retake);
        assert_eq!(Command::parse("Q"), Command::Quit);
        assert_eq!(Command::parse("zoom"), Command::Unknown("zoom".to_string()));
    }

    #[tokio::test]
    async fn test_failed_frame_grab_ends_in_capture_error() {
        let dir = unique_temp_dir("loop-bad-frame");
        let source = dir.join("broken.png");
        std::fs::write(&source, b"not an image").unwrap();
        let mut session = mounted_session(source).await;

        let new_photo = apply(&mut session, &Command::Capture).await.unwrap();

        assert!(!new_photo);
        assert_eq!(session.state().phase(), Phase::ShowingError);
        assert_eq!(session.state().error_message(), Some(CAPTURE_ERROR_MESSAGE));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_only_a_fresh_capture_reports_new_photo() {
        let dir = unique_temp_dir("loop-capture");
        let source = dir.join("meal.png");
        write_test_png(&source, 8, 6);
        let mut session = mounted_session(source).await;

        assert!(apply(&mut session, &Command::Capture).await.unwrap());
        assert_eq!(session.state().phase(), Phase::ShowingResult);

        assert!(!apply(&mut session, &Command::Unknown("zoom".to_string())).await.unwrap());
        assert!(apply(&mut session, &Command::Capture).await.is_err());
        assert_eq!(session.state().phase(), Phase::ShowingResult);

        assert!(!apply(&mut session, &Command::Retake).await.unwrap());
        assert_eq!(session.state().phase(), Phase::Previewing);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_save_photo_writes_jpeg_bytes() {
        let dir = unique_temp_dir("loop-save");
        let path = dir.join("last.jpg");
        let photo = CapturedPhoto::jpeg(vec![0xFF, 0xD8, 0xFF, 0xD9], 1, 1);

        save_photo(&path, &photo).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), photo.bytes);
        std::fs::remove_dir_all(dir).unwrap();
    }
}
