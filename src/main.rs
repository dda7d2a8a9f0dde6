mod capture;
mod config;
mod gateway; // Analysis gateway (HTTP)
mod models;
mod services;
#[cfg(test)]
mod test_support;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use capture::{CameraSource, CaptureSession, Facing, FileCamera, GatewayClient};

#[derive(Parser)]
#[command(name = "kally", about = "Snap a meal, get its calories and macros")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the analysis gateway (default)
    Serve,
    /// Capture a photo and show its analysis
    Capture(CaptureArgs),
}

#[derive(Args)]
struct CaptureArgs {
    /// Image source acting as the rear camera
    #[arg(long)]
    rear: Vec<PathBuf>,

    /// Image source acting as any other camera
    #[arg(long)]
    camera: Vec<PathBuf>,

    #[arg(long, default_value = "http://localhost:8080/api/analyze")]
    gateway_url: String,

    #[arg(long, default_value_t = 90)]
    timeout_secs: u64,

    #[arg(long, default_value_t = 500)]
    release_delay_ms: u64,

    /// Write each captured photo here
    #[arg(long)]
    save_photo: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logger
    env_logger::init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Capture(args) => run_capture(args).await,
    }
}

#[cfg(feature = "gateway-server")]
async fn serve() -> Result<()> {
    use anyhow::Context;
    use config::GatewayConfig;

    log::info!("🚀 Starting Kally analysis gateway...");

    let config = GatewayConfig::from_env()?;
    let analyzer = services::build_analyzer(&config)?;

    match &analyzer {
        Some(analyzer) => log::info!("✅ Analyzer initialized with {} backend", analyzer.backend()),
        None => log::warn!("⚠️ GOOGLE_AI_API_KEY not set, every analysis request will fail with 500"),
    }

    let app = gateway::server::create_gateway_router(analyzer, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind gateway on {}", config.bind_addr))?;

    log::info!("🌐 Gateway listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("🛑 Shutting down...");
        })
        .await?;

    Ok(())
}

#[cfg(not(feature = "gateway-server"))]
async fn serve() -> Result<()> {
    anyhow::bail!("this build does not include the gateway server (enable the 'gateway-server' feature)")
}

async fn run_capture(args: CaptureArgs) -> Result<()> {
    let sources: Vec<CameraSource> = args
        .rear
        .into_iter()
        .map(|path| CameraSource {
            path,
            facing: Facing::Environment,
        })
        .chain(args.camera.into_iter().map(|path| CameraSource {
            path,
            facing: Facing::User,
        }))
        .collect();

    if sources.is_empty() {
        log::warn!("⚠️ No camera sources given (use --rear or --camera)");
    }

    let camera = Arc::new(FileCamera::new(sources));
    let client = Arc::new(GatewayClient::new(
        args.gateway_url,
        Duration::from_secs(args.timeout_secs),
    )?);

    let session = CaptureSession::new(camera, client)
        .with_release_delay(Duration::from_millis(args.release_delay_ms));

    capture::run_interactive(session, args.save_photo).await
}
