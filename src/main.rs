//! # Transcribe Backend - Main Application Entry Point
//!
//! HTTP service that accepts an uploaded mono 16-bit PCM WAV file and returns
//! the transcript produced by an offline Whisper model. The model is loaded
//! exactly once at startup from a local directory and shared read-only with
//! every request handler.
//!
//! ## Startup sequence (order matters):
//! 1. Load `.env` and initialize structured logging (tracing)
//! 2. Load and validate configuration (config.toml + environment variables)
//! 3. Resolve the model directory - **fatal** if the path does not exist;
//!    the process exits before the listen socket is ever bound
//! 4. Load the recognition engine and wrap it in a shared read-only handle
//! 5. Start the Actix-web server with CORS, logging, and metrics middleware
//!
//! ## Application Architecture:
//! - **config**: layered configuration (TOML file + environment variables)
//! - **state**: shared application state (config, engine handle, metrics)
//! - **audio**: multipart intake, WAV container parsing, scoped temp files
//! - **transcription**: recognition engine seam + Whisper implementation
//! - **handlers**: the `POST /transcribe` request handler
//! - **health / middleware / error**: operational endpoints and error mapping

mod audio;         // Upload intake, WAV parsing, temp-file guard (audio/ directory)
mod config;        // Configuration management (config.rs)
mod error;         // Error handling types (error.rs)
mod handlers;      // HTTP request handlers (handlers/ directory)
mod health;        // Health check endpoints (health.rs)
mod middleware;    // Custom middleware (middleware/ directory)
mod state;         // Application state management (state.rs)
mod transcription; // Recognition engine (transcription/ directory)

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use candle_core::Device;
use config::AppConfig;
use state::AppState;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::transcription::{RecognitionEngine, WhisperEngine};

/// Global shutdown signal shared between the signal-handler task and main.
/// Set once when SIGINT/SIGTERM arrives; main polls it to stop the server.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from files and environment variables
/// 2. **Loads the Whisper model** from the configured directory (fatal on failure)
/// 3. **Creates shared application state** holding the read-only engine handle
/// 4. **Configures the HTTP server** with middleware and routes
/// 5. **Handles graceful shutdown** when receiving system signals
///
/// ## Error Handling:
/// A missing model directory terminates the process with a non-zero exit code
/// before the port is bound - there is nothing useful this service can do
/// without its model. All later, per-request failures are mapped to JSON error
/// responses and never crash the process.
#[actix_web::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    init_tracing()?;

    // Load application configuration from config.toml and environment variables
    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting transcribe-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    // Resolve the model directory before anything else happens. Startup is
    // fatal here: the service must never bind its port without a model.
    let model_dir = Path::new(&config.model.path);
    if !model_dir.exists() {
        error!("Recognition model not found at {}", model_dir.display());
        std::process::exit(1);
    }

    info!("Loading Whisper model from {}", model_dir.display());
    let engine = WhisperEngine::load(model_dir, config.model.language.as_deref(), Device::Cpu)?;
    let engine: Arc<dyn RecognitionEngine> = Arc::new(engine);
    info!("Recognition model '{}' loaded and ready", engine.model_name());

    // Shared state for all request handlers: config, metrics, and the
    // read-only engine handle (dependency injection, no globals).
    let app_state = AppState::new(config.clone(), engine);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    // Set up signal handlers for graceful shutdown (Ctrl+C, SIGTERM, etc.)
    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            // The transcription endpoint lives at the root, matching the
            // contract existing clients already depend on.
            .route("/transcribe", web::post().to(handlers::transcribe))
            .route("/health", web::get().to(health::health_check))
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics)),
            )
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    // Wait for either the server to finish OR a shutdown signal
    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize the tracing (logging) system for the application.
///
/// ## Environment Variables:
/// - `RUST_LOG`: Controls what gets logged (e.g., "debug", "transcribe_backend=debug")
/// - If not set, defaults to "transcribe_backend=debug,actix_web=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "transcribe_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Set up signal handlers for graceful shutdown.
///
/// Listens for SIGTERM and SIGINT in a background task and sets the global
/// shutdown flag when either arrives, so in-flight requests can finish
/// before the server stops.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Wait for the shutdown signal to be set.
///
/// Simple polling loop; 100ms between checks is plenty for a shutdown path.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
