//! # Whisper Transcription Service
//!
//! A minimal HTTP wrapper around a pretrained Whisper model. One endpoint
//! does the work: upload an audio file, get a transcript back. Plus a
//! readiness probe and a status query for the local client application.
//!
//! ## Startup order matters:
//! 1. Load and validate configuration
//! 2. Create the scratch directory for uploads
//! 3. Load the Whisper model (fatal on failure: the process exits before
//!    the server ever binds, so a running server always has a usable model)
//! 4. Bind and serve until SIGINT/SIGTERM

mod audio;
mod config;
mod error;
mod handlers;
mod middleware;
mod scratch;
mod state;
mod transcription;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::{Context, Result};
use config::AppConfig;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use transcription::{ModelSize, WhisperModel};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Global shutdown flag set by the signal handler task.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting whisper-service v{}", env!("CARGO_PKG_VERSION"));

    scratch::ensure_scratch_dir(&config.upload.scratch_dir)
        .with_context(|| format!("Failed to create scratch dir {}", config.upload.scratch_dir))?;

    // Model load is the one unrecoverable startup step; ? here means a bad
    // model configuration or download kills the process before binding.
    let model_size: ModelSize = config.model.size.parse()?;
    let model = WhisperModel::load(model_size).await?;
    info!("Model ready: whisper-{}", model.size());

    let app_state = AppState::new(config.clone(), model);
    let shutdown_state = app_state.clone();
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);
    info!("Endpoints: POST /transcribe, POST /start, GET /status");

    let server = HttpServer::new(move || {
        // The local client runs on a different origin (Electron/browser), so
        // cross-origin requests are permitted from anywhere.
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(middleware::RequestLogging)
            .route("/transcribe", web::post().to(handlers::transcribe))
            .route("/start", web::post().to(handlers::start))
            .route("/status", web::get().to(handlers::status))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

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

    info!(
        "Server stopped gracefully after {}s uptime",
        shutdown_state.uptime_seconds()
    );
    Ok(())
}

/// Initialize tracing with an env-filter; RUST_LOG overrides the default.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whisper_service=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Install SIGTERM/SIGINT handlers that flip the global shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
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

/// Poll the shutdown flag until it is set.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
