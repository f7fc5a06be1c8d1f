//! # Application State
//!
//! State shared by every HTTP request handler. The only interesting resource
//! is the loaded Whisper model: a process-wide singleton, initialized once in
//! `main` before the server binds, and handed to handlers as an explicit
//! shared handle rather than a global.
//!
//! The model sits behind `Arc<tokio::sync::Mutex<…>>` because decoding
//! mutates its internal caches. The mutex doubles as the concurrency model:
//! one transcription runs at a time, and additional requests queue on the
//! lock. That choice is deliberate: CPU inference gains nothing from
//! parallel requests on a single local client's workload.

use crate::config::AppConfig;
use crate::transcription::WhisperModel;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Shared state cloned into every actix worker.
#[derive(Clone)]
pub struct AppState {
    /// Configuration, fixed after startup
    pub config: AppConfig,

    /// The loaded model; locked for the duration of one inference
    pub model: Arc<Mutex<WhisperModel>>,

    /// When the server started
    pub start_time: Instant,
}

impl AppState {
    /// Wrap the loaded model and configuration for sharing across workers.
    pub fn new(config: AppConfig, model: WhisperModel) -> Self {
        Self {
            config,
            model: Arc::new(Mutex::new(model)),
            start_time: Instant::now(),
        }
    }

    /// Server uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
