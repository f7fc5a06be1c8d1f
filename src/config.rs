//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER__HOST, APP_MODEL__SIZE, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)
//!
//! Environment variables use `__` between section and key so multi-word
//! keys stay addressable: APP_UPLOAD__MAX_UPLOAD_BYTES maps to
//! `upload.max_upload_bytes`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub upload: UploadConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost
/// - `host = "0.0.0.0"`: Accept connections from any IP address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Whisper model configuration.
///
/// ## Fields:
/// - `size`: Which Whisper model tier to load ("tiny", "base", "small", "medium", "large")
/// - `language`: Fixed target language for transcription (ISO 639-1 code like "en")
///
/// ## Model size trade-offs:
/// - Smaller tiers: Faster processing, less memory, lower accuracy
/// - Larger tiers: Slower processing, more memory, higher accuracy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub size: String,
    pub language: String,
}

/// Upload handling configuration.
///
/// ## Fields:
/// - `scratch_dir`: Directory for transient uploaded files pending transcription
/// - `max_upload_bytes`: Reject uploads larger than this
/// - `allowed_extensions`: File extensions accepted on upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub scratch_dir: String,
    pub max_upload_bytes: usize,
    pub allowed_extensions: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
            },
            model: ModelConfig {
                size: "base".to_string(),
                language: "en".to_string(),
            },
            upload: UploadConfig {
                scratch_dir: "temp_audio".to_string(),
                max_upload_bytes: 50 * 1024 * 1024,
                allowed_extensions: vec![
                    "webm".to_string(),
                    "wav".to_string(),
                    "mp3".to_string(),
                    "ogg".to_string(),
                ],
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, config.toml, and environment variables.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__HOST=127.0.0.1`: Override server host
    /// - `APP_MODEL__SIZE=small`: Override whisper model tier
    /// - `APP_UPLOAD__ALLOWED_EXTENSIONS=wav,mp3`: Override the allow-list
    /// - `HOST` / `PORT`: Special cases used by deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(env_source());

        // Deployment platforms set bare HOST/PORT without the APP_ prefix
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Catching configuration errors early gives a clear message before the
    /// model download starts.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.upload.scratch_dir.trim().is_empty() {
            return Err(anyhow::anyhow!("Scratch directory cannot be empty"));
        }

        if self.upload.max_upload_bytes == 0 {
            return Err(anyhow::anyhow!("Max upload size must be greater than 0"));
        }

        if self.upload.allowed_extensions.is_empty() {
            return Err(anyhow::anyhow!(
                "At least one allowed upload extension is required"
            ));
        }

        self.model
            .size
            .parse::<crate::transcription::ModelSize>()
            .map_err(|e| anyhow::anyhow!("Invalid model size: {}", e))?;

        Ok(())
    }

    /// Check whether an uploaded filename's extension is on the allow-list.
    ///
    /// The comparison is case-insensitive; a filename without an extension
    /// is rejected.
    pub fn extension_allowed(&self, filename: &str) -> bool {
        match filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => self
                .upload
                .allowed_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext)),
            _ => false,
        }
    }
}

/// Environment variable source for the builder.
///
/// `__` separates sections from keys (keys themselves contain `_`), values
/// are parsed into their target types, and the extension allow-list accepts
/// a comma-separated value.
fn env_source() -> config::Environment {
    config::Environment::with_prefix("APP")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("upload.allowed_extensions")
}
