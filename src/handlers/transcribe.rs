//! # Transcription Handler
//!
//! The one endpoint that does real work. The request carries a single audio
//! file in a multipart field named "audio"; the response carries the trimmed
//! transcript and the language it was transcribed in.
//!
//! ## Request flow:
//! 1. Walk the multipart payload and collect the "audio" field
//! 2. Validate: part present, filename non-empty, extension allowed, size cap
//! 3. Persist to a per-request scratch file (removed again on every exit path)
//! 4. Decode to 16 kHz mono samples via the external ffmpeg binary
//! 5. Run Whisper inference under the model lock
//!
//! Inference is serialized by the model mutex: requests that arrive while one
//! is being transcribed wait their turn.

use crate::audio::decode_to_samples;
use crate::config::AppConfig;
use crate::error::{ApiError, ApiResult};
use crate::scratch::ScratchFile;
use crate::state::AppState;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::StreamExt;
use serde_json::json;
use tracing::{info, warn};

/// Transcribe an uploaded audio file.
///
/// ## Endpoint: `POST /transcribe`
///
/// ## Success response:
/// ```json
/// {
///   "status": "success",
///   "transcript": "Hello world.",
///   "language": "en"
/// }
/// ```
///
/// Failures answer `{"error": <message>, "transcript": ""}` with 4xx/5xx.
pub async fn transcribe(
    state: web::Data<AppState>,
    payload: Multipart,
) -> ApiResult<HttpResponse> {
    let upload = read_audio_field(payload, state.config.upload.max_upload_bytes).await?;
    let upload = validate_upload(upload, &state.config)?;

    let filename = upload.filename;
    info!(
        filename = %filename,
        size = upload.bytes.len(),
        "Transcribing upload"
    );

    let scratch = ScratchFile::create(
        &state.config.upload.scratch_dir,
        file_extension(&filename),
        &upload.bytes,
    )?;

    // Scratch file removal rides on the guard's Drop, so every exit path
    // below leaves the directory clean.
    let samples = decode_to_samples(scratch.path())?;

    let language = state.config.model.language.clone();
    let transcript = {
        let mut model = state.model.lock().await;
        model.transcribe(&samples, &language).map_err(|e| {
            warn!(error = %e, filename = %filename, "Transcription failed");
            ApiError::Inference(e.to_string())
        })?
    };

    info!(filename = %filename, chars = transcript.len(), "Transcription complete");

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "transcript": transcript.trim(),
        "language": language
    })))
}

#[derive(Debug)]
struct AudioUpload {
    filename: String,
    bytes: Vec<u8>,
}

/// Collect the "audio" field from the multipart payload.
///
/// Other fields are drained and ignored. Absence of an "audio" field is not
/// an error here; `validate_upload` turns it into one.
async fn read_audio_field(
    mut payload: Multipart,
    max_bytes: usize,
) -> ApiResult<Option<AudioUpload>> {
    let mut upload: Option<AudioUpload> = None;

    while let Some(item) = payload.next().await {
        let mut field = item
            .map_err(|e| ApiError::BadRequest(format!("Multipart error: {}", e)))?;

        let Some(content_disposition) = field.content_disposition() else {
            continue;
        };

        if content_disposition.get_name() != Some("audio") {
            continue;
        }

        let filename = content_disposition
            .get_filename()
            .unwrap_or_default()
            .to_string();

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk =
                chunk.map_err(|e| ApiError::BadRequest(format!("Upload read error: {}", e)))?;
            if bytes.len() + chunk.len() > max_bytes {
                return Err(ApiError::BadRequest(format!(
                    "File too large (max: {} bytes)",
                    max_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        upload = Some(AudioUpload { filename, bytes });
    }

    Ok(upload)
}

/// Reject uploads the decoder should never see: a payload without an "audio"
/// field, a part with no filename, or a filename outside the allow-list.
fn validate_upload(upload: Option<AudioUpload>, config: &AppConfig) -> ApiResult<AudioUpload> {
    let upload = upload.ok_or_else(|| ApiError::BadRequest("No audio file".to_string()))?;

    if upload.filename.is_empty() {
        return Err(ApiError::BadRequest("No selected file".to_string()));
    }

    if !config.extension_allowed(&upload.filename) {
        return Err(ApiError::BadRequest(format!(
            "Unsupported file type: {} (allowed: {})",
            upload.filename,
            config.upload.allowed_extensions.join(", ")
        )));
    }

    Ok(upload)
}

/// Extension of the uploaded filename, without the dot. Empty when absent.
fn file_extension(filename: &str) -> &str {
    filename.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::ResponseError;

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("recording.webm"), "webm");
        assert_eq!(file_extension("clip.take2.mp3"), "mp3");
        assert_eq!(file_extension("noext"), "");
    }

    fn upload(filename: &str) -> Option<AudioUpload> {
        Some(AudioUpload {
            filename: filename.to_string(),
            bytes: vec![0u8; 16],
        })
    }

    #[test]
    fn test_missing_audio_field_rejected() {
        let err = validate_upload(None, &AppConfig::default()).unwrap_err();
        match err {
            ApiError::BadRequest(msg) => assert_eq!(msg, "No audio file"),
            other => panic!("expected BadRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_filename_rejected() {
        let err = validate_upload(upload(""), &AppConfig::default()).unwrap_err();
        match err {
            ApiError::BadRequest(msg) => assert_eq!(msg, "No selected file"),
            other => panic!("expected BadRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_disallowed_extension_rejected() {
        let err = validate_upload(upload("notes.txt"), &AppConfig::default()).unwrap_err();
        match err {
            ApiError::BadRequest(msg) => {
                assert!(msg.contains("Unsupported file type: notes.txt"));
                assert!(msg.contains("webm"));
            }
            other => panic!("expected BadRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_allowed_upload_passes_through() {
        let accepted = validate_upload(upload("clip.WAV"), &AppConfig::default()).unwrap();
        assert_eq!(accepted.filename, "clip.WAV");
        assert_eq!(accepted.bytes.len(), 16);
    }

    #[actix_web::test]
    async fn test_validation_errors_use_wire_shape() {
        let err = validate_upload(None, &AppConfig::default()).unwrap_err();
        let response = err.error_response();
        assert_eq!(response.status(), actix_web::http::StatusCode::BAD_REQUEST);

        let bytes = actix_web::body::to_bytes(response.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "No audio file");
        assert_eq!(body["transcript"], "");
    }
}

