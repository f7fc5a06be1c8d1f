//! # Error Handling
//!
//! Custom error types and their conversion to HTTP responses.
//!
//! Every failing request answers with the same JSON shape the client already
//! parses for successes: `{"error": <message>, "transcript": ""}`. The three
//! categories mirror how requests actually fail here:
//!
//! - **BadRequest**: the client sent a malformed upload (400)
//! - **DecoderMissing**: ffmpeg is not installed or not on the search path (500)
//! - **Inference**: the model or decoder failed on an otherwise valid upload (500)
//! - **Internal**: anything else server-side, e.g. scratch file I/O (500)
//!
//! Full diagnostics always go to the log; the response carries only the
//! message. No error is retried, and none of them crashes the process.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Guidance returned when the external decoder binary cannot be found.
/// Deliberately actionable text instead of a raw spawn error.
pub const DECODER_GUIDANCE: &str =
    "FFmpeg not installed. Please install FFmpeg for audio processing \
     (https://ffmpeg.org/download.html) or place a copy under models/ffmpeg/bin.";

/// Custom error types for the transcription API.
#[derive(Debug)]
pub enum ApiError {
    /// Client sent an invalid or malformed upload
    BadRequest(String),

    /// The external decoder binary (ffmpeg) is unreachable
    DecoderMissing,

    /// Decoding or model inference failed for this request
    Inference(String),

    /// Server-side problems (scratch file I/O, lock poisoning, etc.)
    Internal(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::DecoderMissing => write!(f, "{}", DECODER_GUIDANCE),
            ApiError::Inference(msg) => write!(f, "Transcription error: {}", msg),
            ApiError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

/// Converts errors into the wire-contract JSON body with the right status.
///
/// The `transcript` field is always present (and empty) so the client can
/// read one shape for both outcomes.
impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => {
                (actix_web::http::StatusCode::BAD_REQUEST, msg.clone())
            }
            ApiError::DecoderMissing => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                DECODER_GUIDANCE.to_string(),
            ),
            ApiError::Inference(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                msg.clone(),
            ),
            ApiError::Internal(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": message,
            "transcript": ""
        }))
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

/// Shorthand for handler results.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use actix_web::http::StatusCode;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.error_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[actix_web::test]
    async fn test_bad_request_shape() {
        let (status, body) = body_json(ApiError::BadRequest("No audio file".to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No audio file");
        assert_eq!(body["transcript"], "");
    }

    #[actix_web::test]
    async fn test_decoder_missing_carries_guidance() {
        let (status, body) = body_json(ApiError::DecoderMissing).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = body["error"].as_str().unwrap();
        assert!(message.contains("install FFmpeg"));
        assert!(message.contains("ffmpeg.org"));
        assert_eq!(body["transcript"], "");
    }

    #[actix_web::test]
    async fn test_inference_error_is_server_side() {
        let (status, body) =
            body_json(ApiError::Inference("unexpected end of stream".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "unexpected end of stream");
    }
}
