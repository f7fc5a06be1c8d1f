//! # Readiness and Status Handlers
//!
//! Both endpoints are stateless fixed responses. By the time the server is
//! accepting connections the model load has already succeeded (a load failure
//! terminates the process before binding), so "ready" is always truthful and
//! neither endpoint inspects any runtime state beyond the configured tier.

use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Readiness acknowledgment for clients that signal before recording.
///
/// ## Endpoint: `POST /start`
pub async fn start() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ready",
        "message": "Ready to transcribe"
    }))
}

/// Report the loaded model tier.
///
/// ## Endpoint: `GET /status`
pub async fn status(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(status_body(&state.config.model.size))
}

fn status_body(model_size: &str) -> serde_json::Value {
    json!({
        "status": "ready",
        "model": format!("whisper-{}", model_size)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn test_start_always_ready() {
        for _ in 0..3 {
            let response = start().await;
            assert_eq!(response.status(), actix_web::http::StatusCode::OK);
            let bytes = to_bytes(response.into_body()).await.unwrap();
            let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(body["status"], "ready");
            assert_eq!(body["message"], "Ready to transcribe");
        }
    }

    #[test]
    fn test_status_names_model_tier() {
        let body = status_body("base");
        assert_eq!(body["status"], "ready");
        assert_eq!(body["model"], "whisper-base");

        let body = status_body("medium");
        assert_eq!(body["model"], "whisper-medium");
    }
}
