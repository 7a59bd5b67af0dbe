//! HTTP route handlers.

pub mod auth;
pub mod posts;
pub mod transcribe;

use axum::http::{header, HeaderValue, Method, Uri};
use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Build the complete router with all routes.
pub fn create_router(state: AppState) -> Router {
    let allowed_origins = state.config.server.allowed_origins.clone();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &axum::http::request::Parts| {
                origin_allowed(origin.to_str().unwrap_or(""), &allowed_origins)
            },
        ))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    let max_upload_bytes = state.config.transcription.max_upload_bytes;

    Router::new()
        .route("/health", get(health_check))
        .merge(auth::router())
        .merge(posts::router())
        .merge(transcribe::router(max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Configured origins match exactly. Local development origins match on
/// scheme and host, with any port.
fn origin_allowed(origin: &str, allowed: &[String]) -> bool {
    if allowed.iter().any(|o| o == origin) {
        return true;
    }

    let Ok(uri) = origin.parse::<Uri>() else {
        return false;
    };
    uri.scheme_str() == Some("http") && matches!(uri.host(), Some("localhost" | "127.0.0.1"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn localhost_origins_are_allowed() {
        assert!(origin_allowed("http://localhost:5173", &[]));
        assert!(origin_allowed("http://127.0.0.1:3000", &[]));
    }

    #[test]
    fn configured_origin_is_allowed() {
        let allowed = vec!["https://family.example.com".to_string()];
        assert!(origin_allowed("https://family.example.com", &allowed));
        assert!(!origin_allowed("https://evil.example.com", &allowed));
        assert!(!origin_allowed("http://localhost.evil.example", &allowed));
        assert!(!origin_allowed("http://127.0.0.1.nip.io", &allowed));
        assert!(!origin_allowed("http://localhost@evil.example", &allowed));
        assert!(!origin_allowed("https://localhost", &allowed));
    }

    #[test]
    fn local_origins_allow_any_port() {
        assert!(origin_allowed("http://localhost", &[]));
        assert!(origin_allowed("http://localhost:8080", &[]));
        assert!(!origin_allowed("", &[]));
    }
}
