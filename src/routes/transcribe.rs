use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;
use crate::transcribe::TranscriptionRequest;

const DEFAULT_FILE_NAME: &str = "audio.webm";

pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new().route(
        "/api/transcribe",
        post(transcribe).layer(DefaultBodyLimit::max(max_upload_bytes)),
    )
}

async fn transcribe(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    let mut request: Option<TranscriptionRequest> = None;
    let mut language: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("audio") => {
                let file_name = field
                    .file_name()
                    .filter(|name| !name.is_empty())
                    .unwrap_or(DEFAULT_FILE_NAME)
                    .to_string();
                let audio = field.bytes().await.map_err(multipart_error)?;
                if !audio.is_empty() {
                    request = Some(TranscriptionRequest {
                        audio,
                        file_name,
                        language: None,
                    });
                }
            }
            Some("language") => {
                let value = field.text().await.map_err(multipart_error)?;
                language = Some(value.trim().to_string()).filter(|v| !v.is_empty());
            }
            _ => {}
        }
    }

    let mut request =
        request.ok_or_else(|| AppError::BadRequest("No audio file provided".into()))?;
    request.language = language;

    tracing::info!(
        user_id = %user.uid,
        bytes = request.audio.len(),
        language = request.language.as_deref().unwrap_or("auto"),
        "Transcribing audio"
    );

    let text = state.transcriber.transcribe(request).await?;
    Ok(Json(json!({ "text": text })))
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Audio file is too large".into())
    } else {
        AppError::BadRequest(err.body_text())
    }
}
