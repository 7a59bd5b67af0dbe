use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::auth::IdentityError;
use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::extractors::{ApiJson, CurrentUser};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct VerifyTokenRequest {
    pub token: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/user", get(current_user))
        .route("/api/auth/status", get(auth_status))
        .route("/api/verify-token", post(verify_token))
        .route("/api/logout", post(logout))
}

async fn current_user(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<User>> {
    let record = state
        .feed
        .get_user(&user.uid)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(record))
}

async fn auth_status(user: CurrentUser) -> Response {
    Json(json!({ "authenticated": true, "user": user })).into_response()
}

/// Lets a client check a token without touching any other state.
async fn verify_token(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<VerifyTokenRequest>,
) -> AppResult<Response> {
    let Some(token) = req.token.filter(|t| !t.trim().is_empty()) else {
        return Err(AppError::BadRequest("No token provided".into()));
    };

    match state.identity.verify(&token).await {
        Ok(identity) => Ok(Json(json!({
            "authenticated": true,
            "uid": identity.subject_id,
        }))
        .into_response()),
        Err(IdentityError::Invalid(reason)) => {
            tracing::debug!("Token verification failed: {}", reason);
            Ok((
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "authenticated": false,
                    "message": "Invalid token",
                })),
            )
                .into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// Tokens live on the client; the server has nothing to tear down.
async fn logout() -> Json<serde_json::Value> {
    Json(json!({ "success": true }))
}
