use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::models::{Comment, CommentWithUser, NewPost, Post, PostPatch, PostWithUser};
use crate::error::AppResult;
use crate::extractors::{ApiJson, ApiPath, CurrentUser};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    #[serde(default)]
    pub content: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/posts", get(list_posts).post(create_post))
        .route("/api/posts/user/{user_id}", get(list_user_posts))
        .route("/api/posts/{id}", put(update_post).delete(delete_post))
        .route(
            "/api/posts/{post_id}/comments",
            get(list_comments).post(create_comment),
        )
        .route(
            "/api/posts/{post_id}/like",
            get(like_status).post(like_post).delete(unlike_post),
        )
}

// --- Posts ---

async fn list_posts(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> AppResult<Json<Vec<PostWithUser>>> {
    Ok(Json(state.feed.list_all_posts().await?))
}

async fn list_user_posts(
    State(state): State<AppState>,
    _user: CurrentUser,
    ApiPath(user_id): ApiPath<String>,
) -> AppResult<Json<Vec<PostWithUser>>> {
    Ok(Json(state.feed.list_posts_by_user(&user_id).await?))
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(payload): ApiJson<NewPost>,
) -> AppResult<(StatusCode, Json<Post>)> {
    let post = state.feed.create_post(&user.uid, payload).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn update_post(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(patch): ApiJson<PostPatch>,
) -> AppResult<Json<Post>> {
    Ok(Json(state.feed.update_post(&user.uid, id, patch).await?))
}

async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<StatusCode> {
    state.feed.delete_post(&user.uid, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Comments ---

async fn list_comments(
    State(state): State<AppState>,
    _user: CurrentUser,
    ApiPath(post_id): ApiPath<i64>,
) -> AppResult<Json<Vec<CommentWithUser>>> {
    Ok(Json(state.feed.list_comments(post_id).await?))
}

async fn create_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(post_id): ApiPath<i64>,
    ApiJson(req): ApiJson<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    let comment = state
        .feed
        .create_comment(&user.uid, post_id, &req.content)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

// --- Likes ---

async fn like_status(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(post_id): ApiPath<i64>,
) -> AppResult<Json<Value>> {
    let liked = state.feed.has_liked(&user.uid, post_id).await?;
    Ok(Json(json!({ "liked": liked })))
}

async fn like_post(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(post_id): ApiPath<i64>,
) -> AppResult<(StatusCode, Json<Value>)> {
    state.feed.like_post(&user.uid, post_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Post liked successfully" })),
    ))
}

async fn unlike_post(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(post_id): ApiPath<i64>,
) -> AppResult<StatusCode> {
    state.feed.unlike_post(&user.uid, post_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
