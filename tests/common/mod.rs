use std::sync::Arc;

use async_trait::async_trait;
use kinfeed::auth::{IdentityError, IdentityVerifier, VerifiedIdentity};
use kinfeed::config::Config;
use kinfeed::db;
use kinfeed::feed::FeedService;
use kinfeed::routes::create_router;
use kinfeed::state::AppState;
use kinfeed::transcribe::{Transcriber, TranscriptionError, TranscriptionRequest};
use tempfile::TempDir;

/// Accepts `user:<uid>` tokens; `down` simulates an unreachable provider.
pub struct FakeVerifier;

#[async_trait]
impl IdentityVerifier for FakeVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
        if token == "down" {
            return Err(IdentityError::Unavailable("keys unreachable".into()));
        }
        let uid = token
            .strip_prefix("user:")
            .ok_or_else(|| IdentityError::Invalid("unknown test token".into()))?;
        Ok(VerifiedIdentity {
            subject_id: uid.to_string(),
            email: Some(format!("{uid}@example.com")),
            display_name: Some(format!("Test {uid} Family")),
            photo_url: None,
        })
    }
}

/// Echoes the language and audio length so tests can see what arrived.
pub struct FakeTranscriber;

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, request: TranscriptionRequest) -> Result<String, TranscriptionError> {
        if request.file_name == "fail.webm" {
            return Err(TranscriptionError::Api {
                status: 500,
                body: "model exploded".into(),
            });
        }
        Ok(format!(
            "{} bytes in {}",
            request.audio.len(),
            request.language.as_deref().unwrap_or("auto")
        ))
    }
}

/// Fresh migrated database in a temporary directory.
#[allow(dead_code)]
pub fn test_feed() -> (TempDir, FeedService) {
    let temp_dir = TempDir::new().unwrap();
    let pool = db::create_pool(&temp_dir.path().join("test.db")).expect("create test database");
    db::run_migrations(&pool).expect("run migrations");
    (temp_dir, FeedService::sqlite(pool))
}

/// Router wired to a fresh database and the fake collaborators.
#[allow(dead_code)]
pub fn create_test_app() -> (TempDir, axum::Router, FeedService) {
    let (temp_dir, feed) = test_feed();
    let mut config = Config::default();
    config.transcription.max_upload_bytes = 64 * 1024;

    let state = AppState {
        config,
        feed: feed.clone(),
        identity: Arc::new(FakeVerifier),
        transcriber: Arc::new(FakeTranscriber),
    };

    (temp_dir, create_router(state), feed)
}
