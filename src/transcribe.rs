//! Speech-to-text through the OpenAI audio transcription API.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::TranscriptionConfig;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub audio: Bytes,
    pub file_name: String,
    pub language: Option<String>,
}

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("transcription is not configured: {0}")]
    NotConfigured(&'static str),

    #[error("transcription request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transcription API error: {status} - {body}")]
    Api { status: u16, body: String },
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, request: TranscriptionRequest) -> Result<String, TranscriptionError>;
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Whisper client.
#[derive(Clone)]
pub struct WhisperClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl WhisperClient {
    pub fn new(config: &TranscriptionConfig) -> Result<Self, TranscriptionError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/transcriptions", self.base_url)
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(&self, request: TranscriptionRequest) -> Result<String, TranscriptionError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(TranscriptionError::NotConfigured("missing API key"))?;

        let audio_len = request.audio.len();
        let file = Part::stream(request.audio).file_name(request.file_name);

        let mut form = Form::new()
            .text("model", self.model.clone())
            .part("file", file);
        if let Some(language) = request.language {
            form = form.text("language", language);
        }

        tracing::debug!(bytes = audio_len, model = %self.model, "Sending audio for transcription");

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let result: TranscriptionResponse = response.json().await?;
        Ok(result.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_key: Option<&str>) -> TranscriptionConfig {
        TranscriptionConfig {
            api_key: api_key.map(str::to_string),
            base_url: "https://api.example.com/v1/".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn endpoint_strips_trailing_slash() {
        let client = WhisperClient::new(&config(Some("sk-test"))).unwrap();
        assert_eq!(
            client.endpoint(),
            "https://api.example.com/v1/audio/transcriptions"
        );
    }

    #[tokio::test]
    async fn missing_api_key_is_not_configured() {
        let client = WhisperClient::new(&config(Some("   "))).unwrap();
        let result = client
            .transcribe(TranscriptionRequest {
                audio: Bytes::from_static(b"RIFF"),
                file_name: "clip.webm".to_string(),
                language: None,
            })
            .await;
        assert!(matches!(result, Err(TranscriptionError::NotConfigured(_))));
    }
}
