//! Quiz service speech-to-text endpoint.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CACHE_CONTROL, HeaderValue};
use serde::Deserialize;
use sori_core::DEFAULT_API_URL;
use tracing::debug;

use crate::{Result, TranscribeError, Transcriber};

const STT_PATH: &str = "/stt";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Configuration for the speech-to-text client.
#[derive(Debug, Clone)]
pub struct SttConfig {
    /// Base URL of the quiz service
    pub base_url: String,

    /// Request timeout
    pub timeout: Duration,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

impl SttConfig {
    /// Create a new config for the service at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full URL of the upload endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), STT_PATH)
    }
}

/// Client for the quiz service's `/stt` endpoint.
#[derive(Debug, Clone)]
pub struct SttClient {
    client: reqwest::Client,
    config: SttConfig,
}

#[derive(Debug, Deserialize)]
struct SttResponse {
    #[serde(default)]
    number: Option<String>,
}

impl SttResponse {
    fn into_number(self) -> String {
        self.number.unwrap_or_default().trim().to_string()
    }
}

impl SttClient {
    /// Create a new client with the given configuration.
    pub fn new(config: SttConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &SttConfig {
        &self.config
    }
}

#[async_trait]
impl Transcriber for SttClient {
    async fn transcribe(&self, audio: Bytes) -> Result<String> {
        if audio.is_empty() {
            return Err(TranscribeError::InvalidAudioFormat("empty clip".into()));
        }

        let endpoint = self.config.endpoint();
        debug!(endpoint = %endpoint, audio_bytes = audio.len(), "Uploading clip");

        let audio_len = audio.len() as u64;
        let form = reqwest::multipart::Form::new().part(
            "file",
            reqwest::multipart::Part::stream_with_length(audio, audio_len)
                .file_name("recording.wav")
                .mime_str("audio/wav")
                .map_err(|e| TranscribeError::ApiError(e.to_string()))?,
        );

        // Every answer is a new utterance; nothing here may be served from a cache.
        let response = self
            .client
            .post(&endpoint)
            .header(CACHE_CONTROL, HeaderValue::from_static("no-store"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TranscribeError::ApiError(format!(
                "API returned {}: {}",
                status, body
            )));
        }

        let stt_response: SttResponse = response
            .json()
            .await
            .map_err(|e| TranscribeError::TranscriptionFailed(e.to_string()))?;

        Ok(stt_response.into_number())
    }

    fn name(&self) -> &str {
        "stt"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        assert_eq!(SttConfig::new("http://quiz.test").endpoint(), "http://quiz.test/stt");
        assert_eq!(SttConfig::new("http://quiz.test/").endpoint(), "http://quiz.test/stt");
        assert_eq!(SttConfig::default().endpoint(), "http://localhost:8000/stt");
    }

    #[test]
    fn test_response_number() {
        let response: SttResponse = serde_json::from_str(r#"{"number": " 7 ", "text": "칠"}"#).unwrap();
        assert_eq!(response.into_number(), "7");
    }

    #[test]
    fn test_response_without_number() {
        let response: SttResponse = serde_json::from_str(r#"{"text": "음"}"#).unwrap();
        assert_eq!(response.into_number(), "");
        let response: SttResponse = serde_json::from_str(r#"{"number": null}"#).unwrap();
        assert_eq!(response.into_number(), "");
    }

    #[tokio::test]
    async fn test_empty_clip_is_rejected_before_upload() {
        let client = SttClient::new(SttConfig::new("http://127.0.0.1:9")).unwrap();
        let err = client.transcribe(Bytes::new()).await.unwrap_err();
        assert!(matches!(err, TranscribeError::InvalidAudioFormat(_)));
    }
}
