//! Transcription backend library for sori.
//!
//! This crate provides a trait-based abstraction for turning a recorded
//! answer into digits, with an implementation for the quiz service's
//! `/stt` endpoint.

mod stt;

use async_trait::async_trait;
pub use bytes::Bytes;
pub use stt::{SttClient, SttConfig};
use thiserror::Error;

/// Errors that can occur during transcription.
#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Invalid audio format: {0}")]
    InvalidAudioFormat(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),
}

/// Result type for transcription operations.
pub type Result<T> = std::result::Result<T, TranscribeError>;

/// Trait for transcription backends.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a spoken answer.
    ///
    /// # Arguments
    /// * `audio` - Encoded audio (WAV) as reference-counted bytes.
    ///
    /// Returns the number the service heard, or an empty string when it
    /// heard none. Exactly one request is made per call.
    async fn transcribe(&self, audio: Bytes) -> Result<String>;

    /// Returns the name of this transcriber for logging/debugging.
    fn name(&self) -> &str;
}
