//! Fixed-length microphone capture for sori.
//!
//! Used when no continuous recognition engine is available: a short clip is
//! recorded and handed off for remote transcription. The microphone is an
//! exclusive resource, so every capture path releases it on completion, on
//! [`AudioCapture::release`], and when a capture future is dropped midway.

mod mic;
mod writer;

use std::time::Duration;

use async_trait::async_trait;
pub use mic::MicCapture;
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Error)]
pub enum CaptureError {
    /// generic anyhow error
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
    /// The platform refused access to the microphone
    #[error("microphone permission denied")]
    PermissionDenied,
    /// No recording device available
    #[error("no input device available")]
    NoInputDevice,
    /// Sample format not supported
    #[error("sample format not supported: {0}")]
    SampleFormatNotSupported(String),
    /// Build stream error
    #[error(transparent)]
    BuildStream(#[from] cpal::BuildStreamError),
    /// Play stream error
    #[error(transparent)]
    PlayStream(#[from] cpal::PlayStreamError),
}

pub type Result<T> = std::result::Result<T, CaptureError>;

/// A finished recording, encoded as WAV.
#[derive(Debug, Clone)]
pub struct Clip {
    data: Vec<u8>,
    duration: Duration,
}

impl Clip {
    pub fn new(data: Vec<u8>, duration: Duration) -> Self {
        Self { data, duration }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Something that can record a clip of fixed length.
#[async_trait]
pub trait AudioCapture: Send + Sync {
    /// Record for `duration` and return the encoded clip. `armed` fires
    /// once the device is open and samples are being kept; it is dropped
    /// unsent if the microphone never opens. Dropping the returned future
    /// stops the recording and releases the microphone.
    async fn capture(&self, duration: Duration, armed: oneshot::Sender<()>) -> Result<Clip>;

    /// Release a microphone kept open between captures.
    fn release(&self) {}

    /// Returns the name of this capture source for logging/debugging.
    fn name(&self) -> &str;
}
