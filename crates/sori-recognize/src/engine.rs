//! The boundary to a platform speech recognition engine.

use sori_core::DEFAULT_LOCALE;
use thiserror::Error;

use crate::session::EventSink;

/// Settings applied to an engine before it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Recognition locale, e.g. "ko-KR"
    pub locale: String,
    /// Keep recognizing across utterances instead of stopping after one
    pub continuous: bool,
    /// Report partial hypotheses while the child is still speaking
    pub interim_results: bool,
    /// Number of alternatives per result
    pub max_alternatives: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            locale: DEFAULT_LOCALE.to_string(),
            continuous: true,
            interim_results: false,
            max_alternatives: 1,
        }
    }
}

/// Errors raised synchronously by an engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("speech recognition is not supported on this platform")]
    Unsupported,

    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("recognition already started")]
    AlreadyStarted,

    #[error("recognition engine failed: {0}")]
    Other(String),
}

impl EngineError {
    /// How the lifecycle controller should treat a failed start.
    pub fn kind(&self) -> RecognitionErrorKind {
        match self {
            EngineError::PermissionDenied => RecognitionErrorKind::PermissionDenied,
            _ => RecognitionErrorKind::CaptureUnavailable,
        }
    }
}

/// Classification of asynchronous engine errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    /// The user refused microphone access. Terminal.
    PermissionDenied,
    /// The platform cannot capture or recognize at all. Switch to fallback.
    CaptureUnavailable,
    /// Silence timeout, network hiccup and the like. The engine reports an
    /// end right after, and that end drives the restart.
    Transient(String),
}

impl RecognitionErrorKind {
    /// Map a platform error code (Web Speech API naming) to a kind.
    pub fn from_code(code: &str) -> Self {
        match code {
            "not-allowed" | "service-not-allowed" => Self::PermissionDenied,
            "audio-capture" | "language-not-supported" => Self::CaptureUnavailable,
            other => Self::Transient(other.to_string()),
        }
    }
}

/// Events an engine reports about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The engine acknowledged its start and the microphone is live
    Started,
    /// The engine stopped, on its own or otherwise
    Ended,
    /// Final transcript of one utterance (best alternative only)
    Recognized(String),
    Error(RecognitionErrorKind),
}

/// One native recognition engine instance.
///
/// An instance is started at most once. Events are reported through the
/// [`EventSink`] handed to [`start`](RecognitionEngine::start) and may be
/// emitted from any thread.
pub trait RecognitionEngine: Send {
    /// Apply settings. Called once, before `start`.
    fn configure(&mut self, config: &EngineConfig);

    /// Begin capturing. Returning an error means no events will follow.
    fn start(&mut self, events: EventSink) -> Result<(), EngineError>;

    /// Stop immediately and release the microphone. Must tolerate being
    /// called on an engine that already ended or never started.
    fn abort(&mut self);
}

/// Creates fresh engine instances, one per session.
pub trait EngineFactory: Send + Sync {
    /// Fails with [`EngineError::Unsupported`] where the platform has no
    /// continuous recognition.
    fn create(&self) -> Result<Box<dyn RecognitionEngine>, EngineError>;

    /// Returns the name of this engine for logging/debugging.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_engine_config() {
        let config = EngineConfig::default();
        assert_eq!(config.locale, "ko-KR");
        assert!(config.continuous);
        assert!(!config.interim_results);
        assert_eq!(config.max_alternatives, 1);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            RecognitionErrorKind::from_code("not-allowed"),
            RecognitionErrorKind::PermissionDenied
        );
        assert_eq!(
            RecognitionErrorKind::from_code("service-not-allowed"),
            RecognitionErrorKind::PermissionDenied
        );
        assert_eq!(
            RecognitionErrorKind::from_code("audio-capture"),
            RecognitionErrorKind::CaptureUnavailable
        );
        assert_eq!(
            RecognitionErrorKind::from_code("no-speech"),
            RecognitionErrorKind::Transient("no-speech".to_string())
        );
        assert_eq!(
            RecognitionErrorKind::from_code("network"),
            RecognitionErrorKind::Transient("network".to_string())
        );
    }

    #[test]
    fn test_start_failure_kinds() {
        assert_eq!(
            EngineError::PermissionDenied.kind(),
            RecognitionErrorKind::PermissionDenied
        );
        assert_eq!(
            EngineError::AlreadyStarted.kind(),
            RecognitionErrorKind::CaptureUnavailable
        );
        assert_eq!(
            EngineError::Unsupported.kind(),
            RecognitionErrorKind::CaptureUnavailable
        );
    }
}
