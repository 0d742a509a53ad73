// Re-export from sub-crates
pub use sori_audio::{AudioCapture, CaptureError, Clip, MicCapture};
pub use sori_core::{
    APP_NAME, APP_NAME_PRETTY, Config, ConfigManager, DEFAULT_LOG_LEVEL, InputMode, ListenState,
    LogNotifier, Notice, Notifier,
};
pub use sori_recognize::{
    EngineConfig, EngineError, EngineEvent, EngineFactory, EventSink, RecognitionEngine,
    RecognitionErrorKind, SessionEvent, SessionId, SpeechSession, normalize,
};
pub use sori_transcribe::{SttClient, SttConfig, TranscribeError, Transcriber};

// App-specific modules
pub mod controller;
pub mod fallback;
pub mod notify;

pub use controller::{AnswerCallback, ListenerBuilder, ListenerOptions, ListeningController};
pub use fallback::{FallbackError, FallbackRecorder};

// Version from this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
