//! Speech recognition building blocks for sori.
//!
//! The recognition engine itself is a platform capability, so this crate
//! only defines the boundary ([`RecognitionEngine`], [`EngineFactory`]) and
//! the [`SpeechSession`] that owns exactly one engine instance at a time.
//! Spoken answers are turned into digits by [`normalize`].

mod engine;
mod korean;
mod session;

pub use engine::{
    EngineConfig, EngineError, EngineEvent, EngineFactory, RecognitionEngine,
    RecognitionErrorKind,
};
pub use korean::normalize;
pub use session::{EventSink, SessionEvent, SessionId, SpeechSession};
