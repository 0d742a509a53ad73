//! Listening state types.

/// Where the voice-input lifecycle currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenState {
    /// Not listening and not about to
    #[default]
    Idle,
    /// A session is being set up, a restart is pending, or a clip is
    /// being transcribed
    Starting,
    /// The engine acknowledged its start, or a fallback clip is recording
    Listening,
    /// Microphone permission was refused. Only an explicit start leaves this.
    Error,
}

/// Which capture path the controller drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// A continuous recognition engine with auto-restart
    #[default]
    Continuous,
    /// Fixed-length clips uploaded for transcription
    Fallback,
}
