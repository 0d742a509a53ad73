//! User-facing notices.
//!
//! Recognition failures never propagate as errors to the caller. The few
//! that a child (or their parent) must act on are surfaced as a [`Notice`]
//! through whatever [`Notifier`] the host installs.

use tracing::warn;

/// Something the user should be told.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// Microphone access was denied; listening is disabled until granted.
    PermissionRequired,
    /// No usable microphone or capture path exists.
    MicrophoneUnavailable,
    /// An answer could not be understood this time.
    TryAgain,
}

impl Notice {
    /// Short summary line.
    pub fn summary(&self) -> &'static str {
        match self {
            Notice::PermissionRequired => "Microphone permission required",
            Notice::MicrophoneUnavailable => "Microphone unavailable",
            Notice::TryAgain => "Try again",
        }
    }

    /// The message shown to the child.
    pub fn message(&self) -> &'static str {
        match self {
            Notice::PermissionRequired => "마이크 권한이 필요해요! 설정에서 허용해주세요. 🎤",
            Notice::MicrophoneUnavailable => "마이크를 찾을 수 없어요. 연결을 확인해주세요.",
            Notice::TryAgain => "잘 못 들었어요. 다시 말해줄래요?",
        }
    }
}

/// Sink for user-facing notices.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Notifier that only writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        warn!(notice = ?notice, "{}", notice.message());
    }
}
