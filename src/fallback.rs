//! Record-and-upload answers for hosts without continuous recognition.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use sori_audio::{AudioCapture, CaptureError, Clip};
use sori_recognize::normalize;
use sori_transcribe::{TranscribeError, Transcriber};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum FallbackError {
    /// Microphone access was refused
    #[error("microphone permission denied")]
    PermissionDenied,
    /// Recording failed for any other reason
    #[error("recording failed: {0}")]
    Capture(#[source] CaptureError),
    /// The upload or the service failed; no answer for this attempt
    #[error("upload failed: {0}")]
    Upload(#[from] TranscribeError),
}

impl From<CaptureError> for FallbackError {
    fn from(e: CaptureError) -> Self {
        match e {
            CaptureError::PermissionDenied => FallbackError::PermissionDenied,
            other => FallbackError::Capture(other),
        }
    }
}

/// Records one fixed-length clip and sends it to a transcriber.
#[derive(Clone)]
pub struct FallbackRecorder {
    capture: Arc<dyn AudioCapture>,
    transcriber: Arc<dyn Transcriber>,
    clip_duration: Duration,
}

impl FallbackRecorder {
    pub fn new(
        capture: Arc<dyn AudioCapture>,
        transcriber: Arc<dyn Transcriber>,
        clip_duration: Duration,
    ) -> Self {
        Self {
            capture,
            transcriber,
            clip_duration,
        }
    }

    /// Record one clip. Holds the microphone for the clip duration.
    /// `armed` fires once the microphone is live.
    pub async fn capture_clip(&self, armed: oneshot::Sender<()>) -> Result<Clip, FallbackError> {
        let clip = self.capture.capture(self.clip_duration, armed).await?;
        info!(
            source = self.capture.name(),
            bytes = clip.data().len(),
            length_seconds = clip.duration().as_secs_f64(),
            "clip recorded"
        );
        Ok(clip)
    }

    /// Upload a clip once. Returns the digits heard, if any.
    pub async fn upload(&self, clip: Clip) -> Result<Option<String>, FallbackError> {
        let heard = self
            .transcriber
            .transcribe(Bytes::from(clip.into_data()))
            .await?;
        let digits = normalize(&heard);
        debug!(backend = self.transcriber.name(), heard = %heard, digits = %digits, "clip transcribed");
        Ok((!digits.is_empty()).then_some(digits))
    }

    /// Capture then upload.
    pub async fn record(&self) -> Result<Option<String>, FallbackError> {
        let (armed, _) = oneshot::channel();
        let clip = self.capture_clip(armed).await?;
        self.upload(clip).await
    }

    /// Let go of a microphone kept warm between clips.
    pub fn release(&self) {
        self.capture.release();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;

    /// Capture that opens after `warmup` and returns a tiny clip after the
    /// requested duration.
    #[derive(Default)]
    pub(crate) struct FakeCapture {
        pub(crate) deny: bool,
        pub(crate) warmup: Duration,
        pub(crate) captures: AtomicUsize,
        pub(crate) releases: AtomicUsize,
    }

    #[async_trait]
    impl AudioCapture for FakeCapture {
        async fn capture(
            &self,
            duration: Duration,
            armed: oneshot::Sender<()>,
        ) -> sori_audio::Result<Clip> {
            self.captures.fetch_add(1, Ordering::SeqCst);
            if !self.warmup.is_zero() {
                tokio::time::sleep(self.warmup).await;
            }
            if self.deny {
                return Err(CaptureError::PermissionDenied);
            }
            armed.send(()).ok();
            tokio::time::sleep(duration).await;
            Ok(Clip::new(vec![1, 2, 3, 4], duration))
        }

        fn release(&self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    /// Transcriber that replays scripted replies, then hears nothing.
    #[derive(Default)]
    pub(crate) struct FakeTranscriber {
        pub(crate) replies: Mutex<Vec<Result<String, String>>>,
        pub(crate) uploads: AtomicUsize,
    }

    impl FakeTranscriber {
        pub(crate) fn replying(replies: Vec<Result<&str, &str>>) -> Self {
            let mut replies: Vec<_> = replies
                .into_iter()
                .map(|r| r.map(String::from).map_err(String::from))
                .collect();
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                uploads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Transcriber for FakeTranscriber {
        async fn transcribe(&self, _audio: Bytes) -> sori_transcribe::Result<String> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            match self.replies.lock().pop() {
                Some(Ok(text)) => Ok(text),
                Some(Err(e)) => Err(TranscribeError::ApiError(e)),
                None => Ok(String::new()),
            }
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    fn recorder(capture: FakeCapture, transcriber: FakeTranscriber) -> FallbackRecorder {
        FallbackRecorder::new(
            Arc::new(capture),
            Arc::new(transcriber),
            Duration::from_millis(3500),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_returns_digits() {
        let recorder = recorder(FakeCapture::default(), FakeTranscriber::replying(vec![Ok("7")]));
        assert_eq!(recorder.record().await.unwrap(), Some("7".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_words_are_normalized() {
        let recorder = recorder(FakeCapture::default(), FakeTranscriber::replying(vec![Ok("여덟")]));
        assert_eq!(recorder.record().await.unwrap(), Some("8".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_heard() {
        let recorder = recorder(FakeCapture::default(), FakeTranscriber::replying(vec![Ok("")]));
        assert_eq!(recorder.record().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_reports_when_armed() {
        let recorder = recorder(FakeCapture::default(), FakeTranscriber::default());
        let (armed, mut armed_rx) = oneshot::channel();
        let clip = recorder.capture_clip(armed).await.unwrap();
        assert_eq!(clip.duration(), Duration::from_millis(3500));
        assert_eq!(armed_rx.try_recv(), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_microphone_skips_upload() {
        let transcriber = Arc::new(FakeTranscriber::default());
        let recorder = FallbackRecorder::new(
            Arc::new(FakeCapture {
                deny: true,
                ..Default::default()
            }),
            transcriber.clone(),
            Duration::from_secs(3),
        );
        assert!(matches!(recorder.record().await, Err(FallbackError::PermissionDenied)));
        assert_eq!(transcriber.uploads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_failure_is_reported_once() {
        let transcriber = Arc::new(FakeTranscriber::replying(vec![Err("503")]));
        let recorder = FallbackRecorder::new(
            Arc::new(FakeCapture::default()),
            transcriber.clone(),
            Duration::from_secs(3),
        );
        assert!(matches!(recorder.record().await, Err(FallbackError::Upload(_))));
        assert_eq!(transcriber.uploads.load(Ordering::SeqCst), 1);
    }
}
