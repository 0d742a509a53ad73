//! A single continuous-recognition attempt.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace, warn};

use crate::engine::{EngineConfig, EngineEvent, RecognitionEngine, RecognitionErrorKind};

/// Identity of a session. Every event carries the id of the session that
/// produced it so the owner can discard events from superseded sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An engine event tagged with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub session: SessionId,
    pub event: EngineEvent,
}

/// Where an engine reports its events. Cheap to clone and usable from any
/// thread. Once the owning session is aborted every emit is dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    session: SessionId,
    open: Arc<AtomicBool>,
    tx: UnboundedSender<SessionEvent>,
}

impl EventSink {
    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn started(&self) {
        self.emit(EngineEvent::Started);
    }

    pub fn ended(&self) {
        self.emit(EngineEvent::Ended);
    }

    pub fn recognized(&self, transcript: impl Into<String>) {
        self.emit(EngineEvent::Recognized(transcript.into()));
    }

    pub fn error(&self, kind: RecognitionErrorKind) {
        self.emit(EngineEvent::Error(kind));
    }

    /// Report an error by its platform code, see [`RecognitionErrorKind::from_code`].
    pub fn error_code(&self, code: &str) {
        self.error(RecognitionErrorKind::from_code(code));
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn emit(&self, event: EngineEvent) {
        if !self.is_open() {
            trace!(session = %self.session, event = ?event, "dropping event from aborted session");
            return;
        }
        // The receiver is gone only when the owner has been torn down.
        self.tx
            .send(SessionEvent {
                session: self.session,
                event,
            })
            .ok();
    }
}

/// Owns exactly one recognition engine instance.
///
/// Dropping a session aborts it, so a live microphone never outlives its
/// owner.
pub struct SpeechSession {
    id: SessionId,
    engine: Box<dyn RecognitionEngine>,
    sink: EventSink,
    aborted: bool,
}

impl SpeechSession {
    pub fn new(
        id: SessionId,
        engine: Box<dyn RecognitionEngine>,
        tx: UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            id,
            engine,
            sink: EventSink {
                session: id,
                open: Arc::new(AtomicBool::new(true)),
                tx,
            },
            aborted: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Configure and start the engine. A start failure is not returned;
    /// it is reported as an error event like any other engine error.
    pub fn start(&mut self, config: &EngineConfig) {
        debug!(session = %self.id, locale = %config.locale, continuous = config.continuous, "starting recognition");
        self.engine.configure(config);
        if let Err(e) = self.engine.start(self.sink.clone()) {
            warn!(session = %self.id, error = %e, "recognition failed to start");
            self.sink.error(e.kind());
        }
    }

    /// Forcibly stop the engine and silence its events. Idempotent.
    pub fn abort(&mut self) {
        if self.aborted {
            return;
        }
        self.aborted = true;
        // Close first so nothing the engine emits while stopping gets through.
        self.sink.open.store(false, Ordering::Release);
        self.engine.abort();
        debug!(session = %self.id, "recognition aborted");
    }
}

impl Drop for SpeechSession {
    fn drop(&mut self) {
        self.abort();
    }
}

impl fmt::Debug for SpeechSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeechSession")
            .field("id", &self.id)
            .field("aborted", &self.aborted)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    use super::*;
    use crate::engine::EngineError;

    #[derive(Clone, Default)]
    struct Spy {
        config: Arc<Mutex<Option<EngineConfig>>>,
        sink: Arc<Mutex<Option<EventSink>>>,
        aborts: Arc<AtomicUsize>,
    }

    struct FakeEngine {
        spy: Spy,
        fail_with: Option<EngineError>,
    }

    impl RecognitionEngine for FakeEngine {
        fn configure(&mut self, config: &EngineConfig) {
            *self.spy.config.lock() = Some(config.clone());
        }

        fn start(&mut self, events: EventSink) -> Result<(), EngineError> {
            if let Some(e) = self.fail_with.take() {
                return Err(e);
            }
            *self.spy.sink.lock() = Some(events);
            Ok(())
        }

        fn abort(&mut self) {
            self.spy.aborts.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn session(fail_with: Option<EngineError>) -> (SpeechSession, Spy, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let spy = Spy::default();
        let engine = FakeEngine {
            spy: spy.clone(),
            fail_with,
        };
        (SpeechSession::new(SessionId(7), Box::new(engine), tx), spy, rx)
    }

    #[test]
    fn test_start_configures_engine() {
        let (mut session, spy, mut rx) = session(None);
        session.start(&EngineConfig::default());

        assert_eq!(spy.config.lock().clone(), Some(EngineConfig::default()));
        let sink = spy.sink.lock().clone().unwrap();
        assert_eq!(sink.session(), SessionId(7));

        sink.started();
        sink.recognized("삼");
        assert_eq!(rx.try_recv().unwrap().event, EngineEvent::Started);
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent {
                session: SessionId(7),
                event: EngineEvent::Recognized("삼".to_string()),
            }
        );
    }

    #[test]
    fn test_start_failure_becomes_error_event() {
        let (mut session, _spy, mut rx) = session(Some(EngineError::Other("boom".into())));
        session.start(&EngineConfig::default());

        assert_eq!(
            rx.try_recv().unwrap().event,
            EngineEvent::Error(RecognitionErrorKind::CaptureUnavailable)
        );
    }

    #[test]
    fn test_abort_is_idempotent_and_silences_sink() {
        let (mut session, spy, mut rx) = session(None);
        session.start(&EngineConfig::default());
        let sink = spy.sink.lock().clone().unwrap();

        session.abort();
        session.abort();
        assert!(!sink.is_open());
        assert_eq!(spy.aborts.load(Ordering::SeqCst), 1);

        sink.recognized("오");
        sink.ended();
        assert!(rx.try_recv().is_err());

        drop(session);
        assert_eq!(spy.aborts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_aborts_engine() {
        let (mut session, spy, _rx) = session(None);
        session.start(&EngineConfig::default());
        drop(session);
        assert_eq!(spy.aborts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_platform_error_code() {
        let (mut session, spy, mut rx) = session(None);
        session.start(&EngineConfig::default());
        spy.sink.lock().clone().unwrap().error_code("no-speech");
        assert_eq!(
            rx.try_recv().unwrap().event,
            EngineEvent::Error(RecognitionErrorKind::Transient("no-speech".into()))
        );
    }
}
