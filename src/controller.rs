//! The voice-input lifecycle.
//!
//! [`ListeningController`] keeps the microphone listening for as long as the
//! application wants answers. It owns at most one [`SpeechSession`] at a
//! time, restarts recognition when the platform stops it, gives up for good
//! on a permission error and switches to clip transcription when continuous
//! recognition is not available.
//!
//! All engine events arrive on one channel and are applied in order by a
//! single driver task. Each event carries the id of the session that sent
//! it, and only events from the active session may change state; that check
//! is what makes a stray event from an aborted session harmless.

use std::sync::{Arc, Weak};
use std::time::Duration;

use anyhow::Context;
use parking_lot::{Mutex, RwLock};
use sori_core::{Config, InputMode, ListenState, LogNotifier, Notice, Notifier};
use sori_recognize::{
    EngineConfig, EngineEvent, EngineFactory, RecognitionErrorKind, SessionEvent, SessionId,
    SpeechSession, normalize,
};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::fallback::{FallbackError, FallbackRecorder};

/// Receives each recognized answer as a string of ASCII digits.
pub type AnswerCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Tunables for the listening lifecycle.
#[derive(Debug, Clone)]
pub struct ListenerOptions {
    /// Settings handed to every engine instance
    pub engine: EngineConfig,
    /// Delay before restarting after recognition ends
    pub restart_delay: Duration,
    /// Cap for the restart backoff
    pub max_restart_delay: Duration,
    /// A session that ran at least this long is healthy and resets the backoff
    pub stable_after: Duration,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            restart_delay: Duration::from_millis(200),
            max_restart_delay: Duration::from_secs(5),
            stable_after: Duration::from_secs(1),
        }
    }
}

impl ListenerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            engine: EngineConfig {
                locale: config.locale().to_string(),
                continuous: config.continuous,
                ..Default::default()
            },
            restart_delay: config.restart_delay(),
            max_restart_delay: config.max_restart_delay(),
            ..Default::default()
        }
    }

    /// Restart delay after `short_lived` consecutive sessions that died
    /// young. Doubles from the second one on.
    fn backoff(&self, short_lived: u32) -> Duration {
        let exp = short_lived.saturating_sub(1).min(16);
        self.restart_delay
            .saturating_mul(1 << exp)
            .min(self.max_restart_delay.max(self.restart_delay))
    }
}

/// Builder for [`ListeningController`].
pub struct ListenerBuilder {
    options: ListenerOptions,
    engines: Option<Arc<dyn EngineFactory>>,
    fallback: Option<FallbackRecorder>,
    notifier: Arc<dyn Notifier>,
    on_answer: AnswerCallback,
}

impl ListenerBuilder {
    /// The continuous recognition engine. Without one, every start goes
    /// straight to the fallback path.
    pub fn engines(mut self, engines: Arc<dyn EngineFactory>) -> Self {
        self.engines = Some(engines);
        self
    }

    pub fn fallback(mut self, recorder: FallbackRecorder) -> Self {
        self.fallback = Some(recorder);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn on_answer(mut self, on_answer: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_answer = Arc::new(on_answer);
        self
    }

    /// Build the controller and start its event driver on the current
    /// tokio runtime.
    pub fn build(self) -> anyhow::Result<ListeningController> {
        let runtime = Handle::try_current()
            .context("the listening controller must be built inside a tokio runtime")?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (listening, _) = watch::channel(false);

        let shared = Arc::new_cyclic(|this| Shared {
            this: this.clone(),
            runtime: runtime.clone(),
            options: self.options,
            engines: self.engines,
            fallback: self.fallback,
            notifier: self.notifier,
            answer: RwLock::new(self.on_answer),
            listening,
            events_tx,
            inner: Mutex::new(Inner::default()),
            _shutdown: shutdown_tx,
        });

        runtime.spawn(drive(Arc::downgrade(&shared), events_rx, shutdown_rx));

        Ok(ListeningController { shared })
    }
}

/// Handle to the voice-input lifecycle. Cheap to clone; the last handle to
/// be dropped stops listening and releases the microphone.
#[derive(Clone)]
pub struct ListeningController {
    shared: Arc<Shared>,
}

impl ListeningController {
    pub fn builder(options: ListenerOptions) -> ListenerBuilder {
        ListenerBuilder {
            options,
            engines: None,
            fallback: None,
            notifier: Arc::new(LogNotifier),
            on_answer: Arc::new(|_: &str| {}),
        }
    }

    /// Begin listening. Does nothing while already listening or starting.
    pub fn start_listening(&self) {
        self.shared.start_listening();
    }

    /// Stop listening and release the microphone. Safe to call in any
    /// state, any number of times.
    pub fn stop_listening(&self) {
        self.shared.stop_listening();
    }

    /// Stop listening and give up this handle.
    pub fn shutdown(self) {
        self.shared.stop_listening();
    }

    /// Replace the answer callback. Takes effect for the next result,
    /// including results of sessions that are already running.
    pub fn set_answer_callback(&self, on_answer: impl Fn(&str) + Send + Sync + 'static) {
        *self.shared.answer.write() = Arc::new(on_answer);
    }

    /// Whether the microphone is confirmed live right now.
    pub fn is_listening(&self) -> bool {
        *self.shared.listening.borrow()
    }

    /// Observe the listening flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shared.listening.subscribe()
    }

    pub fn state(&self) -> ListenState {
        self.shared.inner.lock().state
    }

    pub fn mode(&self) -> InputMode {
        self.shared.inner.lock().mode
    }

    /// Whether the application currently wants to be listening.
    pub fn listening_intent(&self) -> bool {
        self.shared.inner.lock().intent
    }

    /// Whether a fallback clip is being transcribed.
    pub fn is_processing(&self) -> bool {
        self.shared.inner.lock().processing
    }
}

struct Shared {
    this: Weak<Shared>,
    runtime: Handle,
    options: ListenerOptions,
    engines: Option<Arc<dyn EngineFactory>>,
    fallback: Option<FallbackRecorder>,
    notifier: Arc<dyn Notifier>,
    answer: RwLock<AnswerCallback>,
    listening: watch::Sender<bool>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    inner: Mutex<Inner>,
    // Dropped with the controller, which ends the driver task.
    _shutdown: oneshot::Sender<()>,
}

#[derive(Default)]
struct Inner {
    intent: bool,
    state: ListenState,
    mode: InputMode,
    active: Option<SpeechSession>,
    /// The last session that ended on its own. It stays open so that its
    /// late results still count, and is aborted once replaced or stopped.
    retired: Option<SpeechSession>,
    next_session: u64,
    /// Bumped by every start and stop; pending restarts and clips from an
    /// older epoch are discarded.
    epoch: u64,
    /// Consecutive sessions that ended before becoming stable
    short_lived: u32,
    listening_since: Option<Instant>,
    heard: bool,
    fallback_task: Option<JoinHandle<()>>,
    processing: bool,
}

/// Work to do once the state lock is released, so that callbacks may call
/// back into the controller.
#[derive(Default)]
struct Followup {
    answer: Option<String>,
    notice: Option<Notice>,
}

impl Followup {
    fn answer(digits: String) -> Self {
        Self {
            answer: Some(digits),
            notice: None,
        }
    }

    fn notice(notice: Notice) -> Self {
        Self {
            answer: None,
            notice: Some(notice),
        }
    }
}

async fn drive(
    shared: Weak<Shared>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let Some(controller) = shared.upgrade() else { break };
                controller.handle(event);
            }
            _ = &mut shutdown => break,
        }
    }
    debug!("listening driver stopped");
}

impl Shared {
    fn start_listening(&self) {
        let mut inner = self.inner.lock();
        if inner.intent && matches!(inner.state, ListenState::Starting | ListenState::Listening) {
            debug!(state = ?inner.state, "already listening");
            return;
        }
        if inner.state == ListenState::Error {
            info!("retrying after microphone permission was denied");
        }
        info!(mode = ?inner.mode, "start listening");
        inner.intent = true;
        inner.short_lived = 0;
        let followup = self.begin(&mut inner);
        drop(inner);
        self.finish(followup);
    }

    fn stop_listening(&self) {
        let mut inner = self.inner.lock();
        let was = inner.state;
        inner.intent = false;
        inner.epoch += 1;
        if let Some(mut session) = inner.active.take() {
            session.abort();
        }
        inner.retired = None;
        if let Some(task) = inner.fallback_task.take() {
            task.abort();
        }
        inner.processing = false;
        inner.state = ListenState::Idle;
        self.set_listening(false);
        drop(inner);

        if let Some(recorder) = &self.fallback {
            recorder.release();
        }
        if was != ListenState::Idle {
            info!("stopped listening");
        }
    }

    /// Tear down whatever is running and start the next attempt.
    fn begin(&self, inner: &mut Inner) -> Followup {
        if let Some(mut stray) = inner.active.take() {
            debug!(session = %stray.id(), "aborting stray session");
            stray.abort();
        }
        if let Some(task) = inner.fallback_task.take() {
            task.abort();
        }
        match inner.mode {
            InputMode::Continuous => self.begin_session(inner),
            InputMode::Fallback => self.begin_fallback(inner),
        }
    }

    fn begin_session(&self, inner: &mut Inner) -> Followup {
        let Some(engines) = self.engines.as_ref() else {
            info!("continuous recognition unavailable, using clip transcription");
            return self.switch_to_fallback(inner);
        };

        let engine = match engines.create() {
            Ok(engine) => engine,
            Err(e) => {
                warn!(engine = engines.name(), error = %e, "recognition engine unavailable");
                return self.switch_to_fallback(inner);
            }
        };

        inner.epoch += 1;
        inner.next_session += 1;
        let mut session = SpeechSession::new(
            SessionId(inner.next_session),
            engine,
            self.events_tx.clone(),
        );
        inner.state = ListenState::Starting;
        inner.listening_since = None;
        inner.heard = false;
        session.start(&self.options.engine);
        inner.active = Some(session);
        Followup::default()
    }

    fn switch_to_fallback(&self, inner: &mut Inner) -> Followup {
        inner.mode = InputMode::Fallback;
        inner.state = ListenState::Idle;
        self.set_listening(false);
        if inner.intent {
            self.begin_fallback(inner)
        } else {
            Followup::default()
        }
    }

    fn begin_fallback(&self, inner: &mut Inner) -> Followup {
        let Some(recorder) = self.fallback.clone() else {
            error!("no way to capture answers on this host");
            inner.intent = false;
            inner.state = ListenState::Idle;
            self.set_listening(false);
            return Followup::notice(Notice::MicrophoneUnavailable);
        };

        inner.epoch += 1;
        let epoch = inner.epoch;
        // Listening once the microphone is confirmed open, see `clip_armed`.
        inner.state = ListenState::Starting;
        self.set_listening(false);
        inner.fallback_task = Some(
            self.runtime
                .spawn(run_fallback(self.this.clone(), recorder, epoch)),
        );
        Followup::default()
    }

    fn handle(&self, SessionEvent { session, event }: SessionEvent) {
        let mut inner = self.inner.lock();
        let is_active = inner.active.as_ref().is_some_and(|s| s.id() == session);

        let followup = if is_active {
            match event {
                EngineEvent::Started => self.on_started(&mut inner, session),
                EngineEvent::Recognized(transcript) => self.on_recognized(&mut inner, &transcript),
                EngineEvent::Ended => self.on_ended(&mut inner, session),
                EngineEvent::Error(kind) => self.on_error(&mut inner, session, kind),
            }
        } else {
            match event {
                EngineEvent::Recognized(transcript)
                    if inner.retired.as_ref().is_some_and(|s| s.id() == session) =>
                {
                    debug!(session = %session, "late result from ended session");
                    self.on_recognized(&mut inner, &transcript)
                }
                event => {
                    debug!(session = %session, event = ?event, "ignoring event from inactive session");
                    Followup::default()
                }
            }
        };

        drop(inner);
        self.finish(followup);
    }

    fn on_started(&self, inner: &mut Inner, session: SessionId) -> Followup {
        if inner.state == ListenState::Starting {
            info!(session = %session, "listening");
            inner.state = ListenState::Listening;
            inner.listening_since = Some(Instant::now());
            self.set_listening(true);
        }
        Followup::default()
    }

    fn on_recognized(&self, inner: &mut Inner, transcript: &str) -> Followup {
        let digits = normalize(transcript);
        debug!(transcript = %transcript, digits = %digits, "speech recognized");
        if digits.is_empty() {
            return Followup::default();
        }
        inner.heard = true;
        inner.short_lived = 0;
        Followup::answer(digits)
    }

    fn on_ended(&self, inner: &mut Inner, session: SessionId) -> Followup {
        // The engine has stopped by itself. Replacing the previous retired
        // session aborts it.
        inner.retired = inner.active.take();
        self.set_listening(false);

        let lived = inner.listening_since.take().map(|since| since.elapsed());
        if inner.heard || lived.is_some_and(|lived| lived >= self.options.stable_after) {
            inner.short_lived = 0;
        } else {
            inner.short_lived = inner.short_lived.saturating_add(1);
        }

        if inner.intent {
            inner.state = ListenState::Starting;
            let delay = self.options.backoff(inner.short_lived);
            debug!(session = %session, delay = ?delay, short_lived = inner.short_lived, "recognition ended, restarting");
            self.schedule_restart(inner, delay);
        } else {
            inner.state = ListenState::Idle;
        }
        Followup::default()
    }

    fn on_error(&self, inner: &mut Inner, session: SessionId, kind: RecognitionErrorKind) -> Followup {
        match kind {
            RecognitionErrorKind::PermissionDenied => {
                warn!(session = %session, "microphone permission denied");
                self.deny_permission(inner)
            }
            RecognitionErrorKind::CaptureUnavailable => {
                warn!(session = %session, "speech capture unavailable, switching to clip transcription");
                if let Some(mut active) = inner.active.take() {
                    active.abort();
                }
                self.switch_to_fallback(inner)
            }
            RecognitionErrorKind::Transient(code) => {
                // The engine follows up with an end, which restarts it.
                debug!(session = %session, code = %code, "transient recognition error");
                Followup::default()
            }
        }
    }

    fn deny_permission(&self, inner: &mut Inner) -> Followup {
        inner.intent = false;
        inner.epoch += 1;
        if let Some(mut active) = inner.active.take() {
            active.abort();
        }
        inner.retired = None;
        inner.state = ListenState::Error;
        self.set_listening(false);
        Followup::notice(Notice::PermissionRequired)
    }

    fn schedule_restart(&self, inner: &Inner, delay: Duration) {
        let epoch = inner.epoch;
        let this = self.this.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = this.upgrade() {
                shared.restart(epoch);
            }
        });
    }

    fn restart(&self, epoch: u64) {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch || !inner.intent {
            debug!("restart superseded");
            return;
        }
        let followup = self.begin(&mut inner);
        drop(inner);
        self.finish(followup);
    }

    /// The microphone is open and the clip is recording.
    fn clip_armed(&self, epoch: u64) {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            return;
        }
        debug!("recording clip");
        inner.state = ListenState::Listening;
        self.set_listening(true);
    }

    /// The clip is recorded and the microphone released. Returns false if
    /// the clip belongs to an attempt that has since been cancelled.
    fn clip_captured(&self, epoch: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            return false;
        }
        inner.processing = true;
        inner.state = ListenState::Starting;
        self.set_listening(false);
        true
    }

    fn fallback_finished(&self, epoch: u64, result: Result<Option<String>, FallbackError>) {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            debug!("discarding result of a cancelled clip");
            return;
        }
        inner.fallback_task = None;
        inner.processing = false;
        self.set_listening(false);

        let followup = match result {
            Ok(Some(digits)) => Followup::answer(digits),
            Ok(None) => {
                debug!("no number in clip");
                Followup::default()
            }
            Err(FallbackError::PermissionDenied) => {
                warn!("microphone permission denied");
                self.deny_permission(&mut inner)
            }
            Err(FallbackError::Capture(e)) => {
                error!(error = %e, "microphone capture failed");
                inner.intent = false;
                Followup::notice(Notice::MicrophoneUnavailable)
            }
            Err(FallbackError::Upload(e)) => {
                warn!(error = %e, "transcription upload failed");
                Followup::notice(Notice::TryAgain)
            }
        };

        if inner.intent {
            inner.state = ListenState::Starting;
            self.schedule_restart(&inner, self.options.restart_delay);
        } else if inner.state != ListenState::Error {
            inner.state = ListenState::Idle;
        }

        drop(inner);
        self.finish(followup);
    }

    fn finish(&self, followup: Followup) {
        if let Some(notice) = followup.notice {
            self.notifier.notify(notice);
        }
        if let Some(digits) = followup.answer {
            // Read at delivery time so a callback swapped mid-session is honored.
            let on_answer = self.answer.read().clone();
            info!(answer = %digits, "answer recognized");
            on_answer(&digits);
        }
    }

    fn set_listening(&self, listening: bool) {
        self.listening.send_if_modified(|current| {
            let changed = *current != listening;
            *current = listening;
            changed
        });
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        inner.intent = false;
        if let Some(mut session) = inner.active.take() {
            session.abort();
        }
        if let Some(task) = inner.fallback_task.take() {
            task.abort();
        }
        if let Some(recorder) = &self.fallback {
            recorder.release();
        }
    }
}

async fn run_fallback(this: Weak<Shared>, recorder: FallbackRecorder, epoch: u64) {
    let (armed_tx, armed_rx) = oneshot::channel();
    let announce = async {
        // Dropped unsent when the microphone never opened.
        if armed_rx.await.is_ok() {
            if let Some(shared) = this.upgrade() {
                shared.clip_armed(epoch);
            }
        }
    };
    let (captured, ()) = tokio::join!(recorder.capture_clip(armed_tx), announce);

    let result = match captured {
        Ok(clip) => {
            match this.upgrade() {
                Some(shared) if shared.clip_captured(epoch) => {}
                _ => return,
            }
            recorder.upload(clip).await
        }
        Err(e) => Err(e),
    };

    if let Some(shared) = this.upgrade() {
        shared.fallback_finished(epoch, result);
    }
}
