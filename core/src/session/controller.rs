use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, trace, warn, Instrument};

use super::state::{SessionState, SessionStats, StatsCounters};
use crate::decoder::{DecoderConfig, FrameDecoder};
use crate::frame::Frame;
use crate::rate::DerivedPoint;
use crate::reducer::{Fold, MetricsReducer, Reducer, Transcript, TranscriptReducer};
use crate::source::ChunkSource;

/// Session controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Prefix of session ids; also tags log lines
    pub name: String,
    pub decoder: DecoderConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            name: "rill".to_string(),
            decoder: DecoderConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_decoder(mut self, decoder: DecoderConfig) -> Self {
        self.decoder = decoder;
        self
    }
}

/// State shared between a session's read loop and its handles
struct SessionShared<S> {
    id: String,
    state: watch::Sender<SessionState>,
    output: RwLock<S>,
    /// First error message; transport or producer
    error: OnceLock<String>,
    paused: AtomicBool,
    token: CancellationToken,
    stats: StatsCounters,
}

impl<S> SessionShared<S> {
    fn new(id: String, initial: S) -> Self {
        let (state, _) = watch::channel(SessionState::Connecting);
        Self {
            id,
            state,
            output: RwLock::new(initial),
            error: OnceLock::new(),
            paused: AtomicBool::new(false),
            token: CancellationToken::new(),
            stats: StatsCounters::default(),
        }
    }

    fn current(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Move forward unless already terminal. Returns whether the state changed.
    fn transition(&self, next: SessionState) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if current.is_terminal() || *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            debug!(target: "session", id = %self.id, state = %next, "Session state changed");
        }
        changed
    }

    fn is_live(&self) -> bool {
        !self.token.is_cancelled() && !self.current().is_terminal()
    }

    fn cancel(&self) -> bool {
        let cancelled = self.transition(SessionState::Cancelled);
        if cancelled {
            self.token.cancel();
        }
        cancelled
    }

    fn fail(&self, message: String) {
        if self.current().is_terminal() {
            return;
        }
        warn!(target: "session", id = %self.id, error = %message, "Session failed");
        let _ = self.error.set(message);
        self.transition(SessionState::Errored);
    }

    fn record_producer_error(&self, message: String) {
        if self.error.set(message.clone()).is_ok() {
            warn!(
                target: "session",
                id = %self.id,
                error = %message,
                "Producer reported an error; draining stream"
            );
        }
    }

    /// Natural end of the byte stream
    fn finish(&self, unterminated: usize) {
        if unterminated > 0 {
            debug!(
                target: "session",
                id = %self.id,
                bytes = unterminated,
                "Stream ended inside a line; discarding tail"
            );
        }
        let outcome = if self.error.get().is_some() {
            SessionState::Errored
        } else {
            SessionState::Completed
        };
        if self.transition(outcome) {
            info!(target: "session", id = %self.id, state = %outcome, "Session finished");
        }
    }
}

/// Reader-side handle to one session.
///
/// Cheap to clone. Dropping handles does not stop the session; use
/// [`SessionHandle::cancel`] or drop the owning controller.
pub struct SessionHandle<S> {
    shared: Arc<SessionShared<S>>,
}

impl<S> Clone for SessionHandle<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S> std::fmt::Debug for SessionHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.shared.id)
            .field("state", &self.shared.current())
            .finish()
    }
}

impl<S: Send + Sync + 'static> SessionHandle<S> {
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn state(&self) -> SessionState {
        self.shared.current()
    }

    /// Error message, present only when the session ended `Errored`
    pub fn error(&self) -> Option<String> {
        if self.state() != SessionState::Errored {
            return None;
        }
        self.shared.error.get().cloned()
    }

    pub fn stats(&self) -> SessionStats {
        self.shared.stats.snapshot()
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    /// Stop handing frames to the reducer.
    ///
    /// The byte source keeps being drained and decoded so the transport does
    /// not stall, but every frame decoded while paused is discarded. Resuming
    /// does not replay them.
    pub fn pause(&self) {
        if !self.shared.paused.swap(true, Ordering::AcqRel) {
            info!(target: "session", id = %self.shared.id, "Session paused; frames will be discarded");
        }
    }

    pub fn resume(&self) {
        if self.shared.paused.swap(false, Ordering::AcqRel) {
            info!(target: "session", id = %self.shared.id, "Session resumed");
        }
    }

    /// Cancel the session. Returns `false` if it had already ended.
    pub fn cancel(&self) -> bool {
        let cancelled = self.shared.cancel();
        if cancelled {
            info!(target: "session", id = %self.shared.id, "Session cancelled");
        }
        cancelled
    }

    /// Cancel the session if it is still running after `deadline`
    pub fn cancel_after(&self, deadline: Duration) -> JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(deadline) => {
                    if handle.cancel() {
                        info!(
                            target: "session",
                            id = %handle.id(),
                            deadline_ms = deadline.as_millis() as u64,
                            "Session deadline exceeded"
                        );
                    }
                }
                _ = handle.wait() => {}
            }
        })
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Wait until the session reaches a terminal state
    pub async fn wait(&self) -> SessionState {
        let mut rx = self.subscribe();
        let result = rx.wait_for(|s| s.is_terminal()).await.map(|s| *s);
        result.unwrap_or_else(|_| self.state())
    }

    /// Read the reducer state
    pub async fn read<T>(&self, f: impl FnOnce(&S) -> T) -> T {
        let guard = self.shared.output.read().await;
        f(&guard)
    }

    /// Copy of the reducer state
    pub async fn snapshot(&self) -> S
    where
        S: Clone,
    {
        self.shared.output.read().await.clone()
    }
}

/// Owns one decode session at a time.
///
/// Must be used from within a Tokio runtime: `start` spawns the read loop.
pub struct SessionController<R: Reducer> {
    config: ControllerConfig,
    current: Option<SessionHandle<R::State>>,
    started: u64,
}

impl<R: Reducer> Default for SessionController<R> {
    fn default() -> Self {
        Self::new(ControllerConfig::default())
    }
}

impl<R: Reducer> SessionController<R> {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            current: None,
            started: 0,
        }
    }

    /// Start a new session reading `source` and folding with `reducer`.
    ///
    /// Any session still connecting or streaming is cancelled first; nothing
    /// it decodes afterwards reaches its reducer.
    pub fn start<S>(&mut self, source: S, reducer: R) -> SessionHandle<R::State>
    where
        S: ChunkSource + 'static,
    {
        if let Some(prev) = self.current.take() {
            if prev.shared.cancel() {
                info!(target: "session", id = %prev.id(), "Session superseded");
            }
        }

        self.started += 1;
        let id = format!("{}-{}", self.config.name, self.started);
        let shared = Arc::new(SessionShared::new(id.clone(), reducer.initial_state()));
        let handle = SessionHandle {
            shared: Arc::clone(&shared),
        };

        info!(target: "session", id = %id, "Session starting");
        let span = info_span!("session", id = %id);
        tokio::spawn(drive(shared, source, reducer, self.config.decoder.clone()).instrument(span));

        self.current = Some(handle.clone());
        handle
    }

    pub fn current(&self) -> Option<&SessionHandle<R::State>> {
        self.current.as_ref()
    }

    /// State of the current session, `Idle` if none was started
    pub fn session_state(&self) -> SessionState {
        self.current
            .as_ref()
            .map(|h| h.state())
            .unwrap_or(SessionState::Idle)
    }

    pub fn cancel(&self) -> bool {
        self.current.as_ref().is_some_and(|h| h.cancel())
    }

    pub fn pause(&self) {
        if let Some(h) = &self.current {
            h.pause();
        }
    }

    pub fn resume(&self) {
        if let Some(h) = &self.current {
            h.resume();
        }
    }

    /// Cancel and release the current session, returning its handle
    pub fn detach(&mut self) -> Option<SessionHandle<R::State>> {
        let handle = self.current.take()?;
        handle.cancel();
        Some(handle)
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }
}

impl<R: Reducer> Drop for SessionController<R> {
    fn drop(&mut self) {
        if let Some(handle) = self.current.take() {
            handle.shared.cancel();
        }
    }
}

impl SessionController<TranscriptReducer> {
    /// Transcript of the current session
    pub async fn current_transcript(&self) -> Transcript {
        match &self.current {
            Some(h) => h.snapshot().await,
            None => Transcript::default(),
        }
    }
}

impl SessionController<MetricsReducer> {
    /// Derived points of the current session, oldest first
    pub async fn current_metrics_history(&self) -> Vec<DerivedPoint> {
        match &self.current {
            Some(h) => h.read(|s| s.history.to_vec()).await,
            None => Vec::new(),
        }
    }
}

/// Read loop of one session: read, decode, dispatch, until the stream ends,
/// fails or the session is cancelled.
async fn drive<R, S>(
    shared: Arc<SessionShared<R::State>>,
    mut source: S,
    mut reducer: R,
    decoder: DecoderConfig,
) where
    R: Reducer,
    S: ChunkSource,
{
    let token = shared.token.clone();

    let opened = tokio::select! {
        biased;
        _ = token.cancelled() => {
            debug!(target: "session", "Cancelled while connecting");
            return;
        }
        result = source.open() => result,
    };
    if let Err(e) = opened {
        shared.fail(format!("connect failed: {e}"));
        return;
    }
    shared.transition(SessionState::Streaming);

    let mut decoder = FrameDecoder::new(decoder);
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(target: "session", "Read abandoned after cancellation");
                return;
            }
            result = source.next_chunk() => result,
        };

        let chunk = match next {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                shared.finish(decoder.pending_bytes());
                return;
            }
            Err(e) => {
                shared.fail(e.to_string());
                return;
            }
        };

        StatsCounters::incr(&shared.stats.chunks, 1);
        StatsCounters::incr(&shared.stats.bytes, chunk.len() as u64);

        let (frames, overflow) = match decoder.feed(&chunk) {
            Ok(frames) => (frames, None),
            Err(overflow) => {
                let (frames, e) = overflow.into_parts();
                (frames, Some(e))
            }
        };
        shared
            .stats
            .lines_malformed
            .store(decoder.stats().malformed, Ordering::Relaxed);

        // Frames completed ahead of an oversized line still reach the reducer
        for frame in frames {
            StatsCounters::incr(&shared.stats.frames_decoded, 1);
            if !dispatch(&shared, &mut reducer, &frame).await {
                return;
            }
        }

        if let Some(e) = overflow {
            shared.fail(e.to_string());
            return;
        }
    }
}

/// Hand one frame to the reducer. Returns `false` once the session is no
/// longer live.
async fn dispatch<R: Reducer>(
    shared: &SessionShared<R::State>,
    reducer: &mut R,
    frame: &Frame,
) -> bool {
    if !shared.is_live() {
        debug!(target: "session", kind = %frame.kind, "Dropping frame decoded after cancellation");
        return false;
    }
    if shared.paused.load(Ordering::Acquire) {
        StatsCounters::incr(&shared.stats.frames_dropped_paused, 1);
        trace!(target: "session", kind = %frame.kind, "Discarding frame while paused");
        return true;
    }

    let mut state = shared.output.write().await;
    if !shared.is_live() {
        return false;
    }
    match reducer.fold(&mut *state, frame) {
        Fold::Applied => StatsCounters::incr(&shared.stats.frames_applied, 1),
        Fold::Skipped => StatsCounters::incr(&shared.stats.frames_skipped, 1),
        Fold::ProducerError(message) => {
            StatsCounters::incr(&shared.stats.frames_applied, 1);
            shared.record_producer_error(message);
        }
    }
    true
}
