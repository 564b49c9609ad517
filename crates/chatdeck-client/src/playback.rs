//! Audio session coordinator.
//!
//! At most one playback session exists per [`AudioCoordinator`]. Starting a
//! new one tears the previous one down, whether it was playing, paused or
//! still loading. Every session owns a [`ResourceHandle`] whose `Drop`
//! returns the playable resource to the sink, so no exit path can leak it.
//!
//! The platform audio backend implements [`PlaybackSink`] and reports
//! readiness, completion and failures through the [`SessionEvents`] handle it
//! receives on `load`. Events carry the session's generation number, and events
//! for sessions that are no longer current are dropped.

use crate::error::ClientError;
use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};

/// How long `play` waits for the sink to report readiness.
pub const READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Generation number identifying one playback session.
pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
    Paused,
}

/// Result of a `play` call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    Started,
    /// A later `play` or a `stop` replaced this session before it started.
    Preempted,
}

/// Platform audio backend.
///
/// Methods are called with the coordinator's lock held and must not block.
pub trait PlaybackSink: Send + Sync + 'static {
    /// Creates a playable resource for `session` from encoded audio.
    fn load(&self, session: SessionId, audio: Bytes, events: SessionEvents) -> Result<(), String>;

    /// Whether the resource can start without further buffering.
    fn is_ready(&self, session: SessionId) -> bool;

    fn start(&self, session: SessionId) -> Result<(), String>;

    fn pause(&self, session: SessionId);

    fn resume(&self, session: SessionId) -> Result<(), String>;

    /// Stops output and rewinds.
    fn halt(&self, session: SessionId);

    /// Frees the resource created by `load`.
    fn release(&self, session: SessionId);
}

/// Receives session lifecycle notifications. All methods default to no-ops.
pub trait PlaybackObserver: Send + Sync {
    fn on_play(&self) {}
    fn on_pause(&self) {}
    fn on_end(&self) {}
    fn on_error(&self, _message: &str) {}
}

#[derive(Debug)]
enum SinkEvent {
    Ready(SessionId),
    Ended(SessionId),
    Failed(SessionId, String),
}

/// Notification handle given to the sink for one session.
#[derive(Clone)]
pub struct SessionEvents {
    session: SessionId,
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl SessionEvents {
    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn ready(&self) {
        let _ = self.tx.send(SinkEvent::Ready(self.session));
    }

    pub fn ended(&self) {
        let _ = self.tx.send(SinkEvent::Ended(self.session));
    }

    pub fn error(&self, message: impl Into<String>) {
        let _ = self.tx.send(SinkEvent::Failed(self.session, message.into()));
    }
}

impl fmt::Debug for SessionEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionEvents")
            .field("session", &self.session)
            .finish()
    }
}

/// Owns a loaded resource. Dropping it releases the resource.
pub struct ResourceHandle {
    sink: Arc<dyn PlaybackSink>,
    session: SessionId,
}

impl Drop for ResourceHandle {
    fn drop(&mut self) {
        self.sink.release(self.session);
    }
}

struct Session {
    id: SessionId,
    state: PlaybackState,
    text: String,
    ready: Option<oneshot::Sender<()>>,
    _handle: ResourceHandle,
}

struct Inner {
    sink: Arc<dyn PlaybackSink>,
    current: Mutex<Option<Session>>,
    observers: RwLock<Vec<Arc<dyn PlaybackObserver>>>,
    next_id: AtomicU64,
    events: mpsc::UnboundedSender<SinkEvent>,
    ready_timeout: Duration,
}

impl Inner {
    fn notify(&self, f: impl Fn(&dyn PlaybackObserver)) {
        let observers = match self.observers.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for observer in &observers {
            f(observer.as_ref());
        }
    }

    /// Tears down the current session, if any. The handle drops with it.
    fn teardown(&self, slot: &mut Option<Session>) -> Option<SessionId> {
        let session = slot.take()?;
        self.sink.halt(session.id);
        Some(session.id)
    }

    async fn handle(&self, event: SinkEvent) {
        let mut slot = self.current.lock().await;
        let current = slot.as_ref().map(|s| s.id);
        match event {
            SinkEvent::Ready(id) if current == Some(id) => {
                if let Some(ready) = slot.as_mut().and_then(|s| s.ready.take()) {
                    let _ = ready.send(());
                }
            }
            SinkEvent::Ended(id) if current == Some(id) => {
                slot.take();
                tracing::debug!(session = id, "playback ended");
                self.notify(|o| o.on_end());
            }
            SinkEvent::Failed(id, message) if current == Some(id) => {
                self.teardown(&mut slot);
                tracing::warn!(session = id, %message, "playback failed");
                self.notify(|o| o.on_error(&message));
            }
            stale => tracing::debug!(?stale, "ignoring event for superseded session"),
        }
    }
}

/// Coordinates the single active playback session.
#[derive(Clone)]
pub struct AudioCoordinator {
    inner: Arc<Inner>,
}

impl AudioCoordinator {
    /// Creates a coordinator over `sink`.
    ///
    /// Must be called within a Tokio runtime: sink events are processed on a
    /// spawned task that lives as long as the coordinator.
    pub fn new(sink: Arc<dyn PlaybackSink>) -> Self {
        Self::with_ready_timeout(sink, READY_TIMEOUT)
    }

    pub fn with_ready_timeout(sink: Arc<dyn PlaybackSink>, ready_timeout: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            sink,
            current: Mutex::new(None),
            observers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            events: tx,
            ready_timeout,
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                inner.handle(event).await;
            }
        });

        Self { inner }
    }

    pub fn add_observer(&self, observer: Arc<dyn PlaybackObserver>) {
        match self.inner.observers.write() {
            Ok(mut guard) => guard.push(observer),
            Err(poisoned) => poisoned.into_inner().push(observer),
        }
    }

    pub async fn state(&self) -> PlaybackState {
        self.inner
            .current
            .lock()
            .await
            .as_ref()
            .map_or(PlaybackState::Idle, |s| s.state)
    }

    /// Text of the session currently loading or playing.
    pub async fn current_text(&self) -> Option<String> {
        self.inner
            .current
            .lock()
            .await
            .as_ref()
            .map(|s| s.text.clone())
    }

    /// Plays `audio`, replacing any current session.
    ///
    /// Resolves once playback has started, or with [`PlayOutcome::Preempted`]
    /// if another `play` or a `stop` took over while this one was loading.
    pub async fn play(&self, audio: Bytes, text: &str) -> Result<PlayOutcome, ClientError> {
        let inner = &self.inner;
        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);

        let ready_rx = {
            let mut slot = inner.current.lock().await;
            if let Some(previous) = inner.teardown(&mut slot) {
                tracing::debug!(previous, next = id, "preempting playback session");
            }

            let events = SessionEvents {
                session: id,
                tx: inner.events.clone(),
            };
            if let Err(message) = inner.sink.load(id, audio, events) {
                // Nothing was created, so there is no handle to release.
                inner.notify(|o| o.on_error(&message));
                return Err(ClientError::Playback(message));
            }

            let handle = ResourceHandle {
                sink: Arc::clone(&inner.sink),
                session: id,
            };
            let (tx, rx) = oneshot::channel();
            *slot = Some(Session {
                id,
                state: PlaybackState::Loading,
                text: text.to_string(),
                ready: Some(tx),
                _handle: handle,
            });

            if inner.sink.is_ready(id) {
                None
            } else {
                Some(rx)
            }
        };

        let timed_out = match ready_rx {
            None => false,
            Some(rx) => match tokio::time::timeout(inner.ready_timeout, rx).await {
                Ok(Ok(())) => false,
                // Sender dropped: the session was torn down while loading.
                Ok(Err(_)) => return Ok(PlayOutcome::Preempted),
                Err(_) => true,
            },
        };

        let mut slot = inner.current.lock().await;
        match slot.as_ref() {
            Some(session) if session.id == id && session.state == PlaybackState::Loading => {}
            _ => return Ok(PlayOutcome::Preempted),
        }

        if timed_out && !inner.sink.is_ready(id) {
            inner.teardown(&mut slot);
            let message = "audio failed to load".to_string();
            inner.notify(|o| o.on_error(&message));
            return Err(ClientError::Playback(message));
        }

        if let Err(message) = inner.sink.start(id) {
            inner.teardown(&mut slot);
            inner.notify(|o| o.on_error(&message));
            return Err(ClientError::Playback(message));
        }

        if let Some(session) = slot.as_mut() {
            session.state = PlaybackState::Playing;
            session.ready = None;
        }
        tracing::debug!(session = id, "playback started");
        inner.notify(|o| o.on_play());
        Ok(PlayOutcome::Started)
    }

    /// Pauses a playing session. Returns `false` in any other state.
    pub async fn pause(&self) -> bool {
        let mut slot = self.inner.current.lock().await;
        let Some(session) = slot.as_mut().filter(|s| s.state == PlaybackState::Playing) else {
            return false;
        };
        self.inner.sink.pause(session.id);
        session.state = PlaybackState::Paused;
        self.inner.notify(|o| o.on_pause());
        true
    }

    /// Resumes a paused session. Returns `false` in any other state.
    pub async fn resume(&self) -> bool {
        let mut slot = self.inner.current.lock().await;
        let Some(session) = slot.as_mut().filter(|s| s.state == PlaybackState::Paused) else {
            return false;
        };
        match self.inner.sink.resume(session.id) {
            Ok(()) => {
                session.state = PlaybackState::Playing;
                self.inner.notify(|o| o.on_play());
                true
            }
            Err(message) => {
                self.inner.teardown(&mut slot);
                self.inner.notify(|o| o.on_error(&message));
                false
            }
        }
    }

    /// Stops and releases the current session. Returns `false` when idle.
    pub async fn stop(&self) -> bool {
        let mut slot = self.inner.current.lock().await;
        match self.inner.teardown(&mut slot) {
            Some(id) => {
                tracing::debug!(session = id, "playback stopped");
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for AudioCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioCoordinator").finish_non_exhaustive()
    }
}
