//! Per-session playback orchestration on top of a remote audio engine.
//!
//! Each joined voice channel gets a [`Session`] with its own queue, idle
//! countdown and progress monitor. Engine events are routed into the
//! session's ordered inbox and handled one at a time by a dedicated worker
//! task, so events for one channel never interleave while different
//! channels progress independently.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use tracing::{debug, error, info, warn};

pub mod control;
mod handlers;
pub mod session;

pub use control::{Enqueued, Skipped};
pub use session::Session;

use crate::{
    common::{
        errors::{OrchestratorError, Result},
        types::{TextChannelId, VoiceChannelId},
    },
    configs::PlayerConfig,
    engine::{AudioEngine, TextSink},
    protocol::EngineEvent,
};

pub(crate) struct OrchestratorInner {
    engine: Arc<dyn AudioEngine>,
    sessions: DashMap<VoiceChannelId, Arc<Session>>,
    config: PlayerConfig,
}

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<OrchestratorInner>,
}

impl Orchestrator {
    pub fn new(engine: Arc<dyn AudioEngine>, config: PlayerConfig) -> Self {
        Self {
            inner: Arc::new(OrchestratorInner {
                engine,
                sessions: DashMap::new(),
                config,
            }),
        }
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.inner.config
    }

    pub fn engine(&self) -> &Arc<dyn AudioEngine> {
        &self.inner.engine
    }

    pub fn session(&self, channel: VoiceChannelId) -> Result<Arc<Session>> {
        self.inner
            .sessions
            .get(&channel)
            .map(|s| s.value().clone())
            .ok_or(OrchestratorError::NotConnected)
    }

    pub fn has_session(&self, channel: VoiceChannelId) -> bool {
        self.inner.sessions.contains_key(&channel)
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Connects to `channel` and opens a session reporting to `sink`.
    pub async fn join(
        &self,
        channel: VoiceChannelId,
        text_channel: TextChannelId,
        sink: Arc<dyn TextSink>,
    ) -> Result<()> {
        let (session, inbox) = Session::new(channel, text_channel, sink, &self.inner.config);
        match self.inner.sessions.entry(channel) {
            Entry::Occupied(_) => return Err(OrchestratorError::AlreadyConnected),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
            }
        }

        // The slot is reserved, so a concurrent join fails before reaching the engine.
        if let Err(e) = self.inner.engine.join(channel, text_channel).await {
            self.inner
                .sessions
                .remove_if(&channel, |_, current| Arc::ptr_eq(current, &session));
            session.close();
            return Err(e.into());
        }

        tokio::spawn(session::run_worker(self.clone(), session, inbox));
        info!("[{}] Session opened, reporting to {}", channel, text_channel);
        Ok(())
    }

    /// Replaces the text destination of an existing session.
    pub fn register_text_destination(
        &self,
        channel: VoiceChannelId,
        sink: Arc<dyn TextSink>,
    ) -> Result<()> {
        self.session(channel)?.set_sink(sink);
        Ok(())
    }

    /// Closes the session and disconnects the engine from `channel`.
    /// The session's queue is discarded.
    pub async fn leave(&self, channel: VoiceChannelId) -> Result<()> {
        let (_, session) = self
            .inner
            .sessions
            .remove(&channel)
            .ok_or(OrchestratorError::NotConnected)?;

        self.close_session(&session).await;
        self.inner.engine.leave(channel).await?;
        info!("[{}] Session closed", channel);
        Ok(())
    }

    /// Leaves every channel. Used on shutdown.
    pub async fn leave_all(&self) {
        let channels: Vec<VoiceChannelId> =
            self.inner.sessions.iter().map(|entry| *entry.key()).collect();

        let leaves = channels.into_iter().map(|channel| async move {
            if let Err(e) = self.leave(channel).await {
                warn!("[{}] Failed to leave on shutdown: {}", channel, e);
            }
        });
        futures::future::join_all(leaves).await;
    }

    /// Routes one engine event to the inbox of the session it belongs to.
    pub fn dispatch(&self, event: EngineEvent) {
        let channel = event.channel();
        let Ok(session) = self.session(channel) else {
            if let EngineEvent::LinkClosed { code, reason, .. } = &event {
                error!(
                    fatal = true,
                    "[{}] Voice connection closed for unknown session (code {}): {}",
                    channel,
                    code,
                    reason
                );
            } else {
                debug!("[{}] Dropping {} for unknown session", channel, event.kind());
            }
            return;
        };

        let kind = event.kind();
        if !session.post(session::SessionMessage::Event(event)) {
            debug!("[{}] Session closed, dropping {}", channel, kind);
        }
    }

    /// Consumes the engine's event feed until it disconnects.
    pub async fn run(self, events: flume::Receiver<EngineEvent>) {
        while let Ok(event) = events.recv_async().await {
            self.dispatch(event);
        }
        info!("Engine event feed closed");
    }

    /// Expiry action of the idle countdown. Only acts if `session` is still
    /// the one registered for its channel.
    pub(crate) async fn expire(&self, session: Arc<Session>) {
        let channel = session.channel;
        let removed = self
            .inner
            .sessions
            .remove_if(&channel, |_, current| Arc::ptr_eq(current, &session))
            .is_some();
        if !removed {
            debug!("[{}] Stale disconnect countdown expired, ignoring", channel);
            return;
        }

        info!("[{}] Idle for too long, leaving", channel);
        self.close_session(&session).await;

        match self.inner.engine.leave(channel).await {
            Ok(()) => session.notify("Invite me again sometime.").await,
            Err(e) => {
                warn!("[{}] Failed to leave after idle timeout: {}", channel, e);
                session
                    .notify(&format!("Failed to leave the voice channel: {}", e))
                    .await;
            }
        }
    }

    async fn close_session(&self, session: &Session) {
        session.close();
        let mut state = session.state.lock().await;
        state.disconnect.cancel();
        state.queue.clear();
    }
}
