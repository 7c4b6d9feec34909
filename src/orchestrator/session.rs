use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, warn};

use super::{Orchestrator, handlers};
use crate::{
    common::types::{TextChannelId, VoiceChannelId},
    configs::PlayerConfig,
    engine::TextSink,
    player::{DisconnectTimer, ProgressMonitor, QueueSnapshot, StallProbe, TrackQueue},
    protocol::EngineEvent,
};

/// Everything mutable about a session. Only touched with the lock held,
/// which linearises queue edits and countdown start/cancel.
pub(crate) struct SessionState {
    pub(crate) queue: TrackQueue,
    pub(crate) disconnect: DisconnectTimer,
    pub(crate) monitor: ProgressMonitor,
    /// Bumped on every track start; identifies one play of one track.
    pub(crate) generation: u64,
}

pub(crate) enum SessionMessage {
    Event(EngineEvent),
    VerifyStall(StallProbe),
}

/// One voice connection with its queue, countdown and text destination.
pub struct Session {
    pub channel: VoiceChannelId,
    pub text_channel: TextChannelId,
    pub(crate) state: Mutex<SessionState>,
    sink: parking_lot::RwLock<Arc<dyn TextSink>>,
    /// Ordered inbox drained by the session worker.
    mailbox: flume::Sender<SessionMessage>,
    shutdown: CancellationToken,
}

impl Session {
    pub(crate) fn new(
        channel: VoiceChannelId,
        text_channel: TextChannelId,
        sink: Arc<dyn TextSink>,
        config: &PlayerConfig,
    ) -> (Arc<Self>, flume::Receiver<SessionMessage>) {
        let (mailbox, inbox) = flume::unbounded();
        let session = Arc::new(Self {
            channel,
            text_channel,
            state: Mutex::new(SessionState {
                queue: TrackQueue::new(),
                disconnect: DisconnectTimer::new(),
                monitor: ProgressMonitor::new(config.near_end_threshold()),
                generation: 0,
            }),
            sink: parking_lot::RwLock::new(sink),
            mailbox,
            shutdown: CancellationToken::new(),
        });
        (session, inbox)
    }

    /// Sends a user-facing message. Delivery failures are logged, never raised.
    pub async fn notify(&self, message: &str) {
        let sink = self.sink.read().clone();
        if let Err(e) = sink.send(message).await {
            warn!(
                "[{}] Failed to notify {}: {}",
                self.channel, self.text_channel, e
            );
        }
    }

    pub(crate) fn set_sink(&self, sink: Arc<dyn TextSink>) {
        *self.sink.write() = sink;
    }

    /// Queues a message for the worker. False once the session is closed.
    pub(crate) fn post(&self, message: SessionMessage) -> bool {
        !self.is_closed() && self.mailbox.send(message).is_ok()
    }

    pub(crate) fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub(crate) fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.shutdown.cancelled()
    }

    pub async fn queue_snapshot(&self) -> QueueSnapshot {
        self.state.lock().await.queue.snapshot()
    }
}

/// Drains one session's inbox in order until the session is closed.
pub(crate) async fn run_worker(
    orchestrator: Orchestrator,
    session: Arc<Session>,
    inbox: flume::Receiver<SessionMessage>,
) {
    loop {
        tokio::select! {
            biased;
            _ = session.closed() => break,
            message = inbox.recv_async() => match message {
                Ok(SessionMessage::Event(event)) => {
                    handlers::handle_event(&orchestrator, &session, event).await;
                }
                Ok(SessionMessage::VerifyStall(probe)) => {
                    handlers::verify_stall(&orchestrator, &session, probe).await;
                }
                Err(_) => break,
            },
        }
    }
    debug!("[{}] Session worker stopped", session.channel);
}
