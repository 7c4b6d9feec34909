//! User-driven operations on a session: queueing, transport control and
//! read-only views.

use std::time::Duration;

use tracing::info;

use super::{Orchestrator, handlers};
use crate::{
    common::{
        errors::{OrchestratorError, Result},
        types::VoiceChannelId,
    },
    player::QueueSnapshot,
    protocol::{PlayerSnapshot, PlayerState, Track},
};

/// Outcome of [`Orchestrator::enqueue`].
#[derive(Debug, Clone)]
pub struct Enqueued {
    /// How many tracks were appended.
    pub count: usize,
    /// The track that was started because the player was idle.
    pub started: Option<Track>,
    /// Queue length afterwards.
    pub queue_len: usize,
}

/// Outcome of [`Orchestrator::skip`].
#[derive(Debug, Clone)]
pub enum Skipped {
    Advanced {
        previous: Option<Track>,
        current: Track,
    },
    /// The queue was empty, so the player was stopped instead.
    Stopped { previous: Option<Track> },
}

impl Orchestrator {
    /// Appends `tracks` and, when nothing is playing or paused, starts the head.
    pub async fn enqueue(&self, channel: VoiceChannelId, tracks: Vec<Track>) -> Result<Enqueued> {
        let session = self.session(channel)?;
        let mut state = session.state.lock().await;
        if session.is_closed() {
            return Err(OrchestratorError::NotConnected);
        }

        let player = self.engine().player(channel).await?;

        let count = tracks.len();
        state.queue.enqueue_all(tracks);

        let started = if player.is_active() {
            None
        } else {
            handlers::start_next(self, &session, &mut state)
                .await
                .map_err(|(_, e)| OrchestratorError::Engine(e))?
        };

        info!(
            "[{}] Enqueued {} track(s), {} pending",
            channel,
            count,
            state.queue.len()
        );
        Ok(Enqueued {
            count,
            started,
            queue_len: state.queue.len(),
        })
    }

    pub async fn pause(&self, channel: VoiceChannelId) -> Result<Option<Track>> {
        let player = self.require_state(channel, PlayerState::Playing, "pause").await?;
        self.engine().pause(channel).await?;
        Ok(player.track)
    }

    pub async fn resume(&self, channel: VoiceChannelId) -> Result<Option<Track>> {
        self.session(channel)?;
        let player = self.engine().player(channel).await?;
        if player.state != PlayerState::Paused {
            return Err(OrchestratorError::NotPaused);
        }
        self.engine().resume(channel).await?;
        Ok(player.track)
    }

    pub async fn stop(&self, channel: VoiceChannelId) -> Result<()> {
        self.session(channel)?;
        let player = self.engine().player(channel).await?;
        if matches!(player.state, PlayerState::Stopped | PlayerState::Idle) {
            return Err(OrchestratorError::AlreadyStopped(player.state));
        }
        self.engine().stop(channel).await?;
        Ok(())
    }

    /// Moves on to the head of the queue, or stops when the queue is empty.
    pub async fn skip(&self, channel: VoiceChannelId) -> Result<Skipped> {
        let session = self.session(channel)?;
        let mut state = session.state.lock().await;

        let player = self.engine().player(channel).await?;
        if player.state != PlayerState::Playing {
            return Err(OrchestratorError::NotPlaying { action: "skip" });
        }

        if state.queue.is_empty() {
            self.engine().stop(channel).await?;
            return Ok(Skipped::Stopped {
                previous: player.track,
            });
        }

        match handlers::start_next(self, &session, &mut state).await {
            Ok(Some(current)) => Ok(Skipped::Advanced {
                previous: player.track,
                current,
            }),
            Ok(None) => Ok(Skipped::Stopped {
                previous: player.track,
            }),
            Err((_, e)) => Err(e.into()),
        }
    }

    pub async fn seek(&self, channel: VoiceChannelId, position: Duration) -> Result<Option<Track>> {
        let player = self.require_state(channel, PlayerState::Playing, "seek").await?;
        self.engine()
            .seek(channel, position.as_millis() as u64)
            .await?;
        Ok(player.track)
    }

    pub async fn set_volume(&self, channel: VoiceChannelId, volume: u16) -> Result<()> {
        self.session(channel)?;
        self.engine().set_volume(channel, volume).await?;
        Ok(())
    }

    pub async fn now_playing(&self, channel: VoiceChannelId) -> Result<PlayerSnapshot> {
        self.require_state(channel, PlayerState::Playing, "show the current track")
            .await
    }

    /// Point-in-time copy of the pending tracks.
    pub async fn queue(&self, channel: VoiceChannelId) -> Result<QueueSnapshot> {
        Ok(self.session(channel)?.queue_snapshot().await)
    }

    /// Time left on the live idle countdown, if one is running.
    pub async fn live_disconnect(&self, channel: VoiceChannelId) -> Result<Option<Duration>> {
        let session = self.session(channel)?;
        let state = session.state.lock().await;
        Ok(state.disconnect.live().map(|handle| handle.remaining()))
    }

    async fn require_state(
        &self,
        channel: VoiceChannelId,
        expected: PlayerState,
        action: &'static str,
    ) -> Result<PlayerSnapshot> {
        self.session(channel)?;
        let player = self.engine().player(channel).await?;
        if player.state != expected {
            return Err(OrchestratorError::NotPlaying { action });
        }
        Ok(player)
    }
}
