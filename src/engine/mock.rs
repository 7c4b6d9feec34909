//! Test doubles for the engine and the text destination.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{AudioEngine, TextSink, TrackResolver};
use crate::{
    common::{
        errors::EngineError,
        types::{AnyResult, TextChannelId, VoiceChannelId},
    },
    protocol::{PlayerSnapshot, PlayerState, Track},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EngineCall {
    Join(VoiceChannelId),
    Leave(VoiceChannelId),
    Play(VoiceChannelId, String),
    Stop(VoiceChannelId),
    Pause(VoiceChannelId),
    Resume(VoiceChannelId),
    Seek(VoiceChannelId, u64),
    Volume(VoiceChannelId, u16),
}

/// Records every command and keeps a scriptable player per channel.
#[derive(Default)]
pub(crate) struct RecordingEngine {
    calls: Mutex<Vec<EngineCall>>,
    players: Mutex<HashMap<VoiceChannelId, PlayerSnapshot>>,
    failing: Mutex<HashSet<&'static str>>,
    join_delay: Mutex<Option<Duration>>,
}

impl RecordingEngine {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes `join` take `delay` before it is recorded.
    pub(crate) fn delay_joins(&self, delay: Duration) {
        *self.join_delay.lock() = Some(delay);
    }

    /// Makes every later call of `command` fail with `Rejected`.
    pub(crate) fn fail_on(&self, command: &'static str) {
        self.failing.lock().insert(command);
    }

    pub(crate) fn set_player(&self, channel: VoiceChannelId, snapshot: PlayerSnapshot) {
        self.players.lock().insert(channel, snapshot);
    }

    pub(crate) fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub(crate) fn plays(&self, channel: VoiceChannelId) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                EngineCall::Play(c, id) if *c == channel => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn count(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, command: &'static str, call: EngineCall) -> Result<(), EngineError> {
        self.calls.lock().push(call);
        if self.failing.lock().contains(command) {
            return Err(EngineError::Rejected(format!("{command} rejected")));
        }
        Ok(())
    }

    fn update(&self, channel: VoiceChannelId, f: impl FnOnce(&mut PlayerSnapshot)) -> Result<(), EngineError> {
        let mut players = self.players.lock();
        let player = players.get_mut(&channel).ok_or(EngineError::NotConnected)?;
        f(player);
        Ok(())
    }
}

#[async_trait]
impl AudioEngine for RecordingEngine {
    async fn join(&self, channel: VoiceChannelId, _text: TextChannelId) -> Result<(), EngineError> {
        let delay = *self.join_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record("join", EngineCall::Join(channel))?;
        self.players.lock().entry(channel).or_insert_with(PlayerSnapshot::idle);
        Ok(())
    }

    async fn leave(&self, channel: VoiceChannelId) -> Result<(), EngineError> {
        self.record("leave", EngineCall::Leave(channel))?;
        self.players.lock().remove(&channel);
        Ok(())
    }

    async fn play(&self, channel: VoiceChannelId, track: &Track) -> Result<(), EngineError> {
        self.record("play", EngineCall::Play(channel, track.identifier.clone()))?;
        self.update(channel, |player| {
            player.state = PlayerState::Playing;
            player.track = Some(track.clone().at_position(0));
            player.position = 0;
        })
    }

    async fn stop(&self, channel: VoiceChannelId) -> Result<(), EngineError> {
        self.record("stop", EngineCall::Stop(channel))?;
        self.update(channel, |player| {
            player.state = PlayerState::Stopped;
            player.track = None;
            player.position = 0;
        })
    }

    async fn pause(&self, channel: VoiceChannelId) -> Result<(), EngineError> {
        self.record("pause", EngineCall::Pause(channel))?;
        self.update(channel, |player| player.state = PlayerState::Paused)
    }

    async fn resume(&self, channel: VoiceChannelId) -> Result<(), EngineError> {
        self.record("resume", EngineCall::Resume(channel))?;
        self.update(channel, |player| player.state = PlayerState::Playing)
    }

    async fn seek(&self, channel: VoiceChannelId, position_ms: u64) -> Result<(), EngineError> {
        self.record("seek", EngineCall::Seek(channel, position_ms))?;
        self.update(channel, |player| player.position = position_ms)
    }

    async fn set_volume(&self, channel: VoiceChannelId, volume: u16) -> Result<(), EngineError> {
        self.record("volume", EngineCall::Volume(channel, volume))?;
        self.update(channel, |player| player.volume = volume)
    }

    async fn player(&self, channel: VoiceChannelId) -> Result<PlayerSnapshot, EngineError> {
        if self.failing.lock().contains("player") {
            return Err(EngineError::Rejected("player rejected".to_string()));
        }
        self.players
            .lock()
            .get(&channel)
            .cloned()
            .ok_or(EngineError::NotConnected)
    }
}

#[async_trait]
impl TrackResolver for RecordingEngine {
    async fn resolve(&self, query: &str) -> Result<Vec<Track>, EngineError> {
        if query == "nothing" {
            return Ok(Vec::new());
        }
        Ok(vec![track(query, 180)])
    }
}

/// Collects every message sent to a text destination.
#[derive(Default)]
pub(crate) struct CollectingSink {
    messages: Mutex<Vec<String>>,
}

impl CollectingSink {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    pub(crate) fn count_containing(&self, needle: &str) -> usize {
        self.messages.lock().iter().filter(|m| m.contains(needle)).count()
    }
}

#[async_trait]
impl TextSink for CollectingSink {
    async fn send(&self, message: &str) -> AnyResult<()> {
        self.messages.lock().push(message.to_string());
        Ok(())
    }
}

pub(crate) fn track(id: &str, seconds: u64) -> Track {
    Track::new(id, format!("Song {id}"), Duration::from_secs(seconds))
}

pub(crate) fn playing(track: &Track, position: u64) -> PlayerSnapshot {
    PlayerSnapshot {
        state: PlayerState::Playing,
        track: Some(track.clone().at_position(position)),
        position,
        volume: 100,
    }
}

/// Lets every runnable task finish. Under a paused clock the sleep only
/// completes once the runtime has nothing else to do.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
