//! Seams to the collaborators the orchestrator drives but does not own:
//! the audio engine, the text destination and the track resolver.

use async_trait::async_trait;

use crate::{
    common::{
        errors::EngineError,
        types::{AnyResult, TextChannelId, VoiceChannelId},
    },
    protocol::{PlayerSnapshot, Track},
};

pub mod loopback;
#[cfg(test)]
pub(crate) mod mock;

pub use loopback::LoopbackEngine;

/// Commands the orchestrator can issue to a remote audio engine. Every
/// command is fallible and may be issued concurrently for different
/// channels. The engine's events come back through a separate feed.
#[async_trait]
pub trait AudioEngine: Send + Sync {
    async fn join(&self, channel: VoiceChannelId, text: TextChannelId) -> Result<(), EngineError>;

    async fn leave(&self, channel: VoiceChannelId) -> Result<(), EngineError>;

    /// Starts `track`, replacing whatever is playing.
    async fn play(&self, channel: VoiceChannelId, track: &Track) -> Result<(), EngineError>;

    async fn stop(&self, channel: VoiceChannelId) -> Result<(), EngineError>;

    async fn pause(&self, channel: VoiceChannelId) -> Result<(), EngineError>;

    async fn resume(&self, channel: VoiceChannelId) -> Result<(), EngineError>;

    async fn seek(&self, channel: VoiceChannelId, position_ms: u64) -> Result<(), EngineError>;

    async fn set_volume(&self, channel: VoiceChannelId, volume: u16) -> Result<(), EngineError>;

    /// The authoritative player state. Never cached by callers.
    async fn player(&self, channel: VoiceChannelId) -> Result<PlayerSnapshot, EngineError>;
}

/// Where a session's user-facing notifications go.
#[async_trait]
pub trait TextSink: Send + Sync {
    async fn send(&self, message: &str) -> AnyResult<()>;
}

/// Turns a search query or URL into playable tracks.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<Vec<Track>, EngineError>;
}
