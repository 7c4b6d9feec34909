use serde::{Deserialize, Serialize};

use crate::{
    common::{Severity, types::VoiceChannelId},
    protocol::tracks::Track,
};

/// Notifications pushed by the audio engine. Each one is scoped to the
/// voice channel whose player produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    #[serde(rename = "TrackStartEvent")]
    TrackStart {
        channel: VoiceChannelId,
        track: Track,
    },

    #[serde(rename = "TrackEndEvent")]
    TrackEnd {
        channel: VoiceChannelId,
        track: Track,
        reason: TrackEndReason,
    },

    #[serde(rename = "TrackExceptionEvent")]
    TrackException {
        channel: VoiceChannelId,
        track: Track,
        exception: TrackException,
    },

    #[serde(rename = "TrackStuckEvent")]
    TrackStuck {
        channel: VoiceChannelId,
        track: Track,
        #[serde(rename = "thresholdMs")]
        threshold_ms: u64,
    },

    #[serde(rename = "playerUpdate")]
    PlayerUpdate {
        channel: VoiceChannelId,
        track: Track,
        /// Playback position in milliseconds.
        position: u64,
    },

    #[serde(rename = "WebSocketClosedEvent")]
    LinkClosed {
        channel: VoiceChannelId,
        code: u16,
        reason: String,
        by_remote: bool,
    },
}

impl EngineEvent {
    pub fn channel(&self) -> VoiceChannelId {
        match self {
            Self::TrackStart { channel, .. }
            | Self::TrackEnd { channel, .. }
            | Self::TrackException { channel, .. }
            | Self::TrackStuck { channel, .. }
            | Self::PlayerUpdate { channel, .. }
            | Self::LinkClosed { channel, .. } => *channel,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::TrackStart { .. } => "TrackStart",
            Self::TrackEnd { .. } => "TrackEnd",
            Self::TrackException { .. } => "TrackException",
            Self::TrackStuck { .. } => "TrackStuck",
            Self::PlayerUpdate { .. } => "PlayerUpdate",
            Self::LinkClosed { .. } => "LinkClosed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}

impl TrackEndReason {
    /// Only a natural end advances the queue. Every other reason was caused
    /// by someone who owns the follow-up.
    pub fn may_start_next(self) -> bool {
        matches!(self, Self::Finished)
    }
}

impl std::fmt::Display for TrackEndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Finished => "Finished",
            Self::LoadFailed => "LoadFailed",
            Self::Stopped => "Stopped",
            Self::Replaced => "Replaced",
            Self::Cleanup => "Cleanup",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackException {
    pub message: Option<String>,
    pub severity: Severity,
    pub cause: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_only_finished_starts_next() {
        assert!(TrackEndReason::Finished.may_start_next());
        for reason in [
            TrackEndReason::LoadFailed,
            TrackEndReason::Stopped,
            TrackEndReason::Replaced,
            TrackEndReason::Cleanup,
        ] {
            assert!(!reason.may_start_next(), "{reason} must not advance");
        }
    }

    #[test]
    fn test_event_channel() {
        let track = Track::new("a", "A", Duration::from_secs(1));
        let event = EngineEvent::TrackStuck {
            channel: VoiceChannelId(9),
            track,
            threshold_ms: 10_000,
        };
        assert_eq!(event.channel(), VoiceChannelId(9));
        assert_eq!(event.kind(), "TrackStuck");
    }
}
