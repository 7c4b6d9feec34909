use serde::{Deserialize, Serialize};

use crate::protocol::tracks::Track;

/// Playback state as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayerState {
    #[default]
    Idle,
    Playing,
    Paused,
    Stopped,
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// The engine's view of one player, read on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub state: PlayerState,
    pub track: Option<Track>,
    /// Playback position in milliseconds.
    pub position: u64,
    pub volume: u16,
}

impl PlayerSnapshot {
    pub fn idle() -> Self {
        Self {
            state: PlayerState::Idle,
            track: None,
            position: 0,
            volume: 100,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, PlayerState::Playing | PlayerState::Paused)
    }
}
