use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::PlayerState;

/// Exception severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Common,
    Suspicious,
    Fault,
}

/// A command rejected by the audio engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("the engine has no player for this voice channel")]
    NotConnected,

    #[error("cannot seek to {position_ms}ms in a {length_ms}ms track")]
    InvalidSeek { position_ms: u64, length_ms: u64 },

    #[error("volume must be between 0 and 1000, got {0}")]
    InvalidVolume(u16),

    #[error("nothing is loaded in the player")]
    NothingPlaying,

    #[error("{0}")]
    Rejected(String),
}

/// Failures of the control surface. `Display` is the reply shown to users.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("I'm not connected to a voice channel.")]
    NotConnected,

    #[error("I'm already connected to a voice channel!")]
    AlreadyConnected,

    #[error("I cannot {action} when I'm not playing anything!")]
    NotPlaying { action: &'static str },

    #[error("I cannot resume when nothing is paused!")]
    NotPaused,

    #[error("Woaaah there, I can't stop when the player is already {0}.")]
    AlreadyStopped(PlayerState),

    #[error("I wasn't able to find anything for `{0}`.")]
    NoMatches(String),

    #[error("{0}")]
    Engine(#[from] EngineError),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
