use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing knobs for the orchestrator. Defaults are the production values.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PlayerConfig {
    /// Idle time after the queue runs dry before leaving the voice channel.
    #[serde(default = "default_disconnect_delay_ms")]
    pub disconnect_delay_ms: u64,
    /// Remaining time below which a progress update arms the stall check.
    #[serde(default = "default_near_end_threshold_ms")]
    pub near_end_threshold_ms: u64,
    /// How long the stall check waits before re-reading the player.
    #[serde(default = "default_stall_verify_delay_ms")]
    pub stall_verify_delay_ms: u64,
}

impl PlayerConfig {
    pub fn disconnect_delay(&self) -> Duration {
        Duration::from_millis(self.disconnect_delay_ms)
    }

    pub fn near_end_threshold(&self) -> Duration {
        Duration::from_millis(self.near_end_threshold_ms)
    }

    pub fn stall_verify_delay(&self) -> Duration {
        Duration::from_millis(self.stall_verify_delay_ms)
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            disconnect_delay_ms: default_disconnect_delay_ms(),
            near_end_threshold_ms: default_near_end_threshold_ms(),
            stall_verify_delay_ms: default_stall_verify_delay_ms(),
        }
    }
}

fn default_disconnect_delay_ms() -> u64 {
    5 * 60 * 1000
}

fn default_near_end_threshold_ms() -> u64 {
    6_000
}

fn default_stall_verify_delay_ms() -> u64 {
    7_500
}
