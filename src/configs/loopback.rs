use serde::{Deserialize, Serialize};

/// Settings for the in-process simulated engine used by the console binary.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoopbackConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
    #[serde(default = "default_stuck_threshold_ms")]
    pub stuck_threshold_ms: u64,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            update_interval_ms: default_update_interval_ms(),
            stuck_threshold_ms: default_stuck_threshold_ms(),
        }
    }
}

fn default_tick_ms() -> u64 {
    500
}

fn default_update_interval_ms() -> u64 {
    5_000
}

fn default_stuck_threshold_ms() -> u64 {
    10_000
}

/// Channels the console binary plays into.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ConsoleConfig {
    #[serde(default = "default_voice_channel")]
    pub voice_channel: u64,
    #[serde(default = "default_text_channel")]
    pub text_channel: u64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            voice_channel: default_voice_channel(),
            text_channel: default_text_channel(),
        }
    }
}

fn default_voice_channel() -> u64 {
    1
}

fn default_text_channel() -> u64 {
    2
}
