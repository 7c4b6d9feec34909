use std::time::Duration;

use crate::protocol::{PlayerSnapshot, PlayerState, Track};

/// Watches progress updates for the moment a track gets close to its end.
///
/// Some engines occasionally freeze a track a few seconds before the end
/// without ever reporting it as finished. When an update lands inside the
/// near-end window the monitor hands out a [`StallProbe`]; whoever owns the
/// session waits the verification delay and asks the probe whether the
/// player really is stuck. The probe is handed out once per crossing into the window.
#[derive(Debug, Clone)]
pub struct ProgressMonitor {
    near_end_threshold: Duration,
    armed_generation: Option<u64>,
}

/// What was seen when the near-end window was entered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StallProbe {
    /// Play generation of the session when the probe was armed.
    pub generation: u64,
    pub track_id: String,
    pub title: String,
    /// Position in milliseconds when the probe was armed.
    pub position: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallVerdict {
    /// Another track (or another play of the same one) is current now.
    Advanced,
    /// The engine moved the position on its own.
    Progressed,
    /// Nothing left to skip to.
    QueueEmpty,
    NotPlaying,
    /// Same track, same frozen position, queue not empty, still playing.
    Stalled,
}

impl ProgressMonitor {
    pub fn new(near_end_threshold: Duration) -> Self {
        Self {
            near_end_threshold,
            armed_generation: None,
        }
    }

    /// Feeds one progress update. Returns a probe each time the track
    /// playing under `generation` crosses into the near-end window. Leaving
    /// the window again (a seek backwards) re-arms the next crossing.
    pub fn observe(&mut self, generation: u64, track: &Track, position: u64) -> Option<StallProbe> {
        let remaining = track.remaining(position)?;
        if remaining > self.near_end_threshold {
            if self.armed_generation == Some(generation) {
                self.armed_generation = None;
            }
            return None;
        }
        if self.armed_generation == Some(generation) {
            return None;
        }

        self.armed_generation = Some(generation);
        Some(StallProbe {
            generation,
            track_id: track.identifier.clone(),
            title: track.title.clone(),
            position,
        })
    }

}

impl StallProbe {
    /// Re-validates every precondition against the current world.
    pub fn verdict(
        &self,
        current_generation: u64,
        player: &PlayerSnapshot,
        queue_len: usize,
    ) -> StallVerdict {
        let Some(current) = player.track.as_ref() else {
            return StallVerdict::Advanced;
        };

        if current_generation != self.generation || current.identifier != self.track_id {
            StallVerdict::Advanced
        } else if player.position != self.position {
            StallVerdict::Progressed
        } else if queue_len == 0 {
            StallVerdict::QueueEmpty
        } else if player.state != PlayerState::Playing {
            StallVerdict::NotPlaying
        } else {
            StallVerdict::Stalled
        }
    }
}
