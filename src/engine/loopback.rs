//! An in-process engine that "plays" tracks by advancing a clock.
//!
//! Every play spawns a monitor task that ticks at a fixed interval, moves the
//! position forward, reports progress and detects the end of the track or a
//! frozen position. Events go out through the same kind of feed a remote
//! engine would deliver, so the orchestrator cannot tell the difference.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{AudioEngine, TrackResolver};
use crate::{
    common::{
        errors::EngineError,
        types::{TextChannelId, VoiceChannelId},
    },
    configs::LoopbackConfig,
    protocol::{EngineEvent, PlayerSnapshot, PlayerState, Track, TrackEndReason},
};

const MAX_VOLUME: u16 = 1000;
const DEFAULT_LENGTH_SECS: u64 = 180;

struct Slot {
    snapshot: PlayerSnapshot,
    /// Stops the monitor of the current play.
    playback: Option<CancellationToken>,
    frozen: bool,
}

/// One simulated player. All transitions and the events they produce happen
/// under the lock so the feed order matches the state order.
struct LoopbackPlayer {
    text_channel: TextChannelId,
    slot: Mutex<Slot>,
}

pub struct LoopbackEngine {
    players: DashMap<VoiceChannelId, Arc<LoopbackPlayer>>,
    events: flume::Sender<EngineEvent>,
    config: LoopbackConfig,
}

impl LoopbackEngine {
    /// Creates the engine together with its event feed.
    pub fn new(config: LoopbackConfig) -> (Arc<Self>, flume::Receiver<EngineEvent>) {
        let (events, feed) = flume::unbounded();
        let engine = Arc::new(Self {
            players: DashMap::new(),
            events,
            config,
        });
        (engine, feed)
    }

    /// Stops the clock of the current track without changing its state,
    /// the way a broken decoder would.
    pub fn freeze(&self, channel: VoiceChannelId) -> Result<(), EngineError> {
        let player = self.player_for(channel)?;
        player.slot.lock().frozen = true;
        Ok(())
    }

    fn player_for(&self, channel: VoiceChannelId) -> Result<Arc<LoopbackPlayer>, EngineError> {
        self.players
            .get(&channel)
            .map(|p| p.value().clone())
            .ok_or(EngineError::NotConnected)
    }

    fn emit(&self, event: EngineEvent) {
        if self.events.send(event).is_err() {
            debug!("Event feed has no listener");
        }
    }

    /// Ends whatever is loaded with `reason`. Expects the slot lock held.
    fn end_current(&self, channel: VoiceChannelId, slot: &mut Slot, reason: TrackEndReason) {
        if let Some(token) = slot.playback.take() {
            token.cancel();
        }
        if let Some(track) = slot.snapshot.track.take() {
            let position = slot.snapshot.position;
            self.emit(EngineEvent::TrackEnd {
                channel,
                track: track.at_position(position),
                reason,
            });
        }
        slot.snapshot.state = PlayerState::Stopped;
        slot.snapshot.position = 0;
        slot.frozen = false;
    }
}

#[async_trait]
impl AudioEngine for LoopbackEngine {
    async fn join(&self, channel: VoiceChannelId, text: TextChannelId) -> Result<(), EngineError> {
        self.players.entry(channel).or_insert_with(|| {
            Arc::new(LoopbackPlayer {
                text_channel: text,
                slot: Mutex::new(Slot {
                    snapshot: PlayerSnapshot::idle(),
                    playback: None,
                    frozen: false,
                }),
            })
        });
        info!("[{}] Loopback player connected", channel);
        Ok(())
    }

    async fn leave(&self, channel: VoiceChannelId) -> Result<(), EngineError> {
        let (_, player) = self
            .players
            .remove(&channel)
            .ok_or(EngineError::NotConnected)?;

        let mut slot = player.slot.lock();
        self.end_current(channel, &mut slot, TrackEndReason::Cleanup);
        info!(
            "[{}] Loopback player disconnected (was reporting to {})",
            channel, player.text_channel
        );
        Ok(())
    }

    async fn play(&self, channel: VoiceChannelId, track: &Track) -> Result<(), EngineError> {
        let player = self.player_for(channel)?;
        let token = CancellationToken::new();
        {
            let mut slot = player.slot.lock();
            if slot.snapshot.track.is_some() {
                self.end_current(channel, &mut slot, TrackEndReason::Replaced);
            }

            slot.snapshot.state = PlayerState::Playing;
            slot.snapshot.track = Some(track.clone().at_position(track.position));
            slot.snapshot.position = track.position;
            slot.playback = Some(token.clone());
            self.emit(EngineEvent::TrackStart {
                channel,
                track: track.clone(),
            });
        }

        let tick = Duration::from_millis(self.config.tick_ms.max(1));
        let update_every_n = (self.config.update_interval_ms / self.config.tick_ms.max(1)).max(1);
        tokio::spawn(monitor_loop(MonitorCtx {
            channel,
            player,
            track: track.clone(),
            token,
            events: self.events.clone(),
            tick,
            update_every_n,
            stuck_threshold_ms: self.config.stuck_threshold_ms,
        }));
        Ok(())
    }

    async fn stop(&self, channel: VoiceChannelId) -> Result<(), EngineError> {
        let player = self.player_for(channel)?;
        let mut slot = player.slot.lock();
        self.end_current(channel, &mut slot, TrackEndReason::Stopped);
        Ok(())
    }

    async fn pause(&self, channel: VoiceChannelId) -> Result<(), EngineError> {
        let player = self.player_for(channel)?;
        let mut slot = player.slot.lock();
        if slot.snapshot.track.is_none() {
            return Err(EngineError::NothingPlaying);
        }
        slot.snapshot.state = PlayerState::Paused;
        Ok(())
    }

    async fn resume(&self, channel: VoiceChannelId) -> Result<(), EngineError> {
        let player = self.player_for(channel)?;
        let mut slot = player.slot.lock();
        if slot.snapshot.track.is_none() {
            return Err(EngineError::NothingPlaying);
        }
        slot.snapshot.state = PlayerState::Playing;
        Ok(())
    }

    async fn seek(&self, channel: VoiceChannelId, position_ms: u64) -> Result<(), EngineError> {
        let player = self.player_for(channel)?;
        let mut slot = player.slot.lock();
        let track = slot
            .snapshot
            .track
            .as_ref()
            .ok_or(EngineError::NothingPlaying)?;
        if !track.is_seekable_to(position_ms) {
            return Err(EngineError::InvalidSeek {
                position_ms,
                length_ms: track.length,
            });
        }
        slot.snapshot.position = position_ms;
        Ok(())
    }

    async fn set_volume(&self, channel: VoiceChannelId, volume: u16) -> Result<(), EngineError> {
        if volume > MAX_VOLUME {
            return Err(EngineError::InvalidVolume(volume));
        }
        let player = self.player_for(channel)?;
        player.slot.lock().snapshot.volume = volume;
        Ok(())
    }

    async fn player(&self, channel: VoiceChannelId) -> Result<PlayerSnapshot, EngineError> {
        let player = self.player_for(channel)?;
        let slot = player.slot.lock();
        let mut snapshot = slot.snapshot.clone();
        if let Some(track) = snapshot.track.as_mut() {
            track.position = snapshot.position;
        }
        Ok(snapshot)
    }
}

/// Resolves `title[:seconds]` queries, several separated by `;`.
/// `live` as the length yields a stream.
#[async_trait]
impl TrackResolver for LoopbackEngine {
    async fn resolve(&self, query: &str) -> Result<Vec<Track>, EngineError> {
        Ok(query.split(';').filter_map(parse_query).collect())
    }
}

fn parse_query(part: &str) -> Option<Track> {
    let part = part.trim();
    if part.is_empty() {
        return None;
    }

    let (title, length) = match part.rsplit_once(':') {
        Some((title, "live")) => (title.trim(), None),
        Some((title, secs)) => match secs.trim().parse::<u64>() {
            Ok(secs) => (title.trim(), Some(secs)),
            Err(_) => (part, Some(DEFAULT_LENGTH_SECS)),
        },
        None => (part, Some(DEFAULT_LENGTH_SECS)),
    };

    let identifier = uuid::Uuid::new_v4().to_string();
    let track = match length {
        Some(secs) => Track::new(identifier, title, Duration::from_secs(secs)),
        None => Track::stream(identifier, title),
    };
    let track = track.with_author("Loopback");
    if title.starts_with("http://") || title.starts_with("https://") {
        return Some(track.with_uri(title));
    }
    Some(track)
}

struct MonitorCtx {
    channel: VoiceChannelId,
    player: Arc<LoopbackPlayer>,
    track: Track,
    token: CancellationToken,
    events: flume::Sender<EngineEvent>,
    tick: Duration,
    update_every_n: u64,
    stuck_threshold_ms: u64,
}

async fn monitor_loop(ctx: MonitorCtx) {
    let MonitorCtx {
        channel,
        player,
        track,
        token,
        events,
        tick,
        update_every_n,
        stuck_threshold_ms,
    } = ctx;

    let tick_ms = tick.as_millis() as u64;
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + tick, tick);
    let mut ticks: u64 = 0;
    let mut last_pos = track.position;
    let mut stuck_ms: u64 = 0;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {}
        }
        ticks = ticks.wrapping_add(1);

        let mut slot = player.slot.lock();
        if token.is_cancelled() {
            break;
        }

        let state = slot.snapshot.state;
        if state == PlayerState::Playing && !slot.frozen {
            let advanced = slot.snapshot.position + tick_ms;
            slot.snapshot.position = if track.is_stream {
                advanced
            } else {
                advanced.min(track.length)
            };
        }
        let position = slot.snapshot.position;

        // -- Track ended --------------------------------------------------
        if state == PlayerState::Playing && !track.is_stream && position >= track.length {
            slot.playback = None;
            slot.snapshot.state = PlayerState::Stopped;
            slot.snapshot.track = None;
            slot.snapshot.position = 0;
            let _ = events.send(EngineEvent::TrackEnd {
                channel,
                track: track.clone().at_position(position),
                reason: TrackEndReason::Finished,
            });
            break;
        }

        // -- Stuck detection (only while Playing) -------------------------
        if state == PlayerState::Playing && position == last_pos {
            stuck_ms += tick_ms;
            if stuck_ms >= stuck_threshold_ms {
                warn!("[{}] Track {} got stuck at {}ms", channel, track.title, position);
                let _ = events.send(EngineEvent::TrackStuck {
                    channel,
                    track: track.clone().at_position(position),
                    threshold_ms: stuck_threshold_ms,
                });

                slot.playback = None;
                slot.snapshot.state = PlayerState::Stopped;
                slot.snapshot.track = None;
                slot.snapshot.position = 0;
                slot.frozen = false;
                let _ = events.send(EngineEvent::TrackEnd {
                    channel,
                    track: track.clone().at_position(position),
                    reason: TrackEndReason::Finished,
                });
                break;
            }
        } else {
            stuck_ms = 0;
        }
        last_pos = position;

        // -- PlayerUpdate --------------------------------------------------
        if ticks % update_every_n == 0 {
            let _ = events.send(EngineEvent::PlayerUpdate {
                channel,
                track: track.clone().at_position(position),
                position,
            });
        }
    }

    debug!("[{}] Monitor for {} stopped", channel, track.title);
}

#[cfg(test)]
mod tests {
    use super::*;

    const CH: VoiceChannelId = VoiceChannelId(3);
    const TEXT: TextChannelId = TextChannelId(4);

    fn config() -> LoopbackConfig {
        LoopbackConfig {
            tick_ms: 500,
            update_interval_ms: 5_000,
            stuck_threshold_ms: 10_000,
        }
    }

    async fn connected() -> (Arc<LoopbackEngine>, flume::Receiver<EngineEvent>) {
        let (engine, feed) = LoopbackEngine::new(config());
        engine.join(CH, TEXT).await.unwrap();
        (engine, feed)
    }

    fn kinds(feed: &flume::Receiver<EngineEvent>) -> Vec<&'static str> {
        feed.drain().map(|event| event.kind()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_plays_to_the_end() {
        let (engine, feed) = connected().await;
        let track = Track::new("a", "A", Duration::from_secs(12));

        engine.play(CH, &track).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5_200)).await;

        let player = engine.player(CH).await.unwrap();
        assert_eq!(player.state, PlayerState::Playing);
        assert_eq!(player.position, 5_000);
        assert_eq!(player.track.unwrap().position, 5_000);

        tokio::time::sleep(Duration::from_secs(10)).await;

        let events: Vec<EngineEvent> = feed.drain().collect();
        assert!(matches!(events.first(), Some(EngineEvent::TrackStart { .. })));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, EngineEvent::PlayerUpdate { .. }))
                .count(),
            2
        );
        match events.last() {
            Some(EngineEvent::TrackEnd { reason, track, .. }) => {
                assert_eq!(*reason, TrackEndReason::Finished);
                assert_eq!(track.identifier, "a");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(engine.player(CH).await.unwrap().state, PlayerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_replaces_current_track() {
        let (engine, feed) = connected().await;

        engine.play(CH, &Track::new("a", "A", Duration::from_secs(60))).await.unwrap();
        engine.play(CH, &Track::new("b", "B", Duration::from_secs(60))).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        let events: Vec<EngineEvent> = feed.drain().collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[1],
            EngineEvent::TrackEnd { reason: TrackEndReason::Replaced, .. }
        ));
        assert_eq!(engine.player(CH).await.unwrap().track.unwrap().identifier, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_player_does_not_advance() {
        let (engine, feed) = connected().await;
        engine.play(CH, &Track::new("a", "A", Duration::from_secs(60))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_100)).await;

        engine.pause(CH).await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;

        let player = engine.player(CH).await.unwrap();
        assert_eq!(player.state, PlayerState::Paused);
        assert_eq!(player.position, 1_000);
        assert!(!kinds(&feed).contains(&"TrackStuck"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_frozen_track_gets_stuck() {
        let (engine, feed) = connected().await;
        engine.play(CH, &Track::new("a", "A", Duration::from_secs(60))).await.unwrap();
        engine.freeze(CH).unwrap();

        tokio::time::sleep(Duration::from_millis(10_200)).await;

        let events: Vec<EngineEvent> = feed.drain().collect();
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::TrackStuck { threshold_ms: 10_000, .. }
        )));
        assert!(matches!(
            events.last(),
            Some(EngineEvent::TrackEnd { reason: TrackEndReason::Finished, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_and_leave_end_the_track() {
        let (engine, feed) = connected().await;
        engine.play(CH, &Track::new("a", "A", Duration::from_secs(60))).await.unwrap();
        engine.stop(CH).await.unwrap();
        engine.play(CH, &Track::new("b", "B", Duration::from_secs(60))).await.unwrap();
        engine.leave(CH).await.unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;

        let reasons: Vec<TrackEndReason> = feed
            .drain()
            .filter_map(|e| match e {
                EngineEvent::TrackEnd { reason, .. } => Some(reason),
                _ => None,
            })
            .collect();
        assert_eq!(reasons, vec![TrackEndReason::Stopped, TrackEndReason::Cleanup]);
        assert_eq!(engine.player(CH).await.unwrap_err(), EngineError::NotConnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_and_volume_are_validated() {
        let (engine, _feed) = connected().await;
        assert_eq!(engine.seek(CH, 1_000).await, Err(EngineError::NothingPlaying));

        engine.play(CH, &Track::new("a", "A", Duration::from_secs(60))).await.unwrap();
        assert_eq!(
            engine.seek(CH, 61_000).await,
            Err(EngineError::InvalidSeek {
                position_ms: 61_000,
                length_ms: 60_000
            })
        );
        engine.seek(CH, 30_000).await.unwrap();
        assert_eq!(engine.player(CH).await.unwrap().position, 30_000);

        assert_eq!(engine.set_volume(CH, 1001).await, Err(EngineError::InvalidVolume(1001)));
        engine.set_volume(CH, 250).await.unwrap();
        assert_eq!(engine.player(CH).await.unwrap().volume, 250);
    }

    #[tokio::test]
    async fn test_resolver_parses_queries() {
        let (engine, _feed) = LoopbackEngine::new(config());

        let tracks = engine.resolve("Intro:30; Radio:live ;Plain").await.unwrap();
        assert_eq!(tracks.len(), 3);
        assert_eq!(tracks[0].title, "Intro");
        assert_eq!(tracks[0].length, 30_000);
        assert!(tracks[1].is_stream);
        assert_eq!(tracks[1].title, "Radio");
        assert_eq!(tracks[2].length, DEFAULT_LENGTH_SECS * 1000);
        assert_ne!(tracks[0].identifier, tracks[2].identifier);

        assert!(engine.resolve("  ").await.unwrap().is_empty());
    }
}
