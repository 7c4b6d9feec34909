use std::{sync::Arc, time::Duration};

use tracing::{debug, error, info, warn};

use super::{
    Orchestrator,
    session::{Session, SessionMessage, SessionState},
};
use crate::{
    common::{errors::EngineError, types::format_duration},
    player::{StallProbe, StallVerdict},
    protocol::{EngineEvent, Track, TrackEndReason, TrackException},
};

pub(super) async fn handle_event(orchestrator: &Orchestrator, session: &Arc<Session>, event: EngineEvent) {
    if session.is_closed() {
        debug!("[{}] Session closed, ignoring {}", session.channel, event.kind());
        return;
    }

    match event {
        EngineEvent::TrackStart { track, .. } => on_track_start(session, track).await,
        EngineEvent::TrackEnd { track, reason, .. } => {
            on_track_end(orchestrator, session, track, reason).await
        }
        EngineEvent::TrackException {
            track, exception, ..
        } => on_track_exception(session, track, exception).await,
        EngineEvent::TrackStuck {
            track,
            threshold_ms,
            ..
        } => on_track_stuck(session, track, threshold_ms).await,
        EngineEvent::PlayerUpdate {
            track, position, ..
        } => on_player_update(orchestrator, session, track, position).await,
        EngineEvent::LinkClosed {
            code,
            reason,
            by_remote,
            ..
        } => on_link_closed(session, code, &reason, by_remote),
    }
}

async fn on_track_start(session: &Session, track: Track) {
    let cancelled = {
        let mut state = session.state.lock().await;
        if session.is_closed() {
            return;
        }
        state.generation += 1;
        state.disconnect.cancel()
    };

    info!("[{}] Track started: {}", session.channel, track.title);
    session
        .notify(&format!("Now playing: {}", track.title))
        .await;

    if cancelled {
        info!("[{}] Auto disconnect cancelled", session.channel);
        session.notify("Auto disconnect has been cancelled!").await;
    }
}

async fn on_track_end(
    orchestrator: &Orchestrator,
    session: &Arc<Session>,
    track: Track,
    reason: TrackEndReason,
) {
    info!(
        "[{}] Track ended: {} (reason: {})",
        session.channel, track.title, reason
    );
    if !reason.may_start_next() {
        return;
    }

    let mut state = session.state.lock().await;
    if session.is_closed() {
        return;
    }
    if state.queue.is_empty() {
        let delay = orchestrator.config().disconnect_delay();
        arm_disconnect(orchestrator, session, &mut state, delay);
        drop(state);

        session
            .notify("That was the last song in the queue.")
            .await;
        session
            .notify(&format!(
                "Auto disconnect initiated! Disconnecting in {}...",
                format_duration(delay)
            ))
            .await;
        return;
    }

    let outcome = start_next(orchestrator, session, &mut state).await;
    drop(state);

    match outcome {
        Ok(Some(next)) => {
            session
                .notify(&format!(
                    "{}: {}\nNow playing: {}",
                    reason, track.title, next.title
                ))
                .await
        }
        Ok(None) => {}
        Err((next, e)) => {
            session
                .notify(&format!("Failed to play {}: {}", next.title, e))
                .await
        }
    }
}

async fn on_track_exception(session: &Session, track: Track, exception: TrackException) {
    error!(
        "[{}] Track {} threw an exception ({:?}): {}",
        session.channel,
        track.title,
        exception.severity,
        exception.message.as_deref().unwrap_or(&exception.cause)
    );

    let title = track.title.clone();
    if !requeue(session, track).await {
        return;
    }
    session
        .notify(&format!(
            "{} has been re-added to queue after throwing an exception.",
            title
        ))
        .await;
}

async fn on_track_stuck(session: &Session, track: Track, threshold_ms: u64) {
    error!(
        "[{}] Track {} got stuck for {}ms",
        session.channel, track.title, threshold_ms
    );

    let title = track.title.clone();
    if !requeue(session, track).await {
        return;
    }
    session
        .notify(&format!(
            "{} has been re-added to queue after getting stuck for {}ms.",
            title, threshold_ms
        ))
        .await;
}

async fn on_player_update(
    orchestrator: &Orchestrator,
    session: &Arc<Session>,
    track: Track,
    position: u64,
) {
    debug!(
        "[{}] Progress for {}: {}/{}ms",
        session.channel, track.title, position, track.length
    );

    let probe = {
        let mut state = session.state.lock().await;
        if session.is_closed() {
            return;
        }
        let generation = state.generation;
        state.monitor.observe(generation, &track, position)
    };

    if let Some(probe) = probe {
        let delay = orchestrator.config().stall_verify_delay();
        info!(
            "[{}] {} is about to end, verifying progress in {:?}",
            session.channel, probe.title, delay
        );
        schedule_verification(session.clone(), probe, delay);
    }
}

fn on_link_closed(session: &Session, code: u16, reason: &str, by_remote: bool) {
    error!(
        fatal = true,
        "[{}] Voice connection closed (code {}, by remote: {}): {}",
        session.channel,
        code,
        by_remote,
        reason
    );
}

/// Appends `track` at the tail. False when the session closed meanwhile.
async fn requeue(session: &Session, track: Track) -> bool {
    let mut state = session.state.lock().await;
    if session.is_closed() {
        return false;
    }
    state.queue.enqueue(track);
    true
}

/// Posts the probe back to the session after `delay`, unless the session
/// is gone by then.
fn schedule_verification(session: Arc<Session>, probe: StallProbe, delay: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            _ = session.closed() => {}
            _ = tokio::time::sleep(delay) => {
                session.post(SessionMessage::VerifyStall(probe));
            }
        }
    });
}

pub(super) async fn verify_stall(orchestrator: &Orchestrator, session: &Arc<Session>, probe: StallProbe) {
    let mut state = session.state.lock().await;
    if session.is_closed() {
        return;
    }

    let player = match orchestrator.engine().player(session.channel).await {
        Ok(player) => player,
        Err(e) => {
            debug!(
                "[{}] Skipping stall check for {}: {}",
                session.channel, probe.title, e
            );
            return;
        }
    };

    let verdict = probe.verdict(state.generation, &player, state.queue.len());
    if verdict != StallVerdict::Stalled {
        debug!(
            "[{}] Stall check for {} resolved: {:?}",
            session.channel, probe.title, verdict
        );
        return;
    }

    info!(
        "[{}] {} did not move from {}ms, player is {}, next in queue is {}",
        session.channel,
        probe.title,
        probe.position,
        player.state,
        state.queue.peek().map(|t| t.title.as_str()).unwrap_or("nothing")
    );

    let outcome = start_next(orchestrator, session, &mut state).await;
    drop(state);

    match outcome {
        Ok(Some(next)) => {
            session
                .notify(&format!(
                    "{} stalled near its end, skipping to {}.",
                    probe.title, next.title
                ))
                .await
        }
        Ok(None) => {}
        Err((_, e)) => {
            session
                .notify(&format!("Failed to skip {}: {}", probe.title, e))
                .await
        }
    }
}

/// Dequeues the head and asks the engine to play it. On failure the track
/// goes back to the head of the queue. `Ok(None)` when the queue is empty.
pub(super) async fn start_next(
    orchestrator: &Orchestrator,
    session: &Session,
    state: &mut SessionState,
) -> Result<Option<Track>, (Track, EngineError)> {
    let Some(next) = state.queue.dequeue() else {
        return Ok(None);
    };

    match orchestrator.engine().play(session.channel, &next).await {
        Ok(()) => Ok(Some(next)),
        Err(e) => {
            warn!(
                "[{}] Failed to play {}: {}",
                session.channel, next.title, e
            );
            state.queue.restore_front(next.clone());
            Err((next, e))
        }
    }
}

/// Starts the idle countdown. Expiry leaves the channel through the
/// orchestrator, which checks the session is still the registered one.
fn arm_disconnect(
    orchestrator: &Orchestrator,
    session: &Arc<Session>,
    state: &mut SessionState,
    delay: Duration,
) {
    let orchestrator = orchestrator.clone();
    let session_ref = Arc::downgrade(session);
    let handle = state.disconnect.start(delay, move || async move {
        if let Some(session) = session_ref.upgrade() {
            orchestrator.expire(session).await;
        }
    });
    info!(
        "[{}] Queue exhausted, disconnect countdown {} armed for {:?}",
        session.channel,
        handle.id(),
        delay
    );
}
