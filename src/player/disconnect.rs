use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU8, AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

static NEXT_COUNTDOWN_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum CountdownState {
    Live = 0,
    Cancelled = 1,
    Fired = 2,
}

impl CountdownState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Live,
            1 => Self::Cancelled,
            _ => Self::Fired,
        }
    }
}

struct Countdown {
    id: u64,
    state: AtomicU8,
    token: CancellationToken,
    deadline: Instant,
}

impl Countdown {
    /// The only way out of `Live`. Exactly one caller ever wins.
    fn resolve(&self, to: CountdownState) -> bool {
        self.state
            .compare_exchange(
                CountdownState::Live as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

/// One pending idle disconnect. Clones share the same countdown.
///
/// The countdown resolves exactly once, either to `Cancelled` through
/// [`DisconnectHandle::cancel`] or to `Fired` when the deadline passes, in
/// which case the expiry action runs. A resolved handle is never reused.
#[derive(Clone)]
pub struct DisconnectHandle {
    inner: Arc<Countdown>,
}

impl DisconnectHandle {
    /// Arms a countdown that runs `on_expire` after `delay` unless cancelled first.
    pub fn spawn<F, Fut>(delay: Duration, on_expire: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let inner = Arc::new(Countdown {
            id: NEXT_COUNTDOWN_ID.fetch_add(1, Ordering::Relaxed),
            state: AtomicU8::new(CountdownState::Live as u8),
            token: CancellationToken::new(),
            deadline: Instant::now() + delay,
        });

        let countdown = inner.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = countdown.token.cancelled() => {
                    debug!("Disconnect countdown {} cancelled", countdown.id);
                }
                _ = tokio::time::sleep_until(countdown.deadline) => {
                    if countdown.resolve(CountdownState::Fired) {
                        debug!("Disconnect countdown {} expired", countdown.id);
                        on_expire().await;
                    }
                }
            }
        });

        Self { inner }
    }

    /// Returns true only for the call that moved the countdown from live to
    /// cancelled. Cancelling after expiry, or twice, is a no-op.
    pub fn cancel(&self) -> bool {
        if self.inner.resolve(CountdownState::Cancelled) {
            self.inner.token.cancel();
            true
        } else {
            false
        }
    }

    pub fn state(&self) -> CountdownState {
        CountdownState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn is_live(&self) -> bool {
        self.state() == CountdownState::Live
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn remaining(&self) -> Duration {
        self.inner.deadline.saturating_duration_since(Instant::now())
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for DisconnectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisconnectHandle")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

/// The per-session slot holding at most one countdown.
#[derive(Debug, Default)]
pub struct DisconnectTimer {
    active: Option<DisconnectHandle>,
}

impl DisconnectTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always produces a fresh countdown. Any previous one is cancelled first,
    /// so at most one is ever live.
    pub fn start<F, Fut>(&mut self, delay: Duration, on_expire: F) -> DisconnectHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if let Some(previous) = self.active.take() {
            if previous.cancel() {
                debug!("Disconnect countdown {} superseded", previous.id());
            }
        }

        let handle = DisconnectHandle::spawn(delay, on_expire);
        self.active = Some(handle.clone());
        handle
    }

    /// Cancels the current countdown. True if it was still live.
    pub fn cancel(&mut self) -> bool {
        self.active.take().is_some_and(|handle| handle.cancel())
    }

    pub fn live(&self) -> Option<&DisconnectHandle> {
        self.active.as_ref().filter(|handle| handle.is_live())
    }
}
