//! Cooperative scheduling primitives shared by the playback session and the sync loop.
//!
//! Everything here is single-threaded: a page view runs on one event loop, futures are not
//! `Send`, and fire-and-forget work is spawned locally. The [`Scheduler`] trait abstracts the
//! host's clock, timers and task spawner so the same code runs on tokio (native, tests) and on
//! the browser event loop (`wasm` feature).
use std::{future::Future, sync::Arc, time::Duration};
use tokio::sync::watch;

pub trait Scheduler: Clone + 'static {
    /// Monotonic time since an arbitrary per-scheduler origin.
    fn now(&self) -> Duration;

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()>;

    /// Run `fut` to completion in the background. The caller never observes the outcome.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + 'static;
}

/// Scheduler backed by the tokio runtime.
///
/// Spawning uses [`tokio::task::spawn_local`], so it must be driven from inside a
/// [`tokio::task::LocalSet`].
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    origin: tokio::time::Instant,
}

#[cfg(not(target_arch = "wasm32"))]
impl Default for TokioScheduler {
    fn default() -> Self {
        TokioScheduler {
            origin: tokio::time::Instant::now(),
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Scheduler for TokioScheduler {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> {
        tokio::time::sleep(duration)
    }

    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + 'static,
    {
        tokio::task::spawn_local(fut);
    }
}

/// Outcome of a bounded poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    Found(T),
    NotFound,
}

impl<T> Probe<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Probe::Found(value) => Some(value),
            Probe::NotFound => None,
        }
    }
}

/// Probe once immediately, then up to `retries` more times with a fixed `delay` in between.
///
/// Never waits longer than `retries * delay`. Used for DOM readiness and player SDK readiness;
/// persistence calls are never retried.
pub async fn retry_until<X, T, F>(
    scheduler: &X,
    retries: u32,
    delay: Duration,
    mut probe: F,
) -> Probe<T>
where
    X: Scheduler,
    F: FnMut() -> Option<T>,
{
    if let Some(value) = probe() {
        return Probe::Found(value);
    }
    for attempt in 1..=retries {
        scheduler.sleep(delay).await;
        if let Some(value) = probe() {
            tracing::trace!("[Retry] found after {attempt} retries");
            return Probe::Found(value);
        }
    }
    tracing::debug!(
        "[Retry] gave up after {retries} retries ({:?})",
        delay * retries
    );
    Probe::NotFound
}

/// One-time readiness signal.
///
/// Waiting after the signal already fired completes immediately, so listeners attached late
/// never miss it.
#[derive(Debug, Clone)]
pub struct Readiness {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Readiness {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(false);
        Readiness { tx: Arc::new(tx) }
    }
}

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so the channel cannot close while waiting.
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test(start_paused = true)]
    async fn retry_finds_value_after_some_attempts() {
        let scheduler = TokioScheduler::default();
        let calls = Cell::new(0u32);
        let result = retry_until(&scheduler, 50, Duration::from_millis(100), || {
            calls.set(calls.get() + 1);
            (calls.get() == 4).then_some("cards")
        })
        .await;
        assert_eq!(result, Probe::Found("cards"));
        assert_eq!(calls.get(), 4);
        assert_eq!(scheduler.now(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_after_bounded_wait() {
        let scheduler = TokioScheduler::default();
        let calls = Cell::new(0u32);
        let result: Probe<()> = retry_until(&scheduler, 50, Duration::from_millis(100), || {
            calls.set(calls.get() + 1);
            None
        })
        .await;
        assert_eq!(result, Probe::NotFound);
        assert_eq!(calls.get(), 51);
        assert_eq!(scheduler.now(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn readiness_fired_before_wait_is_observed() {
        let ready = Readiness::new();
        assert!(!ready.is_ready());
        ready.fire();
        ready.clone().wait().await;
        assert!(ready.is_ready());
    }

    #[tokio::test]
    async fn readiness_wakes_pending_waiter() {
        let ready = Readiness::new();
        let waiter = ready.clone();
        let (_, ()) = tokio::join!(waiter.wait(), async { ready.fire() });
        assert!(waiter.is_ready());
    }
}
