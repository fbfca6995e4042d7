//! Async driver for [`prep_core::Countdown`].

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use prep_core::{Countdown, Tick};

/// Shortest tick period; tokio intervals reject a zero period.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Ticks a countdown once per period and runs `on_expire` when it reaches
/// zero. Cancelling (or dropping the handle) stops it without expiring.
#[derive(Debug)]
pub struct CountdownTimer {
    cancel: CancellationToken,
    remaining: watch::Receiver<u32>,
    handle: JoinHandle<()>,
}

impl CountdownTimer {
    /// One-second countdown.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F, Fut>(remaining: u32, cancel: CancellationToken, on_expire: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::with_period(remaining, Duration::from_secs(1), cancel, on_expire)
    }

    /// Countdown ticking every `period`, clamped to at least one millisecond.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_period<F, Fut>(
        remaining: u32,
        period: Duration,
        cancel: CancellationToken,
        on_expire: F,
    ) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = watch::channel(remaining);
        let handle = tokio::spawn(run(
            Countdown::new(remaining),
            period.max(MIN_PERIOD),
            cancel.clone(),
            tx,
            on_expire,
        ));
        Self {
            cancel,
            remaining: rx,
            handle,
        }
    }

    #[must_use]
    pub fn remaining(&self) -> u32 {
        *self.remaining.borrow()
    }

    /// Receiver that sees every tick.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.remaining.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run<F, Fut>(
    mut countdown: Countdown,
    period: Duration,
    cancel: CancellationToken,
    tx: watch::Sender<u32>,
    on_expire: F,
) where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    if countdown.expire_if_due() != Tick::Expired {
        // Missed ticks are dropped, not replayed.
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    countdown.stop();
                    return;
                }
                _ = interval.tick() => match countdown.tick() {
                    Tick::Running(left) => {
                        tx.send_replace(left);
                    }
                    Tick::Expired => {
                        tx.send_replace(0);
                        break;
                    }
                    Tick::Idle => return,
                },
            }
        }
    }

    if !cancel.is_cancelled() {
        tracing::debug!("countdown expired");
        on_expire().await;
    }
}
