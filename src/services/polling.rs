//! Cancellable repeating task driven by the tokio clock.

use std::{future::Future, time::Duration};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::debug;

/// Read side of a [`PollingTask`] cancellation flag, handed to every tick.
#[derive(Clone)]
pub struct StopSignal(watch::Receiver<bool>);

impl StopSignal {
    /// Whether the owning task was cancelled.
    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }
}

/// Runs a tick every `period`, first tick one period after spawn.
///
/// Cancelling stops future ticks but lets a running tick finish; a tick that
/// finishes after cancellation can check its [`StopSignal`] before publishing
/// results. Dropping the task cancels it.
pub struct PollingTask {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PollingTask {
    /// Spawn the repeating task on the current runtime.
    pub fn spawn<F, Fut>(label: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut(StopSignal) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (cancel, mut cancelled) = watch::channel(false);
        let signal = StopSignal(cancelled.clone());
        // Anchored here, not at the task's first poll.
        let start = Instant::now() + period;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancelled.wait_for(|stop| *stop) => break,
                    _ = ticker.tick() => {}
                }

                if signal.is_stopped() {
                    break;
                }

                // Outside the select: an in-flight tick is never interrupted.
                tick(signal.clone()).await;
            }

            debug!(label, "polling task stopped");
        });

        Self { cancel, handle }
    }

    /// Stop future ticks. Calling it again is a no-op.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Whether the background loop has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PollingTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use tokio::time::{advance, sleep};

    use super::*;

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_once_per_period() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = ticks.clone();
        let task = PollingTask::spawn("test", Duration::from_secs(2), move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        settle().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        for _ in 0..3 {
            advance(Duration::from_secs(2)).await;
            settle().await;
        }
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        drop(task);
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_counts_from_spawn() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = ticks.clone();
        let task = PollingTask::spawn("test", Duration::from_secs(2), move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        // The clock moves before the task is ever polled.
        advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        drop(task);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_lets_in_flight_tick_finish() {
        let started = Arc::new(AtomicU32::new(0));
        let finished = Arc::new(AtomicU32::new(0));
        let (s, f) = (started.clone(), finished.clone());

        let task = PollingTask::spawn("test", Duration::from_secs(1), move |_| {
            let (s, f) = (s.clone(), f.clone());
            async move {
                s.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_millis(500)).await;
                f.fetch_add(1, Ordering::SeqCst);
            }
        });

        advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(started.load(Ordering::SeqCst), 1);

        task.cancel();
        task.cancel();
        assert!(task.is_cancelled());

        advance(Duration::from_millis(500)).await;
        settle().await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);

        advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert!(task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_stops_the_loop() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = ticks.clone();
        let task = PollingTask::spawn("test", Duration::from_secs(1), move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        drop(task);

        advance(Duration::from_secs(3)).await;
        settle().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }
}
