//! Cancellable timers.
//!
//! [`schedule`] runs a future after a delay on the tokio runtime and returns a
//! [`TimerHandle`] that cancels it. [`Timers`] keeps one slot per
//! [`TimerKind`] and reports firings back to the relay actor. Because the
//! timers sit on tokio's clock, tests drive them with a paused runtime.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::debug;

use super::actor::RelayCommand;
use super::lifecycle::{TimerKind, TimerToken};

/// Handle to a pending timer.
#[derive(Debug)]
pub struct TimerHandle {
    abort: AbortHandle,
}

impl TimerHandle {
    /// Cancel the timer. Cancelling a timer that already fired is a no-op.
    pub fn cancel(self) {
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

/// Run `fire` once `delay` has elapsed, unless cancelled first.
pub fn schedule<F>(delay: Duration, fire: F) -> TimerHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    let task = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        fire.await;
    });
    TimerHandle {
        abort: task.abort_handle(),
    }
}

/// The relay's lifecycle timers, one slot per kind.
#[derive(Debug)]
pub struct Timers {
    mailbox: mpsc::WeakSender<RelayCommand>,
    slots: HashMap<TimerKind, TimerHandle>,
}

impl Timers {
    pub fn new(mailbox: mpsc::WeakSender<RelayCommand>) -> Self {
        Self {
            mailbox,
            slots: HashMap::new(),
        }
    }

    /// Arm the `kind` slot, replacing (and cancelling) whatever it held.
    pub fn schedule(&mut self, kind: TimerKind, token: TimerToken, delay: Duration) {
        let mailbox = self.mailbox.clone();
        let handle = schedule(delay, async move {
            if let Some(tx) = mailbox.upgrade() {
                let _ = tx.send(RelayCommand::TimerFired { kind, token }).await;
            }
        });
        debug!(?kind, token = token.get(), delay_secs = delay.as_secs(), "Timer scheduled");
        if let Some(previous) = self.slots.insert(kind, handle) {
            previous.cancel();
        }
    }

    /// Cancel the `kind` slot. Returns whether a timer was pending.
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        match self.slots.remove(&kind) {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.cancel();
                debug!(?kind, "Timer cancelled");
                pending
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.slots.drain() {
            handle.cancel();
        }
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let _handle = schedule(Duration::from_secs(10), async move {
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(!fired.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let handle = schedule(Duration::from_secs(10), async move {
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        handle.cancel();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn slot_reports_firing_to_mailbox() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut timers = Timers::new(tx.downgrade());
        let token = TimerToken::new(7);

        timers.schedule(TimerKind::Retry, token, Duration::from_secs(10));

        match rx.recv().await {
            Some(RelayCommand::TimerFired { kind, token: fired }) => {
                assert_eq!(kind, TimerKind::Retry);
                assert_eq!(fired, token);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_a_slot_cancels_the_previous_timer() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut timers = Timers::new(tx.downgrade());

        timers.schedule(TimerKind::ShutdownGrace, TimerToken::new(1), Duration::from_secs(5));
        timers.schedule(TimerKind::ShutdownGrace, TimerToken::new(2), Duration::from_secs(50));

        match rx.recv().await {
            Some(RelayCommand::TimerFired { token, .. }) => assert_eq!(token, TimerToken::new(2)),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_reports_pending_state() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut timers = Timers::new(tx.downgrade());

        assert!(!timers.cancel(TimerKind::Retry));
        timers.schedule(TimerKind::Retry, TimerToken::new(3), Duration::from_secs(10));
        assert!(timers.cancel(TimerKind::Retry));
        assert!(!timers.cancel(TimerKind::Retry));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err());
    }
}
