//! # Close Trigger Selector
//!
//! Races the bill's deadline against the manual close signal. Whichever is ready first
//! wins; the selector is then dropped, which cancels the timer and closes the signal
//! channel so later signals are refused instead of queued.
//!
//! The timer is armed against the durable close date, not against the moment the run
//! started, so a resumed run keeps its first deadline. A close date already in the
//! past fires on the first poll.

use crate::bill_actor::{CloseSignal, CloseTrigger, CLOSE_BILL_SIGNAL};
use chrono::{DateTime, Utc};
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Sleep;
use tracing::debug;

pub struct CloseTriggerSelector {
    deadline: Pin<Box<Sleep>>,
    signals: Option<mpsc::Receiver<CloseSignal>>,
}

enum Fired {
    Deadline,
    Signal(Option<CloseSignal>),
}

impl CloseTriggerSelector {
    pub fn arm(fire_at: DateTime<Utc>, signals: mpsc::Receiver<CloseSignal>) -> Self {
        let delay = delay_until(fire_at, Utc::now());
        debug!(%fire_at, delay_ms = delay.as_millis() as u64, "Deadline armed");
        Self {
            deadline: Box::pin(tokio::time::sleep(delay)),
            signals: Some(signals),
        }
    }

    /// Resolves once either branch fires. Cancel safe: dropping the future between
    /// polls loses neither the deadline nor a queued signal.
    pub async fn wait(&mut self) -> CloseTrigger {
        loop {
            let fired = match self.signals.as_mut() {
                Some(signals) => tokio::select! {
                    biased;
                    signal = signals.recv() => Fired::Signal(signal),
                    () = self.deadline.as_mut() => Fired::Deadline,
                },
                None => {
                    self.deadline.as_mut().await;
                    Fired::Deadline
                }
            };
            match fired {
                Fired::Deadline => return CloseTrigger::Deadline,
                Fired::Signal(Some(signal)) => {
                    debug!(
                        signal = CLOSE_BILL_SIGNAL,
                        requested_at = %signal.requested_at,
                        "Manual close received"
                    );
                    return CloseTrigger::Manual;
                }
                // Every sender is gone; only the deadline can win now.
                Fired::Signal(None) => self.signals = None,
            }
        }
    }
}

/// Time left until `fire_at`, zero when it already passed.
pub fn delay_until(fire_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (fire_at - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_past_deadline_has_no_delay() {
        let now = Utc::now();
        assert_eq!(
            delay_until(now - chrono::Duration::hours(1), now),
            Duration::ZERO
        );
        assert_eq!(
            delay_until(now + chrono::Duration::seconds(90), now),
            Duration::from_secs(90)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_wins_without_signal() {
        let (_tx, rx) = mpsc::channel(1);
        let mut selector = CloseTriggerSelector::arm(Utc::now() + chrono::Duration::hours(1), rx);
        let started = tokio::time::Instant::now();

        assert_eq!(selector.wait().await, CloseTrigger::Deadline);
        assert!(started.elapsed() >= Duration::from_secs(3600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_beats_deadline() {
        let (tx, rx) = mpsc::channel(1);
        let mut selector = CloseTriggerSelector::arm(Utc::now() + chrono::Duration::hours(24), rx);
        tx.send(CloseSignal::now()).await.unwrap();
        let started = tokio::time::Instant::now();

        assert_eq!(selector.wait().await, CloseTrigger::Manual);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_past_deadline_fires_immediately() {
        let (_tx, rx) = mpsc::channel(1);
        let mut selector = CloseTriggerSelector::arm(Utc::now() - chrono::Duration::minutes(5), rx);
        assert_eq!(selector.wait().await, CloseTrigger::Deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_signal_channel_falls_back_to_deadline() {
        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        let mut selector = CloseTriggerSelector::arm(Utc::now() + chrono::Duration::minutes(5), rx);
        assert_eq!(selector.wait().await, CloseTrigger::Deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_selector_refuses_late_signals() {
        let (tx, rx) = mpsc::channel(1);
        let mut selector = CloseTriggerSelector::arm(Utc::now(), rx);
        assert_eq!(selector.wait().await, CloseTrigger::Deadline);
        drop(selector);

        assert!(tx.send(CloseSignal::now()).await.is_err());
    }
}
