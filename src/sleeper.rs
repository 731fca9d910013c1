//! Suspending between attempts.
//!
//! [`sleep_or_cancel`] is the only place the crate waits. It races a [`Sleeper`] timer against a
//! [`Cancellation`] token. The timer is pluggable so tests can observe requested delays without
//! spending real time.

use crate::cancel::{CancelError, Cancellation};
use futures::future::{BoxFuture, FutureExt};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Timer used between attempts.
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Production sleeper backed by `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed()
    }
}

/// Completes immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstantSleeper;

impl Sleeper for InstantSleeper {
    fn sleep(&self, _duration: Duration) -> BoxFuture<'static, ()> {
        futures::future::ready(()).boxed()
    }
}

/// Completes immediately and remembers every requested duration.
///
/// Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    requested: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Durations requested so far, in order.
    pub fn requested(&self) -> Vec<Duration> {
        self.requested.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of sleeps requested so far.
    pub fn count(&self) -> usize {
        self.requested.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Sum of all requested durations.
    pub fn total(&self) -> Duration {
        self.requested.lock().unwrap_or_else(PoisonError::into_inner).iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        self.requested.lock().unwrap_or_else(PoisonError::into_inner).push(duration);
        futures::future::ready(()).boxed()
    }
}

/// Wait for `duration`, or until `token` fires, whichever comes first.
///
/// A token that has already fired wins without the timer being started.
pub async fn sleep_or_cancel<C>(
    sleeper: &dyn Sleeper,
    duration: Duration,
    token: &C,
) -> Result<(), CancelError>
where
    C: Cancellation + ?Sized,
{
    if let Some(err) = token.error() {
        return Err(err);
    }
    tokio::select! {
        biased;
        err = token.fired() => Err(err),
        _ = sleeper.sleep(duration) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::{Background, CancelToken};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn instant_sleeper_takes_no_time() {
        let start = Instant::now();
        InstantSleeper.sleep(Duration::from_secs(10)).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn recording_sleeper_keeps_order() {
        let sleeper = RecordingSleeper::new();
        sleeper.sleep(Duration::from_millis(100)).await;
        sleeper.sleep(Duration::from_millis(200)).await;
        sleeper.clone().sleep(Duration::from_millis(400)).await;

        assert_eq!(
            sleeper.requested(),
            vec![Duration::from_millis(100), Duration::from_millis(200), Duration::from_millis(400)]
        );
        assert_eq!(sleeper.count(), 3);
        assert_eq!(sleeper.total(), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn full_duration_elapses_without_cancellation() {
        let start = Instant::now();
        let res = sleep_or_cancel(&TokioSleeper, Duration::from_millis(2), &Background).await;
        assert_eq!(res, Ok(()));
        assert!(start.elapsed() >= Duration::from_millis(2));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cuts_sleep_short() {
        let token = CancelToken::with_timeout(Duration::from_millis(5));
        let start = Instant::now();
        let res = sleep_or_cancel(&TokioSleeper, Duration::from_millis(20), &token).await;
        assert_eq!(res, Err(CancelError::DeadlineExceeded));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(5));
        assert!(elapsed < Duration::from_millis(20));
    }

    #[tokio::test]
    async fn fired_token_skips_timer() {
        let token = CancelToken::new();
        token.cancel();
        let sleeper = RecordingSleeper::new();
        let res = sleep_or_cancel(&sleeper, Duration::from_secs(1), &token).await;
        assert_eq!(res, Err(CancelError::Cancelled));
        assert_eq!(sleeper.count(), 0);
    }

    #[tokio::test]
    async fn works_through_trait_objects() {
        let token: Box<dyn Cancellation> = Box::new(Background);
        let res = sleep_or_cancel(&InstantSleeper, Duration::from_secs(5), token.as_ref()).await;
        assert_eq!(res, Ok(()));
    }
}
