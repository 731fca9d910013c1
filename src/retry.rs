//! Retry executor.
//!
//! Semantics:
//! - The work closure reports a [`WorkOutcome`]: an optional error plus a `should_retry` flag.
//!   The flag is authoritative; the executor never classifies errors itself.
//! - `should_retry == false` ends the run with the work's error, or `Ok(())` if there is none.
//! - `should_retry == true` schedules another attempt unless the retry budget is spent, in which
//!   case the run ends with [`RetryError::Exhausted`] wrapping the last error.
//! - [`RetryLimit::Max`] bounds *retries*, not total attempts: `Max(3)` allows up to 4
//!   invocations of the work.
//! - The delay before retry `n` (zero-based) is `schedule.delay(n)`. The wait is raced against
//!   the cancellation token; if the token fires first the run ends with
//!   [`RetryError::Cancelled`] and the work is not invoked again.
//! - An in-flight work future is never interrupted. The token is handed to the work so it can
//!   observe cancellation on its own.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use retrier::{CancelToken, Delay, Retrier, RetryError, WorkOutcome};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let retrier = Retrier::new(3, Delay::constant(Duration::from_millis(5)));
//! let token = CancelToken::with_timeout(Duration::from_secs(1));
//!
//! let mut calls = 0;
//! let result: Result<(), RetryError<std::io::Error>> = retrier
//!     .run_with_cancellation(&token, |_token| {
//!         calls += 1;
//!         let done = calls == 2;
//!         async move {
//!             if done {
//!                 WorkOutcome::success()
//!             } else {
//!                 WorkOutcome::retry(std::io::Error::new(std::io::ErrorKind::Other, "busy"))
//!             }
//!         }
//!     })
//!     .await;
//! assert!(result.is_ok());
//! # });
//! ```

use crate::cancel::{Background, Cancellation};
use crate::delay::{Delay, DelaySchedule};
use crate::error::RetryError;
use crate::sleeper::{sleep_or_cancel, Sleeper, TokioSleeper};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Maximum number of retries a [`Retrier`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryLimit {
    /// Retry until the work stops asking or the token fires.
    Unlimited,
    /// Retry at most this many times after the first attempt.
    Max(usize),
}

impl RetryLimit {
    /// Interpret a signed count where any negative value (conventionally `-1`) means unlimited.
    pub fn from_signed(max: i64) -> Self {
        match usize::try_from(max) {
            Ok(max) => Self::Max(max),
            Err(_) if max < 0 => Self::Unlimited,
            Err(_) => Self::Max(usize::MAX),
        }
    }

    /// Whether another retry is allowed after `retries` retries have already happened.
    pub fn allows(&self, retries: usize) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Max(max) => retries < *max,
        }
    }
}

impl From<usize> for RetryLimit {
    fn from(max: usize) -> Self {
        Self::Max(max)
    }
}

impl From<Option<usize>> for RetryLimit {
    fn from(max: Option<usize>) -> Self {
        max.map_or(Self::Unlimited, Self::Max)
    }
}

/// What a single invocation of the work reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkOutcome<E> {
    pub error: Option<E>,
    pub should_retry: bool,
}

impl<E> WorkOutcome<E> {
    /// The work succeeded.
    pub fn success() -> Self {
        Self { error: None, should_retry: false }
    }

    /// The work failed and must not be retried.
    pub fn fatal(error: E) -> Self {
        Self { error: Some(error), should_retry: false }
    }

    /// The work failed and should be retried.
    pub fn retry(error: E) -> Self {
        Self { error: Some(error), should_retry: true }
    }

    /// A retry was requested without an error to report. The executor honors the flag, but an
    /// exhausted budget will then have no cause to wrap.
    pub fn is_ambiguous(&self) -> bool {
        self.should_retry && self.error.is_none()
    }
}

impl<E> From<(Option<E>, bool)> for WorkOutcome<E> {
    fn from((error, should_retry): (Option<E>, bool)) -> Self {
        Self { error, should_retry }
    }
}

impl<E> From<Result<(), E>> for WorkOutcome<E> {
    /// Treats every error as retryable.
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::success(),
            Err(e) => Self::retry(e),
        }
    }
}

/// Re-invokes fallible work until it succeeds, gives up, runs out of retries, or is cancelled.
///
/// Immutable once built; clone it or share it behind a reference across tasks.
#[derive(Clone)]
pub struct Retrier {
    limit: RetryLimit,
    schedule: Arc<dyn DelaySchedule>,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for Retrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retrier")
            .field("limit", &self.limit)
            .field("schedule", &"<schedule>")
            .field("sleeper", &self.sleeper)
            .finish()
    }
}

impl Retrier {
    /// Retrier with the given retry limit and delay schedule, sleeping on tokio timers.
    pub fn new<L, S>(limit: L, schedule: S) -> Self
    where
        L: Into<RetryLimit>,
        S: DelaySchedule + 'static,
    {
        Self::builder().max_retries(limit).schedule(schedule).build()
    }

    pub fn builder() -> RetrierBuilder {
        RetrierBuilder::new()
    }

    pub fn limit(&self) -> RetryLimit {
        self.limit
    }

    /// Delay the schedule yields before retry `attempt`.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        self.schedule.delay(attempt)
    }

    /// Run `work` without any way to cancel between attempts.
    pub async fn run<E, W, Fut, O>(&self, mut work: W) -> Result<(), RetryError<E>>
    where
        W: FnMut() -> Fut,
        Fut: Future<Output = O>,
        O: Into<WorkOutcome<E>>,
    {
        self.run_with_cancellation(&Background, |_| work()).await
    }

    /// Run `work`, handing it a clone of `token` on every invocation.
    ///
    /// Returns `Ok(())` once the work reports success, the work's own error when it reports a
    /// non-retryable failure, [`RetryError::Exhausted`] when the retry limit is reached, or
    /// [`RetryError::Cancelled`] with the token's error if it fires while waiting.
    pub async fn run_with_cancellation<C, E, W, Fut, O>(
        &self,
        token: &C,
        mut work: W,
    ) -> Result<(), RetryError<E>>
    where
        C: Cancellation + Clone,
        W: FnMut(C) -> Fut,
        Fut: Future<Output = O>,
        O: Into<WorkOutcome<E>>,
    {
        let mut retries: usize = 0;

        loop {
            tracing::trace!(retries, "invoking work");
            let outcome: WorkOutcome<E> = work(token.clone()).await.into();
            if outcome.is_ambiguous() {
                tracing::warn!(retries, "work requested a retry without reporting an error");
            }

            let WorkOutcome { error, should_retry } = outcome;
            if !should_retry {
                return match error {
                    None => Ok(()),
                    Some(e) => Err(RetryError::Work(e)),
                };
            }

            if !self.limit.allows(retries) {
                tracing::debug!(retries, "retry budget exhausted");
                return Err(RetryError::Exhausted { retries, source: error });
            }

            let delay = self.schedule.delay(retries);
            tracing::debug!(retries, delay = ?delay, "scheduling retry");

            if let Err(err) = sleep_or_cancel(self.sleeper.as_ref(), delay, token).await {
                tracing::debug!(retries, error = %err, "cancelled while waiting to retry");
                return Err(RetryError::Cancelled(err));
            }
            retries += 1;
        }
    }
}

/// Retry budget used by [`RetrierBuilder::new`].
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Schedule used by [`RetrierBuilder::new`]: 100ms doubling up to 10s.
pub const DEFAULT_DELAY: Delay =
    Delay::capped_exponential(Duration::from_millis(100), 2, Duration::from_secs(10));

/// Builder for [`Retrier`].
pub struct RetrierBuilder {
    limit: RetryLimit,
    schedule: Arc<dyn DelaySchedule>,
    sleeper: Arc<dyn Sleeper>,
}

impl RetrierBuilder {
    /// Defaults: 3 retries, exponential delay from 100ms doubling up to 10s, tokio timers.
    pub fn new() -> Self {
        Self {
            limit: RetryLimit::Max(DEFAULT_MAX_RETRIES),
            schedule: Arc::new(DEFAULT_DELAY),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Set the retry limit. Accepts a count, `Option<usize>` or a [`RetryLimit`].
    pub fn max_retries<L>(mut self, limit: L) -> Self
    where
        L: Into<RetryLimit>,
    {
        self.limit = limit.into();
        self
    }

    /// Retry without a budget.
    pub fn unlimited(mut self) -> Self {
        self.limit = RetryLimit::Unlimited;
        self
    }

    /// Set the delay schedule: a [`Delay`] or any `Fn(usize) -> Duration`.
    pub fn schedule<S>(mut self, schedule: S) -> Self
    where
        S: DelaySchedule + 'static,
    {
        self.schedule = Arc::new(schedule);
        self
    }

    /// Provide a custom sleeper implementation.
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn build(self) -> Retrier {
        Retrier { limit: self.limit, schedule: self.schedule, sleeper: self.sleeper }
    }
}

impl Default for RetrierBuilder {
    fn default() -> Self {
        Self::new()
    }
}
