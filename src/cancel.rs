//! Cancellation tokens observed by the retry loop.
//!
//! A token is owned by the caller. The executor only asks whether it has fired and waits on it
//! while sleeping between attempts; it never cancels a token itself.
//!
//! - [`Background`] never fires. It is what [`Retrier::run`](crate::Retrier::run) uses.
//! - [`CancelToken`] fires on [`CancelToken::cancel`] or when its deadline passes, whichever
//!   happens first. The first cause is sticky.
//!
//! Deadlines use `tokio::time::Instant`, so paused test time applies to them.

use futures::future::{self, BoxFuture, FutureExt};
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a token fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum CancelError {
    /// The token was cancelled explicitly.
    #[error("operation cancelled")]
    Cancelled,
    /// The token's deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Read-only view of a cancellation signal.
pub trait Cancellation: Send + Sync + fmt::Debug {
    /// The error the token fired with, or `None` while it is still live.
    fn error(&self) -> Option<CancelError>;

    /// Resolves with the token's error once it fires. Never resolves for tokens that cannot fire.
    fn fired(&self) -> BoxFuture<'_, CancelError>;
}

/// A token that never fires.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Background;

impl Cancellation for Background {
    fn error(&self) -> Option<CancelError> {
        None
    }

    fn fired(&self) -> BoxFuture<'_, CancelError> {
        future::pending().boxed()
    }
}

#[derive(Debug, Clone, Copy)]
struct Fired {
    cause: CancelError,
    at: Instant,
}

#[derive(Debug)]
struct Shared {
    token: CancellationToken,
    deadline: Option<Instant>,
    fired: OnceLock<Fired>,
    parent: Option<CancelToken>,
}

/// Cancellable token with an optional deadline.
///
/// Clones share state: cancelling one clone fires all of them.
#[derive(Debug, Clone)]
pub struct CancelToken {
    shared: Arc<Shared>,
}

impl CancelToken {
    /// A token without a deadline. Fires only on [`cancel`](Self::cancel).
    pub fn new() -> Self {
        Self::build(CancellationToken::new(), None, None)
    }

    /// A token that fires `timeout` from now.
    ///
    /// A timeout too large to represent as an instant leaves the token without a deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => Self::with_deadline(deadline),
            None => Self::new(),
        }
    }

    /// A token that fires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::build(CancellationToken::new(), Some(deadline), None)
    }

    fn build(
        token: CancellationToken,
        deadline: Option<Instant>,
        parent: Option<CancelToken>,
    ) -> Self {
        Self { shared: Arc::new(Shared { token, deadline, fired: OnceLock::new(), parent }) }
    }

    /// Derive a token that fires when this one does, and can also be cancelled on its own.
    ///
    /// Cancelling the child does not affect the parent. The child inherits the parent's
    /// deadline.
    pub fn child(&self) -> Self {
        Self::build(self.shared.token.child_token(), self.shared.deadline, Some(self.clone()))
    }

    /// Derive a child token with a deadline no later than the parent's.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let own = Instant::now().checked_add(timeout);
        let deadline = match (self.shared.deadline, own) {
            (Some(parent), Some(own)) => Some(parent.min(own)),
            (parent, own) => parent.or(own),
        };
        Self::build(self.shared.token.child_token(), deadline, Some(self.clone()))
    }

    /// Fire the token with [`CancelError::Cancelled`]. No-op if it already fired, including a
    /// deadline that passed without anyone looking.
    pub fn cancel(&self) {
        if self.resolve().is_none() {
            let fired = Fired { cause: CancelError::Cancelled, at: Instant::now() };
            if self.shared.fired.set(fired).is_ok() {
                tracing::trace!("cancellation token cancelled");
            }
        }
        self.shared.token.cancel();
    }

    /// The configured deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.shared.deadline
    }

    /// Whether the token has fired, either way.
    pub fn is_fired(&self) -> bool {
        self.error().is_some()
    }

    // Earliest of: a recorded cause, the parent's cause, an expired deadline. The winner is
    // recorded so later calls agree with it.
    fn resolve(&self) -> Option<Fired> {
        if let Some(fired) = self.shared.fired.get() {
            return Some(*fired);
        }
        let now = Instant::now();
        let inherited = self.shared.parent.as_ref().and_then(CancelToken::resolve);
        let expired = self
            .shared
            .deadline
            .filter(|deadline| *deadline <= now)
            .map(|at| Fired { cause: CancelError::DeadlineExceeded, at });
        let fired = match (inherited, expired) {
            (Some(parent), Some(own)) if own.at < parent.at => own,
            (Some(first), _) | (None, Some(first)) => first,
            (None, None) if self.shared.token.is_cancelled() => {
                Fired { cause: CancelError::Cancelled, at: now }
            }
            (None, None) => return None,
        };
        Some(*self.shared.fired.get_or_init(|| fired))
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation for CancelToken {
    fn error(&self) -> Option<CancelError> {
        self.resolve().map(|fired| fired.cause)
    }

    fn fired(&self) -> BoxFuture<'_, CancelError> {
        async move {
            if let Some(cause) = self.error() {
                return cause;
            }
            match self.shared.deadline {
                Some(deadline) => {
                    tokio::select! {
                        biased;
                        _ = self.shared.token.cancelled() => {
                            self.error().unwrap_or(CancelError::Cancelled)
                        }
                        _ = tokio::time::sleep_until(deadline) => {
                            self.error().unwrap_or(CancelError::DeadlineExceeded)
                        }
                    }
                }
                None => {
                    self.shared.token.cancelled().await;
                    self.error().unwrap_or(CancelError::Cancelled)
                }
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_never_fires() {
        assert_eq!(Background.error(), None);
        assert!(Background.fired().now_or_never().is_none());
    }

    #[tokio::test]
    async fn explicit_cancel_fires_all_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_fired());

        token.cancel();
        assert_eq!(clone.error(), Some(CancelError::Cancelled));
        assert_eq!(clone.fired().await, CancelError::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fires_with_deadline_exceeded() {
        let token = CancelToken::with_timeout(Duration::from_millis(50));
        assert_eq!(token.error(), None);

        let start = Instant::now();
        assert_eq!(token.fired().await, CancelError::DeadlineExceeded);
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(token.error(), Some(CancelError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn first_cause_is_sticky() {
        let token = CancelToken::with_timeout(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(token.error(), Some(CancelError::DeadlineExceeded));

        token.cancel();
        assert_eq!(token.error(), Some(CancelError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_unobserved_deadline_keeps_deadline() {
        let token = CancelToken::with_timeout(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(20)).await;

        token.cancel();
        assert_eq!(token.error(), Some(CancelError::DeadlineExceeded));
        assert_eq!(token.fired().await, CancelError::DeadlineExceeded);
    }

    #[tokio::test(start_paused = true)]
    async fn child_cancel_after_parent_deadline_reports_deadline() {
        let parent = CancelToken::with_timeout(Duration::from_millis(10));
        let child = parent.child();
        tokio::time::sleep(Duration::from_millis(20)).await;

        child.cancel();
        assert_eq!(child.error(), Some(CancelError::DeadlineExceeded));
        assert_eq!(parent.error(), Some(CancelError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn parent_cancel_after_child_deadline_keeps_child_deadline() {
        let parent = CancelToken::new();
        let child = parent.child_with_timeout(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(20)).await;

        parent.cancel();
        assert_eq!(parent.error(), Some(CancelError::Cancelled));
        assert_eq!(child.error(), Some(CancelError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn parent_cancel_before_child_deadline_wins_when_read_late() {
        let parent = CancelToken::new();
        let child = parent.child_with_timeout(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(5)).await;
        parent.cancel();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(child.error(), Some(CancelError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn huge_timeouts_mean_no_deadline() {
        let token = CancelToken::with_timeout(Duration::MAX);
        assert_eq!(token.deadline(), None);
        assert_eq!(token.error(), None);

        let child = token.child_with_timeout(Duration::MAX);
        assert_eq!(child.deadline(), None);

        let bounded = CancelToken::with_timeout(Duration::from_millis(10));
        let child = bounded.child_with_timeout(Duration::MAX);
        assert_eq!(child.deadline(), bounded.deadline());
        assert!(child.fired().now_or_never().is_none());
    }

    #[tokio::test]
    async fn cancel_wakes_pending_waiter() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.fired().await })
        };
        tokio::task::yield_now().await;
        token.cancel();
        assert_eq!(waiter.await.expect("join"), CancelError::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn child_reports_parent_cause() {
        let parent = CancelToken::with_timeout(Duration::from_millis(30));
        let child = parent.child();
        assert_eq!(child.deadline(), parent.deadline());

        assert_eq!(child.fired().await, CancelError::DeadlineExceeded);
        assert_eq!(parent.error(), Some(CancelError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn child_follows_parent_cancel() {
        let parent = CancelToken::new();
        let child = parent.child();
        parent.cancel();
        assert_eq!(child.error(), Some(CancelError::Cancelled));
        assert_eq!(child.fired().await, CancelError::Cancelled);
    }

    #[tokio::test]
    async fn cancelling_child_leaves_parent_live() {
        let parent = CancelToken::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_fired());
        assert!(!parent.is_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn child_timeout_never_outlives_parent() {
        let parent = CancelToken::with_timeout(Duration::from_millis(10));
        let child = parent.child_with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());

        let shorter = parent.child_with_timeout(Duration::from_millis(5));
        assert!(shorter.deadline() < parent.deadline());
    }
}
