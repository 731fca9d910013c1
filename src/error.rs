//! Terminal errors of a retry run.
use crate::cancel::CancelError;
use std::fmt;

/// How a retry run ended when it did not succeed.
///
/// The three variants are the three ways a run can stop short of success, so callers can
/// tell them apart with a `match` (or the `is_*` helpers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// The work returned a non-retryable error. Carried verbatim.
    Work(E),
    /// The retry budget ran out. `source` is the error from the last attempt, which may be
    /// missing if the work asked for a retry without reporting one.
    Exhausted { retries: usize, source: Option<E> },
    /// The cancellation token fired while waiting for the next attempt.
    Cancelled(CancelError),
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Work(e) => write!(f, "{}", e),
            Self::Exhausted { source: Some(e), .. } => {
                write!(f, "failed after max retries: {}", e)
            }
            Self::Exhausted { source: None, retries } => {
                write!(f, "failed after max retries ({} retries); no error reported", retries)
            }
            Self::Cancelled(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Work(e) => Some(e),
            Self::Exhausted { source, .. } => source.as_ref().map(|e| e as &dyn std::error::Error),
            Self::Cancelled(e) => Some(e),
        }
    }
}

impl<E> From<CancelError> for RetryError<E> {
    fn from(err: CancelError) -> Self {
        Self::Cancelled(err)
    }
}

impl<E> RetryError<E> {
    /// The work reported a non-retryable error.
    pub fn is_work(&self) -> bool {
        matches!(self, Self::Work(_))
    }
    /// The retry budget ran out.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
    /// The token fired.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
    /// Borrow the non-retryable work error.
    pub fn as_work(&self) -> Option<&E> {
        match self {
            Self::Work(e) => Some(e),
            _ => None,
        }
    }
    /// Take the non-retryable work error.
    pub fn into_work(self) -> Option<E> {
        match self {
            Self::Work(e) => Some(e),
            _ => None,
        }
    }
    /// Borrow the error from the last attempt before the budget ran out.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            Self::Exhausted { source, .. } => source.as_ref(),
            _ => None,
        }
    }
    /// Take the error from the last attempt before the budget ran out.
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::Exhausted { source, .. } => source,
            _ => None,
        }
    }
    /// Retries performed before giving up, for exhausted runs.
    pub fn retries(&self) -> Option<usize> {
        match self {
            Self::Exhausted { retries, .. } => Some(*retries),
            _ => None,
        }
    }
    /// The token's error, for cancelled runs.
    pub fn cancellation(&self) -> Option<CancelError> {
        match self {
            Self::Cancelled(e) => Some(*e),
            _ => None,
        }
    }
}
