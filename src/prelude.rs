//! Convenient re-exports for common retrier types.
pub use crate::{
    cancel::{Background, CancelError, CancelToken, Cancellation},
    delay::{Delay, DelaySchedule},
    error::RetryError,
    retry::{Retrier, RetrierBuilder, RetryLimit, WorkOutcome},
};
