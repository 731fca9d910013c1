#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # retrier
//!
//! Re-run fallible async work with a configurable delay between attempts until it succeeds,
//! reports a non-retryable failure, runs out of retries, or a cancellation token fires.
//!
//! ## Features
//!
//! - **Delay schedules**: none, constant, linear and exponential, each optionally capped, or
//!   any `Fn(usize) -> Duration`
//! - **Retry budgets** counted in retries, or unlimited
//! - **Cancellation tokens** with explicit cancel and deadlines, raced against every delay
//! - **Pluggable sleepers** so tests can observe delays without waiting
//!
//! ## Quick Start
//!
//! ```rust
//! use retrier::{Delay, Retrier, RetryError, WorkOutcome};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let retrier = Retrier::builder()
//!         .max_retries(3)
//!         .schedule(Delay::capped_exponential(
//!             Duration::from_millis(10),
//!             2,
//!             Duration::from_millis(100),
//!         ))
//!         .build();
//!
//!     let result: Result<(), RetryError<std::io::Error>> = retrier
//!         .run(|| async {
//!             // Your fallible operation here
//!             WorkOutcome::success()
//!         })
//!         .await;
//!     assert!(result.is_ok());
//! }
//! ```

pub mod cancel;
#[cfg(feature = "serde")]
pub mod config;
pub mod delay;
pub mod error;
pub mod prelude;
pub mod retry;
pub mod sleeper;

// Re-exports
pub use cancel::{Background, CancelError, CancelToken, Cancellation};
pub use delay::{Delay, DelaySchedule};
pub use error::RetryError;
pub use retry::{Retrier, RetrierBuilder, RetryLimit, WorkOutcome};
pub use sleeper::{sleep_or_cancel, InstantSleeper, RecordingSleeper, Sleeper, TokioSleeper};
