//! Delay schedules for the retry loop.
//!
//! A schedule maps the zero-based index of the retry about to happen to the time to wait before
//! it. Attempt `0` is the wait before the first retry, so every built-in schedule except
//! [`Delay::none`] waits a non-zero amount before the first retry.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use retrier::{Delay, DelaySchedule};
//!
//! let delay = Delay::capped_exponential(Duration::from_millis(100), 2, Duration::from_secs(1));
//! assert_eq!(delay.delay(0), Duration::from_millis(100));
//! assert_eq!(delay.delay(1), Duration::from_millis(200));
//! assert_eq!(delay.delay(2), Duration::from_millis(400));
//! assert_eq!(delay.delay(4), Duration::from_secs(1)); // capped
//! ```
//!
//! Overflow behavior: all arithmetic happens on `u128` nanoseconds and saturates to
//! `Duration::MAX`. Pair exponential schedules with a cap when the retry budget is unlimited.

use std::fmt;
use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Computes the wait before the retry with the given zero-based index.
///
/// Implemented for every `Fn(usize) -> Duration` closure, so callers can plug in their own
/// schedule (for example one that adds jitter) without a wrapper type.
pub trait DelaySchedule: Send + Sync {
    fn delay(&self, attempt: usize) -> Duration;
}

impl<F> DelaySchedule for F
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    fn delay(&self, attempt: usize) -> Duration {
        self(attempt)
    }
}

fn saturating_from_nanos(nanos: u128) -> Duration {
    let secs = nanos / NANOS_PER_SEC;
    if secs > u64::MAX as u128 {
        return Duration::MAX;
    }
    Duration::new(secs as u64, (nanos % NANOS_PER_SEC) as u32)
}

fn clamp(delay: Duration, cap: Option<Duration>) -> Duration {
    cap.map(|c| delay.min(c)).unwrap_or(delay)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DelayKind {
    None,
    Constant { delay: Duration },
    Linear { step: Duration, cap: Option<Duration> },
    Exponential { base: Duration, factor: u32, cap: Option<Duration> },
}

impl DelayKind {
    fn delay(&self, attempt: usize) -> Duration {
        match *self {
            DelayKind::None => Duration::ZERO,
            DelayKind::Constant { delay } => delay,
            DelayKind::Linear { step, cap } => {
                let steps = (attempt as u128).saturating_add(1);
                clamp(saturating_from_nanos(step.as_nanos().saturating_mul(steps)), cap)
            }
            DelayKind::Exponential { base, factor, cap } => {
                // exponents past u32::MAX already saturate for any factor >= 2
                let exponent = attempt.min(u32::MAX as usize) as u32;
                let multiplier = (factor as u128).saturating_pow(exponent);
                clamp(saturating_from_nanos(base.as_nanos().saturating_mul(multiplier)), cap)
            }
        }
    }
}

/// Built-in delay schedules.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Delay {
    kind: DelayKind,
}

impl Delay {
    /// Retry immediately.
    pub const fn none() -> Self {
        Self { kind: DelayKind::None }
    }

    /// Wait `delay` before every retry.
    pub const fn constant(delay: Duration) -> Self {
        Self { kind: DelayKind::Constant { delay } }
    }

    /// Wait `step * (attempt + 1)`: one `step` before the first retry, two before the second.
    pub const fn linear(step: Duration) -> Self {
        Self { kind: DelayKind::Linear { step, cap: None } }
    }

    /// Linear schedule that never waits longer than `cap`.
    pub const fn capped_linear(step: Duration, cap: Duration) -> Self {
        Self { kind: DelayKind::Linear { step, cap: Some(cap) } }
    }

    /// Wait `base * factor^attempt`.
    ///
    /// Every factor is accepted. `1` keeps the delay at `base`; `0` waits `base` before the
    /// first retry and nothing after that.
    pub const fn exponential(base: Duration, factor: u32) -> Self {
        Self { kind: DelayKind::Exponential { base, factor, cap: None } }
    }

    /// Exponential schedule that never waits longer than `cap`.
    pub const fn capped_exponential(base: Duration, factor: u32, cap: Duration) -> Self {
        Self { kind: DelayKind::Exponential { base, factor, cap: Some(cap) } }
    }

    /// Upper bound on any delay this schedule returns, if one was configured.
    pub fn cap(&self) -> Option<Duration> {
        match self.kind {
            DelayKind::None => Some(Duration::ZERO),
            DelayKind::Constant { delay } => Some(delay),
            DelayKind::Linear { cap, .. } | DelayKind::Exponential { cap, .. } => cap,
        }
    }
}

impl Default for Delay {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Debug for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DelayKind::None => f.write_str("Delay::None"),
            DelayKind::Constant { delay } => {
                f.debug_tuple("Delay::Constant").field(&delay).finish()
            }
            DelayKind::Linear { step, cap } => {
                f.debug_struct("Delay::Linear").field("step", &step).field("cap", &cap).finish()
            }
            DelayKind::Exponential { base, factor, cap } => f
                .debug_struct("Delay::Exponential")
                .field("base", &base)
                .field("factor", &factor)
                .field("cap", &cap)
                .finish(),
        }
    }
}

impl DelaySchedule for Delay {
    fn delay(&self, attempt: usize) -> Duration {
        self.kind.delay(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: Duration = Duration::from_secs(1);

    #[test]
    fn none_is_always_zero() {
        let delay = Delay::none();
        for attempt in [0, 1, 25, usize::MAX] {
            assert_eq!(delay.delay(attempt), Duration::ZERO);
        }
    }

    #[test]
    fn constant_ignores_attempt() {
        let delay = Delay::constant(SEC);
        for attempt in [0, 1, 25] {
            assert_eq!(delay.delay(attempt), SEC);
        }
    }

    #[test]
    fn linear_adds_one_step_per_retry() {
        let delay = Delay::linear(SEC);
        assert_eq!(delay.delay(0), SEC);
        assert_eq!(delay.delay(1), SEC * 2);
        assert_eq!(delay.delay(25), SEC * 26);
    }

    #[test]
    fn capped_linear_clamps_at_cap() {
        let delay = Delay::capped_linear(SEC, SEC * 10);
        assert_eq!(delay.delay(0), SEC);
        assert_eq!(delay.delay(1), SEC * 2);
        assert_eq!(delay.delay(5), SEC * 6);
        assert_eq!(delay.delay(8), SEC * 9);
        // uncapped value meets the cap exactly
        assert_eq!(delay.delay(9), SEC * 10);
        assert_eq!(delay.delay(25), SEC * 10);
    }

    #[test]
    fn exponential_multiplies_by_factor() {
        assert_eq!(Delay::exponential(SEC, 5).delay(0), SEC);
        assert_eq!(Delay::exponential(SEC, 4).delay(1), SEC * 4);
        assert_eq!(Delay::exponential(SEC, 3).delay(2), SEC * 9);
        assert_eq!(Delay::exponential(SEC, 2).delay(25), SEC * 33_554_432);
    }

    #[test]
    fn capped_exponential_clamps_at_cap() {
        let hour = Duration::from_secs(3600);
        assert_eq!(Delay::capped_exponential(SEC, 5, hour).delay(0), SEC);
        assert_eq!(Delay::capped_exponential(SEC, 4, hour).delay(1), SEC * 4);
        assert_eq!(Delay::capped_exponential(SEC, 2, hour).delay(5), SEC * 32);
        assert_eq!(Delay::capped_exponential(SEC, 2, hour).delay(25), hour);
    }

    #[test]
    fn huge_attempts_saturate_instead_of_panicking() {
        assert_eq!(Delay::exponential(SEC, 2).delay(1_000_000), Duration::MAX);
        assert_eq!(Delay::linear(Duration::from_secs(u64::MAX / 2)).delay(10), Duration::MAX);
        let capped = Delay::capped_exponential(SEC, 2, SEC * 30);
        assert_eq!(capped.delay(usize::MAX), SEC * 30);
    }

    #[test]
    fn degenerate_factors() {
        assert_eq!(Delay::exponential(SEC, 1).delay(40), SEC);
        assert_eq!(Delay::exponential(SEC, 0).delay(0), SEC);
        assert_eq!(Delay::exponential(SEC, 0).delay(3), Duration::ZERO);
        assert_eq!(Delay::linear(Duration::ZERO).delay(7), Duration::ZERO);
    }

    #[test]
    fn sub_second_precision_is_kept() {
        let delay = Delay::linear(Duration::from_micros(1_500));
        assert_eq!(delay.delay(2), Duration::from_micros(4_500));
    }

    #[test]
    fn closures_are_schedules() {
        let schedule = |attempt: usize| Duration::from_millis(10 * attempt as u64);
        assert_eq!(DelaySchedule::delay(&schedule, 3), Duration::from_millis(30));
    }

    #[test]
    fn cap_reports_upper_bound() {
        assert_eq!(Delay::none().cap(), Some(Duration::ZERO));
        assert_eq!(Delay::constant(SEC).cap(), Some(SEC));
        assert_eq!(Delay::linear(SEC).cap(), None);
        assert_eq!(Delay::capped_exponential(SEC, 2, SEC * 4).cap(), Some(SEC * 4));
    }
}
