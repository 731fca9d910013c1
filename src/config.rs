//! Declarative retry configuration (requires the `serde` feature).
//!
//! Durations are expressed in milliseconds so the format stays readable in JSON/TOML files.
//!
//! ```rust
//! use retrier::config::{DelayConfig, RetryConfig};
//! use retrier::RetryLimit;
//!
//! let config = RetryConfig {
//!     max_retries: Some(5),
//!     delay: DelayConfig::Exponential { base_ms: 100, factor: 2, cap_ms: Some(5_000) },
//! };
//! let retrier = config.build().unwrap();
//! assert_eq!(retrier.limit(), RetryLimit::Max(5));
//! ```

use crate::retry::DEFAULT_MAX_RETRIES;
use crate::{Delay, Retrier};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Errors produced while turning a [`RetryConfig`] into a [`Retrier`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("cap ({cap_ms}ms) must be >= the first delay ({first_ms}ms)")]
    CapBelowFirstDelay { first_ms: u64, cap_ms: u64 },
}

/// Delay schedule description.
///
/// `factor` follows [`Delay::exponential`]: any value is accepted, `0` included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DelayConfig {
    None,
    Constant {
        delay_ms: u64,
    },
    Linear {
        step_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cap_ms: Option<u64>,
    },
    Exponential {
        base_ms: u64,
        factor: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cap_ms: Option<u64>,
    },
}

impl DelayConfig {
    pub fn to_delay(&self) -> Result<Delay, ConfigError> {
        let ms = Duration::from_millis;
        let delay = match *self {
            DelayConfig::None => Delay::none(),
            DelayConfig::Constant { delay_ms } => Delay::constant(ms(delay_ms)),
            DelayConfig::Linear { step_ms, cap_ms: None } => Delay::linear(ms(step_ms)),
            DelayConfig::Linear { step_ms, cap_ms: Some(cap_ms) } => {
                check_cap(step_ms, cap_ms)?;
                Delay::capped_linear(ms(step_ms), ms(cap_ms))
            }
            DelayConfig::Exponential { base_ms, factor, cap_ms: None } => {
                Delay::exponential(ms(base_ms), factor)
            }
            DelayConfig::Exponential { base_ms, factor, cap_ms: Some(cap_ms) } => {
                check_cap(base_ms, cap_ms)?;
                Delay::capped_exponential(ms(base_ms), factor, ms(cap_ms))
            }
        };
        Ok(delay)
    }
}

/// Same schedule as [`DEFAULT_DELAY`](crate::retry::DEFAULT_DELAY).
impl Default for DelayConfig {
    fn default() -> Self {
        DelayConfig::Exponential { base_ms: 100, factor: 2, cap_ms: Some(10_000) }
    }
}

fn check_cap(first_ms: u64, cap_ms: u64) -> Result<(), ConfigError> {
    if cap_ms < first_ms {
        return Err(ConfigError::CapBelowFirstDelay { first_ms, cap_ms });
    }
    Ok(())
}

/// Serializable retrier settings. `max_retries: None` (`null`) means unlimited.
///
/// Omitted fields take the same defaults as
/// [`RetrierBuilder::new`](crate::RetrierBuilder::new): three retries on a capped exponential
/// schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: Option<usize>,
    pub delay: DelayConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: Some(DEFAULT_MAX_RETRIES), delay: DelayConfig::default() }
    }
}

impl RetryConfig {
    /// Build a retrier sleeping on tokio timers.
    pub fn build(&self) -> Result<Retrier, ConfigError> {
        Ok(Retrier::new(self.max_retries, self.delay.to_delay()?))
    }
}

impl TryFrom<RetryConfig> for Retrier {
    type Error = ConfigError;

    fn try_from(config: RetryConfig) -> Result<Self, Self::Error> {
        config.build()
    }
}
