// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Backoff arithmetic for the retry engine.
//!
//! This module provides truncated [exponential backoff] with full jitter,
//! and the per-attempt RPC timeout arithmetic that goes with it. All
//! functions here are pure; the retry engine owns the clock and the RNG.
//!
//! [exponential backoff]: https://en.wikipedia.org/wiki/Exponential_backoff

use crate::Result;
use crate::error::Error;
use std::time::Duration;

/// The backoff and timeout parameters for one retryable call.
///
/// The delay series is truncated exponential: each retry delay is the
/// previous delay scaled by the multiplier and capped at the maximum. The
/// actual wait before an attempt is drawn uniformly from `[0, delay)`. The
/// per-attempt RPC timeout follows the same recurrence, additionally capped
/// by the time remaining in the total timeout.
///
/// At most one of [max_retries][BackoffSettings::max_retries] and
/// [total_timeout][BackoffSettings::total_timeout] may be honored by a
/// retry loop; configuring both is rejected when the first error is
/// handled.
#[derive(Clone, Debug, PartialEq)]
pub struct BackoffSettings {
    pub(crate) initial_retry_delay: Duration,
    pub(crate) retry_delay_multiplier: f64,
    pub(crate) max_retry_delay: Duration,
    pub(crate) initial_rpc_timeout: Duration,
    pub(crate) rpc_timeout_multiplier: f64,
    pub(crate) max_rpc_timeout: Duration,
    pub(crate) total_timeout: Option<Duration>,
    pub(crate) max_retries: Option<u32>,
}

impl std::default::Default for BackoffSettings {
    fn default() -> Self {
        Self {
            initial_retry_delay: Duration::from_millis(100),
            retry_delay_multiplier: 1.3,
            max_retry_delay: Duration::from_secs(60),
            initial_rpc_timeout: Duration::from_secs(60),
            rpc_timeout_multiplier: 1.0,
            max_rpc_timeout: Duration::from_secs(60),
            total_timeout: None,
            max_retries: None,
        }
    }
}

/// The reason an attempt must be abandoned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exhausted {
    /// The total timeout elapsed before the call succeeded.
    DeadlineExceeded { total: Duration },
    /// The consecutive-failure budget is spent.
    MaxRetries { limit: u32 },
}

impl BackoffSettings {
    /// Creates a builder with the default parameters.
    pub fn builder() -> BackoffSettingsBuilder {
        BackoffSettingsBuilder::new()
    }

    pub fn initial_retry_delay(&self) -> Duration {
        self.initial_retry_delay
    }

    pub fn retry_delay_multiplier(&self) -> f64 {
        self.retry_delay_multiplier
    }

    pub fn max_retry_delay(&self) -> Duration {
        self.max_retry_delay
    }

    pub fn initial_rpc_timeout(&self) -> Duration {
        self.initial_rpc_timeout
    }

    pub fn rpc_timeout_multiplier(&self) -> f64 {
        self.rpc_timeout_multiplier
    }

    pub fn max_rpc_timeout(&self) -> Duration {
        self.max_rpc_timeout
    }

    pub fn total_timeout(&self) -> Option<Duration> {
        self.total_timeout
    }

    pub fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    /// The delay bound for the retry after the one using `current`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        scale(current, self.retry_delay_multiplier, self.max_retry_delay)
    }

    /// The RPC timeout for the attempt after the one using `current`.
    ///
    /// `remaining` is the time left before the total timeout, when one is
    /// configured.
    pub fn next_timeout(&self, current: Duration, remaining: Option<Duration>) -> Duration {
        let scaled = scale(current, self.rpc_timeout_multiplier, self.max_rpc_timeout);
        remaining.map_or(scaled, |r| scaled.min(r))
    }

    /// Draws the actual sleep, uniform over `[0, delay)`.
    pub fn jittered(delay: Duration, rng: &mut impl rand::Rng) -> Duration {
        if delay.is_zero() {
            return Duration::ZERO;
        }
        rng.random_range(Duration::ZERO..delay)
    }

    /// Returns the reason the next attempt must be abandoned, if any.
    ///
    /// `retry_count` is the number of consecutive failures since the last
    /// received message; `elapsed` is the time since the logical call
    /// started.
    pub fn exceeded(&self, retry_count: u32, elapsed: Duration) -> Option<Exhausted> {
        if let Some(total) = self.total_timeout {
            if elapsed >= total {
                return Some(Exhausted::DeadlineExceeded { total });
            }
        }
        if let Some(limit) = self.max_retries {
            if retry_count >= limit {
                return Some(Exhausted::MaxRetries { limit });
            }
        }
        None
    }
}

fn scale(current: Duration, multiplier: f64, maximum: Duration) -> Duration {
    let scaled = current.as_secs_f64() * multiplier;
    let capped = scaled.min(maximum.as_secs_f64()).max(0.0);
    Duration::from_secs_f64(capped)
}

/// A builder for [BackoffSettings].
///
/// # Example
/// ```
/// # use callstream::backoff::BackoffSettings;
/// use std::time::Duration;
/// let backoff = BackoffSettings::builder()
///     .with_initial_retry_delay(Duration::from_millis(250))
///     .with_max_retry_delay(Duration::from_secs(30))
///     .with_max_retries(5)
///     .build()?;
/// assert_eq!(backoff.max_retries(), Some(5));
/// # Ok::<(), callstream::error::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct BackoffSettingsBuilder {
    settings: BackoffSettings,
}

impl BackoffSettingsBuilder {
    pub fn new() -> Self {
        Self {
            settings: BackoffSettings::default(),
        }
    }

    /// Change the delay bound for the first retry.
    pub fn with_initial_retry_delay<V: Into<Duration>>(mut self, v: V) -> Self {
        self.settings.initial_retry_delay = v.into();
        self
    }

    /// Change the scaling factor for the retry delays.
    pub fn with_retry_delay_multiplier<V: Into<f64>>(mut self, v: V) -> Self {
        self.settings.retry_delay_multiplier = v.into();
        self
    }

    /// Change the cap on retry delays.
    pub fn with_max_retry_delay<V: Into<Duration>>(mut self, v: V) -> Self {
        self.settings.max_retry_delay = v.into();
        self
    }

    /// Change the RPC timeout for the first attempt.
    pub fn with_initial_rpc_timeout<V: Into<Duration>>(mut self, v: V) -> Self {
        self.settings.initial_rpc_timeout = v.into();
        self
    }

    /// Change the scaling factor for the per-attempt RPC timeout.
    pub fn with_rpc_timeout_multiplier<V: Into<f64>>(mut self, v: V) -> Self {
        self.settings.rpc_timeout_multiplier = v.into();
        self
    }

    /// Change the cap on per-attempt RPC timeouts.
    pub fn with_max_rpc_timeout<V: Into<Duration>>(mut self, v: V) -> Self {
        self.settings.max_rpc_timeout = v.into();
        self
    }

    /// Bound the retry loop by elapsed time.
    pub fn with_total_timeout<V: Into<Duration>>(mut self, v: V) -> Self {
        self.settings.total_timeout = Some(v.into());
        self
    }

    /// Bound the retry loop by consecutive failures.
    pub fn with_max_retries(mut self, v: u32) -> Self {
        self.settings.max_retries = Some(v);
        self
    }

    /// Creates the settings, validating the parameters.
    pub fn build(self) -> Result<BackoffSettings> {
        if let Some(error) = self.validate() {
            return Err(error);
        }
        Ok(self.settings)
    }

    fn validate(&self) -> Option<Error> {
        let s = &self.settings;
        if s.retry_delay_multiplier < 1.0 {
            return Some(Error::invalid_argument(format!(
                "retry delay multiplier ({}) must be >= 1.0",
                s.retry_delay_multiplier
            )));
        }
        if s.rpc_timeout_multiplier < 1.0 {
            return Some(Error::invalid_argument(format!(
                "rpc timeout multiplier ({}) must be >= 1.0",
                s.rpc_timeout_multiplier
            )));
        }
        if s.initial_retry_delay.is_zero() {
            return Some(Error::invalid_argument(format!(
                "initial retry delay must be greater than zero, got={:?}",
                s.initial_retry_delay
            )));
        }
        if s.max_retry_delay < s.initial_retry_delay {
            return Some(Error::invalid_argument(format!(
                "max retry delay ({:?}) must be greater or equal to the initial retry delay ({:?})",
                s.max_retry_delay, s.initial_retry_delay
            )));
        }
        if s.max_rpc_timeout < s.initial_rpc_timeout {
            return Some(Error::invalid_argument(format!(
                "max rpc timeout ({:?}) must be greater or equal to the initial rpc timeout ({:?})",
                s.max_rpc_timeout, s.initial_rpc_timeout
            )));
        }
        None
    }
}

impl std::default::Default for BackoffSettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_rng::MockRng;
    type TestResult = anyhow::Result<()>;

    #[test]
    fn build_errors() -> TestResult {
        let b = BackoffSettings::builder()
            .with_initial_retry_delay(Duration::ZERO)
            .build();
        assert!(b.is_err(), "{b:?}");
        let b = BackoffSettings::builder()
            .with_initial_retry_delay(Duration::from_secs(10))
            .with_max_retry_delay(Duration::from_secs(5))
            .build();
        assert!(b.is_err(), "{b:?}");
        let b = BackoffSettings::builder()
            .with_retry_delay_multiplier(0.5)
            .build();
        assert!(b.is_err(), "{b:?}");
        let b = BackoffSettings::builder()
            .with_rpc_timeout_multiplier(-1.0)
            .build();
        assert!(b.is_err(), "{b:?}");
        let b = BackoffSettings::builder()
            .with_initial_rpc_timeout(Duration::from_secs(120))
            .with_max_rpc_timeout(Duration::from_secs(60))
            .build();
        assert!(b.is_err(), "{b:?}");
        Ok(())
    }

    #[test]
    fn builder_defaults() -> TestResult {
        let got = BackoffSettings::builder().build()?;
        assert_eq!(got, BackoffSettings::default());
        assert_eq!(got.total_timeout(), None);
        assert_eq!(got.max_retries(), None);
        let _ = BackoffSettingsBuilder::default().build()?;
        Ok(())
    }

    #[test]
    fn delay_series_truncates() -> TestResult {
        let b = BackoffSettings::builder()
            .with_initial_retry_delay(Duration::from_secs(1))
            .with_retry_delay_multiplier(2.0)
            .with_max_retry_delay(Duration::from_secs(4))
            .build()?;
        let mut delay = b.initial_retry_delay();
        assert_eq!(delay, Duration::from_secs(1));
        delay = b.next_delay(delay);
        assert_eq!(delay, Duration::from_secs(2));
        delay = b.next_delay(delay);
        assert_eq!(delay, Duration::from_secs(4));
        delay = b.next_delay(delay);
        assert_eq!(delay, Duration::from_secs(4));
        Ok(())
    }

    #[test]
    fn zero_multiplier_collapses_delay() {
        // The legacy options bridge passes multipliers through unvalidated,
        // including zero.
        let settings = BackoffSettings {
            retry_delay_multiplier: 0.0,
            ..BackoffSettings::default()
        };
        assert_eq!(settings.next_delay(Duration::from_secs(7)), Duration::ZERO);
        assert_eq!(settings.next_delay(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn timeout_series_clamps_to_remaining() -> TestResult {
        let b = BackoffSettings::builder()
            .with_initial_rpc_timeout(Duration::from_secs(10))
            .with_rpc_timeout_multiplier(2.0)
            .with_max_rpc_timeout(Duration::from_secs(30))
            .build()?;
        let t = b.next_timeout(Duration::from_secs(10), None);
        assert_eq!(t, Duration::from_secs(20));
        let t = b.next_timeout(Duration::from_secs(20), None);
        assert_eq!(t, Duration::from_secs(30));
        let t = b.next_timeout(Duration::from_secs(20), Some(Duration::from_secs(3)));
        assert_eq!(t, Duration::from_secs(3));
        Ok(())
    }

    #[test]
    fn jitter_bounds() {
        let delay = Duration::from_secs(10);
        let mut rng = MockRng::new(0);
        assert_eq!(BackoffSettings::jittered(delay, &mut rng), Duration::ZERO);
        let mut rng = MockRng::new(u64::MAX);
        let got = BackoffSettings::jittered(delay, &mut rng);
        assert!(got < delay, "{got:?}");
        assert_eq!(
            BackoffSettings::jittered(Duration::ZERO, &mut rng),
            Duration::ZERO
        );
    }

    #[test]
    fn jitter_is_within_range() {
        let delay = Duration::from_millis(500);
        let mut rng = rand::rng();
        for _ in 0..100 {
            let got = BackoffSettings::jittered(delay, &mut rng);
            assert!(got < delay, "{got:?}");
        }
    }

    #[test]
    fn exceeded_by_deadline() -> TestResult {
        let b = BackoffSettings::builder()
            .with_total_timeout(Duration::from_millis(10))
            .build()?;
        assert_eq!(b.exceeded(100, Duration::from_millis(9)), None);
        assert_eq!(
            b.exceeded(0, Duration::from_millis(10)),
            Some(Exhausted::DeadlineExceeded {
                total: Duration::from_millis(10)
            })
        );
        Ok(())
    }

    #[test]
    fn exceeded_by_retries() -> TestResult {
        let b = BackoffSettings::builder().with_max_retries(2).build()?;
        assert_eq!(b.exceeded(1, Duration::from_secs(3600)), None);
        assert_eq!(
            b.exceeded(2, Duration::ZERO),
            Some(Exhausted::MaxRetries { limit: 2 })
        );
        Ok(())
    }

    #[test]
    fn exceeded_without_budget() {
        let b = BackoffSettings::default();
        assert_eq!(b.exceeded(u32::MAX, Duration::from_secs(86400)), None);
    }
}
