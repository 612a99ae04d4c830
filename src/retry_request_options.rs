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

//! The deprecated retry-options shape and its bridge to [RetryPolicy].
//!
//! Older releases configured streaming retries with a `retryRequestOptions`
//! record. The bridge converts that shape into the current policy and
//! backoff records, warning about the mechanism and about the parameters
//! that no longer have an effect. New code should build a
//! [RetryPolicy][crate::retry_policy::RetryPolicy] directly.

use crate::backoff::BackoffSettings;
use crate::retry_policy::{RetryPolicy, ShouldRetry};
use crate::warnings::{Warning, WarningCategory, WarningSink};
use std::time::Duration;

/// The deprecated retry-options record.
///
/// Delays here are in whole seconds, as the legacy surface took them.
#[derive(Clone, Default)]
pub struct RetryRequestOptions {
    /// Bound the loop by consecutive failures. Takes precedence over
    /// [total_timeout][Self::total_timeout].
    pub retries: Option<u32>,
    /// Cap on retry delays, in seconds.
    pub max_retry_delay: Option<u64>,
    /// Scaling factor for retry delays. Passed through unvalidated,
    /// including zero.
    pub retry_delay_multiplier: Option<f64>,
    /// Bound the loop by elapsed time, in seconds.
    pub total_timeout: Option<u64>,
    /// Unsupported; retained for compatibility.
    pub no_response_retries: Option<u32>,
    /// Unsupported; attempts are tracked internally.
    pub current_retry_attempt: Option<u32>,
    /// Unsupported; the runtime always operates on message values.
    pub object_mode: Option<bool>,
    /// Predicate deciding whether an error is retryable.
    pub should_retry_fn: Option<ShouldRetry>,
}

impl std::fmt::Debug for RetryRequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryRequestOptions")
            .field("retries", &self.retries)
            .field("max_retry_delay", &self.max_retry_delay)
            .field("retry_delay_multiplier", &self.retry_delay_multiplier)
            .field("total_timeout", &self.total_timeout)
            .field("no_response_retries", &self.no_response_retries)
            .field("current_retry_attempt", &self.current_retry_attempt)
            .field("object_mode", &self.object_mode)
            .field("should_retry_fn", &self.should_retry_fn.as_ref().map(|_| "..."))
            .finish()
    }
}

fn conversion_warnings() -> [Warning; 4] {
    [
        Warning::new(
            "retry_request_options",
            WarningCategory::Deprecation,
            "retryRequestOptions will be removed in a future release. Please use a retry policy instead.",
        ),
        Warning::new(
            "retry_request_options_no_response_retries",
            WarningCategory::UnsupportedParameter,
            "noResponseRetries override is not supported. Please specify retry codes or a predicate to determine retry eligibility.",
        ),
        Warning::new(
            "retry_request_options_current_retry_attempt",
            WarningCategory::UnsupportedParameter,
            "currentRetryAttempt override is not supported. Retry attempts are tracked internally.",
        ),
        Warning::new(
            "retry_request_options_object_mode",
            WarningCategory::UnsupportedParameter,
            "objectMode override is not supported. The streaming engine always operates on message values.",
        ),
    ]
}

impl RetryRequestOptions {
    /// Converts the legacy record into the current policy shape.
    ///
    /// The resulting policy has an empty retry-code set; retryability is
    /// decided by [should_retry_fn][Self::should_retry_fn] alone. Every
    /// conversion hands all four diagnostics to `sink`; the default sink
    /// deduplicates by kind.
    pub fn to_retry_policy<R>(&self, sink: &dyn WarningSink) -> RetryPolicy<R> {
        for warning in conversion_warnings() {
            sink.emit(&warning);
        }
        let mut backoff = BackoffSettings::default();
        if let Some(v) = self.max_retry_delay {
            backoff.max_retry_delay = Duration::from_secs(v);
        }
        if let Some(v) = self.retry_delay_multiplier {
            backoff.retry_delay_multiplier = v;
        }
        match self.retries {
            Some(retries) => {
                backoff.max_retries = Some(retries);
                backoff.total_timeout = None;
            }
            None => {
                backoff.max_retries = None;
                backoff.total_timeout = self.total_timeout.map(Duration::from_secs);
            }
        }
        let policy = RetryPolicy::new(Vec::<crate::error::rpc::Code>::new(), backoff);
        match &self.should_retry_fn {
            Some(predicate) => policy.with_should_retry_arc(predicate.clone()),
            None => policy,
        }
    }
}
