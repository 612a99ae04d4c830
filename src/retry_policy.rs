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

//! The declarative retry policy applied to a call.
//!
//! A policy names the status codes that are safe to retry, or supplies a
//! predicate that overrides the code set, and carries the backoff settings
//! for the retry loop. For streaming calls the policy may also carry a
//! *resumption function*: a user-supplied transform from the original
//! request to the request for the next attempt, used to skip work already
//! delivered to the consumer.
//!
//! # Example:
//! ```
//! # use callstream::retry_policy::RetryPolicy;
//! # use callstream::backoff::BackoffSettings;
//! let policy: RetryPolicy<String> = RetryPolicy::new([14], BackoffSettings::default());
//! assert!(policy.classify(&callstream::error::Error::unavailable("try again")).is_retry());
//! ```

use crate::backoff::BackoffSettings;
use crate::error::Error;
use crate::error::rpc::Code;
use std::sync::Arc;

/// A predicate deciding whether an error is retryable.
///
/// When present, the predicate replaces the retry-code set entirely.
pub type ShouldRetry = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// A transform from the original request to the next attempt's request.
pub type ResumeRequest<R> = Arc<dyn Fn(&R) -> R + Send + Sync>;

/// The result of a retry policy decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// The error is transient under this policy, continue the retry loop.
    Retry,
    /// The error is not retryable, stop the loop.
    Stop,
}

impl RetryDecision {
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::Retry)
    }
}

/// Determines how errors are handled in the retry loop.
///
/// An error is retryable iff either (a) the predicate is present and
/// returns true, or (b) the predicate is absent, the retry-code set is
/// non-empty, and the error code is in the set. An empty code set with no
/// predicate means "never retry".
pub struct RetryPolicy<R> {
    retry_codes: Vec<Code>,
    should_retry: Option<ShouldRetry>,
    resume_request: Option<ResumeRequest<R>>,
    backoff: BackoffSettings,
}

impl<R> RetryPolicy<R> {
    /// Creates a policy retrying the given status codes.
    pub fn new<I, C>(retry_codes: I, backoff: BackoffSettings) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Code>,
    {
        Self {
            retry_codes: retry_codes.into_iter().map(|c| c.into()).collect(),
            should_retry: None,
            resume_request: None,
            backoff,
        }
    }

    /// Replaces the retry-code set with a predicate.
    pub fn with_should_retry<F>(self, f: F) -> Self
    where
        F: Fn(&Error) -> bool + Send + Sync + 'static,
    {
        self.with_should_retry_arc(Arc::new(f))
    }

    /// Replaces the retry-code set with an already shared predicate.
    pub fn with_should_retry_arc(mut self, f: ShouldRetry) -> Self {
        self.should_retry = Some(f);
        self
    }

    /// Sets the resumption function for streaming retries.
    pub fn with_resume_request<F>(mut self, f: F) -> Self
    where
        F: Fn(&R) -> R + Send + Sync + 'static,
    {
        self.resume_request = Some(Arc::new(f));
        self
    }

    pub fn retry_codes(&self) -> &[Code] {
        &self.retry_codes
    }

    pub fn has_should_retry(&self) -> bool {
        self.should_retry.is_some()
    }

    pub fn has_resume_request(&self) -> bool {
        self.resume_request.is_some()
    }

    pub fn backoff(&self) -> &BackoffSettings {
        &self.backoff
    }

    /// Queries the policy after an error.
    pub fn classify(&self, error: &Error) -> RetryDecision {
        let retryable = match &self.should_retry {
            Some(predicate) => predicate(error),
            None => !self.retry_codes.is_empty() && self.retry_codes.contains(&error.code()),
        };
        if retryable {
            RetryDecision::Retry
        } else {
            RetryDecision::Stop
        }
    }

    /// Produces the request for the next attempt.
    ///
    /// The resumption function always receives the *original* request; it
    /// is expected to close over whatever progress state it needs.
    pub fn next_request(&self, original: &R) -> R
    where
        R: Clone,
    {
        match &self.resume_request {
            Some(resume) => resume(original),
            None => original.clone(),
        }
    }
}

impl<R> Clone for RetryPolicy<R> {
    fn clone(&self) -> Self {
        Self {
            retry_codes: self.retry_codes.clone(),
            should_retry: self.should_retry.clone(),
            resume_request: self.resume_request.clone(),
            backoff: self.backoff.clone(),
        }
    }
}

impl<R> std::fmt::Debug for RetryPolicy<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("retry_codes", &self.retry_codes)
            .field("should_retry", &self.should_retry.as_ref().map(|_| "..."))
            .field("resume_request", &self.resume_request.as_ref().map(|_| "..."))
            .field("backoff", &self.backoff)
            .finish()
    }
}
