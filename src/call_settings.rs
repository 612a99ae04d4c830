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

//! The merged settings applied to one call.
//!
//! Stubs hold a [CallSettings] per method and merge per-call overrides
//! ([CallOptions]) into it before dispatch. The engine consumes the retry
//! policy and the pagination flags; everything else about a call lives with
//! the transport.

use crate::Result;
use crate::error::Error;
use crate::retry_policy::RetryPolicy;
use crate::retry_request_options::RetryRequestOptions;
use crate::warnings::WarningSink;

/// A set of options configuring a single call.
#[derive(Clone, Debug)]
pub struct CallSettings<R> {
    retry: Option<RetryPolicy<R>>,
    auto_paginate: bool,
    page_token: Option<String>,
    max_results: Option<usize>,
}

impl<R> std::default::Default for CallSettings<R> {
    fn default() -> Self {
        Self {
            retry: None,
            auto_paginate: true,
            page_token: None,
            max_results: None,
        }
    }
}

impl<R> CallSettings<R> {
    /// Gets the current retry policy, if any.
    pub fn retry(&self) -> Option<&RetryPolicy<R>> {
        self.retry.as_ref()
    }

    /// Sets the retry policy.
    pub fn set_retry(&mut self, v: RetryPolicy<R>) {
        self.retry = Some(v);
    }

    /// Whether paged calls gather all pages eagerly.
    pub fn auto_paginate(&self) -> bool {
        self.auto_paginate
    }

    pub fn set_auto_paginate(&mut self, v: bool) {
        self.auto_paginate = v;
    }

    /// The page token seeding the first page request, if any.
    pub fn page_token(&self) -> Option<&str> {
        self.page_token.as_deref()
    }

    pub fn set_page_token<T: Into<String>>(&mut self, v: T) {
        self.page_token = Some(v.into());
    }

    /// Cap on the number of resources a paged call may yield.
    pub fn max_results(&self) -> Option<usize> {
        self.max_results
    }

    pub fn set_max_results(&mut self, v: usize) {
        self.max_results = Some(v);
    }

    /// Merges per-call overrides into these settings.
    ///
    /// Fails before dispatch when the overrides carry both a retry policy
    /// and the deprecated retry-options shape. A legacy shape is converted
    /// through the bridge, handing its diagnostics to `sink`.
    pub fn merge(mut self, options: CallOptions<R>, sink: &dyn WarningSink) -> Result<Self> {
        if options.retry.is_some() && options.retry_request_options.is_some() {
            return Err(Error::invalid_argument(
                "Only one of retry or retryRequestOptions may be set",
            ));
        }
        if let Some(v) = options.retry {
            self.retry = Some(v);
        } else if let Some(legacy) = options.retry_request_options {
            self.retry = Some(legacy.to_retry_policy(sink));
        }
        if let Some(v) = options.auto_paginate {
            self.auto_paginate = v;
        }
        if let Some(v) = options.page_token {
            self.page_token = Some(v);
        }
        if let Some(v) = options.max_results {
            self.max_results = Some(v);
        }
        Ok(self)
    }
}

/// Per-call overrides, all optional.
#[derive(Clone, Debug)]
pub struct CallOptions<R> {
    pub retry: Option<RetryPolicy<R>>,
    pub retry_request_options: Option<RetryRequestOptions>,
    pub auto_paginate: Option<bool>,
    pub page_token: Option<String>,
    pub max_results: Option<usize>,
}

impl<R> std::default::Default for CallOptions<R> {
    fn default() -> Self {
        Self {
            retry: None,
            retry_request_options: None,
            auto_paginate: None,
            page_token: None,
            max_results: None,
        }
    }
}
