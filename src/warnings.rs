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

//! Diagnostics emitted by the call runtime.
//!
//! The runtime warns about deprecated and unsupported configuration. Each
//! warning has a stable kind string; the default sink logs through
//! [tracing] and emits each kind at most once per process. Components that
//! produce warnings accept a [WarningSink], so applications (and tests) can
//! observe every emission.

use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};

/// The broad class of a warning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WarningCategory {
    /// The configuration mechanism is deprecated.
    Deprecation,
    /// A parameter is accepted for compatibility but has no effect.
    UnsupportedParameter,
    /// The runtime overrode a configured value.
    Behavior,
}

/// A single diagnostic.
#[derive(Clone, Debug, PartialEq)]
pub struct Warning {
    kind: &'static str,
    category: WarningCategory,
    message: String,
}

impl Warning {
    pub fn new<T: Into<String>>(kind: &'static str, category: WarningCategory, message: T) -> Self {
        Self {
            kind,
            category,
            message: message.into(),
        }
    }

    /// The stable kind string, used for memoization.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn category(&self) -> WarningCategory {
        self.category
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Receives warnings from the call runtime.
#[cfg_attr(test, mockall::automock)]
pub trait WarningSink: Send + Sync {
    fn emit(&self, warning: &Warning);
}

/// The default sink: logs each warning kind once per process.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl WarningSink for LogSink {
    fn emit(&self, warning: &Warning) {
        warn_once(warning);
    }
}

fn emitted_kinds() -> &'static Mutex<HashSet<&'static str>> {
    static EMITTED: OnceLock<Mutex<HashSet<&'static str>>> = OnceLock::new();
    EMITTED.get_or_init(Mutex::default)
}

/// Logs a warning unless its kind was already logged in this process.
///
/// Returns true iff the warning was logged.
pub fn warn_once(warning: &Warning) -> bool {
    let mut seen = emitted_kinds()
        .lock()
        .expect("warning memo lock is poisoned");
    if !seen.insert(warning.kind) {
        return false;
    }
    tracing::warn!(
        kind = warning.kind,
        category = ?warning.category,
        "{}",
        warning.message
    );
    true
}
